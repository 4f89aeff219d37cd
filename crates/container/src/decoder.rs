use crate::error::{ErrorKind, Result};
use crate::manifest::{self, HEADER_LEN, MAGIC, MASK_LEN, MAX_SECTION_LEN, Manifest, VERSION};
use crate::song_ini::VirtualEntry;
use exn::ResultExt;
use futures::io::{AsyncRead, AsyncReadExt, Cursor};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

enum State {
    Streaming,
    Done,
    Failed(ErrorKind),
}

/// Entry currently handed out to the consumer.
struct Current {
    index: usize,
    consumed: u64,
}

/// Pull-based streaming decoder for SNG containers.
///
/// [`open`](Self::open) reads and validates everything up to the payload.
/// Each call to [`next_entry`](Self::next_entry) then yields one entry whose
/// bytes are unmasked on the fly as they are read from the underlying
/// stream. Nothing is buffered beyond the caller's read buffer.
///
/// An entry borrows the decoder, so it has to be dropped before asking for
/// the next one. Whatever the consumer didn't read is skipped on the next
/// call. After a failure the decoder is poisoned: every later call returns
/// the same [`ErrorKind`].
///
/// ```
/// use chartshelf_container::{Decoder, error::Result};
/// use futures::io::{AsyncRead, AsyncReadExt};
///
/// async fn sizes<R: AsyncRead + Unpin>(stream: R) -> Result<Vec<(String, usize)>> {
///     let mut decoder = Decoder::open(stream).await?;
///     let mut sizes = Vec::new();
///     while let Some(mut entry) = decoder.next_entry().await? {
///         let mut contents = Vec::new();
///         let name = entry.name().to_string();
///         if entry.read_to_end(&mut contents).await.is_err() {
///             break;
///         }
///         sizes.push((name, contents.len()));
///     }
///     // Surfaces a read failure from the loop above, if there was one.
///     decoder.next_entry().await?;
///     Ok(sizes)
/// }
/// ```
pub struct Decoder<R> {
    reader: R,
    manifest: Manifest,
    mask: [u8; MASK_LEN],
    /// Index of the next manifest entry to hand out.
    next: usize,
    current: Option<Current>,
    virtual_entry: Option<VirtualEntry>,
    /// Absolute number of bytes consumed from `reader`.
    position: u64,
    state: State,
}

impl<R: AsyncRead + Unpin> Decoder<R> {
    /// Reads the header, metadata and index, and validates the entry layout.
    ///
    /// # Errors
    ///
    /// [`Manifest`](ErrorKind::Manifest) for anything malformed (including a
    /// stream that ends before the payload section starts),
    /// [`Transport`](ErrorKind::Transport) if the stream itself fails.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn open(mut reader: R) -> Result<Self> {
        let mut header = [0u8; HEADER_LEN as usize];
        read_section(&mut reader, &mut header, "header").await?;
        if &header[..6] != MAGIC {
            exn::bail!(ErrorKind::manifest("not an SNG container (bad magic)"));
        }
        let version = u32::from_le_bytes([header[6], header[7], header[8], header[9]]);
        if version != VERSION {
            exn::bail!(ErrorKind::manifest(format!("unsupported container version {version}")));
        }
        let mut mask = [0u8; MASK_LEN];
        mask.copy_from_slice(&header[10..]);

        let metadata_bytes = read_length_prefixed(&mut reader, "metadata").await?;
        let metadata = manifest::parse_metadata(&metadata_bytes)?;
        let index_bytes = read_length_prefixed(&mut reader, "index").await?;
        let entries = manifest::parse_index(&index_bytes)?;

        let mut payload_len = [0u8; 8];
        read_section(&mut reader, &mut payload_len, "payload").await?;
        let payload_start = HEADER_LEN + 8 + metadata_bytes.len() as u64 + 8 + index_bytes.len() as u64 + 8;

        let manifest = Manifest {
            version,
            metadata,
            entries,
            payload_start,
            payload_len: u64::from_le_bytes(payload_len),
        };
        manifest.validate_layout()?;
        tracing::debug!(
            entries = manifest.entries.len(),
            metadata = manifest.metadata.len(),
            payload = manifest.payload_len,
            "Opened container"
        );

        Ok(Self {
            reader,
            manifest,
            mask,
            next: 0,
            current: None,
            virtual_entry: None,
            position: payload_start,
            state: State::Streaming,
        })
    }

    /// Appends a synthesized entry after all real entries. It consumes no
    /// stream bytes. Dropped if the container already has an entry with the
    /// same name.
    pub fn with_virtual_entry(mut self, entry: VirtualEntry) -> Self {
        if self.manifest.entry(&entry.name).is_some() {
            tracing::debug!(name = %entry.name, "Container already has this entry, dropping the synthesized one");
        } else {
            self.virtual_entry = Some(entry);
        }
        self
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Metadata pairs, in stream order.
    pub fn metadata(&self) -> &[(String, String)] {
        &self.manifest.metadata
    }

    /// The fault that poisoned this decoder, if any. Lets a consumer tell a
    /// failed read of the container apart from a failure on its own side.
    pub fn error(&self) -> Option<&ErrorKind> {
        match &self.state {
            State::Failed(kind) => Some(kind),
            _ => None,
        }
    }

    /// Yields the next entry in manifest order, then the virtual entry (if
    /// any), then `Ok(None)`.
    pub async fn next_entry(&mut self) -> Result<Option<DecodedEntry<'_, R>>> {
        match &self.state {
            State::Failed(kind) => exn::bail!(kind.clone()),
            State::Done => return Ok(None),
            State::Streaming => {},
        }
        match self.advance().await {
            Ok(Some(index)) => {
                let entry = &self.manifest.entries[index];
                let (name, size) = (entry.name.clone(), entry.length);
                tracing::trace!(name = %name, size, "Decoding entry");
                Ok(Some(DecodedEntry { name, size, source: Source::Stream(self) }))
            },
            Ok(None) => match self.virtual_entry.take() {
                Some(VirtualEntry { name, contents }) => {
                    let size = contents.len() as u64;
                    Ok(Some(DecodedEntry { name, size, source: Source::Virtual(Cursor::new(contents)) }))
                },
                None => {
                    self.state = State::Done;
                    Ok(None)
                },
            },
            Err(e) => {
                self.state = State::Failed((*e).clone());
                Err(e)
            },
        }
    }

    /// Skips the remainder of the current entry and any gap before the next
    /// one. Returns the index of the next entry.
    async fn advance(&mut self) -> Result<Option<usize>> {
        if let Some(current) = self.current.take() {
            let entry = &self.manifest.entries[current.index];
            let remaining = entry.length - current.consumed;
            if remaining > 0 {
                tracing::trace!(name = %entry.name, remaining, "Skipping unread entry bytes");
                let skipped = skip(&mut self.reader, remaining).await?;
                self.position += skipped;
                if skipped < remaining {
                    exn::bail!(ErrorKind::Framing {
                        name: entry.name.clone(),
                        expected: entry.length,
                        received: current.consumed + skipped,
                    });
                }
            }
        }

        let Some(entry) = self.manifest.entries.get(self.next) else {
            return Ok(None);
        };
        let gap = entry.offset - self.position;
        if gap > 0 {
            let skipped = skip(&mut self.reader, gap).await?;
            self.position += skipped;
            if skipped < gap {
                exn::bail!(ErrorKind::Framing { name: entry.name.clone(), expected: entry.length, received: 0 });
            }
        }
        self.current = Some(Current { index: self.next, consumed: 0 });
        self.next += 1;
        Ok(Some(self.next - 1))
    }

    fn poll_read_entry(&mut self, cx: &mut Context<'_>, buf: &mut [u8]) -> Poll<io::Result<usize>> {
        if let State::Failed(kind) = &self.state {
            return Poll::Ready(Err(io::Error::other(kind.clone())));
        }
        let Some(current) = self.current.as_mut() else {
            return Poll::Ready(Ok(0));
        };
        let entry = &self.manifest.entries[current.index];
        let remaining = entry.length - current.consumed;
        if remaining == 0 || buf.is_empty() {
            return Poll::Ready(Ok(0));
        }
        let max = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        match Pin::new(&mut self.reader).poll_read(cx, &mut buf[..max]) {
            Poll::Ready(Ok(0)) => {
                let kind = ErrorKind::Framing {
                    name: entry.name.clone(),
                    expected: entry.length,
                    received: current.consumed,
                };
                tracing::debug!(error = %kind, "Container stream ended inside an entry");
                self.state = State::Failed(kind.clone());
                Poll::Ready(Err(io::Error::new(io::ErrorKind::UnexpectedEof, kind)))
            },
            Poll::Ready(Ok(read)) => {
                manifest::apply_mask(&self.mask, current.consumed, &mut buf[..read]);
                current.consumed += read as u64;
                self.position += read as u64;
                Poll::Ready(Ok(read))
            },
            Poll::Ready(Err(e)) => {
                self.state = State::Failed(ErrorKind::Transport(e.kind()));
                Poll::Ready(Err(e))
            },
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Reads exactly `buf.len()` bytes of the manifest. Running out of stream
/// here is a malformed container, not a truncated entry.
async fn read_section<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8], section: &str) -> Result<()> {
    match reader.read_exact(buf).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            exn::bail!(ErrorKind::manifest(format!("stream ended inside the {section} section")))
        },
        Err(e) => {
            let kind = e.kind();
            Err(e).or_raise(|| ErrorKind::Transport(kind))
        },
    }
}

async fn read_length_prefixed<R: AsyncRead + Unpin>(reader: &mut R, section: &str) -> Result<Vec<u8>> {
    let mut len = [0u8; 8];
    read_section(reader, &mut len, section).await?;
    let len = u64::from_le_bytes(len);
    if len > MAX_SECTION_LEN {
        exn::bail!(ErrorKind::manifest(format!("{section} section is {len} bytes (max {MAX_SECTION_LEN})")));
    }
    let mut bytes = vec![0u8; len as usize];
    read_section(reader, &mut bytes, section).await?;
    Ok(bytes)
}

/// Discards up to `len` bytes, returning how many were actually available.
async fn skip<R: AsyncRead + Unpin>(reader: &mut R, len: u64) -> Result<u64> {
    match futures::io::copy(reader.take(len), &mut futures::io::sink()).await {
        Ok(skipped) => Ok(skipped),
        Err(e) => {
            let kind = e.kind();
            Err(e).or_raise(|| ErrorKind::Transport(kind))
        },
    }
}

enum Source<'a, R> {
    Stream(&'a mut Decoder<R>),
    Virtual(Cursor<Vec<u8>>),
}

/// One entry of a container, readable as a byte stream.
///
/// Reads never go past the entry's declared [`size`](Self::size). A stream
/// that ends early fails the read with an
/// [`UnexpectedEof`](io::ErrorKind::UnexpectedEof) error carrying
/// [`ErrorKind::Framing`].
pub struct DecodedEntry<'a, R> {
    name: String,
    size: u64,
    source: Source<'a, R>,
}
impl<R> DecodedEntry<'_, R> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared length in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// `true` for the synthesized entry added by
    /// [`Decoder::with_virtual_entry`].
    pub fn is_virtual(&self) -> bool {
        matches!(self.source, Source::Virtual(_))
    }
}
impl<R: AsyncRead + Unpin> AsyncRead for DecodedEntry<'_, R> {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut [u8]) -> Poll<io::Result<usize>> {
        match &mut self.source {
            Source::Stream(decoder) => decoder.poll_read_entry(cx, buf),
            Source::Virtual(cursor) => Pin::new(cursor).poll_read(cx, buf),
        }
    }
}
