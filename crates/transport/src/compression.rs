//! Compression sniffing for incoming streams.

use crate::BoxAsyncRead;
use async_compression::futures::bufread::{BzDecoder, GzipDecoder, ZstdDecoder};
use futures::io::{AsyncBufRead, AsyncRead, AsyncReadExt, BufReader, Cursor};

const BZIP2_MAGIC: [u8; 3] = [0x42, 0x5A, 0x68];
const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// Compression layers a source may arrive wrapped in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Compression {
    /// Uncompressed
    #[default]
    None,
    /// Bzip2 compression (.bz2)
    Bzip2,
    /// Gzip compression (.gz)
    Gzip,
    /// Zstd compression (.zst)
    Zstd,
}
impl Compression {
    /// Detect compression format from magic bytes.
    ///
    /// Returns `None` variant if no magic bytes match or if the input is too
    /// short to detect any format.
    #[must_use]
    pub fn from_magic_bytes(bytes: &[u8]) -> Self {
        if bytes.starts_with(&BZIP2_MAGIC) {
            return Compression::Bzip2;
        }
        if bytes.starts_with(&GZIP_MAGIC) {
            return Compression::Gzip;
        }
        if bytes.starts_with(&ZSTD_MAGIC) {
            return Compression::Zstd;
        }
        Compression::None
    }

    fn wrap<R: AsyncBufRead + Send + Unpin + 'static>(self, reader: R) -> BoxAsyncRead {
        match self {
            Compression::None => Box::new(reader),
            Compression::Bzip2 => Box::new(BzDecoder::new(reader)),
            Compression::Gzip => Box::new(GzipDecoder::new(reader)),
            Compression::Zstd => Box::new(ZstdDecoder::new(reader)),
        }
    }
}

/// Longest magic number we look for.
const SNIFF_LEN: u64 = 4;

/// Reads the start of a stream and transparently strips a compression
/// layer if one is recognised. The sniffed bytes are put back in front of
/// the rest of the stream.
pub(crate) async fn decompressed<R: AsyncRead + Send + Unpin + 'static>(mut reader: R) -> std::io::Result<BoxAsyncRead> {
    // Chunked bodies can hand out fewer bytes per read than the magic needs.
    let mut head = Vec::with_capacity(SNIFF_LEN as usize);
    (&mut reader).take(SNIFF_LEN).read_to_end(&mut head).await?;
    let compression = Compression::from_magic_bytes(&head);
    if compression != Compression::None {
        tracing::debug!(?compression, "Decompressing source stream");
    }
    Ok(compression.wrap(BufReader::new(Cursor::new(head).chain(reader))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_compression::futures::write::{GzipEncoder, ZstdEncoder};
    use futures::io::AsyncWriteExt;
    use rstest::rstest;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    /// Hands out one byte per read, like a body arriving in tiny chunks.
    struct Trickle(Cursor<Vec<u8>>);
    impl AsyncRead for Trickle {
        fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut [u8]) -> Poll<io::Result<usize>> {
            let len = buf.len().min(1);
            Pin::new(&mut self.0).poll_read(cx, &mut buf[..len])
        }
    }

    #[rstest]
    #[case(&[0x42, 0x5A, 0x68, 0x39], Compression::Bzip2)]
    #[case(&[0x1F, 0x8B, 0x08], Compression::Gzip)]
    #[case(&[0x28, 0xB5, 0x2F, 0xFD, 0x00], Compression::Zstd)]
    #[case(b"SNGPKG", Compression::None)]
    #[case(&[0x1F], Compression::None)]
    #[case(&[], Compression::None)]
    fn test_from_magic_bytes(#[case] bytes: &[u8], #[case] expected: Compression) {
        assert_eq!(Compression::from_magic_bytes(bytes), expected);
    }

    #[tokio::test]
    async fn test_plain_stream_passes_through() {
        let mut reader = decompressed(Cursor::new(b"SNGPKG plain".to_vec())).await.unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"SNGPKG plain");
    }

    #[tokio::test]
    async fn test_gzip_stream_is_unwrapped() {
        let mut encoder = GzipEncoder::new(Vec::new());
        encoder.write_all(b"SNGPKG compressed").await.unwrap();
        encoder.close().await.unwrap();
        let compressed = encoder.into_inner();

        let mut reader = decompressed(Cursor::new(compressed)).await.unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"SNGPKG compressed");
    }

    #[tokio::test]
    async fn test_magic_split_across_reads() {
        let mut encoder = ZstdEncoder::new(Vec::new());
        encoder.write_all(b"SNGPKG trickled").await.unwrap();
        encoder.close().await.unwrap();

        let mut reader = decompressed(Trickle(Cursor::new(encoder.into_inner()))).await.unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"SNGPKG trickled");
    }

    #[tokio::test]
    async fn test_short_stream_passes_through() {
        let mut reader = decompressed(Trickle(Cursor::new(vec![0x1F]))).await.unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, [0x1F]);
    }
}
