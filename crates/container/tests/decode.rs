use chartshelf_container::encode::ContainerBuilder;
use chartshelf_container::error::ErrorKind;
use chartshelf_container::{Decoder, SONG_INI, song_ini};
use futures::{AsyncRead, AsyncReadExt};
use rstest::rstest;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Hands out the container a few bytes at a time, like a slow socket.
struct Trickle {
    bytes: Vec<u8>,
    position: usize,
    chunk: usize,
}
impl Trickle {
    fn new(bytes: Vec<u8>, chunk: usize) -> Self {
        Self { bytes, position: 0, chunk }
    }
}
impl AsyncRead for Trickle {
    fn poll_read(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut [u8]) -> Poll<io::Result<usize>> {
        let start = self.position;
        let end = self.bytes.len().min(start + self.chunk).min(start + buf.len());
        buf[..end - start].copy_from_slice(&self.bytes[start..end]);
        self.position = end;
        Poll::Ready(Ok(end - start))
    }
}

fn package(padding: u64, mask: [u8; 16]) -> ContainerBuilder {
    ContainerBuilder::new()
        .mask(mask)
        .padding(padding)
        .metadata("name", "Song")
        .metadata("artist", "Band")
        .metadata("charter", "Me")
        .entry("notes.chart", vec![0x42; 500])
        .entry("song.ogg", (0..70_000u32).map(|i| (i * 7 % 251) as u8).collect::<Vec<_>>())
        .entry("album.png", b"\x89PNG".to_vec())
}

#[rstest]
#[case::byte_at_a_time(1, 0, [0u8; 16])]
#[case::odd_chunks(7, 3, [0xFF; 16])]
#[case::large_chunks(4096, 0, [0x5A; 16])]
#[tokio::test]
async fn test_trickled_stream_decodes(#[case] chunk: usize, #[case] padding: u64, #[case] mask: [u8; 16]) {
    let builder = package(padding, mask);
    let mut decoder = Decoder::open(Trickle::new(builder.build(), chunk)).await.unwrap();
    assert_eq!(decoder.metadata().len(), 3);

    let mut decoded = Vec::new();
    while let Some(mut entry) = decoder.next_entry().await.unwrap() {
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents).await.unwrap();
        decoded.push((entry.name().to_string(), contents));
    }
    assert_eq!(decoded, builder.entries());
}

#[tokio::test]
async fn test_partial_consumers_keep_framing() {
    let builder = package(5, [0x11; 16]);
    let mut decoder = Decoder::open(Trickle::new(builder.build(), 3)).await.unwrap();

    let mut heads = Vec::new();
    while let Some(mut entry) = decoder.next_entry().await.unwrap() {
        let mut head = [0u8; 4];
        entry.read_exact(&mut head).await.unwrap();
        heads.push(head);
    }
    let expected: Vec<[u8; 4]> = builder
        .entries()
        .iter()
        .map(|(_, contents)| [contents[0], contents[1], contents[2], contents[3]])
        .collect();
    assert_eq!(heads, expected);
}

#[tokio::test]
async fn test_synthesized_song_ini_follows_real_entries() {
    let container = package(0, [0u8; 16]).build();
    let mut decoder = Decoder::open(Trickle::new(container, 64)).await.unwrap();
    let ini = song_ini(decoder.metadata(), [("delay", "0")]);
    let mut decoder = decoder.with_virtual_entry(ini);

    let mut names = Vec::new();
    let mut last = String::new();
    while let Some(mut entry) = decoder.next_entry().await.unwrap() {
        names.push(entry.name().to_string());
        last.clear();
        entry.read_to_string(&mut last).await.unwrap();
    }
    assert_eq!(names, ["notes.chart", "song.ogg", "album.png", SONG_INI]);
    assert!(last.starts_with("[song]"));
    assert!(last.contains("artist = Band"));
    assert!(last.contains("delay = 0"));
}

#[tokio::test]
async fn test_truncated_trickle_reports_entry() {
    let mut container = package(0, [0u8; 16]).build();
    container.truncate(container.len() - 2);
    let mut decoder = Decoder::open(Trickle::new(container, 9)).await.unwrap();

    let mut names = Vec::new();
    let err = loop {
        match decoder.next_entry().await {
            Ok(Some(mut entry)) => {
                names.push(entry.name().to_string());
                let mut sink = Vec::new();
                let _ = entry.read_to_end(&mut sink).await;
            },
            Ok(None) => panic!("truncated container decoded completely"),
            Err(e) => break e,
        }
    };
    assert_eq!(names, ["notes.chart", "song.ogg", "album.png"]);
    assert!(matches!(&*err, ErrorKind::Framing { name, expected: 4, received: 2 } if name == "album.png"));
    assert!(decoder.next_entry().await.is_err());
}
