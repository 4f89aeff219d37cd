//! Byte streams for chart package sources.
//!
//! A [`Transport`] turns a source string (a URL or a local path) into a
//! readable byte stream. Nothing is retried and nothing is resumed: a
//! failed fetch is simply an error for the caller to report. Sources that
//! arrive gzip, bzip2 or zstd compressed are unwrapped transparently.

mod compression;
pub mod error;
mod file;
mod http;

pub use crate::compression::Compression;
use crate::error::Result;
pub use crate::file::FileTransport;
pub use crate::http::{HttpTransport, USER_AGENT};
use async_trait::async_trait;
use futures::io::AsyncRead;

pub type BoxAsyncRead = Box<dyn AsyncRead + Send + Unpin + 'static>;

/// Fetches a byte stream for a source.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, source: &str) -> Result<BoxAsyncRead>;
}

/// Dispatches on the source: `http://` and `https://` URLs go over HTTP,
/// everything else (including `file://` URLs) is read from disk.
#[derive(Clone)]
pub struct AnyTransport {
    http: HttpTransport,
    file: FileTransport,
}
impl AnyTransport {
    pub fn new(http: HttpTransport) -> Self {
        Self { http, file: FileTransport }
    }
}

pub(crate) fn is_http(source: &str) -> bool {
    let lower = source.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

#[async_trait]
impl Transport for AnyTransport {
    async fn fetch(&self, source: &str) -> Result<BoxAsyncRead> {
        if is_http(source) { self.http.fetch(source).await } else { self.file.fetch(source).await }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("https://files.example.com/chart.sng", true)]
    #[case("HTTP://files.example.com/chart.sng", true)]
    #[case("file:///tmp/chart.sng", false)]
    #[case("/tmp/chart.sng", false)]
    #[case("httpdocs/chart.sng", false)]
    fn test_is_http(#[case] source: &str, #[case] expected: bool) {
        assert_eq!(is_http(source), expected);
    }
}
