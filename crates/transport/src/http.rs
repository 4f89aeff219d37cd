use crate::compression::decompressed;
use crate::error::{ErrorKind, Result};
use crate::{BoxAsyncRead, Transport};
use async_trait::async_trait;
use exn::ResultExt;
use futures::TryStreamExt;
use reqwest::{Client, StatusCode};
use std::time::Duration;

pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Streams sources over HTTP(S).
///
/// The response body is never buffered: bytes are handed to the consumer
/// as they arrive. The timeout only bounds connecting; a slow but steady
/// download of a large package is not cut off.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}
impl HttpTransport {
    pub fn new(user_agent: &str, connect_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(connect_timeout)
            .build()
            .or_raise(|| ErrorKind::Http)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn fetch(&self, source: &str) -> Result<BoxAsyncRead> {
        let url = reqwest::Url::parse(source).or_raise(|| ErrorKind::InvalidSource(source.to_string()))?;
        let response = self.client.get(url).send().await.or_raise(|| ErrorKind::Http)?;
        let status = response.status();
        if matches!(status, StatusCode::NOT_FOUND | StatusCode::GONE) {
            exn::bail!(ErrorKind::NotFound(source.to_string()));
        }
        if !status.is_success() {
            exn::bail!(ErrorKind::Status(status.as_u16()));
        }
        tracing::debug!(status = status.as_u16(), length = ?response.content_length(), "Streaming response body");
        let body = Box::pin(response.bytes_stream().map_err(std::io::Error::other)).into_async_read();
        decompressed(body).await.or_raise(|| ErrorKind::Http)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent() {
        assert!(USER_AGENT.starts_with("chartshelf-transport/"));
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let transport = HttpTransport::new(USER_AGENT, Duration::from_secs(1)).unwrap();
        let err = transport.fetch("https://").await.err().unwrap();
        assert!(matches!(&*err, ErrorKind::InvalidSource(_)));
    }
}
