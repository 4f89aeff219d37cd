use crate::compression::decompressed;
use crate::error::{ErrorKind, Result};
use crate::{BoxAsyncRead, Transport};
use async_trait::async_trait;
use exn::ResultExt;
use std::path::PathBuf;
use tokio_util::compat::TokioAsyncReadCompatExt;

/// Reads sources from the local filesystem. Accepts plain paths and
/// `file://` URLs.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileTransport;

impl FileTransport {
    fn path(source: &str) -> Result<PathBuf> {
        let path = source.strip_prefix("file://").unwrap_or(source);
        if path.trim().is_empty() {
            exn::bail!(ErrorKind::InvalidSource(source.to_string()));
        }
        Ok(PathBuf::from(path))
    }
}

#[async_trait]
impl Transport for FileTransport {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn fetch(&self, source: &str) -> Result<BoxAsyncRead> {
        let path = Self::path(source)?;
        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                exn::bail!(ErrorKind::NotFound(path.display().to_string()))
            },
            Err(e) => return Err(e).or_raise(|| ErrorKind::Io),
        };
        decompressed(file.compat()).await.or_raise(|| ErrorKind::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::io::AsyncReadExt;

    async fn fetch_all(source: &str) -> Result<Vec<u8>> {
        let mut reader = FileTransport.fetch(source).await?;
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.or_raise(|| ErrorKind::Io)?;
        Ok(out)
    }

    #[tokio::test]
    async fn test_plain_path_and_file_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chart.sng");
        std::fs::write(&path, b"SNGPKG bytes").unwrap();

        assert_eq!(fetch_all(path.to_str().unwrap()).await.unwrap(), b"SNGPKG bytes");
        let url = format!("file://{}", path.display());
        assert_eq!(fetch_all(&url).await.unwrap(), b"SNGPKG bytes");
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.sng");
        let err = fetch_all(path.to_str().unwrap()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_empty_source() {
        let err = fetch_all("file://").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidSource(_)));
    }
}
