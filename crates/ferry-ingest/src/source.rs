//! Record sources
//!
//! A source yields the raw bytes of the input as a sequential stream of
//! chunks. Local files are read with tokio; remote files are streamed from
//! the response body so neither is ever loaded whole.

use crate::error::SourceError;
use crate::events::{EventSender, ImportEvent};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio_util::io::ReaderStream;
use tracing::debug;
use url::Url;

/// Read buffer size for local files
const FILE_CHUNK_SIZE: usize = 64 * 1024;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, SourceError>> + Send>>;

#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Path or URL, used in messages and for format inference
    fn location(&self) -> &str;

    /// Total size in bytes when known up front.
    async fn size(&self) -> Option<u64>;

    async fn open(&self) -> Result<ByteStream, SourceError>;
}

/// A file on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    location: String,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let location = path.display().to_string();
        Self { path, location }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RecordSource for FileSource {
    fn location(&self) -> &str {
        &self.location
    }

    async fn size(&self) -> Option<u64> {
        tokio::fs::metadata(&self.path).await.ok().map(|m| m.len())
    }

    async fn open(&self) -> Result<ByteStream, SourceError> {
        let file = tokio::fs::File::open(&self.path)
            .await
            .map_err(|source| SourceError::Open {
                location: self.location.clone(),
                source,
            })?;
        debug!(path = %self.location, "Opened source file");

        let location = self.location.clone();
        let stream = ReaderStream::with_capacity(file, FILE_CHUNK_SIZE).map(move |chunk| {
            chunk.map_err(|source| SourceError::Read {
                location: location.clone(),
                source,
            })
        });
        Ok(Box::pin(stream))
    }
}

/// A file served over HTTP(S), streamed from the response body.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    url: Url,
    location: String,
}

impl HttpSource {
    pub fn new(url: Url) -> Self {
        Self::with_client(url, reqwest::Client::new())
    }

    pub fn with_client(url: Url, client: reqwest::Client) -> Self {
        let location = url.to_string();
        Self {
            client,
            url,
            location,
        }
    }
}

#[async_trait]
impl RecordSource for HttpSource {
    fn location(&self) -> &str {
        &self.location
    }

    async fn size(&self) -> Option<u64> {
        None
    }

    async fn open(&self) -> Result<ByteStream, SourceError> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|source| SourceError::Http {
                location: self.location.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::HttpStatus {
                location: self.location.clone(),
                status: status.as_u16(),
            });
        }
        debug!(url = %self.location, status = status.as_u16(), "Streaming remote source");

        let location = self.location.clone();
        let stream = response.bytes_stream().map(move |chunk| {
            chunk.map_err(|source| SourceError::Http {
                location: location.clone(),
                source,
            })
        });
        Ok(Box::pin(stream))
    }
}

/// Pick the source implementation for a path or URL.
pub fn open_source(location: &str) -> Result<Box<dyn RecordSource>, SourceError> {
    if location.starts_with("http://") || location.starts_with("https://") {
        let url = Url::parse(location).map_err(|e| SourceError::InvalidLocation {
            location: location.to_string(),
            message: e.to_string(),
        })?;
        Ok(Box::new(HttpSource::new(url)))
    } else {
        Ok(Box::new(FileSource::new(location)))
    }
}

/// Report every chunk passing through as a `Tick` event.
pub fn counted(stream: ByteStream, events: EventSender) -> ByteStream {
    Box::pin(stream.inspect(move |chunk| {
        if let Ok(bytes) = chunk {
            events.emit(ImportEvent::Tick {
                bytes: bytes.len() as u64,
            });
        }
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::events;
    use std::io::Write;

    async fn collect(mut stream: ByteStream) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_file_source_streams_contents() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{\"User\": []}").unwrap();

        let source = FileSource::new(file.path());
        assert_eq!(source.size().await, Some(12));
        let bytes = collect(source.open().await.unwrap()).await;
        assert_eq!(bytes, b"{\"User\": []}");
    }

    #[tokio::test]
    async fn test_missing_file_fails_to_open() {
        let source = FileSource::new("/definitely/not/here.json");
        let err = source.open().await.err().unwrap();
        assert!(matches!(err, SourceError::Open { .. }));
    }

    #[test]
    fn test_open_source_picks_by_scheme() {
        let remote = open_source("https://example.com/dump.json").unwrap();
        assert_eq!(remote.location(), "https://example.com/dump.json");
        let local = open_source("./dump.ndjson").unwrap();
        assert_eq!(local.location(), "./dump.ndjson");
        assert!(open_source("http://").is_err());
    }

    #[tokio::test]
    async fn test_counted_emits_ticks() {
        let (tx, mut rx) = events::channel();
        let chunks: Vec<Result<Bytes, SourceError>> =
            vec![Ok(Bytes::from_static(b"abc")), Ok(Bytes::from_static(b"de"))];
        let stream: ByteStream = Box::pin(futures::stream::iter(chunks));

        let bytes = collect(counted(stream, tx)).await;
        assert_eq!(bytes, b"abcde");
        assert_eq!(rx.recv().await, Some(ImportEvent::Tick { bytes: 3 }));
        assert_eq!(rx.recv().await, Some(ImportEvent::Tick { bytes: 2 }));
    }
}
