use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tokio::sync::Mutex;

use crate::chunk::ByteRange;

/// Something an upload can be sliced from: known length, a name, a declared
/// MIME type and random-access reads.
#[async_trait]
pub trait ChunkSource: Send + Sync {
    fn filename(&self) -> &str;

    fn mime_type(&self) -> &str;

    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn read_range(&self, range: ByteRange) -> io::Result<Bytes>;
}

/// A local file read through tokio.
pub struct FileSource {
    path: PathBuf,
    filename: String,
    mime_type: String,
    size: u64,
    file: Mutex<File>,
}

impl FileSource {
    /// Opens `path`; the MIME type is guessed from the extension.
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).await?;
        let size = file.metadata().await?.len();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.bin".to_string());
        let mime_type = mime_guess::from_path(&path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Ok(Self {
            path,
            filename,
            mime_type,
            size,
            file: Mutex::new(file),
        })
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ChunkSource for FileSource {
    fn filename(&self) -> &str {
        &self.filename
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn len(&self) -> u64 {
        self.size
    }

    async fn read_range(&self, range: ByteRange) -> io::Result<Bytes> {
        let mut buf = vec![0u8; range.len() as usize];
        let mut file = self.file.lock().await;
        file.seek(SeekFrom::Start(range.start)).await?;
        file.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}

/// Bytes already in memory.
#[derive(Debug, Clone)]
pub struct MemorySource {
    filename: String,
    mime_type: String,
    data: Bytes,
}

impl MemorySource {
    pub fn new(filename: impl Into<String>, mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }
}

#[async_trait]
impl ChunkSource for MemorySource {
    fn filename(&self) -> &str {
        &self.filename
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    async fn read_range(&self, range: ByteRange) -> io::Result<Bytes> {
        if range.end > self.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("range {}..{} past end of {}", range.start, range.end, self.filename),
            ));
        }
        Ok(self.data.slice(range.start as usize..range.end as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_source_reads_ranges_and_guesses_mime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tafsir.pdf");
        let data: Vec<u8> = (0..100u8).collect();
        tokio::fs::write(&path, &data).await.unwrap();

        let source = FileSource::open(&path).await.unwrap();
        assert_eq!(source.filename(), "tafsir.pdf");
        assert_eq!(source.mime_type(), "application/pdf");
        assert_eq!(source.len(), 100);

        let tail = source
            .read_range(ByteRange { index: 1, start: 90, end: 100 })
            .await
            .unwrap();
        assert_eq!(&tail[..], &data[90..]);
        let head = source
            .read_range(ByteRange { index: 0, start: 0, end: 10 })
            .await
            .unwrap();
        assert_eq!(&head[..], &data[..10]);
    }

    #[tokio::test]
    async fn unknown_extension_is_octet_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.zzunknown");
        tokio::fs::write(&path, b"x").await.unwrap();

        let source = FileSource::open(&path).await.unwrap();
        assert_eq!(source.mime_type(), "application/octet-stream");
        let source = source.with_mime_type("audio/mpeg");
        assert_eq!(source.mime_type(), "audio/mpeg");
    }

    #[tokio::test]
    async fn memory_source_rejects_reads_past_end() {
        let source = MemorySource::new("a.txt", "text/plain", &b"abc"[..]);
        let err = source
            .read_range(ByteRange { index: 0, start: 0, end: 4 })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
