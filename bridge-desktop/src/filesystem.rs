//! File-backed upstream source using Tokio

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    source::{SchedulingMode, UpstreamSource},
};
use bytes::Bytes;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Mutex;
use tracing::debug;

/// Tokio-based file source.
///
/// The length is captured when the file is opened; range requests seek and
/// read under an async mutex so concurrent pulls never interleave.
pub struct FileSource {
    path: PathBuf,
    length: u64,
    file: Mutex<fs::File>,
}

impl FileSource {
    /// Open `path` for range reads.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = fs::File::open(&path).await.map_err(Self::map_io_error)?;
        let length = file.metadata().await.map_err(Self::map_io_error)?.len();

        debug!(path = ?path, length, "Opened file source");

        Ok(Self {
            path,
            length,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Convert std::io::Error to BridgeError
    fn map_io_error(e: std::io::Error) -> BridgeError {
        BridgeError::Io(e)
    }
}

#[async_trait]
impl UpstreamSource for FileSource {
    fn scheduling(&self) -> SchedulingMode {
        SchedulingMode::Pull
    }

    async fn byte_length(&self) -> Option<u64> {
        Some(self.length)
    }

    async fn pull_range(&self, offset: u64, length: u64) -> Result<Bytes> {
        let end = offset.checked_add(length);
        if end.map_or(true, |end| end > self.length) {
            return Err(BridgeError::OutOfRange {
                offset,
                length,
                size: self.length,
            });
        }

        let len = usize::try_from(length)
            .map_err(|_| BridgeError::OperationFailed(format!("range too large: {length}")))?;
        let mut buf = vec![0u8; len];

        let mut file = self.file.lock().await;
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(Self::map_io_error)?;
        file.read_exact(&mut buf).await.map_err(Self::map_io_error)?;

        debug!(path = ?self.path, offset, length, "Pulled range");
        Ok(Bytes::from(buf))
    }

    fn describe(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string())
    }
}
