//! Exposes the module inside a package as an upstream source of its own.
//!
//! ```ignore
//! let package = Arc::new(FileSource::open("Unreal.umx").await?);
//! let module = ExtractedSource::from_source(package.as_ref()).await?;
//! let handle = engine.activate(Arc::new(module))?;
//! ```
//!
//! Packages that arrive in pushed chunks go through
//! [`ExtractedSource::from_chunks`] instead:
//!
//! ```ignore
//! let expected = package.byte_length().await;
//! let module = ExtractedSource::from_chunks(expected, chunk_receiver).await?;
//! ```

use crate::error::{ContainerError, Result};
use crate::package::{extract_module, ModulePayload};
use crate::typefind::module_caps;
use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::source::{SchedulingMode, UpstreamSource};
use bytes::Bytes;
use core_playback::{PushAccumulator, SourceLoader};
use futures::{pin_mut, Stream, StreamExt};
use tracing::{debug, info, instrument};

/// Pull-capable source over a module extracted from a package.
#[derive(Debug, Clone)]
pub struct ExtractedSource {
    payload: ModulePayload,
    name: String,
}

impl ExtractedSource {
    /// Fetch the whole package from `inner` and extract its module.
    ///
    /// # Errors
    ///
    /// [`ContainerError::Source`] for push-only sources, which are fed through
    /// [`from_chunks`](Self::from_chunks). [`ContainerError::Load`] when
    /// `inner` cannot be read in full (unknown size, short read), otherwise
    /// any parsing error.
    #[instrument(skip(inner), fields(source = %inner.describe()))]
    pub async fn from_source(inner: &dyn UpstreamSource) -> Result<Self> {
        if inner.scheduling() == SchedulingMode::Push {
            return Err(ContainerError::Source(BridgeError::NotAvailable(
                "push-only package, feed its chunks to ExtractedSource::from_chunks".to_string(),
            )));
        }

        let package = SourceLoader::load_pull(inner).await?;
        let source = Self::from_bytes(package)?;
        let name = format!("{}#{}", inner.describe(), source.payload.module_type);
        Ok(source.with_name(name))
    }

    /// Collect a pushed package and extract its module.
    ///
    /// Collection stops once `expected` bytes have arrived or the stream
    /// ends, whichever comes first. A stream that ends early still gets an
    /// extraction attempt, which usually fails with
    /// [`ContainerError::Truncated`].
    ///
    /// # Errors
    ///
    /// [`ContainerError::Load`] when no length was declared and nothing
    /// arrived, otherwise any parsing error.
    #[instrument(skip(chunks))]
    pub async fn from_chunks<S>(expected: Option<u64>, chunks: S) -> Result<Self>
    where
        S: Stream<Item = Bytes>,
    {
        let mut accumulator = PushAccumulator::new(expected);
        pin_mut!(chunks);

        while let Some(chunk) = chunks.next().await {
            if let Some(package) = accumulator.push_chunk(chunk) {
                debug!(bytes = package.len(), "Package complete");
                return Self::from_bytes(package);
            }
        }

        debug!(received = accumulator.received(), "Package stream ended");
        let package = accumulator.finish()?;
        Self::from_bytes(package)
    }

    /// Extract the module from a package already in memory.
    pub fn from_bytes(package: Bytes) -> Result<Self> {
        let payload = extract_module(&package)?;
        info!(
            module_type = %payload.module_type,
            offset = payload.offset,
            size = payload.size,
            "Extracted module from package"
        );

        let name = format!("package#{}", payload.module_type);
        Ok(Self { payload, name })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn payload(&self) -> &ModulePayload {
        &self.payload
    }

    pub fn module_type(&self) -> &str {
        &self.payload.module_type
    }

    /// Media type downstream decoders are looked up by.
    pub fn caps(&self) -> String {
        module_caps(&self.payload.module_type)
    }
}

#[async_trait]
impl UpstreamSource for ExtractedSource {
    fn scheduling(&self) -> SchedulingMode {
        SchedulingMode::Pull
    }

    async fn byte_length(&self) -> Option<u64> {
        Some(self.payload.size)
    }

    async fn pull_range(&self, offset: u64, length: u64) -> BridgeResult<Bytes> {
        let size = self.payload.size;
        match offset.checked_add(length) {
            Some(end) if end <= size => Ok(self.payload.data.slice(offset as usize..end as usize)),
            _ => Err(BridgeError::OutOfRange {
                offset,
                length,
                size,
            }),
        }
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}
