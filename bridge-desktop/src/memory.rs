//! In-memory upstream source

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    source::{SchedulingMode, UpstreamSource},
};
use bytes::Bytes;

/// Bytes already resident in memory.
///
/// `MemorySource::new` answers range requests. `MemorySource::push_only`
/// refuses them so the engine falls back to push activation; whether the
/// length is advertised is up to the caller.
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Bytes,
    mode: SchedulingMode,
    advertise_length: bool,
    name: String,
}

impl MemorySource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            mode: SchedulingMode::Pull,
            advertise_length: true,
            name: "memory".to_string(),
        }
    }

    /// A source that only supports push delivery.
    pub fn push_only(data: impl Into<Bytes>, advertise_length: bool) -> Self {
        Self {
            data: data.into(),
            mode: SchedulingMode::Push,
            advertise_length,
            name: "memory".to_string(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Hide the length, as a live stream would.
    pub fn without_length(mut self) -> Self {
        self.advertise_length = false;
        self
    }

    /// Split the data into chunks of `chunk_size` for push delivery.
    pub fn chunks(&self, chunk_size: usize) -> Vec<Bytes> {
        let step = chunk_size.max(1);
        (0..self.data.len())
            .step_by(step)
            .map(|start| self.data.slice(start..(start + step).min(self.data.len())))
            .collect()
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }
}

#[async_trait]
impl UpstreamSource for MemorySource {
    fn scheduling(&self) -> SchedulingMode {
        self.mode
    }

    async fn byte_length(&self) -> Option<u64> {
        self.advertise_length.then_some(self.data.len() as u64)
    }

    async fn pull_range(&self, offset: u64, length: u64) -> Result<Bytes> {
        if self.mode == SchedulingMode::Push {
            return Err(BridgeError::NotAvailable(
                "pull_range on a push-only source".to_string(),
            ));
        }

        let size = self.data.len() as u64;
        match offset.checked_add(length) {
            Some(end) if end <= size => Ok(self.data.slice(offset as usize..end as usize)),
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
