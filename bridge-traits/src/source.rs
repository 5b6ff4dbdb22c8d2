//! Upstream Byte Source Abstraction
//!
//! Non-stream decoders need the whole encoded file before producing a single
//! sample. An [`UpstreamSource`] is whatever holds those bytes: a file on disk,
//! an in-memory blob, or a network object the host fetches on its own terms.
//!
//! Two scheduling modes exist:
//! - **Pull**: the engine asks for exact byte ranges whenever it wants them.
//! - **Push**: the host delivers chunks on its own schedule and the engine
//!   accumulates them until the declared length or end-of-input is reached.

use bytes::Bytes;

use crate::{
    error::{BridgeError, Result},
    platform::PlatformSendSync,
};

/// How an upstream source delivers data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingMode {
    /// Random-access range requests are supported.
    Pull,
    /// Data arrives unsolicited, in order.
    Push,
}

/// A source of encoded bytes for the engine.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::source::{UpstreamSource, SchedulingMode};
///
/// async fn read_all(source: &dyn UpstreamSource) -> bridge_traits::error::Result<bytes::Bytes> {
///     let len = source.byte_length().await.ok_or(BridgeError::SizeUnknown)?;
///     source.pull_range(0, len).await
/// }
/// ```
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait UpstreamSource: PlatformSendSync {
    /// Scheduling query: does this source answer range requests?
    fn scheduling(&self) -> SchedulingMode;

    /// Total length in bytes, when the source knows it.
    async fn byte_length(&self) -> Option<u64>;

    /// Read exactly `length` bytes starting at `offset`.
    ///
    /// Push-only sources keep the default, which reports the capability as
    /// unavailable.
    async fn pull_range(&self, offset: u64, length: u64) -> Result<Bytes> {
        let _ = (offset, length);
        Err(BridgeError::NotAvailable(
            "pull_range on a push-only source".to_string(),
        ))
    }

    /// Short human-readable name used in log fields.
    fn describe(&self) -> String {
        "upstream".to_string()
    }
}
