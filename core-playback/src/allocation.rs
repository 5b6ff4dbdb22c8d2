//! # Allocation Negotiation
//!
//! Output buffers come from an allocator chosen together with downstream.
//! Negotiation runs on the first allocation, after an output-format change,
//! and whenever downstream asks for it through
//! [`OutputSink::check_reconfigure`]:
//!
//! ```text
//! AudioInfo ──> AudioCaps ──> sink.set_caps ──> AllocationQuery
//!                                                    │
//!                     sink.query_allocation <────────┘
//!                                │
//!                     AllocationDecider::decide
//!                                │
//!                     cache (allocator, params)
//! ```
//!
//! Every buffer until the next negotiation is allocated from the cached
//! allocator. A `None` allocator stands for [`SystemAllocator`].

use crate::clock::{BufferTiming, ClockTime};
use crate::error::{PlaybackError, Result};
use crate::format::{AudioCaps, AudioInfo};
use crate::traits::OutputSink;
use bytes::{Bytes, BytesMut};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

// ============================================================================
// Buffers
// ============================================================================

/// Memory layout requested for output buffers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocationParams {
    /// Bytes reserved in front of the data
    pub prefix: usize,
    /// Bytes reserved after the data
    pub padding: usize,
    /// Alignment mask of the data start (`7` = 8-byte aligned)
    pub align: usize,
}

/// One decoded buffer on its way downstream.
pub struct OutputBuffer {
    memory: BytesMut,
    start: usize,
    size: usize,
    timing: BufferTiming,
    discont: bool,
    allocator: String,
}

impl OutputBuffer {
    /// Zeroed buffer of `size` bytes laid out according to `params`.
    ///
    /// # Errors
    ///
    /// [`PlaybackError::NegotiationFailed`] when the layout does not fit in
    /// the address space.
    pub fn with_params(size: usize, params: &AllocationParams, allocator: &str) -> Result<Self> {
        let total = params
            .prefix
            .checked_add(params.align)
            .and_then(|n| n.checked_add(size))
            .and_then(|n| n.checked_add(params.padding))
            .ok_or_else(|| {
                PlaybackError::NegotiationFailed(format!(
                    "buffer layout overflows: size {} with {:?}",
                    size, params
                ))
            })?;
        let memory = BytesMut::zeroed(total);

        let misalign = (memory.as_ptr() as usize).wrapping_add(params.prefix) & params.align;
        let adjust = if misalign == 0 {
            0
        } else {
            params.align - misalign + 1
        };

        Ok(Self {
            memory,
            start: params.prefix + adjust,
            size,
            timing: BufferTiming::default(),
            discont: false,
            allocator: allocator.to_string(),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn data(&self) -> &[u8] {
        &self.memory[self.start..self.start + self.size]
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.memory[self.start..self.start + self.size]
    }

    /// Shrink to the first `size` bytes. Growing is not possible.
    pub fn truncate(&mut self, size: usize) {
        self.size = self.size.min(size);
    }

    /// Bytes available in front of the data.
    pub fn prefix_len(&self) -> usize {
        self.start
    }

    /// Bytes available after the data.
    pub fn padding_len(&self) -> usize {
        self.memory.len() - self.start - self.size
    }

    pub fn timing(&self) -> BufferTiming {
        self.timing
    }

    pub fn set_timing(&mut self, timing: BufferTiming) {
        self.timing = timing;
    }

    pub fn pts(&self) -> ClockTime {
        self.timing.pts
    }

    pub fn duration(&self) -> ClockTime {
        self.timing.duration
    }

    pub fn offset(&self) -> u64 {
        self.timing.offset
    }

    pub fn offset_end(&self) -> u64 {
        self.timing.offset_end
    }

    /// First buffer after a loop jump or a seek.
    pub fn is_discont(&self) -> bool {
        self.discont
    }

    pub fn set_discont(&mut self, discont: bool) {
        self.discont = discont;
    }

    /// Name of the allocator the memory came from.
    pub fn allocator_name(&self) -> &str {
        &self.allocator
    }

    /// Hand the payload over as shared bytes.
    pub fn into_bytes(self) -> Bytes {
        let end = self.start + self.size;
        self.memory.freeze().slice(self.start..end)
    }
}

impl fmt::Debug for OutputBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputBuffer")
            .field("size", &self.size)
            .field("timing", &self.timing)
            .field("discont", &self.discont)
            .field("allocator", &self.allocator)
            .finish()
    }
}

// ============================================================================
// Allocators
// ============================================================================

/// Source of output buffer memory.
pub trait Allocator: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn allocate(&self, size: usize, params: &AllocationParams) -> Result<OutputBuffer>;
}

/// Process default allocator: plain heap memory.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl SystemAllocator {
    pub const NAME: &'static str = "system";
}

impl Allocator for SystemAllocator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn allocate(&self, size: usize, params: &AllocationParams) -> Result<OutputBuffer> {
        OutputBuffer::with_params(size, params, Self::NAME)
    }
}

/// One allocator proposal in an [`AllocationQuery`].
#[derive(Debug, Clone, Default)]
pub struct AllocationOffer {
    /// `None` selects [`SystemAllocator`]
    pub allocator: Option<Arc<dyn Allocator>>,
    pub params: AllocationParams,
}

/// Allocation query answered by downstream.
#[derive(Debug, Clone)]
pub struct AllocationQuery {
    caps: AudioCaps,
    need_pool: bool,
    offers: Vec<AllocationOffer>,
}

impl AllocationQuery {
    pub fn new(caps: AudioCaps, need_pool: bool) -> Self {
        Self {
            caps,
            need_pool,
            offers: Vec::new(),
        }
    }

    pub fn caps(&self) -> &AudioCaps {
        &self.caps
    }

    pub fn need_pool(&self) -> bool {
        self.need_pool
    }

    pub fn add_allocation_param(
        &mut self,
        allocator: Option<Arc<dyn Allocator>>,
        params: AllocationParams,
    ) {
        self.offers.push(AllocationOffer { allocator, params });
    }

    pub fn offers(&self) -> &[AllocationOffer] {
        &self.offers
    }

    pub fn offers_mut(&mut self) -> &mut Vec<AllocationOffer> {
        &mut self.offers
    }
}

/// Hook that edits the answered query before the first offer is adopted.
pub trait AllocationDecider: Send + Sync {
    fn decide(&self, query: &mut AllocationQuery) -> Result<()>;
}

/// Adopt the first offer, or the process default when downstream offered none.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultAllocationDecider;

impl AllocationDecider for DefaultAllocationDecider {
    fn decide(&self, query: &mut AllocationQuery) -> Result<()> {
        if query.offers().is_empty() {
            query.add_allocation_param(None, AllocationParams::default());
        }
        Ok(())
    }
}

// ============================================================================
// Negotiator
// ============================================================================

/// Negotiates and caches the allocator used for output buffers.
pub struct AllocationNegotiator {
    decider: Arc<dyn AllocationDecider>,
    allocator: Option<Arc<dyn Allocator>>,
    params: AllocationParams,
    caps: Option<AudioCaps>,
    negotiated: bool,
    format_changed: bool,
    negotiations: u64,
}

impl AllocationNegotiator {
    pub fn new(decider: Arc<dyn AllocationDecider>) -> Self {
        Self {
            decider,
            allocator: None,
            params: AllocationParams::default(),
            caps: None,
            negotiated: false,
            format_changed: false,
            negotiations: 0,
        }
    }

    /// Force a negotiation before the next allocation.
    pub fn mark_format_changed(&mut self) {
        self.format_changed = true;
    }

    pub fn needs_negotiation(&self) -> bool {
        !self.negotiated || self.format_changed
    }

    /// Negotiate when required or when downstream asked for it.
    pub fn ensure(&mut self, info: &AudioInfo, sink: &dyn OutputSink) -> Result<()> {
        let reconfigure = sink.check_reconfigure();
        if reconfigure || self.needs_negotiation() {
            self.negotiate(info, sink)?;
        }
        Ok(())
    }

    /// Run the full negotiation sequence for `info`.
    pub fn negotiate(&mut self, info: &AudioInfo, sink: &dyn OutputSink) -> Result<()> {
        self.negotiated = false;

        let caps = AudioCaps::from(info);
        if !sink.set_caps(&caps) {
            warn!(format = %info, "Downstream refused output caps");
            return Err(PlaybackError::NegotiationFailed(format!(
                "downstream refused {}",
                info
            )));
        }
        self.format_changed = false;

        let mut query = AllocationQuery::new(caps.clone(), true);
        if !sink.query_allocation(&mut query) {
            debug!("Downstream did not answer the allocation query");
        }

        self.decider.decide(&mut query)?;

        let offer = query.offers().first().cloned().unwrap_or_default();
        self.allocator = offer.allocator;
        self.params = offer.params;
        self.caps = Some(caps);
        self.negotiated = true;
        self.negotiations += 1;

        info!(
            format = %info,
            allocator = self.allocator_name(),
            prefix = self.params.prefix,
            padding = self.params.padding,
            align = self.params.align,
            "Negotiated output"
        );
        Ok(())
    }

    /// Allocate from the cached allocator.
    pub fn allocate(&self, size: usize) -> Result<OutputBuffer> {
        if !self.negotiated {
            return Err(PlaybackError::NegotiationFailed(
                "allocation before negotiation".to_string(),
            ));
        }

        match &self.allocator {
            Some(allocator) => allocator.allocate(size, &self.params),
            None => SystemAllocator.allocate(size, &self.params),
        }
    }

    pub fn allocator_name(&self) -> &str {
        self.allocator
            .as_ref()
            .map(|allocator| allocator.name())
            .unwrap_or(SystemAllocator::NAME)
    }

    pub fn params(&self) -> AllocationParams {
        self.params
    }

    pub fn caps(&self) -> Option<&AudioCaps> {
        self.caps.as_ref()
    }

    /// Completed negotiations so far.
    pub fn negotiations(&self) -> u64 {
        self.negotiations
    }
}

impl fmt::Debug for AllocationNegotiator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllocationNegotiator")
            .field("allocator", &self.allocator_name())
            .field("params", &self.params)
            .field("negotiated", &self.negotiated)
            .field("format_changed", &self.format_changed)
            .field("negotiations", &self.negotiations)
            .finish()
    }
}
