//! # Decoder Registry
//!
//! Maps media types to decoder factories. Hosts build one registry at
//! startup, install it process-wide with [`install_global`], look decoders up
//! while running and tear it down with [`shutdown_global`].
//!
//! ```ignore
//! let mut registry = DecoderRegistry::new();
//! registry.register(DecoderRegistration::new(
//!     "tone",
//!     [TONE_MEDIA_TYPE],
//!     RANK_PRIMARY,
//!     || Box::new(ToneDecoder::new()),
//! ))?;
//! install_global(registry)?;
//!
//! let decoder = with_global(|r| r.create(TONE_MEDIA_TYPE)).ok_or(...)??;
//! ```

use crate::error::{PlaybackError, Result};
use crate::traits::NonstreamDecoder;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Rank of the preferred decoder for a media type.
pub const RANK_PRIMARY: u32 = 256;
/// Rank of a fallback decoder.
pub const RANK_SECONDARY: u32 = 128;
/// Rank of a decoder that should only be used when asked for by name.
pub const RANK_MARGINAL: u32 = 64;

/// Creates fresh decoder instances.
pub type DecoderFactory = Arc<dyn Fn() -> Box<dyn NonstreamDecoder> + Send + Sync>;

/// One registered decoder.
#[derive(Clone)]
pub struct DecoderRegistration {
    pub name: String,
    pub media_types: Vec<String>,
    pub rank: u32,
    factory: DecoderFactory,
}

impl DecoderRegistration {
    pub fn new<I, S, F>(name: impl Into<String>, media_types: I, rank: u32, factory: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn() -> Box<dyn NonstreamDecoder> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            media_types: media_types.into_iter().map(Into::into).collect(),
            rank,
            factory: Arc::new(factory),
        }
    }

    pub fn handles(&self, media_type: &str) -> bool {
        self.media_types
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(media_type))
    }

    pub fn create(&self) -> Box<dyn NonstreamDecoder> {
        (self.factory)()
    }
}

impl fmt::Debug for DecoderRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderRegistration")
            .field("name", &self.name)
            .field("media_types", &self.media_types)
            .field("rank", &self.rank)
            .finish()
    }
}

/// Set of registered decoders.
#[derive(Debug, Default, Clone)]
pub struct DecoderRegistry {
    entries: Vec<DecoderRegistration>,
}

impl DecoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a decoder. Names must be unique.
    pub fn register(&mut self, registration: DecoderRegistration) -> Result<()> {
        if self.entries.iter().any(|e| e.name == registration.name) {
            return Err(PlaybackError::RegistryError(format!(
                "decoder '{}' is already registered",
                registration.name
            )));
        }

        debug!(
            name = %registration.name,
            media_types = ?registration.media_types,
            rank = registration.rank,
            "Registered decoder"
        );
        self.entries.push(registration);
        Ok(())
    }

    /// Highest-ranked decoder for `media_type`. Ties go to the earlier registration.
    pub fn find(&self, media_type: &str) -> Option<&DecoderRegistration> {
        self.entries
            .iter()
            .filter(|e| e.handles(media_type))
            .fold(None, |best: Option<&DecoderRegistration>, e| match best {
                Some(b) if b.rank >= e.rank => Some(b),
                _ => Some(e),
            })
    }

    pub fn create(&self, media_type: &str) -> Result<Box<dyn NonstreamDecoder>> {
        self.find(media_type)
            .map(DecoderRegistration::create)
            .ok_or_else(|| {
                PlaybackError::RegistryError(format!("no decoder for '{}'", media_type))
            })
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Process-wide Registry
// ============================================================================

static GLOBAL: RwLock<Option<DecoderRegistry>> = parking_lot::const_rwlock(None);

/// Install the process-wide registry.
///
/// # Errors
///
/// [`PlaybackError::RegistryError`] if one is already installed.
pub fn install_global(registry: DecoderRegistry) -> Result<()> {
    let mut global = GLOBAL.write();
    if global.is_some() {
        return Err(PlaybackError::RegistryError(
            "a global decoder registry is already installed".to_string(),
        ));
    }

    info!(decoders = registry.len(), "Installed global decoder registry");
    *global = Some(registry);
    Ok(())
}

/// Run `f` against the process-wide registry, `None` when none is installed.
pub fn with_global<R>(f: impl FnOnce(&DecoderRegistry) -> R) -> Option<R> {
    GLOBAL.read().as_ref().map(f)
}

/// Remove the process-wide registry. Returns whether one was installed.
pub fn shutdown_global() -> bool {
    let removed = GLOBAL.write().take();
    if removed.is_some() {
        info!("Shut down global decoder registry");
    }
    removed.is_some()
}
