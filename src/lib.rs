//! Workspace facade crate.
//!
//! Re-exports the member crates behind feature flags so a host application can
//! depend on `nonstream-workspace` alone and pick what it needs:
//!
//! - `engine` (default): [`core_playback`] and [`core_runtime`]
//! - `container`: [`core_container`], the legacy package extractor
//! - `desktop-shims` (default): [`bridge_desktop`] file and memory sources

#[cfg(feature = "engine")]
pub use core_playback;
#[cfg(feature = "engine")]
pub use core_runtime;

#[cfg(feature = "container")]
pub use core_container;

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop;
