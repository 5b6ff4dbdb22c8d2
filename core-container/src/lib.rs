//! # Legacy Package Container
//!
//! Pulls tracker modules out of Unreal packages (`.umx`) so the playback
//! engine can hand them to a module decoder.
//!
//! ## Overview
//!
//! - [`typefind`]: recognize packages by their signature
//! - [`reader`]: bounds-checked reads, compact indices and names
//! - [`package`]: header, name, import and export tables; locating the music export
//! - [`source`]: the extracted module as an [`UpstreamSource`](bridge_traits::UpstreamSource)
//!
//! ## Usage
//!
//! ```ignore
//! use core_container::{ExtractedSource, type_find};
//!
//! let head = package_source.pull_range(0, 4).await?;
//! if type_find(&head).is_some() {
//!     let module = ExtractedSource::from_source(package_source.as_ref()).await?;
//!     let decoder = registry.create(&module.caps())?;
//!     // build the engine with `decoder` and activate it on `module`
//! }
//! ```

pub mod error;
pub mod package;
pub mod reader;
pub mod source;
pub mod typefind;

pub use error::{ContainerError, Result};
pub use package::{extract_module, ModulePayload, Package, PackageHeader, PACKAGE_SIGNATURE};
pub use reader::PackageReader;
pub use source::ExtractedSource;
pub use typefind::{
    looks_like_package, module_caps, type_find, Probability, TypeSuggestion, MODULE_MEDIA_TYPE,
    PACKAGE_EXTENSIONS, UNREAL_PACKAGE_MEDIA_TYPE,
};
