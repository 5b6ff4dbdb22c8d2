//! # Package Parsing
//!
//! Locates the module embedded in a legacy Unreal package (`.umx`).
//!
//! ## Layout
//!
//! ```text
//! offset  size  field
//! 0       4     signature 0x9E2A83C1 (LE)
//! 4       2     package version
//! 6       2     license mode (ignored)
//! 8       4     package flags (ignored)
//! 12      4×6   name count/offset, export count/offset, import count/offset
//! ```
//!
//! The music export is the first export whose class resolves, through the
//! import table, to the name `Music`. Its serialized block starts with a
//! property count and some version-dependent fields, then the compact-index
//! chunk size, then the module bytes themselves. The module type (`it`,
//! `s3m`, `xm`, ...) is always name 0.

use crate::error::{ContainerError, Result};
use crate::reader::PackageReader;
use bytes::Bytes;
use tracing::{debug, instrument, trace};

/// Little-endian signature at the start of every package.
pub const PACKAGE_SIGNATURE: u32 = 0x9E2A_83C1;

/// Class name of exports holding module data.
pub const MUSIC_CLASS: &str = "Music";

/// Fixed header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageHeader {
    pub version: u16,
    pub name_count: u32,
    pub name_offset: u32,
    pub export_count: u32,
    pub export_offset: u32,
    pub import_count: u32,
    pub import_offset: u32,
}

impl PackageHeader {
    pub fn parse(reader: &mut PackageReader<'_>) -> Result<Self> {
        reader.seek(0);
        let signature = reader.u32_le()?;
        if signature != PACKAGE_SIGNATURE {
            return Err(ContainerError::InvalidSignature(signature));
        }

        let version = reader.u16_le()?;
        reader.skip(2)?; // license mode
        reader.skip(4)?; // package flags

        Ok(Self {
            version,
            name_count: reader.u32_le()?,
            name_offset: reader.u32_le()?,
            export_count: reader.u32_le()?,
            export_offset: reader.u32_le()?,
            import_count: reader.u32_le()?,
            import_offset: reader.u32_le()?,
        })
    }
}

/// The module found inside a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModulePayload {
    /// Tracker format, e.g. `it` or `s3m`.
    pub module_type: String,
    /// Offset of the module within the package.
    pub offset: u64,
    pub size: u64,
    /// The module bytes, sharing the package's buffer.
    pub data: Bytes,
}

/// Parsed package tables.
#[derive(Debug, Clone)]
pub struct Package {
    pub header: PackageHeader,
    pub names: Vec<String>,
    /// Object-name index of every import.
    pub imports: Vec<i64>,
}

impl Package {
    /// Read the header, the name table and the import table.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = PackageReader::new(data);
        let header = PackageHeader::parse(&mut reader)?;
        debug!(
            version = header.version,
            names = header.name_count,
            exports = header.export_count,
            imports = header.import_count,
            "Parsed package header"
        );

        reader.seek(header.name_offset as usize);
        let names = (0..header.name_count)
            .map(|_| reader.name(header.version))
            .collect::<Result<Vec<_>>>()?;
        trace!(?names, "Read name table");

        reader.seek(header.import_offset as usize);
        let imports = (0..header.import_count)
            .map(|_| {
                reader.compact_index()?; // class package
                reader.compact_index()?; // class name
                reader.skip(4)?; // package
                reader.compact_index()
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            header,
            names,
            imports,
        })
    }

    /// Name at `index`.
    pub fn name(&self, index: i64) -> Result<&str> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.names.get(i))
            .map(String::as_str)
            .ok_or(ContainerError::IndexOutOfRange {
                table: "name",
                index,
                len: self.names.len(),
            })
    }

    /// Class name of an export whose class index is `class`. Negative
    /// indices refer to imports; zero and positive ones to other exports,
    /// which never name a builtin class and resolve to `None`.
    pub fn class_name(&self, class: i64) -> Result<Option<&str>> {
        if class >= 0 {
            return Ok(None);
        }

        let import = -class - 1;
        let object_name = usize::try_from(import)
            .ok()
            .and_then(|i| self.imports.get(i))
            .ok_or(ContainerError::IndexOutOfRange {
                table: "import",
                index: import,
                len: self.imports.len(),
            })?;
        self.name(*object_name).map(Some)
    }

    /// Module type, i.e. name 0.
    pub fn module_type(&self) -> Result<&str> {
        self.name(0)
    }
}

/// Find the module embedded in `data`.
///
/// # Errors
///
/// [`ContainerError::NoMusicData`] when no `Music` export carries data,
/// [`ContainerError::Truncated`] when the payload runs past the end, plus
/// any error from parsing the tables.
#[instrument(skip(data), fields(len = data.len()))]
pub fn extract_module(data: &Bytes) -> Result<ModulePayload> {
    let package = Package::parse(data)?;
    let version = package.header.version;
    let mut reader = PackageReader::new(data);

    reader.seek(package.header.export_offset as usize);
    for export in 0..package.header.export_count {
        let class = reader.compact_index()?;
        reader.compact_index()?; // super
        reader.skip(4)?; // group
        reader.compact_index()?; // object name
        reader.skip(4)?; // object flags
        let serial_size = reader.compact_index()?;
        if serial_size <= 0 {
            continue;
        }
        let serial_offset = reader.compact_index()?;

        if package.class_name(class)? != Some(MUSIC_CLASS) {
            trace!(export, class, "Skipping non-music export");
            continue;
        }

        let serial_offset = usize::try_from(serial_offset).map_err(|_| {
            ContainerError::Truncated(format!("negative serial offset {}", serial_offset))
        })?;
        reader.seek(serial_offset);
        skip_music_header(&mut reader, version)?;

        let chunk_size = reader.compact_index()?;
        let offset = reader.position();
        let size = u64::try_from(chunk_size).unwrap_or(0);

        debug!(
            export,
            offset,
            size,
            serial_size,
            "Found music data"
        );

        if size == 0 {
            return Err(ContainerError::NoMusicData);
        }

        let end = (offset as u64)
            .checked_add(size)
            .filter(|&end| end <= data.len() as u64)
            .ok_or_else(|| {
                ContainerError::Truncated(format!(
                    "module of {} bytes at offset {} exceeds package of {} bytes",
                    size,
                    offset,
                    data.len()
                ))
            })?;

        return Ok(ModulePayload {
            module_type: package.module_type()?.to_string(),
            offset: offset as u64,
            size,
            data: data.slice(offset..end as usize),
        });
    }

    Err(ContainerError::NoMusicData)
}

/// Skip the property count and the version-dependent fields that precede
/// the chunk size.
fn skip_music_header(reader: &mut PackageReader<'_>, version: u16) -> Result<()> {
    reader.compact_index()?; // property count

    match version {
        // UT2003
        v if v >= 120 => {
            reader.compact_index()?;
            reader.skip(8)
        }
        // America's Army
        v if v >= 100 => {
            reader.skip(4)?;
            reader.compact_index()?;
            reader.skip(4)
        }
        // Unreal Tournament (some tunes ship with 62)
        v if v >= 62 => {
            reader.compact_index()?;
            reader.skip(4)
        }
        // Unreal
        _ => reader.compact_index().map(|_| ()),
    }
}
