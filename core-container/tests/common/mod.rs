//! Builds small packages for the container tests.

#![allow(dead_code)]

use bytes::Bytes;

const HEADER_LEN: usize = 36;
const SIGNATURE: u32 = 0x9E2A_83C1;

/// Encode `value` as a compact index.
pub fn encode_index(value: i64) -> Vec<u8> {
    let mut rest = value.unsigned_abs();
    let mut first = (rest & 0x3f) as u8;
    if value < 0 {
        first |= 0x80;
    }
    rest >>= 6;
    if rest > 0 {
        first |= 0x40;
    }

    let mut out = vec![first];
    while rest > 0 {
        let mut byte = (rest & 0x7f) as u8;
        rest >>= 7;
        if rest > 0 {
            byte |= 0x80;
        }
        out.push(byte);
    }
    out
}

/// Serialized block of a `Music` export holding `payload`, with a chunk size
/// of `declared` bytes.
pub fn music_serial(version: u16, payload: &[u8], declared: i64) -> Vec<u8> {
    let mut out = encode_index(0); // property count
    let filler = [0x11u8; 8];
    match version {
        v if v >= 120 => {
            out.extend(encode_index(3));
            out.extend_from_slice(&filler);
        }
        v if v >= 100 => {
            out.extend_from_slice(&filler[..4]);
            out.extend(encode_index(3));
            out.extend_from_slice(&filler[..4]);
        }
        v if v >= 62 => {
            out.extend(encode_index(3));
            out.extend_from_slice(&filler[..4]);
        }
        _ => out.extend(encode_index(3)),
    }
    out.extend(encode_index(declared));
    out.extend_from_slice(payload);
    out
}

struct Export {
    class: i64,
    serial: Vec<u8>,
}

/// Lays out header, serial blocks, names, imports and exports in that order.
pub struct PackageBuilder {
    version: u16,
    names: Vec<String>,
    imports: Vec<i64>,
    exports: Vec<Export>,
}

impl PackageBuilder {
    /// A package whose name 0 is `module_type`.
    pub fn new(version: u16, module_type: &str) -> Self {
        Self {
            version,
            names: vec![module_type.to_string()],
            imports: Vec::new(),
            exports: Vec::new(),
        }
    }

    /// Add a name, returning its index.
    pub fn name(&mut self, name: &str) -> i64 {
        if let Some(index) = self.names.iter().position(|n| n == name) {
            return index as i64;
        }
        self.names.push(name.to_string());
        (self.names.len() - 1) as i64
    }

    /// Import a class named `name`, returning the class index exports use.
    pub fn import(&mut self, name: &str) -> i64 {
        let object_name = self.name(name);
        self.imports.push(object_name);
        -(self.imports.len() as i64)
    }

    /// Export with an arbitrary serialized block; empty means no data.
    pub fn export(&mut self, class: i64, serial: Vec<u8>) {
        self.exports.push(Export { class, serial });
    }

    pub fn music(&mut self, class: i64, payload: &[u8]) {
        let serial = music_serial(self.version, payload, payload.len() as i64);
        self.export(class, serial);
    }

    pub fn build(&self) -> Bytes {
        let mut serial = Vec::new();
        let mut offsets = Vec::new();
        for export in &self.exports {
            offsets.push(HEADER_LEN + serial.len());
            serial.extend_from_slice(&export.serial);
        }

        let mut names = Vec::new();
        for name in &self.names {
            if self.version < 64 {
                names.extend_from_slice(name.as_bytes());
                names.push(0);
            } else {
                names.push(name.len() as u8 + 1);
                names.extend_from_slice(name.as_bytes());
                names.push(0);
            }
            names.extend_from_slice(&0x0007_0010u32.to_le_bytes());
        }

        let mut imports = Vec::new();
        for object_name in &self.imports {
            imports.extend(encode_index(0)); // class package
            imports.extend(encode_index(0)); // class name
            imports.extend_from_slice(&0u32.to_le_bytes());
            imports.extend(encode_index(*object_name));
        }

        let mut exports = Vec::new();
        for (export, offset) in self.exports.iter().zip(&offsets) {
            exports.extend(encode_index(export.class));
            exports.extend(encode_index(0)); // super
            exports.extend_from_slice(&0u32.to_le_bytes());
            exports.extend(encode_index(0)); // object name
            exports.extend_from_slice(&0x0004_0000u32.to_le_bytes());
            exports.extend(encode_index(export.serial.len() as i64));
            if !export.serial.is_empty() {
                exports.extend(encode_index(*offset as i64));
            }
        }

        let name_offset = HEADER_LEN + serial.len();
        let import_offset = name_offset + names.len();
        let export_offset = import_offset + imports.len();

        let mut out = Vec::with_capacity(export_offset + exports.len());
        out.extend_from_slice(&SIGNATURE.to_le_bytes());
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // license mode
        out.extend_from_slice(&1u32.to_le_bytes()); // package flags
        for field in [
            self.names.len(),
            name_offset,
            self.exports.len(),
            export_offset,
            self.imports.len(),
            import_offset,
        ] {
            out.extend_from_slice(&(field as u32).to_le_bytes());
        }
        debug_assert_eq!(out.len(), HEADER_LEN);

        out.extend(serial);
        out.extend(names);
        out.extend(imports);
        out.extend(exports);
        Bytes::from(out)
    }
}

/// The common case: one `Music` export holding `payload`.
pub fn music_package(version: u16, module_type: &str, payload: &[u8]) -> Bytes {
    let mut builder = PackageBuilder::new(version, module_type);
    let music = builder.import("Music");
    builder.music(music, payload);
    builder.build()
}

/// Recognizable module bytes.
pub fn fake_module(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
