//! Bounds-checked cursor over package bytes.
//!
//! ## Compact Indices
//!
//! Packages store most integers as variable-length signed "compact indices":
//!
//! ```text
//! byte 0:   S C d d d d d d      S = sign, C = another byte follows
//! byte 1-4: C d d d d d d d      7 more data bits each, least significant first
//! ```
//!
//! At most five bytes are read, whatever the continue bits say.

use crate::error::{ContainerError, Result};

const SIGN_BIT: u8 = 0x80;
const FIRST_CONTINUE_BIT: u8 = 0x40;
const CONTINUE_BIT: u8 = 0x80;
const MAX_INDEX_BYTES: usize = 5;

/// Read position within a package.
#[derive(Debug, Clone)]
pub struct PackageReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PackageReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Jump to an absolute offset. Offsets past the end fail on the next read.
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.take(len).map(|_| ())
    }

    pub fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let slice = self
            .pos
            .checked_add(len)
            .and_then(|end| self.data.get(self.pos..end))
            .ok_or_else(|| {
                ContainerError::Truncated(format!(
                    "need {} bytes at offset {}, have {}",
                    len,
                    self.pos,
                    self.data.len()
                ))
            })?;
        self.pos += len;
        Ok(slice)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn u16_le(&mut self) -> Result<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn u32_le(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read one compact index.
    pub fn compact_index(&mut self) -> Result<i64> {
        let first = self.u8()?;
        let negative = first & SIGN_BIT != 0;
        let mut value = i64::from(first & 0x3f);
        let mut more = first & FIRST_CONTINUE_BIT != 0;

        for i in 1..MAX_INDEX_BYTES {
            if !more {
                break;
            }
            let byte = self.u8()?;
            value |= i64::from(byte & 0x7f) << (6 + 7 * (i - 1));
            more = byte & CONTINUE_BIT != 0;
        }

        Ok(if negative { -value } else { value })
    }

    /// Read one name table entry.
    ///
    /// Before version 64 names are NUL-terminated; from 64 on they carry a
    /// length byte that counts the terminating NUL. Both are followed by
    /// 32 bits of flags.
    pub fn name(&mut self, version: u16) -> Result<String> {
        let start = self.pos;

        let raw = if version < 64 {
            let rest = self.data.get(start..).unwrap_or_default();
            let len = rest
                .iter()
                .position(|&b| b == 0)
                .ok_or(ContainerError::InvalidName(start))?;
            let raw = self.take(len)?;
            self.skip(1)?;
            raw
        } else {
            let len = usize::from(self.u8()?);
            let raw = self.take(len).map_err(|_| ContainerError::InvalidName(start))?;
            match raw.split_last() {
                Some((0, text)) => text,
                _ => raw,
            }
        };

        self.skip(4)?;
        Ok(String::from_utf8_lossy(raw).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(bytes: &[u8]) -> i64 {
        PackageReader::new(bytes).compact_index().unwrap()
    }

    #[test]
    fn test_single_byte_indices() {
        assert_eq!(index(&[0x00]), 0);
        assert_eq!(index(&[0x05]), 5);
        assert_eq!(index(&[0x3f]), 63);
        assert_eq!(index(&[0x81]), -1);
        assert_eq!(index(&[0xbf]), -63);
    }

    #[test]
    fn test_multi_byte_indices() {
        // 64 = 0b1_000000: low six bits 0, continue, then 1
        assert_eq!(index(&[0x40, 0x01]), 64);
        assert_eq!(index(&[0xc0, 0x01]), -64);
        // 8192 = 1 << 13: needs a third byte
        assert_eq!(index(&[0x40, 0x80, 0x01]), 8192);

        let mut reader = PackageReader::new(&[0x7f, 0xff, 0xff, 0xff, 0x7f, 0x2a]);
        assert_eq!(reader.compact_index().unwrap(), (1 << 34) - 1);
        assert_eq!(reader.position(), 5);
    }

    #[test]
    fn test_index_stops_after_five_bytes() {
        // Continue bit set on the fifth byte is ignored
        let mut reader = PackageReader::new(&[0x41, 0x80, 0x80, 0x80, 0x80, 0x2a]);
        assert_eq!(reader.compact_index().unwrap(), 1);
        assert_eq!(reader.position(), 5);
        assert_eq!(reader.u8().unwrap(), 0x2a);
    }

    #[test]
    fn test_truncated_index() {
        let err = PackageReader::new(&[0x40]).compact_index().unwrap_err();
        assert!(matches!(err, ContainerError::Truncated(_)));
    }

    #[test]
    fn test_names_before_and_after_version_64() {
        let old = b"Music\0\x00\x00\x00\x00it\0\x10\x00\x00\x00";
        let mut reader = PackageReader::new(old);
        assert_eq!(reader.name(61).unwrap(), "Music");
        assert_eq!(reader.name(61).unwrap(), "it");
        assert_eq!(reader.position(), old.len());

        let new = b"\x06Music\0\x00\x00\x00\x00\x02s3\x00\x00\x00\x00";
        let mut reader = PackageReader::new(new);
        assert_eq!(reader.name(68).unwrap(), "Music");
        // No trailing NUL is fine too
        assert_eq!(reader.name(68).unwrap(), "s3");
        assert_eq!(reader.position(), new.len());
    }

    #[test]
    fn test_unterminated_name() {
        let err = PackageReader::new(b"Music").name(61).unwrap_err();
        assert!(matches!(err, ContainerError::InvalidName(0)));

        let err = PackageReader::new(b"\x09Mus").name(69).unwrap_err();
        assert!(matches!(err, ContainerError::InvalidName(0)));
    }

    #[test]
    fn test_seek_past_end() {
        let mut reader = PackageReader::new(&[1, 2, 3]);
        reader.seek(10);
        assert!(matches!(reader.u8(), Err(ContainerError::Truncated(_))));
    }
}
