//! ZIP format structures.
//!
//! This module contains the low-level structures for parsing ZIP archives.
//! Each fixed-size record is read after its 4-byte signature, which the
//! caller consumes and checks separately.

pub mod central_dir;
mod eocd;
mod local;

pub use central_dir::CentralDirectoryHeader;
pub use eocd::EocdRecord;
pub use local::LocalFileHeader;

use streamzip_common::BinaryReader;

use crate::{Error, Result};

/// General-purpose bit flag: the entry payload is encrypted.
pub const FLAG_ENCRYPTED: u16 = 1 << 0;

/// General-purpose bit flag: sizes were unknown when the local header was
/// written; a data descriptor follows the payload and the central directory
/// carries the real values.
pub const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;

/// Lead marker that ends the entry sequence (archive extra data record).
pub const END_OF_ENTRIES_SIGNATURE: u32 = 0x0806_4b50;

/// Optional signature preceding a data descriptor.
pub const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x0807_4b50;

/// Data descriptor size for 32-bit entries, not counting the optional signature.
pub const DATA_DESCRIPTOR_SIZE: usize = 12;

/// Data descriptor size for ZIP64 entries, not counting the optional signature.
pub const DATA_DESCRIPTOR_SIZE64: usize = 20;

/// 32-bit size field sentinel meaning "the real value is in the ZIP64 extra field".
pub const ZIP64_SIZE_SENTINEL: u32 = 0xFFFF_FFFF;

/// Compression methods this reader can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CompressionMethod {
    /// No compression (stored).
    Store = 0,
    /// DEFLATE compression (raw stream, no zlib/gzip wrapper).
    Deflate = 8,
    /// Enhanced DEFLATE. Decoded with the same raw inflate filter.
    Deflate64 = 9,
    /// Bzip2 compression.
    Bzip2 = 12,
}

impl TryFrom<u16> for CompressionMethod {
    type Error = u16;

    fn try_from(value: u16) -> std::result::Result<Self, u16> {
        match value {
            0 => Ok(Self::Store),
            8 => Ok(Self::Deflate),
            9 => Ok(Self::Deflate64),
            12 => Ok(Self::Bzip2),
            other => Err(other),
        }
    }
}

/// Walk the extra-field records of a header and apply a ZIP64 (id 1) record's
/// 64-bit values wherever the corresponding 32-bit field carries the
/// `0xFFFFFFFF` sentinel.
///
/// Returns true when either size was overridden, which also decides whether a
/// pending data descriptor uses the 64-bit layout.
pub(crate) fn apply_zip64_extra(
    extra: &[u8],
    uncompressed: &mut u64,
    compressed: &mut u64,
    mut header_offset: Option<&mut u64>,
) -> Result<bool> {
    let mut overrode = false;
    let mut i = 0usize;

    while i + 4 <= extra.len() {
        let mut head = BinaryReader::new(&extra[i..]);
        let id = head.read_u16()?;
        let len = head.read_u16()? as usize;
        let payload = extra
            .get(i + 4..i + 4 + len)
            .ok_or(Error::Truncated("extra field record"))?;

        if id == central_dir::extra_field::ZIP64 {
            let mut fields = BinaryReader::new(payload);
            if *uncompressed == u64::from(ZIP64_SIZE_SENTINEL) {
                *uncompressed = fields.read_u64()?;
                overrode = true;
            }
            if *compressed == u64::from(ZIP64_SIZE_SENTINEL) {
                *compressed = fields.read_u64()?;
                overrode = true;
            }
            if let Some(offset) = header_offset.as_deref_mut() {
                if *offset == u64::from(ZIP64_SIZE_SENTINEL) {
                    *offset = fields.read_u64()?;
                }
            }
        }

        i += 4 + len;
    }

    Ok(overrode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_method_codes() {
        assert_eq!(CompressionMethod::try_from(0), Ok(CompressionMethod::Store));
        assert_eq!(CompressionMethod::try_from(8), Ok(CompressionMethod::Deflate));
        assert_eq!(CompressionMethod::try_from(9), Ok(CompressionMethod::Deflate64));
        assert_eq!(CompressionMethod::try_from(12), Ok(CompressionMethod::Bzip2));
        assert_eq!(CompressionMethod::try_from(14), Err(14));
        assert_eq!(CompressionMethod::try_from(100), Err(100));
    }

    #[test]
    fn test_zip64_extra_overrides_sentinel_sizes() {
        let mut extra = Vec::new();
        extra.extend_from_slice(&1u16.to_le_bytes());
        extra.extend_from_slice(&16u16.to_le_bytes());
        extra.extend_from_slice(&0x1_0000_0005u64.to_le_bytes()); // uncompressed
        extra.extend_from_slice(&0x1_0000_0001u64.to_le_bytes()); // compressed

        let mut uncompressed = u64::from(ZIP64_SIZE_SENTINEL);
        let mut compressed = u64::from(ZIP64_SIZE_SENTINEL);
        let overrode =
            apply_zip64_extra(&extra, &mut uncompressed, &mut compressed, None).unwrap();

        assert!(overrode);
        assert_eq!(uncompressed, 0x1_0000_0005);
        assert_eq!(compressed, 0x1_0000_0001);
    }

    #[test]
    fn test_zip64_extra_ignored_without_sentinel() {
        let mut extra = Vec::new();
        // An unrelated record first, then a ZIP64 record.
        extra.extend_from_slice(&0x5455u16.to_le_bytes());
        extra.extend_from_slice(&1u16.to_le_bytes());
        extra.push(0x03);
        extra.extend_from_slice(&1u16.to_le_bytes());
        extra.extend_from_slice(&16u16.to_le_bytes());
        extra.extend_from_slice(&99u64.to_le_bytes());
        extra.extend_from_slice(&98u64.to_le_bytes());

        let mut uncompressed = 5u64;
        let mut compressed = 5u64;
        let overrode =
            apply_zip64_extra(&extra, &mut uncompressed, &mut compressed, None).unwrap();

        assert!(!overrode);
        assert_eq!(uncompressed, 5);
        assert_eq!(compressed, 5);
    }

    #[test]
    fn test_zip64_extra_truncated_record() {
        let mut extra = Vec::new();
        extra.extend_from_slice(&1u16.to_le_bytes());
        extra.extend_from_slice(&16u16.to_le_bytes());
        extra.extend_from_slice(&[0u8; 4]); // declares 16 bytes, carries 4

        let mut uncompressed = 0u64;
        let mut compressed = 0u64;
        let result = apply_zip64_extra(&extra, &mut uncompressed, &mut compressed, None);

        assert!(matches!(result, Err(Error::Truncated(_))));
    }
}
