//! Central directory location and parsing.
//!
//! The central directory is only consulted when an entry's local header
//! cannot be trusted (streamed entries with general-purpose bit 3 set). It is
//! built at most once per archive: the EOCD record is found by scanning
//! backward from the end of the stream, the directory is parsed into a map
//! keyed by each entry's local-header offset, and the cursor is restored so
//! the sequential traversal continues unaffected.

use std::collections::BTreeMap;
use std::io::Read;
use std::mem;

use byteorder::{LittleEndian, ReadBytesExt};
use memchr::memmem;
use streamzip_common::BinaryReader;

use crate::entry::EntryRecord;
use crate::error::{map_eof, Error, Result};
use crate::source::{SharedStream, Source};
use crate::zip::{apply_zip64_extra, CentralDirectoryHeader, EocdRecord};

/// Backward-scan window for the EOCD signature.
const SCAN_WINDOW: u64 = 1024;

/// Step between windows. Deliberately smaller than the window so a signature
/// straddling a window boundary cannot be missed.
const SCAN_STEP: u64 = 1008;

/// The parsed central directory, keyed by local-header byte offset.
pub(crate) struct CentralDirectory {
    entries: BTreeMap<u64, EntryRecord>,
}

impl CentralDirectory {
    /// Locate the EOCD record and parse the full central directory.
    ///
    /// Unseekable sources are first spooled into a seekable temporary; the
    /// archive keeps reading from the spool afterwards. The stream position
    /// is restored before returning.
    pub(crate) fn build<S: Source>(stream: &mut SharedStream<S>) -> Result<Self> {
        if !stream.is_seekable() {
            stream.spool()?;
        }
        let saved = stream.position();

        let eocd = Self::locate_eocd(stream)?;
        let entries = Self::parse_directory(stream, &eocd)?;

        stream.seek_to(saved)?;
        Ok(Self { entries })
    }

    /// Look up the record whose local header sits exactly at `offset`.
    pub(crate) fn get(&self, offset: u64) -> Option<&EntryRecord> {
        self.entries.get(&offset)
    }

    /// The record with the smallest local-header offset at or after `offset`.
    pub(crate) fn next_at_or_after(&self, offset: u64) -> Option<&EntryRecord> {
        self.entries.range(offset..).next().map(|(_, rec)| rec)
    }

    fn locate_eocd<S: Source>(stream: &mut SharedStream<S>) -> Result<EocdRecord> {
        let end = stream.len()?;
        // Bytes before the spooled region are gone and cannot be scanned.
        let floor = stream.spool_start();
        let mut window = vec![0u8; SCAN_WINDOW as usize];
        let mut hi = end;

        let eocd_pos = loop {
            let lo = hi.saturating_sub(SCAN_WINDOW).max(floor);
            if lo >= hi {
                return Err(Error::EocdNotFound);
            }
            let size = (hi - lo) as usize;
            stream.seek_to(lo)?;
            stream
                .read_exact(&mut window[..size])
                .map_err(|e| map_eof(e, "end of central directory scan"))?;

            if let Some(i) = memmem::rfind(&window[..size], &EocdRecord::MAGIC) {
                break lo + i as u64;
            }
            if lo == floor {
                return Err(Error::EocdNotFound);
            }
            hi -= SCAN_STEP;
        };

        stream.seek_to(eocd_pos + 4)?;
        let mut fixed = [0u8; mem::size_of::<EocdRecord>()];
        stream
            .read_exact(&mut fixed)
            .map_err(|e| map_eof(e, "end of central directory record"))?;
        Ok(BinaryReader::new(&fixed).read_struct()?)
    }

    fn parse_directory<S: Source>(
        stream: &mut SharedStream<S>,
        eocd: &EocdRecord,
    ) -> Result<BTreeMap<u64, EntryRecord>> {
        let cd_size = u64::from(eocd.central_dir_size);
        let cd_offset = u64::from(eocd.central_dir_offset);
        stream.seek_to(cd_offset)?;

        let mut entries = BTreeMap::new();
        let mut consumed = 0u64;

        while consumed < cd_size {
            let sig = stream
                .read_u32::<LittleEndian>()
                .map_err(|e| map_eof(e, "central directory record"))?;
            if sig != CentralDirectoryHeader::SIGNATURE {
                return Err(Error::InvalidSignature {
                    expected: CentralDirectoryHeader::SIGNATURE,
                    actual: sig,
                });
            }

            let mut fixed = [0u8; mem::size_of::<CentralDirectoryHeader>()];
            stream
                .read_exact(&mut fixed)
                .map_err(|e| map_eof(e, "central directory record"))?;
            let header: CentralDirectoryHeader = BinaryReader::new(&fixed).read_struct()?;

            let name_len = header.file_name_length as usize;
            let extra_len = header.extra_field_length as usize;
            let comment_len = header.file_comment_length as usize;

            let mut name = vec![0u8; name_len];
            stream
                .read_exact(&mut name)
                .map_err(|e| map_eof(e, "central directory entry name"))?;
            let mut extra = vec![0u8; extra_len];
            stream
                .read_exact(&mut extra)
                .map_err(|e| map_eof(e, "central directory extra field"))?;
            stream.skip(comment_len as u64)?;

            let mut uncompressed = u64::from(header.uncompressed_size);
            let mut compressed = u64::from(header.compressed_size);
            let mut header_offset = u64::from(header.local_header_offset);
            let zip64 = apply_zip64_extra(
                &extra,
                &mut uncompressed,
                &mut compressed,
                Some(&mut header_offset),
            )?;

            entries.insert(
                header_offset,
                EntryRecord {
                    name: String::from_utf8_lossy(&name).into_owned(),
                    flags: header.flags,
                    method: header.compression_method,
                    dos_datetime: header.last_modified,
                    compressed_size: compressed,
                    uncompressed_size: uncompressed,
                    zip64,
                    header_offset,
                },
            );

            consumed += (CentralDirectoryHeader::SIZE + header.variable_data_size()) as u64;
        }

        Ok(entries)
    }
}
