//! Archive entries and their readable content.

use std::io::{self, Read};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bzip2::read::BzDecoder;
use flate2::read::DeflateDecoder;

use crate::error::{Error, Result};
use crate::source::{SharedStream, Source};
use crate::substream::SubStream;
use crate::zip::CompressionMethod;

/// Decoded per-entry metadata, produced either from a local file header or
/// from the matching central directory record.
#[derive(Debug, Clone)]
pub(crate) struct EntryRecord {
    pub name: String,
    pub flags: u16,
    pub method: u16,
    /// DOS time in the low word, DOS date in the high word.
    pub dos_datetime: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    /// Sizes came from a ZIP64 extra field.
    pub zip64: bool,
    /// Byte offset of this entry's local file header.
    pub header_offset: u64,
}

/// Raw payload reader borrowing the shared stream and the current substream
/// state; decompression filters are layered on top of this.
pub(crate) struct EntryReader<'a, S: Source> {
    pub(crate) stream: &'a mut SharedStream<S>,
    pub(crate) sub: &'a mut SubStream,
}

impl<'a, S: Source> EntryReader<'a, S> {
    fn finish(self) -> Result<()> {
        self.sub.close(self.stream)
    }
}

impl<'a, S: Source> Read for EntryReader<'a, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.sub.read(self.stream, buf).map_err(io::Error::from)
    }
}

pub(crate) enum EntryContent<'a, S: Source> {
    Stored(EntryReader<'a, S>),
    Deflate(DeflateDecoder<EntryReader<'a, S>>),
    Bzip2(BzDecoder<EntryReader<'a, S>>),
}

/// One archive entry: its decoded metadata and its decompressed content.
///
/// The handle borrows the archive reader, so exactly one entry is live at a
/// time; content is read through the [`Read`] impl. Dropping the handle
/// without reading it is fine - the archive discards the unread payload the
/// next time it advances. [`ZipEntry::close`] does the same eagerly.
pub struct ZipEntry<'a, S: Source> {
    pub(crate) name: String,
    pub(crate) mtime: SystemTime,
    pub(crate) size: u64,
    pub(crate) method: CompressionMethod,
    pub(crate) produced: u64,
    pub(crate) content: EntryContent<'a, S>,
}

impl<'a, S: Source> ZipEntry<'a, S> {
    /// Entry name/path within the archive.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last modification time, decoded from the entry's MS-DOS date/time pair.
    #[inline]
    pub fn last_modified(&self) -> SystemTime {
        self.mtime
    }

    /// Declared uncompressed size in bytes.
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Compression method the payload is stored with.
    #[inline]
    pub fn compression_method(&self) -> CompressionMethod {
        self.method
    }

    /// Check if this entry represents a directory.
    #[inline]
    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }

    /// True once the content has been read to its declared size.
    #[inline]
    pub fn eof(&self) -> bool {
        self.produced >= self.size
    }

    /// Finish with this entry immediately: discard whatever content was not
    /// read and put the archive cursor at the start of the next header.
    pub fn close(self) -> Result<()> {
        let reader = match self.content {
            EntryContent::Stored(r) => r,
            EntryContent::Deflate(d) => d.into_inner(),
            EntryContent::Bzip2(d) => d.into_inner(),
        };
        reader.finish()
    }
}

impl<'a, S: Source> Read for ZipEntry<'a, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = match &mut self.content {
            EntryContent::Stored(r) => r.read(buf)?,
            EntryContent::Deflate(d) => d.read(buf)?,
            EntryContent::Bzip2(d) => d.read(buf)?,
        };
        self.produced += n as u64;
        Ok(n)
    }
}

/// Convert a DOS date/time pair (date in the high word, time in the low word)
/// to a SystemTime.
///
/// DOS date/time format:
/// - Time: bits 0-4 = seconds/2, bits 5-10 = minutes, bits 11-15 = hours
/// - Date: bits 16-20 = day, bits 21-24 = month, bits 25-31 = year-1980
pub(crate) fn decode_dos_datetime(datetime: u32) -> Result<SystemTime> {
    let time = (datetime & 0xFFFF) as u16;
    let date = (datetime >> 16) as u16;

    let year = 1980 + i32::from(date >> 9);
    let month = u32::from((date >> 5) & 0x0F);
    let day = u32::from(date & 0x1F);
    let hour = u32::from(time >> 11);
    let minute = u32::from((time >> 5) & 0x3F);
    let second = u32::from(time & 0x1F) * 2;

    if !(1..=12).contains(&month)
        || !(1..=31).contains(&day)
        || hour > 23
        || minute > 59
        || second > 59
    {
        return Err(Error::InvalidDateTime { date, time });
    }

    // Days since the Unix epoch.
    let mut days = 0i64;
    for y in 1970..year {
        days += if is_leap_year(y) { 366 } else { 365 };
    }

    const DAYS_IN_MONTH: [u32; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
    for m in 1..month {
        days += i64::from(DAYS_IN_MONTH[(m - 1) as usize]);
        if m == 2 && is_leap_year(year) {
            days += 1;
        }
    }
    days += i64::from(day - 1);

    let secs = days * 86400 + i64::from(hour) * 3600 + i64::from(minute) * 60 + i64::from(second);
    UNIX_EPOCH
        .checked_add(Duration::from_secs(secs as u64))
        .ok_or(Error::InvalidDateTime { date, time })
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dos(date: u16, time: u16) -> u32 {
        (u32::from(date) << 16) | u32::from(time)
    }

    #[test]
    fn test_decode_known_timestamp() {
        // 2024-06-15 12:34:56
        let date = ((2024 - 1980) << 9) | (6 << 5) | 15;
        let time = (12 << 11) | (34 << 5) | (56 / 2);
        let decoded = decode_dos_datetime(dos(date, time)).unwrap();

        let expected = 1_718_454_896u64; // date -u -d '2024-06-15 12:34:56' +%s
        let secs = decoded.duration_since(UNIX_EPOCH).unwrap().as_secs();
        assert_eq!(secs, expected);
    }

    #[test]
    fn test_decode_epoch_floor() {
        // 1980-01-01 00:00:00, the earliest representable DOS timestamp.
        let date = (1 << 5) | 1;
        let decoded = decode_dos_datetime(dos(date, 0)).unwrap();
        let secs = decoded.duration_since(UNIX_EPOCH).unwrap().as_secs();
        assert_eq!(secs, 315_532_800);
    }

    #[test]
    fn test_decode_rejects_out_of_range_fields() {
        // Month 0.
        let date = (44 << 9) | 15;
        assert!(matches!(
            decode_dos_datetime(dos(date, 0)),
            Err(Error::InvalidDateTime { .. })
        ));

        // Hour 24.
        let date = (44 << 9) | (6 << 5) | 15;
        let time = 24 << 11;
        assert!(matches!(
            decode_dos_datetime(dos(date, time)),
            Err(Error::InvalidDateTime { .. })
        ));
    }
}
