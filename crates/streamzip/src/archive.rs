//! The streaming archive reader.
//!
//! [`ZipStreamReader`] walks an archive one local file header at a time,
//! yielding each entry as an independently readable handle. The shared stream
//! cursor is owned by the reader: before the next header is parsed, whatever
//! the caller left unread of the previous entry is discarded so the cursor
//! lands exactly on the next header.

use std::fs::File;
use std::io::Read;
use std::mem;
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use bzip2::read::BzDecoder;
use flate2::read::DeflateDecoder;
use streamzip_common::BinaryReader;

use crate::cdir::CentralDirectory;
use crate::entry::{decode_dos_datetime, EntryContent, EntryReader, EntryRecord, ZipEntry};
use crate::error::{map_eof, Error, Result};
use crate::source::{SharedStream, Source};
use crate::substream::{SubStream, TrailerMode};
use crate::zip::{
    CentralDirectoryHeader, CompressionMethod, LocalFileHeader, END_OF_ENTRIES_SIGNATURE,
    FLAG_DATA_DESCRIPTOR, FLAG_ENCRYPTED,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Ready,
    Done,
    Poisoned,
}

/// Streaming ZIP archive reader.
///
/// Entries are produced strictly in on-disk order by [`next_entry`]; each
/// [`ZipEntry`] borrows the reader, so the previous entry must be dropped (or
/// closed) before the next one can be requested. The traversal is a single
/// forward pass and cannot be restarted.
///
/// [`next_entry`]: ZipStreamReader::next_entry
///
/// # Example
///
/// ```no_run
/// use std::io::Read;
/// use streamzip::ZipStreamReader;
///
/// let mut archive = ZipStreamReader::open("assets.zip")?;
/// while let Some(mut entry) = archive.next_entry()? {
///     let mut content = Vec::new();
///     entry.read_to_end(&mut content)?;
///     println!("{}: {} bytes", entry.name(), content.len());
/// }
/// # Ok::<(), streamzip::Error>(())
/// ```
pub struct ZipStreamReader<S: Source> {
    stream: SharedStream<S>,
    cdir: Option<CentralDirectory>,
    current: Option<SubStream>,
    state: State,
}

impl ZipStreamReader<File> {
    /// Open an archive file from disk.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(File::open(path)?))
    }
}

impl<S: Source> ZipStreamReader<S> {
    /// Create a reader over any byte source positioned at the start of the
    /// archive.
    pub fn new(source: S) -> Self {
        Self {
            stream: SharedStream::new(source),
            cdir: None,
            current: None,
            state: State::Ready,
        }
    }

    /// Advance to the next entry and yield it, or `None` once the entry
    /// sequence ends.
    ///
    /// Any unread content of the previously yielded entry is discarded first.
    /// After an error the reader is poisoned and every further call fails
    /// with [`Error::Poisoned`].
    pub fn next_entry(&mut self) -> Result<Option<ZipEntry<'_, S>>> {
        match self.state {
            State::Poisoned => return Err(Error::Poisoned),
            State::Done => return Ok(None),
            State::Ready => {}
        }

        let rec = match self.prepare_record() {
            Ok(Some(rec)) => rec,
            Ok(None) => {
                self.state = State::Done;
                return Ok(None);
            }
            Err(e) => {
                self.state = State::Poisoned;
                return Err(e);
            }
        };

        let method = match CompressionMethod::try_from(rec.method) {
            Ok(m) => m,
            Err(code) => {
                self.state = State::Poisoned;
                return Err(Error::UnsupportedCompression(code));
            }
        };
        let mtime = match decode_dos_datetime(rec.dos_datetime) {
            Ok(t) => t,
            Err(e) => {
                self.state = State::Poisoned;
                return Err(e);
            }
        };

        let trailer = if rec.flags & FLAG_DATA_DESCRIPTOR == 0 {
            TrailerMode::None
        } else if rec.zip64 {
            TrailerMode::Bits64
        } else {
            TrailerMode::Bits32
        };

        let sub = self.current.insert(SubStream::new(rec.compressed_size, trailer));
        let raw = EntryReader {
            stream: &mut self.stream,
            sub,
        };
        let content = match method {
            CompressionMethod::Store => EntryContent::Stored(raw),
            CompressionMethod::Deflate | CompressionMethod::Deflate64 => {
                EntryContent::Deflate(DeflateDecoder::new(raw))
            }
            CompressionMethod::Bzip2 => EntryContent::Bzip2(BzDecoder::new(raw)),
        };

        Ok(Some(ZipEntry {
            name: rec.name,
            mtime,
            size: rec.uncompressed_size,
            method,
            produced: 0,
            content,
        }))
    }

    /// Finalize the previous entry and decode the next header, consulting the
    /// central directory once it has been built.
    fn prepare_record(&mut self) -> Result<Option<EntryRecord>> {
        self.finalize_previous()?;
        let offset = self.stream.position();

        if self.cdir.is_some() {
            return self.prepare_from_cache(offset);
        }

        let sig = self
            .stream
            .read_u32::<LittleEndian>()
            .map_err(|e| map_eof(e, "local file header"))?;
        match sig {
            LocalFileHeader::SIGNATURE => {}
            CentralDirectoryHeader::SIGNATURE | END_OF_ENTRIES_SIGNATURE => return Ok(None),
            other => {
                return Err(Error::InvalidSignature {
                    expected: LocalFileHeader::SIGNATURE,
                    actual: other,
                })
            }
        }

        let mut fixed = [0u8; mem::size_of::<LocalFileHeader>()];
        self.stream
            .read_exact(&mut fixed)
            .map_err(|e| map_eof(e, "local file header"))?;
        let header: LocalFileHeader = BinaryReader::new(&fixed).read_struct()?;

        let mut name = vec![0u8; header.file_name_length as usize];
        self.stream
            .read_exact(&mut name)
            .map_err(|e| map_eof(e, "entry name"))?;
        let mut extra = vec![0u8; header.extra_field_length as usize];
        self.stream
            .read_exact(&mut extra)
            .map_err(|e| map_eof(e, "extra field"))?;

        let mut uncompressed = u64::from(header.uncompressed_size);
        let mut compressed = u64::from(header.compressed_size);
        let zip64 = crate::zip::apply_zip64_extra(&extra, &mut uncompressed, &mut compressed, None)?;

        let mut rec = EntryRecord {
            name: String::from_utf8_lossy(&name).into_owned(),
            flags: header.flags,
            method: header.compression_method,
            dos_datetime: header.last_modified,
            compressed_size: compressed,
            uncompressed_size: uncompressed,
            zip64,
            header_offset: offset,
        };

        if rec.flags & FLAG_DATA_DESCRIPTOR != 0 {
            // Streamed entry: the local sizes are placeholders. Build the
            // central directory and substitute its record, which carries the
            // real values.
            let cdir = CentralDirectory::build(&mut self.stream)?;
            let cached = cdir
                .get(offset)
                .cloned()
                .ok_or(Error::MissingCentralRecord(offset))?;
            self.cdir = Some(cdir);
            rec = cached;
        }

        if rec.flags & FLAG_ENCRYPTED != 0 {
            return Err(Error::EncryptionUnsupported);
        }

        Ok(Some(rec))
    }

    /// Resolve the next entry from the central directory cache: pick the
    /// record at or after the cursor, verify its local header and position
    /// the stream at the payload.
    fn prepare_from_cache(&mut self, offset: u64) -> Result<Option<EntryRecord>> {
        let rec = match self.cdir.as_ref().and_then(|c| c.next_at_or_after(offset)) {
            Some(rec) => rec.clone(),
            None => return Ok(None),
        };

        self.stream.seek_to(rec.header_offset)?;
        let sig = self
            .stream
            .read_u32::<LittleEndian>()
            .map_err(|e| map_eof(e, "local file header"))?;
        if sig != LocalFileHeader::SIGNATURE {
            return Err(Error::InvalidSignature {
                expected: LocalFileHeader::SIGNATURE,
                actual: sig,
            });
        }
        let mut fixed = [0u8; mem::size_of::<LocalFileHeader>()];
        self.stream
            .read_exact(&mut fixed)
            .map_err(|e| map_eof(e, "local file header"))?;
        let header: LocalFileHeader = BinaryReader::new(&fixed).read_struct()?;
        // Skip name and extra by the local header's own lengths; they can
        // differ from the central record's.
        self.stream.skip(header.variable_data_size() as u64)?;

        if rec.flags & FLAG_ENCRYPTED != 0 {
            return Err(Error::EncryptionUnsupported);
        }

        Ok(Some(rec))
    }

    /// Make sure the previous entry's payload and trailer are fully consumed
    /// so the cursor sits at the next header.
    fn finalize_previous(&mut self) -> Result<()> {
        if let Some(mut sub) = self.current.take() {
            sub.close(&mut self.stream)?;
        }
        Ok(())
    }
}
