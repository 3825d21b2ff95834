//! Error types for the streamzip crate.

use std::io;

use thiserror::Error;

/// Errors that can occur while reading a ZIP archive from a stream.
///
/// Every error is fatal for the traversal it occurred in: after a failure the
/// archive reader is poisoned and further calls fail with [`Error::Poisoned`].
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Common library error.
    #[error("{0}")]
    Common(#[from] streamzip_common::Error),

    /// Invalid ZIP magic bytes.
    #[error("invalid signature: expected {expected:#010x}, got {actual:#010x}")]
    InvalidSignature { expected: u32, actual: u32 },

    /// The stream ended in the middle of a fixed-size record.
    #[error("unexpected end of archive while reading {0}")]
    Truncated(&'static str),

    /// Could not find the end of central directory record.
    #[error("could not find end of central directory record")]
    EocdNotFound,

    /// A streamed entry has no matching central directory record.
    #[error("no central directory record for local header at offset {0}")]
    MissingCentralRecord(u64),

    /// The MS-DOS date/time pair does not decode to a valid timestamp.
    #[error("invalid MS-DOS timestamp: date {date:#06x}, time {time:#06x}")]
    InvalidDateTime { date: u16, time: u16 },

    /// Encrypted entries are rejected unconditionally.
    #[error("encrypted entries are not supported")]
    EncryptionUnsupported,

    /// Unsupported compression method.
    #[error("unsupported compression method: {0}")]
    UnsupportedCompression(u16),

    /// The archive failed earlier and cannot be used again.
    #[error("archive is unusable after a previous error")]
    Poisoned,
}

/// Result type for streamzip operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for io::Error {
    fn from(e: Error) -> io::Error {
        match e {
            Error::Io(io) => io,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

/// Turn a premature end-of-stream from `read_exact` into a format error
/// naming the record that was being read.
pub(crate) fn map_eof(e: io::Error, what: &'static str) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::Truncated(what)
    } else {
        Error::Io(e)
    }
}
