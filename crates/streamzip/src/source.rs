//! Byte-stream sources an archive can be read from.
//!
//! The reader only ever consumes its input strictly forward. Seeking is an
//! optional capability: it lets the reader discard unread payload cheaply and
//! locate the central directory. Sources that cannot seek still work for
//! purely sequential archives; when a streamed (data descriptor) entry forces
//! a central directory lookup, the rest of an unseekable source is copied
//! into a seekable temporary and reading continues from there.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

use tempfile::SpooledTempFile;

/// Spilled streams stay in memory up to this size before moving to disk.
const SPOOL_MEMORY_LIMIT: usize = 16 * 1024 * 1024;

/// A byte stream an archive can be read from.
pub trait Source: Read {
    /// Whether [`Source::seek`] is usable on this source.
    fn is_seekable(&self) -> bool;

    /// Reposition the stream. Sources that report `is_seekable() == false`
    /// return `ErrorKind::Unsupported`.
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64>;
}

impl Source for File {
    fn is_seekable(&self) -> bool {
        true
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Seek::seek(self, pos)
    }
}

impl<T: AsRef<[u8]>> Source for io::Cursor<T> {
    fn is_seekable(&self) -> bool {
        true
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Seek::seek(self, pos)
    }
}

impl Source for SpooledTempFile {
    fn is_seekable(&self) -> bool {
        true
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Seek::seek(self, pos)
    }
}

impl<S: Source + ?Sized> Source for Box<S> {
    fn is_seekable(&self) -> bool {
        (**self).is_seekable()
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        (**self).seek(pos)
    }
}

/// Declares any reader unseekable (pipes, sockets, stdin).
pub struct Pipe<R: Read>(pub R);

impl<R: Read> Read for Pipe<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl<R: Read> Source for Pipe<R> {
    fn is_seekable(&self) -> bool {
        false
    }

    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "source does not support seeking",
        ))
    }
}

/// The shared underlying stream, addressed in the coordinates of the original
/// byte stream.
///
/// When an unseekable source is spooled into a temporary file, byte 0 of the
/// spool corresponds to byte `shift` of the original stream; positions keep
/// their original meaning so central directory offsets stay valid.
pub(crate) struct SharedStream<S: Source> {
    inner: Inner<S>,
    /// Absolute position, in original-stream coordinates.
    pos: u64,
    /// Original offset of byte 0 of the spool (0 while unspooled).
    shift: u64,
}

enum Inner<S: Source> {
    Direct(S),
    Spooled(SpooledTempFile),
}

impl<S: Source> SharedStream<S> {
    pub(crate) fn new(source: S) -> Self {
        Self {
            inner: Inner::Direct(source),
            pos: 0,
            shift: 0,
        }
    }

    /// Current absolute position.
    pub(crate) fn position(&self) -> u64 {
        self.pos
    }

    /// Original offset of the first byte still reachable: 0 until the source
    /// is spooled, the spool's starting offset afterwards.
    pub(crate) fn spool_start(&self) -> u64 {
        self.shift
    }

    pub(crate) fn is_seekable(&self) -> bool {
        match &self.inner {
            Inner::Direct(s) => s.is_seekable(),
            Inner::Spooled(_) => true,
        }
    }

    /// Seek to an absolute position in original-stream coordinates.
    pub(crate) fn seek_to(&mut self, pos: u64) -> io::Result<u64> {
        match &mut self.inner {
            Inner::Direct(s) => {
                s.seek(SeekFrom::Start(pos))?;
            }
            Inner::Spooled(f) => {
                let rel = pos.checked_sub(self.shift).ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "seek before the start of the spooled region",
                    )
                })?;
                Seek::seek(f, SeekFrom::Start(rel))?;
            }
        }
        self.pos = pos;
        Ok(pos)
    }

    /// Total stream length, in original-stream coordinates. Moves the cursor
    /// to the end.
    pub(crate) fn len(&mut self) -> io::Result<u64> {
        let end = match &mut self.inner {
            Inner::Direct(s) => s.seek(SeekFrom::End(0))?,
            Inner::Spooled(f) => self.shift + Seek::seek(f, SeekFrom::End(0))?,
        };
        self.pos = end;
        Ok(end)
    }

    /// Advance past `n` bytes without exposing them, by seeking when the
    /// source allows it and by reading into a scratch buffer otherwise.
    pub(crate) fn skip(&mut self, n: u64) -> io::Result<()> {
        if n == 0 {
            return Ok(());
        }
        if self.is_seekable() {
            let target = self.pos + n;
            self.seek_to(target)?;
            return Ok(());
        }

        let mut left = n;
        let mut scratch = [0u8; 8192];
        while left > 0 {
            let want = left.min(scratch.len() as u64) as usize;
            let got = self.read(&mut scratch[..want])?;
            if got == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream ended while discarding entry payload",
                ));
            }
            left -= got as u64;
        }
        Ok(())
    }

    /// Copy the rest of an unseekable source into a seekable temporary and
    /// switch to reading from it. No-op when already spooled.
    pub(crate) fn spool(&mut self) -> io::Result<()> {
        let mut spool = SpooledTempFile::new(SPOOL_MEMORY_LIMIT);
        match &mut self.inner {
            Inner::Direct(s) => {
                io::copy(s, &mut spool)?;
            }
            Inner::Spooled(_) => return Ok(()),
        }
        Seek::seek(&mut spool, SeekFrom::Start(0))?;
        self.shift = self.pos;
        self.inner = Inner::Spooled(spool);
        Ok(())
    }
}

impl<S: Source> Read for SharedStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = match &mut self.inner {
            Inner::Direct(s) => s.read(buf)?,
            Inner::Spooled(f) => f.read(buf)?,
        };
        self.pos += n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_pipe_is_not_seekable() {
        let mut pipe = Pipe(Cursor::new(vec![1u8, 2, 3]));
        assert!(!pipe.is_seekable());
        assert!(Source::seek(&mut pipe, SeekFrom::Start(0)).is_err());
    }

    #[test]
    fn test_skip_reads_through_unseekable_sources() {
        let mut stream = SharedStream::new(Pipe(Cursor::new(b"abcdefgh".to_vec())));
        stream.skip(5).unwrap();
        assert_eq!(stream.position(), 5);

        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"fgh");
    }

    #[test]
    fn test_spool_preserves_original_coordinates() {
        let mut stream = SharedStream::new(Pipe(Cursor::new(b"0123456789".to_vec())));
        let mut head = [0u8; 4];
        stream.read_exact(&mut head).unwrap();

        stream.spool().unwrap();
        assert!(stream.is_seekable());
        assert_eq!(stream.position(), 4);
        assert_eq!(stream.len().unwrap(), 10);

        stream.seek_to(6).unwrap();
        let mut tail = Vec::new();
        stream.read_to_end(&mut tail).unwrap();
        assert_eq!(tail, b"6789");

        // The consumed prefix is gone; seeking before it must fail.
        assert!(stream.seek_to(2).is_err());
    }
}
