//! Bounded view over the shared stream for one entry's compressed payload.
//!
//! A [`SubStream`] hands out exactly the entry's declared compressed size and
//! never lets the shared cursor run past it on its own. The data descriptor
//! that streamed entries append after the payload is consumed separately,
//! exactly once, when the substream is drained or closed.

use std::io::{self, Read};

use streamzip_common::BinaryReader;

use crate::error::{map_eof, Error, Result};
use crate::source::{SharedStream, Source};
use crate::zip::{DATA_DESCRIPTOR_SIGNATURE, DATA_DESCRIPTOR_SIZE, DATA_DESCRIPTOR_SIZE64};

/// Whether a data descriptor follows the payload, and in which layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TrailerMode {
    None,
    Bits32,
    Bits64,
}

/// State of one entry's bounded payload view.
pub(crate) struct SubStream {
    /// Compressed bytes not yet pulled from the shared stream.
    remaining: u64,
    /// Bytes pulled from the shared stream but not yet handed out.
    buffer: Vec<u8>,
    trailer: TrailerMode,
}

impl SubStream {
    pub(crate) fn new(length: u64, trailer: TrailerMode) -> Self {
        Self {
            remaining: length,
            buffer: Vec::new(),
            trailer,
        }
    }

    /// True once every declared byte has been pulled and handed out.
    pub(crate) fn eof(&self) -> bool {
        self.buffer.is_empty() && self.remaining == 0
    }

    /// Read up to `buf.len()` bytes of payload.
    ///
    /// Reads from the shared stream are coalesced until the request is
    /// satisfied or the payload is exhausted. A `WouldBlock` from a
    /// non-blocking source returns whatever is buffered so far (possibly
    /// nothing) - that is a short read, not end-of-data. A zero-length read
    /// while bytes are still owed means the stream was cut short and is fatal.
    pub(crate) fn read<S: Source>(
        &mut self,
        stream: &mut SharedStream<S>,
        buf: &mut [u8],
    ) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        while self.buffer.len() < buf.len() && self.remaining > 0 {
            let want = ((buf.len() - self.buffer.len()) as u64).min(self.remaining) as usize;
            let start = self.buffer.len();
            self.buffer.resize(start + want, 0);
            match stream.read(&mut self.buffer[start..]) {
                Ok(0) => {
                    self.buffer.truncate(start);
                    return Err(premature_end());
                }
                Ok(n) => {
                    self.buffer.truncate(start + n);
                    self.remaining -= n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    self.buffer.truncate(start);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.buffer.truncate(start);
                    break;
                }
                Err(e) => {
                    self.buffer.truncate(start);
                    return Err(Error::Io(e));
                }
            }
        }

        let n = buf.len().min(self.buffer.len());
        buf[..n].copy_from_slice(&self.buffer[..n]);
        self.buffer.drain(..n);
        Ok(n)
    }

    /// Pull every remaining payload byte into the internal buffer, then
    /// consume the pending data descriptor. The buffered bytes stay readable.
    ///
    /// Unlike [`SubStream::read`], a `WouldBlock` is retried here rather than
    /// surfaced: the drain cannot report partial progress, and a short read
    /// from a non-blocking source is not a failure.
    pub(crate) fn drain_all<S: Source>(&mut self, stream: &mut SharedStream<S>) -> Result<()> {
        while self.remaining > 0 {
            let want = self.remaining.min(64 * 1024) as usize;
            let start = self.buffer.len();
            self.buffer.resize(start + want, 0);
            match stream.read(&mut self.buffer[start..]) {
                Ok(0) => {
                    self.buffer.truncate(start);
                    return Err(premature_end());
                }
                Ok(n) => {
                    self.buffer.truncate(start + n);
                    self.remaining -= n as u64;
                }
                Err(e)
                    if e.kind() == io::ErrorKind::Interrupted
                        || e.kind() == io::ErrorKind::WouldBlock =>
                {
                    self.buffer.truncate(start);
                }
                Err(e) => {
                    self.buffer.truncate(start);
                    return Err(Error::Io(e));
                }
            }
        }
        self.consume_trailer(stream)
    }

    /// Discard whatever was not read: seek past the leftover payload when the
    /// source allows it, drain it otherwise, then consume the pending data
    /// descriptor. Idempotent.
    pub(crate) fn close<S: Source>(&mut self, stream: &mut SharedStream<S>) -> Result<()> {
        if self.remaining > 0 {
            if stream.is_seekable() {
                let target = stream.position() + self.remaining;
                stream.seek_to(target)?;
                self.remaining = 0;
            } else {
                self.drain_all(stream)?;
            }
        }
        self.buffer.clear();
        self.consume_trailer(stream)
    }

    /// Consume the data descriptor, at most once. The descriptor's leading
    /// signature is optional on disk; when present it is skipped along with
    /// the four bytes it displaces.
    fn consume_trailer<S: Source>(&mut self, stream: &mut SharedStream<S>) -> Result<()> {
        let size = match self.trailer {
            TrailerMode::None => return Ok(()),
            TrailerMode::Bits32 => DATA_DESCRIPTOR_SIZE,
            TrailerMode::Bits64 => DATA_DESCRIPTOR_SIZE64,
        };
        self.trailer = TrailerMode::None;

        let mut block = [0u8; DATA_DESCRIPTOR_SIZE64];
        stream
            .read_exact(&mut block[..size])
            .map_err(|e| map_eof(e, "data descriptor"))?;

        if BinaryReader::new(&block[..size]).read_u32()? == DATA_DESCRIPTOR_SIGNATURE {
            let mut displaced = [0u8; 4];
            stream
                .read_exact(&mut displaced)
                .map_err(|e| map_eof(e, "data descriptor"))?;
        }
        Ok(())
    }
}

fn premature_end() -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        "entry payload ended before its declared size",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{Pipe, Source};
    use std::io::Cursor;

    fn shared(bytes: &[u8]) -> SharedStream<Cursor<Vec<u8>>> {
        SharedStream::new(Cursor::new(bytes.to_vec()))
    }

    /// Unseekable reader that fails with the given error kind once, then
    /// reads normally.
    struct Flaky<R: Read> {
        inner: R,
        hiccup: Option<io::ErrorKind>,
    }

    impl<R: Read> Flaky<R> {
        fn new(inner: R, kind: io::ErrorKind) -> Self {
            Self {
                inner,
                hiccup: Some(kind),
            }
        }
    }

    impl<R: Read> Read for Flaky<R> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.hiccup.take() {
                Some(kind) => Err(io::Error::from(kind)),
                None => self.inner.read(buf),
            }
        }
    }

    impl<R: Read> Source for Flaky<R> {
        fn is_seekable(&self) -> bool {
            false
        }

        fn seek(&mut self, _pos: io::SeekFrom) -> io::Result<u64> {
            Err(io::Error::from(io::ErrorKind::Unsupported))
        }
    }

    #[test]
    fn test_read_stops_at_bound() {
        let mut stream = shared(b"hello, trailing bytes");
        let mut sub = SubStream::new(5, TrailerMode::None);

        let mut buf = [0u8; 16];
        assert_eq!(sub.read(&mut stream, &mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"hello");
        assert!(sub.eof());
        assert_eq!(sub.read(&mut stream, &mut buf).unwrap(), 0);
        assert_eq!(stream.position(), 5);
    }

    #[test]
    fn test_eof_only_after_last_byte() {
        let mut stream = shared(b"hello");
        let mut sub = SubStream::new(5, TrailerMode::None);

        let mut buf = [0u8; 4];
        assert_eq!(sub.read(&mut stream, &mut buf).unwrap(), 4);
        assert!(!sub.eof());
        assert_eq!(sub.read(&mut stream, &mut buf).unwrap(), 1);
        assert!(sub.eof());
    }

    #[test]
    fn test_premature_end_is_fatal() {
        let mut stream = shared(b"ab");
        let mut sub = SubStream::new(5, TrailerMode::None);

        let mut buf = [0u8; 5];
        assert!(sub.read(&mut stream, &mut buf).is_err());
    }

    #[test]
    fn test_would_block_is_a_short_read_not_eof() {
        let mut stream = SharedStream::new(Flaky::new(
            Cursor::new(b"hello".to_vec()),
            io::ErrorKind::WouldBlock,
        ));
        let mut sub = SubStream::new(5, TrailerMode::None);

        let mut buf = [0u8; 5];
        // Nothing was buffered before the WouldBlock, so the read comes back
        // empty without being an error or end-of-data.
        assert_eq!(sub.read(&mut stream, &mut buf).unwrap(), 0);
        assert!(!sub.eof());

        assert_eq!(sub.read(&mut stream, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");
        assert!(sub.eof());
    }

    #[test]
    fn test_interrupted_read_is_retried() {
        let mut stream = SharedStream::new(Flaky::new(
            Cursor::new(b"hello".to_vec()),
            io::ErrorKind::Interrupted,
        ));
        let mut sub = SubStream::new(5, TrailerMode::None);

        let mut buf = [0u8; 5];
        assert_eq!(sub.read(&mut stream, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn test_close_retries_would_block_while_draining() {
        let mut stream = SharedStream::new(Flaky::new(
            Cursor::new(b"0123456789NEXT".to_vec()),
            io::ErrorKind::WouldBlock,
        ));
        let mut sub = SubStream::new(10, TrailerMode::None);

        sub.close(&mut stream).unwrap();
        assert_eq!(stream.position(), 10);

        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"NEXT");
    }

    #[test]
    fn test_close_discards_leftover_by_seeking() {
        let mut stream = shared(b"0123456789NEXT");
        let mut sub = SubStream::new(10, TrailerMode::None);

        let mut buf = [0u8; 3];
        sub.read(&mut stream, &mut buf).unwrap();
        sub.close(&mut stream).unwrap();
        assert_eq!(stream.position(), 10);

        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"NEXT");
    }

    #[test]
    fn test_close_drains_unseekable_sources() {
        let mut stream = SharedStream::new(Pipe(Cursor::new(b"0123456789NEXT".to_vec())));
        let mut sub = SubStream::new(10, TrailerMode::None);

        sub.close(&mut stream).unwrap();
        assert_eq!(stream.position(), 10);

        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"NEXT");
    }

    #[test]
    fn test_trailer_32_without_signature() {
        let mut payload = b"data".to_vec();
        payload.extend_from_slice(&[0u8; 12]); // crc + sizes
        payload.extend_from_slice(b"NEXT");
        let mut stream = shared(&payload);
        let mut sub = SubStream::new(4, TrailerMode::Bits32);

        sub.close(&mut stream).unwrap();
        assert_eq!(stream.position(), 4 + 12);
    }

    #[test]
    fn test_trailer_32_with_optional_signature() {
        let mut payload = b"data".to_vec();
        payload.extend_from_slice(&DATA_DESCRIPTOR_SIGNATURE.to_le_bytes());
        payload.extend_from_slice(&[0u8; 12]);
        payload.extend_from_slice(b"NEXT");
        let mut stream = shared(&payload);
        let mut sub = SubStream::new(4, TrailerMode::Bits32);

        sub.close(&mut stream).unwrap();
        assert_eq!(stream.position(), 4 + 4 + 12);
    }

    #[test]
    fn test_trailer_64_consumes_twenty_bytes() {
        let mut payload = b"data".to_vec();
        payload.extend_from_slice(&[0u8; 20]); // crc + 64-bit sizes
        payload.extend_from_slice(b"NEXT");
        let mut stream = shared(&payload);
        let mut sub = SubStream::new(4, TrailerMode::Bits64);

        sub.close(&mut stream).unwrap();
        assert_eq!(stream.position(), 4 + 20);
    }

    #[test]
    fn test_trailer_consumed_once() {
        let mut payload = b"data".to_vec();
        payload.extend_from_slice(&[0u8; 12]);
        let mut stream = shared(&payload);
        let mut sub = SubStream::new(4, TrailerMode::Bits32);

        sub.close(&mut stream).unwrap();
        let end = stream.position();
        sub.close(&mut stream).unwrap();
        assert_eq!(stream.position(), end);
    }

    #[test]
    fn test_drain_all_keeps_bytes_readable() {
        let mut payload = b"payload".to_vec();
        payload.extend_from_slice(&[0u8; 12]);
        let mut stream = shared(&payload);
        let mut sub = SubStream::new(7, TrailerMode::Bits32);

        sub.drain_all(&mut stream).unwrap();
        assert_eq!(stream.position(), 7 + 12);

        let mut buf = [0u8; 7];
        assert_eq!(sub.read(&mut stream, &mut buf).unwrap(), 7);
        assert_eq!(&buf, b"payload");
        assert!(sub.eof());
    }
}
