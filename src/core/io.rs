//! Sequential image output and retrying byte transfer helpers

use crate::error::{PackError, Result};
use std::io::{ErrorKind, Read, Write};

/// Append-only image stream
///
/// The sink owns the running `bytes_used` counter; it is the only place the
/// next write offset comes from.
pub trait OutputSink {
    /// Append all of `data` or fail
    fn append(&mut self, data: &[u8]) -> Result<()>;

    /// Offset the next append will land at
    fn bytes_used(&self) -> u64;
}

/// [`OutputSink`] over any [`Write`]
#[derive(Debug)]
pub struct ImageWriter<W: Write> {
    inner: W,
    bytes_used: u64,
}

impl<W: Write> ImageWriter<W> {
    /// Start writing at offset 0
    pub fn new(inner: W) -> Self {
        Self::with_offset(inner, 0)
    }

    /// Start counting at `offset`, for streams that already hold a header
    pub fn with_offset(inner: W, offset: u64) -> Self {
        ImageWriter {
            inner,
            bytes_used: offset,
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Flush and hand back the underlying writer
    pub fn into_inner(mut self) -> Result<W> {
        self.inner.flush().map_err(PackError::Output)?;
        Ok(self.inner)
    }
}

impl<W: Write> OutputSink for ImageWriter<W> {
    fn append(&mut self, data: &[u8]) -> Result<()> {
        let written = write_retry(&mut self.inner, data).map_err(PackError::Output)?;
        if written < data.len() {
            return Err(PackError::TruncatedWrite {
                expected: data.len(),
                written,
            });
        }

        self.bytes_used += written as u64;
        Ok(())
    }

    fn bytes_used(&self) -> u64 {
        self.bytes_used
    }
}

/// Write as much of `data` as the writer accepts
///
/// Retries on `Interrupted` and short writes; stops early only when the
/// writer accepts zero bytes. Returns the number of bytes written.
pub fn write_retry<W: Write + ?Sized>(out: &mut W, data: &[u8]) -> std::io::Result<usize> {
    let mut done = 0;

    while done < data.len() {
        match out.write(&data[done..]) {
            Ok(0) => break,
            Ok(n) => done += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(done)
}

/// Fill `buf` from `input`, stopping early only at end of file
///
/// Returns the number of bytes read.
pub fn read_retry<R: Read + ?Sized>(input: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut done = 0;

    while done < buf.len() {
        match input.read(&mut buf[done..]) {
            Ok(0) => break,
            Ok(n) => done += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Accepts at most `chunk` bytes per call and `limit` bytes in total
    struct Trickle {
        data: Vec<u8>,
        chunk: usize,
        limit: usize,
    }

    impl Write for Trickle {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let room = self.limit - self.data.len();
            let n = buf.len().min(self.chunk).min(room);
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_append_advances_bytes_used() {
        let mut sink = ImageWriter::new(Vec::new());
        sink.append(b"hello").unwrap();
        sink.append(b" world").unwrap();

        assert_eq!(sink.bytes_used(), 11);
        assert_eq!(sink.into_inner().unwrap(), b"hello world");
    }

    #[test]
    fn test_with_offset() {
        let mut sink = ImageWriter::with_offset(Vec::new(), 96);
        sink.append(&[1, 2, 3]).unwrap();
        assert_eq!(sink.bytes_used(), 99);
        assert_eq!(sink.get_ref().len(), 3);
    }

    #[test]
    fn test_short_writes_are_retried() {
        let out = Trickle {
            data: Vec::new(),
            chunk: 3,
            limit: usize::MAX,
        };
        let mut sink = ImageWriter::new(out);
        sink.append(&[7u8; 10]).unwrap();

        assert_eq!(sink.bytes_used(), 10);
        assert_eq!(sink.get_ref().data, vec![7u8; 10]);
    }

    #[test]
    fn test_truncated_write_is_fatal() {
        let out = Trickle {
            data: Vec::new(),
            chunk: 4,
            limit: 6,
        };
        let mut sink = ImageWriter::new(out);
        let err = sink.append(&[1u8; 10]).unwrap_err();

        assert!(matches!(
            err,
            PackError::TruncatedWrite {
                expected: 10,
                written: 6
            }
        ));
        assert_eq!(sink.bytes_used(), 0);
    }

    #[test]
    fn test_read_retry_stops_at_eof() {
        let mut input = Cursor::new(vec![5u8; 3]);
        let mut buf = [0u8; 8];
        assert_eq!(read_retry(&mut input, &mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[5, 5, 5]);
    }
}
