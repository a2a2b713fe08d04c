//! Byte-stream boundary: blocking sequential read/write with offset tracking.

use crate::error::Result;
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};

/// Input side of the stream boundary.
pub trait ByteReader {
    /// Read exactly `n` bytes; a short read fails with `UnexpectedEof`.
    fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>>;
    /// Current offset, relative to where the reader started.
    fn offset(&self) -> u64;
    /// Move the read position by `delta` bytes.
    fn seek_relative(&mut self, delta: i64) -> Result<()>;
    fn is_eof(&mut self) -> Result<bool>;
}

/// Output side of the stream boundary.
pub trait ByteWriter {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()>;
    /// Number of bytes written so far.
    fn offset(&self) -> u64;
    fn flush(&mut self) -> Result<()>;
}

/// [`ByteReader`] over any `Read + Seek` source.
#[derive(Debug)]
pub struct Reader<R> {
    inner: R,
    pos: u64,
}

impl<R: Read + Seek> Reader<R> {
    pub fn new(inner: R) -> Self {
        Reader { inner, pos: 0 }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> ByteReader for Reader<R> {
    fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        // Lengths come from the input, so grow with the data instead of
        // allocating `n` up front.
        let mut buf = Vec::new();
        (&mut self.inner).take(n as u64).read_to_end(&mut buf)?;
        self.pos += buf.len() as u64;
        if buf.len() < n {
            return Err(std::io::Error::new(
                ErrorKind::UnexpectedEof,
                format!("needed {} bytes, got {}", n, buf.len()),
            )
            .into());
        }
        Ok(buf)
    }

    fn offset(&self) -> u64 {
        self.pos
    }

    fn seek_relative(&mut self, delta: i64) -> Result<()> {
        let target = i64::try_from(self.pos)
            .ok()
            .and_then(|pos| pos.checked_add(delta))
            .and_then(|t| u64::try_from(t).ok())
            .ok_or_else(|| {
                std::io::Error::new(
                    ErrorKind::InvalidInput,
                    format!("seek by {} from offset {} is out of range", delta, self.pos),
                )
            })?;
        self.inner.seek(SeekFrom::Current(delta))?;
        self.pos = target;
        Ok(())
    }

    fn is_eof(&mut self) -> Result<bool> {
        let mut byte = [0u8; 1];
        loop {
            match self.inner.read(&mut byte) {
                Ok(0) => return Ok(true),
                Ok(_) => {
                    self.inner.seek(SeekFrom::Current(-1))?;
                    return Ok(false);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// [`ByteWriter`] over any `Write` sink.
#[derive(Debug)]
pub struct Writer<W> {
    inner: W,
    pos: u64,
}

impl<W: Write> Writer<W> {
    pub fn new(inner: W) -> Self {
        Writer { inner, pos: 0 }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> ByteWriter for Writer<W> {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes)?;
        self.pos += bytes.len() as u64;
        Ok(())
    }

    fn offset(&self) -> u64 {
        self.pos
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}
