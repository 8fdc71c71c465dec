use std::io::{self, Read};

use crate::error::DecodeStepError;

/// Thin byte-level source with one-byte lookahead. ETMv4 packets are
/// byte-aligned throughout, so there is no need for bit-granular
/// peeking here.
pub(crate) struct ByteReader<R: Read> {
    inner: R,
    peeked: Option<u8>,
}

impl<R: Read> ByteReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        ByteReader {
            inner,
            peeked: None,
        }
    }

    fn fill_one(&mut self) -> io::Result<u8> {
        let mut buf = [0u8; 1];
        self.inner.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    pub(crate) fn read_byte(&mut self) -> Result<u8, DecodeStepError> {
        if let Some(b) = self.peeked.take() {
            return Ok(b);
        }
        match self.fill_one() {
            Ok(b) => Ok(b),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(DecodeStepError::Eof),
            Err(e) => Err(DecodeStepError::Io(e)),
        }
    }

    pub(crate) fn peek_byte(&mut self) -> Result<u8, DecodeStepError> {
        if let Some(b) = self.peeked {
            return Ok(b);
        }
        let b = self.read_byte()?;
        self.peeked = Some(b);
        Ok(b)
    }

    /// Reads an unbounded base-128 continuation-coded value (low 7 bits
    /// payload, high bit set means "more bytes follow"). Used for
    /// `COMMIT` and the `CYCLECOUNT` Fmt1 commit field.
    pub(crate) fn read_leb128(&mut self) -> Result<u32, DecodeStepError> {
        let mut value: u32 = 0;
        let mut shift = 0u32;
        loop {
            let b = self.read_byte()?;
            value |= u32::from(b & 0x7f) << shift;
            if b & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        Ok(value)
    }
}
