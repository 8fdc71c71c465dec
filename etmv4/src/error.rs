use std::io;

use thiserror::Error;

/// Internal, per-decode-step error. Distinguishes conditions the
/// pipeline driver can recover from (drop the packet, resume at the
/// next header byte) from the one condition that is always fatal.
#[derive(Error, Debug)]
pub(crate) enum DecodeStepError {
    #[error("i/o error while decoding packet: {0}")]
    Io(#[from] io::Error),

    #[error("end of stream")]
    Eof,

    #[error("malformed Atom Fmt5 pattern {0:#04x}")]
    MalformedAtomFmt5(u8),

    #[error("reached end of stream before an ASYNC alignment marker was found")]
    MissingAsync,
}

impl DecodeStepError {
    pub(crate) fn is_eof(&self) -> bool {
        matches!(self, DecodeStepError::Eof)
    }
}

impl From<DecodeStepError> for Error {
    fn from(e: DecodeStepError) -> Error {
        match e {
            DecodeStepError::Io(e) => Error::Io(e),
            DecodeStepError::Eof => Error::Eof,
            DecodeStepError::MalformedAtomFmt5(p) => Error::MalformedAtomFmt5 { pattern: p },
            DecodeStepError::MissingAsync => Error::MissingAsync,
        }
    }
}

/// Public error surface of the crate.
#[derive(Error, Debug)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("end of stream")]
    Eof,

    #[error("ETF input length {read} is not a multiple of 16 bytes")]
    FrameLength { read: usize },

    #[error("reached end of stream before an ASYNC alignment marker was found")]
    MissingAsync,

    #[error("malformed Atom Fmt5 pattern {pattern:#04x}")]
    MalformedAtomFmt5 { pattern: u8 },
}
