//! Decoding library for ARM CoreSight ETF framing and the ETMv4
//! program-flow trace packet protocol.
//!
//! The crate is sans-I/O: [`etf::demultiplex`] and [`driver::Decoder`]
//! only ever read from whatever [`std::io::Read`] implementation the
//! caller hands them, never performing I/O of their own beyond that.

mod addr_stack;
mod decoder;
mod driver;
mod error;
mod etf;
mod packet;
mod reader;
mod sync;

pub use decoder::DecodeContext;
pub use driver::{Decoder, Singles};
pub use error::Error;
pub use etf::demultiplex;
pub use packet::{Address, Atom, TracePacket, VmidWidth};
pub use sync::find_async_start;

/// Human-readable name for an ETMv4 `ExceptionType` code, for
/// `Debug`/display rendering only. Indices and names follow the
/// architecture's 36-entry exception-type table.
pub fn exception_type_name(etype: u8) -> &'static str {
    match etype {
        0x00 => "PE reset",
        0x01 => "Debug halt",
        0x02 => "Call",
        0x03 => "Trap",
        0x04 => "System error",
        0x06 => "Inst debug",
        0x07 => "Data debug",
        0x0a => "Alignment",
        0x0b => "Inst fault",
        0x0c => "Data fault",
        0x0e => "IRQ",
        0x0f => "FIQ",
        0x10..=0x16 => "Implementation Defined",
        _ => "Reserved",
    }
}
