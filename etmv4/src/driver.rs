use std::io::Read;

use crate::addr_stack::AddrStack;
use crate::decoder::{decode_packet, DecodeContext, DecodeOutcome};
use crate::error::{DecodeStepError, Error};
use crate::packet::TracePacket;
use crate::reader::ByteReader;
use crate::sync::synchronize;

/// Drives the ETMv4 packet stream: synchronizes once, then repeatedly
/// dispatches header bytes, maintaining the address-compression stack
/// and the running speculation-depth state that `CYCLECOUNT` Fmt2
/// needs between calls.
pub struct Decoder<R: Read> {
    reader: ByteReader<R>,
    stack: AddrStack,
    last_spec_depth: u32,
    synced: bool,
    ctx: DecodeContext,
}

impl<R: Read> Decoder<R> {
    pub fn new(inner: R, ctx: DecodeContext) -> Self {
        Decoder {
            reader: ByteReader::new(inner),
            stack: AddrStack::new(),
            last_spec_depth: 0,
            synced: false,
            ctx,
        }
    }

    /// Returns an iterator over successfully decoded packets, stopping
    /// (without an explicit end marker) at clean EOF, and yielding
    /// `Err` for any other condition including the one fatal
    /// mid-stream error (`MalformedAtomFmt5`).
    pub fn singles(&mut self) -> Singles<'_, R> {
        Singles { decoder: self }
    }

    fn next_single(&mut self) -> Result<TracePacket, DecodeStepError> {
        if !self.synced {
            synchronize(&mut self.reader).map_err(|_| DecodeStepError::MissingAsync)?;
            self.synced = true;
            return Ok(TracePacket::Async);
        }

        loop {
            let header = self.reader.read_byte()?;
            match decode_packet(header, &mut self.reader, &self.ctx, &mut self.last_spec_depth) {
                Ok(DecodeOutcome::Packet(pkt)) => {
                    self.apply_address_update(&pkt);
                    return Ok(pkt);
                }
                Ok(DecodeOutcome::Unrecognized) => {
                    log::warn!("Dropped byte {:#04x}", header);
                    continue;
                }
                Err(e @ DecodeStepError::MalformedAtomFmt5(_)) => return Err(e),
                Err(e) if e.is_eof() => return Err(e),
                Err(e) => {
                    log::warn!("Truncated packet after header {:#04x}: {}", header, e);
                    continue;
                }
            }
        }
    }

    fn apply_address_update(&mut self, pkt: &TracePacket) {
        match *pkt {
            TracePacket::LongAddr64 { address, is } => self.stack.push(address, is),
            TracePacket::CompressedAddr { offset, width, is } => {
                let base = self.stack.get(0).address;
                let address = ((base >> width) << width) | offset;
                self.stack.push(address, is);
            }
            TracePacket::ExactAddr { match_index } => {
                let entry = self.stack.get(match_index);
                self.stack.push(entry.address, entry.is);
            }
            _ => {}
        }
    }
}

/// Lazily decoded sequence of [`TracePacket`]s.
pub struct Singles<'a, R: Read> {
    decoder: &'a mut Decoder<R>,
}

impl<'a, R: Read> Iterator for Singles<'a, R> {
    type Item = Result<TracePacket, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.decoder.next_single() {
            Ok(pkt) => Some(Ok(pkt)),
            Err(e) if e.is_eof() => None,
            Err(e) => Some(Err(e.into())),
        }
    }
}
