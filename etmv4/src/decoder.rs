use std::io::Read;

use bitmatch::bitmatch;

use crate::error::DecodeStepError;
use crate::packet::{Address, Atom, TracePacket, VmidWidth};
use crate::reader::ByteReader;

/// Immutable configuration threaded through every decode step, in
/// place of the mutable global flags a naive port of the reference
/// decoder would carry.
#[derive(Debug, Clone, Copy)]
pub struct DecodeContext {
    pub vmid_width: VmidWidth,
    pub debug: bool,
}

impl Default for DecodeContext {
    fn default() -> Self {
        DecodeContext {
            vmid_width: VmidWidth::default(),
            debug: false,
        }
    }
}

/// Result of dispatching a single header byte: either a fully decoded
/// packet, or a header value this decoder doesn't recognize.
pub(crate) enum DecodeOutcome {
    Packet(TracePacket),
    Unrecognized,
}

type StepResult<T> = Result<T, DecodeStepError>;

/// Dispatches on a packet header byte already read from the stream,
/// consuming whatever payload bytes that packet requires.
pub(crate) fn decode_packet<R: Read>(
    header: u8,
    r: &mut ByteReader<R>,
    ctx: &DecodeContext,
    last_spec_depth: &mut u32,
) -> StepResult<DecodeOutcome> {
    let pkt = match header {
        0x00 => decode_extended(r)?,
        0x01 => decode_trace_info(r, last_spec_depth)?,
        0x02..=0x03 => decode_timestamp(header, r)?,
        0x04 => TracePacket::TraceOn,
        0x06 => decode_exception(r)?,
        0x07 => TracePacket::ExceptionReturn,
        0x0C..=0x0D => decode_cycle_count_fmt2(header, r, *last_spec_depth)?,
        0x0E..=0x0F => decode_cycle_count_fmt1(header, r)?,
        0x10..=0x1F => decode_cycle_count_fmt3(header),
        0x2D => TracePacket::Commit {
            commit: r.read_leb128()?,
        },
        0x71..=0x7F => decode_event(header),
        0x80..=0x81 => decode_context(header, r, ctx)?,
        0x90..=0x93 => decode_exact_address(header),
        0x95..=0x96 => decode_short_address(header, r)?,
        0x9A..=0x9B => decode_long_address_32(header, r)?,
        0x9D..=0x9E => decode_long_address_64(header, r)?,
        0xF6..=0xF7 => TracePacket::Atom {
            atoms: vec![atom_from_bit(header & 0x1)],
        },
        0x40..=0x47 => decode_atom_fmt3(header),
        0x4C..=0x4F => decode_atom_fmt4(header),
        0x48..=0x4B | 0x68..=0x6B => decode_atom_fmt5(header)?,
        0x20..=0x3F => decode_atom_fmt6(header),
        0x08..=0x0B => decode_atom_fmt2(header),
        _ => return Ok(DecodeOutcome::Unrecognized),
    };
    Ok(DecodeOutcome::Packet(pkt))
}

fn atom_from_bit(bit: u8) -> Atom {
    if bit & 0x1 == 1 {
        Atom::E
    } else {
        Atom::N
    }
}

/// Header 0x00 peeks the following byte to distinguish ASYNC's
/// continuation (handled by the synchronizer, never seen here) from a
/// mid-stream OVERFLOW packet (`0x00 0x05`).
fn decode_extended<R: Read>(r: &mut ByteReader<R>) -> StepResult<TracePacket> {
    let next = r.read_byte()?;
    if next == 0x05 {
        Ok(TracePacket::Overflow)
    } else {
        // Any other continuation of a 0x00 header belongs to an ASYNC
        // run the synchronizer should already have consumed; treat a
        // stray one as an empty resync point.
        Ok(TracePacket::Async)
    }
}

/// `TRACE INFO`'s PLCTL byte independently gates each of the INFO, KEY,
/// SPEC and CYCT sub-blocks on its low four bits; any combination may
/// be absent, in which case the corresponding fields stay at zero.
fn decode_trace_info<R: Read>(
    r: &mut ByteReader<R>,
    last_spec_depth: &mut u32,
) -> StepResult<TracePacket> {
    let plctl = r.read_byte()?;

    let mut cc_enabled = false;
    let mut cond_enabled = 0u8;
    let mut p0_load = false;
    let mut p0_store = false;
    let mut p0_key_max = 0u32;
    let mut curr_spec_depth = 0u32;
    let mut cc_threshold = 0u32;

    if plctl & 0x1 != 0 {
        let info = r.read_byte()?;
        cc_enabled = info & 0x1 == 1;
        cond_enabled = (info & 0xe) >> 1;
        p0_load = info & 0x10 != 0;
        p0_store = info & 0x20 != 0;
    }

    if plctl & 0x2 != 0 {
        p0_key_max = u32::from(r.read_byte()?);
    }

    if plctl & 0x4 != 0 {
        let mut spec = r.read_byte()?;
        curr_spec_depth = u32::from(spec & 0x7f);
        let mut i = 0u32;
        while spec & 0x80 != 0 {
            spec = r.read_byte()?;
            curr_spec_depth |= u32::from(spec & 0x7f) << (7 * i);
            i += 1;
        }
    }

    if plctl & 0x8 != 0 {
        let cyct0 = r.read_byte()?;
        cc_threshold = u32::from(cyct0 & 0x7f);
        if cyct0 & 0x80 != 0 {
            let cyct1 = r.read_byte()?;
            cc_threshold |= u32::from(cyct1 & 0x1f) << 7;
        }
    }

    *last_spec_depth = curr_spec_depth;

    Ok(TracePacket::TraceInfo {
        plctl,
        cc_enabled,
        cond_enabled,
        p0_load,
        p0_store,
        curr_spec_depth,
        cc_threshold,
        p0_key_max,
    })
}

/// Up to 8 continuation-coded timestamp bytes, a special 9th byte when
/// all 8 carried a continuation bit, and a trailing cycle count gated
/// on the header's low bit.
fn decode_timestamp<R: Read>(header: u8, r: &mut ByteReader<R>) -> StepResult<TracePacket> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    let mut all_continued = true;
    for i in 0..8 {
        let b = r.read_byte()?;
        value |= u64::from(b & 0x7f) << shift;
        shift += 7;
        if b & 0x80 == 0 {
            all_continued = false;
            break;
        }
        let _ = i;
    }
    if all_continued {
        let b = r.read_byte()?;
        value |= u64::from(b) << 56;
    }

    let cycle_count = if header & 0x1 != 0 {
        Some(read_count_field(r)?)
    } else {
        None
    };

    Ok(TracePacket::Timestamp { value, cycle_count })
}

/// Reads the shared 1-or-2-byte continuation count field used by
/// `CYCLECOUNT` Fmt1's COUNT and `Timestamp`'s cycle-count trailer:
/// first byte low 7 bits plus continuation bit, optional second byte,
/// optional third byte masked to its low 6 bits shifted into place.
fn read_count_field<R: Read>(r: &mut ByteReader<R>) -> StepResult<u32> {
    let b0 = r.read_byte()?;
    let mut value = u32::from(b0 & 0x7f);
    if b0 & 0x80 == 0 {
        return Ok(value);
    }
    let b1 = r.read_byte()?;
    value |= u32::from(b1 & 0x7f) << 7;
    if b1 & 0x80 == 0 {
        return Ok(value);
    }
    let b2 = r.read_byte()?;
    value |= u32::from(b2 & 0x3f) << 14;
    Ok(value)
}

#[bitmatch]
fn decode_exception<R: Read>(r: &mut ByteReader<R>) -> StepResult<TracePacket> {
    let info0 = r.read_byte()?;
    let e1e0 = ((info0 & 0x60) >> 5) | (info0 & 0x1);
    let mut exception_type = u16::from((info0 & 0x3e) >> 1);
    let mut precise = true;

    if e1e0 & 0x1 == 1 {
        let info1 = r.read_byte()?;
        #[bitmatch]
        let "p???eeee" = info1;
        exception_type |= u16::from(e);
        precise = p == 0;
    }

    let return_address = decode_exception_return_address(r)?;

    Ok(TracePacket::Exception {
        resource: e1e0,
        exception_type,
        precise,
        return_address,
    })
}

fn decode_exception_return_address<R: Read>(
    r: &mut ByteReader<R>,
) -> StepResult<Option<Address>> {
    let addr_header = r.read_byte()?;
    match addr_header {
        0x9A..=0x9B => {
            let is = if addr_header == 0x9A { 0 } else { 1 };
            let (offset, is) = read_long_address_bits(is, r, 32)?;
            Ok(Some(Address {
                address: offset,
                is,
            }))
        }
        0x9D..=0x9E => {
            let is = if addr_header == 0x9D { 0 } else { 1 };
            let (address, is) = read_long_address_bits(is, r, 64)?;
            Ok(Some(Address { address, is }))
        }
        _ => {
            log::warn!(
                "Exception packet has unrecognized return-address header {:#04x}",
                addr_header
            );
            Ok(None)
        }
    }
}

/// Shared bit-level layout for the 32- and 64-bit `LongAddress`
/// packets: first byte contributes its low 7 bits shifted by `2-is`,
/// the second byte's inclusion of its top bit and shift by `9-is`
/// depend on `is`, and remaining bytes are consumed a byte at a time
/// at 8-bit strides. `is` is 0 for the lower header of each opcode
/// pair (`0x9A`/`0x9D`), 1 for the upper (`0x9B`/`0x9E`) — it is not
/// simply the header's low bit, since that parity flips between the
/// two pairs.
fn read_long_address_bits<R: Read>(
    is: u8,
    r: &mut ByteReader<R>,
    width: u32,
) -> StepResult<(u64, u8)> {
    let b0 = r.read_byte()?;
    let mut value: u64 = u64::from(b0 & 0x7f) << (2 - is as u32);

    let b1 = r.read_byte()?;
    let b1_bits: u64 = if is == 0 {
        u64::from(b1 & 0x7f)
    } else {
        u64::from(b1)
    };
    value |= b1_bits << (9 - is as u32);

    let remaining_bytes = (width - 16) / 8;
    for i in 0..remaining_bytes {
        let b = r.read_byte()?;
        value |= u64::from(b) << (16 + 8 * i);
    }

    Ok((value, is))
}

fn decode_long_address_32<R: Read>(
    header: u8,
    r: &mut ByteReader<R>,
) -> StepResult<TracePacket> {
    let is = if header == 0x9A { 0 } else { 1 };
    let (offset, is) = read_long_address_bits(is, r, 32)?;
    Ok(TracePacket::CompressedAddr {
        offset,
        width: 32,
        is,
    })
}

fn decode_long_address_64<R: Read>(
    header: u8,
    r: &mut ByteReader<R>,
) -> StepResult<TracePacket> {
    let is = if header == 0x9D { 0 } else { 1 };
    let (address, is) = read_long_address_bits(is, r, 64)?;
    Ok(TracePacket::LongAddr64 { address, is })
}

/// Short address packets only read a second byte when the first
/// byte's continuation bit is set; width starts at 8 and becomes 16
/// once that second byte is present. `is` is 0 for header `0x95`, 1
/// for `0x96` — not simply the header's low bit.
fn decode_short_address<R: Read>(
    header: u8,
    r: &mut ByteReader<R>,
) -> StepResult<TracePacket> {
    let is = if header == 0x95 { 0 } else { 1 };
    let b0 = r.read_byte()?;
    let mut value: u64 = u64::from(b0 & 0x7f) << (2 - is as u32);
    let mut width = 8u8;

    if b0 & 0x80 != 0 {
        let b1 = r.read_byte()?;
        let b1_bits: u64 = if is == 0 {
            u64::from(b1 & 0x7f)
        } else {
            u64::from(b1)
        };
        value |= b1_bits << (9 - is as u32);
        width = 16;
    }

    Ok(TracePacket::CompressedAddr {
        offset: value,
        width,
        is,
    })
}

/// Exact-address packets identify the matching address-stack entry by
/// an ascending bitmask scan of the header's low three bits; the
/// first (lowest) set bit wins.
fn decode_exact_address(header: u8) -> TracePacket {
    let mut match_index = 0;
    for i in 0..crate::addr_stack::ADDR_COMP_STK_DEPTH {
        if (header >> i) & 0x1 == 1 {
            match_index = i;
            break;
        }
    }
    TracePacket::ExactAddr { match_index }
}

#[bitmatch]
fn decode_context<R: Read>(
    header: u8,
    r: &mut ByteReader<R>,
    ctx: &DecodeContext,
) -> StepResult<TracePacket> {
    #[bitmatch]
    let "???????u" = header;
    let updated = u == 1;

    if !updated {
        return Ok(TracePacket::Context {
            updated: false,
            context_id: None,
            vmid: None,
            el: 0,
            ns: false,
            is_64bit: false,
        });
    }

    let ctxt_byte = r.read_byte()?;
    let el = ctxt_byte & 0x3;
    let is_64bit = ctxt_byte & 0x10 != 0;
    let ns = ctxt_byte & 0x20 != 0;
    let has_vmid = ctxt_byte & 0x40 != 0;
    let has_context_id = ctxt_byte & 0x80 != 0;

    let vmid = if has_vmid {
        Some(match ctx.vmid_width {
            VmidWidth::One => u32::from(r.read_byte()?),
            VmidWidth::Four => {
                let mut bytes = [0u8; 4];
                for b in bytes.iter_mut() {
                    *b = r.read_byte()?;
                }
                u32::from_le_bytes(bytes)
            }
        })
    } else {
        None
    };

    let context_id = if has_context_id {
        let mut bytes = [0u8; 4];
        for b in bytes.iter_mut() {
            *b = r.read_byte()?;
        }
        Some(u32::from_le_bytes(bytes))
    } else {
        None
    };

    Ok(TracePacket::Context {
        updated: true,
        context_id,
        vmid,
        el,
        ns,
        is_64bit,
    })
}

fn decode_cycle_count_fmt1<R: Read>(header: u8, r: &mut ByteReader<R>) -> StepResult<TracePacket> {
    let commit = r.read_leb128()?;
    let cycle_count_unknown = header & 0x1 == 1;
    if cycle_count_unknown {
        return Ok(TracePacket::CycleCountFmt1 {
            commit,
            cycle_count: None,
        });
    }
    let cycle_count = Some(read_count_field(r)?);
    Ok(TracePacket::CycleCountFmt1 {
        commit,
        cycle_count,
    })
}

/// Fmt2's `F=1` branch commits speculative instructions relative to
/// the most recently observed `TRACE INFO.curr_spec_depth`, clamped to
/// zero so an out-of-order or absent `TRACE INFO` can't underflow.
fn decode_cycle_count_fmt2<R: Read>(
    header: u8,
    r: &mut ByteReader<R>,
    last_spec_depth: u32,
) -> StepResult<TracePacket> {
    let f = header & 0x1;
    let payload = r.read_byte()?;
    let cycle_count = u32::from(payload & 0x0f);
    let aaaa = u32::from((payload & 0xf0) >> 4);
    let commit = if f == 0 {
        aaaa + 1
    } else {
        (last_spec_depth + aaaa).saturating_sub(15)
    };
    Ok(TracePacket::CycleCountFmt2 {
        commit,
        cycle_count,
    })
}

fn decode_cycle_count_fmt3(header: u8) -> TracePacket {
    let commit = u32::from(header & 0x3);
    let cycle_count = u32::from((header & 0xc) >> 2);
    TracePacket::CycleCountFmt3 {
        commit,
        cycle_count,
    }
}

fn decode_event(header: u8) -> TracePacket {
    let mut events = [false; 4];
    for (i, e) in events.iter_mut().enumerate() {
        *e = (header >> i) & 0x1 == 1;
    }
    TracePacket::Event { events }
}

fn decode_atom_fmt2(header: u8) -> TracePacket {
    TracePacket::Atom {
        atoms: vec![atom_from_bit(header & 0x1), atom_from_bit((header >> 1) & 0x1)],
    }
}

fn decode_atom_fmt3(header: u8) -> TracePacket {
    TracePacket::Atom {
        atoms: (0..3).map(|i| atom_from_bit((header >> i) & 0x1)).collect(),
    }
}

fn decode_atom_fmt4(header: u8) -> TracePacket {
    let pattern: &[Atom] = match header & 0x3 {
        0 => &[Atom::N, Atom::E, Atom::E, Atom::E],
        1 => &[Atom::N, Atom::N, Atom::N, Atom::N],
        2 => &[Atom::N, Atom::E, Atom::N, Atom::E],
        _ => &[Atom::E, Atom::N, Atom::E, Atom::N],
    };
    TracePacket::Atom {
        atoms: pattern.to_vec(),
    }
}

fn decode_atom_fmt5(header: u8) -> StepResult<TracePacket> {
    let bit5 = (header >> 5) & 0x1;
    let abc = (bit5 << 2) | (header & 0x3);
    let pattern: &[Atom] = match abc {
        1 => &[Atom::N, Atom::N, Atom::N, Atom::N, Atom::N],
        2 => &[Atom::N, Atom::E, Atom::N, Atom::E, Atom::N],
        3 => &[Atom::E, Atom::N, Atom::E, Atom::N, Atom::E],
        5 => &[Atom::N, Atom::E, Atom::E, Atom::E, Atom::E],
        _ => return Err(DecodeStepError::MalformedAtomFmt5(header)),
    };
    Ok(TracePacket::Atom {
        atoms: pattern.to_vec(),
    })
}

fn decode_atom_fmt6(header: u8) -> TracePacket {
    let a = (header >> 5) & 0x1;
    let count = header & 0x1f;
    let mut atoms: Vec<Atom> = (0..count + 2).map(|_| Atom::E).collect();
    atoms.push(if a == 1 { Atom::N } else { Atom::E });
    TracePacket::Atom { atoms }
}
