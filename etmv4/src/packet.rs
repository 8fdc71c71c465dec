//! The decoded packet data model (spec §3).

pub use crate::addr_stack::Address;

/// Context VMID width, selectable because ETMv4.0 and ETMv4.1 disagree
/// on how many bytes a Context packet's VMID field occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VmidWidth {
    One,
    Four,
}

impl Default for VmidWidth {
    fn default() -> Self {
        VmidWidth::One
    }
}

/// One decoded atom: a conditional instruction's taken/not-taken
/// outcome, in program order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Atom {
    E,
    N,
}

/// A fully decoded ETMv4 trace packet.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TracePacket {
    /// Alignment synchronization packet (11+ zero bytes then 0x80).
    Async,

    /// `TRACE INFO` packet. `plctl` gates which of the INFO/KEY/SPEC/CYCT
    /// sub-blocks are present; the remaining fields default to zero when
    /// their gating bit is clear.
    TraceInfo {
        plctl: u8,
        cc_enabled: bool,
        cond_enabled: u8,
        p0_load: bool,
        p0_store: bool,
        curr_spec_depth: u32,
        cc_threshold: u32,
        p0_key_max: u32,
    },

    /// `TRACE ON` discontinuity marker. No payload.
    TraceOn,

    /// Up to 56 bits of timestamp value plus an optional cycle count.
    Timestamp {
        value: u64,
        cycle_count: Option<u32>,
    },

    /// Exception packet. `return_address` is `None` when the embedded
    /// address header doesn't resolve to a LongAddress32/64 packet.
    Exception {
        resource: u8,
        exception_type: u16,
        precise: bool,
        return_address: Option<Address>,
    },

    /// Exception-return marker. No payload.
    ExceptionReturn,

    /// `CYCLECOUNT` format 1: explicit commit count, optional cycle count.
    CycleCountFmt1 {
        commit: u32,
        cycle_count: Option<u32>,
    },

    /// `CYCLECOUNT` format 2: one payload byte splits into a 4-bit
    /// cycle count and an `AAAA` field combined with `F` (header bit0)
    /// and, when `F=1`, the last observed speculation depth.
    CycleCountFmt2 { commit: u32, cycle_count: u32 },

    /// `CYCLECOUNT` format 3: header-only commit/cycle-count pair.
    CycleCountFmt3 { commit: u32, cycle_count: u32 },

    /// Standalone `COMMIT` packet (unbounded LEB128-style count).
    Commit { commit: u32 },

    /// `EVENT` packet: up to four independent event flags.
    Event { events: [bool; 4] },

    /// `CONTEXT` packet.
    Context {
        updated: bool,
        context_id: Option<u32>,
        vmid: Option<u32>,
        el: u8,
        ns: bool,
        is_64bit: bool,
    },

    /// Absolute 64-bit address, decoded directly (no stack lookup).
    LongAddr64 { address: u64, is: u8 },

    /// Compressed address: an offset relative to a prior address-stack
    /// entry of the given bit width. Resolved to an absolute address by
    /// the pipeline driver, which owns the address stack.
    CompressedAddr { offset: u64, width: u8, is: u8 },

    /// Exact-match address: reuses a previously seen address-stack
    /// entry verbatim.
    ExactAddr { match_index: usize },

    /// `OVERFLOW` packet. No payload.
    Overflow,

    /// Any of the six `ATOM` packet formats, flattened to their
    /// decoded outcomes in program order.
    Atom { atoms: Vec<Atom> },
}
