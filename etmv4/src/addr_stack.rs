//! Bounded LIFO of prior absolute addresses, used to reconstruct
//! compressed and exact-match address packets back to absolute values.

/// An absolute virtual address together with the instruction-set state
/// (`is`) it was captured under.
///
/// `is` follows the ETMv4 convention: 0 selects A64/A32-aligned
/// addressing, 1 selects Thumb-aligned addressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Address {
    pub address: u64,
    pub is: u8,
}

/// Maximum number of prior addresses the decoder is required to
/// remember (ETMv4 `ADDR_COMP_STK_DEPTH`).
pub const ADDR_COMP_STK_DEPTH: usize = 3;

/// Bounded LIFO of the last [`ADDR_COMP_STK_DEPTH`] addresses seen,
/// newest first.
#[derive(Debug, Default)]
pub struct AddrStack {
    entries: Vec<Address>,
}

impl AddrStack {
    pub fn new() -> Self {
        AddrStack {
            entries: Vec::with_capacity(ADDR_COMP_STK_DEPTH),
        }
    }

    /// Prepends a new most-recent entry, then compacts to
    /// [`ADDR_COMP_STK_DEPTH`] by dropping the oldest.
    pub fn push(&mut self, address: u64, is: u8) {
        self.entries.insert(0, Address { address, is });
        self.compact();
    }

    fn compact(&mut self) {
        if self.entries.len() > ADDR_COMP_STK_DEPTH {
            self.entries.truncate(ADDR_COMP_STK_DEPTH);
        }
    }

    /// Returns entry `idx` (0 = most recently pushed). Out-of-range
    /// indices log a warning and return the zero sentinel rather than
    /// failing fatally.
    pub fn get(&self, idx: usize) -> Address {
        if idx >= self.entries.len() {
            log::warn!("Address stack match with missing entry!");
            return Address::default();
        }
        self.entries[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_prepends_and_bounds_depth() {
        let mut stack = AddrStack::new();
        stack.push(1, 0);
        stack.push(2, 1);
        stack.push(3, 0);
        stack.push(4, 1);

        assert_eq!(stack.entries.len(), ADDR_COMP_STK_DEPTH);
        assert_eq!(stack.get(0), Address { address: 4, is: 1 });
        assert_eq!(stack.get(1), Address { address: 3, is: 0 });
        assert_eq!(stack.get(2), Address { address: 2, is: 1 });
    }

    #[test]
    fn get_out_of_range_returns_zero_sentinel() {
        let mut stack = AddrStack::new();
        stack.push(42, 0);
        assert_eq!(stack.get(1), Address::default());
        assert_eq!(stack.get(5), Address::default());
    }

    #[test]
    fn push_after_push_keeps_newest_at_zero() {
        let mut stack = AddrStack::new();
        stack.push(0xA, 0);
        assert_eq!(stack.get(0), Address { address: 0xA, is: 0 });
        stack.push(0xB, 1);
        assert_eq!(stack.get(0), Address { address: 0xB, is: 1 });
        assert_eq!(stack.get(1), Address { address: 0xA, is: 0 });
    }
}
