//! Per-instruction register usage records.

use crate::hreg::HReg;
use core::fmt;
use smallvec::SmallVec;

/// How a single instruction touches one of its registers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegMode {
    /// The value is consumed before this instruction executes.
    Read,
    /// A fresh value is produced with no dependence on the prior contents.
    Write,
    /// Both: the register is read, then written in place.
    Modify,
}

impl fmt::Display for RegMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RegMode::Read => "R",
            RegMode::Write => "W",
            RegMode::Modify => "M",
        };
        f.write_str(s)
    }
}

/// The complete set of registers one instruction mentions, in no particular order.
///
/// `getRegUsage` (see [`RegAllocTarget`](crate::target::RegAllocTarget)) must populate one of
/// these per instruction, and must not omit any register the instruction actually touches: a
/// missed mention is invisible to liveness analysis and silently corrupts the allocation.
///
/// Most instructions mention a handful of registers, so the backing storage is inline up to
/// four entries before spilling to the heap.
#[derive(Clone, Debug, Default)]
pub struct HRegUsage {
    entries: SmallVec<[(HReg, RegMode); 4]>,
}

impl HRegUsage {
    /// An empty usage record, ready to be filled in by a target's `getRegUsage`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `reg` is used in `mode` by the instruction being described.
    pub fn push(&mut self, reg: HReg, mode: RegMode) {
        self.entries.push((reg, mode));
    }

    /// Iterate over the `(register, mode)` pairs in the order they were recorded.
    pub fn iter(&self) -> impl Iterator<Item = (HReg, RegMode)> + '_ {
        self.entries.iter().copied()
    }

    /// How many registers this instruction mentions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Are there no registers mentioned at all?
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
