//! Fatal diagnostics.
//!
//! Every variant here denotes a bug in the upstream code generator (malformed liveness, an
//! out-of-range vreg number, an exhausted spill pool, a broken stage-5 invariant) rather than a
//! runtime condition the caller could reasonably recover from. [`crate::allocate`] and
//! [`crate::Context::run`] never return one of these to the caller directly: they format it and
//! `panic!`. The type exists so that diagnostic construction and the decision to abort are two
//! separate steps, which keeps the message text in one place and lets tests assert on it without
//! having to catch a panic.

use crate::hreg::{HReg, RegClass};
use thiserror::Error;

/// A fatal, non-recoverable register-allocation failure.
///
/// See the module docs: this is always turned into a `panic!` by the public entry points.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RegAllocPanic {
    /// A vreg's first mention in the instruction stream was a `Read`.
    #[error("vreg v{vreg} is read at instruction {insn} before ever being written")]
    VRegFirstEventIsRead {
        /// The vreg index.
        vreg: u32,
        /// The instruction index of the offending read.
        insn: usize,
    },

    /// A vreg's first mention in the instruction stream was a `Modify`.
    #[error("vreg v{vreg} is modified at instruction {insn} before ever being written")]
    VRegFirstEventIsModify {
        /// The vreg index.
        vreg: u32,
        /// The instruction index of the offending modify.
        insn: usize,
    },

    /// An rreg's first mention within an open hard range was a `Read`.
    #[error("rreg {rreg:?} is read at instruction {insn} before ever being written")]
    RRegFirstEventIsRead {
        /// The offending real register.
        rreg: HReg,
        /// The instruction index of the offending read.
        insn: usize,
    },

    /// An rreg's first mention within an open hard range was a `Modify`.
    #[error("rreg {rreg:?} is modified at instruction {insn} before ever being written")]
    RRegFirstEventIsModify {
        /// The offending real register.
        rreg: HReg,
        /// The instruction index of the offending modify.
        insn: usize,
    },

    /// A vreg mention fell outside `0..n_vregs`.
    #[error("instruction {insn} mentions vreg index {vreg}, but n_vregs is {n_vregs}")]
    VRegIndexOutOfRange {
        /// The instruction index where the bad mention occurred.
        insn: usize,
        /// The out-of-range vreg index.
        vreg: u32,
        /// The declared vreg count.
        n_vregs: u32,
    },

    /// Stage 3 ran out of spill slots.
    #[error(
        "spill pool exhausted: n_spill64s is {n_spill64s}, but vreg v{vreg} needs a slot and \
         none are free at instruction {live_after}"
    )]
    SpillPoolExhausted {
        /// The configured pool size.
        n_spill64s: u32,
        /// The vreg that could not be assigned a slot.
        vreg: u32,
        /// The instruction after which the vreg becomes live.
        live_after: i32,
    },

    /// Stage 5 needed an rreg of some class but none was available.
    #[error(
        "no {class} rreg is available to hold vreg v{vreg} at instruction {insn}: every {class} \
         rreg is Unavail (reserved by a hard range) or Bound to a vreg mentioned by this same \
         instruction"
    )]
    NoSuitableRReg {
        /// The register class that was starved.
        class: RegClass,
        /// The vreg that needed a register.
        vreg: u32,
        /// The instruction index.
        insn: usize,
    },

    /// A `Bound` rreg and its held vreg disagree on register class.
    #[error(
        "class mismatch: rreg {rreg:?} is bound to vreg v{vreg}, but the rreg is class {rreg_class} \
         and the vreg is class {vreg_class}"
    )]
    ClassMismatch {
        /// The rreg in the offending binding.
        rreg: HReg,
        /// The vreg in the offending binding.
        vreg: u32,
        /// The rreg's class.
        rreg_class: RegClass,
        /// The vreg's class.
        vreg_class: RegClass,
    },

    /// Two rregs both claim to be `Bound` to the same vreg at once.
    #[error("vreg v{vreg} is bound to both rreg {first:?} and rreg {second:?} at instruction {insn}")]
    DuplicateBinding {
        /// The doubly-bound vreg.
        vreg: u32,
        /// The first rreg holding it.
        first: HReg,
        /// The second rreg holding it.
        second: HReg,
        /// The instruction index at which this was observed.
        insn: usize,
    },

    /// An rreg is `Unavail` with no corresponding open hard range, or vice versa.
    #[error(
        "hard-range bookkeeping is inconsistent for rreg {rreg:?} at instruction {insn}: {detail}"
    )]
    PhantomUnavail {
        /// The rreg whose state disagrees with the hard-range table.
        rreg: HReg,
        /// The instruction index.
        insn: usize,
        /// Which direction of the inconsistency was observed.
        detail: &'static str,
    },
}
