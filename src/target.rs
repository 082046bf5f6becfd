//! The target's side of the allocator contract.
//!
//! The allocator has no target-specific knowledge at all: it only knows what an instruction
//! looks like through the five operations bundled into [`RegAllocTarget`]. Bundling them into one
//! capability object passed by reference, rather than five separate function pointers, also makes
//! it straightforward to hand the allocator a synthetic target in tests.
//!
//! Every method here must be pure with respect to allocator state and free of observable global
//! side effects; the allocator calls them synchronously, in instruction order, and never
//! concurrently.

use crate::hreg::HReg;
use crate::reg_usage::HRegUsage;

/// Target-specific operations the allocator needs on its input instructions.
///
/// `I` is the target's own instruction representation; the allocator never constructs one
/// itself except through [`RegAllocTarget::gen_spill`] and [`RegAllocTarget::gen_restore`].
pub trait RegAllocTarget<I> {
    /// If `insn` is a register-to-register move, return its `(src, dst)` pair. Memory moves
    /// (loads/stores) are not moves for this purpose and must return `None`.
    fn is_move(&self, insn: &I) -> Option<(HReg, HReg)>;

    /// Populate `usage` with every register `insn` touches, tagged `Read`/`Write`/`Modify`.
    /// Must not omit any register mention: a missed one is invisible to liveness analysis.
    fn get_reg_usage(&self, insn: &I, usage: &mut HRegUsage);

    /// Rewrite `insn` in place so that every vreg reference named in `mapping` becomes the
    /// paired rreg. `mapping` contains exactly the vreg→rreg bindings this instruction's own
    /// operands need; the target must not invent substitutions beyond what it's given.
    fn map_regs(&self, insn: &mut I, mapping: &[(HReg, HReg)]);

    /// Produce an instruction that stores `rreg` to the spill slot at byte offset `offset`.
    fn gen_spill(&self, rreg: HReg, offset: u32) -> I;

    /// Produce an instruction that loads the spill slot at byte offset `offset` into `rreg`.
    fn gen_restore(&self, rreg: HReg, offset: u32) -> I;
}
