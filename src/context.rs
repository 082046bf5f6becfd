//! The reusable allocator context and the top-level entry point.

use crate::alloc::{self, Stats};
use crate::config::Config;
use crate::error::RegAllocPanic;
use crate::hreg::HReg;
use crate::preference;
use crate::rreg::{self, RRegInfo};
use crate::target::RegAllocTarget;
use crate::vreg::{self, VRegInfo};
use log::trace;

/// Persistent memory allocations for register allocation.
///
/// A single enclosing driver (looping over basic blocks, say) constructs one `Context` and calls
/// [`Context::run`] once per straight-line sequence, reusing the same scratch tables every time
/// instead of allocating fresh ones on each call. A freshly-constructed `Context` and one that has
/// just been
/// [`cleared`](Context::clear) behave identically.
#[derive(Default)]
pub struct Context {
    vreg_table: Vec<VRegInfo>,
    hard_ranges: Vec<RRegInfo>,
}

impl Context {
    /// Create a new, empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all retained scratch state. The next [`Context::run`] call starts from scratch, but
    /// the underlying `Vec` allocations are kept around for reuse.
    pub fn clear(&mut self) {
        self.vreg_table.clear();
        self.hard_ranges.clear();
    }

    /// Run the full five-stage pipeline over one straight-line instruction sequence.
    ///
    /// `instrs` is consumed and a new instruction stream is returned; depending on how the
    /// target's `map_regs` is implemented, individual instructions may be the same objects
    /// (mutated in place) or freshly constructed ones.
    ///
    /// # Panics
    ///
    /// Panics — rather than returning an error — if the input violates the allocator's contract
    /// (malformed liveness, an out-of-range vreg, an exhausted spill pool, or a broken stage-5
    /// invariant). These are all programmer/compiler bugs upstream of this call, not conditions
    /// a caller could sensibly recover from; see [`crate::error::RegAllocPanic`].
    pub fn run<I>(
        &mut self,
        instrs: Vec<I>,
        n_vregs: u32,
        available_real_regs: &[HReg],
        target: &impl RegAllocTarget<I>,
        config: &Config,
    ) -> (Vec<I>, Stats) {
        match self.try_run(instrs, n_vregs, available_real_regs, target, config) {
            Ok(result) => result,
            Err(err) => panic!("register allocation failed: {err}"),
        }
    }

    /// The fallible core of [`Context::run`], kept separate so the error paths themselves are
    /// unit-testable without having to catch a panic.
    fn try_run<I>(
        &mut self,
        instrs: Vec<I>,
        n_vregs: u32,
        available_real_regs: &[HReg],
        target: &impl RegAllocTarget<I>,
        config: &Config,
    ) -> Result<(Vec<I>, Stats), RegAllocPanic> {
        self.clear();
        trace!(
            "register allocation: {} insns, {} vregs, {} available rregs",
            instrs.len(),
            n_vregs,
            available_real_regs.len()
        );

        // Stage 1: vreg liveness.
        self.vreg_table = vreg::scan(&instrs, n_vregs, |i, u| target.get_reg_usage(i, u))?;

        // Stage 2: rreg hard ranges.
        self.hard_ranges = rreg::scan(&instrs, available_real_regs, |i, u| {
            target.get_reg_usage(i, u)
        })?;

        // Stage 3: spill-slot assignment.
        crate::spill::assign(&mut self.vreg_table, config.n_spill64s)?;

        // Stage 4: preferencing (optional hint pass).
        if config.enable_preferencing {
            preference::run(
                &instrs,
                &mut self.vreg_table,
                |i| target.is_move(i),
                |i, u| target.get_reg_usage(i, u),
            );
        }

        // Stage 5: the allocation pass itself.
        alloc::run(
            instrs,
            available_real_regs,
            &self.vreg_table,
            &self.hard_ranges,
            target,
            config,
        )
    }
}

/// Convenience wrapper around [`Context`] for a single one-shot call.
///
/// Equivalent to `Context::new().run(...)`; prefer a reused [`Context`] when calling repeatedly
/// (e.g. once per basic block from an enclosing driver) to avoid reallocating the scratch tables
/// on every call.
pub fn allocate<I>(
    instrs: Vec<I>,
    n_vregs: u32,
    available_real_regs: &[HReg],
    target: &impl RegAllocTarget<I>,
    config: &Config,
) -> (Vec<I>, Stats) {
    Context::new().run(instrs, n_vregs, available_real_regs, target, config)
}
