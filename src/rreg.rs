//! Real register hard ranges and the stage-5 running state table.

use crate::error::RegAllocPanic;
use crate::hreg::HReg;
use crate::reg_usage::{HRegUsage, RegMode};
use log::trace;

/// A hard live range: the half-open interval during which `rreg` is pre-committed by the
/// instruction stream's own semantics (a call clobber, a divide's fixed quotient/remainder
/// register, ...) and is therefore off-limits to the allocator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RRegInfo {
    /// The reserved real register.
    pub rreg: HReg,
    /// Becomes live after this instruction.
    pub live_after: i32,
    /// Becomes dead before this instruction.
    pub dead_before: i32,
}

impl RRegInfo {
    /// Does this hard range's *open* interval contain `ii` (i.e. `live_after < ii < dead_before`)?
    pub fn contains_open(&self, ii: usize) -> bool {
        self.live_after < ii as i32 && (ii as i32) < self.dead_before
    }
}

/// Walk `instrs` and compute the list of hard live ranges for every rreg in `available_real_regs`
/// (stage 2). Real registers outside that set (e.g. a stack pointer) are ignored entirely.
pub fn scan<I>(
    instrs: &[I],
    available_real_regs: &[HReg],
    get_usage: impl Fn(&I, &mut HRegUsage),
) -> Result<Vec<RRegInfo>, RegAllocPanic> {
    let mut open: Vec<Option<(i32, i32)>> = vec![None; available_real_regs.len()];
    let mut ranges = Vec::new();

    let index_of = |r: HReg| available_real_regs.iter().position(|&a| a == r);

    for (ii, insn) in instrs.iter().enumerate() {
        let mut usage = HRegUsage::new();
        get_usage(insn, &mut usage);

        for (reg, mode) in usage.iter() {
            if reg.is_virtual() {
                continue;
            }
            let Some(ir) = index_of(reg) else {
                continue;
            };
            match mode {
                RegMode::Write => {
                    if let Some((la, db)) = open[ir].take() {
                        ranges.push(RRegInfo {
                            rreg: reg,
                            live_after: la,
                            dead_before: db,
                        });
                    }
                    open[ir] = Some((ii as i32, ii as i32 + 1));
                }
                RegMode::Read => match &mut open[ir] {
                    Some((_, db)) => *db = ii as i32,
                    None => {
                        return Err(RegAllocPanic::RRegFirstEventIsRead { rreg: reg, insn: ii });
                    }
                },
                RegMode::Modify => match &mut open[ir] {
                    Some((_, db)) => *db = ii as i32 + 1,
                    None => {
                        return Err(RegAllocPanic::RRegFirstEventIsModify { rreg: reg, insn: ii });
                    }
                },
            }
        }
    }

    for (ir, slot) in open.into_iter().enumerate() {
        if let Some((la, db)) = slot {
            ranges.push(RRegInfo {
                rreg: available_real_regs[ir],
                live_after: la,
                dead_before: db,
            });
        }
    }

    trace!("rreg hard-range scan: {} hard ranges", ranges.len());
    for r in &ranges {
        trace!(
            "  {:?}: live_after={} dead_before={}",
            r.rreg,
            r.live_after,
            r.dead_before
        );
    }

    Ok(ranges)
}

/// The disposition of one allocatable rreg during the stage-5 walk.
///
/// A tagged sum rather than a separate `disp`/`vreg` pair: there is no way to construct a `Bound`
/// without a vreg index to go with it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disp {
    /// Available for use.
    Free,
    /// Reserved by an open hard live range; not available for binding.
    Unavail,
    /// Currently holding the value of the given vreg.
    Bound(u32),
}

/// Running per-rreg state during stage 5. One entry per entry in `available_real_regs`, in the
/// same order.
#[derive(Clone, Debug)]
pub struct RRegState {
    /// The rreg this entry describes.
    pub rreg: HReg,
    /// Its current disposition.
    pub disp: Disp,
}

impl RRegState {
    /// Build the initial state table: every rreg starts `Free`.
    pub fn initial(available_real_regs: &[HReg]) -> Vec<Self> {
        available_real_regs
            .iter()
            .map(|&rreg| Self {
                rreg,
                disp: Disp::Free,
            })
            .collect()
    }
}
