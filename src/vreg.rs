//! Virtual register liveness (stage 1).

use crate::error::RegAllocPanic;
use crate::hreg::HReg;
use crate::reg_usage::{HRegUsage, RegMode};
use log::trace;

/// Liveness and home-slot information for one vreg, computed once by [`scan`] and never mutated
/// again.
#[derive(Clone, Copy, Debug)]
pub struct VRegInfo {
    /// The instruction index after which this vreg first becomes live, or `-1` if the vreg is
    /// never mentioned.
    pub live_after: i32,
    /// The instruction index before which this vreg is last live.
    pub dead_before: i32,
    /// Byte offset of this vreg's home spill slot, assigned by stage 3.
    pub spill_offset: u32,
    /// Size in bytes of this vreg's home spill slot. Always 8; 128-bit vregs (vector registers
    /// spanning two slots) are not supported.
    pub spill_size: u32,
    /// Whether stage 4 assigned a preferred rreg.
    pub has_preference: bool,
    /// The preferred rreg, meaningful only when `has_preference` is set.
    pub preferred_rreg: Option<HReg>,
}

impl VRegInfo {
    fn unused() -> Self {
        Self {
            live_after: -1,
            dead_before: -1,
            spill_offset: 0,
            spill_size: 8,
            has_preference: false,
            preferred_rreg: None,
        }
    }

    /// Is this vreg mentioned anywhere in the instruction stream?
    #[inline]
    pub fn is_used(&self) -> bool {
        self.live_after != -1
    }

    /// Is this vreg live at (i.e. spans across) instruction `ii`?
    ///
    /// Defined for the half-open interval `(live_after, dead_before)`: true when
    /// `live_after < ii < dead_before`.
    pub fn is_live_at(&self, ii: usize) -> bool {
        self.is_used() && self.live_after < ii as i32 && (ii as i32) < self.dead_before
    }
}

/// Walk `instrs` in index order and compute a [`VRegInfo`] for every vreg in `0..n_vregs`.
///
/// This is stage 1 of the pipeline. `get_usage` is expected to be `getRegUsage` from the
/// target; it is called once per instruction.
pub fn scan<I>(
    instrs: &[I],
    n_vregs: u32,
    get_usage: impl Fn(&I, &mut HRegUsage),
) -> Result<Vec<VRegInfo>, RegAllocPanic> {
    let mut table = vec![VRegInfo::unused(); n_vregs as usize];

    for (ii, insn) in instrs.iter().enumerate() {
        let mut usage = HRegUsage::new();
        get_usage(insn, &mut usage);

        for (reg, mode) in usage.iter() {
            if !reg.is_virtual() {
                continue;
            }
            let vreg = reg.index();
            if vreg >= n_vregs {
                return Err(RegAllocPanic::VRegIndexOutOfRange {
                    insn: ii,
                    vreg,
                    n_vregs,
                });
            }
            let info = &mut table[vreg as usize];
            match mode {
                RegMode::Write => {
                    if info.live_after == -1 {
                        info.live_after = ii as i32;
                    }
                    info.dead_before = ii as i32 + 1;
                }
                RegMode::Read => {
                    if info.live_after == -1 {
                        return Err(RegAllocPanic::VRegFirstEventIsRead { vreg, insn: ii });
                    }
                    info.dead_before = ii as i32;
                }
                RegMode::Modify => {
                    if info.live_after == -1 {
                        return Err(RegAllocPanic::VRegFirstEventIsModify { vreg, insn: ii });
                    }
                    info.dead_before = ii as i32 + 1;
                }
            }
        }
    }

    trace!(
        "vreg liveness scan: {}/{} vregs used",
        table.iter().filter(|v| v.is_used()).count(),
        n_vregs
    );
    for (iv, info) in table.iter().enumerate() {
        if info.is_used() {
            debug_assert!(info.live_after < info.dead_before);
            trace!(
                "  v{}: live_after={} dead_before={}",
                iv,
                info.live_after,
                info.dead_before
            );
        }
    }

    Ok(table)
}
