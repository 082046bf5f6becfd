//! The allocation pass (stage 5): the state machine that actually produces output.

use crate::config::Config;
use crate::error::RegAllocPanic;
use crate::hreg::{HReg, RegClass};
use crate::reg_usage::{HRegUsage, RegMode};
use crate::rreg::{Disp, RRegInfo, RRegState};
use crate::target::RegAllocTarget;
use crate::vreg::VRegInfo;
use log::trace;

/// Counts of the work stage 5 actually did, for callers who want a cheap summary without
/// instrumenting their own target callbacks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    /// Spill instructions emitted.
    pub spills: u32,
    /// Reload (restore) instructions emitted.
    pub reloads: u32,
    /// Times a `Bound` rreg was evicted to make way for an incoming hard range.
    pub hard_range_evictions: u32,
}

/// Which kind of rreg stage 5 handed back to the caller for a new binding.
enum Victim {
    /// Already free; no eviction needed.
    Free(usize),
    /// Currently `Bound` to some other vreg; caller must spill it first.
    Evict(usize),
}

/// Run stage 5 over `instrs`, producing the rewritten output stream.
#[allow(clippy::too_many_arguments)]
pub fn run<I>(
    instrs: Vec<I>,
    available_real_regs: &[HReg],
    vreg_table: &[VRegInfo],
    hard_ranges: &[RRegInfo],
    target: &impl RegAllocTarget<I>,
    config: &Config,
) -> Result<(Vec<I>, Stats), RegAllocPanic> {
    let mut rreg_state = RRegState::initial(available_real_regs);
    let mut stats = Stats::default();
    let mut out = Vec::with_capacity(instrs.len());

    for (ii, mut insn) in instrs.into_iter().enumerate() {
        // (a) Expire dead bindings.
        for entry in rreg_state.iter_mut() {
            if let Disp::Bound(v) = entry.disp {
                if vreg_table[v as usize].dead_before == ii as i32 {
                    trace!("insn {}: v{} dies in {:?}", ii, v, entry.rreg);
                    entry.disp = Disp::Free;
                }
            }
        }

        // (b) Hard-range transitions.
        //
        // A hard range's defining write clobbers its rreg immediately, at `live_after` itself, so
        // any vreg already occupying that rreg must be spilled before this instruction runs — not
        // one instruction later, once the range's open interval has actually been entered. Handle
        // that eviction first, keyed directly on `live_after == ii`.
        for entry in rreg_state.iter_mut() {
            if let Disp::Bound(v) = entry.disp {
                if hard_ranges
                    .iter()
                    .any(|hr| hr.rreg == entry.rreg && hr.live_after == ii as i32)
                {
                    let offset = vreg_table[v as usize].spill_offset;
                    out.push(target.gen_spill(entry.rreg, offset));
                    stats.spills += 1;
                    stats.hard_range_evictions += 1;
                    trace!(
                        "insn {}: evicting v{} from {:?} ahead of its hard range's defining write",
                        ii,
                        v,
                        entry.rreg
                    );
                    entry.disp = Disp::Free;
                }
            }
        }

        // Then recompute each rreg's steady disposition directly from `contains_open`, rather
        // than reacting to a separate end event: a hard range whose own write is never
        // subsequently read has an empty open interval and should never flip a register to
        // `Unavail` at all, and two back-to-back hard ranges on the same rreg should never
        // produce a spurious moment of `Free` in between. The `(true, Bound)` arm below still
        // matters even after the eviction above: it catches a vreg that got bound into this same
        // rreg during the `live_after` instant itself (nothing stopped it, since the rreg reads
        // as unprotected until `contains_open` turns true), and must be evicted the moment
        // protection actually begins.
        for entry in rreg_state.iter_mut() {
            let protected = hard_ranges
                .iter()
                .any(|hr| hr.rreg == entry.rreg && hr.contains_open(ii));
            match (protected, entry.disp) {
                (true, Disp::Unavail) | (false, Disp::Free) => {}
                (true, Disp::Bound(v)) => {
                    let offset = vreg_table[v as usize].spill_offset;
                    out.push(target.gen_spill(entry.rreg, offset));
                    stats.spills += 1;
                    stats.hard_range_evictions += 1;
                    trace!(
                        "insn {}: evicting v{} from {:?} for hard range",
                        ii,
                        v,
                        entry.rreg
                    );
                    entry.disp = Disp::Unavail;
                }
                (true, Disp::Free) => entry.disp = Disp::Unavail,
                (false, Disp::Unavail) => entry.disp = Disp::Free,
                (false, Disp::Bound(_)) => {}
            }
        }

        // The invariants hold of the state as it stands during execution of instruction `ii`,
        // which is only true once (a) and (b) above have both been applied.
        if config.enable_sanity_checks {
            sanity_checks(ii, &rreg_state, hard_ranges)?;
        }

        // Gather this instruction's register usage once; it drives (c), (d) and (e).
        let mut usage = HRegUsage::new();
        target.get_reg_usage(&insn, &mut usage);
        let mentioned_vregs: Vec<u32> = usage
            .iter()
            .filter(|(r, _)| r.is_virtual())
            .map(|(r, _)| r.index())
            .collect();

        // (c) Reload reads (and modifies, which also need the prior value).
        for (reg, mode) in usage.iter() {
            if !reg.is_virtual() || !matches!(mode, RegMode::Read | RegMode::Modify) {
                continue;
            }
            let iv = reg.index();
            if is_bound(&rreg_state, iv) {
                continue;
            }
            let idx = bind(
                &mut rreg_state,
                hard_ranges,
                vreg_table,
                target,
                &mut out,
                &mut stats,
                reg,
                iv,
                &mentioned_vregs,
                ii,
            )?;
            let offset = vreg_table[iv as usize].spill_offset;
            out.push(target.gen_restore(rreg_state[idx].rreg, offset));
            stats.reloads += 1;
            trace!(
                "insn {}: reload v{} into {:?}",
                ii,
                iv,
                rreg_state[idx].rreg
            );
        }

        // (d) Allocate writes: no reload needed, the value doesn't exist yet.
        for (reg, mode) in usage.iter() {
            if !reg.is_virtual() || mode != RegMode::Write {
                continue;
            }
            let iv = reg.index();
            if is_bound(&rreg_state, iv) {
                continue;
            }
            bind(
                &mut rreg_state,
                hard_ranges,
                vreg_table,
                target,
                &mut out,
                &mut stats,
                reg,
                iv,
                &mentioned_vregs,
                ii,
            )?;
        }

        // (e) Rewrite and emit.
        let mapping: Vec<(HReg, HReg)> = mentioned_vregs
            .iter()
            .map(|&iv| {
                let rreg = rreg_state
                    .iter()
                    .find(|e| matches!(e.disp, Disp::Bound(v) if v == iv))
                    .map(|e| e.rreg)
                    .expect("every vreg mentioned by this instruction is bound by now");
                let vreg_handle = usage
                    .iter()
                    .find(|(r, _)| r.is_virtual() && r.index() == iv)
                    .map(|(r, _)| r)
                    .expect("vreg came from this instruction's own usage list");
                (vreg_handle, rreg)
            })
            .collect();
        target.map_regs(&mut insn, &mapping);
        out.push(insn);
    }

    Ok((out, stats))
}

fn is_bound(rreg_state: &[RRegState], vreg: u32) -> bool {
    rreg_state
        .iter()
        .any(|e| matches!(e.disp, Disp::Bound(v) if v == vreg))
}

/// Select a victim rreg for `vreg` (an operand of the current instruction) and, if it requires
/// evicting a currently-`Bound` rreg, emit the spill for the evicted vreg. Returns the index
/// into `rreg_state` now `Bound` to `vreg`.
#[allow(clippy::too_many_arguments)]
fn bind<I>(
    rreg_state: &mut [RRegState],
    hard_ranges: &[RRegInfo],
    vreg_table: &[VRegInfo],
    target: &impl RegAllocTarget<I>,
    out: &mut Vec<I>,
    stats: &mut Stats,
    reg: HReg,
    vreg: u32,
    mentioned_vregs: &[u32],
    ii: usize,
) -> Result<usize, RegAllocPanic> {
    let class = reg.class();
    let preferred = vreg_table[vreg as usize]
        .has_preference
        .then(|| vreg_table[vreg as usize].preferred_rreg)
        .flatten();

    let victim = choose_victim(
        rreg_state,
        hard_ranges,
        vreg_table,
        class,
        preferred,
        mentioned_vregs,
        ii,
        vreg,
    )?;

    let idx = match victim {
        Victim::Free(idx) => idx,
        Victim::Evict(idx) => {
            if let Disp::Bound(evicted) = rreg_state[idx].disp {
                let offset = vreg_table[evicted as usize].spill_offset;
                out.push(target.gen_spill(rreg_state[idx].rreg, offset));
                stats.spills += 1;
                trace!(
                    "insn {}: spilling v{} out of {:?} to make room for v{}",
                    ii,
                    evicted,
                    rreg_state[idx].rreg,
                    vreg
                );
            }
            idx
        }
    };

    if rreg_state[idx].rreg.class() != class {
        return Err(RegAllocPanic::ClassMismatch {
            rreg: rreg_state[idx].rreg,
            vreg,
            rreg_class: rreg_state[idx].rreg.class(),
            vreg_class: class,
        });
    }
    rreg_state[idx].disp = Disp::Bound(vreg);
    Ok(idx)
}

/// Victim-selection policy: free registers of the right class first (honouring the
/// preference, then farthest-future hard-range conflict, then lowest index), else a bound
/// register whose held vreg isn't one of this instruction's own operands (farthest `dead_before`
/// first, i.e. spill whoever is least urgently needed), else fail.
fn choose_victim(
    rreg_state: &[RRegState],
    hard_ranges: &[RRegInfo],
    vreg_table: &[VRegInfo],
    class: RegClass,
    preferred: Option<HReg>,
    mentioned_vregs: &[u32],
    ii: usize,
    vreg: u32,
) -> Result<Victim, RegAllocPanic> {
    if let Some(preferred) = preferred {
        if preferred.class() == class {
            if let Some(idx) = rreg_state
                .iter()
                .position(|e| e.rreg == preferred && matches!(e.disp, Disp::Free))
            {
                return Ok(Victim::Free(idx));
            }
        }
    }

    let next_conflict = |rreg: HReg| -> i32 {
        hard_ranges
            .iter()
            .filter(|hr| hr.rreg == rreg && hr.live_after >= ii as i32)
            .map(|hr| hr.live_after)
            .min()
            .unwrap_or(i32::MAX)
    };

    let free_best = rreg_state
        .iter()
        .enumerate()
        .filter(|(_, e)| e.rreg.class() == class && matches!(e.disp, Disp::Free))
        .max_by_key(|(idx, e)| (next_conflict(e.rreg), core::cmp::Reverse(*idx)));
    if let Some((idx, _)) = free_best {
        return Ok(Victim::Free(idx));
    }

    let evict_best = rreg_state
        .iter()
        .enumerate()
        .filter(|(_, e)| {
            e.rreg.class() == class
                && matches!(e.disp, Disp::Bound(v) if !mentioned_vregs.contains(&v))
        })
        .max_by_key(|(idx, e)| match e.disp {
            Disp::Bound(v) => (vreg_table[v as usize].dead_before, core::cmp::Reverse(*idx)),
            _ => unreachable!(),
        });
    if let Some((idx, _)) = evict_best {
        return Ok(Victim::Evict(idx));
    }

    Err(RegAllocPanic::NoSuitableRReg { class, vreg, insn: ii })
}

/// The four per-boundary invariants, checked at the start of processing instruction `ii`
/// (i.e. against the state as it was left after instruction `ii - 1`).
fn sanity_checks(
    ii: usize,
    rreg_state: &[RRegState],
    hard_ranges: &[RRegInfo],
) -> Result<(), RegAllocPanic> {
    // 1. Every hard range open at `ii` has its rreg marked Unavail.
    for hr in hard_ranges.iter().filter(|hr| hr.contains_open(ii)) {
        let entry = rreg_state.iter().find(|e| e.rreg == hr.rreg);
        match entry {
            Some(e) if matches!(e.disp, Disp::Unavail) => {}
            _ => {
                return Err(RegAllocPanic::PhantomUnavail {
                    rreg: hr.rreg,
                    insn: ii,
                    detail: "hard range is open but rreg is not Unavail",
                });
            }
        }
    }

    // 2. Every Unavail rreg corresponds to some hard range open at `ii`.
    for entry in rreg_state.iter().filter(|e| matches!(e.disp, Disp::Unavail)) {
        if !hard_ranges
            .iter()
            .any(|hr| hr.rreg == entry.rreg && hr.contains_open(ii))
        {
            return Err(RegAllocPanic::PhantomUnavail {
                rreg: entry.rreg,
                insn: ii,
                detail: "rreg is Unavail but no hard range is open",
            });
        }
    }

    // 3. No vreg is bound to two rregs at once.
    for (i, a) in rreg_state.iter().enumerate() {
        if let Disp::Bound(va) = a.disp {
            for b in &rreg_state[i + 1..] {
                if let Disp::Bound(vb) = b.disp {
                    if va == vb {
                        return Err(RegAllocPanic::DuplicateBinding {
                            vreg: va,
                            first: a.rreg,
                            second: b.rreg,
                            insn: ii,
                        });
                    }
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hreg::RegClass;

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum FakeInsn {
        Def(HReg),
        Move(HReg, HReg),
        Use(HReg),
        UseDef(HReg, HReg),
        UseTwo(HReg, HReg),
        Spill(HReg, u32),
        Restore(HReg, u32),
    }

    struct FakeTarget;

    impl RegAllocTarget<FakeInsn> for FakeTarget {
        fn is_move(&self, insn: &FakeInsn) -> Option<(HReg, HReg)> {
            match insn {
                FakeInsn::Move(s, d) => Some((*s, *d)),
                _ => None,
            }
        }

        fn get_reg_usage(&self, insn: &FakeInsn, usage: &mut HRegUsage) {
            match *insn {
                FakeInsn::Def(d) => usage.push(d, RegMode::Write),
                FakeInsn::Move(s, d) => {
                    usage.push(s, RegMode::Read);
                    usage.push(d, RegMode::Write);
                }
                FakeInsn::Use(u) => usage.push(u, RegMode::Read),
                FakeInsn::UseDef(u, d) => {
                    usage.push(u, RegMode::Read);
                    usage.push(d, RegMode::Write);
                }
                FakeInsn::UseTwo(a, b) => {
                    usage.push(a, RegMode::Read);
                    usage.push(b, RegMode::Read);
                }
                FakeInsn::Spill(..) | FakeInsn::Restore(..) => {}
            }
        }

        fn map_regs(&self, insn: &mut FakeInsn, mapping: &[(HReg, HReg)]) {
            let rewrite = |h: HReg| mapping.iter().find(|(v, _)| *v == h).map_or(h, |(_, r)| *r);
            *insn = match *insn {
                FakeInsn::Def(d) => FakeInsn::Def(rewrite(d)),
                FakeInsn::Move(s, d) => FakeInsn::Move(rewrite(s), rewrite(d)),
                FakeInsn::Use(u) => FakeInsn::Use(rewrite(u)),
                FakeInsn::UseDef(u, d) => FakeInsn::UseDef(rewrite(u), rewrite(d)),
                FakeInsn::UseTwo(a, b) => FakeInsn::UseTwo(rewrite(a), rewrite(b)),
                ref other => other.clone(),
            };
        }

        fn gen_spill(&self, rreg: HReg, offset: u32) -> FakeInsn {
            FakeInsn::Spill(rreg, offset)
        }

        fn gen_restore(&self, rreg: HReg, offset: u32) -> FakeInsn {
            FakeInsn::Restore(rreg, offset)
        }
    }

    fn rregs(n: u32) -> Vec<HReg> {
        (0..n).map(|i| HReg::new_real(RegClass::Int, i)).collect()
    }

    #[test]
    fn two_vregs_fit_in_two_rregs_with_no_spills() {
        let v0 = HReg::new_virtual(RegClass::Int, 0);
        let v1 = HReg::new_virtual(RegClass::Int, 1);
        let instrs = vec![
            FakeInsn::Def(v0),
            FakeInsn::Def(v1),
            FakeInsn::UseDef(v0, v0),
            FakeInsn::Use(v1),
        ];
        let vreg_table = crate::vreg::scan(&instrs, 2, |i, u| FakeTarget.get_reg_usage(i, u)).unwrap();
        let (out, stats) = run(instrs, &rregs(2), &vreg_table, &[], &FakeTarget, &Config::default()).unwrap();
        assert_eq!(out.len(), 4);
        assert_eq!(stats.spills, 0);
        assert_eq!(stats.reloads, 0);
    }

    #[test]
    fn more_vregs_than_rregs_forces_a_spill_and_reload() {
        let v0 = HReg::new_virtual(RegClass::Int, 0);
        let v1 = HReg::new_virtual(RegClass::Int, 1);
        let instrs = vec![
            FakeInsn::Def(v0),
            FakeInsn::Def(v1),
            FakeInsn::Use(v0),
            FakeInsn::Use(v1),
        ];
        let vreg_table = crate::vreg::scan(&instrs, 2, |i, u| FakeTarget.get_reg_usage(i, u)).unwrap();
        let mut vreg_table = vreg_table;
        crate::spill::assign(&mut vreg_table, 4).unwrap();
        let (out, stats) = run(instrs, &rregs(1), &vreg_table, &[], &FakeTarget, &Config::default()).unwrap();
        assert_eq!(stats.spills, 1);
        assert_eq!(stats.reloads, 1);
        assert_eq!(out.len(), 6);
    }

    #[test]
    fn hard_range_evicts_a_bound_vreg() {
        let v0 = HReg::new_virtual(RegClass::Int, 0);
        let r0 = HReg::new_real(RegClass::Int, 0);
        let instrs = vec![FakeInsn::Def(v0), FakeInsn::Use(r0), FakeInsn::Use(v0)];
        let vreg_table = crate::vreg::scan(&instrs, 1, |i, u| FakeTarget.get_reg_usage(i, u)).unwrap();
        let mut vreg_table = vreg_table;
        crate::spill::assign(&mut vreg_table, 1).unwrap();
        let hard_ranges = vec![RRegInfo {
            rreg: r0,
            live_after: 0,
            dead_before: 2,
        }];
        let (out, stats) =
            run(instrs, &rregs(1), &vreg_table, &hard_ranges, &FakeTarget, &Config::default()).unwrap();
        assert_eq!(stats.hard_range_evictions, 1);
        assert_eq!(stats.spills, 1);
        assert_eq!(stats.reloads, 1);
        // The spill must land before r0's hard-range instruction, not after: by the time that
        // instruction runs, r0's own write has already clobbered whatever v0 left there.
        assert_eq!(out.len(), 5);
        assert_eq!(out[0], FakeInsn::Def(r0));
        assert_eq!(out[1], FakeInsn::Spill(r0, vreg_table[0].spill_offset));
        assert_eq!(out[2], FakeInsn::Use(r0));
    }

    #[test]
    fn preferenced_move_avoids_a_redundant_move() {
        let r0 = HReg::new_real(RegClass::Int, 0);
        let v0 = HReg::new_virtual(RegClass::Int, 0);
        let instrs = vec![FakeInsn::Move(r0, v0), FakeInsn::Use(v0)];
        let mut vreg_table = crate::vreg::scan(&instrs, 1, |i, u| FakeTarget.get_reg_usage(i, u)).unwrap();
        crate::spill::assign(&mut vreg_table, 1).unwrap();
        crate::preference::run(&instrs, &mut vreg_table, |i| FakeTarget.is_move(i), |i, u| FakeTarget.get_reg_usage(i, u));
        assert_eq!(vreg_table[0].preferred_rreg, Some(r0));
        let (out, _stats) = run(instrs, &rregs(2), &vreg_table, &[], &FakeTarget, &Config::default()).unwrap();
        // The move's destination binds straight to r0, matching the preference.
        assert_eq!(out[0], FakeInsn::Move(r0, r0));
    }

    #[test]
    fn exhausted_rregs_is_fatal() {
        // Both v0 and v1 are simultaneously live operands of the same instruction, so neither
        // can be evicted to make room for the other; with only one rreg available there is no
        // legal binding.
        let v0 = HReg::new_virtual(RegClass::Int, 0);
        let v1 = HReg::new_virtual(RegClass::Int, 1);
        let instrs = vec![FakeInsn::Def(v0), FakeInsn::Def(v1), FakeInsn::UseTwo(v0, v1)];
        let vreg_table = crate::vreg::scan(&instrs, 2, |i, u| FakeTarget.get_reg_usage(i, u)).unwrap();
        let err = run(instrs, &rregs(1), &vreg_table, &[], &FakeTarget, &Config::default()).unwrap_err();
        assert!(matches!(err, RegAllocPanic::NoSuitableRReg { .. }));
    }
}
