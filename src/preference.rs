//! Register preferencing (stage 4).
//!
//! A pure hint pass: if a vreg's defining `Write` is a reg-reg move whose source is already a
//! bound rreg, recording that rreg as the vreg's preference lets stage 5's victim-selection
//! tie-break favour it, which tends to avoid emitting the move at all. Skipping this
//! pass entirely is always safe; it cannot change correctness, only the number of moves emitted.

use crate::hreg::HReg;
use crate::reg_usage::HRegUsage;
use crate::vreg::VRegInfo;

/// For every move instruction `v <- r` (as reported by `is_move`) where `v` is a vreg and the
/// move's destination is that vreg's defining `Write`, record `r` as the vreg's preference.
pub fn run<I>(
    instrs: &[I],
    table: &mut [VRegInfo],
    is_move: impl Fn(&I) -> Option<(HReg, HReg)>,
    _get_usage: impl Fn(&I, &mut HRegUsage),
) {
    for (ii, insn) in instrs.iter().enumerate() {
        let Some((src, dst)) = is_move(insn) else {
            continue;
        };
        if !dst.is_virtual() || !src.is_real() {
            continue;
        }
        let iv = dst.vreg_index();
        let Some(info) = table.get_mut(iv) else {
            continue;
        };
        // Only honour the move as a preference if it's genuinely this vreg's defining point.
        if info.live_after == ii as i32 {
            info.has_preference = true;
            info.preferred_rreg = Some(src);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hreg::RegClass;

    enum FakeInsn {
        Move(HReg, HReg),
        Other,
    }

    fn is_move(i: &FakeInsn) -> Option<(HReg, HReg)> {
        match i {
            FakeInsn::Move(s, d) => Some((*s, *d)),
            FakeInsn::Other => None,
        }
    }

    fn usage_of(_i: &FakeInsn, _out: &mut HRegUsage) {}

    #[test]
    fn move_from_rreg_sets_preference_at_defining_point() {
        let r0 = HReg::new_real(RegClass::Int, 0);
        let v0 = HReg::new_virtual(RegClass::Int, 0);
        let instrs = [FakeInsn::Move(r0, v0)];
        let mut table = vec![VRegInfo {
            live_after: 0,
            dead_before: 1,
            spill_offset: 0,
            spill_size: 8,
            has_preference: false,
            preferred_rreg: None,
        }];
        run(&instrs, &mut table, is_move, usage_of);
        assert!(table[0].has_preference);
        assert_eq!(table[0].preferred_rreg, Some(r0));
    }

    #[test]
    fn non_move_instructions_are_ignored() {
        let instrs = [FakeInsn::Other];
        let mut table = vec![VRegInfo {
            live_after: -1,
            dead_before: -1,
            spill_offset: 0,
            spill_size: 8,
            has_preference: false,
            preferred_rreg: None,
        }];
        run(&instrs, &mut table, is_move, usage_of);
        assert!(!table[0].has_preference);
    }
}
