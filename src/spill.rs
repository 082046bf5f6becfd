//! Spill-slot assignment (stage 3).

use crate::error::RegAllocPanic;
use crate::vreg::VRegInfo;
use log::trace;

/// Width in bytes of one spill slot.
pub const SPILL_SLOT_BYTES: u32 = 8;

/// Assign every used vreg in `table` a `spill_offset`, packing vregs into `n_spill64s` slots by
/// first-fit over their live ranges.
///
/// Vregs are processed in index order, which is also increasing `live_after` order: upstream
/// code generators assign vreg numbers monotonically as they emit instructions, so this is
/// exactly the standard "process intervals sorted by start point" precondition for first-fit
/// interval colouring.
pub fn assign(table: &mut [VRegInfo], n_spill64s: u32) -> Result<(), RegAllocPanic> {
    let mut busy_until_before = vec![0i32; n_spill64s as usize];

    for (iv, info) in table.iter_mut().enumerate() {
        if !info.is_used() {
            continue;
        }
        let slot = busy_until_before
            .iter()
            .position(|&busy| busy <= info.live_after);
        let Some(slot) = slot else {
            return Err(RegAllocPanic::SpillPoolExhausted {
                n_spill64s,
                vreg: iv as u32,
                live_after: info.live_after,
            });
        };
        busy_until_before[slot] = info.dead_before;
        info.spill_offset = slot as u32 * SPILL_SLOT_BYTES;
        trace!(
            "v{}: spill slot {} (offset {})",
            iv,
            slot,
            info.spill_offset
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn used(live_after: i32, dead_before: i32) -> VRegInfo {
        VRegInfo {
            live_after,
            dead_before,
            spill_offset: 0,
            spill_size: 8,
            has_preference: false,
            preferred_rreg: None,
        }
    }

    fn unused() -> VRegInfo {
        used(-1, -1)
    }

    #[test]
    fn disjoint_ranges_share_one_slot() {
        let mut table = vec![used(0, 2), used(2, 4)];
        assign(&mut table, 1).unwrap();
        assert_eq!(table[0].spill_offset, 0);
        assert_eq!(table[1].spill_offset, 0);
    }

    #[test]
    fn overlapping_ranges_need_separate_slots() {
        let mut table = vec![used(0, 4), used(1, 3)];
        assign(&mut table, 2).unwrap();
        assert_ne!(table[0].spill_offset, table[1].spill_offset);
    }

    #[test]
    fn unused_vregs_are_skipped() {
        let mut table = vec![unused(), used(0, 1)];
        assign(&mut table, 1).unwrap();
        assert_eq!(table[1].spill_offset, 0);
    }

    #[test]
    fn exhaustion_is_fatal() {
        let mut table = vec![used(0, 5), used(1, 5), used(2, 5)];
        let err = assign(&mut table, 2).unwrap_err();
        assert_eq!(
            err,
            RegAllocPanic::SpillPoolExhausted {
                n_spill64s: 2,
                vreg: 2,
                live_after: 2,
            }
        );
    }

    #[test]
    fn slot_zero_is_available_from_the_first_instruction() {
        // The busy_until_before pool starts at 0, so a vreg with live_after == 0 can still
        // claim slot 0 immediately (0 <= 0).
        let mut table = vec![used(0, 1)];
        assign(&mut table, 1).unwrap();
        assert_eq!(table[0].spill_offset, 0);
    }
}
