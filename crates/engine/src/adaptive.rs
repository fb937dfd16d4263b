//! Adaptive per-channel block sizing (spec §4.3).
//!
//! Each channel targets roughly one second of wall-clock time per
//! `send_file` call, growing or shrinking the next block size based on how
//! long the previous one took. The state is purely local to one channel's
//! loop — no coordination with other channels is needed or correct to add.

use std::time::Duration;

/// Starting block size when adaptive sizing is in effect.
pub const ADAPTIVE_START: u64 = 1 << 20; // 1 MiB

/// Every adaptive block size is rounded up to a multiple of this.
pub const BLOCK_SIZE_UNIT: u64 = 64 * 1024; // 64 KiB

/// Lower clamp for any block size, fixed or adaptive.
pub const MIN_BLOCK_SIZE: u64 = BLOCK_SIZE_UNIT;

/// Upper clamp for any block size, fixed or adaptive.
pub const MAX_TRANSFER_BLOCK_SIZE: u64 = 1 << 30; // 1 GiB

/// Rounds `size` up to the next multiple of [`BLOCK_SIZE_UNIT`] and clamps
/// it to `[MIN_BLOCK_SIZE, MAX_TRANSFER_BLOCK_SIZE]`.
#[must_use]
pub fn round_and_clamp(size: u64) -> u64 {
    let rounded = size.div_ceil(BLOCK_SIZE_UNIT).saturating_mul(BLOCK_SIZE_UNIT);
    rounded.clamp(MIN_BLOCK_SIZE, MAX_TRANSFER_BLOCK_SIZE)
}

/// Computes the next block size given the current one and how long the
/// last `send_file` call of that size took.
///
/// - `elapsed <= 0` (clock didn't advance): double the block size.
/// - `0 < elapsed <= 1s`: scale proportionally toward a 1-second call.
/// - `elapsed > 1s`: exponentially decay toward a 1-second call instead of
///   jumping straight there, so one slow block doesn't overcorrect.
#[must_use]
pub fn adjust_block_size(current: u64, elapsed: Duration) -> u64 {
    let micros = elapsed.as_micros();
    let b = current as f64;

    let next = if micros == 0 {
        b * 2.0
    } else if micros <= 1_000_000 {
        b * 1_000_000.0 / micros as f64
    } else {
        0.8 * b + 0.2 * (b * 1_000_000.0 / micros as f64)
    };

    round_and_clamp(next as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_elapsed_doubles() {
        assert_eq!(adjust_block_size(ADAPTIVE_START, Duration::ZERO), round_and_clamp(2 * ADAPTIVE_START));
    }

    #[test]
    fn sub_second_scales_up_proportionally() {
        // Half a second for a 1 MiB block implies a 2 MiB block hits ~1s.
        let next = adjust_block_size(ADAPTIVE_START, Duration::from_millis(500));
        assert_eq!(next, round_and_clamp(2 * ADAPTIVE_START));
    }

    #[test]
    fn exactly_one_second_is_unchanged() {
        let next = adjust_block_size(ADAPTIVE_START, Duration::from_secs(1));
        assert_eq!(next, round_and_clamp(ADAPTIVE_START));
    }

    #[test]
    fn over_one_second_decays_toward_target_rather_than_snapping() {
        // 2s for a 1 MiB block implies target = 0.5 MiB; decayed result
        // should sit between the current size and the naive target.
        let next = adjust_block_size(ADAPTIVE_START, Duration::from_secs(2));
        let naive_target = round_and_clamp(ADAPTIVE_START / 2);
        assert!(next > naive_target);
        assert!(next < ADAPTIVE_START);
    }

    #[test]
    fn result_is_always_64kib_aligned() {
        for micros in [0u64, 1, 999_999, 1_000_000, 1_000_001, 5_000_000] {
            let next = adjust_block_size(ADAPTIVE_START, Duration::from_micros(micros));
            assert_eq!(next % BLOCK_SIZE_UNIT, 0, "micros={micros}");
        }
    }

    #[test]
    fn result_never_exceeds_max() {
        let next = adjust_block_size(MAX_TRANSFER_BLOCK_SIZE, Duration::ZERO);
        assert_eq!(next, MAX_TRANSFER_BLOCK_SIZE);
    }

    #[test]
    fn result_never_falls_below_min() {
        let next = adjust_block_size(MIN_BLOCK_SIZE, Duration::from_secs(100));
        assert_eq!(next, MIN_BLOCK_SIZE);
    }

    #[test]
    fn round_and_clamp_rounds_up_to_unit_multiple() {
        assert_eq!(round_and_clamp(1), MIN_BLOCK_SIZE);
        assert_eq!(round_and_clamp(BLOCK_SIZE_UNIT + 1), 2 * BLOCK_SIZE_UNIT);
    }
}
