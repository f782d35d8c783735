//! Bitmask helpers for channel sets and fired-event sets.
//!
//! Digital lines are packed into a `u32` (one bit per channel, bit 0 =
//! channel 0). Fired event columns are packed into a `u64` (bit `c` =
//! event column `c`). All helpers are branch-light and inline, for use
//! on the per-tick path.

use crate::consts::{MAX_EVT_COLS, MAX_OUT_CHANS};

/// Mask covering the inclusive channel range `from..=to`.
///
/// Returns 0 when the range is empty (`from > to`) or starts past the
/// last channel; channels past the last one are clipped.
#[inline]
pub fn channel_range_mask(from: u8, to: u8) -> u32 {
    let (from, to) = (from as usize, to as usize);
    if from > to || from >= MAX_OUT_CHANS {
        return 0;
    }
    let to = to.min(MAX_OUT_CHANS - 1);
    let width = to - from + 1;
    let base = if width >= 32 { u32::MAX } else { (1u32 << width) - 1 };
    base << from
}

/// Place the low bits of `value` onto the channel range `from..=to`.
///
/// Bit `i` of `value` drives channel `from + i`. Bits that would land
/// outside the range are discarded.
#[inline]
pub fn spread_onto_range(value: u32, from: u8, to: u8) -> u32 {
    let range = channel_range_mask(from, to);
    if range == 0 {
        return 0;
    }
    (value << from) & range
}

/// Lowest set bit of an event set, i.e. the lowest-indexed fired column.
#[inline]
pub fn lowest_column(fired: u64) -> Option<usize> {
    if fired == 0 {
        None
    } else {
        Some(fired.trailing_zeros() as usize)
    }
}

/// Single-column event set.
///
/// Returns 0 for columns past the event-column ceiling.
#[inline]
pub fn column_bit(column: usize) -> u64 {
    if column < MAX_EVT_COLS {
        1u64 << column
    } else {
        0
    }
}

/// Set or clear one channel in a line mask.
#[inline]
pub fn set_line(lines: &mut u32, channel: usize, value: bool) {
    debug_assert!(
        channel < MAX_OUT_CHANS,
        "output channel {channel} out of range (max {MAX_OUT_CHANS})"
    );
    if channel >= MAX_OUT_CHANS {
        return;
    }
    if value {
        *lines |= 1u32 << channel;
    } else {
        *lines &= !(1u32 << channel);
    }
}

/// Read one channel from a line mask.
#[inline]
pub fn get_line(lines: u32, channel: usize) -> bool {
    channel < MAX_OUT_CHANS && (lines >> channel) & 1 == 1
}

/// Iterator over the indices of the set bits in `mask`, lowest first.
#[inline]
pub fn set_bits(mut mask: u64) -> impl Iterator<Item = usize> {
    core::iter::from_fn(move || {
        if mask == 0 {
            return None;
        }
        let bit = mask.trailing_zeros() as usize;
        mask &= mask - 1;
        Some(bit)
    })
}

// ─── Tests ──────────────────────────────────────────────────────────
