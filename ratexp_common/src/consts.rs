//! System-wide constants for the RatExp FSM workspace.
//!
//! Single source of truth for capacity ceilings, wire magic numbers and
//! default tunables. Shared by both crates.

use static_assertions::const_assert;

// ─── Matrix Capacity Ceilings ───────────────────────────────────────

/// Maximum number of physical input channels routed into a matrix.
pub const MAX_IN_CHANS: usize = 32;

/// Maximum number of physical digital output channels.
pub const MAX_OUT_CHANS: usize = 32;

/// Maximum number of event columns (one per input edge).
pub const MAX_EVT_COLS: usize = MAX_IN_CHANS * 2;

/// Maximum number of output columns.
pub const MAX_OUT_COLS: usize = 16;

/// Maximum number of scheduled waves.
///
/// Wave trigger cells are `u32` bitmasks, one bit per wave id.
pub const MAX_SCHED_WAVES: usize = 32;

/// Maximum number of states (matrix rows).
///
/// Transition records store states as `u16`.
pub const MAX_ROWS: usize = u16::MAX as usize;

/// Maximum number of matrix cells (512 KiB of `u32`, as on the original rig).
pub const MAX_CELLS: usize = (512 * 1024) / core::mem::size_of::<u32>();

/// Maximum number of samples in one AO wave.
pub const AO_MAX_SAMPLES: usize = MAX_CELLS / 2;

/// Maximum number of AO waves loaded per machine.
pub const MAX_AO_WAVES: usize = MAX_SCHED_WAVES;

/// Number of fixed columns following the event columns (`timeout_state`, `timeout_us`).
pub const FIXED_COLS: usize = 2;

// The fired-event set is a `u64` bitmask, wave triggers a `u32` bitmask,
// digital outputs a `u32` bitmask.
const_assert!(MAX_EVT_COLS <= 64);
const_assert!(MAX_SCHED_WAVES <= 32);
const_assert!(MAX_OUT_CHANS <= 32);
const_assert!(MAX_IN_CHANS <= 32);

// ─── Protocol ───────────────────────────────────────────────────────

/// Maximum number of transition records returned by one request.
pub const MSG_MAX_TRANSITIONS: usize = 64;

/// Maximum number of machine instances sharing one communication region.
pub const MAX_MACHINES: usize = 16;

/// Default number of machine instances.
pub const NUM_MACHINES_DEFAULT: usize = 6;

/// Capacity of the host field in a network output spec.
pub const IP_HOST_LEN: usize = 80;

/// Capacity of a network output template.
pub const FMT_TEXT_LEN: usize = 1024 - core::mem::size_of::<u16>() - IP_HOST_LEN;

/// Magic number carried by every deferred network output record.
pub const NRT_OUTPUT_MAGIC: u16 = 0x12c8;

/// Magic number carried by every DAQ scan record.
pub const DAQ_SCAN_MAGIC: u32 = 0x133710;

/// Number of DAQ channels (one bit per channel in the scan mask).
pub const MAX_DAQ_CHANS: usize = 32;

/// Conventional "ready for trial" jump state.
pub const READY_FOR_TRIAL_STATE_DEFAULT: u16 = 35;

// ─── Timing ─────────────────────────────────────────────────────────

/// Default tick period in microseconds (~6 kHz).
pub const TICK_PERIOD_US_DEFAULT: u32 = 166;

/// Minimum allowed tick period [µs].
pub const TICK_PERIOD_US_MIN: u32 = 50;

/// Maximum allowed tick period [µs].
pub const TICK_PERIOD_US_MAX: u32 = 10_000;

/// Default AO sample clock [Hz].
pub const AO_SAMPLE_RATE_HZ_DEFAULT: u32 = 10_000;

/// Nanoseconds per microsecond.
pub const NANOS_PER_US: u64 = 1_000;

/// Nanoseconds per second.
pub const NANOS_PER_SEC: u64 = 1_000_000_000;

// ─── Engine Tunables ────────────────────────────────────────────────

/// Default transition log capacity (records retained).
pub const LOG_CAPACITY_DEFAULT: usize = 65_536;

/// Largest transition log a machine may preallocate.
pub const LOG_CAPACITY_MAX: usize = 1 << 24;

/// Default capacity of the deferred network output queue.
pub const NRT_QUEUE_CAPACITY_DEFAULT: usize = 10;

/// Default capacity of the DAQ scan queue.
pub const DAQ_QUEUE_CAPACITY_DEFAULT: usize = 4_096;

/// Default capacity of the transition notification queue.
pub const TRANSITION_QUEUE_CAPACITY_DEFAULT: usize = 128;

/// Largest queue a machine may preallocate.
pub const QUEUE_CAPACITY_MAX: usize = 1 << 20;

/// Default AO / DAQ converter code range (16-bit).
pub const MAX_DATA_DEFAULT: u16 = u16::MAX;

/// Default number of ticks between overrun summaries.
pub const OVERRUN_REPORT_INTERVAL_DEFAULT: u64 = 1_000;
