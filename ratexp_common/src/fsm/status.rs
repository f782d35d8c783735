//! Per-machine status snapshot.

use bitflags::bitflags;

bitflags! {
    /// Machine status flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MachineFlags: u8 {
        /// Transition evaluation frozen.
        const PAUSED         = 0x01;
        /// A validated matrix is active.
        const VALID          = 0x02;
        /// DAQ scans are being produced.
        const DAQ_RUNNING    = 0x04;
        /// A matrix is waiting for its swap point.
        const PENDING_MATRIX = 0x08;
    }
}

impl Default for MachineFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// Counters and state of one machine, for logs and observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MachineStatus {
    pub flags: MachineFlags,
    pub current_state: u16,
    pub transition_count: u64,
    /// µs since the last reset.
    pub runtime_us: u64,
    pub nrt_dropped: u64,
    pub daq_dropped: u64,
    pub notify_dropped: u64,
}

impl MachineStatus {
    #[inline]
    pub const fn is_running(&self) -> bool {
        self.flags.contains(MachineFlags::VALID) && !self.flags.contains(MachineFlags::PAUSED)
    }

    /// Sum of every dropped-record counter.
    #[inline]
    pub const fn total_dropped(&self) -> u64 {
        self.nrt_dropped + self.daq_dropped + self.notify_dropped
    }
}
