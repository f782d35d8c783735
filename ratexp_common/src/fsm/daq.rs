//! Data-acquisition request and scan records.

use serde::{Deserialize, Serialize};

use crate::consts::{DAQ_SCAN_MAGIC, MAX_DAQ_CHANS};

/// Start-DAQ parameters. Range bounds are volts scaled by 1e6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DaqSpec {
    /// Bit `i` selects channel `i`.
    pub channel_mask: u32,
    pub range_min_fixed1e6: i64,
    pub range_max_fixed1e6: i64,
}

impl DaqSpec {
    /// A spec is usable when it selects at least one channel and the range
    /// is non-empty.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.channel_mask != 0 && self.range_min_fixed1e6 < self.range_max_fixed1e6
    }

    #[inline]
    pub fn num_channels(&self) -> usize {
        self.channel_mask.count_ones() as usize
    }
}

/// One DAQ scan: a sample for every channel in the mask, lowest channel first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaqScan {
    pub magic: u32,
    /// Scan time in ns since the last reset.
    pub ts_nanos: u64,
    pub samples: heapless::Vec<u16, MAX_DAQ_CHANS>,
}

impl DaqScan {
    pub fn new(ts_nanos: u64) -> Self {
        Self {
            magic: DAQ_SCAN_MAGIC,
            ts_nanos,
            samples: heapless::Vec::new(),
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic == DAQ_SCAN_MAGIC
    }
}
