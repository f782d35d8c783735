//! Input edge detection.

use ratexp_common::bits::column_bit;
use ratexp_common::fsm::matrix::{Edge, InputKind, Routing};

/// Sampled input channels: kind, first channel, channel count.
type InputWindow = (InputKind, usize, usize);

/// Turns successive input samples into fired event columns.
///
/// The first sample of a new input window only primes the detector; lines
/// already high at that point do not count as rising edges. A matrix swap
/// that keeps the same window keeps the previous sample, so an edge seen
/// in the swap tick still fires.
#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeDetector {
    last: u32,
    window: Option<InputWindow>,
}

impl EdgeDetector {
    pub const fn new() -> Self {
        Self {
            last: 0,
            window: None,
        }
    }

    /// Fold in a new sample; bit `i` is relative channel `i`.
    pub fn detect(&mut self, levels: u32, routing: &Routing) -> u64 {
        let window = (
            routing.input_kind(),
            routing.first_in_chan(),
            routing.num_in_chans(),
        );
        if self.window != Some(window) {
            self.last = levels;
            self.window = Some(window);
            return 0;
        }
        let changed = levels ^ self.last;
        self.last = levels;
        if changed == 0 {
            return 0;
        }
        let mut fired = 0u64;
        for chan in 0..routing.num_in_chans() {
            if (changed >> chan) & 1 == 0 {
                continue;
            }
            let edge = if (levels >> chan) & 1 == 1 {
                Edge::Up
            } else {
                Edge::Down
            };
            if let Some(column) = routing.input_column(chan, edge) {
                fired |= column_bit(column);
            }
        }
        fired
    }
}
