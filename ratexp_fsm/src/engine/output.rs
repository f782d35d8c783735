//! Output router.
//!
//! Dispatches the output columns of a newly entered state:
//!
//! | Spec | Cell value | Action |
//! |---|---|---|
//! | `DigitalOut` | channel bitmask | held until the next state entry |
//! | `Trigger` | channel bitmask | one-tick pulse |
//! | `Sound` | `+id` / `-id` / 0 | play / stop / nothing |
//! | `SchedWave` | wave bitmask | trigger waves |
//! | `Tcp` / `Udp` | non-zero value | deferred record onto the NRT queue |
//! | `Noop` | any | nothing |

use ratexp_common::bits::{channel_range_mask, spread_onto_range};
use ratexp_common::fsm::matrix::{OutputSpec, StateMatrix, Transport};
use ratexp_common::fsm::nrt::NrtOutput;

use crate::backend::IoBackend;
use crate::queue::QueueProducer;

/// Timestamps attached to deferred records.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stamp {
    pub internal_ns: u64,
    pub external_ns: u64,
}

/// Digital output state and deferred-output producer of one machine.
#[derive(Debug)]
pub struct OutputRouter {
    held: u32,
    pulses: u32,
    nrt: QueueProducer<NrtOutput>,
}

impl OutputRouter {
    pub fn new(nrt: QueueProducer<NrtOutput>) -> Self {
        Self {
            held: 0,
            pulses: 0,
            nrt,
        }
    }

    /// Evaluate every non-noop output column of `state`.
    ///
    /// Returns the mask of scheduled waves to trigger (from `SchedWave`
    /// columns and the trailing wave-trigger column).
    pub fn dispatch<B: IoBackend>(
        &mut self,
        matrix: &StateMatrix,
        state: u16,
        stamp: Stamp,
        backend: &mut B,
    ) -> u32 {
        let Some(row) = matrix.row(state) else {
            return 0;
        };
        let mut waves = row.wave_trigger().unwrap_or(0);
        for (column, (spec, &value)) in matrix
            .routing()
            .output_specs()
            .iter()
            .zip(row.outputs())
            .enumerate()
        {
            match spec {
                OutputSpec::DigitalOut { from, to } => {
                    let range = channel_range_mask(*from, *to);
                    self.held = (self.held & !range) | spread_onto_range(value, *from, *to);
                }
                OutputSpec::Trigger { from, to } => {
                    self.pulses |= spread_onto_range(value, *from, *to);
                }
                OutputSpec::Sound { card } => sound(backend, *card, value as i32),
                OutputSpec::SchedWave => waves |= value,
                OutputSpec::Tcp(target) | OutputSpec::Udp(target) => {
                    if value == 0 {
                        continue;
                    }
                    let transport = if matches!(spec, OutputSpec::Tcp(_)) {
                        Transport::Tcp
                    } else {
                        Transport::Udp
                    };
                    self.nrt.push(NrtOutput::new(
                        transport,
                        target,
                        state,
                        column as u16,
                        value as i32,
                        stamp.internal_ns,
                        stamp.external_ns,
                    ));
                }
                OutputSpec::Noop => {}
            }
        }
        waves
    }

    /// Drop last tick's trigger pulses.
    #[inline]
    pub fn clear_pulses(&mut self) {
        self.pulses = 0;
    }

    /// Held lines plus this tick's pulses.
    #[inline]
    pub fn lines(&self) -> u32 {
        self.held | self.pulses
    }

    #[inline]
    pub fn held(&self) -> u32 {
        self.held
    }

    /// Drop every held line and pending pulse.
    pub fn reset(&mut self) {
        self.held = 0;
        self.pulses = 0;
    }

    /// Deferred records lost to a full queue.
    #[inline]
    pub fn nrt_dropped(&self) -> u64 {
        self.nrt.stats().dropped()
    }
}

/// `+id` plays, `-id` stops, 0 does nothing.
pub fn sound<B: IoBackend>(backend: &mut B, card: u32, value: i32) {
    match value {
        v if v > 0 => backend.play_sound(card, v as u32),
        v if v < 0 => backend.stop_sound(card, v.unsigned_abs()),
        _ => {}
    }
}
