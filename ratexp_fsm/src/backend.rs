//! I/O backend trait and simulated implementation.
//!
//! The engine decides *that* an action occurs; the backend carries it out.
//! Hardware glue (DIO boards, sound cards, AO DACs, DAQ ADCs) implements
//! [`IoBackend`]. [`SimBackend`] keeps everything in memory and records what
//! the engine asked for, for the simulation binary and the tests.
//!
//! # Timing Contracts
//!
//! Every method is called from the real-time tick and must be bounded:
//! no blocking I/O and no allocation.

use ratexp_common::consts::{MAX_DAQ_CHANS, MAX_IN_CHANS};
use ratexp_common::fsm::ao::AoWave;
use ratexp_common::fsm::matrix::InputKind;

/// Hardware seam of one machine.
pub trait IoBackend: Send {
    /// Backend identifier (e.g. "sim", "comedi").
    fn name(&self) -> &'static str;

    /// Sample `count` input channels starting at `first`.
    ///
    /// Bit `i` of the result is the level of channel `first + i`. Analog
    /// inputs are thresholded by the backend.
    fn read_inputs(&mut self, kind: InputKind, first: usize, count: usize) -> u32;

    /// Drive the digital output lines (bit `i` = channel `i`).
    fn write_digital(&mut self, lines: u32);

    fn play_sound(&mut self, card: u32, sound_id: u32);

    fn stop_sound(&mut self, card: u32, sound_id: u32);

    /// Start playing an AO wave from its first sample.
    fn ao_start(&mut self, wave: &AoWave);

    fn ao_stop(&mut self, wave_id: u8);

    /// Sample one DAQ channel.
    fn daq_sample(&mut self, channel: usize) -> u16;

    /// External reference clock reading for engine time `internal_ns`.
    fn external_time_ns(&mut self, internal_ns: u64) -> u64 {
        internal_ns
    }
}

// ─── Simulated Backend ──────────────────────────────────────────────

/// Sound action requested by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundAction {
    Play { card: u32, sound_id: u32 },
    Stop { card: u32, sound_id: u32 },
}

/// AO action requested by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AoAction {
    Start { wave_id: u8, samples: usize },
    Stop { wave_id: u8 },
}

/// In-memory backend.
///
/// Inputs are set with [`SimBackend::set_input`]; outputs, sound and AO
/// actions are recorded for inspection.
#[derive(Debug, Clone)]
pub struct SimBackend {
    dio_levels: u32,
    ai_levels: u32,
    lines: u32,
    writes: u64,
    sounds: Vec<SoundAction>,
    ao: Vec<AoAction>,
    daq_values: [u16; MAX_DAQ_CHANS],
    external_offset_ns: u64,
}

impl Default for SimBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBackend {
    pub fn new() -> Self {
        Self {
            dio_levels: 0,
            ai_levels: 0,
            lines: 0,
            writes: 0,
            sounds: Vec::new(),
            ao: Vec::new(),
            daq_values: [0; MAX_DAQ_CHANS],
            external_offset_ns: 0,
        }
    }

    /// Set the level of absolute input channel `chan`.
    pub fn set_input(&mut self, kind: InputKind, chan: usize, high: bool) {
        if chan >= MAX_IN_CHANS {
            return;
        }
        let levels = match kind {
            InputKind::Dio => &mut self.dio_levels,
            InputKind::Ai => &mut self.ai_levels,
        };
        if high {
            *levels |= 1 << chan;
        } else {
            *levels &= !(1 << chan);
        }
    }

    /// Value returned for DAQ channel `channel`.
    pub fn set_daq_value(&mut self, channel: usize, value: u16) {
        if let Some(slot) = self.daq_values.get_mut(channel) {
            *slot = value;
        }
    }

    /// Constant offset of the external clock relative to engine time.
    pub fn set_external_offset(&mut self, offset_ns: u64) {
        self.external_offset_ns = offset_ns;
    }

    /// Last digital output word written.
    #[inline]
    pub fn lines(&self) -> u32 {
        self.lines
    }

    /// Number of output writes so far.
    #[inline]
    pub fn writes(&self) -> u64 {
        self.writes
    }

    pub fn sounds(&self) -> &[SoundAction] {
        &self.sounds
    }

    pub fn ao_actions(&self) -> &[AoAction] {
        &self.ao
    }

    /// Forget recorded sound and AO actions.
    pub fn clear_actions(&mut self) {
        self.sounds.clear();
        self.ao.clear();
    }
}

impl IoBackend for SimBackend {
    fn name(&self) -> &'static str {
        "sim"
    }

    fn read_inputs(&mut self, kind: InputKind, first: usize, count: usize) -> u32 {
        let levels = match kind {
            InputKind::Dio => self.dio_levels,
            InputKind::Ai => self.ai_levels,
        };
        if first >= MAX_IN_CHANS || count == 0 {
            return 0;
        }
        let shifted = levels >> first;
        if count >= 32 {
            shifted
        } else {
            shifted & ((1u32 << count) - 1)
        }
    }

    fn write_digital(&mut self, lines: u32) {
        self.lines = lines;
        self.writes += 1;
    }

    fn play_sound(&mut self, card: u32, sound_id: u32) {
        self.sounds.push(SoundAction::Play { card, sound_id });
    }

    fn stop_sound(&mut self, card: u32, sound_id: u32) {
        self.sounds.push(SoundAction::Stop { card, sound_id });
    }

    fn ao_start(&mut self, wave: &AoWave) {
        self.ao.push(AoAction::Start {
            wave_id: wave.id(),
            samples: wave.sample_count(),
        });
    }

    fn ao_stop(&mut self, wave_id: u8) {
        self.ao.push(AoAction::Stop { wave_id });
    }

    fn daq_sample(&mut self, channel: usize) -> u16 {
        self.daq_values.get(channel).copied().unwrap_or(0)
    }

    fn external_time_ns(&mut self, internal_ns: u64) -> u64 {
        internal_ns + self.external_offset_ns
    }
}
