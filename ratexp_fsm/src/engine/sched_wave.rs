//! Scheduled-wave engine.
//!
//! Each wave runs `Idle → Preamble → Sustain → Refractory → Idle`.
//! Entering Sustain emits edge-up into the wave's mapped event column and
//! drives its mapped output line high; entering Refractory emits edge-down
//! and drives the line low. A trigger outside Idle is dropped.
//!
//! Phase boundaries are computed from the scheduled instants, never from
//! the tick that observed them, so a wave does not drift with tick jitter.
//! At most three phase steps are taken per wave per tick.

use ratexp_common::bits::{column_bit, set_bits, set_line};
use ratexp_common::consts::{MAX_SCHED_WAVES, NANOS_PER_US};
use ratexp_common::fsm::matrix::{Edge, SchedWaveSpec, StateMatrix};

/// End of a phase of `us` microseconds starting at `start_ns`. Saturates,
/// so an oversized duration parks the wave in that phase.
#[inline]
fn deadline(start_ns: u64, us: u64) -> u64 {
    start_ns.saturating_add(us.saturating_mul(NANOS_PER_US))
}

/// Runtime phase of one wave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WavePhase {
    #[default]
    Idle,
    Preamble,
    Sustain,
    Refractory,
}

#[derive(Debug, Clone, Copy, Default)]
struct WaveRuntime {
    spec: SchedWaveSpec,
    phase: WavePhase,
    /// Scheduled end of the current phase [ns].
    phase_end_ns: u64,
    last_trigger_ns: u64,
    up_column: Option<usize>,
    down_column: Option<usize>,
    line: Option<usize>,
}

/// Per-machine wave runtime, rebuilt whenever the matrix is swapped.
#[derive(Debug, Clone)]
pub struct SchedWaveEngine {
    waves: [WaveRuntime; MAX_SCHED_WAVES],
    /// Bit `w` set iff wave `w` is not Idle.
    busy: u32,
    /// Bit `w` set iff wave `w` is enabled.
    enabled: u32,
    lines: u32,
}

impl Default for SchedWaveEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedWaveEngine {
    pub fn new() -> Self {
        Self {
            waves: [WaveRuntime::default(); MAX_SCHED_WAVES],
            busy: 0,
            enabled: 0,
            lines: 0,
        }
    }

    /// Load wave specs and routing from `matrix`. Every wave returns to Idle.
    pub fn rebuild(&mut self, matrix: &StateMatrix) {
        let routing = matrix.routing();
        self.enabled = 0;
        for (w, rt) in self.waves.iter_mut().enumerate() {
            let spec = matrix.sched_wave(w).copied().unwrap_or_default();
            *rt = WaveRuntime {
                spec,
                up_column: routing.wave_input_column(w, Edge::Up),
                down_column: routing.wave_input_column(w, Edge::Down),
                line: routing.wave_output_channel(w),
                ..WaveRuntime::default()
            };
            if spec.enabled {
                self.enabled |= 1 << w;
            }
        }
        self.busy = 0;
        self.lines = 0;
    }

    /// Return every wave to Idle and drop the wave lines. Specs are kept.
    pub fn reset(&mut self) {
        for rt in self.waves.iter_mut() {
            rt.phase = WavePhase::Idle;
            rt.phase_end_ns = 0;
            rt.last_trigger_ns = 0;
        }
        self.busy = 0;
        self.lines = 0;
    }

    /// Trigger the waves in `mask` at `now_ns`.
    ///
    /// Disabled, unknown and non-idle waves ignore the trigger. Returns the
    /// mask of waves that actually started.
    pub fn trigger(&mut self, mask: u32, now_ns: u64) -> u32 {
        let startable = mask & self.enabled & !self.busy;
        for w in set_bits(startable as u64) {
            let rt = &mut self.waves[w];
            rt.phase = WavePhase::Preamble;
            rt.last_trigger_ns = now_ns;
            rt.phase_end_ns = deadline(now_ns, rt.spec.preamble_us);
        }
        self.busy |= startable;
        startable
    }

    /// Advance every busy wave to `now_ns`. Returns the fired event columns.
    pub fn advance(&mut self, now_ns: u64) -> u64 {
        let mut fired = 0u64;
        for w in set_bits(self.busy as u64) {
            let rt = &mut self.waves[w];
            for _ in 0..3 {
                if now_ns < rt.phase_end_ns {
                    break;
                }
                match rt.phase {
                    WavePhase::Preamble => {
                        rt.phase = WavePhase::Sustain;
                        rt.phase_end_ns = deadline(rt.phase_end_ns, rt.spec.sustain_us);
                        if let Some(c) = rt.up_column {
                            fired |= column_bit(c);
                        }
                        if let Some(line) = rt.line {
                            set_line(&mut self.lines, line, true);
                        }
                    }
                    WavePhase::Sustain => {
                        rt.phase = WavePhase::Refractory;
                        rt.phase_end_ns = deadline(rt.phase_end_ns, rt.spec.refraction_us);
                        if let Some(c) = rt.down_column {
                            fired |= column_bit(c);
                        }
                        if let Some(line) = rt.line {
                            set_line(&mut self.lines, line, false);
                        }
                    }
                    WavePhase::Refractory => {
                        rt.phase = WavePhase::Idle;
                        self.busy &= !(1 << w);
                        break;
                    }
                    WavePhase::Idle => break,
                }
            }
        }
        fired
    }

    /// Output lines currently driven high by waves in Sustain.
    #[inline]
    pub fn lines(&self) -> u32 {
        self.lines
    }

    #[inline]
    pub fn phase(&self, wave: usize) -> WavePhase {
        self.waves.get(wave).map(|rt| rt.phase).unwrap_or_default()
    }

    /// Time of the last accepted trigger of `wave` [ns].
    #[inline]
    pub fn last_trigger_ns(&self, wave: usize) -> Option<u64> {
        self.waves
            .get(wave)
            .filter(|rt| rt.phase != WavePhase::Idle || rt.last_trigger_ns != 0)
            .map(|rt| rt.last_trigger_ns)
    }

    /// Mask of waves not in Idle.
    #[inline]
    pub fn busy(&self) -> u32 {
        self.busy
    }
}
