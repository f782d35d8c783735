//! AO wave event player.
//!
//! Walks the AO sample clock of every playing wave in lockstep with the
//! backend and fires the event column attached to each sample as it
//! plays. Sample `i` plays at `start + i / rate`.

use ratexp_common::bits::{column_bit, set_bits};
use ratexp_common::consts::{MAX_AO_WAVES, NANOS_PER_SEC};
use ratexp_common::fsm::ao::AoWave;

use crate::backend::IoBackend;

#[derive(Debug, Clone, Copy)]
struct Playback {
    start_ns: u64,
    /// Next sample index (cumulative across loops).
    next: u64,
}

/// Loaded AO waves and their playback cursors.
#[derive(Debug)]
pub struct AoPlayer {
    waves: Vec<Option<AoWave>>,
    playing: [Option<Playback>; MAX_AO_WAVES],
    sample_rate_hz: u64,
}

impl AoPlayer {
    pub fn new(sample_rate_hz: u32) -> Self {
        Self {
            waves: (0..MAX_AO_WAVES).map(|_| None).collect(),
            playing: [None; MAX_AO_WAVES],
            sample_rate_hz: u64::from(sample_rate_hz.max(1)),
        }
    }

    /// Install (or clear, when empty) the wave in slot `wave.id()`.
    /// Playback of the slot being replaced is stopped.
    pub fn load<B: IoBackend>(&mut self, wave: AoWave, backend: &mut B) {
        let id = wave.id() as usize;
        if id >= MAX_AO_WAVES {
            return;
        }
        self.stop(id, backend);
        self.waves[id] = if wave.is_clear() { None } else { Some(wave) };
    }

    #[inline]
    pub fn is_loaded(&self, id: usize) -> bool {
        self.waves.get(id).is_some_and(Option::is_some)
    }

    #[inline]
    pub fn is_playing(&self, id: usize) -> bool {
        self.playing.get(id).is_some_and(Option::is_some)
    }

    /// Start every loaded wave whose id is in `mask`, from sample 0.
    pub fn start<B: IoBackend>(&mut self, mask: u32, now_ns: u64, backend: &mut B) {
        for id in set_bits(mask as u64) {
            if let Some(wave) = self.waves.get(id).and_then(Option::as_ref) {
                self.playing[id] = Some(Playback {
                    start_ns: now_ns,
                    next: 0,
                });
                backend.ao_start(wave);
            }
        }
    }

    fn stop<B: IoBackend>(&mut self, id: usize, backend: &mut B) {
        if self.playing[id].take().is_some() {
            backend.ao_stop(id as u8);
        }
    }

    /// Stop every playing wave.
    pub fn stop_all<B: IoBackend>(&mut self, backend: &mut B) {
        for id in 0..MAX_AO_WAVES {
            self.stop(id, backend);
        }
    }

    /// Emit the events of every sample played up to `now_ns`.
    ///
    /// Bounded: at most one pass over each wave per tick.
    pub fn advance<B: IoBackend>(&mut self, now_ns: u64, backend: &mut B) -> u64 {
        let mut fired = 0u64;
        for id in 0..MAX_AO_WAVES {
            let (Some(pb), Some(wave)) = (self.playing[id].as_mut(), self.waves[id].as_ref())
            else {
                continue;
            };
            let len = wave.sample_count() as u64;
            let elapsed = now_ns.saturating_sub(pb.start_ns);
            let due = (u128::from(elapsed) * u128::from(self.sample_rate_hz)
                / u128::from(NANOS_PER_SEC)) as u64;
            let last = if wave.loops() { due } else { due.min(len - 1) };
            let steps = (last + 1).saturating_sub(pb.next).min(len);
            for k in 0..steps {
                let index = ((pb.next + k) % len) as usize;
                if let Some(column) = wave.event_column(index) {
                    fired |= column_bit(column);
                }
            }
            pb.next = pb.next.max(last + 1);
            if !wave.loops() && pb.next >= len {
                self.playing[id] = None;
                backend.ao_stop(id as u8);
            }
        }
        fired
    }
}
