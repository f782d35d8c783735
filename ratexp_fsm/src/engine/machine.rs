//! One state-matrix machine.
//!
//! [`FsmMachine`] ties the matrix store, transition rule, scheduled waves,
//! AO player, output router and transition log together behind a single
//! bounded [`FsmMachine::tick`].
//!
//! ## Tick Order
//!
//! 1. Adopt a matrix staged from another thread.
//! 2. Service the request slot (at most one request).
//! 3. Drop last tick's trigger pulses.
//! 4. Advance scheduled waves and AO playback, with or without a matrix.
//! 5. Sample inputs and turn edges into fired columns.
//! 6. Unless paused, apply the transition rule; on a transition log it,
//!    swap in a pending matrix if due, and dispatch the new state's outputs.
//! 7. Write digital outputs (held | pulses | wave lines | forced mask).
//! 8. Produce a DAQ scan if acquisition is running.

use std::sync::Arc;

use ratexp_common::bits::{column_bit, set_bits};
use ratexp_common::consts::{MAX_EVT_COLS, NANOS_PER_US};
use ratexp_common::fsm::ao::AoWave;
use ratexp_common::fsm::config::EngineConfig;
use ratexp_common::fsm::daq::{DaqScan, DaqSpec};
use ratexp_common::fsm::matrix::{MatrixBlob, MatrixError, OutputSpec, StateMatrix};
use ratexp_common::fsm::msg::{Request, Response};
use ratexp_common::fsm::nrt::NrtOutput;
use ratexp_common::fsm::status::{MachineFlags, MachineStatus};
use ratexp_common::fsm::transition::{EventId, StateTransition};
use tracing::{debug, info, warn};

use super::ao::AoPlayer;
use super::input::EdgeDetector;
use super::log::TransitionLog;
use super::output::{OutputRouter, Stamp, sound};
use super::sched_wave::SchedWaveEngine;
use super::transition::{Decision, evaluate};
use crate::backend::IoBackend;
use crate::gateway::RequestSlot;
use crate::queue::{QueueConsumer, QueueProducer, bounded};
use crate::store::{MatrixStore, RETIRED_QUEUE_CAPACITY, ReconfigHandle};

// ─── Construction Parameters ────────────────────────────────────────

/// Capacities and converter ranges of one machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineParams {
    pub log_capacity: usize,
    pub nrt_queue_capacity: usize,
    pub daq_queue_capacity: usize,
    pub transition_queue_capacity: usize,
    pub ao_sample_rate_hz: u32,
    pub ao_max_data: u16,
    pub daq_max_data: u16,
}

impl MachineParams {
    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self {
            log_capacity: cfg.log_capacity,
            nrt_queue_capacity: cfg.nrt_queue_capacity,
            daq_queue_capacity: cfg.daq_queue_capacity,
            transition_queue_capacity: cfg.transition_queue_capacity,
            ao_sample_rate_hz: cfg.ao_sample_rate_hz,
            ao_max_data: cfg.ao_max_data,
            daq_max_data: cfg.daq_max_data,
        }
    }
}

impl Default for MachineParams {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// Consumer ends of a machine's output queues.
#[derive(Debug)]
pub struct MachineOutputs {
    pub nrt: QueueConsumer<NrtOutput>,
    pub daq: QueueConsumer<DaqScan>,
    pub transitions: QueueConsumer<StateTransition>,
    /// Matrices displaced on the real-time side, released by the reader.
    pub retired: QueueConsumer<Arc<StateMatrix>>,
}

// ─── Machine ────────────────────────────────────────────────────────

pub struct FsmMachine<B: IoBackend> {
    index: usize,
    backend: B,
    store: MatrixStore,
    slot: Arc<RequestSlot>,
    log: TransitionLog,
    waves: SchedWaveEngine,
    ao: AoPlayer,
    router: OutputRouter,
    edges: EdgeDetector,
    daq_tx: QueueProducer<DaqScan>,
    notify_tx: QueueProducer<StateTransition>,
    outputs: Option<MachineOutputs>,

    state: u16,
    paused: bool,
    daq: Option<DaqSpec>,
    /// Engine time of the last reset [ns].
    epoch_ns: u64,
    /// Engine time of the current tick [ns].
    now_ns: u64,
    state_entered_ns: u64,
    forced_events: u64,
    force_timeout: bool,
    forced_output: u32,
    ao_max_data: u16,
    daq_max_data: u16,
}

impl<B: IoBackend> FsmMachine<B> {
    /// Build a machine with no matrix. All storage is allocated here.
    pub fn new(index: usize, backend: B, params: MachineParams) -> Self {
        let (nrt_tx, nrt_rx) = bounded(params.nrt_queue_capacity);
        let (daq_tx, daq_rx) = bounded(params.daq_queue_capacity);
        let (notify_tx, notify_rx) = bounded(params.transition_queue_capacity);
        let (retired_tx, retired_rx) = bounded(RETIRED_QUEUE_CAPACITY);
        Self {
            index,
            backend,
            store: MatrixStore::new(retired_tx),
            slot: Arc::new(RequestSlot::new()),
            log: TransitionLog::new(params.log_capacity),
            waves: SchedWaveEngine::new(),
            ao: AoPlayer::new(params.ao_sample_rate_hz),
            router: OutputRouter::new(nrt_tx),
            edges: EdgeDetector::new(),
            daq_tx,
            notify_tx,
            outputs: Some(MachineOutputs {
                nrt: nrt_rx,
                daq: daq_rx,
                transitions: notify_rx,
                retired: retired_rx,
            }),
            state: 0,
            paused: false,
            daq: None,
            epoch_ns: 0,
            now_ns: 0,
            state_entered_ns: 0,
            forced_events: 0,
            force_timeout: false,
            forced_output: 0,
            ao_max_data: params.ao_max_data,
            daq_max_data: params.daq_max_data,
        }
    }

    /// Hand the queue consumers to a non-real-time reader. Once only.
    pub fn take_outputs(&mut self) -> Option<MachineOutputs> {
        self.outputs.take()
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Request slot serviced by this machine.
    pub fn slot(&self) -> Arc<RequestSlot> {
        Arc::clone(&self.slot)
    }

    pub fn reconfig_handle(&self) -> ReconfigHandle {
        self.store.handle()
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    #[inline]
    pub fn current_state(&self) -> u16 {
        self.state
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.store.is_valid()
    }

    #[inline]
    pub fn matrix(&self) -> Option<&Arc<StateMatrix>> {
        self.store.active()
    }

    #[inline]
    pub fn log(&self) -> &TransitionLog {
        &self.log
    }

    #[inline]
    pub fn waves(&self) -> &SchedWaveEngine {
        &self.waves
    }

    #[inline]
    pub fn ao(&self) -> &AoPlayer {
        &self.ao
    }

    /// µs since the last reset.
    #[inline]
    pub fn runtime_us(&self) -> u64 {
        self.now_ns.saturating_sub(self.epoch_ns) / NANOS_PER_US
    }

    pub fn status(&self) -> MachineStatus {
        let mut flags = MachineFlags::empty();
        flags.set(MachineFlags::PAUSED, self.paused);
        flags.set(MachineFlags::VALID, self.store.is_valid());
        flags.set(MachineFlags::DAQ_RUNNING, self.daq.is_some());
        flags.set(MachineFlags::PENDING_MATRIX, self.store.has_pending());
        MachineStatus {
            flags,
            current_state: self.state,
            transition_count: self.log.count(),
            runtime_us: self.runtime_us(),
            nrt_dropped: self.router.nrt_dropped(),
            daq_dropped: self.daq_tx.stats().dropped(),
            notify_dropped: self.notify_tx.stats().dropped(),
        }
    }

    // ─── Tick ───────────────────────────────────────────────────────

    /// Run one tick at engine time `now_ns` (monotonic).
    pub fn tick(&mut self, now_ns: u64) {
        self.now_ns = now_ns;

        if self.store.adopt_staged() {
            self.activate_immediate();
        }

        let slot = Arc::clone(&self.slot);
        slot.service(|request| self.apply(request));

        self.router.clear_pulses();

        let mut fired = self.waves.advance(now_ns);
        fired |= self.ao.advance(now_ns, &mut self.backend);

        let decision = match self.store.active() {
            Some(matrix) => {
                let routing = matrix.routing();
                let levels = self.backend.read_inputs(
                    routing.input_kind(),
                    routing.first_in_chan(),
                    routing.num_in_chans(),
                );
                fired |= self.edges.detect(levels, routing);

                if self.paused {
                    Decision::Stay
                } else {
                    fired |= std::mem::take(&mut self.forced_events);
                    let force_timeout = std::mem::take(&mut self.force_timeout);
                    let elapsed_us = now_ns.saturating_sub(self.state_entered_ns) / NANOS_PER_US;
                    match matrix.row(self.state) {
                        Some(row) => {
                            evaluate(&row, matrix.evt_cols(), fired, elapsed_us, force_timeout)
                        }
                        None => Decision::Stay,
                    }
                }
            }
            None => Decision::Stay,
        };

        if let Decision::Jump { next, event } = decision {
            self.enter_state(next, event);
        }

        self.write_outputs();
        self.sample_daq();
    }

    fn enter_state(&mut self, next: u16, event: EventId) {
        let internal_ns = self.now_ns.saturating_sub(self.epoch_ns);
        let external_ns = self.backend.external_time_ns(internal_ns);
        let record = StateTransition {
            internal_ts_ns: internal_ns,
            external_ts_ns: external_ns,
            previous_state: self.state,
            state: next,
            event_id: event,
        };
        self.log.push(record);
        self.notify_tx.push(record);
        self.state = next;
        self.state_entered_ns = self.now_ns;

        if self.store.activate_if_ready(next) {
            self.on_swap();
        }

        self.dispatch_outputs(Stamp {
            internal_ns,
            external_ns,
        });
    }

    /// Route the current state's output columns.
    fn dispatch_outputs(&mut self, stamp: Stamp) {
        let waves = match self.store.active() {
            Some(matrix) => self
                .router
                .dispatch(matrix, self.state, stamp, &mut self.backend),
            None => 0,
        };
        self.trigger_waves(waves);
    }

    fn trigger_waves(&mut self, mask: u32) {
        if mask == 0 {
            return;
        }
        self.waves.trigger(mask, self.now_ns);
        let mut ao_mask = 0u32;
        for id in set_bits(mask as u64) {
            if self.ao.is_loaded(id) && !self.ao.is_playing(id) {
                ao_mask |= 1 << id;
            }
        }
        self.ao.start(ao_mask, self.now_ns, &mut self.backend);
    }

    fn write_outputs(&mut self) {
        let lines = self.router.lines() | self.waves.lines() | self.forced_output;
        self.backend.write_digital(lines);
    }

    fn sample_daq(&mut self) {
        let Some(spec) = self.daq else {
            return;
        };
        let mut scan = DaqScan::new(self.now_ns.saturating_sub(self.epoch_ns));
        for channel in set_bits(spec.channel_mask as u64) {
            // At most 32 channels, the scan's capacity.
            let _ = scan.samples.push(self.backend.daq_sample(channel));
        }
        self.daq_tx.push(scan);
    }

    // ─── Reconfiguration ────────────────────────────────────────────

    /// Validate `blob` on the calling thread, then stage it like an upload.
    /// Not for use inside the tick.
    pub fn load_matrix(&mut self, blob: MatrixBlob) -> Result<(), MatrixError> {
        if let Err(e) = self.store.load(blob) {
            warn!(machine = self.index, error = %e, "matrix rejected");
            return Err(e);
        }
        self.activate_or_wait();
        Ok(())
    }

    /// Make a validated matrix pending.
    fn stage_matrix(&mut self, matrix: Arc<StateMatrix>) {
        self.store.stage(matrix);
        self.activate_or_wait();
    }

    /// Swap the pending matrix in right away when the swap rules allow.
    fn activate_or_wait(&mut self) {
        if !self.activate_immediate() {
            debug!(machine = self.index, "matrix pending until entry state");
        }
    }

    fn activate_immediate(&mut self) -> bool {
        if !self.store.activate_immediate() {
            return false;
        }
        if self.on_swap() {
            let internal_ns = self.now_ns.saturating_sub(self.epoch_ns);
            let external_ns = self.backend.external_time_ns(internal_ns);
            self.dispatch_outputs(Stamp {
                internal_ns,
                external_ns,
            });
        }
        true
    }

    /// Rebuild per-matrix runtime after a swap. Returns `true` when the
    /// current state does not exist in the new matrix and the machine was
    /// moved to state 0.
    fn on_swap(&mut self) -> bool {
        let Some(matrix) = self.store.active() else {
            return false;
        };
        self.waves.rebuild(matrix);
        let clamped = usize::from(self.state) >= matrix.rows();
        if clamped {
            self.state = 0;
            self.state_entered_ns = self.now_ns;
            self.router.reset();
        }
        debug!(
            machine = self.index,
            rows = matrix.rows(),
            cols = matrix.cols(),
            state = self.state,
            "matrix activated"
        );
        clamped
    }

    // ─── Requests ───────────────────────────────────────────────────

    /// Carry out a request. The tick calls this for the posted request;
    /// startup code may call it directly before the cycle starts.
    pub fn apply(&mut self, request: Request) -> Response {
        match request {
            Request::GetPause => Response::Paused(self.paused),
            Request::TogglePause => {
                self.paused = !self.paused;
                debug!(machine = self.index, paused = self.paused, "pause toggled");
                Response::Paused(self.paused)
            }
            Request::Reset => {
                self.reset();
                Response::Ok
            }
            Request::GetValid => Response::Valid(self.store.is_valid()),
            Request::Invalidate => {
                self.store.invalidate();
                info!(machine = self.index, "matrix invalidated");
                Response::Ok
            }
            Request::LoadMatrix(matrix) => {
                self.stage_matrix(matrix);
                Response::Ok
            }
            Request::GetMatrix => Response::Matrix(self.store.active().cloned()),
            Request::GetMatrixSize => match self.store.active() {
                Some(m) => Response::MatrixSize {
                    rows: m.rows(),
                    cols: m.cols(),
                },
                None => Response::MatrixSize { rows: 0, cols: 0 },
            },
            Request::ForceEvent(column) => match self.store.active() {
                Some(m) if usize::from(column) < m.evt_cols() => {
                    self.forced_events |= column_bit(column.into());
                    Response::Ok
                }
                _ => Response::Ignored,
            },
            Request::ForceTimesUp => {
                if !self.store.is_valid() {
                    return Response::Ignored;
                }
                self.force_timeout = true;
                Response::Ok
            }
            Request::ForceSound(value) => {
                let card = self
                    .store
                    .active()
                    .and_then(|m| {
                        m.routing().output_specs().iter().find_map(|s| match s {
                            OutputSpec::Sound { card } => Some(*card),
                            _ => None,
                        })
                    })
                    .unwrap_or(0);
                sound(&mut self.backend, card, value);
                Response::Ok
            }
            Request::ForceOutput(mask) => {
                self.forced_output = mask;
                Response::Ok
            }
            Request::GetTransitions { from, count } => {
                Response::Transitions(self.log.batch(from, usize::from(count)))
            }
            Request::GetTransitionCount => Response::TransitionCount(self.log.count()),
            Request::GetRuntime => Response::Runtime(self.runtime_us()),
            Request::GetCurrentState => Response::CurrentState(self.state),
            Request::ForceState(state) => {
                let in_range = self
                    .store
                    .active()
                    .is_some_and(|m| usize::from(state) < m.rows());
                if !in_range {
                    return Response::Ignored;
                }
                self.enter_state(state, EventId::Forced);
                Response::Ok
            }
            Request::GetNumInputEvents => {
                Response::NumInputEvents(self.store.active().map_or(0, |m| m.evt_cols()))
            }
            Request::StartDaq(spec) => {
                let accepted = spec.is_valid();
                if accepted {
                    self.daq = Some(spec);
                    info!(
                        machine = self.index,
                        channels = spec.num_channels(),
                        "DAQ started"
                    );
                }
                Response::DaqStarted {
                    accepted,
                    max_data: self.daq_max_data,
                }
            }
            Request::StopDaq => {
                if self.daq.take().is_some() {
                    info!(machine = self.index, "DAQ stopped");
                }
                Response::Ok
            }
            Request::GetAoMaxData => Response::AoMaxData(self.ao_max_data),
            Request::LoadAoWave(wave) => self.load_ao_wave(wave),
        }
    }

    fn load_ao_wave(&mut self, wave: AoWave) -> Response {
        let evt_cols = self.store.active().map_or(MAX_EVT_COLS, |m| m.evt_cols());
        if let Err(e) = wave.check_against(evt_cols, self.ao_max_data) {
            warn!(machine = self.index, error = %e, "AO wave rejected");
            return Response::RejectedAoWave(e);
        }
        debug!(
            machine = self.index,
            id = wave.id(),
            samples = wave.sample_count(),
            "AO wave loaded"
        );
        self.ao.load(wave, &mut self.backend);
        Response::Ok
    }

    /// Clear the log, return to state 0 and restart the clock.
    fn reset(&mut self) {
        self.log.clear();
        self.state = 0;
        self.forced_events = 0;
        self.force_timeout = false;
        self.forced_output = 0;
        self.epoch_ns = self.now_ns;
        self.state_entered_ns = self.now_ns;
        self.ao.stop_all(&mut self.backend);
        self.waves.reset();
        self.router.reset();
        self.daq = None;
        info!(machine = self.index, "machine reset");
    }
}

impl<B: IoBackend> std::fmt::Debug for FsmMachine<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsmMachine")
            .field("index", &self.index)
            .field("backend", &self.backend.name())
            .field("state", &self.state)
            .field("valid", &self.store.is_valid())
            .field("paused", &self.paused)
            .field("transitions", &self.log.count())
            .finish()
    }
}
