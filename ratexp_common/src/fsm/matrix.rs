//! State matrix, routing tables and output specifications.
//!
//! A [`MatrixBlob`] is the self-describing upload format (TOML/JSON via
//! serde). [`StateMatrix::from_blob`] validates it once against the capacity
//! ceilings in [`crate::consts`] and produces an immutable, bounds-checked
//! matrix: the engine never indexes raw cells, it reads rows through
//! [`StateRow`] views computed from the validated stride.
//!
//! ## Column layout
//!
//! ```text
//! | evt_cols event columns | timeout_state | timeout_us | out_cols outputs | [wave trigger] |
//! ```
//!
//! The trailing scheduled-wave trigger column exists iff at least one
//! scheduled wave is enabled.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::{
    FIXED_COLS, FMT_TEXT_LEN, IP_HOST_LEN, MAX_CELLS, MAX_EVT_COLS, MAX_IN_CHANS, MAX_OUT_CHANS,
    MAX_OUT_COLS, MAX_ROWS, MAX_SCHED_WAVES, READY_FOR_TRIAL_STATE_DEFAULT,
};

// ─── Error Type ─────────────────────────────────────────────────────

/// Reasons a matrix upload is rejected.
///
/// Rejection never touches the active matrix or its validity flag.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatrixError {
    #[error("matrix has no rows")]
    NoRows,
    #[error("{rows} rows exceed the {max} row ceiling")]
    TooManyRows { rows: usize, max: usize },
    #[error("{cells} cells exceed the {max} cell ceiling")]
    TooManyCells { cells: usize, max: usize },
    #[error("cell count {actual} does not match {rows}x{cols}")]
    CellCountMismatch {
        rows: usize,
        cols: usize,
        actual: usize,
    },
    #[error("column count {cols} does not match layout (expected {expected})")]
    ColumnLayout { cols: usize, expected: usize },
    #[error("{evt_cols} event columns exceed the {max} ceiling")]
    TooManyEventColumns { evt_cols: usize, max: usize },
    #[error("{out_cols} output columns exceed the {max} ceiling")]
    TooManyOutputColumns { out_cols: usize, max: usize },
    #[error("input channels {first}..{first}+{count} exceed the {max} channel ceiling")]
    InputChannelRange { first: usize, count: usize, max: usize },
    #[error("input route for channel {chan} outside the {num_in_chans} routed channels")]
    InputRouteChannel { chan: usize, num_in_chans: usize },
    #[error("route targets event column {column}, only {evt_cols} exist")]
    EventColumnOutOfRange { column: usize, evt_cols: usize },
    #[error("duplicate route for {what}")]
    DuplicateRoute { what: &'static str },
    #[error("scheduled wave id {wave} exceeds the {max} wave ceiling")]
    WaveIdOutOfRange { wave: usize, max: usize },
    #[error("scheduled wave {wave} declared twice")]
    DuplicateWave { wave: usize },
    #[error("route references undeclared scheduled wave {wave}")]
    UndeclaredWave { wave: usize },
    #[error("output channel {channel} exceeds the {max} channel ceiling")]
    OutputChannelOutOfRange { channel: usize, max: usize },
    #[error("output column {column}: empty channel range {from}..={to}")]
    EmptyChannelRange { column: usize, from: usize, to: usize },
    #[error("output column {column} out of range ({out_cols} output columns)")]
    OutputColumnOutOfRange { column: usize, out_cols: usize },
    #[error("state {state} column {column} jumps to state {dest}, only {rows} states exist")]
    DestinationOutOfRange {
        state: usize,
        column: usize,
        dest: u32,
        rows: usize,
    },
    #[error("state {state} times out into state {dest}, only {rows} states exist")]
    TimeoutStateOutOfRange { state: usize, dest: u32, rows: usize },
    #[error("entry state {entry} out of range ({rows} states)")]
    EntryStateOutOfRange { entry: usize, rows: usize },
    #[error("state {state} out of range ({rows} states)")]
    RowOutOfRange { state: usize, rows: usize },
    #[error("state {state} sets the wave trigger column but no scheduled wave is enabled")]
    NoWaveColumn { state: usize },
}

// ─── Routing Primitives ─────────────────────────────────────────────

/// Edge direction of an input or scheduled-wave transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Edge {
    /// Low → high.
    Up = 0,
    /// High → low.
    Down = 1,
}

impl Edge {
    /// Slot offset inside a `chan*2 + edge` routing table.
    #[inline]
    pub const fn offset(self) -> usize {
        self as usize
    }
}

/// How the backend should interpret the routed input channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    /// Digital I/O lines.
    #[default]
    Dio,
    /// Analog inputs, thresholded by the backend.
    Ai,
}

/// Network transport of a deferred output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Transport {
    Tcp = 0,
    Udp = 1,
}

/// Destination and packet template of a network output column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetTarget {
    pub host: heapless::String<IP_HOST_LEN>,
    pub port: u16,
    pub template: heapless::String<FMT_TEXT_LEN>,
}

impl NetTarget {
    /// Build a target, failing if `host` or `template` exceed their capacity.
    pub fn new(host: &str, port: u16, template: &str) -> Option<Self> {
        let mut h = heapless::String::new();
        h.push_str(host).ok()?;
        let mut t = heapless::String::new();
        t.push_str(template).ok()?;
        Some(Self {
            host: h,
            port,
            template: t,
        })
    }
}

/// Meaning of one output column, fixed at load time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputSpec {
    /// Held digital lines: value is a bitmask over `from..=to`.
    DigitalOut { from: u8, to: u8 },
    /// One-tick pulses: value is a bitmask over `from..=to`.
    Trigger { from: u8, to: u8 },
    /// Sound trigger on the bound card: `+id` plays, `-id` stops.
    Sound { card: u32 },
    /// Scheduled-wave trigger: value is a bitmask of wave ids.
    SchedWave,
    /// Deferred TCP message.
    Tcp(NetTarget),
    /// Deferred UDP datagram.
    Udp(NetTarget),
    /// Ignored column.
    Noop,
}

impl OutputSpec {
    /// Wire code of the variant.
    pub const fn code(&self) -> u8 {
        match self {
            Self::DigitalOut { .. } => 0,
            Self::Trigger { .. } => 1,
            Self::Sound { .. } => 2,
            Self::SchedWave => 3,
            Self::Tcp(_) => 4,
            Self::Udp(_) => 5,
            Self::Noop => 0x7f,
        }
    }

    #[inline]
    pub const fn is_noop(&self) -> bool {
        matches!(self, Self::Noop)
    }

    fn validate(&self, column: usize) -> Result<(), MatrixError> {
        match *self {
            Self::DigitalOut { from, to } | Self::Trigger { from, to } => {
                let (from, to) = (from as usize, to as usize);
                if from > to {
                    return Err(MatrixError::EmptyChannelRange { column, from, to });
                }
                if to >= MAX_OUT_CHANS {
                    return Err(MatrixError::OutputChannelOutOfRange {
                        channel: to,
                        max: MAX_OUT_CHANS,
                    });
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Static timing of one scheduled wave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SchedWaveSpec {
    /// Wave id (bit position in trigger masks).
    pub id: u8,
    /// Disabled waves ignore triggers.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Trigger → edge-up delay [µs].
    #[serde(default)]
    pub preamble_us: u64,
    /// Edge-up → edge-down duration [µs].
    #[serde(default)]
    pub sustain_us: u64,
    /// Blanking after edge-down during which triggers are dropped [µs].
    #[serde(default)]
    pub refraction_us: u64,
}

fn default_enabled() -> bool {
    true
}

/// Input edge → event column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputRoute {
    /// Channel index relative to `first_in_chan`.
    pub chan: u8,
    pub edge: Edge,
    pub column: u8,
}

/// Scheduled-wave edge → event column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveInputRoute {
    pub wave: u8,
    pub edge: Edge,
    pub column: u8,
}

/// Scheduled wave → directly driven output channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveOutputRoute {
    pub wave: u8,
    pub channel: u8,
}

// ─── Upload Format ──────────────────────────────────────────────────

/// Routing section of a matrix upload.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoutingBlob {
    #[serde(default)]
    pub input_kind: InputKind,
    #[serde(default)]
    pub first_in_chan: u8,
    #[serde(default)]
    pub num_in_chans: u8,
    pub num_evt_cols: u8,
    #[serde(default)]
    pub inputs: Vec<InputRoute>,
    #[serde(default)]
    pub wave_inputs: Vec<WaveInputRoute>,
    #[serde(default)]
    pub wave_outputs: Vec<WaveOutputRoute>,
    /// One spec per output column, in column order.
    #[serde(default)]
    pub outputs: Vec<OutputSpec>,
}

/// Self-describing matrix upload: dimensions, flat cells, routing, waves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixBlob {
    pub rows: u16,
    pub cols: u16,
    /// Row-major cells, `rows * cols` long.
    pub cells: Vec<u32>,
    #[serde(default)]
    pub entry_state: u16,
    #[serde(default = "default_ready_for_trial")]
    pub ready_for_trial_state: u16,
    /// Defer activation until the running matrix enters `entry_state`.
    #[serde(default)]
    pub swap_on_entry: bool,
    pub routing: RoutingBlob,
    #[serde(default)]
    pub sched_waves: Vec<SchedWaveSpec>,
}

fn default_ready_for_trial() -> u16 {
    READY_FOR_TRIAL_STATE_DEFAULT
}

// ─── Validated Routing ──────────────────────────────────────────────

/// Dense, validated routing tables. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routing {
    input_kind: InputKind,
    first_in_chan: u8,
    num_in_chans: u8,
    /// `chan*2 + edge` → event column.
    input_routing: [Option<u8>; MAX_IN_CHANS * 2],
    /// `wave*2 + edge` → event column.
    wave_input: [Option<u8>; MAX_SCHED_WAVES * 2],
    /// wave → output channel.
    wave_output: [Option<u8>; MAX_SCHED_WAVES],
    outputs: heapless::Vec<OutputSpec, MAX_OUT_COLS>,
}

impl Routing {
    #[inline]
    pub fn input_kind(&self) -> InputKind {
        self.input_kind
    }

    #[inline]
    pub fn first_in_chan(&self) -> usize {
        self.first_in_chan as usize
    }

    #[inline]
    pub fn num_in_chans(&self) -> usize {
        self.num_in_chans as usize
    }

    /// Event column fired by `edge` on relative input channel `chan`.
    #[inline]
    pub fn input_column(&self, chan: usize, edge: Edge) -> Option<usize> {
        self.input_routing
            .get(chan * 2 + edge.offset())
            .copied()
            .flatten()
            .map(usize::from)
    }

    /// Event column fired by `edge` of scheduled wave `wave`.
    #[inline]
    pub fn wave_input_column(&self, wave: usize, edge: Edge) -> Option<usize> {
        self.wave_input
            .get(wave * 2 + edge.offset())
            .copied()
            .flatten()
            .map(usize::from)
    }

    /// Output channel driven directly by scheduled wave `wave`.
    #[inline]
    pub fn wave_output_channel(&self, wave: usize) -> Option<usize> {
        self.wave_output.get(wave).copied().flatten().map(usize::from)
    }

    /// Spec of output column `column` (0-based among output columns).
    #[inline]
    pub fn output_spec(&self, column: usize) -> Option<&OutputSpec> {
        self.outputs.get(column)
    }

    #[inline]
    pub fn output_specs(&self) -> &[OutputSpec] {
        &self.outputs
    }
}

// ─── Validated Matrix ───────────────────────────────────────────────

/// Read-only view of one state (row).
#[derive(Debug, Clone, Copy)]
pub struct StateRow<'a> {
    cells: &'a [u32],
    evt_cols: usize,
    out_cols: usize,
    has_wave_col: bool,
}

impl<'a> StateRow<'a> {
    /// Destination state when event column `column` fires.
    #[inline]
    pub fn destination(&self, column: usize) -> Option<u16> {
        if column < self.evt_cols {
            Some(self.cells[column] as u16)
        } else {
            None
        }
    }

    #[inline]
    pub fn timeout_state(&self) -> u16 {
        self.cells[self.evt_cols] as u16
    }

    /// Timeout in µs, 0 = never.
    #[inline]
    pub fn timeout_us(&self) -> u32 {
        self.cells[self.evt_cols + 1]
    }

    /// Output column values, in output-column order.
    #[inline]
    pub fn outputs(&self) -> &'a [u32] {
        let start = self.evt_cols + FIXED_COLS;
        &self.cells[start..start + self.out_cols]
    }

    /// Scheduled-wave trigger mask, if the matrix has the trigger column.
    #[inline]
    pub fn wave_trigger(&self) -> Option<u32> {
        if self.has_wave_col {
            Some(self.cells[self.evt_cols + FIXED_COLS + self.out_cols])
        } else {
            None
        }
    }
}

/// A validated state matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateMatrix {
    rows: usize,
    cols: usize,
    cells: Vec<u32>,
    evt_cols: usize,
    out_cols: usize,
    has_sched_waves: bool,
    entry_state: u16,
    ready_for_trial_state: u16,
    swap_on_entry: bool,
    routing: Routing,
    sched_waves: [SchedWaveSpec; MAX_SCHED_WAVES],
    /// Bit `w` set iff wave `w` was declared in the upload.
    declared_waves: u32,
}

/// Expected column count for a layout.
#[inline]
pub const fn layout_cols(evt_cols: usize, out_cols: usize, has_sched_waves: bool) -> usize {
    evt_cols + FIXED_COLS + out_cols + if has_sched_waves { 1 } else { 0 }
}

impl StateMatrix {
    /// Validate an upload. Every routing index is checked against its
    /// declared capacity, every event/timeout destination against `rows`.
    pub fn from_blob(blob: MatrixBlob) -> Result<Self, MatrixError> {
        let rows = blob.rows as usize;
        let cols = blob.cols as usize;
        let r = &blob.routing;
        let evt_cols = r.num_evt_cols as usize;
        let out_cols = r.outputs.len();

        if rows == 0 {
            return Err(MatrixError::NoRows);
        }
        if rows > MAX_ROWS {
            return Err(MatrixError::TooManyRows {
                rows,
                max: MAX_ROWS,
            });
        }
        if evt_cols > MAX_EVT_COLS {
            return Err(MatrixError::TooManyEventColumns {
                evt_cols,
                max: MAX_EVT_COLS,
            });
        }
        if out_cols > MAX_OUT_COLS {
            return Err(MatrixError::TooManyOutputColumns {
                out_cols,
                max: MAX_OUT_COLS,
            });
        }
        let total = rows.saturating_mul(cols);
        if total > MAX_CELLS {
            return Err(MatrixError::TooManyCells {
                cells: total,
                max: MAX_CELLS,
            });
        }
        if blob.cells.len() != total {
            return Err(MatrixError::CellCountMismatch {
                rows,
                cols,
                actual: blob.cells.len(),
            });
        }

        // Scheduled waves.
        let mut sched_waves = [SchedWaveSpec::default(); MAX_SCHED_WAVES];
        let mut declared = [false; MAX_SCHED_WAVES];
        for (slot, spec) in sched_waves.iter_mut().enumerate() {
            spec.id = slot as u8;
        }
        for spec in &blob.sched_waves {
            let wave = spec.id as usize;
            if wave >= MAX_SCHED_WAVES {
                return Err(MatrixError::WaveIdOutOfRange {
                    wave,
                    max: MAX_SCHED_WAVES,
                });
            }
            if declared[wave] {
                return Err(MatrixError::DuplicateWave { wave });
            }
            declared[wave] = true;
            sched_waves[wave] = *spec;
        }
        let has_sched_waves = sched_waves.iter().any(|w| w.enabled && declared[w.id as usize]);

        let expected = layout_cols(evt_cols, out_cols, has_sched_waves);
        if cols != expected {
            return Err(MatrixError::ColumnLayout { cols, expected });
        }

        let routing = build_routing(r, evt_cols, &declared)?;

        // Cell destinations.
        for state in 0..rows {
            let row = &blob.cells[state * cols..(state + 1) * cols];
            for (column, &dest) in row[..evt_cols].iter().enumerate() {
                if dest as usize >= rows {
                    return Err(MatrixError::DestinationOutOfRange {
                        state,
                        column,
                        dest,
                        rows,
                    });
                }
            }
            let timeout_state = row[evt_cols];
            if timeout_state as usize >= rows {
                return Err(MatrixError::TimeoutStateOutOfRange {
                    state,
                    dest: timeout_state,
                    rows,
                });
            }
        }
        if blob.entry_state as usize >= rows {
            return Err(MatrixError::EntryStateOutOfRange {
                entry: blob.entry_state as usize,
                rows,
            });
        }

        let declared_waves = declared
            .iter()
            .enumerate()
            .filter(|(_, d)| **d)
            .fold(0u32, |mask, (w, _)| mask | (1 << w));

        Ok(Self {
            rows,
            cols,
            cells: blob.cells,
            evt_cols,
            out_cols,
            has_sched_waves,
            entry_state: blob.entry_state,
            ready_for_trial_state: blob.ready_for_trial_state,
            swap_on_entry: blob.swap_on_entry,
            routing,
            sched_waves,
            declared_waves,
        })
    }

    /// Row view of `state`, `None` if out of range.
    #[inline]
    pub fn row(&self, state: u16) -> Option<StateRow<'_>> {
        let state = state as usize;
        if state >= self.rows {
            return None;
        }
        Some(StateRow {
            cells: &self.cells[state * self.cols..(state + 1) * self.cols],
            evt_cols: self.evt_cols,
            out_cols: self.out_cols,
            has_wave_col: self.has_sched_waves,
        })
    }

    /// Single cell, bounds-checked.
    #[inline]
    pub fn cell(&self, state: u16, column: usize) -> Option<u32> {
        if column >= self.cols {
            return None;
        }
        self.row(state).map(|r| r.cells[column])
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn evt_cols(&self) -> usize {
        self.evt_cols
    }

    #[inline]
    pub fn out_cols(&self) -> usize {
        self.out_cols
    }

    #[inline]
    pub fn has_sched_waves(&self) -> bool {
        self.has_sched_waves
    }

    #[inline]
    pub fn entry_state(&self) -> u16 {
        self.entry_state
    }

    #[inline]
    pub fn ready_for_trial_state(&self) -> u16 {
        self.ready_for_trial_state
    }

    #[inline]
    pub fn swap_on_entry(&self) -> bool {
        self.swap_on_entry
    }

    #[inline]
    pub fn routing(&self) -> &Routing {
        &self.routing
    }

    /// Spec of scheduled wave `wave`; undeclared waves read as disabled.
    #[inline]
    pub fn sched_wave(&self, wave: usize) -> Option<&SchedWaveSpec> {
        self.sched_waves.get(wave)
    }

    #[inline]
    pub fn sched_waves(&self) -> &[SchedWaveSpec; MAX_SCHED_WAVES] {
        &self.sched_waves
    }

    /// Convert back into the upload format.
    pub fn to_blob(&self) -> MatrixBlob {
        let r = &self.routing;
        let mut inputs = Vec::new();
        for chan in 0..r.num_in_chans() {
            for edge in [Edge::Up, Edge::Down] {
                if let Some(column) = r.input_column(chan, edge) {
                    inputs.push(InputRoute {
                        chan: chan as u8,
                        edge,
                        column: column as u8,
                    });
                }
            }
        }
        let mut wave_inputs = Vec::new();
        let mut wave_outputs = Vec::new();
        for wave in 0..MAX_SCHED_WAVES {
            for edge in [Edge::Up, Edge::Down] {
                if let Some(column) = r.wave_input_column(wave, edge) {
                    wave_inputs.push(WaveInputRoute {
                        wave: wave as u8,
                        edge,
                        column: column as u8,
                    });
                }
            }
            if let Some(channel) = r.wave_output_channel(wave) {
                wave_outputs.push(WaveOutputRoute {
                    wave: wave as u8,
                    channel: channel as u8,
                });
            }
        }
        let sched_waves = self
            .sched_waves
            .iter()
            .filter(|w| self.declared_waves & (1 << w.id) != 0)
            .copied()
            .collect();

        MatrixBlob {
            rows: self.rows as u16,
            cols: self.cols as u16,
            cells: self.cells.clone(),
            entry_state: self.entry_state,
            ready_for_trial_state: self.ready_for_trial_state,
            swap_on_entry: self.swap_on_entry,
            routing: RoutingBlob {
                input_kind: r.input_kind,
                first_in_chan: r.first_in_chan,
                num_in_chans: r.num_in_chans,
                num_evt_cols: self.evt_cols as u8,
                inputs,
                wave_inputs,
                wave_outputs,
                outputs: r.outputs.iter().cloned().collect(),
            },
            sched_waves,
        }
    }
}

fn build_routing(
    r: &RoutingBlob,
    evt_cols: usize,
    declared: &[bool; MAX_SCHED_WAVES],
) -> Result<Routing, MatrixError> {
    let first = r.first_in_chan as usize;
    let count = r.num_in_chans as usize;
    if first + count > MAX_IN_CHANS {
        return Err(MatrixError::InputChannelRange {
            first,
            count,
            max: MAX_IN_CHANS,
        });
    }

    let check_column = |column: u8| -> Result<u8, MatrixError> {
        if (column as usize) < evt_cols {
            Ok(column)
        } else {
            Err(MatrixError::EventColumnOutOfRange {
                column: column as usize,
                evt_cols,
            })
        }
    };
    let check_wave = |wave: u8| -> Result<usize, MatrixError> {
        let w = wave as usize;
        if w >= MAX_SCHED_WAVES {
            return Err(MatrixError::WaveIdOutOfRange {
                wave: w,
                max: MAX_SCHED_WAVES,
            });
        }
        if !declared[w] {
            return Err(MatrixError::UndeclaredWave { wave: w });
        }
        Ok(w)
    };

    let mut input_routing = [None; MAX_IN_CHANS * 2];
    for route in &r.inputs {
        let chan = route.chan as usize;
        if chan >= count {
            return Err(MatrixError::InputRouteChannel {
                chan,
                num_in_chans: count,
            });
        }
        let slot = &mut input_routing[chan * 2 + route.edge.offset()];
        if slot.is_some() {
            return Err(MatrixError::DuplicateRoute { what: "input edge" });
        }
        *slot = Some(check_column(route.column)?);
    }

    let mut wave_input = [None; MAX_SCHED_WAVES * 2];
    for route in &r.wave_inputs {
        let wave = check_wave(route.wave)?;
        let slot = &mut wave_input[wave * 2 + route.edge.offset()];
        if slot.is_some() {
            return Err(MatrixError::DuplicateRoute {
                what: "scheduled-wave edge",
            });
        }
        *slot = Some(check_column(route.column)?);
    }

    let mut wave_output = [None; MAX_SCHED_WAVES];
    for route in &r.wave_outputs {
        let wave = check_wave(route.wave)?;
        if route.channel as usize >= MAX_OUT_CHANS {
            return Err(MatrixError::OutputChannelOutOfRange {
                channel: route.channel as usize,
                max: MAX_OUT_CHANS,
            });
        }
        if wave_output[wave].is_some() {
            return Err(MatrixError::DuplicateRoute {
                what: "scheduled-wave output",
            });
        }
        wave_output[wave] = Some(route.channel);
    }

    let mut outputs = heapless::Vec::new();
    for (column, spec) in r.outputs.iter().enumerate() {
        spec.validate(column)?;
        outputs
            .push(spec.clone())
            .map_err(|_| MatrixError::TooManyOutputColumns {
                out_cols: r.outputs.len(),
                max: MAX_OUT_COLS,
            })?;
    }

    Ok(Routing {
        input_kind: r.input_kind,
        first_in_chan: r.first_in_chan,
        num_in_chans: r.num_in_chans,
        input_routing,
        wave_input,
        wave_output,
        outputs,
    })
}

// ─── Builder ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum CellRef {
    Event(usize),
    TimeoutState,
    TimeoutUs,
    Output(usize),
    WaveTrigger,
}

/// Convenience builder for matrices, used by clients and tests.
///
/// Cells not set explicitly default to 0 (event columns jump to state 0,
/// timeouts disabled, outputs idle). Use [`MatrixBuilder::stay`] to make
/// unrouted events self-loops instead.
#[derive(Debug, Clone)]
pub struct MatrixBuilder {
    rows: u16,
    routing: RoutingBlob,
    sched_waves: Vec<SchedWaveSpec>,
    entry_state: u16,
    ready_for_trial_state: u16,
    swap_on_entry: bool,
    self_loops: bool,
    edits: Vec<(u16, CellRef, u32)>,
}

impl MatrixBuilder {
    pub fn new(rows: u16, evt_cols: u8) -> Self {
        Self {
            rows,
            routing: RoutingBlob {
                num_evt_cols: evt_cols,
                ..RoutingBlob::default()
            },
            sched_waves: Vec::new(),
            entry_state: 0,
            ready_for_trial_state: READY_FOR_TRIAL_STATE_DEFAULT,
            swap_on_entry: false,
            self_loops: false,
            edits: Vec::new(),
        }
    }

    /// Unset event cells loop back to their own state.
    pub fn stay(mut self) -> Self {
        self.self_loops = true;
        self
    }

    /// Route `num` physical channels starting at `first`.
    pub fn input_channels(mut self, kind: InputKind, first: u8, num: u8) -> Self {
        self.routing.input_kind = kind;
        self.routing.first_in_chan = first;
        self.routing.num_in_chans = num;
        self
    }

    pub fn input(mut self, chan: u8, edge: Edge, column: u8) -> Self {
        self.routing.inputs.push(InputRoute { chan, edge, column });
        self
    }

    pub fn output(mut self, spec: OutputSpec) -> Self {
        self.routing.outputs.push(spec);
        self
    }

    pub fn wave(mut self, spec: SchedWaveSpec) -> Self {
        self.sched_waves.push(spec);
        self
    }

    pub fn wave_input(mut self, wave: u8, edge: Edge, column: u8) -> Self {
        self.routing
            .wave_inputs
            .push(WaveInputRoute { wave, edge, column });
        self
    }

    pub fn wave_output(mut self, wave: u8, channel: u8) -> Self {
        self.routing
            .wave_outputs
            .push(WaveOutputRoute { wave, channel });
        self
    }

    pub fn entry_state(mut self, state: u16) -> Self {
        self.entry_state = state;
        self
    }

    pub fn swap_on_entry(mut self, on: bool) -> Self {
        self.swap_on_entry = on;
        self
    }

    /// `state` jumps to `dest` when event column `column` fires.
    pub fn on(mut self, state: u16, column: usize, dest: u16) -> Self {
        self.edits.push((state, CellRef::Event(column), dest as u32));
        self
    }

    /// `state` jumps to `dest` after `timeout_us`.
    pub fn timeout(mut self, state: u16, dest: u16, timeout_us: u32) -> Self {
        self.edits.push((state, CellRef::TimeoutState, dest as u32));
        self.edits.push((state, CellRef::TimeoutUs, timeout_us));
        self
    }

    /// Output column `column` of `state` holds `value`.
    pub fn set_output(mut self, state: u16, column: usize, value: u32) -> Self {
        self.edits.push((state, CellRef::Output(column), value));
        self
    }

    /// Scheduled-wave trigger mask of `state`.
    pub fn trigger_waves(mut self, state: u16, mask: u32) -> Self {
        self.edits.push((state, CellRef::WaveTrigger, mask));
        self
    }

    /// Materialize the upload format without validating it.
    pub fn into_blob(self) -> Result<MatrixBlob, MatrixError> {
        let rows = self.rows as usize;
        let evt_cols = self.routing.num_evt_cols as usize;
        let out_cols = self.routing.outputs.len();
        let has_waves = self.sched_waves.iter().any(|w| w.enabled);
        let cols = layout_cols(evt_cols, out_cols, has_waves);
        let total = rows.saturating_mul(cols);
        if total > MAX_CELLS {
            return Err(MatrixError::TooManyCells {
                cells: total,
                max: MAX_CELLS,
            });
        }

        let mut cells = vec![0u32; total];
        if self.self_loops {
            for state in 0..rows {
                for column in 0..evt_cols {
                    cells[state * cols + column] = state as u32;
                }
            }
        }
        for (state, cell, value) in self.edits {
            let state = state as usize;
            if state >= rows {
                return Err(MatrixError::RowOutOfRange { state, rows });
            }
            let column = match cell {
                CellRef::Event(c) if c < evt_cols => c,
                CellRef::Event(c) => {
                    return Err(MatrixError::EventColumnOutOfRange {
                        column: c,
                        evt_cols,
                    });
                }
                CellRef::TimeoutState => evt_cols,
                CellRef::TimeoutUs => evt_cols + 1,
                CellRef::Output(c) if c < out_cols => evt_cols + FIXED_COLS + c,
                CellRef::Output(c) => {
                    return Err(MatrixError::OutputColumnOutOfRange {
                        column: c,
                        out_cols,
                    });
                }
                CellRef::WaveTrigger if has_waves => evt_cols + FIXED_COLS + out_cols,
                CellRef::WaveTrigger => return Err(MatrixError::NoWaveColumn { state }),
            };
            cells[state * cols + column] = value;
        }

        Ok(MatrixBlob {
            rows: self.rows,
            cols: cols as u16,
            cells,
            entry_state: self.entry_state,
            ready_for_trial_state: self.ready_for_trial_state,
            swap_on_entry: self.swap_on_entry,
            routing: self.routing,
            sched_waves: self.sched_waves,
        })
    }

    /// Build and validate.
    pub fn build(self) -> Result<StateMatrix, MatrixError> {
        StateMatrix::from_blob(self.into_blob()?)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
