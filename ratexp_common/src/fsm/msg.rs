//! Request/response protocol between the control process and a machine.
//!
//! Operations keep the classic wire numbering ([`MsgId`], 1..=23). A raw
//! `(id, payload)` pair is turned into a typed [`Request`] by
//! [`Request::decode`]; anything that fails to decode is answered with
//! [`Response::Ignored`] by the gateway.
//!
//! A matrix upload is validated while it is decoded, on the client's
//! thread. [`Request::LoadMatrix`] only ever carries a validated matrix.

use std::sync::Arc;

use thiserror::Error;

use crate::consts::MSG_MAX_TRANSITIONS;
use crate::fsm::ao::{AoWave, AoWaveError};
use crate::fsm::daq::DaqSpec;
use crate::fsm::matrix::{MatrixBlob, MatrixError, StateMatrix};
use crate::fsm::transition::TransitionBatch;

// ─── Wire Ids ───────────────────────────────────────────────────────

/// Wire operation ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MsgId {
    GetPause = 1,
    PauseUnpause = 2,
    Reset = 3,
    GetValid = 4,
    Invalidate = 5,
    LoadMatrix = 6,
    GetMatrix = 7,
    GetMatrixSize = 8,
    ForceEvent = 9,
    ForceTimesUp = 10,
    ForceSound = 11,
    ForceOutput = 12,
    Transitions = 13,
    TransitionCount = 14,
    GetRuntime = 15,
    /// Reserved, never implemented.
    ReadyForTrial = 16,
    GetCurrentState = 17,
    ForceState = 18,
    GetNumInputEvents = 19,
    StartDaq = 20,
    StopDaq = 21,
    GetAoMaxData = 22,
    AoWave = 23,
}

impl TryFrom<u8> for MsgId {
    type Error = DecodeError;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        Ok(match raw {
            1 => Self::GetPause,
            2 => Self::PauseUnpause,
            3 => Self::Reset,
            4 => Self::GetValid,
            5 => Self::Invalidate,
            6 => Self::LoadMatrix,
            7 => Self::GetMatrix,
            8 => Self::GetMatrixSize,
            9 => Self::ForceEvent,
            10 => Self::ForceTimesUp,
            11 => Self::ForceSound,
            12 => Self::ForceOutput,
            13 => Self::Transitions,
            14 => Self::TransitionCount,
            15 => Self::GetRuntime,
            16 => Self::ReadyForTrial,
            17 => Self::GetCurrentState,
            18 => Self::ForceState,
            19 => Self::GetNumInputEvents,
            20 => Self::StartDaq,
            21 => Self::StopDaq,
            22 => Self::GetAoMaxData,
            23 => Self::AoWave,
            other => return Err(DecodeError::UnknownOperation(other)),
        })
    }
}

/// Raw payload accompanying a wire id.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum WirePayload {
    #[default]
    None,
    /// Up to three integer arguments; unused slots are 0.
    Scalars([i64; 3]),
    Matrix(Box<MatrixBlob>),
    AoWave(AoWave),
}

/// Why a raw request could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unknown operation id {0}")]
    UnknownOperation(u8),
    #[error("operation {0:?} is reserved")]
    Reserved(MsgId),
    #[error("payload does not match operation {0:?}")]
    PayloadMismatch(MsgId),
    #[error("argument {value} out of range for operation {id:?}")]
    ArgumentOutOfRange { id: MsgId, value: i64 },
    #[error("invalid matrix: {0}")]
    InvalidMatrix(#[from] MatrixError),
}

// ─── Typed Requests ─────────────────────────────────────────────────

/// A decoded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    GetPause,
    TogglePause,
    Reset,
    GetValid,
    Invalidate,
    /// Validated matrix, built with [`Request::load_matrix`].
    LoadMatrix(Arc<StateMatrix>),
    GetMatrix,
    GetMatrixSize,
    /// Add event column to the next tick's fired set.
    ForceEvent(u8),
    ForceTimesUp,
    /// `+id` plays, `-id` stops, on the first sound output's card.
    ForceSound(i32),
    /// Always-on digital output mask (0 clears).
    ForceOutput(u32),
    /// Up to `count` records starting at cumulative index `from`.
    GetTransitions { from: u64, count: u16 },
    GetTransitionCount,
    GetRuntime,
    GetCurrentState,
    ForceState(u16),
    GetNumInputEvents,
    StartDaq(DaqSpec),
    StopDaq,
    GetAoMaxData,
    LoadAoWave(AoWave),
}

impl Request {
    /// Validate `blob` and wrap it as an upload request.
    pub fn load_matrix(blob: MatrixBlob) -> Result<Self, MatrixError> {
        Ok(Self::LoadMatrix(Arc::new(StateMatrix::from_blob(blob)?)))
    }

    /// Wire id of the request.
    pub fn id(&self) -> MsgId {
        match self {
            Self::GetPause => MsgId::GetPause,
            Self::TogglePause => MsgId::PauseUnpause,
            Self::Reset => MsgId::Reset,
            Self::GetValid => MsgId::GetValid,
            Self::Invalidate => MsgId::Invalidate,
            Self::LoadMatrix(_) => MsgId::LoadMatrix,
            Self::GetMatrix => MsgId::GetMatrix,
            Self::GetMatrixSize => MsgId::GetMatrixSize,
            Self::ForceEvent(_) => MsgId::ForceEvent,
            Self::ForceTimesUp => MsgId::ForceTimesUp,
            Self::ForceSound(_) => MsgId::ForceSound,
            Self::ForceOutput(_) => MsgId::ForceOutput,
            Self::GetTransitions { .. } => MsgId::Transitions,
            Self::GetTransitionCount => MsgId::TransitionCount,
            Self::GetRuntime => MsgId::GetRuntime,
            Self::GetCurrentState => MsgId::GetCurrentState,
            Self::ForceState(_) => MsgId::ForceState,
            Self::GetNumInputEvents => MsgId::GetNumInputEvents,
            Self::StartDaq(_) => MsgId::StartDaq,
            Self::StopDaq => MsgId::StopDaq,
            Self::GetAoMaxData => MsgId::GetAoMaxData,
            Self::LoadAoWave(_) => MsgId::AoWave,
        }
    }

    /// Decode a raw `(id, payload)` pair.
    pub fn decode(raw_id: u8, payload: WirePayload) -> Result<Self, DecodeError> {
        let id = MsgId::try_from(raw_id)?;
        match (id, payload) {
            (MsgId::ReadyForTrial, _) => Err(DecodeError::Reserved(id)),
            (MsgId::LoadMatrix, WirePayload::Matrix(blob)) => Ok(Self::load_matrix(*blob)?),
            (MsgId::AoWave, WirePayload::AoWave(wave)) => Ok(Self::LoadAoWave(wave)),
            (MsgId::LoadMatrix | MsgId::AoWave, _) => Err(DecodeError::PayloadMismatch(id)),
            (_, WirePayload::Scalars(args)) => Self::decode_scalars(id, args),
            (_, WirePayload::None) => Self::decode_scalars(id, [0; 3]),
            (_, _) => Err(DecodeError::PayloadMismatch(id)),
        }
    }

    fn decode_scalars(id: MsgId, args: [i64; 3]) -> Result<Self, DecodeError> {
        let [a, b, c] = args;
        let out_of_range = |value: i64| DecodeError::ArgumentOutOfRange { id, value };
        Ok(match id {
            MsgId::GetPause => Self::GetPause,
            MsgId::PauseUnpause => Self::TogglePause,
            MsgId::Reset => Self::Reset,
            MsgId::GetValid => Self::GetValid,
            MsgId::Invalidate => Self::Invalidate,
            MsgId::GetMatrix => Self::GetMatrix,
            MsgId::GetMatrixSize => Self::GetMatrixSize,
            MsgId::ForceEvent => Self::ForceEvent(u8::try_from(a).map_err(|_| out_of_range(a))?),
            MsgId::ForceTimesUp => Self::ForceTimesUp,
            MsgId::ForceSound => Self::ForceSound(i32::try_from(a).map_err(|_| out_of_range(a))?),
            MsgId::ForceOutput => {
                Self::ForceOutput(u32::try_from(a).map_err(|_| out_of_range(a))?)
            }
            MsgId::Transitions => {
                let from = u64::try_from(a).map_err(|_| out_of_range(a))?;
                let count = b.clamp(0, MSG_MAX_TRANSITIONS as i64) as u16;
                Self::GetTransitions { from, count }
            }
            MsgId::TransitionCount => Self::GetTransitionCount,
            MsgId::GetRuntime => Self::GetRuntime,
            MsgId::GetCurrentState => Self::GetCurrentState,
            MsgId::ForceState => Self::ForceState(u16::try_from(a).map_err(|_| out_of_range(a))?),
            MsgId::GetNumInputEvents => Self::GetNumInputEvents,
            MsgId::StartDaq => Self::StartDaq(DaqSpec {
                channel_mask: u32::try_from(a).map_err(|_| out_of_range(a))?,
                range_min_fixed1e6: b,
                range_max_fixed1e6: c,
            }),
            MsgId::StopDaq => Self::StopDaq,
            MsgId::GetAoMaxData => Self::GetAoMaxData,
            MsgId::LoadMatrix | MsgId::AoWave | MsgId::ReadyForTrial => {
                return Err(DecodeError::PayloadMismatch(id));
            }
        })
    }
}

// ─── Responses ──────────────────────────────────────────────────────

/// Reply written back into the slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Request carried out, nothing to report.
    Ok,
    /// Unknown, reserved or malformed request; no effect.
    Ignored,
    /// Matrix upload failed validation; active matrix untouched.
    Rejected(MatrixError),
    /// AO wave upload failed validation.
    RejectedAoWave(AoWaveError),
    Paused(bool),
    Valid(bool),
    /// Active matrix, `None` when invalid.
    Matrix(Option<Arc<StateMatrix>>),
    MatrixSize { rows: usize, cols: usize },
    Transitions(TransitionBatch),
    TransitionCount(u64),
    /// µs since the last reset.
    Runtime(u64),
    CurrentState(u16),
    NumInputEvents(usize),
    DaqStarted { accepted: bool, max_data: u16 },
    AoMaxData(u16),
}
