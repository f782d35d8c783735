//! Analog-output waves.
//!
//! An [`AoWave`] is uploaded as a unit. The external audio path plays the
//! samples; the engine only walks the sample clock in lockstep and fires the
//! event column attached to each sample (if any).

use thiserror::Error;

use crate::consts::{AO_MAX_SAMPLES, MAX_AO_WAVES, MAX_EVT_COLS};

/// Reasons an AO wave upload is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AoWaveError {
    #[error("AO wave id {id} exceeds the {max} wave ceiling")]
    IdOutOfRange { id: usize, max: usize },
    #[error("{samples} samples exceed the {max} sample ceiling")]
    TooManySamples { samples: usize, max: usize },
    #[error("{events} event entries for {samples} samples")]
    LengthMismatch { samples: usize, events: usize },
    #[error("sample {index} fires event column {column}, only {max} exist")]
    EventColumnOutOfRange {
        index: usize,
        column: usize,
        max: usize,
    },
    #[error("sample {index} value {value} exceeds max data {max}")]
    SampleOutOfRange { index: usize, value: u16, max: u16 },
}

/// A validated AO wave. An empty wave clears the slot with the same id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AoWave {
    id: u8,
    output_line: u8,
    loop_playback: bool,
    samples: Vec<u16>,
    event_columns: Vec<Option<u8>>,
}

impl AoWave {
    /// Build a wave. `event_columns[i]` is fired when sample `i` plays.
    pub fn new(
        id: u8,
        output_line: u8,
        loop_playback: bool,
        samples: Vec<u16>,
        event_columns: Vec<Option<u8>>,
    ) -> Result<Self, AoWaveError> {
        if id as usize >= MAX_AO_WAVES {
            return Err(AoWaveError::IdOutOfRange {
                id: id as usize,
                max: MAX_AO_WAVES,
            });
        }
        if samples.len() > AO_MAX_SAMPLES {
            return Err(AoWaveError::TooManySamples {
                samples: samples.len(),
                max: AO_MAX_SAMPLES,
            });
        }
        if event_columns.len() != samples.len() {
            return Err(AoWaveError::LengthMismatch {
                samples: samples.len(),
                events: event_columns.len(),
            });
        }
        for (index, column) in event_columns.iter().enumerate() {
            if let Some(c) = *column {
                if c as usize >= MAX_EVT_COLS {
                    return Err(AoWaveError::EventColumnOutOfRange {
                        index,
                        column: c as usize,
                        max: MAX_EVT_COLS,
                    });
                }
            }
        }
        Ok(Self {
            id,
            output_line,
            loop_playback,
            samples,
            event_columns,
        })
    }

    /// Build from the wire layout, where a negative column means "no event".
    pub fn from_wire(
        id: u8,
        output_line: u8,
        loop_playback: bool,
        samples: Vec<u16>,
        event_columns: &[i8],
    ) -> Result<Self, AoWaveError> {
        let columns = event_columns
            .iter()
            .map(|&c| if c < 0 { None } else { Some(c as u8) })
            .collect();
        Self::new(id, output_line, loop_playback, samples, columns)
    }

    /// A clearing upload for slot `id`.
    pub fn cleared(id: u8) -> Result<Self, AoWaveError> {
        Self::new(id, 0, false, Vec::new(), Vec::new())
    }

    #[inline]
    pub fn id(&self) -> u8 {
        self.id
    }

    #[inline]
    pub fn output_line(&self) -> u8 {
        self.output_line
    }

    #[inline]
    pub fn loops(&self) -> bool {
        self.loop_playback
    }

    #[inline]
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_clear(&self) -> bool {
        self.samples.is_empty()
    }

    #[inline]
    pub fn samples(&self) -> &[u16] {
        &self.samples
    }

    /// Event column fired when sample `index` plays.
    #[inline]
    pub fn event_column(&self, index: usize) -> Option<usize> {
        self.event_columns.get(index).copied().flatten().map(usize::from)
    }

    /// Check every event column against a matrix with `evt_cols` columns
    /// and every sample against `max_data`.
    pub fn check_against(&self, evt_cols: usize, max_data: u16) -> Result<(), AoWaveError> {
        for (index, column) in self.event_columns.iter().enumerate() {
            if let Some(c) = *column {
                if c as usize >= evt_cols {
                    return Err(AoWaveError::EventColumnOutOfRange {
                        index,
                        column: c as usize,
                        max: evt_cols,
                    });
                }
            }
        }
        if let Some((index, &value)) = self
            .samples
            .iter()
            .enumerate()
            .find(|&(_, &v)| v > max_data)
        {
            return Err(AoWaveError::SampleOutOfRange {
                index,
                value,
                max: max_data,
            });
        }
        Ok(())
    }
}
