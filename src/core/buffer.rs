//! Buffers exchanged between interfaces and simulators once per synchronization step.
use serde::{Deserialize, Serialize};

use crate::error::CosimError;

/// A spike emitted by a neuron of the Peer.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub struct SpikeEvent {
    /// The time at which the spike is produced.
    pub time: f64,
    /// The ID of the neuron producing the spike.
    pub neuron: usize,
}

impl SpikeEvent {
    pub fn new(time: f64, neuron: usize) -> Self {
        SpikeEvent { time, neuron }
    }
}

/// The content of a buffer. Columns are laid out variable-major:
/// `column = variable_position * number_of_nodes + node_position`.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub enum Payload {
    /// Sampled values (rates, currents or state variables): one row per time stamp.
    Values {
        times: Vec<f64>,
        values: Vec<Vec<f64>>,
    },
    /// Spike events, one list per column.
    Spikes(Vec<Vec<SpikeEvent>>),
}

/// A (time window, payload) pair.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Buffer {
    start: f64,
    end: f64,
    payload: Payload,
}

impl Buffer {
    /// Create a buffer of sampled values over `[start, end]`.
    /// The function returns an error if the rows do not match the time stamps or have uneven lengths.
    pub fn values(
        start: f64,
        end: f64,
        times: Vec<f64>,
        values: Vec<Vec<f64>>,
    ) -> Result<Self, CosimError> {
        if times.len() != values.len() {
            return Err(CosimError::InvalidParameter(format!(
                "{} time stamps for {} rows of values",
                times.len(),
                values.len()
            )));
        }
        if let Some(first) = values.first() {
            if values.iter().any(|row| row.len() != first.len()) {
                return Err(CosimError::InvalidParameter(
                    "all rows of values must have the same number of columns".to_string(),
                ));
            }
        }
        Ok(Buffer {
            start,
            end,
            payload: Payload::Values { times, values },
        })
    }

    /// Create a buffer of spike events over `[start, end]`, one list per column.
    pub fn spikes(start: f64, end: f64, spikes: Vec<Vec<SpikeEvent>>) -> Self {
        Buffer {
            start,
            end,
            payload: Payload::Spikes(spikes),
        }
    }

    /// The "not ready" marker: a buffer of NaN values with the expected shape.
    pub fn not_ready(start: f64, end: f64, num_rows: usize, num_columns: usize) -> Self {
        Buffer::filled(start, end, num_rows, num_columns, f64::NAN)
    }

    /// A buffer of zeros with the expected shape, e.g., the Peer output before any Peer advance.
    pub fn zeros(start: f64, end: f64, num_rows: usize, num_columns: usize) -> Self {
        Buffer::filled(start, end, num_rows, num_columns, 0.0)
    }

    /// Rows are evenly spaced over the window, the last one at `end`.
    fn filled(start: f64, end: f64, num_rows: usize, num_columns: usize, value: f64) -> Self {
        let times = (0..num_rows)
            .map(|k| start + (end - start) * (k + 1) as f64 / num_rows as f64)
            .collect();
        Buffer {
            start,
            end,
            payload: Payload::Values {
                times,
                values: vec![vec![value; num_columns]; num_rows],
            },
        }
    }

    /// Returns the start of the time window.
    pub fn start(&self) -> f64 {
        self.start
    }

    /// Returns the end of the time window.
    pub fn end(&self) -> f64 {
        self.end
    }

    /// Returns the payload of the buffer.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn into_payload(self) -> Payload {
        self.payload
    }

    /// Returns the number of columns of the buffer.
    pub fn num_columns(&self) -> usize {
        match &self.payload {
            Payload::Values { values, .. } => values.first().map_or(0, |row| row.len()),
            Payload::Spikes(spikes) => spikes.len(),
        }
    }

    /// Returns the number of rows (time stamps) of a values buffer, zero for spikes.
    pub fn num_rows(&self) -> usize {
        match &self.payload {
            Payload::Values { values, .. } => values.len(),
            Payload::Spikes(_) => 0,
        }
    }

    /// Returns the sampled values, if any.
    pub fn as_values(&self) -> Option<(&[f64], &[Vec<f64>])> {
        match &self.payload {
            Payload::Values { times, values } => Some((times, values)),
            Payload::Spikes(_) => None,
        }
    }

    /// Returns the spike events per column, if any.
    pub fn as_spikes(&self) -> Option<&[Vec<SpikeEvent>]> {
        match &self.payload {
            Payload::Spikes(spikes) => Some(spikes),
            Payload::Values { .. } => None,
        }
    }

    /// Returns true if the buffer holds values and every one of them is NaN.
    pub fn is_all_nan(&self) -> bool {
        match &self.payload {
            Payload::Values { values, .. } => {
                !values.is_empty() && values.iter().flatten().all(|v| v.is_nan())
            }
            Payload::Spikes(_) => false,
        }
    }

    /// Returns true if any value of the buffer is NaN.
    pub fn has_nan(&self) -> bool {
        match &self.payload {
            Payload::Values { values, .. } => values.iter().flatten().any(|v| v.is_nan()),
            Payload::Spikes(spikes) => spikes.iter().flatten().any(|s| s.time.is_nan()),
        }
    }

    /// Returns the values of a single column over time.
    pub fn column(&self, column: usize) -> Option<Vec<f64>> {
        match &self.payload {
            Payload::Values { values, .. } => values.iter().map(|row| row.get(column).copied()).collect(),
            Payload::Spikes(_) => None,
        }
    }
}
