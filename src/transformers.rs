//! Stateless transformations of buffers across representations (rates, spikes, currents).
//!
//! A [`Transformer`] is built once per interface from a [`TransformerModel`] and a map of
//! parameters, each parameter being a [`Property`] of the interface's region nodes.
//! Parameters are evaluated against the interface nodes every time a buffer is transformed.
//!
//! # Examples
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use rusty_cosim::core::buffer::Buffer;
//! use rusty_cosim::core::property::Property;
//! use rusty_cosim::transformers::{Transformer, TransformerModel};
//!
//! let mut params = BTreeMap::new();
//! params.insert("scale_factor".to_string(), Property::constant(100.0));
//! let transformer = Transformer::build(TransformerModel::Linear, &params, vec![3, 5], 0.1).unwrap();
//!
//! let buffer = Buffer::values(0.0, 0.1, vec![0.1], vec![vec![0.2, 0.4]]).unwrap();
//! let rates = transformer.transform(&buffer).unwrap();
//! assert_eq!(rates.column(1), Some(vec![40.0]));
//! ```
use log::warn;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Poisson};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::core::buffer::{Buffer, SpikeEvent};
use crate::core::property::{NodeFn, Property};
use crate::core::MIN_PARALLEL_COLUMNS;
use crate::error::CosimError;

/// Upper bound of the normalized response fed to the inverse sigmoid.
const SIGMOID_SATURATION: f64 = 1.0 - 1e-9;

/// The family of transformation applied by a [`Transformer`].
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Serialize, Deserialize)]
pub enum TransformerModel {
    /// Passthrough.
    #[default]
    Identity,
    /// Rates to rates: `scale_factor * (x - translation_factor)`.
    Linear,
    /// Spikes to rates by histogram binning.
    SpikesToRate,
    /// Rates to rates through the inverse of a sigmoidal activation.
    InverseSigmoid,
    /// Currents to currents: `scale_factor * x`.
    CurrentScale,
    /// Rates to Poisson spike trains.
    RateToSpikes,
}

impl TransformerModel {
    /// Returns the parameters without which the transformer cannot be built.
    pub fn required_params(&self) -> &'static [&'static str] {
        match self {
            TransformerModel::InverseSigmoid => &["w", "Rmin", "beta", "sigma"],
            _ => &[],
        }
    }

    /// Returns the parameters that take a default value when not given.
    pub fn optional_params(&self) -> &'static [(&'static str, f64)] {
        match self {
            TransformerModel::Identity => &[],
            TransformerModel::Linear => &[("scale_factor", 1.0), ("translation_factor", 0.0)],
            TransformerModel::SpikesToRate => &[
                ("scale_factor", 1.0),
                ("number_of_neurons", 1.0),
                ("smoothing_bins", 1.0),
            ],
            TransformerModel::InverseSigmoid => &[],
            TransformerModel::CurrentScale => &[("scale_factor", 1.0)],
            TransformerModel::RateToSpikes => &[("number_of_neurons", 1.0), ("seed", 0.0)],
        }
    }
}

impl fmt::Display for TransformerModel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match self {
            TransformerModel::Identity => "IDENTITY",
            TransformerModel::Linear => "RATE",
            TransformerModel::SpikesToRate => "SPIKES_TO_HIST_RATE",
            TransformerModel::InverseSigmoid => "INVERSE_SIGMOIDAL_RATE",
            TransformerModel::CurrentScale => "CURRENT",
            TransformerModel::RateToSpikes => "SPIKES",
        };
        write!(f, "{}", label)
    }
}

/// A configured, stateless transformation for the nodes of one interface.
#[derive(Clone)]
pub struct Transformer {
    model: TransformerModel,
    params: BTreeMap<String, NodeFn<f64>>,
    nodes: Vec<usize>,
    dt: f64,
    configured: bool,
}

impl fmt::Debug for Transformer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Transformer")
            .field("model", &self.model)
            .field("params", &self.params.keys().collect::<Vec<_>>())
            .field("nodes", &self.nodes)
            .field("dt", &self.dt)
            .finish()
    }
}

impl Transformer {
    /// Create a transformer for the given region nodes (in interface order).
    /// `dt` is the Host integration step, used as the default histogram bin width.
    /// The function returns an error for missing, unknown or out-of-domain parameters.
    pub fn build(
        model: TransformerModel,
        params: &BTreeMap<String, Property<f64>>,
        nodes: Vec<usize>,
        dt: f64,
    ) -> Result<Self, CosimError> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(CosimError::Configuration(format!(
                "transformer time step must be positive, got {}",
                dt
            )));
        }

        for name in params.keys() {
            let known = model.required_params().contains(&name.as_str())
                || model.optional_params().iter().any(|(n, _)| n == name)
                || (model == TransformerModel::SpikesToRate && name == "bin_width");
            if !known {
                return Err(CosimError::Configuration(format!(
                    "unknown parameter '{}' for transformer {}",
                    name, model
                )));
            }
        }

        let mut resolved = BTreeMap::new();
        for &name in model.required_params() {
            let property = params.get(name).ok_or_else(|| {
                CosimError::Configuration(format!(
                    "missing required parameter '{}' for transformer {}",
                    name, model
                ))
            })?;
            resolved.insert(name.to_string(), property.as_node_function());
        }
        for &(name, default) in model.optional_params() {
            let property = params.get(name).cloned().unwrap_or(Property::constant(default));
            resolved.insert(name.to_string(), property.as_node_function());
        }
        if model == TransformerModel::SpikesToRate {
            let property = params.get("bin_width").cloned().unwrap_or(Property::constant(dt));
            resolved.insert("bin_width".to_string(), property.as_node_function());
        }

        let transformer = Transformer {
            model,
            params: resolved,
            nodes,
            dt,
            configured: false,
        };
        transformer.check_domain()?;
        Ok(transformer)
    }

    fn check_domain(&self) -> Result<(), CosimError> {
        let check = |name: &str, valid: &dyn Fn(f64) -> bool, expected: &str| {
            for &node in self.nodes.iter() {
                let value = self.params[name](node);
                if !valid(value) {
                    return Err(CosimError::InvalidParameter(format!(
                        "parameter '{}' of transformer {} must be {}, got {} at node {}",
                        name, self.model, expected, value, node
                    )));
                }
            }
            Ok(())
        };

        match self.model {
            TransformerModel::InverseSigmoid => {
                check("w", &|v| v.is_finite() && v > 0.0, "positive")?;
                check("Rmin", &|v| v > 0.0 && v < 1.0, "in (0, 1)")?;
                check("beta", &|v| v.is_finite() && v > 0.0, "positive")?;
                check("sigma", &|v| v.is_finite(), "finite")?;
            }
            TransformerModel::SpikesToRate => {
                check("bin_width", &|v| v.is_finite() && v > 0.0, "positive")?;
                check("number_of_neurons", &|v| v.is_finite() && v > 0.0, "positive")?;
                check("smoothing_bins", &|v| v.is_finite() && v >= 1.0, "at least 1")?;
            }
            TransformerModel::RateToSpikes => {
                check("number_of_neurons", &|v| v.is_finite() && v >= 1.0, "at least 1")?;
                check("seed", &|v| v.is_finite() && v >= 0.0, "non-negative")?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Mark the transformer ready for use. Calling it more than once has no further effect.
    pub fn configure(&mut self) {
        self.configured = true;
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    pub fn model(&self) -> TransformerModel {
        self.model
    }

    /// Returns the region nodes the transformer was built for.
    pub fn nodes(&self) -> &[usize] {
        &self.nodes
    }

    /// Returns the number of rows of a transformed buffer spanning `duration`:
    /// one per histogram bin for spike binning, `default` otherwise.
    pub fn num_rows(&self, duration: f64, default: usize) -> usize {
        match self.model {
            TransformerModel::SpikesToRate => self.num_bins(duration),
            _ => default,
        }
    }

    // Bins are shared by all columns, so the bin width is taken at the first node
    fn bin_width(&self) -> f64 {
        self.param_per_column("bin_width", 1)[0]
    }

    fn num_bins(&self, duration: f64) -> usize {
        ((duration / self.bin_width()).round() as usize).max(1)
    }

    /// Evaluate a parameter for every column of a buffer.
    fn param_per_column(&self, name: &str, num_columns: usize) -> Vec<f64> {
        let f = &self.params[name];
        let n = self.nodes.len().max(1);
        (0..num_columns)
            .map(|column| match self.nodes.get(column % n) {
                Some(&node) => f(node),
                None => f(column),
            })
            .collect()
    }

    /// Transform a buffer. NaN values are preserved, infinite values are clamped with a warning.
    pub fn transform(&self, buffer: &Buffer) -> Result<Buffer, CosimError> {
        match self.model {
            TransformerModel::Identity => Ok(buffer.clone()),
            TransformerModel::Linear => {
                let num_columns = buffer.num_columns();
                let scale = self.param_per_column("scale_factor", num_columns);
                let translation = self.param_per_column("translation_factor", num_columns);
                self.map_values(buffer, |column, x| scale[column] * (x - translation[column]))
            }
            TransformerModel::CurrentScale => {
                let scale = self.param_per_column("scale_factor", buffer.num_columns());
                self.map_values(buffer, |column, x| scale[column] * x)
            }
            TransformerModel::InverseSigmoid => self.inverse_sigmoid(buffer),
            TransformerModel::SpikesToRate => self.spikes_to_rate(buffer),
            TransformerModel::RateToSpikes => self.rate_to_spikes(buffer),
        }
    }

    fn map_values<F>(&self, buffer: &Buffer, f: F) -> Result<Buffer, CosimError>
    where
        F: Fn(usize, f64) -> f64 + Sync,
    {
        let (times, values) = buffer.as_values().ok_or_else(|| {
            CosimError::InvalidOperation(format!(
                "transformer {} expects sampled values, got spikes",
                self.model
            ))
        })?;

        let map_row = |row: &Vec<f64>| -> Vec<f64> {
            row.iter()
                .enumerate()
                .map(|(column, &x)| if x.is_nan() { x } else { f(column, x) })
                .collect()
        };
        let mut out: Vec<Vec<f64>> = if buffer.num_columns() >= MIN_PARALLEL_COLUMNS {
            values.par_iter().map(map_row).collect()
        } else {
            values.iter().map(map_row).collect()
        };
        self.guard_non_finite(&mut out);

        Buffer::values(buffer.start(), buffer.end(), times.to_vec(), out)
    }

    /// Clamp infinite values to the largest finite magnitude, preserving NaN.
    fn guard_non_finite(&self, values: &mut [Vec<f64>]) {
        let mut num_clamped = 0;
        for v in values.iter_mut().flatten() {
            if v.is_infinite() {
                *v = if *v > 0.0 { f64::MAX } else { f64::MIN };
                num_clamped += 1;
            }
        }
        if num_clamped > 0 {
            warn!(
                "{}",
                CosimError::NumericGuard(format!(
                    "{} infinite value(s) produced by transformer {}",
                    num_clamped, self.model
                ))
            );
        }
    }

    fn inverse_sigmoid(&self, buffer: &Buffer) -> Result<Buffer, CosimError> {
        let num_columns = buffer.num_columns();
        let w = self.param_per_column("w", num_columns);
        let r_min = self.param_per_column("Rmin", num_columns);
        let beta = self.param_per_column("beta", num_columns);
        let sigma = self.param_per_column("sigma", num_columns);

        let num_clamped = std::sync::atomic::AtomicUsize::new(0);
        let out = self.map_values(buffer, |column, x| {
            let lower = r_min[column];
            let upper = SIGMOID_SATURATION.max(lower);
            let r = w[column] * x;
            let clamped = if r.is_nan() { lower } else { r.clamp(lower, upper) };
            if clamped != r {
                num_clamped.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
            sigma[column] - (1.0 / clamped - 1.0).ln() / beta[column]
        })?;

        let num_clamped = num_clamped.into_inner();
        if num_clamped > 0 {
            warn!(
                "{}",
                CosimError::NumericGuard(format!(
                    "{} response(s) outside of the invertible range of the sigmoid",
                    num_clamped
                ))
            );
        }
        Ok(out)
    }

    fn spikes_to_rate(&self, buffer: &Buffer) -> Result<Buffer, CosimError> {
        let spikes = buffer.as_spikes().ok_or_else(|| {
            CosimError::InvalidOperation(format!(
                "transformer {} expects spikes, got sampled values",
                self.model
            ))
        })?;
        let num_columns = spikes.len();
        let scale = self.param_per_column("scale_factor", num_columns);
        let num_neurons = self.param_per_column("number_of_neurons", num_columns);
        let smoothing = self.param_per_column("smoothing_bins", num_columns);
        let bin_width = self.bin_width();
        let num_bins = self.num_bins(buffer.end() - buffer.start());
        let times: Vec<f64> = (0..num_bins)
            .map(|k| buffer.start() + (k + 1) as f64 * bin_width)
            .collect();

        let mut values = vec![vec![0.0; num_columns]; num_bins];
        for (column, events) in spikes.iter().enumerate() {
            let mut counts = vec![0.0; num_bins];
            for event in events.iter() {
                if event.time.is_nan() || event.time < buffer.start() || event.time > buffer.end() {
                    continue;
                }
                let k = (((event.time - buffer.start()) / bin_width).floor() as usize).min(num_bins - 1);
                counts[k] += 1.0;
            }
            let norm = scale[column] / (bin_width * num_neurons[column]);
            let rates = boxcar(&counts, smoothing[column].round() as usize);
            for (k, rate) in rates.into_iter().enumerate() {
                values[k][column] = rate * norm;
            }
        }
        self.guard_non_finite(&mut values);

        Buffer::values(buffer.start(), buffer.end(), times, values)
    }

    fn rate_to_spikes(&self, buffer: &Buffer) -> Result<Buffer, CosimError> {
        let (times, values) = buffer.as_values().ok_or_else(|| {
            CosimError::InvalidOperation(format!(
                "transformer {} expects sampled values, got spikes",
                self.model
            ))
        })?;
        let num_columns = buffer.num_columns();
        let num_neurons = self.param_per_column("number_of_neurons", num_columns);
        let seeds = self.param_per_column("seed", num_columns);

        let spikes = (0..num_columns)
            .map(|column| {
                let seed = (seeds[column] as u64)
                    ^ buffer.start().to_bits().rotate_left(17)
                    ^ (column as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                let n = num_neurons[column].round() as usize;
                let mut events = vec![];
                let mut t_prev = buffer.start();
                for (&t, row) in times.iter().zip(values.iter()) {
                    let lambda = row[column] * n as f64 * (t - t_prev);
                    if t > t_prev && lambda.is_finite() && lambda > 0.0 {
                        if let Ok(poisson) = Poisson::new(lambda) {
                            let count: f64 = poisson.sample(&mut rng);
                            for _ in 0..count as usize {
                                events.push(SpikeEvent::new(
                                    rng.gen_range(t_prev..t),
                                    rng.gen_range(0..n),
                                ));
                            }
                        }
                    }
                    t_prev = t;
                }
                events.sort_by(|a, b| a.time.total_cmp(&b.time));
                events
            })
            .collect();

        Ok(Buffer::spikes(buffer.start(), buffer.end(), spikes))
    }
}

/// Centered moving average over `width` bins, clipped at the edges.
fn boxcar(counts: &[f64], width: usize) -> Vec<f64> {
    if width <= 1 {
        return counts.to_vec();
    }
    let half = width / 2;
    (0..counts.len())
        .map(|k| {
            let lo = k.saturating_sub(half);
            let hi = (k + width - half).min(counts.len());
            counts[lo..hi].iter().sum::<f64>() / (hi - lo) as f64
        })
        .collect()
}

/// Returns the payload kind a transformer model produces, `true` for spikes.
pub fn produces_spikes(model: TransformerModel) -> bool {
    matches!(model, TransformerModel::RateToSpikes)
}

/// Returns true if the transformer model consumes spikes.
pub fn consumes_spikes(model: TransformerModel) -> bool {
    matches!(model, TransformerModel::SpikesToRate)
}
