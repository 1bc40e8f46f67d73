//! Run configuration, created once per co-simulation and read-only thereafter.
//!
//! # Examples
//!
//! ```rust
//! use rusty_cosim::config::{CosimConfig, CouplingMode, Transport};
//!
//! let config = CosimConfig::build(100.0, 7.0).unwrap()
//!     .with_coupling_mode(CouplingMode::Peer)
//!     .with_transport(Transport::Remote);
//!
//! // The simulation length is rounded up to a whole number of synchronization windows
//! assert_eq!(config.rounded_simulation_length(), 105.0);
//! assert_eq!(config.number_of_windows(), 15);
//! ```
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use crate::core::TIME_TOLERANCE;
use crate::error::CosimError;
use crate::interfaces::proxy::Receptor;

/// Which simulator computes the large-scale coupling term sent to the Peer.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Serialize, Deserialize)]
pub enum CouplingMode {
    /// The Host computes the coupling term of each Peer node, sent one-to-one.
    Host,
    /// The Host sends its state and the Peer applies connectome weights and delays per node pair.
    #[default]
    Peer,
}

/// How interfaces reach the Peer.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Serialize, Deserialize)]
pub enum Transport {
    /// In-process direct handoff, the Peer runs inline.
    #[default]
    Direct,
    /// Channels to a Peer running on its own worker thread.
    Remote,
}

/// The options recognized by builders and the synchronization engine.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CosimConfig {
    /// The requested simulation length, in ms.
    pub simulation_length: f64,
    /// The synchronization window after which Host and Peer exchange data.
    pub synchronization_time: f64,
    pub coupling_mode: CouplingMode,
    /// If true, a region node is modeled either by the Host or by the Peer, never both.
    pub exclusive_nodes: bool,
    /// The receptor used by Host to Peer proxy devices when an interface does not set one.
    pub default_receptor: Option<Receptor>,
    /// The Peer to Host delay used when an interface does not set one. Defaults to the Peer minimum delay.
    pub default_delay: Option<f64>,
    /// Global coupling scaling per receiving region node. Defaults to the Host coupling strength.
    pub global_coupling_scaling: Option<Vec<f64>>,
    pub transport: Transport,
    /// If true and the transport is remote, transformations run on their own worker threads.
    pub remote_transformers: bool,
    /// Maximum wait for the Peer in milliseconds; `None` waits forever.
    pub peer_timeout_ms: Option<u64>,
}

impl Default for CosimConfig {
    fn default() -> Self {
        CosimConfig {
            simulation_length: 1000.0,
            synchronization_time: 1.0,
            coupling_mode: CouplingMode::default(),
            exclusive_nodes: true,
            default_receptor: Some(Receptor::Type(0)),
            default_delay: None,
            global_coupling_scaling: None,
            transport: Transport::default(),
            remote_transformers: false,
            peer_timeout_ms: Some(60_000),
        }
    }
}

impl CosimConfig {
    /// Create a configuration with the specified lengths and default options.
    /// The function returns an error for non-positive or non-finite lengths.
    pub fn build(simulation_length: f64, synchronization_time: f64) -> Result<Self, CosimError> {
        let config = CosimConfig {
            simulation_length,
            synchronization_time,
            ..CosimConfig::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_coupling_mode(mut self, coupling_mode: CouplingMode) -> Self {
        self.coupling_mode = coupling_mode;
        self
    }

    pub fn with_exclusive_nodes(mut self, exclusive_nodes: bool) -> Self {
        self.exclusive_nodes = exclusive_nodes;
        self
    }

    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_remote_transformers(mut self, remote_transformers: bool) -> Self {
        self.remote_transformers = remote_transformers;
        self
    }

    pub fn with_default_receptor(mut self, receptor: Option<Receptor>) -> Self {
        self.default_receptor = receptor;
        self
    }

    pub fn with_global_coupling_scaling(mut self, scaling: Vec<f64>) -> Self {
        self.global_coupling_scaling = Some(scaling);
        self
    }

    pub fn with_peer_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.peer_timeout_ms = timeout.map(|t| t.as_millis() as u64);
        self
    }

    /// Check the configuration values.
    pub fn validate(&self) -> Result<(), CosimError> {
        if !(self.simulation_length.is_finite() && self.simulation_length > 0.0) {
            return Err(CosimError::Configuration(format!(
                "simulation length must be positive and finite, got {}",
                self.simulation_length
            )));
        }
        if !(self.synchronization_time.is_finite() && self.synchronization_time > 0.0) {
            return Err(CosimError::Configuration(format!(
                "synchronization time must be positive and finite, got {}",
                self.synchronization_time
            )));
        }
        if let Some(delay) = self.default_delay {
            if !(delay.is_finite() && delay >= 0.0) {
                return Err(CosimError::Configuration(format!(
                    "default delay must be non-negative and finite, got {}",
                    delay
                )));
            }
        }
        if let Some(scaling) = &self.global_coupling_scaling {
            if scaling.is_empty() || scaling.iter().any(|s| !s.is_finite()) {
                return Err(CosimError::Configuration(
                    "global coupling scaling must be a non-empty vector of finite values".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Returns the number of synchronization windows, rounding the simulation length up.
    pub fn number_of_windows(&self) -> usize {
        let ratio = self.simulation_length / self.synchronization_time;
        // 14.000000001 windows is 14 windows, not 15
        if (ratio - ratio.round()).abs() <= TIME_TOLERANCE * ratio.abs().max(1.0) {
            ratio.round() as usize
        } else {
            ratio.ceil() as usize
        }
    }

    /// Returns the simulation length rounded up to an integer multiple of the synchronization time.
    pub fn rounded_simulation_length(&self) -> f64 {
        self.number_of_windows() as f64 * self.synchronization_time
    }

    /// Returns the maximum wait for the Peer, if any.
    pub fn peer_timeout(&self) -> Option<Duration> {
        self.peer_timeout_ms.map(Duration::from_millis)
    }

    /// Save the configuration to a file.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), CosimError> {
        let file = File::create(path).map_err(|e| CosimError::IOError(e.to_string()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)
            .map_err(|e| CosimError::IOError(e.to_string()))?;
        writer.flush().map_err(|e| CosimError::IOError(e.to_string()))
    }

    /// Load a configuration from a file.
    /// Missing options take their default value.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, CosimError> {
        let file = File::open(path).map_err(|e| CosimError::IOError(e.to_string()))?;
        let reader = BufReader::new(file);
        let config: CosimConfig =
            serde_json::from_reader(reader).map_err(|e| CosimError::IOError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
