//! Proxy devices: the per-node (or per node pair) Peer devices through which interfaces reach the Peer.
use derivative::Derivative;
use log::debug;
use serde::{Deserialize, Serialize};

use super::builder::ConfiguredInterface;
use super::spec::{Direction, ProxyModel};
use crate::config::CouplingMode;
use crate::core::property::NeuronsSelector;
use crate::core::topology::Connectivity;
use crate::error::CosimError;

/// The synaptic receptor of a Peer device connection.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum Receptor {
    /// A receptor port number.
    Type(usize),
    /// A named synaptic target, e.g., "AMPA".
    Target(String),
}

/// Everything the Peer needs to create one proxy device.
/// Positions are local to the interface node sets.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct ProxyDeviceSpec {
    /// Label of the interface the device belongs to.
    pub interface: String,
    pub direction: Direction,
    pub model: ProxyModel,
    pub proxy_model: String,
    pub populations: Vec<String>,
    /// Host-side region node and its position among the interface's Host nodes (output only).
    pub source: Option<(usize, usize)>,
    /// Peer-side region node and its position among the interface's Peer nodes.
    pub target: (usize, usize),
    pub weight: Option<f64>,
    pub delay: f64,
    pub receptor: Option<Receptor>,
    #[derivative(Debug = "ignore")]
    pub neurons: Option<NeuronsSelector>,
}

impl ProxyDeviceSpec {
    /// Returns the Peer region node of the device.
    pub fn target_node(&self) -> usize {
        self.target.0
    }

    /// Returns the Host region node feeding the device, if any.
    pub fn source_node(&self) -> Option<usize> {
        self.source.map(|(node, _)| node)
    }

    /// Apply the bound neuron selection to the neurons of a population.
    /// Without a selection, every neuron is kept.
    pub fn select_neurons(&self, neurons: &[usize]) -> Vec<usize> {
        match &self.neurons {
            Some(select) => select(neurons),
            None => neurons.to_vec(),
        }
    }
}

/// Computes the proxy device specifications of configured interfaces.
#[derive(Debug, Clone)]
pub struct ProxyNodesBuilder {
    global_coupling_scaling: Vec<f64>,
    coupling_mode: CouplingMode,
    default_receptor: Option<Receptor>,
    default_delay: Option<f64>,
    peer_min_delay: f64,
}

impl ProxyNodesBuilder {
    /// Create a builder with the global coupling scaling of every region node.
    /// A single value is repeated over all regions; any other length must match the number of regions.
    pub fn build(
        global_coupling_scaling: &[f64],
        number_of_regions: usize,
        coupling_mode: CouplingMode,
        default_receptor: Option<Receptor>,
        default_delay: Option<f64>,
        peer_min_delay: f64,
    ) -> Result<Self, CosimError> {
        let global_coupling_scaling = match global_coupling_scaling.len() {
            1 => vec![global_coupling_scaling[0]; number_of_regions],
            n if n == number_of_regions => global_coupling_scaling.to_vec(),
            n => {
                return Err(CosimError::Configuration(format!(
                    "global coupling scaling has {} values for {} region nodes",
                    n, number_of_regions
                )))
            }
        };
        if !(peer_min_delay.is_finite() && peer_min_delay >= 0.0) {
            return Err(CosimError::InvalidParameter(format!(
                "Peer minimum delay must be non-negative, got {}",
                peer_min_delay
            )));
        }
        Ok(ProxyNodesBuilder {
            global_coupling_scaling,
            coupling_mode,
            default_receptor,
            default_delay,
            peer_min_delay,
        })
    }

    /// Returns the global coupling scaling of a receiving region node.
    pub fn scaling(&self, target: usize) -> f64 {
        self.global_coupling_scaling.get(target).copied().unwrap_or(0.0)
    }

    /// Returns the device specifications of an output interface, one per (source, target) pair.
    /// In Host coupling mode, every Peer node only receives its own coupling term.
    pub fn output_devices(
        &self,
        interface: &ConfiguredInterface,
        connectivity: &Connectivity,
    ) -> Result<Vec<ProxyDeviceSpec>, CosimError> {
        let pairs: Vec<((usize, usize), (usize, usize))> = match self.coupling_mode {
            CouplingMode::Peer => interface
                .host_nodes
                .iter()
                .copied()
                .enumerate()
                .flat_map(|(i, src)| {
                    interface
                        .peer_nodes
                        .iter()
                        .copied()
                        .enumerate()
                        .map(move |(j, trg)| ((src, i), (trg, j)))
                })
                .collect(),
            CouplingMode::Host => interface
                .peer_nodes
                .iter()
                .copied()
                .enumerate()
                .map(|(j, trg)| ((trg, j), (trg, j)))
                .collect(),
        };

        pairs
            .into_iter()
            .map(|((src, i), (trg, j))| {
                let weight = match &interface.weights {
                    Some(f) => f(src, trg),
                    None => match self.coupling_mode {
                        CouplingMode::Peer => self.scaling(trg) * connectivity.weight(src, trg),
                        CouplingMode::Host => self.scaling(trg),
                    },
                };
                let delay = match &interface.delays {
                    Some(f) => f(src, trg),
                    None => match self.coupling_mode {
                        CouplingMode::Peer => connectivity.delay(src, trg),
                        CouplingMode::Host => self.peer_min_delay,
                    },
                };
                let receptor = match &interface.receptor {
                    Some(f) => f(src, trg),
                    None => self.default_receptor.clone().ok_or_else(|| {
                        CosimError::Configuration(format!(
                            "no receptor for the devices of interface '{}'",
                            interface.label
                        ))
                    })?,
                };
                self.device(interface, Some((src, i)), (trg, j), Some(weight), delay, Some(receptor))
            })
            .collect()
    }

    /// Returns the device specifications of an input interface, one per Peer node.
    pub fn input_devices(&self, interface: &ConfiguredInterface) -> Result<Vec<ProxyDeviceSpec>, CosimError> {
        interface
            .peer_nodes
            .iter()
            .copied()
            .enumerate()
            .map(|(j, node)| {
                let delay = match &interface.delays {
                    Some(f) => f(node, node),
                    None => self.default_delay.unwrap_or(self.peer_min_delay),
                };
                let weight = interface.weights.as_ref().map(|f| f(node, node));
                let receptor = interface.receptor.as_ref().map(|f| f(node, node));
                self.device(interface, None, (node, j), weight, delay, receptor)
            })
            .collect()
    }

    fn device(
        &self,
        interface: &ConfiguredInterface,
        source: Option<(usize, usize)>,
        target: (usize, usize),
        weight: Option<f64>,
        delay: f64,
        receptor: Option<Receptor>,
    ) -> Result<ProxyDeviceSpec, CosimError> {
        if let Some(weight) = weight {
            if !(weight.is_finite() && weight >= 0.0) {
                return Err(CosimError::InvalidParameter(format!(
                    "weight {} from {:?} to node {} of interface '{}' must be non-negative and finite",
                    weight, source, target.0, interface.label
                )));
            }
        }
        if !(delay.is_finite() && delay >= 0.0) {
            return Err(CosimError::InvalidParameter(format!(
                "delay {} to node {} of interface '{}' must be non-negative and finite",
                delay, target.0, interface.label
            )));
        }

        // The neuron selection is bound to the node pair the device connects
        let src = source.map_or(target.0, |(node, _)| node);
        let neurons = interface.neurons.as_ref().map(|f| f(src, target.0));

        debug!(
            "Proxy device of '{}': {:?} -> {}, weight {:?}, delay {}",
            interface.label, source, target.0, weight, delay
        );
        Ok(ProxyDeviceSpec {
            interface: interface.label.clone(),
            direction: interface.direction,
            model: interface.model,
            proxy_model: interface.proxy_model.clone(),
            populations: interface.populations.clone(),
            source,
            target,
            weight,
            delay,
            receptor,
            neurons,
        })
    }
}
