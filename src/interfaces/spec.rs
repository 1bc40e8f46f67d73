//! User-facing description of an interface, before it is configured against both simulators.
use derivative::Derivative;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::proxy::Receptor;
use crate::core::property::{NeuronsSelector, Property};
use crate::core::topology::NodeSelector;
use crate::transformers::TransformerModel;

/// The direction of the data flowing through an interface.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum Direction {
    /// Host to Peer.
    Output,
    /// Peer to Host.
    Input,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Direction::Output => write!(f, "output"),
            Direction::Input => write!(f, "input"),
        }
    }
}

/// The kind of data a proxy device exchanges with the Peer.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Serialize, Deserialize)]
pub enum ProxyModel {
    #[default]
    Rate,
    Spikes,
    Current,
}

impl fmt::Display for ProxyModel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProxyModel::Rate => write!(f, "RATE"),
            ProxyModel::Spikes => write!(f, "SPIKES"),
            ProxyModel::Current => write!(f, "CURRENT"),
        }
    }
}

/// An interface between Host state variables of some region nodes and Peer populations.
///
/// For an output interface, `proxy_inds` are the Host region nodes whose data is sent and
/// `spiking_proxy_inds` the Peer nodes receiving it. For an input interface, `proxy_inds`
/// are the Peer nodes whose populations are recorded.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct InterfaceSpec {
    pub direction: Direction,
    /// Host state variable labels.
    pub voi: Vec<String>,
    /// Peer population labels.
    pub populations: Vec<String>,
    pub proxy_inds: Option<NodeSelector>,
    pub spiking_proxy_inds: Option<NodeSelector>,
    pub model: ProxyModel,
    /// Free-form kind of the Peer device, forwarded to the Peer as is.
    pub proxy_model: Option<String>,
    pub transformer_model: TransformerModel,
    pub transformer_params: BTreeMap<String, Property<f64>>,
    pub weights: Option<Property<f64>>,
    pub delays: Option<Property<f64>>,
    pub receptor_type: Option<Property<Receptor>>,
    #[derivative(Debug = "ignore")]
    pub neurons_inds: Option<Property<NeuronsSelector>>,
    pub label: Option<String>,
}

impl InterfaceSpec {
    fn new(direction: Direction, voi: Vec<String>, populations: Vec<String>) -> Self {
        InterfaceSpec {
            direction,
            voi,
            populations,
            proxy_inds: None,
            spiking_proxy_inds: None,
            model: ProxyModel::default(),
            proxy_model: None,
            transformer_model: TransformerModel::default(),
            transformer_params: BTreeMap::new(),
            weights: None,
            delays: None,
            receptor_type: None,
            neurons_inds: None,
            label: None,
        }
    }

    /// Create a Host to Peer interface.
    pub fn output(voi: Vec<String>, populations: Vec<String>) -> Self {
        InterfaceSpec::new(Direction::Output, voi, populations)
    }

    /// Create a Peer to Host interface.
    pub fn input(voi: Vec<String>, populations: Vec<String>) -> Self {
        InterfaceSpec::new(Direction::Input, voi, populations)
    }

    pub fn with_proxy_inds(mut self, proxy_inds: NodeSelector) -> Self {
        self.proxy_inds = Some(proxy_inds);
        self
    }

    pub fn with_spiking_proxy_inds(mut self, spiking_proxy_inds: NodeSelector) -> Self {
        self.spiking_proxy_inds = Some(spiking_proxy_inds);
        self
    }

    pub fn with_model(mut self, model: ProxyModel) -> Self {
        self.model = model;
        self
    }

    pub fn with_proxy_model(mut self, proxy_model: &str) -> Self {
        self.proxy_model = Some(proxy_model.to_string());
        self
    }

    pub fn with_transformer(mut self, transformer_model: TransformerModel) -> Self {
        self.transformer_model = transformer_model;
        self
    }

    /// Set a transformer parameter, as a constant or a per-node property.
    pub fn with_param<V: Into<Property<f64>>>(mut self, name: &str, value: V) -> Self {
        self.transformer_params.insert(name.to_string(), value.into());
        self
    }

    pub fn with_weights(mut self, weights: Property<f64>) -> Self {
        self.weights = Some(weights);
        self
    }

    pub fn with_delays(mut self, delays: Property<f64>) -> Self {
        self.delays = Some(delays);
        self
    }

    pub fn with_receptor(mut self, receptor_type: Property<Receptor>) -> Self {
        self.receptor_type = Some(receptor_type);
        self
    }

    pub fn with_neurons_inds(mut self, neurons_inds: Property<NeuronsSelector>) -> Self {
        self.neurons_inds = Some(neurons_inds);
        self
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn is_output(&self) -> bool {
        self.direction == Direction::Output
    }

    /// Returns the label of the interface, e.g., `R -> E` for an output interface.
    pub fn label(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => {
                let voi = self.voi.join(",");
                let populations = self.populations.join(",");
                match self.direction {
                    Direction::Output => format!("{} -> {}", voi, populations),
                    Direction::Input => format!("{} <- {}", voi, populations),
                }
            }
        }
    }

    /// Returns the kind of Peer device, defaulting to the lowercase proxy model.
    pub fn proxy_model(&self) -> String {
        match &self.proxy_model {
            Some(proxy_model) => proxy_model.clone(),
            None => self.model.to_string().to_lowercase(),
        }
    }
}
