//! This crate couples a continuous brain-network simulator (the Host) with a spiking neural
//! network simulator (the Peer) into a single co-simulation advancing in lockstep.
//!
//! # Configuring Interfaces
//!
//! Interfaces map Host state variables and region nodes onto Peer populations and proxy devices.
//! They are described by [`interfaces::spec::InterfaceSpec`]s and configured once against both
//! simulators by an [`interfaces::builder::InterfaceBuilder`].
//!
//! ```rust
//! use rusty_cosim::interfaces::spec::{InterfaceSpec, ProxyModel};
//! use rusty_cosim::transformers::TransformerModel;
//!
//! // Host -> Peer: the rate of region node 0 drives population "E" of the Peer nodes 1 and 2
//! let output = InterfaceSpec::output(vec!["R".into()], vec!["E".into()])
//!     .with_proxy_inds(vec![0].into())
//!     .with_spiking_proxy_inds(vec![1, 2].into())
//!     .with_model(ProxyModel::Rate)
//!     .with_transformer(TransformerModel::Linear)
//!     .with_param("scale_factor", 100.0);
//!
//! // Peer -> Host: spikes of population "E" of Peer nodes 1 and 2 update the Host variable "R"
//! let input = InterfaceSpec::input(vec!["R".into()], vec!["E".into()])
//!     .with_proxy_inds(vec![1, 2].into())
//!     .with_model(ProxyModel::Spikes)
//!     .with_transformer(TransformerModel::SpikesToRate);
//!
//! assert!(output.is_output());
//! assert!(!input.is_output());
//! ```
//!
//! # Running a Co-simulation
//!
//! A [`cosimulator::CoSimulator`] drives both simulators window by window, with a causal lag of
//! exactly one synchronization window between the Peer output and the Host input.
//! See `demos/two_regions.rs` for a complete run with toy simulators.

pub mod communicators;
pub mod config;
pub mod core;
pub mod cosimulator;
pub mod error;
pub mod interfaces;
pub mod simulator;
pub mod transformers;
