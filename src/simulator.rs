//! The two coupled simulators.
//!
//! - [`host`]: The contract of the mean-field Host
//! - [`peer`]: The contract of the spiking Peer, with the runtime moving data through its devices
pub mod host;
pub mod peer;

pub use host::{HostSample, HostSimulator};
pub use peer::{DeviceId, PeerRunner, PeerRuntime, PeerSimulator};
