//! Interfaces between Host state variables and Peer populations.
//!
//! It consists of the following components:
//!
//! - [`spec`]: The user description of an interface
//! - [`builder`]: Configures interfaces against both simulators and builds them
//! - [`proxy`]: The Peer proxy devices of configured interfaces
//! - [`interface`]: Communicators and transformers composed into roles
//! - [`set`]: Ordered collections of interfaces invoked once per synchronization step
pub mod builder;
pub mod interface;
pub mod proxy;
pub mod set;
pub mod spec;
