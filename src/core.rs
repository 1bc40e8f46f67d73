//! Core module defining the shared building blocks of the Rusty Cosim library.
//!
//! It consists of the following components:
//!
//! - [`topology`]: Resolves region node and state variable labels to stable indices
//! - [`property`]: Turns constants or user functions into uniform per-node functions
//! - [`buffer`]: The (time, payload) pairs exchanged once per synchronization step
//!
//! # Examples
//!
//! ```
//! use rusty_cosim::core::topology::{subset_indices, Connectivity, NodeRef, NodeSelector};
//! use rusty_cosim::core::property::Property;
//!
//! let connectivity = Connectivity::build(
//!     vec!["thalamus".into(), "cortex".into(), "striatum".into()],
//!     vec![vec![0.0, 1.0, 0.5], vec![1.0, 0.0, 0.0], vec![0.5, 0.0, 0.0]],
//!     vec![vec![0.0, 2.0, 4.0], vec![2.0, 0.0, 0.0], vec![4.0, 0.0, 0.0]],
//! )
//! .unwrap();
//!
//! // Select two region nodes by label and index
//! let selector = NodeSelector::from(vec![NodeRef::from("striatum"), 0.into()]);
//! let nodes = subset_indices(&selector, connectivity.region_labels()).unwrap();
//! assert_eq!(nodes, vec![0, 2]);
//!
//! // A constant weight is a function of any pair of nodes
//! let weight = Property::constant(2.5).as_function();
//! assert_eq!(weight(0, 2), 2.5);
//! ```
pub mod buffer;
pub mod property;
pub mod topology;

/// Minimum number of buffer columns to consider parallel processing.
pub const MIN_PARALLEL_COLUMNS: usize = 64;
/// Relative tolerance when checking that a duration is an integer multiple of a time step.
pub const TIME_TOLERANCE: f64 = 1e-9;
