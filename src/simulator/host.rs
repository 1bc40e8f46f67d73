//! The contract of the Host, a mean-field brain-network simulator.
use crate::core::topology::Connectivity;
use crate::error::CosimError;
use crate::interfaces::set::CosimUpdates;

/// The Host state at one integration step.
/// Both `state` and `coupling` are indexed as `[state_variable][region_node]`.
#[derive(Debug, PartialEq, Clone)]
pub struct HostSample {
    pub time: f64,
    pub state: Vec<Vec<f64>>,
    /// The large-scale coupling term received by every region node.
    pub coupling: Vec<Vec<f64>>,
}

impl HostSample {
    /// Returns the value of a state variable at a region node, or of its coupling term.
    pub fn value(&self, variable: usize, node: usize, coupling: bool) -> Option<f64> {
        let data = if coupling { &self.coupling } else { &self.state };
        data.get(variable).and_then(|row| row.get(node)).copied()
    }
}

/// A mean-field simulator integrating the state of every region node of a connectome.
pub trait HostSimulator {
    /// Returns the labels of the state variables, in state vector order.
    fn state_variables(&self) -> Vec<String>;

    fn connectivity(&self) -> &Connectivity;

    /// Returns the integration time step.
    fn dt(&self) -> f64;

    /// Returns the global coupling strength, a single value or one per region node.
    fn coupling_strength(&self) -> Vec<f64>;

    /// Returns the last computed sample, i.e., the initial conditions before any run.
    fn current_sample(&self) -> HostSample;

    /// Integrate over `duration`, overwriting the proxy node state with the updates,
    /// and yield one sample per integration step.
    fn run(
        &mut self,
        duration: f64,
        updates: &CosimUpdates,
    ) -> impl Iterator<Item = Result<HostSample, CosimError>>;
}
