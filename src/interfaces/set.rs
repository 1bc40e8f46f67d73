//! Ordered, label-addressable collections of same-direction interfaces.
use itertools::Itertools;
use std::time::Duration;

use super::interface::Interface;
use super::spec::Direction;
use crate::core::buffer::Buffer;
use crate::error::CosimError;

/// The data received by one input interface for one synchronization step.
#[derive(Debug, PartialEq, Clone)]
pub struct InterfaceUpdate {
    pub label: String,
    /// Host state variable indices.
    pub voi: Vec<usize>,
    /// Host region node indices.
    pub nodes: Vec<usize>,
    /// Columns are laid out as `variable_position * nodes.len() + node_position`.
    pub buffer: Buffer,
    /// True once a buffer arrived; the buffer is the all-NaN "not ready" marker until then.
    pub ready: bool,
}

impl InterfaceUpdate {
    /// Returns true if a buffer arrived, whatever its values.
    pub fn is_ready(&self) -> bool {
        self.ready
    }
}

/// The updates consumed by the Host for one synchronization step, one per input interface.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct CosimUpdates {
    updates: Vec<InterfaceUpdate>,
}

impl CosimUpdates {
    pub fn new(updates: Vec<InterfaceUpdate>) -> Self {
        CosimUpdates { updates }
    }

    /// Returns true once no update is the "not ready" marker.
    pub fn is_ready(&self) -> bool {
        self.updates.iter().all(|update| update.is_ready())
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Returns an iterator over the updates, in interface order.
    pub fn iter(&self) -> impl Iterator<Item = &InterfaceUpdate> + '_ {
        self.updates.iter()
    }

    /// Returns the update of the interface with the specified label.
    pub fn get(&self, label: &str) -> Option<&InterfaceUpdate> {
        self.updates.iter().find(|update| update.label == label)
    }
}

/// An ordered set of interfaces of the same direction.
#[derive(Debug)]
pub struct InterfaceSet {
    direction: Direction,
    interfaces: Vec<Interface>,
}

impl InterfaceSet {
    pub fn new(direction: Direction) -> Self {
        InterfaceSet {
            direction,
            interfaces: vec![],
        }
    }

    /// Add an interface at the end of the set.
    /// The function returns an error for a direction mismatch or a duplicate label.
    pub fn push(&mut self, interface: Interface) -> Result<(), CosimError> {
        if interface.direction() != self.direction {
            return Err(CosimError::InvalidOperation(format!(
                "cannot add {} interface '{}' to a set of {} interfaces",
                interface.direction(),
                interface.label(),
                self.direction
            )));
        }
        if self.get(interface.label()).is_some() {
            return Err(CosimError::Configuration(format!(
                "duplicate interface label '{}'",
                interface.label()
            )));
        }
        self.interfaces.push(interface);
        Ok(())
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }

    /// Returns the labels of the interfaces, in order.
    pub fn labels(&self) -> Vec<&str> {
        self.interfaces.iter().map(|interface| interface.label()).collect()
    }

    /// Returns the interface with the specified label.
    pub fn get(&self, label: &str) -> Option<&Interface> {
        self.interfaces.iter().find(|interface| interface.label() == label)
    }

    /// Returns an iterator over the interfaces, in order.
    pub fn iter(&self) -> impl Iterator<Item = &Interface> + '_ {
        self.interfaces.iter()
    }

    /// Configure every interface. Calling it more than once has no further effect.
    pub fn configure(&mut self) -> Result<(), CosimError> {
        self.interfaces.iter_mut().try_for_each(|interface| interface.configure())
    }

    /// Invoke every sending interface with its own buffer, in order.
    pub fn send_all(&mut self, buffers: Vec<Buffer>) -> Result<(), CosimError> {
        if buffers.len() != self.interfaces.len() {
            return Err(CosimError::InvalidOperation(format!(
                "{} buffers for {} interfaces",
                buffers.len(),
                self.interfaces.len()
            )));
        }
        for (interface, buffer) in self.interfaces.iter_mut().zip(buffers) {
            interface.invoke(Some(buffer), false)?;
        }
        Ok(())
    }

    /// Wait for every buffer sent by the set to be taken by the other end.
    pub fn join_pending(&mut self, timeout: Option<Duration>) -> Result<(), CosimError> {
        self.interfaces
            .iter_mut()
            .try_for_each(|interface| interface.join_pending(timeout))
    }

    /// Invoke every receiving interface for the data of the window `[start, end]`.
    ///
    /// With previous updates, only the members still not ready are invoked again.
    /// Members without data keep the NaN marker, with `num_rows` rows unless their transformer
    /// bins the data (see [`Interface::num_rows`]).
    pub fn receive_all(
        &mut self,
        previous: Option<CosimUpdates>,
        block: bool,
        start: f64,
        end: f64,
        num_rows: usize,
    ) -> Result<CosimUpdates, CosimError> {
        let mut updates = match previous {
            Some(previous) => previous,
            None => self.not_ready_updates(start, end, num_rows),
        };
        self.receive_missing(&mut updates, block)?;
        Ok(updates)
    }

    /// Invoke again the members of `updates` that are not ready, in place.
    /// On error, the members received before it are kept.
    pub fn receive_missing(&mut self, updates: &mut CosimUpdates, block: bool) -> Result<(), CosimError> {
        if updates.len() != self.interfaces.len() {
            return Err(CosimError::InvalidOperation(format!(
                "{} previous updates for {} interfaces",
                updates.len(),
                self.interfaces.len()
            )));
        }
        for (interface, update) in self.interfaces.iter_mut().zip(updates.updates.iter_mut()) {
            if update.ready {
                continue;
            }
            if let Some(buffer) = interface.invoke(None, block)? {
                update.buffer = buffer;
                update.ready = true;
            }
        }
        Ok(())
    }

    /// Returns the "not ready" marker for every member.
    pub fn not_ready_updates(&self, start: f64, end: f64, num_rows: usize) -> CosimUpdates {
        self.placeholders(false, start, end, num_rows, Buffer::not_ready)
    }

    /// Returns zero updates for every member, e.g., for the first window before any Peer output.
    pub fn zero_updates(&self, start: f64, end: f64, num_rows: usize) -> CosimUpdates {
        self.placeholders(true, start, end, num_rows, Buffer::zeros)
    }

    fn placeholders(
        &self,
        ready: bool,
        start: f64,
        end: f64,
        num_rows: usize,
        filled: fn(f64, f64, usize, usize) -> Buffer,
    ) -> CosimUpdates {
        CosimUpdates {
            updates: self
                .interfaces
                .iter()
                .map(|interface| InterfaceUpdate {
                    label: interface.label().to_string(),
                    voi: interface.voi().to_vec(),
                    nodes: interface.nodes().to_vec(),
                    buffer: filled(
                        start,
                        end,
                        interface.num_rows(end - start, num_rows),
                        interface.num_columns(),
                    ),
                    ready,
                })
                .collect(),
        }
    }

    /// Receive and discard everything already available. Returns the number of discarded buffers.
    pub fn drain(&mut self) -> Result<usize, CosimError> {
        let mut num_discarded = 0;
        for interface in self.interfaces.iter_mut() {
            while interface.invoke(None, false)?.is_some() {
                num_discarded += 1;
            }
        }
        Ok(num_discarded)
    }

    /// Returns a human-readable description of the set.
    pub fn summary(&self) -> String {
        let lines = self
            .interfaces
            .iter()
            .enumerate()
            .map(|(i, interface)| {
                format!(
                    "  {}. '{}' ({}): voi [{}], nodes [{}]",
                    i,
                    interface.label(),
                    interface.role().name(),
                    interface.voi_labels().join(", "),
                    interface.nodes().iter().join(", ")
                )
            })
            .join("\n");
        format!("{} {} interface(s)\n{}", self.len(), self.direction, lines)
    }
}
