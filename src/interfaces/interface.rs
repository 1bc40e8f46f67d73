//! Interfaces: a communicator and/or a transformer composed into one of five roles.
use log::{debug, error, warn};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::spec::Direction;
use crate::communicators::{Communicator, Received};
use crate::core::buffer::Buffer;
use crate::error::CosimError;
use crate::transformers::Transformer;

/// How long a transformer worker waits for data before checking for a stop request.
pub const WORKER_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// The composition of an interface.
pub enum Role {
    /// Sends its input as is.
    Sender(Box<dyn Communicator>),
    /// Returns what it receives as is.
    Receiver(Box<dyn Communicator>),
    TransformThenSend {
        transformer: Transformer,
        sender: Box<dyn Communicator>,
    },
    ReceiveThenTransform {
        receiver: Box<dyn Communicator>,
        transformer: Transformer,
    },
    /// A pipeline stage between two communicators, see [`TransformerWorker`].
    RemoteTransform {
        receiver: Box<dyn Communicator>,
        transformer: Transformer,
        sender: Box<dyn Communicator>,
    },
}

impl Role {
    /// Returns the name of the role.
    pub fn name(&self) -> &'static str {
        match self {
            Role::Sender(_) => "Sender",
            Role::Receiver(_) => "Receiver",
            Role::TransformThenSend { .. } => "TransformThenSend",
            Role::ReceiveThenTransform { .. } => "ReceiveThenTransform",
            Role::RemoteTransform { .. } => "RemoteTransform",
        }
    }

    /// Returns true if invoking the role requires an input buffer.
    pub fn takes_input(&self) -> bool {
        matches!(self, Role::Sender(_) | Role::TransformThenSend { .. })
    }
}

impl fmt::Debug for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A configured interface, invoked once per synchronization step.
#[derive(Debug)]
pub struct Interface {
    label: String,
    direction: Direction,
    voi: Vec<usize>,
    voi_labels: Vec<String>,
    nodes: Vec<usize>,
    role: Role,
    /// Transformer applied on a worker thread before the data reaches this interface.
    upstream: Option<Transformer>,
    timeout: Option<Duration>,
    configured: bool,
}

impl Interface {
    pub fn new(label: &str, direction: Direction, role: Role) -> Self {
        Interface {
            label: label.to_string(),
            direction,
            voi: vec![],
            voi_labels: vec![],
            nodes: vec![],
            role,
            upstream: None,
            timeout: None,
            configured: false,
        }
    }

    /// Set the Host state variables (indices and labels) the interface exchanges.
    pub fn with_voi(mut self, voi: Vec<usize>, voi_labels: Vec<String>) -> Self {
        self.voi = voi;
        self.voi_labels = voi_labels;
        self
    }

    /// Set the Host region nodes the interface exchanges.
    pub fn with_nodes(mut self, nodes: Vec<usize>) -> Self {
        self.nodes = nodes;
        self
    }

    /// Set the transformer a [`TransformerWorker`] applies before the data is received here.
    pub fn with_upstream_transformer(mut self, transformer: Option<Transformer>) -> Self {
        self.upstream = transformer;
        self
    }

    /// Set the maximum wait for a previous send to be taken.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn voi(&self) -> &[usize] {
        &self.voi
    }

    pub fn voi_labels(&self) -> &[String] {
        &self.voi_labels
    }

    pub fn nodes(&self) -> &[usize] {
        &self.nodes
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    /// Returns the number of columns of the Host-side buffers: one per (variable, node).
    pub fn num_columns(&self) -> usize {
        self.voi.len() * self.nodes.len()
    }

    /// Returns the number of rows of the buffers received over `duration`, `default` unless a
    /// transformer bins them.
    pub fn num_rows(&self, duration: f64, default: usize) -> usize {
        let transformer = match &self.role {
            Role::ReceiveThenTransform { transformer, .. } => Some(transformer),
            _ => self.upstream.as_ref(),
        };
        transformer.map_or(default, |transformer| transformer.num_rows(duration, default))
    }

    /// Configure the communicators and the transformer of the interface.
    /// Calling it more than once has no further effect.
    pub fn configure(&mut self) -> Result<(), CosimError> {
        if self.configured {
            return Ok(());
        }
        match &mut self.role {
            Role::Sender(communicator) | Role::Receiver(communicator) => communicator.configure()?,
            Role::TransformThenSend { transformer, sender } => {
                transformer.configure();
                sender.configure()?;
            }
            Role::ReceiveThenTransform { receiver, transformer } => {
                receiver.configure()?;
                transformer.configure();
            }
            Role::RemoteTransform {
                receiver,
                transformer,
                sender,
            } => {
                receiver.configure()?;
                transformer.configure();
                sender.configure()?;
            }
        }
        debug!("Configured {} interface '{}' as {}", self.direction, self.label, self.role.name());
        self.configured = true;
        Ok(())
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    /// Invoke the interface for one synchronization step.
    /// Sending roles take a buffer and return nothing; receiving roles return the received buffer,
    /// if any arrived. A remote transform forwards at most one buffer and returns nothing.
    pub fn invoke(&mut self, input: Option<Buffer>, block: bool) -> Result<Option<Buffer>, CosimError> {
        if !self.configured {
            return Err(CosimError::InvalidOperation(format!(
                "interface '{}' invoked before configure()",
                self.label
            )));
        }
        if self.role.takes_input() != input.is_some() {
            return Err(CosimError::InvalidOperation(format!(
                "interface '{}' ({}) invoked {} an input buffer",
                self.label,
                self.role.name(),
                if input.is_some() { "with" } else { "without" }
            )));
        }

        match (&mut self.role, input) {
            (Role::Sender(sender), Some(buffer)) => {
                sender.send(buffer)?;
                Ok(None)
            }
            (Role::TransformThenSend { transformer, sender }, Some(buffer)) => {
                sender.send(transformer.transform(&buffer)?)?;
                Ok(None)
            }
            (Role::Receiver(receiver), None) => Ok(receiver.receive(block)?.into_buffer()),
            (Role::ReceiveThenTransform { receiver, transformer }, None) => {
                match receiver.receive(block)? {
                    Received::Ready(buffer) => Ok(Some(transformer.transform(&buffer)?)),
                    Received::NotReady => Ok(None),
                }
            }
            (
                Role::RemoteTransform {
                    receiver,
                    transformer,
                    sender,
                },
                None,
            ) => {
                // One outstanding send: the previous buffer must have been taken first
                sender.join_pending(self.timeout)?;
                if let Received::Ready(buffer) = receiver.receive(block)? {
                    sender.send(transformer.transform(&buffer)?)?;
                }
                Ok(None)
            }
            _ => Err(CosimError::InvalidOperation(format!(
                "interface '{}' invoked with an unexpected input",
                self.label
            ))),
        }
    }

    /// Wait for the last buffer sent by the interface to be taken by the other end.
    pub fn join_pending(&mut self, timeout: Option<Duration>) -> Result<(), CosimError> {
        match &mut self.role {
            Role::Sender(sender)
            | Role::TransformThenSend { sender, .. }
            | Role::RemoteTransform { sender, .. } => sender.join_pending(timeout),
            Role::Receiver(_) | Role::ReceiveThenTransform { .. } => Ok(()),
        }
    }
}

/// Runs a [`Role::RemoteTransform`] interface on its own thread until stopped or disconnected.
pub struct TransformerWorker {
    label: String,
    handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl TransformerWorker {
    /// Spawn a worker for the specified interface.
    /// Its receiving communicator should time out regularly for stop requests to be honored.
    pub fn spawn(mut interface: Interface) -> Result<Self, CosimError> {
        if !matches!(interface.role, Role::RemoteTransform { .. }) {
            return Err(CosimError::InvalidOperation(format!(
                "interface '{}' is a {}, not a remote transform",
                interface.label,
                interface.role.name()
            )));
        }
        interface.configure()?;

        let label = interface.label.clone();
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = Arc::clone(&shutdown);
        let name = label.clone();

        let handle = thread::Builder::new()
            .name(format!("transformer-{}", label))
            .spawn(move || {
                while !shutdown_clone.load(Ordering::Relaxed) {
                    match interface.invoke(None, true) {
                        Ok(_) => {}
                        // Normal timeout, check shutdown flag
                        Err(CosimError::SynchronizationTimeout { .. }) => continue,
                        Err(CosimError::Disconnected(e)) => {
                            debug!("[Transformer:{}] {}", name, e);
                            break;
                        }
                        Err(e) => {
                            error!("[Transformer:{}] {}", name, e);
                            break;
                        }
                    }
                }
            })
            .map_err(|e| CosimError::IOError(e.to_string()))?;

        Ok(TransformerWorker {
            label,
            handle: Some(handle),
            shutdown,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Signal the worker to stop and wait for it to finish.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("[Transformer:{}] worker panicked", self.label);
            }
        }
    }

    /// Check if the worker is still running.
    pub fn is_running(&self) -> bool {
        !self.shutdown.load(Ordering::Relaxed)
            && self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }
}

impl Drop for TransformerWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
