//! Communicators move buffers between an interface and a simulator.
//!
//! - [`direct`]: In-process handoff through a shared slot, for a Peer running inline
//! - [`remote`]: Channel transport for a Peer running on its own worker thread
//! - [`pending`]: Handles on sends and advances completing asynchronously
//!
//! # Examples
//!
//! ```rust
//! use std::time::Duration;
//! use rusty_cosim::communicators::{Communicator, Received};
//! use rusty_cosim::communicators::remote::remote_channel;
//! use rusty_cosim::core::buffer::Buffer;
//!
//! let (mut sender, mut receiver) = remote_channel("rates", Some(Duration::from_secs(1)));
//! sender.configure().unwrap();
//! receiver.configure().unwrap();
//!
//! // Nothing has been sent yet
//! assert!(matches!(receiver.receive(false), Ok(Received::NotReady)));
//!
//! let pending = sender.send(Buffer::not_ready(0.0, 1.0, 1, 2)).unwrap();
//! assert!(!pending.poll());
//!
//! // The send resolves when the other end takes the buffer
//! assert!(matches!(receiver.receive(true), Ok(Received::Ready(_))));
//! assert!(pending.poll());
//! ```
use std::time::Duration;

use crate::core::buffer::Buffer;
use crate::error::CosimError;

pub mod direct;
pub mod pending;
pub mod remote;

pub use pending::Pending;

/// The outcome of a receive.
#[derive(Debug, PartialEq, Clone)]
pub enum Received {
    Ready(Buffer),
    NotReady,
}

impl Received {
    /// Returns the received buffer, if any.
    pub fn into_buffer(self) -> Option<Buffer> {
        match self {
            Received::Ready(buffer) => Some(buffer),
            Received::NotReady => None,
        }
    }
}

/// One end of a transport between an interface and a simulator.
pub trait Communicator: Send {
    /// Prepare the communicator for use. Calling it more than once has no further effect.
    fn configure(&mut self) -> Result<(), CosimError>;

    fn is_configured(&self) -> bool;

    /// Hand a buffer over to the other end.
    /// The returned handle resolves once the other end has taken the buffer.
    fn send(&mut self, buffer: Buffer) -> Result<Pending<()>, CosimError>;

    /// Take the next buffer sent by the other end.
    /// A non-blocking receive returns [`Received::NotReady`] when nothing has arrived.
    fn receive(&mut self, block: bool) -> Result<Received, CosimError>;

    /// Wait for the last send to be taken by the other end.
    fn join_pending(&mut self, timeout: Option<Duration>) -> Result<(), CosimError>;
}

pub(crate) fn not_configured(label: &str) -> CosimError {
    CosimError::InvalidOperation(format!("communicator '{}' used before configure()", label))
}
