//! Channel communicator for a Peer running on another thread.
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::debug;
use std::time::Duration;

use super::pending::Completer;
use super::{not_configured, Communicator, Pending, Received};
use crate::core::buffer::Buffer;
use crate::error::CosimError;

struct Envelope {
    buffer: Buffer,
    ack: Completer<()>,
}

/// One end of a channel transport. Each end may send, receive, or both.
pub struct RemoteCommunicator {
    label: String,
    tx: Option<Sender<Envelope>>,
    rx: Option<Receiver<Envelope>>,
    last_send: Option<Pending<()>>,
    timeout: Option<Duration>,
    configured: bool,
}

/// Create a sending end and a receiving end. Blocking receives wait at most `timeout`.
pub fn remote_channel(
    label: &str,
    timeout: Option<Duration>,
) -> (RemoteCommunicator, RemoteCommunicator) {
    let (tx, rx) = channel::unbounded();
    let end = |tx: Option<Sender<Envelope>>, rx: Option<Receiver<Envelope>>| RemoteCommunicator {
        label: label.to_string(),
        tx,
        rx,
        last_send: None,
        timeout,
        configured: false,
    };
    (end(Some(tx), None), end(None, Some(rx)))
}

impl RemoteCommunicator {
    /// Set the maximum wait of blocking receives on this end.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn take(&self, envelope: Envelope) -> Received {
        envelope.ack.complete(Ok(()));
        Received::Ready(envelope.buffer)
    }
}

impl Communicator for RemoteCommunicator {
    fn configure(&mut self) -> Result<(), CosimError> {
        if !self.configured {
            debug!("Configuring remote communicator '{}'", self.label);
            self.configured = true;
        }
        Ok(())
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    fn send(&mut self, buffer: Buffer) -> Result<Pending<()>, CosimError> {
        if !self.configured {
            return Err(not_configured(&self.label));
        }
        let tx = self.tx.as_ref().ok_or_else(|| {
            CosimError::InvalidOperation(format!("'{}' is a receiving end", self.label))
        })?;
        if let Some(previous) = &self.last_send {
            if !previous.poll() {
                return Err(CosimError::InvalidOperation(format!(
                    "send on '{}' while the previous one is still pending",
                    self.label
                )));
            }
        }

        let (ack, pending) = Pending::channel(&format!("{} send", self.label));
        tx.send(Envelope { buffer, ack })
            .map_err(|_| CosimError::Disconnected(format!("receiver of '{}' is gone", self.label)))?;
        self.last_send = Some(pending.clone());
        Ok(pending)
    }

    fn receive(&mut self, block: bool) -> Result<Received, CosimError> {
        if !self.configured {
            return Err(not_configured(&self.label));
        }
        let rx = self.rx.as_ref().ok_or_else(|| {
            CosimError::InvalidOperation(format!("'{}' is a sending end", self.label))
        })?;
        let disconnected = || CosimError::Disconnected(format!("sender of '{}' is gone", self.label));

        if !block {
            return match rx.try_recv() {
                Ok(envelope) => Ok(self.take(envelope)),
                Err(TryRecvError::Empty) => Ok(Received::NotReady),
                Err(TryRecvError::Disconnected) => Err(disconnected()),
            };
        }
        match self.timeout {
            None => rx.recv().map(|envelope| self.take(envelope)).map_err(|_| disconnected()),
            Some(timeout) => match rx.recv_timeout(timeout) {
                Ok(envelope) => Ok(self.take(envelope)),
                Err(RecvTimeoutError::Timeout) => Err(CosimError::SynchronizationTimeout {
                    what: format!("data on '{}'", self.label),
                    waited: timeout,
                }),
                Err(RecvTimeoutError::Disconnected) => Err(disconnected()),
            },
        }
    }

    fn join_pending(&mut self, timeout: Option<Duration>) -> Result<(), CosimError> {
        match &self.last_send {
            Some(pending) => {
                pending.join(timeout)?;
                self.last_send = None;
                Ok(())
            }
            None => Ok(()),
        }
    }
}
