//! The contract of the Peer, a spiking network simulator, and the runtime driving it.
use crossbeam::channel::{self, Sender};
use log::{debug, trace};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::communicators::pending::Completer;
use crate::communicators::{Communicator, Pending, Received};
use crate::core::buffer::{Buffer, Payload, SpikeEvent};
use crate::error::CosimError;
use crate::interfaces::proxy::ProxyDeviceSpec;
use crate::interfaces::spec::Direction;

/// The identifier of a proxy device created by the Peer.
pub type DeviceId = usize;

/// A spiking network simulator modeling some region nodes with populations of neurons.
pub trait PeerSimulator: Send {
    /// Returns the region nodes modeled by the Peer.
    fn region_nodes(&self) -> Vec<usize>;

    /// Returns the neurons of a population at a region node, if such a population exists.
    fn population_neurons(&self, node: usize, population: &str) -> Option<Vec<usize>>;

    /// Returns the minimum synaptic delay of the Peer.
    fn min_delay(&self) -> f64;

    /// Create a proxy device. Errors should be reported as [`CosimError::DeviceBuild`].
    fn build_device(&mut self, spec: &ProxyDeviceSpec) -> Result<DeviceId, CosimError>;

    /// Feed Host data to an input device: values as `[step][variable]`, or spikes per variable.
    fn deliver(&mut self, device: DeviceId, payload: &Payload) -> Result<(), CosimError>;

    /// Returns the activity recorded by an output device over `[start, end]`:
    /// values as `[step][population]`, or spikes per population.
    fn collect(&mut self, device: DeviceId, start: f64, end: f64) -> Result<Payload, CosimError>;

    /// Advance the Peer by `duration`.
    fn advance(&mut self, duration: f64) -> Result<(), CosimError>;
}

/// A proxy device of a port, with its position among the interface nodes.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct PortDevice {
    pub id: DeviceId,
    pub position: usize,
}

/// The Peer end of an interface.
pub struct PeerPort {
    label: String,
    direction: Direction,
    communicator: Box<dyn Communicator>,
    devices: Vec<PortDevice>,
    num_nodes: usize,
    num_channels: usize,
    block: bool,
}

impl PeerPort {
    /// Create a port over `num_nodes` nodes and `num_channels` variables (output) or populations (input).
    /// With `block`, output ports wait for the Host data of every advance.
    pub fn new(
        label: &str,
        direction: Direction,
        communicator: Box<dyn Communicator>,
        devices: Vec<PortDevice>,
        num_nodes: usize,
        num_channels: usize,
        block: bool,
    ) -> Self {
        PeerPort {
            label: label.to_string(),
            direction,
            communicator,
            devices,
            num_nodes,
            num_channels,
            block,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn devices(&self) -> &[PortDevice] {
        &self.devices
    }

    /// Returns the payload columns of the node at `position`.
    fn columns(&self, position: usize) -> Vec<usize> {
        (0..self.num_channels)
            .map(|channel| channel * self.num_nodes + position)
            .collect()
    }

    /// Split a Host buffer over the devices of the port.
    fn deliver<P: PeerSimulator + ?Sized>(&self, peer: &mut P, buffer: &Buffer) -> Result<(), CosimError> {
        let expected = self.num_channels * self.num_nodes;
        if buffer.num_columns() != expected {
            return Err(CosimError::InvalidParameter(format!(
                "port '{}' expects {} columns, got {}",
                self.label,
                expected,
                buffer.num_columns()
            )));
        }
        for device in self.devices.iter() {
            let columns = self.columns(device.position);
            let payload = match buffer.payload() {
                Payload::Values { times, values } => Payload::Values {
                    times: times.clone(),
                    values: values
                        .iter()
                        .map(|row| columns.iter().map(|&c| row[c]).collect())
                        .collect(),
                },
                Payload::Spikes(spikes) => {
                    Payload::Spikes(columns.iter().map(|&c| spikes[c].clone()).collect())
                }
            };
            peer.deliver(device.id, &payload)?;
        }
        Ok(())
    }

    /// Gather the activity of every device of the port into one buffer.
    fn collect<P: PeerSimulator + ?Sized>(
        &self,
        peer: &mut P,
        start: f64,
        end: f64,
    ) -> Result<Buffer, CosimError> {
        let num_columns = self.num_channels * self.num_nodes;
        let mut times: Option<Vec<f64>> = None;
        let mut values: Vec<Vec<f64>> = vec![];
        let mut spikes: Vec<Vec<SpikeEvent>> = vec![];

        for device in self.devices.iter() {
            let columns = self.columns(device.position);
            match peer.collect(device.id, start, end)? {
                Payload::Values {
                    times: device_times,
                    values: device_values,
                } => {
                    if !spikes.is_empty() {
                        return Err(self.mixed_payloads());
                    }
                    match times.as_ref().map(|times| times.len()) {
                        None => {
                            values = vec![vec![0.0; num_columns]; device_times.len()];
                            times = Some(device_times);
                        }
                        Some(num_rows) if num_rows != device_times.len() => {
                            return Err(CosimError::InvalidParameter(format!(
                                "devices of port '{}' recorded {} and {} samples",
                                self.label,
                                num_rows,
                                device_times.len()
                            )))
                        }
                        Some(_) => {}
                    }
                    for (row, device_row) in values.iter_mut().zip(device_values.iter()) {
                        for (&c, &value) in columns.iter().zip(device_row.iter()) {
                            row[c] = value;
                        }
                    }
                }
                Payload::Spikes(device_spikes) => {
                    if times.is_some() {
                        return Err(self.mixed_payloads());
                    }
                    if spikes.is_empty() {
                        spikes = vec![vec![]; num_columns];
                    }
                    for (&c, events) in columns.iter().zip(device_spikes) {
                        spikes[c] = events;
                    }
                }
            }
        }

        match times {
            Some(times) => Buffer::values(start, end, times, values),
            None if spikes.is_empty() => Ok(Buffer::spikes(start, end, vec![vec![]; num_columns])),
            None => Ok(Buffer::spikes(start, end, spikes)),
        }
    }

    fn mixed_payloads(&self) -> CosimError {
        CosimError::InvalidParameter(format!(
            "devices of port '{}' recorded both values and spikes",
            self.label
        ))
    }
}

/// A Peer with the Peer ends of every interface.
pub struct PeerRuntime<P> {
    peer: P,
    ports: Vec<PeerPort>,
    time: f64,
    timeout: Option<Duration>,
}

impl<P: PeerSimulator> PeerRuntime<P> {
    /// Create a runtime starting at `time`. The communicators of the ports are configured.
    pub fn build(
        peer: P,
        mut ports: Vec<PeerPort>,
        time: f64,
        timeout: Option<Duration>,
    ) -> Result<Self, CosimError> {
        for port in ports.iter_mut() {
            port.communicator.configure()?;
        }
        Ok(PeerRuntime {
            peer,
            ports,
            time,
            timeout,
        })
    }

    pub fn peer(&self) -> &P {
        &self.peer
    }

    pub fn into_peer(self) -> P {
        self.peer
    }

    /// Returns the current Peer time.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Advance the Peer by `duration`.
    ///
    /// With `receive_inputs`, the Host data sent for this advance is delivered first.
    /// The recorded activity is then sent to the Host, once the previous one has been taken.
    pub fn advance(&mut self, duration: f64, receive_inputs: bool) -> Result<(), CosimError> {
        let start = self.time;
        let end = start + duration;

        if receive_inputs {
            for port in self.ports.iter_mut().filter(|p| p.direction == Direction::Output) {
                match port.communicator.receive(port.block)? {
                    Received::Ready(buffer) => port.deliver(&mut self.peer, &buffer)?,
                    Received::NotReady => trace!("No Host data on '{}' for [{}, {}]", port.label, start, end),
                }
            }
        }

        self.peer.advance(duration)?;
        self.time = end;

        for port in self.ports.iter_mut().filter(|p| p.direction == Direction::Input) {
            let buffer = port.collect(&mut self.peer, start, end)?;
            port.communicator.join_pending(self.timeout)?;
            port.communicator.send(buffer)?;
        }
        Ok(())
    }
}

/// A request to the Peer worker thread.
pub enum PeerCommand {
    Advance {
        duration: f64,
        receive_inputs: bool,
        done: Completer<()>,
    },
    Stop,
}

/// Runs the Peer inline or on a dedicated worker thread.
pub enum PeerRunner<P> {
    Serial(PeerRuntime<P>),
    Remote {
        commands: Sender<PeerCommand>,
        handle: Option<JoinHandle<PeerRuntime<P>>>,
    },
}

impl<P: PeerSimulator + 'static> PeerRunner<P> {
    /// Run the Peer inline: advances complete before they return.
    pub fn serial(runtime: PeerRuntime<P>) -> Self {
        PeerRunner::Serial(runtime)
    }

    /// Move the Peer to a worker thread: advances return a pending handle immediately.
    pub fn remote(runtime: PeerRuntime<P>) -> Result<Self, CosimError> {
        let (commands, rx) = channel::unbounded::<PeerCommand>();
        let handle = thread::Builder::new()
            .name("peer".to_string())
            .spawn(move || {
                let mut runtime = runtime;
                // A disconnected command queue stops the worker too
                while let Ok(PeerCommand::Advance {
                    duration,
                    receive_inputs,
                    done,
                }) = rx.recv()
                {
                    debug!("[Peer] advancing by {} from {}", duration, runtime.time());
                    done.complete(runtime.advance(duration, receive_inputs));
                }
                runtime
            })
            .map_err(|e| CosimError::IOError(e.to_string()))?;
        Ok(PeerRunner::Remote {
            commands,
            handle: Some(handle),
        })
    }

    /// Issue a Peer advance by `duration`.
    pub fn advance(&mut self, duration: f64, receive_inputs: bool) -> Result<Pending<()>, CosimError> {
        let what = "peer advance";
        match self {
            PeerRunner::Serial(runtime) => {
                Ok(Pending::resolved(what, runtime.advance(duration, receive_inputs)))
            }
            PeerRunner::Remote { commands, .. } => {
                let (done, pending) = Pending::channel(what);
                commands
                    .send(PeerCommand::Advance {
                        duration,
                        receive_inputs,
                        done,
                    })
                    .map_err(|_| CosimError::Disconnected("peer worker is gone".to_string()))?;
                Ok(pending)
            }
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, PeerRunner::Remote { .. })
    }

    /// Stop the worker, if any, and return the Peer.
    pub fn finish(self) -> Result<P, CosimError> {
        match self {
            PeerRunner::Serial(runtime) => Ok(runtime.into_peer()),
            PeerRunner::Remote {
                commands,
                mut handle,
            } => {
                // The worker may already be gone, joining tells
                let _ = commands.send(PeerCommand::Stop);
                let handle = handle
                    .take()
                    .ok_or_else(|| CosimError::InvalidOperation("peer worker already joined".to_string()))?;
                handle
                    .join()
                    .map(PeerRuntime::into_peer)
                    .map_err(|_| CosimError::Disconnected("peer worker panicked".to_string()))
            }
        }
    }
}
