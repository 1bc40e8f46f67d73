//! The synchronization engine advancing the Host and the Peer in lockstep, one window at a time.
//!
//! At window `n`, the Host consumes the Peer output produced during window `n - 1` (zeros at the
//! first window) while the Peer consumes the Host data of window `n - 1`. With a remote Peer, both
//! simulators integrate the same window concurrently.
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::communicators::Pending;
use crate::config::{CosimConfig, CouplingMode, Transport};
use crate::core::buffer::Buffer;
use crate::error::CosimError;
use crate::interfaces::builder::{BuiltInterfaces, InterfaceBuilder};
use crate::interfaces::interface::TransformerWorker;
use crate::interfaces::proxy::ProxyDeviceSpec;
use crate::interfaces::set::{CosimUpdates, InterfaceSet};
use crate::simulator::host::{HostSample, HostSimulator};
use crate::simulator::peer::{DeviceId, PeerRunner, PeerRuntime, PeerSimulator};

/// The lifecycle of a co-simulation.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum EngineState {
    /// Built, not started.
    Idle,
    /// Running the first window, with zero Peer updates.
    Priming,
    Stepping,
    /// Flushing the Peer after the last window.
    Draining,
    /// A window timed out waiting for the Peer; running again retries it.
    Interrupted,
    Stopped,
}

/// A handle to request the cancellation of a running co-simulation.
/// The request is honored between two windows.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What happened during one synchronization window.
#[derive(Debug, PartialEq, Clone)]
pub struct WindowRecord {
    pub index: usize,
    pub start: f64,
    pub end: f64,
    /// Number of Host samples produced over the window.
    pub host_steps: usize,
    pub wall_time: Duration,
}

/// Summary of a co-simulation run.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct CosimResults {
    pub windows: Vec<WindowRecord>,
    /// Peer advances by one synchronization window.
    pub peer_advances: usize,
    /// Peer advances flushing its buffered output after the last window.
    pub flush_advances: usize,
    pub simulated_time: f64,
    pub wall_time: Duration,
    pub cancelled: bool,
}

impl CosimResults {
    pub fn num_windows(&self) -> usize {
        self.windows.len()
    }

    /// Returns the wall-clock time per simulated second. Simulated time is in ms.
    pub fn real_time_factor(&self) -> f64 {
        if self.simulated_time > 0.0 {
            self.wall_time.as_secs_f64() / (self.simulated_time * 1e-3)
        } else {
            0.0
        }
    }
}

/// How far the current window went, kept to retry it after a timeout.
#[derive(Debug)]
struct WindowProgress {
    /// The Peer advance of the window has been issued.
    advanced: bool,
    updates: CosimUpdates,
    wall: Instant,
}

/// Drives a Host and a Peer coupled through interfaces.
pub struct CoSimulator<H, P> {
    config: CosimConfig,
    host: H,
    runner: Option<PeerRunner<P>>,
    outputs: InterfaceSet,
    inputs: InterfaceSet,
    devices: Vec<(DeviceId, ProxyDeviceSpec)>,
    workers: Vec<TransformerWorker>,
    state: EngineState,
    cancel: CancelToken,
    start_time: f64,
    peer_min_delay: f64,
    last_samples: Vec<HostSample>,
    in_flight: Option<Pending<()>>,
    results: CosimResults,
    next_window: usize,
    progress: Option<WindowProgress>,
    flushing: bool,
    retried: bool,
}

impl<H: HostSimulator, P: PeerSimulator + 'static> CoSimulator<H, P> {
    /// Build the interfaces of the builder into both simulators and prepare the engine.
    /// With the remote transport, the Peer is moved to its own worker thread.
    pub fn build(host: H, mut peer: P, mut builder: InterfaceBuilder) -> Result<Self, CosimError> {
        let config = builder.config().clone();
        config.validate()?;

        let BuiltInterfaces {
            outputs,
            inputs,
            ports,
            devices,
            workers,
        } = builder.build(&host, &mut peer)?;

        let peer_min_delay = peer.min_delay();
        let initial = host.current_sample();
        let runtime = PeerRuntime::build(peer, ports, initial.time, config.peer_timeout())?;
        let runner = match config.transport {
            Transport::Direct => PeerRunner::serial(runtime),
            Transport::Remote => PeerRunner::remote(runtime)?,
        };

        info!(
            "Co-simulation built: {} output and {} input interface(s), {} proxy device(s), {} Peer",
            outputs.len(),
            inputs.len(),
            devices.len(),
            if runner.is_remote() { "remote" } else { "serial" }
        );
        Ok(CoSimulator {
            config,
            host,
            runner: Some(runner),
            outputs,
            inputs,
            devices,
            workers,
            state: EngineState::Idle,
            cancel: CancelToken::new(),
            start_time: initial.time,
            peer_min_delay,
            last_samples: vec![initial],
            in_flight: None,
            results: CosimResults::default(),
            next_window: 0,
            progress: None,
            flushing: false,
            retried: false,
        })
    }

    /// Share a cancellation token created before the engine, e.g., by a simulator.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn config(&self) -> &CosimConfig {
        &self.config
    }

    /// Returns a token cancelling the run from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn outputs(&self) -> &InterfaceSet {
        &self.outputs
    }

    pub fn inputs(&self) -> &InterfaceSet {
        &self.inputs
    }

    /// Returns the proxy devices created in the Peer.
    pub fn devices(&self) -> &[(DeviceId, ProxyDeviceSpec)] {
        &self.devices
    }

    /// Run the co-simulation over the simulation length, rounded up to a whole number of windows.
    ///
    /// A co-simulation runs only once. After a [`CosimError::SynchronizationTimeout`], the engine is
    /// [`EngineState::Interrupted`] and running it again retries the interrupted window, once.
    /// Any other error, or a second timeout, stops it.
    pub fn run(&mut self) -> Result<CosimResults, CosimError> {
        match self.state {
            EngineState::Idle => {}
            EngineState::Interrupted => info!("Retrying the co-simulation from window {}", self.next_window),
            state => {
                return Err(CosimError::InvalidOperation(format!(
                    "co-simulation cannot run from state {:?}",
                    state
                )))
            }
        }

        let wall = Instant::now();
        let outcome = self.run_windows();
        self.results.wall_time += wall.elapsed();
        match outcome {
            Ok(()) => {
                self.state = EngineState::Stopped;
                let results = std::mem::take(&mut self.results);
                info!(
                    "Co-simulation of {} ms completed: {:.3} s elapsed, x{:.2} real time",
                    results.simulated_time,
                    results.wall_time.as_secs_f64(),
                    results.real_time_factor()
                );
                Ok(results)
            }
            Err(e @ CosimError::SynchronizationTimeout { .. }) if !self.retried => {
                warn!("Co-simulation interrupted at window {}: {}", self.next_window, e);
                self.retried = true;
                self.state = EngineState::Interrupted;
                Err(e)
            }
            Err(e) => {
                warn!("Co-simulation aborted: {}", e);
                self.abort();
                Err(e)
            }
        }
    }

    fn run_windows(&mut self) -> Result<(), CosimError> {
        let num_windows = self.config.number_of_windows();
        let sync = self.config.synchronization_time;
        if self.state == EngineState::Idle {
            if self.config.rounded_simulation_length() > self.config.simulation_length {
                info!(
                    "Simulation length rounded up from {} to {} ms",
                    self.config.simulation_length,
                    self.config.rounded_simulation_length()
                );
            }
            info!("Starting co-simulation: {} window(s) of {} ms...", num_windows, sync);
        }

        let wall = Instant::now();
        let log_every = (num_windows / 10).max(1);

        for index in self.next_window..num_windows {
            // An interrupted window is completed before honoring a cancellation
            if self.progress.is_none() && self.cancel.is_cancelled() {
                info!("Co-simulation cancelled after {} window(s)", index);
                self.results.cancelled = true;
                break;
            }
            self.state = if index == 0 {
                EngineState::Priming
            } else {
                EngineState::Stepping
            };
            let record = self.step(index)?;
            self.next_window = index + 1;
            self.results.peer_advances += 1;
            self.results.simulated_time += record.end - record.start;
            self.results.windows.push(record);

            if (index + 1) % log_every == 0 {
                debug!(
                    "Co-simulation progress: {:.1}% ({} / {} windows, {:.3} s elapsed)",
                    100.0 * (index + 1) as f64 / num_windows as f64,
                    index + 1,
                    num_windows,
                    wall.elapsed().as_secs_f64()
                );
            }
        }

        self.drain()
    }

    /// Run one synchronization window, or what is left of it after a timeout.
    fn step(&mut self, index: usize) -> Result<WindowRecord, CosimError> {
        let sync = self.config.synchronization_time;
        let start = self.start_time + index as f64 * sync;
        let end = start + sync;

        let mut progress = match self.progress.take() {
            Some(progress) => {
                debug!("Resuming window {} (Peer advance issued: {})", index, progress.advanced);
                progress
            }
            None => {
                let wall = Instant::now();
                let num_rows = self.steps_per_window();
                // Peer output of the previous window, zero before any Peer advance
                let updates = if index == 0 {
                    self.inputs.zero_updates(start - sync, start, num_rows)
                } else {
                    self.inputs.receive_all(None, false, start - sync, start, num_rows)?
                };

                let buffers = self.output_buffers(start - sync, start)?;
                self.outputs.send_all(buffers)?;
                WindowProgress {
                    advanced: false,
                    updates,
                    wall,
                }
            }
        };
        if let Err(e) = self.synchronize(&mut progress, start) {
            self.progress = Some(progress);
            return Err(e);
        }

        let samples = self.run_host(sync, &progress.updates)?;
        let host_steps = samples.len();
        self.last_samples = samples;

        Ok(WindowRecord {
            index,
            start,
            end,
            host_steps,
            wall_time: progress.wall.elapsed(),
        })
    }

    /// Issue the Peer advance of the window, then wait for the Peer output of the previous one
    /// and for the Host data to be taken.
    fn synchronize(&mut self, progress: &mut WindowProgress, start: f64) -> Result<(), CosimError> {
        let sync = self.config.synchronization_time;
        if !progress.advanced {
            self.join_in_flight()?;
            let pending = self.runner()?.advance(sync, true)?;
            self.in_flight = Some(pending);
            progress.advanced = true;
        }

        if !progress.updates.is_ready() {
            debug!("Waiting for the Peer output of [{}, {}]", start - sync, start);
            self.inputs.receive_missing(&mut progress.updates, true)?;
        }
        self.outputs.join_pending(self.config.peer_timeout())
    }

    fn run_host(&mut self, duration: f64, updates: &CosimUpdates) -> Result<Vec<HostSample>, CosimError> {
        let samples = self
            .host
            .run(duration, updates)
            .collect::<Result<Vec<HostSample>, CosimError>>()?;
        if samples.is_empty() {
            return Err(CosimError::InvalidOperation(
                "the Host produced no sample over a synchronization window".to_string(),
            ));
        }
        Ok(samples)
    }

    /// Join the last window advance, discard the Peer output nobody will consume and flush the Peer.
    fn drain(&mut self) -> Result<(), CosimError> {
        self.state = EngineState::Draining;
        if !self.flushing {
            self.join_in_flight()?;
            let num_discarded = self.inputs.drain()?;
            debug!("Discarded {} unconsumed Peer buffer(s)", num_discarded);

            let delay = self.peer_min_delay;
            let flush = self.runner()?.advance(delay, false)?;
            self.in_flight = Some(flush);
            self.flushing = true;
            self.results.flush_advances += 1;
        }

        self.join_in_flight()?;
        let num_discarded = self.inputs.drain()?;
        debug!("Discarded {} Peer buffer(s) after the flush", num_discarded);
        Ok(())
    }

    /// Join the advance in flight if it completes within the Peer timeout, then stop.
    fn abort(&mut self) {
        if let Some(pending) = self.in_flight.take() {
            if let Err(e) = pending.join(self.config.peer_timeout()) {
                warn!("Left the {} behind: {}", pending.what(), e);
            }
        }
        self.progress = None;
        self.state = EngineState::Stopped;
    }

    fn join_in_flight(&mut self) -> Result<(), CosimError> {
        if let Some(pending) = &self.in_flight {
            pending.join(self.config.peer_timeout())?;
        }
        self.in_flight = None;
        Ok(())
    }

    fn runner(&mut self) -> Result<&mut PeerRunner<P>, CosimError> {
        self.runner
            .as_mut()
            .ok_or_else(|| CosimError::InvalidOperation("the Peer has been released".to_string()))
    }

    /// Returns the number of Host samples per window.
    fn steps_per_window(&self) -> usize {
        (self.config.synchronization_time / self.host.dt()).round().max(1.0) as usize
    }

    /// Returns one buffer per output interface with the last Host samples.
    /// Columns are laid out as `variable_position * nodes.len() + node_position`.
    fn output_buffers(&self, start: f64, end: f64) -> Result<Vec<Buffer>, CosimError> {
        // In Host coupling mode, the Peer nodes receive the coupling term computed by the Host
        let coupling = self.config.coupling_mode == CouplingMode::Host;
        let times: Vec<f64> = self.last_samples.iter().map(|sample| sample.time).collect();

        self.outputs
            .iter()
            .map(|interface| {
                let values = self
                    .last_samples
                    .iter()
                    .map(|sample| {
                        interface
                            .voi()
                            .iter()
                            .flat_map(|&var| interface.nodes().iter().map(move |&node| (var, node)))
                            .map(|(var, node)| {
                                sample.value(var, node, coupling).ok_or_else(|| {
                                    CosimError::InvalidParameter(format!(
                                        "Host sample at {} has no value for variable {} at node {}",
                                        sample.time, var, node
                                    ))
                                })
                            })
                            .collect::<Result<Vec<f64>, CosimError>>()
                    })
                    .collect::<Result<Vec<Vec<f64>>, CosimError>>()?;
                Buffer::values(start, end, times.clone(), values)
            })
            .collect()
    }

    /// Stop the workers and return both simulators.
    pub fn into_parts(mut self) -> Result<(H, P), CosimError> {
        for worker in self.workers.iter_mut() {
            worker.stop();
        }
        let runner = self
            .runner
            .take()
            .ok_or_else(|| CosimError::InvalidOperation("the Peer has been released".to_string()))?;
        let peer = runner.finish()?;
        Ok((self.host, peer))
    }
}
