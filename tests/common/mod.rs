#![allow(dead_code)]

use std::thread;
use std::time::Duration;

use rusty_cosim::core::buffer::{Payload, SpikeEvent};
use rusty_cosim::core::topology::Connectivity;
use rusty_cosim::cosimulator::CancelToken;
use rusty_cosim::error::CosimError;
use rusty_cosim::interfaces::proxy::ProxyDeviceSpec;
use rusty_cosim::interfaces::set::CosimUpdates;
use rusty_cosim::interfaces::spec::ProxyModel;
use rusty_cosim::simulator::host::{HostSample, HostSimulator};
use rusty_cosim::simulator::peer::{DeviceId, PeerSimulator};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Three region nodes "a", "b", "c" with symmetric weights and delays.
pub fn connectivity() -> Connectivity {
    Connectivity::build(
        vec!["a".into(), "b".into(), "c".into()],
        vec![vec![0.0, 0.5, 0.2], vec![0.5, 0.0, 0.1], vec![0.2, 0.1, 0.0]],
        vec![vec![0.0, 1.5, 2.5], vec![1.5, 0.0, 3.5], vec![2.5, 3.5, 0.0]],
    )
    .unwrap()
}

/// A Host whose state is `R = time`, `V = -time` at every node, with coupling `10 * time`.
/// It records every update it consumes.
pub struct MockHost {
    pub connectivity: Connectivity,
    pub dt: f64,
    pub coupling_strength: Vec<f64>,
    pub time: f64,
    pub received: Vec<CosimUpdates>,
    /// Cancel the token once the given number of windows has run.
    pub cancel_after: Option<(usize, CancelToken)>,
}

impl MockHost {
    pub fn new() -> Self {
        MockHost {
            connectivity: connectivity(),
            dt: 0.1,
            coupling_strength: vec![2.0],
            time: 0.0,
            received: vec![],
            cancel_after: None,
        }
    }

    fn sample(&self, time: f64) -> HostSample {
        let n = self.connectivity.number_of_regions();
        HostSample {
            time,
            state: vec![vec![time; n], vec![-time; n]],
            coupling: vec![vec![10.0 * time; n], vec![0.0; n]],
        }
    }
}

impl HostSimulator for MockHost {
    fn state_variables(&self) -> Vec<String> {
        vec!["R".into(), "V".into()]
    }

    fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    fn dt(&self) -> f64 {
        self.dt
    }

    fn coupling_strength(&self) -> Vec<f64> {
        self.coupling_strength.clone()
    }

    fn current_sample(&self) -> HostSample {
        self.sample(self.time)
    }

    fn run(
        &mut self,
        duration: f64,
        updates: &CosimUpdates,
    ) -> impl Iterator<Item = Result<HostSample, CosimError>> {
        self.received.push(updates.clone());
        if let Some((after, token)) = &self.cancel_after {
            if self.received.len() >= *after {
                token.cancel();
            }
        }

        let start = self.time;
        let num_steps = (duration / self.dt).round() as usize;
        let samples: Vec<Result<HostSample, CosimError>> = (1..=num_steps)
            .map(|k| Ok(self.sample(start + k as f64 * self.dt)))
            .collect();
        self.time = start + num_steps as f64 * self.dt;
        samples.into_iter()
    }
}

/// A Peer modeling nodes "b" and "c", each with populations "E" and "I" of 10 neurons.
/// Every recorded device reports the number of advances so far, or one spike per advance.
pub struct MockPeer {
    pub nodes: Vec<usize>,
    pub min_delay: f64,
    pub devices: Vec<ProxyDeviceSpec>,
    pub deliveries: Vec<(DeviceId, Payload)>,
    pub advances: Vec<f64>,
    pub fail_build: bool,
    /// Record only NaN values when collecting after the given number of advances.
    pub nan_at: Option<usize>,
    /// Sleep during the advance with the given index.
    pub slow_advance: Option<(usize, Duration)>,
    /// Fail the advance with the given index.
    pub failing_advance: Option<usize>,
}

impl MockPeer {
    pub fn new() -> Self {
        MockPeer {
            nodes: vec![1, 2],
            min_delay: 0.1,
            devices: vec![],
            deliveries: vec![],
            advances: vec![],
            fail_build: false,
            nan_at: None,
            slow_advance: None,
            failing_advance: None,
        }
    }
}

impl PeerSimulator for MockPeer {
    fn region_nodes(&self) -> Vec<usize> {
        self.nodes.clone()
    }

    fn population_neurons(&self, node: usize, population: &str) -> Option<Vec<usize>> {
        let offset = match population {
            "E" => 0,
            "I" => 10,
            _ => return None,
        };
        let first = node * 20 + offset;
        Some((first..first + 10).collect())
    }

    fn min_delay(&self) -> f64 {
        self.min_delay
    }

    fn build_device(&mut self, spec: &ProxyDeviceSpec) -> Result<DeviceId, CosimError> {
        if self.fail_build {
            return Err(CosimError::DeviceBuild(format!(
                "no model '{}' in the Peer",
                spec.proxy_model
            )));
        }
        self.devices.push(spec.clone());
        Ok(self.devices.len() - 1)
    }

    fn deliver(&mut self, device: DeviceId, payload: &Payload) -> Result<(), CosimError> {
        self.deliveries.push((device, payload.clone()));
        Ok(())
    }

    fn collect(&mut self, device: DeviceId, start: f64, end: f64) -> Result<Payload, CosimError> {
        let spec = &self.devices[device];
        let count = match self.nan_at {
            Some(n) if self.advances.len() == n => f64::NAN,
            _ => self.advances.len() as f64,
        };
        let num_columns = spec.populations.len();
        match spec.model {
            ProxyModel::Spikes => Ok(Payload::Spikes(vec![
                vec![SpikeEvent::new(0.5 * (start + end), 0)];
                num_columns
            ])),
            _ => Ok(Payload::Values {
                times: vec![end],
                values: vec![vec![count; num_columns]],
            }),
        }
    }

    fn advance(&mut self, duration: f64) -> Result<(), CosimError> {
        let index = self.advances.len();
        if self.failing_advance == Some(index) {
            return Err(CosimError::IOError(format!("advance {} crashed", index)));
        }
        if let Some((slow, pause)) = self.slow_advance {
            if slow == index {
                thread::sleep(pause);
            }
        }
        self.advances.push(duration);
        Ok(())
    }
}
