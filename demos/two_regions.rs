//! Co-simulation of a two-region rate model, with the thalamus replaced by a spiking population.
//!
//! Run with `RUST_LOG=debug cargo run --example two_regions` to follow the synchronization windows.
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Poisson};

use rusty_cosim::config::CosimConfig;
use rusty_cosim::core::buffer::{Payload, SpikeEvent};
use rusty_cosim::core::topology::Connectivity;
use rusty_cosim::cosimulator::CoSimulator;
use rusty_cosim::error::CosimError;
use rusty_cosim::interfaces::builder::InterfaceBuilder;
use rusty_cosim::interfaces::proxy::ProxyDeviceSpec;
use rusty_cosim::interfaces::set::CosimUpdates;
use rusty_cosim::interfaces::spec::{Direction, InterfaceSpec, ProxyModel};
use rusty_cosim::simulator::host::{HostSample, HostSimulator};
use rusty_cosim::simulator::peer::{DeviceId, PeerSimulator};
use rusty_cosim::transformers::TransformerModel;

const NUM_NEURONS: usize = 100;

/// Rate units with a sigmoidal activation, coupled through the connectome.
struct RateModel {
    connectivity: Connectivity,
    dt: f64,
    tau: f64,
    coupling: f64,
    time: f64,
    rates: Vec<f64>,
}

impl RateModel {
    fn coupling_term(&self) -> Vec<f64> {
        let n = self.rates.len();
        (0..n)
            .map(|trg| {
                self.coupling
                    * (0..n)
                        .map(|src| self.connectivity.weight(src, trg) * self.rates[src])
                        .sum::<f64>()
            })
            .collect()
    }

    fn sample(&self) -> HostSample {
        HostSample {
            time: self.time,
            state: vec![self.rates.clone()],
            coupling: vec![self.coupling_term()],
        }
    }
}

impl HostSimulator for RateModel {
    fn state_variables(&self) -> Vec<String> {
        vec!["R".into()]
    }

    fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    fn dt(&self) -> f64 {
        self.dt
    }

    fn coupling_strength(&self) -> Vec<f64> {
        vec![self.coupling]
    }

    fn current_sample(&self) -> HostSample {
        self.sample()
    }

    fn run(
        &mut self,
        duration: f64,
        updates: &CosimUpdates,
    ) -> impl Iterator<Item = Result<HostSample, CosimError>> {
        // Proxy nodes take the mean rate recorded in the Peer
        for update in updates.iter() {
            if let Some((_, values)) = update.buffer.as_values() {
                for (j, &node) in update.nodes.iter().enumerate() {
                    let column = values.iter().map(|row| row[j]).filter(|x| !x.is_nan());
                    let (sum, count) = column.fold((0.0, 0), |(s, c), x| (s + x, c + 1));
                    if count > 0 {
                        self.rates[node] = sum / count as f64;
                    }
                }
            }
        }

        let num_steps = (duration / self.dt).round() as usize;
        let mut samples = Vec::with_capacity(num_steps);
        for _ in 0..num_steps {
            let input = self.coupling_term();
            for (rate, input) in self.rates.iter_mut().zip(input) {
                let activation = 0.1 / (1.0 + (-(input - 0.02) * 200.0).exp());
                *rate += self.dt * (activation - *rate) / self.tau;
            }
            self.time += self.dt;
            samples.push(Ok(self.sample()));
        }
        samples.into_iter()
    }
}

/// A Poisson population per node, driven by the spikes of its input devices.
struct PoissonPopulations {
    nodes: Vec<usize>,
    devices: Vec<ProxyDeviceSpec>,
    received: Vec<usize>,
    baseline: f64,
    rng: ChaCha8Rng,
}

impl PeerSimulator for PoissonPopulations {
    fn region_nodes(&self) -> Vec<usize> {
        self.nodes.clone()
    }

    fn population_neurons(&self, node: usize, population: &str) -> Option<Vec<usize>> {
        (population == "E" && self.nodes.contains(&node))
            .then(|| (node * NUM_NEURONS..(node + 1) * NUM_NEURONS).collect())
    }

    fn min_delay(&self) -> f64 {
        0.1
    }

    fn build_device(&mut self, spec: &ProxyDeviceSpec) -> Result<DeviceId, CosimError> {
        if spec.model != ProxyModel::Spikes {
            return Err(CosimError::DeviceBuild(format!(
                "no {} device in a Poisson population",
                spec.model
            )));
        }
        self.devices.push(spec.clone());
        self.received.push(0);
        Ok(self.devices.len() - 1)
    }

    fn deliver(&mut self, device: DeviceId, payload: &Payload) -> Result<(), CosimError> {
        if let Payload::Spikes(spikes) = payload {
            self.received[device] += spikes.iter().map(|events| events.len()).sum::<usize>();
        }
        Ok(())
    }

    fn collect(&mut self, device: DeviceId, start: f64, end: f64) -> Result<Payload, CosimError> {
        let node = self.devices[device].target_node();
        // Spikes received by the population during the window raise its rate
        let mut drive = 0;
        for (spec, count) in self.devices.iter().zip(self.received.iter_mut()) {
            if spec.direction == Direction::Output && spec.target_node() == node {
                drive += std::mem::take(count);
            }
        }
        let rate = self.baseline + 1e-4 * drive as f64;
        let lambda = rate * NUM_NEURONS as f64 * (end - start);

        let mut events = vec![];
        if lambda > 0.0 {
            let poisson = Poisson::new(lambda).map_err(|e| CosimError::InvalidParameter(e.to_string()))?;
            let count: f64 = poisson.sample(&mut self.rng);
            for _ in 0..count as usize {
                events.push(SpikeEvent::new(
                    self.rng.gen_range(start..end),
                    self.rng.gen_range(0..NUM_NEURONS),
                ));
            }
        }
        events.sort_by(|a, b| a.time.total_cmp(&b.time));
        Ok(Payload::Spikes(vec![events]))
    }

    fn advance(&mut self, _duration: f64) -> Result<(), CosimError> {
        Ok(())
    }
}

fn main() -> Result<(), CosimError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let connectivity = Connectivity::build(
        vec!["cortex".into(), "thalamus".into()],
        vec![vec![0.0, 1.0], vec![1.0, 0.0]],
        vec![vec![0.0, 5.0], vec![5.0, 0.0]],
    )?;
    let host = RateModel {
        connectivity,
        dt: 0.1,
        tau: 10.0,
        coupling: 0.5,
        time: 0.0,
        rates: vec![0.05, 0.0],
    };
    let peer = PoissonPopulations {
        nodes: vec![1],
        devices: vec![],
        received: vec![],
        baseline: 0.01,
        rng: ChaCha8Rng::seed_from_u64(42),
    };

    let config = CosimConfig::build(200.0, 1.0)?;
    let thalamus = vec!["thalamus"];
    let builder = InterfaceBuilder::new(&config)
        .with_interface(
            InterfaceSpec::output(vec!["R".into()], vec!["E".into()])
                .with_spiking_proxy_inds(thalamus.as_slice().into())
                .with_model(ProxyModel::Spikes)
                .with_transformer(TransformerModel::RateToSpikes)
                .with_param("number_of_neurons", NUM_NEURONS as f64),
        )
        .with_interface(
            InterfaceSpec::input(vec!["R".into()], vec!["E".into()])
                .with_proxy_inds(thalamus.as_slice().into())
                .with_model(ProxyModel::Spikes)
                .with_transformer(TransformerModel::SpikesToRate)
                .with_param("number_of_neurons", NUM_NEURONS as f64)
                .with_param("bin_width", 1.0),
        );

    let mut cosim = CoSimulator::build(host, peer, builder)?;
    println!("{}", cosim.outputs().summary());
    println!("{}", cosim.inputs().summary());

    let results = cosim.run()?;
    let (host, _) = cosim.into_parts()?;
    println!(
        "{} windows, {} Peer advances (+{} flush), {:.1} ms simulated in {:.3} s",
        results.num_windows(),
        results.peer_advances,
        results.flush_advances,
        results.simulated_time,
        results.wall_time.as_secs_f64()
    );
    println!("Final rates: cortex {:.4}, thalamus {:.4}", host.rates[0], host.rates[1]);
    Ok(())
}
