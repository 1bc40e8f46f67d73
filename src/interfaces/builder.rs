//! Configures interface specifications against both simulators and builds the runtime interfaces.
use derivative::Derivative;
use itertools::Itertools;
use log::{debug, info};
use std::collections::BTreeSet;
use std::time::Duration;

use super::interface::{Interface, Role, TransformerWorker, WORKER_POLL_INTERVAL};
use super::proxy::{ProxyDeviceSpec, ProxyNodesBuilder, Receptor};
use super::set::InterfaceSet;
use super::spec::{Direction, InterfaceSpec, ProxyModel};
use crate::communicators::direct::direct_channel;
use crate::communicators::remote::remote_channel;
use crate::communicators::Communicator;
use crate::config::{CosimConfig, CouplingMode, Transport};
use crate::core::property::{NeuronsSelector, PairFn};
use crate::core::topology::{index_of, subset_indices, NodeRef, NodeSelector};
use crate::error::CosimError;
use crate::simulator::host::HostSimulator;
use crate::simulator::peer::{DeviceId, PeerPort, PeerSimulator, PortDevice};
use crate::transformers::{consumes_spikes, produces_spikes, Transformer, TransformerModel};

/// An interface specification resolved against both simulators.
///
/// For an output interface, `host_nodes` are the region nodes whose data is sent and `peer_nodes`
/// the Peer nodes receiving it. For an input interface, both are the recorded Peer nodes.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct ConfiguredInterface {
    pub label: String,
    pub direction: Direction,
    pub voi: Vec<usize>,
    pub voi_labels: Vec<String>,
    pub populations: Vec<String>,
    pub host_nodes: Vec<usize>,
    pub peer_nodes: Vec<usize>,
    pub model: ProxyModel,
    pub proxy_model: String,
    pub transformer: Transformer,
    #[derivative(Debug = "ignore")]
    pub weights: Option<PairFn<f64>>,
    #[derivative(Debug = "ignore")]
    pub delays: Option<PairFn<f64>>,
    #[derivative(Debug = "ignore")]
    pub receptor: Option<PairFn<Receptor>>,
    #[derivative(Debug = "ignore")]
    pub neurons: Option<PairFn<NeuronsSelector>>,
}

/// Everything built for a co-simulation: the Host-side interface sets, the Peer-side ports,
/// the proxy devices created in the Peer and the transformer workers, if any.
pub struct BuiltInterfaces {
    pub outputs: InterfaceSet,
    pub inputs: InterfaceSet,
    pub ports: Vec<PeerPort>,
    pub devices: Vec<(DeviceId, ProxyDeviceSpec)>,
    pub workers: Vec<TransformerWorker>,
}

/// Collects interface specifications, then configures and builds them once.
#[derive(Debug)]
pub struct InterfaceBuilder {
    config: CosimConfig,
    specs: Vec<InterfaceSpec>,
    configured: Option<Vec<ConfiguredInterface>>,
    built: bool,
}

impl InterfaceBuilder {
    pub fn new(config: &CosimConfig) -> Self {
        InterfaceBuilder {
            config: config.clone(),
            specs: vec![],
            configured: None,
            built: false,
        }
    }

    /// Add an interface specification.
    pub fn with_interface(mut self, spec: InterfaceSpec) -> Self {
        self.specs.push(spec);
        self.configured = None;
        self
    }

    pub fn config(&self) -> &CosimConfig {
        &self.config
    }

    pub fn specs(&self) -> &[InterfaceSpec] {
        &self.specs
    }

    /// Resolve every specification against the Host and the Peer.
    /// Calling it more than once returns the same configured interfaces.
    pub fn configure<H: HostSimulator, P: PeerSimulator>(
        &mut self,
        host: &H,
        peer: &P,
    ) -> Result<&[ConfiguredInterface], CosimError> {
        let configured = match self.configured.take() {
            Some(configured) => configured,
            None => self.resolve(host, peer)?,
        };
        Ok(self.configured.insert(configured).as_slice())
    }

    fn resolve<H: HostSimulator, P: PeerSimulator>(
        &self,
        host: &H,
        peer: &P,
    ) -> Result<Vec<ConfiguredInterface>, CosimError> {
        self.config.validate()?;

        let state_variables = host.state_variables();
        if let Some(label) = state_variables.iter().duplicates().next() {
            return Err(CosimError::Configuration(format!(
                "duplicate state variable '{}'",
                label
            )));
        }

        let connectivity = host.connectivity();
        let region_labels = connectivity.region_labels();
        let num_regions = connectivity.number_of_regions();
        let peer_nodes: Vec<usize> = peer.region_nodes().into_iter().sorted().dedup().collect();
        if let Some(node) = peer_nodes.iter().find(|&&node| node >= num_regions) {
            return Err(CosimError::Topology(format!(
                "Peer node {} out of range for {} region nodes",
                node, num_regions
            )));
        }

        // Peer-side nodes selected by a user, every node the Peer models by default
        let peer_side = |selector: Option<&NodeSelector>, label: &str| -> Result<Vec<usize>, CosimError> {
            let nodes = match selector {
                Some(selector) => subset_indices(selector, region_labels)?,
                None => peer_nodes.clone(),
            };
            if let Some(&node) = nodes.iter().find(|&&node| !peer_nodes.contains(&node)) {
                return Err(CosimError::Topology(format!(
                    "node '{}' of interface '{}' is not modeled by the Peer",
                    region_labels[node], label
                )));
            }
            Ok(nodes)
        };

        let mut input_union = BTreeSet::new();
        for spec in self.specs.iter().filter(|spec| !spec.is_output()) {
            input_union.extend(peer_side(spec.proxy_inds.as_ref(), &spec.label())?);
        }

        let mut configured = Vec::with_capacity(self.specs.len());
        for spec in self.specs.iter() {
            let label = spec.label();
            let (host_nodes, targets) = match spec.direction {
                Direction::Input => {
                    let nodes = peer_side(spec.proxy_inds.as_ref(), &label)?;
                    (nodes.clone(), nodes)
                }
                Direction::Output => {
                    let targets = peer_side(spec.spiking_proxy_inds.as_ref(), &label)?;
                    let sources = self.host_side(spec, &label, &targets, &input_union, region_labels)?;
                    (sources, targets)
                }
            };
            if host_nodes.is_empty() || targets.is_empty() {
                return Err(CosimError::Configuration(format!(
                    "interface '{}' selects no region node",
                    label
                )));
            }

            if spec.voi.is_empty() || spec.populations.is_empty() {
                return Err(CosimError::Configuration(format!(
                    "interface '{}' needs at least one state variable and one population",
                    label
                )));
            }
            let voi = spec
                .voi
                .iter()
                .map(|v| index_of(&NodeRef::from(v.as_str()), &state_variables))
                .collect::<Result<Vec<usize>, CosimError>>()?;
            if spec.direction == Direction::Input && spec.populations.len() != spec.voi.len() {
                return Err(CosimError::Configuration(format!(
                    "input interface '{}' maps {} populations onto {} state variables",
                    label,
                    spec.populations.len(),
                    spec.voi.len()
                )));
            }
            for (&node, population) in targets.iter().cartesian_product(spec.populations.iter()) {
                if peer.population_neurons(node, population).is_none() {
                    return Err(CosimError::Configuration(format!(
                        "no population '{}' at node '{}' of the Peer",
                        population, region_labels[node]
                    )));
                }
            }
            check_models(spec, &label)?;

            let mut transformer = Transformer::build(
                spec.transformer_model,
                &spec.transformer_params,
                host_nodes.clone(),
                host.dt(),
            )?;
            transformer.configure();

            debug!(
                "Configured {} interface '{}': voi {:?}, Host nodes {:?}, Peer nodes {:?}",
                spec.direction, label, voi, host_nodes, targets
            );
            configured.push(ConfiguredInterface {
                label,
                direction: spec.direction,
                voi,
                voi_labels: spec.voi.clone(),
                populations: spec.populations.clone(),
                host_nodes,
                peer_nodes: targets,
                model: spec.model,
                proxy_model: spec.proxy_model(),
                transformer,
                weights: spec.weights.as_ref().map(|p| p.as_function()),
                delays: spec.delays.as_ref().map(|p| p.as_function()),
                receptor: spec.receptor_type.as_ref().map(|p| p.as_function()),
                neurons: spec.neurons_inds.as_ref().map(|p| p.as_function()),
            });
        }

        for direction in [Direction::Output, Direction::Input] {
            let labels = configured.iter().filter(|c| c.direction == direction).map(|c| &c.label);
            if let Some(label) = labels.duplicates().next() {
                return Err(CosimError::Configuration(format!(
                    "duplicate {} interface label '{}'",
                    direction, label
                )));
            }
        }
        Ok(configured)
    }

    /// Returns the Host-side nodes of an output interface.
    fn host_side(
        &self,
        spec: &InterfaceSpec,
        label: &str,
        targets: &[usize],
        input_union: &BTreeSet<usize>,
        region_labels: &[String],
    ) -> Result<Vec<usize>, CosimError> {
        let exclusive = self.config.exclusive_nodes;
        match self.config.coupling_mode {
            // The coupling term is computed by the Host at the Peer nodes themselves
            CouplingMode::Host => {
                if let Some(selector) = &spec.proxy_inds {
                    if subset_indices(selector, region_labels)? != targets {
                        return Err(CosimError::Configuration(format!(
                            "in Host coupling mode, the nodes of interface '{}' must be its Peer nodes",
                            label
                        )));
                    }
                }
                Ok(targets.to_vec())
            }
            CouplingMode::Peer => {
                let sources: Vec<usize> = match &spec.proxy_inds {
                    Some(selector) => subset_indices(selector, region_labels)?,
                    None => (0..region_labels.len())
                        .filter(|node| !(exclusive && input_union.contains(node)))
                        .collect(),
                };
                if exclusive {
                    let overlap: Vec<&str> = sources
                        .iter()
                        .filter(|node| input_union.contains(node))
                        .map(|&node| region_labels[node].as_str())
                        .collect();
                    if !overlap.is_empty() {
                        return Err(CosimError::Topology(format!(
                            "nodes [{}] of output interface '{}' are also input proxy nodes",
                            overlap.join(", "),
                            label
                        )));
                    }
                }
                Ok(sources)
            }
        }
    }

    /// Configure if needed, create the proxy devices in the Peer and wire the communicators.
    /// The function returns an error if called more than once.
    pub fn build<H: HostSimulator, P: PeerSimulator>(
        &mut self,
        host: &H,
        peer: &mut P,
    ) -> Result<BuiltInterfaces, CosimError> {
        if self.built {
            return Err(CosimError::InvalidOperation(
                "interfaces have already been built".to_string(),
            ));
        }
        let configured = self.configure(host, &*peer)?.to_vec();

        let scaling = self
            .config
            .global_coupling_scaling
            .clone()
            .unwrap_or_else(|| host.coupling_strength());
        let proxy = ProxyNodesBuilder::build(
            &scaling,
            host.connectivity().number_of_regions(),
            self.config.coupling_mode,
            self.config.default_receptor.clone(),
            self.config.default_delay,
            peer.min_delay(),
        )?;
        let timeout = self.config.peer_timeout();
        let block = self.config.transport == Transport::Remote;

        let mut built = BuiltInterfaces {
            outputs: InterfaceSet::new(Direction::Output),
            inputs: InterfaceSet::new(Direction::Input),
            ports: vec![],
            devices: vec![],
            workers: vec![],
        };

        for interface in configured {
            let specs = match interface.direction {
                Direction::Output => proxy.output_devices(&interface, host.connectivity())?,
                Direction::Input => proxy.input_devices(&interface)?,
            };
            let mut port_devices = Vec::with_capacity(specs.len());
            for spec in specs {
                let id = peer.build_device(&spec)?;
                let position = spec.source.map_or(spec.target.1, |(_, position)| position);
                port_devices.push(PortDevice { id, position });
                built.devices.push((id, spec));
            }
            info!(
                "Built {} proxy device(s) for {} interface '{}'",
                port_devices.len(),
                interface.direction,
                interface.label
            );

            let (role, peer_end, worker) = self.wire(&interface, timeout)?;
            let upstream = (interface.direction == Direction::Input && worker.is_some())
                .then(|| interface.transformer.clone());
            let (num_nodes, num_channels) = match interface.direction {
                Direction::Output => (interface.host_nodes.len(), interface.voi.len()),
                Direction::Input => (interface.peer_nodes.len(), interface.populations.len()),
            };
            built.ports.push(PeerPort::new(
                &interface.label,
                interface.direction,
                peer_end,
                port_devices,
                num_nodes,
                num_channels,
                block,
            ));

            let host_interface = Interface::new(&interface.label, interface.direction, role)
                .with_voi(interface.voi, interface.voi_labels)
                .with_nodes(interface.host_nodes)
                .with_upstream_transformer(upstream)
                .with_timeout(timeout);
            match interface.direction {
                Direction::Output => built.outputs.push(host_interface)?,
                Direction::Input => built.inputs.push(host_interface)?,
            }
            built.workers.extend(worker);
        }

        built.outputs.configure()?;
        built.inputs.configure()?;
        debug!("{}", built.outputs.summary());
        debug!("{}", built.inputs.summary());

        self.built = true;
        Ok(built)
    }

    /// Create the communicators of an interface: the Host role, the Peer end and the worker, if any.
    fn wire(
        &self,
        interface: &ConfiguredInterface,
        timeout: Option<Duration>,
    ) -> Result<(Role, Box<dyn Communicator>, Option<TransformerWorker>), CosimError> {
        let label = interface.label.as_str();
        let transformer = interface.transformer.clone();
        let identity = transformer.model() == TransformerModel::Identity;

        match (self.config.transport, interface.direction) {
            (Transport::Direct, direction) => {
                let (host_end, peer_end) = direct_channel(label);
                let peer_end: Box<dyn Communicator> = Box::new(peer_end);
                Ok((host_role(direction, Box::new(host_end), transformer), peer_end, None))
            }
            (Transport::Remote, direction) if self.config.remote_transformers && !identity => {
                let (upstream_tx, upstream_rx) = remote_channel(&format!("{} (raw)", label), timeout);
                let (downstream_tx, downstream_rx) = remote_channel(label, timeout);
                let stage = Interface::new(
                    label,
                    direction,
                    Role::RemoteTransform {
                        receiver: Box::new(upstream_rx.with_timeout(Some(WORKER_POLL_INTERVAL))),
                        transformer,
                        sender: Box::new(downstream_tx),
                    },
                )
                .with_timeout(Some(WORKER_POLL_INTERVAL));
                let worker = TransformerWorker::spawn(stage)?;
                let (host_end, peer_end): (Role, Box<dyn Communicator>) = match direction {
                    Direction::Output => (Role::Sender(Box::new(upstream_tx)), Box::new(downstream_rx)),
                    Direction::Input => (Role::Receiver(Box::new(downstream_rx)), Box::new(upstream_tx)),
                };
                Ok((host_end, peer_end, Some(worker)))
            }
            (Transport::Remote, Direction::Output) => {
                let (tx, rx) = remote_channel(label, timeout);
                let peer_end: Box<dyn Communicator> = Box::new(rx);
                Ok((host_role(Direction::Output, Box::new(tx), transformer), peer_end, None))
            }
            (Transport::Remote, Direction::Input) => {
                let (tx, rx) = remote_channel(label, timeout);
                let peer_end: Box<dyn Communicator> = Box::new(tx);
                Ok((host_role(Direction::Input, Box::new(rx), transformer), peer_end, None))
            }
        }
    }
}

/// Returns the Host-side role of an interface transforming on the driving thread.
fn host_role(direction: Direction, communicator: Box<dyn Communicator>, transformer: Transformer) -> Role {
    let identity = transformer.model() == TransformerModel::Identity;
    match (direction, identity) {
        (Direction::Output, true) => Role::Sender(communicator),
        (Direction::Output, false) => Role::TransformThenSend {
            transformer,
            sender: communicator,
        },
        (Direction::Input, true) => Role::Receiver(communicator),
        (Direction::Input, false) => Role::ReceiveThenTransform {
            receiver: communicator,
            transformer,
        },
    }
}

/// The transformer must consume what the interface receives and produce what it sends.
fn check_models(spec: &InterfaceSpec, label: &str) -> Result<(), CosimError> {
    let model = spec.transformer_model;
    let rates_only = !produces_spikes(model) && !consumes_spikes(model);
    let valid = match (spec.direction, spec.model) {
        (Direction::Output, ProxyModel::Spikes) => produces_spikes(model),
        (Direction::Input, ProxyModel::Spikes) => consumes_spikes(model) || model == TransformerModel::Identity,
        (_, ProxyModel::Rate) | (_, ProxyModel::Current) => rates_only,
    };
    if !valid {
        return Err(CosimError::Configuration(format!(
            "transformer {} cannot serve {} interface '{}' of {} proxies",
            model, spec.direction, label, spec.model
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::buffer::Payload;
    use crate::core::property::{every_nth, Property};
    use crate::core::topology::Connectivity;
    use crate::interfaces::set::CosimUpdates;
    use crate::simulator::host::HostSample;

    struct StaticHost {
        connectivity: Connectivity,
        state_variables: Vec<String>,
    }

    impl StaticHost {
        fn new(state_variables: &[&str]) -> Self {
            let connectivity = Connectivity::build(
                vec!["a".into(), "b".into(), "c".into()],
                vec![vec![0.0, 0.3, 0.1], vec![0.3, 0.0, 0.2], vec![0.1, 0.2, 0.0]],
                vec![vec![0.0, 2.0, 3.0], vec![2.0, 0.0, 4.0], vec![3.0, 4.0, 0.0]],
            )
            .unwrap();
            StaticHost {
                connectivity,
                state_variables: state_variables.iter().map(|s| s.to_string()).collect(),
            }
        }
    }

    impl HostSimulator for StaticHost {
        fn state_variables(&self) -> Vec<String> {
            self.state_variables.clone()
        }

        fn connectivity(&self) -> &Connectivity {
            &self.connectivity
        }

        fn dt(&self) -> f64 {
            0.1
        }

        fn coupling_strength(&self) -> Vec<f64> {
            vec![2.0]
        }

        fn current_sample(&self) -> HostSample {
            HostSample {
                time: 0.0,
                state: vec![vec![0.0; 3]; self.state_variables.len()],
                coupling: vec![vec![0.0; 3]; self.state_variables.len()],
            }
        }

        fn run(
            &mut self,
            _duration: f64,
            _updates: &CosimUpdates,
        ) -> impl Iterator<Item = Result<HostSample, CosimError>> {
            vec![Ok(self.current_sample())].into_iter()
        }
    }

    /// Models nodes "b" and "c" with a population "E" of 4 neurons each.
    #[derive(Default)]
    struct RecordingPeer {
        built: Vec<ProxyDeviceSpec>,
        fail: bool,
    }

    impl PeerSimulator for RecordingPeer {
        fn region_nodes(&self) -> Vec<usize> {
            vec![2, 1]
        }

        fn population_neurons(&self, node: usize, population: &str) -> Option<Vec<usize>> {
            (population == "E").then(|| (node * 4..node * 4 + 4).collect())
        }

        fn min_delay(&self) -> f64 {
            0.1
        }

        fn build_device(&mut self, spec: &ProxyDeviceSpec) -> Result<DeviceId, CosimError> {
            if self.fail {
                return Err(CosimError::DeviceBuild(format!("unknown model {}", spec.proxy_model)));
            }
            self.built.push(spec.clone());
            Ok(self.built.len() - 1)
        }

        fn deliver(&mut self, _device: DeviceId, _payload: &Payload) -> Result<(), CosimError> {
            Ok(())
        }

        fn collect(&mut self, _device: DeviceId, _start: f64, end: f64) -> Result<Payload, CosimError> {
            Ok(Payload::Values {
                times: vec![end],
                values: vec![vec![0.0]],
            })
        }

        fn advance(&mut self, _duration: f64) -> Result<(), CosimError> {
            Ok(())
        }
    }

    fn config() -> CosimConfig {
        CosimConfig::build(10.0, 1.0).unwrap()
    }

    fn output() -> InterfaceSpec {
        InterfaceSpec::output(vec!["R".into()], vec!["E".into()])
    }

    fn input() -> InterfaceSpec {
        InterfaceSpec::input(vec!["R".into()], vec!["E".into()])
    }

    #[test]
    fn test_configure_defaults() {
        let host = StaticHost::new(&["R", "V"]);
        let peer = RecordingPeer::default();
        let mut builder = InterfaceBuilder::new(&config())
            .with_interface(output())
            .with_interface(input().with_proxy_inds(vec!["c"].as_slice().into()));
        let configured = builder.configure(&host, &peer).unwrap();

        // Output: every region but the input proxy nodes, towards every Peer node
        assert_eq!(configured[0].host_nodes, vec![0, 1]);
        assert_eq!(configured[0].peer_nodes, vec![1, 2]);
        assert_eq!(configured[1].host_nodes, vec![2]);
        assert_eq!(configured[1].voi, vec![0]);
    }

    #[test]
    fn test_configure_idempotent() {
        let host = StaticHost::new(&["R"]);
        let peer = RecordingPeer::default();
        let mut builder = InterfaceBuilder::new(&config())
            .with_interface(output().with_proxy_inds(vec![0].into()))
            .with_interface(input());
        let first: Vec<(Vec<usize>, Vec<usize>, Vec<usize>)> = builder
            .configure(&host, &peer)
            .unwrap()
            .iter()
            .map(|c| (c.voi.clone(), c.host_nodes.clone(), c.peer_nodes.clone()))
            .collect();
        let second: Vec<(Vec<usize>, Vec<usize>, Vec<usize>)> = builder
            .configure(&host, &peer)
            .unwrap()
            .iter()
            .map(|c| (c.voi.clone(), c.host_nodes.clone(), c.peer_nodes.clone()))
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_exclusive_overlap() {
        let host = StaticHost::new(&["R"]);
        let peer = RecordingPeer::default();
        let mut builder = InterfaceBuilder::new(&config())
            .with_interface(output().with_proxy_inds(vec![2].into()))
            .with_interface(input().with_proxy_inds(vec![2].into()));
        assert!(matches!(builder.configure(&host, &peer), Err(CosimError::Topology(_))));

        let mut builder = InterfaceBuilder::new(&config().with_exclusive_nodes(false))
            .with_interface(output().with_proxy_inds(vec![2].into()))
            .with_interface(input().with_proxy_inds(vec![2].into()));
        assert!(builder.configure(&host, &peer).is_ok());
    }

    #[test]
    fn test_configuration_errors() {
        let peer = RecordingPeer::default();

        let host = StaticHost::new(&["R", "R"]);
        let mut builder = InterfaceBuilder::new(&config()).with_interface(output());
        assert!(matches!(builder.configure(&host, &peer), Err(CosimError::Configuration(_))));

        let host = StaticHost::new(&["R"]);
        let cases = vec![
            InterfaceSpec::output(vec!["X".into()], vec!["E".into()]),
            InterfaceSpec::output(vec!["R".into()], vec!["I".into()]),
            InterfaceSpec::input(vec!["R".into()], vec!["E".into(), "E".into()]),
            output().with_transformer(TransformerModel::InverseSigmoid),
            output().with_transformer(TransformerModel::SpikesToRate),
            input().with_model(ProxyModel::Spikes).with_transformer(TransformerModel::Linear),
        ];
        for spec in cases {
            let label = spec.label();
            let mut builder = InterfaceBuilder::new(&config()).with_interface(spec);
            assert!(
                matches!(builder.configure(&host, &peer), Err(CosimError::Configuration(_))),
                "{}",
                label
            );
        }

        // Node "a" is not modeled by the Peer
        let mut builder = InterfaceBuilder::new(&config()).with_interface(input().with_proxy_inds(vec![0].into()));
        assert!(matches!(builder.configure(&host, &peer), Err(CosimError::Topology(_))));
    }

    #[test]
    fn test_build_peer_coupling() {
        let host = StaticHost::new(&["R"]);
        let mut peer = RecordingPeer::default();
        let mut builder = InterfaceBuilder::new(&config())
            .with_interface(output().with_proxy_inds(vec![0].into()).with_neurons_inds(Property::constant(every_nth(0, 2))))
            .with_interface(input().with_proxy_inds(vec![1].into()));
        let built = builder.build(&host, &mut peer).unwrap();

        assert_eq!(built.outputs.labels(), vec!["R -> E"]);
        assert_eq!(built.inputs.labels(), vec!["R <- E"]);
        assert_eq!(built.ports.len(), 2);

        // a -> b and a -> c, scaled by the Host coupling strength
        let (_, ab) = &built.devices[0];
        assert_eq!((ab.source_node(), ab.target_node()), (Some(0), 1));
        assert!((ab.weight.unwrap() - 2.0 * 0.3).abs() < 1e-12);
        assert_eq!(ab.delay, 2.0);
        assert_eq!(ab.receptor, Some(Receptor::Type(0)));
        assert_eq!(ab.select_neurons(&peer.population_neurons(1, "E").unwrap()), vec![4, 6]);
        let (_, ac) = &built.devices[1];
        assert!((ac.weight.unwrap() - 2.0 * 0.1).abs() < 1e-12);

        // Input devices default to the Peer minimum delay
        let (_, b) = &built.devices[2];
        assert_eq!((b.source, b.target, b.delay), (None, (1, 0), 0.1));

        assert!(matches!(builder.build(&host, &mut peer), Err(CosimError::InvalidOperation(_))));
    }

    #[test]
    fn test_build_host_coupling() {
        let host = StaticHost::new(&["R"]);
        let mut peer = RecordingPeer::default();
        let config = config()
            .with_coupling_mode(CouplingMode::Host)
            .with_global_coupling_scaling(vec![1.0, 2.0, 3.0]);
        let mut builder = InterfaceBuilder::new(&config).with_interface(output());
        let built = builder.build(&host, &mut peer).unwrap();

        let pairs: Vec<(Option<usize>, usize, Option<f64>, f64)> = built
            .devices
            .iter()
            .map(|(_, spec)| (spec.source_node(), spec.target_node(), spec.weight, spec.delay))
            .collect();
        assert_eq!(pairs, vec![(Some(1), 1, Some(2.0), 0.1), (Some(2), 2, Some(3.0), 0.1)]);
    }

    #[test]
    fn test_build_errors() {
        let host = StaticHost::new(&["R"]);

        let mut peer = RecordingPeer { fail: true, ..Default::default() };
        let mut builder = InterfaceBuilder::new(&config()).with_interface(output());
        assert!(matches!(builder.build(&host, &mut peer), Err(CosimError::DeviceBuild(_))));

        let mut peer = RecordingPeer::default();
        let mut builder = InterfaceBuilder::new(&config()).with_interface(output().with_delays(Property::constant(-1.0)));
        assert!(matches!(builder.build(&host, &mut peer), Err(CosimError::InvalidParameter(_))));

        let mut builder =
            InterfaceBuilder::new(&config().with_default_receptor(None)).with_interface(output());
        assert!(matches!(builder.build(&host, &mut peer), Err(CosimError::Configuration(_))));

        let mut builder = InterfaceBuilder::new(&config().with_global_coupling_scaling(vec![1.0, 2.0]))
            .with_interface(output());
        assert!(matches!(builder.build(&host, &mut peer), Err(CosimError::Configuration(_))));
    }
}
