mod common;

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;

use common::{init_logger, MockHost, MockPeer};
use rusty_cosim::communicators::remote::remote_channel;
use rusty_cosim::communicators::Communicator;
use rusty_cosim::config::{CosimConfig, CouplingMode, Transport};
use rusty_cosim::core::buffer::{Buffer, Payload};
use rusty_cosim::core::property::Property;
use rusty_cosim::cosimulator::{CancelToken, CoSimulator, EngineState};
use rusty_cosim::error::CosimError;
use rusty_cosim::interfaces::builder::InterfaceBuilder;
use rusty_cosim::interfaces::interface::{Interface, Role};
use rusty_cosim::interfaces::set::{CosimUpdates, InterfaceSet};
use rusty_cosim::interfaces::spec::{Direction, InterfaceSpec, ProxyModel};
use rusty_cosim::transformers::{Transformer, TransformerModel};

/// Rate of node "a" drives population "E" of node "b".
fn output() -> InterfaceSpec {
    InterfaceSpec::output(vec!["R".into()], vec!["E".into()])
        .with_proxy_inds(vec![0].into())
        .with_spiking_proxy_inds(vec![1].into())
}

/// Activity of population "E" of node "c" updates the rate of node "c".
fn input() -> InterfaceSpec {
    InterfaceSpec::input(vec!["R".into()], vec!["E".into()]).with_proxy_inds(vec![2].into())
}

fn build(config: &CosimConfig, host: MockHost, peer: MockPeer) -> CoSimulator<MockHost, MockPeer> {
    let builder = InterfaceBuilder::new(config)
        .with_interface(output())
        .with_interface(input());
    CoSimulator::build(host, peer, builder).unwrap()
}

/// Returns the values received by the Host through the input interface, window by window.
fn received_values(host: &MockHost) -> Vec<Vec<Vec<f64>>> {
    host.received
        .iter()
        .map(|updates: &CosimUpdates| {
            let update = updates.get("R <- E").unwrap();
            update.buffer.as_values().unwrap().1.to_vec()
        })
        .collect()
}

fn delivered_values(peer: &MockPeer) -> Vec<Vec<Vec<f64>>> {
    peer.deliveries
        .iter()
        .map(|(_, payload)| match payload {
            Payload::Values { values, .. } => values.clone(),
            Payload::Spikes(_) => panic!("expected values"),
        })
        .collect()
}

fn assert_causal_lag(transport: Transport) {
    let config = CosimConfig::build(10.0, 1.0).unwrap().with_transport(transport);
    let mut cosim = build(&config, MockHost::new(), MockPeer::new());
    let results = cosim.run().unwrap();
    assert_eq!(results.num_windows(), 10);
    assert_eq!(cosim.state(), EngineState::Stopped);

    let (host, peer) = cosim.into_parts().unwrap();
    let received = received_values(&host);
    assert_eq!(received.len(), 10);

    // Zeros before any Peer output, then the output of the previous window
    assert_eq!(received[0].len(), 10);
    assert!(received[0].iter().flatten().all(|&x| x == 0.0));
    for (n, values) in received.iter().enumerate().skip(1) {
        assert_eq!(values, &vec![vec![n as f64]], "window {}", n);
    }

    // The Peer receives the Host data of the previous window
    let delivered = delivered_values(&peer);
    assert_eq!(delivered.len(), 10);
    assert_eq!(delivered[0], vec![vec![0.0]]);
    assert_eq!(delivered[1].len(), 10);
    assert!((delivered[1][9][0] - 1.0).abs() < 1e-9);
    assert!((delivered[9][9][0] - 9.0).abs() < 1e-9);
}

#[test]
fn test_causal_lag_serial() {
    init_logger();
    assert_causal_lag(Transport::Direct);
}

#[test]
fn test_causal_lag_remote() {
    init_logger();
    assert_causal_lag(Transport::Remote);
}

fn assert_lag_with_nan_output(transport: Transport) {
    let config = CosimConfig::build(6.0, 1.0).unwrap().with_transport(transport);
    let mut peer = MockPeer::new();
    peer.nan_at = Some(2);
    let mut cosim = build(&config, MockHost::new(), peer);
    cosim.run().unwrap();
    let (host, _) = cosim.into_parts().unwrap();

    // The NaN output of the second advance is data, consumed one window later like any other
    let received = received_values(&host);
    assert_eq!(received.len(), 6);
    assert!(received[2][0][0].is_nan());
    for n in [1, 3, 4, 5] {
        assert_eq!(received[n], vec![vec![n as f64]], "window {}", n);
    }
    assert!(host.received[2].is_ready());
}

#[test]
fn test_nan_output_keeps_lag_serial() {
    init_logger();
    assert_lag_with_nan_output(Transport::Direct);
}

#[test]
fn test_nan_output_keeps_lag_remote() {
    init_logger();
    assert_lag_with_nan_output(Transport::Remote);
}

#[test]
fn test_retry_after_timeout() {
    init_logger();
    let config = CosimConfig::build(6.0, 1.0)
        .unwrap()
        .with_transport(Transport::Remote)
        .with_peer_timeout(Some(Duration::from_millis(50)));
    let mut peer = MockPeer::new();
    peer.slow_advance = Some((2, Duration::from_millis(300)));
    let mut cosim = build(&config, MockHost::new(), peer);

    // Window 3 waits for the advance of window 2
    let error = cosim.run().unwrap_err();
    assert!(matches!(error, CosimError::SynchronizationTimeout { .. }));
    assert!(error.is_recoverable());
    assert_eq!(cosim.state(), EngineState::Interrupted);
    assert_eq!(cosim.host().received.len(), 3);

    thread::sleep(Duration::from_millis(400));
    let results = cosim.run().unwrap();
    assert_eq!(cosim.state(), EngineState::Stopped);
    assert_eq!(results.num_windows(), 6);
    assert_eq!(results.peer_advances, 6);
    assert_eq!(results.flush_advances, 1);
    assert!((results.simulated_time - 6.0).abs() < 1e-9);

    let (host, peer) = cosim.into_parts().unwrap();
    let received = received_values(&host);
    for (n, values) in received.iter().enumerate().skip(1) {
        assert_eq!(values, &vec![vec![n as f64]], "window {}", n);
    }
    assert_eq!(peer.advances.len(), 7);
    assert_eq!(delivered_values(&peer).len(), 6);
}

#[test]
fn test_second_timeout_stops() {
    init_logger();
    let config = CosimConfig::build(6.0, 1.0)
        .unwrap()
        .with_transport(Transport::Remote)
        .with_peer_timeout(Some(Duration::from_millis(50)));
    let mut peer = MockPeer::new();
    peer.slow_advance = Some((2, Duration::from_millis(600)));
    let mut cosim = build(&config, MockHost::new(), peer);

    assert!(matches!(cosim.run(), Err(CosimError::SynchronizationTimeout { .. })));
    assert!(matches!(cosim.run(), Err(CosimError::SynchronizationTimeout { .. })));
    assert_eq!(cosim.state(), EngineState::Stopped);
    assert!(matches!(cosim.run(), Err(CosimError::InvalidOperation(_))));

    // The slow advance completes before the Peer is released, no further advance was issued
    let (host, peer) = cosim.into_parts().unwrap();
    assert_eq!(host.received.len(), 3);
    assert_eq!(peer.advances.len(), 3);
}

#[test]
fn test_peer_error_stops() {
    init_logger();
    let config = CosimConfig::build(6.0, 1.0).unwrap();
    let mut peer = MockPeer::new();
    peer.failing_advance = Some(1);
    let mut cosim = build(&config, MockHost::new(), peer);

    let error = cosim.run().unwrap_err();
    assert_eq!(error, CosimError::IOError("advance 1 crashed".to_string()));
    assert!(!error.is_recoverable());
    assert_eq!(cosim.state(), EngineState::Stopped);
    assert!(matches!(cosim.run(), Err(CosimError::InvalidOperation(_))));

    let (host, peer) = cosim.into_parts().unwrap();
    assert_eq!(host.received.len(), 2);
    assert_eq!(peer.advances.len(), 1);
}

#[test]
fn test_scenario_weight_from_connectome() {
    let config = CosimConfig::build(10.0, 1.0).unwrap();
    let mut host = MockHost::new();
    host.coupling_strength = vec![3.0];
    let cosim = build(&config, host, MockPeer::new());

    let (_, device) = &cosim.devices()[0];
    assert_eq!((device.source_node(), device.target_node()), (Some(0), 1));
    assert!((device.weight.unwrap() - 3.0 * 0.5).abs() < 1e-12);
    assert_eq!(device.delay, 1.5);
}

#[test]
fn test_scenario_rounded_length() {
    init_logger();
    let config = CosimConfig::build(100.0, 7.0).unwrap();
    let mut cosim = build(&config, MockHost::new(), MockPeer::new());
    let results = cosim.run().unwrap();

    assert_eq!(results.num_windows(), 15);
    assert_eq!(results.peer_advances, 15);
    assert_eq!(results.flush_advances, 1);
    assert!((results.simulated_time - 105.0).abs() < 1e-9);
    assert!(!results.cancelled);

    let (host, peer) = cosim.into_parts().unwrap();
    assert_eq!(host.received.len(), 15);
    assert!(results.windows.iter().all(|w| w.host_steps == 70));
    assert_eq!(peer.advances.len(), 16);
    assert!(peer.advances[..15].iter().all(|&d| d == 7.0));
    assert_eq!(peer.advances[15], 0.1);
}

#[test]
fn test_scenario_overlapping_nodes() {
    let config = CosimConfig::build(10.0, 1.0).unwrap();
    let builder = InterfaceBuilder::new(&config)
        .with_interface(
            InterfaceSpec::output(vec!["R".into()], vec!["E".into()]).with_proxy_inds(vec![2].into()),
        )
        .with_interface(input());
    let result = CoSimulator::build(MockHost::new(), MockPeer::new(), builder);
    assert!(matches!(result, Err(CosimError::Topology(_))));
}

#[test]
fn test_host_coupling_mode() {
    let config = CosimConfig::build(5.0, 1.0)
        .unwrap()
        .with_coupling_mode(CouplingMode::Host);
    let builder = InterfaceBuilder::new(&config).with_interface(
        InterfaceSpec::output(vec!["R".into()], vec!["E".into()]).with_spiking_proxy_inds(vec![1].into()),
    );
    let mut cosim = CoSimulator::build(MockHost::new(), MockPeer::new(), builder).unwrap();

    let (_, device) = &cosim.devices()[0];
    assert_eq!((device.source_node(), device.target_node()), (Some(1), 1));
    assert_eq!((device.weight, device.delay), (Some(2.0), 0.1));

    cosim.run().unwrap();
    let (_, peer) = cosim.into_parts().unwrap();

    // The coupling term is sent instead of the state
    let delivered = delivered_values(&peer);
    assert!((delivered[1][9][0] - 10.0).abs() < 1e-9);
}

#[test]
fn test_configure_idempotent() {
    let config = CosimConfig::build(10.0, 1.0).unwrap();
    let host = MockHost::new();
    let peer = MockPeer::new();
    let mut builder = InterfaceBuilder::new(&config)
        .with_interface(output().with_weights(Property::per_pair(|src, trg| (src + trg) as f64)))
        .with_interface(input());

    let snapshot = |builder: &mut InterfaceBuilder| {
        builder
            .configure(&host, &peer)
            .unwrap()
            .iter()
            .map(|c| {
                let weight = c.weights.as_ref().map(|f| f(0, 1));
                (c.label.clone(), c.voi.clone(), c.host_nodes.clone(), c.peer_nodes.clone(), weight)
            })
            .collect::<Vec<_>>()
    };
    let first = snapshot(&mut builder);
    let second = snapshot(&mut builder);
    assert_eq!(first, second);
    assert_eq!(first[0].4, Some(1.0));
}

#[test]
fn test_device_build_error() {
    let config = CosimConfig::build(10.0, 1.0).unwrap();
    let mut peer = MockPeer::new();
    peer.fail_build = true;
    let builder = InterfaceBuilder::new(&config).with_interface(output());
    let result = CoSimulator::build(MockHost::new(), peer, builder);
    assert!(matches!(result, Err(CosimError::DeviceBuild(_))));
}

#[test]
fn test_run_once() {
    let config = CosimConfig::build(2.0, 1.0).unwrap();
    let mut cosim = build(&config, MockHost::new(), MockPeer::new());
    assert_eq!(cosim.state(), EngineState::Idle);
    cosim.run().unwrap();
    assert!(matches!(cosim.run(), Err(CosimError::InvalidOperation(_))));
}

#[test]
fn test_cancellation() {
    init_logger();
    let config = CosimConfig::build(20.0, 1.0).unwrap().with_transport(Transport::Remote);
    let token = CancelToken::new();
    let mut host = MockHost::new();
    host.cancel_after = Some((3, token.clone()));
    let mut cosim = build(&config, host, MockPeer::new()).with_cancel_token(token);

    let results = cosim.run().unwrap();
    assert!(results.cancelled);
    assert_eq!(results.num_windows(), 3);
    assert_eq!(results.flush_advances, 1);

    // Pending advances are joined: every issued advance has run
    let (_, peer) = cosim.into_parts().unwrap();
    assert_eq!(peer.advances.len(), 4);
}

#[test]
fn test_remote_transformers() {
    init_logger();
    let config = CosimConfig::build(5.0, 1.0)
        .unwrap()
        .with_transport(Transport::Remote)
        .with_remote_transformers(true);
    let builder = InterfaceBuilder::new(&config)
        .with_interface(
            output()
                .with_transformer(TransformerModel::Linear)
                .with_param("scale_factor", 2.0),
        )
        .with_interface(
            input()
                .with_transformer(TransformerModel::Linear)
                .with_param("scale_factor", 0.5),
        );
    let mut cosim = CoSimulator::build(MockHost::new(), MockPeer::new(), builder).unwrap();
    cosim.run().unwrap();
    let (host, peer) = cosim.into_parts().unwrap();

    let delivered = delivered_values(&peer);
    assert!((delivered[2][9][0] - 4.0).abs() < 1e-9);
    let received = received_values(&host);
    for (n, values) in received.iter().enumerate().skip(1) {
        assert_eq!(values, &vec![vec![0.5 * n as f64]]);
    }
}

#[test]
fn test_spiking_interfaces() {
    let config = CosimConfig::build(3.0, 1.0).unwrap();
    let builder = InterfaceBuilder::new(&config)
        .with_interface(
            output()
                .with_model(ProxyModel::Spikes)
                .with_transformer(TransformerModel::RateToSpikes)
                .with_param("number_of_neurons", 10.0),
        )
        .with_interface(
            input()
                .with_model(ProxyModel::Spikes)
                .with_transformer(TransformerModel::SpikesToRate)
                .with_param("number_of_neurons", 10.0)
                .with_param("bin_width", 1.0),
        );
    let mut cosim = CoSimulator::build(MockHost::new(), MockPeer::new(), builder).unwrap();
    cosim.run().unwrap();
    let (host, peer) = cosim.into_parts().unwrap();

    assert!(peer
        .deliveries
        .iter()
        .all(|(_, payload)| matches!(payload, Payload::Spikes(_))));
    // One spike over a window of 1 ms among 10 neurons
    let received = received_values(&host);
    assert_eq!(received[1], vec![vec![0.1]]);
}

#[test]
fn test_not_ready_convention() {
    let timeout = Some(Duration::from_millis(10));
    let (mut tx_a, rx_a) = remote_channel("a", timeout);
    let (mut tx_b, rx_b) = remote_channel("b", timeout);
    tx_a.configure().unwrap();
    tx_b.configure().unwrap();

    let mut inputs = InterfaceSet::new(Direction::Input);
    for (label, rx) in [("a", rx_a), ("b", rx_b)] {
        let interface = Interface::new(label, Direction::Input, Role::Receiver(Box::new(rx)))
            .with_voi(vec![0], vec!["R".into()])
            .with_nodes(vec![1, 2]);
        inputs.push(interface).unwrap();
    }
    inputs.configure().unwrap();

    let updates = inputs.receive_all(None, false, 0.0, 1.0, 4).unwrap();
    assert!(!updates.is_ready());
    for update in updates.iter() {
        assert!(update.buffer.is_all_nan());
        assert_eq!((update.buffer.num_rows(), update.buffer.num_columns()), (4, 2));
    }

    let data = |x: f64| Buffer::values(0.0, 1.0, vec![1.0], vec![vec![x, x]]).unwrap();
    tx_a.send(data(1.0)).unwrap();
    let updates = inputs.receive_all(Some(updates), false, 0.0, 1.0, 4).unwrap();
    assert!(!updates.is_ready());
    assert!(updates.get("a").unwrap().is_ready());

    // Ready members are kept, not polled again
    tx_b.send(data(2.0)).unwrap();
    let updates = inputs.receive_all(Some(updates), false, 0.0, 1.0, 4).unwrap();
    assert!(updates.is_ready());
    assert!(updates.iter().all(|update| !update.buffer.has_nan()));
    assert_eq!(updates.get("a").unwrap().buffer, data(1.0));
    assert_eq!(updates.get("b").unwrap().buffer, data(2.0));
}

#[test]
fn test_inverse_sigmoid_is_finite() {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    for _ in 0..20 {
        let mut params = BTreeMap::new();
        params.insert("w".to_string(), Property::constant(rng.gen_range(0.01..10.0)));
        params.insert("Rmin".to_string(), Property::constant(rng.gen_range(0.001..0.999)));
        params.insert("beta".to_string(), Property::constant(rng.gen_range(0.01..10.0)));
        params.insert("sigma".to_string(), Property::constant(rng.gen_range(-5.0..5.0)));
        let transformer = Transformer::build(TransformerModel::InverseSigmoid, &params, vec![0, 1], 0.1).unwrap();

        let mut rows: Vec<Vec<f64>> = vec![
            vec![f64::MAX, f64::MIN],
            vec![0.0, 1.0],
            vec![-1e300, 1e300],
        ];
        rows.extend((0..50).map(|_| vec![rng.gen_range(-1e6..1e6), rng.gen_range(-1.0..2.0)]));
        let times = (0..rows.len()).map(|k| k as f64).collect();
        let buffer = Buffer::values(0.0, rows.len() as f64, times, rows).unwrap();

        let out = transformer.transform(&buffer).unwrap();
        let (_, values) = out.as_values().unwrap();
        assert!(values.iter().flatten().all(|x| x.is_finite()));
    }
}
