//! Integration tests for edgespike-core.
//!
//! These exercise the full control loop both ways the fleet can be wired:
//! in-process (shared inhibition object, mpsc transport) and over TCP
//! (line-delimited JSON, broadcast inhibit commands).

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use edgespike_core::node::ChannelSink;
use edgespike_core::transport::{LineSink, NodeListener, connect_gateway, spawn_inhibit_reader};
use edgespike_core::{
    Gateway, GatewayConfig, InhibitionState, Node, NodeConfig, UpstreamMessage, ValueSource,
    message,
};

struct ConstSignal(f64);

impl ValueSource for ConstSignal {
    fn sample(&mut self, _step: u64) -> f64 {
        self.0
    }
}

fn eager_node_config(node_id: u32) -> NodeConfig {
    // Fires every uninhibited step: leak 0, theta 0.8, constant value 1.
    let mut cfg = NodeConfig::new(node_id);
    cfg.step_s = 0.05;
    cfg.accelerate = 25.0; // 2 ms of wall clock per step
    cfg.lif_leak = 0.0;
    cfg.lif_theta = 0.8;
    cfg.lif_scale = 1.0;
    cfg.baseline_interval = 5;
    cfg
}

fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(25));
    }
    false
}

#[test]
fn in_process_pipeline_counts_fires_and_suppressions() {
    let inhibition = Arc::new(InhibitionState::new(0.002));
    let cfg = GatewayConfig {
        agg_leak: 1.0,
        agg_theta: 5.0,
        beta: 2.0,
        t_inh_steps: 25, // 50 ms of inhibition per fire
        ..GatewayConfig::default()
    };
    let gateway = Arc::new(Gateway::new(cfg, Arc::clone(&inhibition)));
    let (tx, rx) = mpsc::sync_channel(1024);

    let gw = Arc::clone(&gateway);
    let gw_handle = thread::spawn(move || gw.run(rx));

    let stop = Arc::new(AtomicBool::new(false));
    let mut node_handles = Vec::new();
    for id in 0..2 {
        let mut node = Node::new(
            eager_node_config(id),
            Arc::clone(&inhibition),
            Box::new(ConstSignal(1.0)),
        );
        let mut sink = ChannelSink::new(tx.clone());
        let stop = Arc::clone(&stop);
        node_handles.push(thread::spawn(move || {
            node.run(&mut sink, &stop);
            node
        }));
    }
    drop(tx);

    // Two nodes spiking every ~2 ms push the aggregator over theta=5
    // within a few dozen messages; inhibition then suppresses them.
    let ok = wait_until(Duration::from_secs(5), || {
        let snap = gateway.snapshot_metrics();
        snap.aggregator.fires >= 1 && snap.aggregator.suppressed_total >= 1
    });

    stop.store(true, Ordering::Relaxed);
    let nodes: Vec<Node> = node_handles.into_iter().map(|h| h.join().unwrap()).collect();
    gateway.stop();
    gw_handle.join().unwrap();

    assert!(ok, "aggregator never fired or nothing was suppressed");
    let snap = gateway.snapshot_metrics();
    assert!(snap.total_messages > 0);
    assert_eq!(snap.collision_mode, "spikes");
    assert!(snap.msgs_per_sec > 0.0);
    assert!(snap.last_updated_iso.is_some());
    // Per-node summaries exist for both nodes and carry energy.
    for id in ["0", "1"] {
        let summary = &snap.summary[id];
        assert!(summary.count > 0, "node {id} missing from feed");
        assert!(summary.energy_total > 0.0);
    }
    // The gateway's view of suppression matches what the nodes counted.
    let node_suppressed: u64 = nodes.iter().map(|n| n.suppressed_total()).sum();
    assert!(node_suppressed >= snap.aggregator.suppressed_total);
}

#[test]
fn tcp_pipeline_broadcasts_one_inhibit_per_node() {
    let inhibition = Arc::new(InhibitionState::new(0.01));
    let cfg = GatewayConfig {
        agg_leak: 1.0,
        agg_theta: 3.0,
        beta: 2.0,
        t_inh_steps: 5,
        ..GatewayConfig::default()
    };
    let gateway = Arc::new(Gateway::new(cfg, inhibition));

    let listener = NodeListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let registry = listener.registry();
    gateway.set_inhibit_hook(Box::new(move |cmd| registry.broadcast(cmd)));

    let (tx, rx) = mpsc::sync_channel(1024);
    let stop = Arc::new(AtomicBool::new(false));
    let accept_stop = Arc::clone(&stop);
    let accept_handle = thread::spawn(move || listener.serve(tx, accept_stop));
    let gw = Arc::clone(&gateway);
    let gw_handle = thread::spawn(move || gw.run(rx));

    let mut quiet = TcpStream::connect(addr).unwrap();
    let mut chatty = TcpStream::connect(addr).unwrap();

    let report = |node: u32, spike: u8| UpstreamMessage {
        ts: message::now_iso(),
        node: Some(node),
        value: 50.0,
        spike,
        suppressed_total: Some(0),
        name: None,
        ip: None,
        baseline: if spike == 0 { Some(1) } else { None },
    };

    // The quiet node registers itself with one baseline report.
    let line = message::encode_line(&report(8, 0)).unwrap();
    quiet.write_all(line.as_bytes()).unwrap();
    quiet.flush().unwrap();
    assert!(
        wait_until(Duration::from_secs(2), || {
            gateway.snapshot_metrics().total_messages >= 1
        }),
        "baseline report never arrived"
    );

    // Three spikes from the chatty node trip the aggregator.
    for _ in 0..3 {
        let line = message::encode_line(&report(7, 1)).unwrap();
        chatty.write_all(line.as_bytes()).unwrap();
    }
    chatty.flush().unwrap();

    for stream in [&quiet, &chatty] {
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
    }
    for stream in [&mut quiet, &mut chatty] {
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        let cmd: edgespike_core::InhibitCommand = message::decode_line(&line).unwrap();
        assert!(cmd.is_inhibit());
        assert_eq!(cmd.beta, 2.0);
        assert_eq!(cmd.t_inh, 5);
    }

    assert!(
        wait_until(Duration::from_secs(2), || {
            gateway.snapshot_metrics().total_messages >= 4
        }),
        "spike reports never arrived"
    );
    let snap = gateway.snapshot_metrics();
    assert_eq!(snap.aggregator.fires, 1);
    assert_eq!(snap.summary["7"].count, 3);
    assert_eq!(snap.summary["8"].count, 1);

    stop.store(true, Ordering::Relaxed);
    gateway.stop();
    drop(quiet);
    drop(chatty);
    accept_handle.join().unwrap();
    gw_handle.join().unwrap();
}

#[test]
fn tcp_node_applies_broadcast_inhibition_locally() {
    let listener = NodeListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let port = addr.port();
    let registry = listener.registry();

    let (tx, rx) = mpsc::sync_channel(64);
    let stop = Arc::new(AtomicBool::new(false));
    let accept_stop = Arc::clone(&stop);
    let accept_handle = thread::spawn(move || listener.serve(tx, accept_stop));

    // A standalone node owns a private inhibition state fed by broadcasts.
    let local_inhibition = Arc::new(InhibitionState::new(100.0));
    let socket = connect_gateway("127.0.0.1", port, Duration::from_secs(2)).unwrap();
    let stream = socket.try_clone().unwrap();
    let reader_handle = spawn_inhibit_reader(
        socket.try_clone().unwrap(),
        Arc::clone(&local_inhibition),
        Arc::clone(&stop),
    );

    let mut node = Node::new(
        eager_node_config(3),
        Arc::clone(&local_inhibition),
        Box::new(ConstSignal(1.0)),
    );
    let mut sink = LineSink::new(stream);
    // One spike registers the node with the gateway-side registry.
    node.step_once(&mut sink).unwrap();
    let msg = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(msg.node, Some(3));
    assert!(
        wait_until(Duration::from_secs(2), || !registry.is_empty()),
        "node never registered for broadcast"
    );

    registry.broadcast(&edgespike_core::InhibitCommand::new(4.0, 60));
    assert!(
        wait_until(Duration::from_secs(2), || {
            local_inhibition.current_beta() == 4.0
        }),
        "broadcast inhibition never reached the node"
    );

    // With beta 4 the next steps are suppressed, not fired.
    let before = node.total_spikes();
    node.step_once(&mut sink).unwrap();
    node.step_once(&mut sink).unwrap();
    assert_eq!(node.total_spikes(), before);
    assert!(node.suppressed_total() >= 2);

    stop.store(true, Ordering::Relaxed);
    // Shut the socket down so both reader threads see EOF and exit.
    socket.shutdown(std::net::Shutdown::Both).unwrap();
    drop(sink);
    accept_handle.join().unwrap();
    reader_handle.join().unwrap();
}
