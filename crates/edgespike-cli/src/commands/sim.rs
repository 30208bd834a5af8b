//! Monolithic run: nodes, gateway and dashboard in one process.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use edgespike_core::node::ChannelSink;
use edgespike_core::{Gateway, InhibitionState, Node, SyntheticSignal};

use super::{DashboardArgs, GatewayArgs, LifArgs, PaceArgs};

pub struct SimOptions {
    pub nodes: u32,
    pub baseline_interval: u64,
    pub duration_s: f64,
    pub pace: PaceArgs,
    pub lif: LifArgs,
    pub gateway: GatewayArgs,
    pub dashboard: DashboardArgs,
}

pub fn run(opts: SimOptions) {
    // Nodes and gateway share one inhibition object; no broadcast needed.
    let inhibition = Arc::new(InhibitionState::new(opts.pace.effective_step_s()));
    let gateway = Arc::new(Gateway::new(
        opts.gateway.to_config(),
        Arc::clone(&inhibition),
    ));

    let (tx, rx) = mpsc::sync_channel(1024);
    let gw = Arc::clone(&gateway);
    let gw_handle = thread::spawn(move || gw.run(rx));

    let _dashboard = super::spawn_dashboard(
        Arc::clone(&gateway),
        opts.dashboard.dashboard_host.clone(),
        opts.dashboard.dashboard_port,
    );

    let stop = super::install_stop_flag();
    let mut node_handles = Vec::new();
    for id in 0..opts.nodes {
        let cfg = super::node_config(id, None, &opts.pace, &opts.lif, opts.baseline_interval);
        let mut node = Node::new(
            cfg,
            Arc::clone(&inhibition),
            Box::new(SyntheticSignal::new(opts.pace.step_s)),
        );
        let mut sink = ChannelSink::new(tx.clone());
        let node_stop = Arc::clone(&stop);
        node_handles.push(thread::spawn(move || node.run(&mut sink, &node_stop)));
    }
    drop(tx);

    println!(
        "dashboard on http://{}:{}/ nodes={}",
        opts.dashboard.dashboard_host, opts.dashboard.dashboard_port, opts.nodes
    );

    let started = Instant::now();
    while !stop.load(Ordering::Relaxed) {
        if opts.duration_s > 0.0 && started.elapsed().as_secs_f64() >= opts.duration_s {
            break;
        }
        thread::sleep(Duration::from_millis(200));
    }

    stop.store(true, Ordering::Relaxed);
    gateway.stop();
    for handle in node_handles {
        let _ = handle.join();
    }
    let _ = gw_handle.join();
}
