//! Standalone sensor node speaking TCP to a remote gateway.

use std::sync::Arc;
use std::time::Duration;

use edgespike_core::transport::{LineSink, connect_gateway, spawn_inhibit_reader};
use edgespike_core::{InhibitionState, Node, SyntheticSignal};

use super::{LifArgs, PaceArgs};

pub struct NodeOptions {
    pub id: u32,
    pub name: Option<String>,
    pub host: String,
    pub port: u16,
    pub connect_timeout_s: f64,
    pub baseline_interval: u64,
    pub pace: PaceArgs,
    pub lif: LifArgs,
}

pub fn run(opts: NodeOptions) {
    // This process owns a private inhibition state; broadcast inhibit
    // commands on the return channel feed it.
    let inhibition = Arc::new(InhibitionState::new(opts.pace.effective_step_s()));

    let timeout = Duration::from_secs_f64(opts.connect_timeout_s.max(0.0));
    let socket = match connect_gateway(&opts.host, opts.port, timeout) {
        Ok(socket) => socket,
        Err(e) => {
            eprintln!("gateway {}:{} not reachable: {e}", opts.host, opts.port);
            std::process::exit(1);
        }
    };
    let reader_socket = match socket.try_clone() {
        Ok(clone) => clone,
        Err(e) => {
            eprintln!("cannot clone gateway socket: {e}");
            std::process::exit(1);
        }
    };

    let stop = super::install_stop_flag();
    let _reader = spawn_inhibit_reader(reader_socket, Arc::clone(&inhibition), Arc::clone(&stop));

    let cfg = super::node_config(
        opts.id,
        opts.name,
        &opts.pace,
        &opts.lif,
        opts.baseline_interval,
    );
    let mut node = Node::new(
        cfg,
        inhibition,
        Box::new(SyntheticSignal::new(opts.pace.step_s)),
    );
    let mut sink = LineSink::new(socket);

    println!(
        "node {} streaming to {}:{} (step {}s, x{})",
        opts.id, opts.host, opts.port, opts.pace.step_s, opts.pace.accelerate
    );
    node.run(&mut sink, &stop);
}
