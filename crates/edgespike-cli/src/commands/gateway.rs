//! TCP gateway: node listener, ingest loop and dashboard.

use std::sync::Arc;
use std::sync::mpsc;
use std::thread;

use edgespike_core::transport::NodeListener;
use edgespike_core::{Gateway, InhibitionState};

use super::{DashboardArgs, GatewayArgs, PaceArgs};

pub struct GatewayOptions {
    pub listen_host: String,
    pub listen_port: u16,
    pub pace: PaceArgs,
    pub gateway: GatewayArgs,
    pub dashboard: DashboardArgs,
}

pub fn run(opts: GatewayOptions) {
    let inhibition = Arc::new(InhibitionState::new(opts.pace.effective_step_s()));
    let gateway = Arc::new(Gateway::new(
        opts.gateway.to_config(),
        Arc::clone(&inhibition),
    ));

    let listen_addr = format!("{}:{}", opts.listen_host, opts.listen_port);
    let listener = match NodeListener::bind(&listen_addr) {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("cannot bind node listener on {listen_addr}: {e}");
            std::process::exit(1);
        }
    };

    // Aggregator fires push an inhibit line to every connected node.
    let registry = listener.registry();
    gateway.set_inhibit_hook(Box::new(move |cmd| registry.broadcast(cmd)));

    let (tx, rx) = mpsc::sync_channel(1024);
    let gw = Arc::clone(&gateway);
    let gw_handle = thread::spawn(move || gw.run(rx));

    let _dashboard = super::spawn_dashboard(
        Arc::clone(&gateway),
        opts.dashboard.dashboard_host.clone(),
        opts.dashboard.dashboard_port,
    );

    println!(
        "gateway listening for nodes on {listen_addr}, dashboard on http://{}:{}/",
        opts.dashboard.dashboard_host, opts.dashboard.dashboard_port
    );

    let stop = super::install_stop_flag();
    listener.serve(tx, Arc::clone(&stop));

    gateway.stop();
    let _ = gw_handle.join();
}
