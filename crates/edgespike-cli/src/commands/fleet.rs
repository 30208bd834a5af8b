//! Fleet supervisor: spawns one `edgespike node` process per sensor.

use std::process::{Child, Command};
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use super::{LifArgs, PaceArgs};

pub struct FleetOptions {
    pub nodes: u32,
    pub first_id: u32,
    pub host: String,
    pub port: u16,
    pub wait_s: f64,
    pub stagger_s: f64,
    pub pace: PaceArgs,
    pub lif: LifArgs,
}

pub fn run(opts: FleetOptions) {
    if !super::wait_for_port(&opts.host, opts.port, Duration::from_secs_f64(opts.wait_s)) {
        eprintln!("gateway {}:{} not reachable", opts.host, opts.port);
        std::process::exit(1);
    }

    let exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(e) => {
            eprintln!("cannot locate own executable: {e}");
            std::process::exit(1);
        }
    };

    let stagger = Duration::from_secs_f64(opts.stagger_s.max(0.0));
    let mut children: Vec<Child> = Vec::new();
    for offset in 0..opts.nodes {
        let id = opts.first_id + offset;
        let spawned = Command::new(&exe)
            .arg("node")
            .args(["--id", &id.to_string()])
            .args(["--name", &format!("node-{id}")])
            .args(["--host", &opts.host])
            .args(["--port", &opts.port.to_string()])
            .args(["--step-s", &opts.pace.step_s.to_string()])
            .args(["--accelerate", &opts.pace.accelerate.to_string()])
            .args(["--lif-leak", &opts.lif.lif_leak.to_string()])
            .args(["--lif-theta", &opts.lif.lif_theta.to_string()])
            .args(["--lif-refractory", &opts.lif.lif_refractory.to_string()])
            .args(["--lif-scale", &opts.lif.lif_scale.to_string()])
            .spawn();
        match spawned {
            Ok(child) => {
                println!("started node {id} (pid {})", child.id());
                children.push(child);
            }
            Err(e) => eprintln!("failed to start node {id}: {e}"),
        }
        thread::sleep(stagger);
    }

    if children.is_empty() {
        eprintln!("no node processes started");
        std::process::exit(1);
    }
    println!(
        "{} nodes running against {}:{}; Ctrl-C stops the fleet",
        children.len(),
        opts.host,
        opts.port
    );

    let stop = super::install_stop_flag();
    while !stop.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(500));
    }

    // Tear down in reverse start order, then reap.
    for child in children.iter_mut().rev() {
        let _ = child.kill();
    }
    for child in children.iter_mut() {
        let _ = child.wait();
    }
}
