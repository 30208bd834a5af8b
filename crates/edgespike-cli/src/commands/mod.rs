pub mod fleet;
pub mod gateway;
pub mod node;
pub mod sim;

use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use clap::Args;
use log::warn;

use edgespike_core::{CollisionMode, GatewayConfig, NodeConfig};

/// Sensor LIF parameters shared by every mode that runs nodes.
#[derive(Args)]
pub struct LifArgs {
    /// Membrane leak factor per step
    #[arg(long, default_value_t = 0.99)]
    pub lif_leak: f64,

    /// Baseline firing threshold
    #[arg(long, default_value_t = 50.0)]
    pub lif_theta: f64,

    /// Silent steps after a fire
    #[arg(long, default_value_t = 0)]
    pub lif_refractory: u32,

    /// Input scale applied to the physical value
    #[arg(long, default_value_t = 1.0)]
    pub lif_scale: f64,
}

/// Simulation pacing shared by every mode.
#[derive(Args)]
pub struct PaceArgs {
    /// Simulated duration of one step in seconds
    #[arg(long, default_value_t = 300.0)]
    pub step_s: f64,

    /// Wall-clock compression factor (sleep step_s/accelerate per step)
    #[arg(long, default_value_t = 60.0)]
    pub accelerate: f64,
}

impl PaceArgs {
    /// Wall-clock seconds one step actually takes.
    pub fn effective_step_s(&self) -> f64 {
        self.step_s / self.accelerate.max(1.0)
    }
}

/// Gateway tuning: aggregator, inhibition, energy model, collisions.
#[derive(Args)]
pub struct GatewayArgs {
    /// Aggregator membrane leak factor
    #[arg(long, default_value_t = 0.995)]
    pub agg_leak: f64,

    /// Aggregator firing threshold
    #[arg(long, default_value_t = 10.0)]
    pub agg_theta: f64,

    /// Threshold multiplier applied while inhibition is active
    #[arg(long, default_value_t = 2.0)]
    pub beta: f64,

    /// Inhibition duration in steps
    #[arg(long = "t-inh", default_value_t = 5)]
    pub t_inh: i64,

    /// Transmit power in watts for the energy model
    #[arg(long, default_value_t = 0.396)]
    pub tx_power_w: f64,

    /// Modelled LoRa payload size in bytes
    #[arg(long, default_value_t = 12)]
    pub payload_bytes: u32,

    /// Which messages occupy the channel for collision detection
    #[arg(long, default_value = "spikes", value_parser = ["spikes", "all"])]
    pub collision_mode: String,

    /// Transmission window retention as a multiple of airtime
    #[arg(long, default_value_t = 10.0)]
    pub retention_multiplier: f64,

    /// Lower bound on transmission window retention in seconds
    #[arg(long, default_value_t = 2.0)]
    pub min_retention_s: f64,

    /// Bound on the recent-message feed
    #[arg(long, default_value_t = 5000)]
    pub max_recent: usize,
}

impl GatewayArgs {
    pub fn to_config(&self) -> GatewayConfig {
        GatewayConfig {
            agg_leak: self.agg_leak,
            agg_theta: self.agg_theta,
            beta: self.beta,
            t_inh_steps: self.t_inh,
            tx_power_w: self.tx_power_w,
            payload_bytes: self.payload_bytes,
            collision_mode: parse_collision_mode(&self.collision_mode),
            retention_multiplier: self.retention_multiplier,
            min_retention_s: self.min_retention_s,
            max_recent: self.max_recent,
        }
    }
}

#[derive(Args)]
pub struct DashboardArgs {
    /// Dashboard bind address
    #[arg(long, default_value = "127.0.0.1")]
    pub dashboard_host: String,

    /// Dashboard port
    #[arg(long, default_value_t = 8050)]
    pub dashboard_port: u16,
}

/// Parse a collision mode string into the enum.
pub fn parse_collision_mode(s: &str) -> CollisionMode {
    match s {
        "all" => CollisionMode::All,
        "spikes" => CollisionMode::Spikes,
        _ => {
            warn!("unknown collision mode '{s}', using spikes");
            CollisionMode::Spikes
        }
    }
}

/// Assemble a node configuration from the shared flag groups.
pub fn node_config(
    node_id: u32,
    name: Option<String>,
    pace: &PaceArgs,
    lif: &LifArgs,
    baseline_interval: u64,
) -> NodeConfig {
    let mut cfg = NodeConfig::new(node_id);
    cfg.name = name;
    cfg.step_s = pace.step_s;
    cfg.accelerate = pace.accelerate;
    cfg.lif_leak = lif.lif_leak;
    cfg.lif_theta = lif.lif_theta;
    cfg.lif_refractory = lif.lif_refractory;
    cfg.lif_scale = lif.lif_scale;
    cfg.baseline_interval = baseline_interval;
    cfg
}

/// Ctrl-C flips the returned flag; every long-running loop watches it.
pub fn install_stop_flag() -> Arc<AtomicBool> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed)) {
        warn!("could not install Ctrl-C handler: {e}");
    }
    stop
}

/// Spawn the dashboard server on its own thread with a dedicated runtime.
/// A bind failure is fatal for the whole process.
pub fn spawn_dashboard(
    gateway: Arc<edgespike_core::Gateway>,
    host: String,
    port: u16,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let rt = tokio::runtime::Runtime::new().expect("tokio runtime");
        if let Err(e) = rt.block_on(edgespike_server::run_server(gateway, &host, port)) {
            eprintln!("dashboard server failed on {host}:{port}: {e}");
            std::process::exit(1);
        }
    })
}

/// Poll until the given TCP port accepts connections or the timeout runs
/// out.
pub fn wait_for_port(host: &str, port: u16, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    let addr = match format!("{host}:{port}").to_socket_addrs() {
        Ok(mut addrs) => match addrs.next() {
            Some(addr) => addr,
            None => return false,
        },
        Err(_) => return false,
    };
    while Instant::now() < deadline {
        if TcpStream::connect_timeout(&addr, Duration::from_millis(500)).is_ok() {
            return true;
        }
        thread::sleep(Duration::from_millis(200));
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collision_mode_parsing() {
        assert_eq!(parse_collision_mode("spikes"), CollisionMode::Spikes);
        assert_eq!(parse_collision_mode("all"), CollisionMode::All);
        assert_eq!(parse_collision_mode("bogus"), CollisionMode::Spikes);
    }

    #[test]
    fn effective_step_compresses_time() {
        let pace = PaceArgs {
            step_s: 300.0,
            accelerate: 60.0,
        };
        assert_eq!(pace.effective_step_s(), 5.0);
    }

    #[test]
    fn accelerate_below_one_is_clamped() {
        let pace = PaceArgs {
            step_s: 10.0,
            accelerate: 0.0,
        };
        assert_eq!(pace.effective_step_s(), 10.0);
    }

    #[test]
    fn wait_for_port_fails_fast_on_closed_port() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        assert!(!wait_for_port("127.0.0.1", port, Duration::from_millis(300)));
    }
}
