//! CLI for edgespike — run the fleet, the gateway or a single node.

mod commands;

use clap::{Parser, Subcommand};

use commands::{DashboardArgs, GatewayArgs, LifArgs, PaceArgs};

#[derive(Parser)]
#[command(name = "edgespike")]
#[command(about = "edgespike — energy-aware spiking sensor fleet simulator")]
#[command(version = edgespike_core::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run nodes, gateway and dashboard in one process
    Sim {
        /// Number of simulated nodes
        #[arg(long, default_value_t = 10)]
        nodes: u32,

        /// Force a non-spike report every N steps (0 = spikes only)
        #[arg(long, default_value_t = 0)]
        baseline_interval: u64,

        /// Stop after this many seconds (0 = run until Ctrl-C)
        #[arg(long, default_value_t = 0.0)]
        duration_s: f64,

        #[command(flatten)]
        pace: PaceArgs,

        #[command(flatten)]
        lif: LifArgs,

        #[command(flatten)]
        gateway: GatewayArgs,

        #[command(flatten)]
        dashboard: DashboardArgs,
    },

    /// Run the TCP gateway with the dashboard
    Gateway {
        /// Node listener bind address
        #[arg(long, default_value = "127.0.0.1")]
        listen_host: String,

        /// Node listener port
        #[arg(long, default_value_t = 9000)]
        listen_port: u16,

        #[command(flatten)]
        pace: PaceArgs,

        #[command(flatten)]
        gateway: GatewayArgs,

        #[command(flatten)]
        dashboard: DashboardArgs,
    },

    /// Run one sensor node against a remote gateway
    Node {
        /// Node id
        #[arg(long)]
        id: u32,

        /// Human-readable node name
        #[arg(long)]
        name: Option<String>,

        /// Gateway host
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Gateway node-listener port
        #[arg(long, default_value_t = 9000)]
        port: u16,

        /// Give up connecting after this many seconds
        #[arg(long, default_value_t = 10.0)]
        connect_timeout_s: f64,

        /// Force a non-spike report every N steps (0 = spikes only)
        #[arg(long, default_value_t = 0)]
        baseline_interval: u64,

        #[command(flatten)]
        pace: PaceArgs,

        #[command(flatten)]
        lif: LifArgs,
    },

    /// Spawn a fleet of node processes against a running gateway
    Fleet {
        /// Number of node processes
        #[arg(long, default_value_t = 5)]
        nodes: u32,

        /// First node id; the rest count up from here
        #[arg(long, default_value_t = 60)]
        first_id: u32,

        /// Gateway host
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Gateway node-listener port
        #[arg(long, default_value_t = 9000)]
        port: u16,

        /// Give up waiting for the gateway after this many seconds
        #[arg(long, default_value_t = 10.0)]
        wait_s: f64,

        /// Pause between node starts in seconds
        #[arg(long, default_value_t = 0.5)]
        stagger_s: f64,

        #[command(flatten)]
        pace: PaceArgs,

        #[command(flatten)]
        lif: LifArgs,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Sim {
            nodes,
            baseline_interval,
            duration_s,
            pace,
            lif,
            gateway,
            dashboard,
        } => commands::sim::run(commands::sim::SimOptions {
            nodes,
            baseline_interval,
            duration_s,
            pace,
            lif,
            gateway,
            dashboard,
        }),
        Commands::Gateway {
            listen_host,
            listen_port,
            pace,
            gateway,
            dashboard,
        } => commands::gateway::run(commands::gateway::GatewayOptions {
            listen_host,
            listen_port,
            pace,
            gateway,
            dashboard,
        }),
        Commands::Node {
            id,
            name,
            host,
            port,
            connect_timeout_s,
            baseline_interval,
            pace,
            lif,
        } => commands::node::run(commands::node::NodeOptions {
            id,
            name,
            host,
            port,
            connect_timeout_s,
            baseline_interval,
            pace,
            lif,
        }),
        Commands::Fleet {
            nodes,
            first_id,
            host,
            port,
            wait_s,
            stagger_s,
            pace,
            lif,
        } => commands::fleet::run(commands::fleet::FleetOptions {
            nodes,
            first_id,
            host,
            port,
            wait_s,
            stagger_s,
            pace,
            lif,
        }),
    }
}
