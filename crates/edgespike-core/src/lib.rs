//! # edgespike-core
//!
//! **Only transmit when the neuron says so.**
//!
//! `edgespike-core` simulates an energy-aware spiking sensor fleet. Every
//! node drives a scalar reading through a Leaky Integrate-and-Fire neuron
//! and transmits only on spikes; the gateway integrates the fleet's spike
//! train in a second LIF and, when it fires, broadcasts an inhibition
//! command that transiently raises every node's firing threshold. While
//! reports are in flight the gateway models LoRa airtime, detects
//! overlapping transmissions and tracks per-node energy, collision and
//! suppression counts for the metrics feed.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::sync::atomic::AtomicBool;
//! use std::sync::mpsc;
//!
//! use edgespike_core::node::ChannelSink;
//! use edgespike_core::{Gateway, GatewayConfig, InhibitionState, Node, NodeConfig, SyntheticSignal};
//!
//! let inhibition = Arc::new(InhibitionState::new(0.5));
//! let gateway = Arc::new(Gateway::new(GatewayConfig::default(), Arc::clone(&inhibition)));
//! let (tx, rx) = mpsc::sync_channel(1024);
//!
//! let stop = Arc::new(AtomicBool::new(false));
//! let mut node = Node::new(
//!     NodeConfig::new(0),
//!     Arc::clone(&inhibition),
//!     Box::new(SyntheticSignal::new(300.0)),
//! );
//! let node_stop = Arc::clone(&stop);
//! std::thread::spawn(move || node.run(&mut ChannelSink::new(tx), &node_stop));
//!
//! gateway.run(rx); // consume until stopped
//! ```
//!
//! ## Architecture
//!
//! Nodes (one thread each) → upstream channel → gateway (single consumer)
//! → inhibition broadcast back to the fleet. The TCP transport in
//! [`transport`] swaps the channel for newline-delimited JSON over one
//! socket per node, behaviourally equivalent to the in-process wiring.

pub mod airtime;
mod clock;
pub mod gateway;
pub mod inhibition;
pub mod lif;
pub mod message;
pub mod node;
pub mod signal;
pub mod transport;

pub use gateway::{CollisionMode, Gateway, GatewayConfig, MetricsSnapshot};
pub use inhibition::{InhibitionSnapshot, InhibitionState};
pub use lif::{LifAggregator, LifSensor};
pub use message::{InhibitCommand, UpstreamMessage};
pub use node::{Node, NodeConfig, SpikeSink};
pub use signal::{SyntheticSignal, ValueSource};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
