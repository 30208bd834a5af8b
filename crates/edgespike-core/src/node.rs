//! Sensor node loop.
//!
//! Each node owns one [`LifSensor`], reads the inhibition multiplier once
//! per step, and hands transmitted reports to a [`SpikeSink`]. Nodes never
//! coordinate with each other; the only shared object is the inhibition
//! state, and in TCP mode even that is a node-local copy fed by broadcast
//! commands.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::SyncSender;
use std::thread;
use std::time::Duration;

use log::info;

use crate::inhibition::InhibitionState;
use crate::lif::LifSensor;
use crate::message::{self, UpstreamMessage};
use crate::signal::ValueSource;

/// Per-node settings. Defaults mirror the standard fleet profile: a five
/// minute step compressed 60× into wall-clock time.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub node_id: u32,
    pub name: Option<String>,
    /// Reported address; defaults to `10.0.0.{10 + node_id}`.
    pub ip: Option<String>,
    pub step_s: f64,
    pub accelerate: f64,
    pub lif_leak: f64,
    pub lif_theta: f64,
    pub lif_refractory: u32,
    pub lif_scale: f64,
    /// When > 0, force a non-spike report every N steps.
    pub baseline_interval: u64,
}

impl NodeConfig {
    pub fn new(node_id: u32) -> Self {
        Self {
            node_id,
            name: None,
            ip: None,
            step_s: 300.0,
            accelerate: 60.0,
            lif_leak: 0.99,
            lif_theta: 50.0,
            lif_refractory: 0,
            lif_scale: 1.0,
            baseline_interval: 0,
        }
    }
}

/// Delivery seam between a node and its transport.
pub trait SpikeSink: Send {
    fn deliver(&mut self, msg: &UpstreamMessage) -> io::Result<()>;
}

/// In-process transport: bounded channel into the gateway.
pub struct ChannelSink {
    tx: SyncSender<UpstreamMessage>,
}

impl ChannelSink {
    pub fn new(tx: SyncSender<UpstreamMessage>) -> Self {
        Self { tx }
    }
}

impl SpikeSink for ChannelSink {
    fn deliver(&mut self, msg: &UpstreamMessage) -> io::Result<()> {
        self.tx
            .send(msg.clone())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "gateway channel closed"))
    }
}

/// One simulated sensor.
pub struct Node {
    cfg: NodeConfig,
    ip: String,
    lif: LifSensor,
    inhibition: Arc<InhibitionState>,
    signal: Box<dyn ValueSource>,
    step: u64,
    total_spikes: u64,
    suppressed_total: u64,
}

impl Node {
    pub fn new(
        cfg: NodeConfig,
        inhibition: Arc<InhibitionState>,
        signal: Box<dyn ValueSource>,
    ) -> Self {
        let ip = cfg
            .ip
            .clone()
            .unwrap_or_else(|| format!("10.0.0.{}", 10 + cfg.node_id));
        let lif = LifSensor::new(cfg.lif_leak, cfg.lif_theta, cfg.lif_refractory);
        Self {
            cfg,
            ip,
            lif,
            inhibition,
            signal,
            step: 0,
            total_spikes: 0,
            suppressed_total: 0,
        }
    }

    pub fn node_id(&self) -> u32 {
        self.cfg.node_id
    }

    pub fn total_spikes(&self) -> u64 {
        self.total_spikes
    }

    pub fn suppressed_total(&self) -> u64 {
        self.suppressed_total
    }

    /// Run until `stop` flips or the transport goes away. Sleeps
    /// `step_s / max(1, accelerate)` between steps.
    pub fn run(&mut self, sink: &mut dyn SpikeSink, stop: &AtomicBool) {
        let pause = Duration::from_secs_f64(self.cfg.step_s / self.cfg.accelerate.max(1.0));
        while !stop.load(Ordering::Relaxed) {
            if let Err(e) = self.step_once(sink) {
                info!("node {}: transport closed, stopping: {e}", self.cfg.node_id);
                break;
            }
            thread::sleep(pause);
        }
    }

    /// Advance one step. Transmits iff the sensor fired, or on a baseline
    /// tick (flagged `baseline: 1` when forced). Errors mean the transport
    /// is gone and the loop should end; there is no retry or buffering.
    pub fn step_once(&mut self, sink: &mut dyn SpikeSink) -> io::Result<()> {
        let value = self.signal.sample(self.step);
        let beta = self.inhibition.current_beta();
        let outcome = self.lif.step(value * self.cfg.lif_scale, beta);
        if outcome.spike {
            self.total_spikes += 1;
        }
        if outcome.suppressed {
            self.suppressed_total += 1;
        }
        let baseline_tick =
            self.cfg.baseline_interval > 0 && self.step % self.cfg.baseline_interval == 0;
        self.step += 1;

        if !outcome.spike && !baseline_tick {
            return Ok(());
        }
        let msg = UpstreamMessage {
            ts: message::now_iso(),
            node: Some(self.cfg.node_id),
            value,
            spike: outcome.spike as u8,
            suppressed_total: Some(self.suppressed_total),
            name: self.cfg.name.clone(),
            ip: Some(self.ip.clone()),
            baseline: (!outcome.spike && baseline_tick).then_some(1),
        };
        sink.deliver(&msg)
    }
}
