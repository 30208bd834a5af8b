//! Aggregation gateway.
//!
//! A single consumer drains the upstream channel. Every message is
//! enriched with the LoRa transmission model, checked against the window
//! of in-flight transmissions for collisions, folded into per-node energy
//! and suppression counters, and fed (when it is a spike) into the
//! aggregator LIF. An aggregator fire activates inhibition and invokes
//! the broadcast hook.
//!
//! One mutex guards all gateway state; snapshot reads take the same lock.
//! The inhibition state keeps its own lock and the two are never held at
//! once: activation and the broadcast hook run after the gateway lock is
//! released.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::airtime::{lorawan_airtime, tx_energy};
use crate::clock::unix_now_s;
use crate::inhibition::{InhibitionSnapshot, InhibitionState};
use crate::lif::LifAggregator;
use crate::message::{InhibitCommand, UpstreamMessage};

/// Which messages participate in collision detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollisionMode {
    /// Only spike transmissions occupy the channel.
    #[default]
    Spikes,
    /// Every report occupies the channel, baseline traffic included.
    All,
}

impl fmt::Display for CollisionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spikes => write!(f, "spikes"),
            Self::All => write!(f, "all"),
        }
    }
}

/// Gateway tuning. Defaults match the standard fleet profile.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub agg_leak: f64,
    pub agg_theta: f64,
    /// Threshold multiplier pushed to the fleet when the aggregator fires.
    pub beta: f64,
    /// Inhibition duration in simulation steps.
    pub t_inh_steps: i64,
    pub tx_power_w: f64,
    pub payload_bytes: u32,
    pub collision_mode: CollisionMode,
    /// The transmission window keeps entries for
    /// `max(min_retention_s, airtime * retention_multiplier)` seconds.
    pub retention_multiplier: f64,
    pub min_retention_s: f64,
    /// Bound on the recent-message feed; oldest entries are evicted.
    pub max_recent: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            agg_leak: 0.995,
            agg_theta: 10.0,
            beta: 2.0,
            t_inh_steps: 5,
            tx_power_w: 0.396,
            payload_bytes: 12,
            collision_mode: CollisionMode::Spikes,
            retention_multiplier: 10.0,
            min_retention_s: 2.0,
            max_recent: 5000,
        }
    }
}

/// Upstream message enriched with the gateway's transmission model.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichedMessage {
    #[serde(flatten)]
    pub msg: UpstreamMessage,
    pub airtime_s: f64,
    pub energy_j: f64,
    pub start_s: f64,
    pub end_s: f64,
    pub collided: bool,
    pub pairwise_collisions: u32,
}

/// One in-flight transmission retained for collision checks.
#[derive(Debug, Clone, Copy)]
struct Flight {
    node: u32,
    start_s: f64,
    end_s: f64,
    is_tx: bool,
    collided: bool,
}

#[derive(Debug, Default, Clone, Copy)]
struct NodeCounters {
    energy_total_j: f64,
    collisions: u64,
    pairwise_collisions: u64,
    suppressed_total: u64,
}

struct GatewayInner {
    recent: VecDeque<EnrichedMessage>,
    window: Vec<Flight>,
    per_node: HashMap<u32, NodeCounters>,
    aggregator: LifAggregator,
    fires: u64,
}

/// Invoked (outside the gateway lock) with the command to broadcast each
/// time the aggregator fires.
pub type InhibitHook = Box<dyn Fn(&InhibitCommand) + Send + Sync>;

pub struct Gateway {
    cfg: GatewayConfig,
    inhibition: Arc<InhibitionState>,
    inner: Mutex<GatewayInner>,
    hook: Mutex<Option<InhibitHook>>,
    stop: AtomicBool,
}

impl Gateway {
    pub fn new(cfg: GatewayConfig, inhibition: Arc<InhibitionState>) -> Self {
        let aggregator = LifAggregator::new(cfg.agg_leak, cfg.agg_theta);
        Self {
            cfg,
            inhibition,
            inner: Mutex::new(GatewayInner {
                recent: VecDeque::new(),
                window: Vec::new(),
                per_node: HashMap::new(),
                aggregator,
                fires: 0,
            }),
            hook: Mutex::new(None),
            stop: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.cfg
    }

    /// Install the broadcast hook (TCP mode wires the client registry in
    /// here; in-process mode needs none).
    pub fn set_inhibit_hook(&self, hook: InhibitHook) {
        *self.hook.lock().unwrap() = Some(hook);
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Process one upstream message.
    pub fn ingest(&self, msg: UpstreamMessage) {
        let now = unix_now_s();
        let fired = {
            let mut inner = self.inner.lock().unwrap();
            self.process(&mut inner, msg, now)
        };
        if fired {
            info!(
                "aggregator fired: beta={} for {} steps",
                self.cfg.beta, self.cfg.t_inh_steps
            );
            self.inhibition.activate(self.cfg.beta, self.cfg.t_inh_steps);
            let cmd = InhibitCommand::new(self.cfg.beta, self.cfg.t_inh_steps);
            if let Some(hook) = self.hook.lock().unwrap().as_ref() {
                hook(&cmd);
            }
        }
    }

    /// Consume the upstream channel until stopped or every sender is gone.
    /// The receive timeout bounds shutdown latency.
    pub fn run(&self, rx: Receiver<UpstreamMessage>) {
        const RECV_TIMEOUT: Duration = Duration::from_millis(500);
        while !self.stopped() {
            match rx.recv_timeout(RECV_TIMEOUT) {
                Ok(msg) => self.ingest(msg),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    /// Returns true when the aggregator fired on this message.
    fn process(&self, inner: &mut GatewayInner, msg: UpstreamMessage, now: f64) -> bool {
        let airtime = lorawan_airtime(self.cfg.payload_bytes);
        let energy = tx_energy(airtime, self.cfg.tx_power_w);
        let spike = msg.is_spike();
        let mut enriched = EnrichedMessage {
            msg,
            airtime_s: airtime,
            energy_j: energy,
            start_s: now,
            end_s: now + airtime,
            collided: false,
            pairwise_collisions: 0,
        };

        // Messages without a node id stay in the feed but are dropped from
        // per-node and collision accounting.
        if let Some(node) = enriched.msg.node {
            let counters = inner.per_node.entry(node).or_default();
            counters.energy_total_j += energy;
            if let Some(reported) = enriched.msg.suppressed_total
                && reported != counters.suppressed_total
            {
                counters.suppressed_total = reported;
            }
            self.update_collisions(inner, &mut enriched, node, spike, now);
        } else {
            debug!("message without node id: skipping per-node accounting");
        }

        let mut fired = false;
        if spike && inner.aggregator.step(1.0) {
            inner.fires += 1;
            fired = true;
        }

        if inner.recent.len() == self.cfg.max_recent {
            inner.recent.pop_front();
        }
        inner.recent.push_back(enriched);
        fired
    }

    fn update_collisions(
        &self,
        inner: &mut GatewayInner,
        enriched: &mut EnrichedMessage,
        node: u32,
        spike: bool,
        now: f64,
    ) {
        let is_tx = match self.cfg.collision_mode {
            CollisionMode::Spikes => spike,
            CollisionMode::All => true,
        };
        if is_tx {
            let mut overlaps = 0u64;
            for entry in inner.window.iter_mut() {
                if !entry.is_tx || entry.node == node {
                    continue;
                }
                if entry.end_s <= enriched.start_s || entry.start_s >= enriched.end_s {
                    continue;
                }
                overlaps += 1;
                let other = inner.per_node.entry(entry.node).or_default();
                other.pairwise_collisions += 1;
                // Each distinct message counts as collided at most once.
                if !entry.collided {
                    entry.collided = true;
                    other.collisions += 1;
                }
            }
            if overlaps > 0 {
                enriched.collided = true;
                enriched.pairwise_collisions = overlaps as u32;
                let counters = inner.per_node.entry(node).or_default();
                counters.collisions += 1;
                counters.pairwise_collisions += overlaps;
            }
        }
        inner.window.push(Flight {
            node,
            start_s: enriched.start_s,
            end_s: enriched.end_s,
            is_tx,
            collided: enriched.collided,
        });
        let cutoff = now
            - self
                .cfg
                .min_retention_s
                .max(enriched.airtime_s * self.cfg.retention_multiplier);
        inner.window.retain(|t| t.end_s >= cutoff);
    }

    /// Assemble the metrics snapshot. Called from the HTTP handler; holds
    /// the gateway lock for the duration of the copy.
    pub fn snapshot_metrics(&self) -> MetricsSnapshot {
        let inhibition = self.inhibition.snapshot();
        let inner = self.inner.lock().unwrap();
        let now = unix_now_s();

        let timestamps: Vec<String> = inner.recent.iter().map(|m| m.msg.ts.clone()).collect();
        let mut nodes: BTreeMap<String, NodeSeries> = BTreeMap::new();
        for (i, m) in inner.recent.iter().enumerate() {
            let Some(node) = m.msg.node else { continue };
            let series = nodes.entry(node.to_string()).or_insert_with(|| NodeSeries {
                values: vec![None; timestamps.len()],
            });
            series.values[i] = Some(m.msg.value);
        }

        let mut summary: BTreeMap<String, NodeSummary> = BTreeMap::new();
        for (node, counters) in &inner.per_node {
            summary.insert(
                node.to_string(),
                NodeSummary {
                    count: 0,
                    energy_total: counters.energy_total_j,
                    collisions: counters.collisions,
                    pairwise_collisions: counters.pairwise_collisions,
                },
            );
        }
        for m in &inner.recent {
            let Some(node) = m.msg.node else { continue };
            summary.entry(node.to_string()).or_default().count += 1;
        }

        const RATE_WINDOW_S: f64 = 60.0;
        let in_window = inner
            .recent
            .iter()
            .filter(|m| m.start_s >= now - RATE_WINDOW_S)
            .count();
        let msgs_per_sec = in_window as f64 / RATE_WINDOW_S;

        let suppressed_total: u64 = inner
            .per_node
            .values()
            .map(|c| c.suppressed_total)
            .sum();
        let total_collided_messages: u64 = inner.per_node.values().map(|c| c.collisions).sum();
        let total_pairwise_overlaps: u64 = inner
            .per_node
            .values()
            .map(|c| c.pairwise_collisions)
            .sum();

        MetricsSnapshot {
            nodes,
            timestamps,
            summary,
            msgs_per_sec,
            aggregator: AggregatorStats {
                fires: inner.fires,
                theta: inner.aggregator.theta(),
                suppressed_total,
            },
            total_messages: inner.recent.len() as u64,
            total_collided_messages,
            total_pairwise_overlaps,
            collision_mode: self.cfg.collision_mode.to_string(),
            inhibition,
            last_updated_iso: inner.recent.back().map(|m| m.msg.ts.clone()),
        }
    }
}

/// Sensor values for one node, index-aligned with the snapshot's
/// `timestamps` axis; `null` where the timestamp belongs to another node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSeries {
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeSummary {
    /// Messages from this node still in the recent feed.
    pub count: u64,
    pub energy_total: f64,
    pub collisions: u64,
    pub pairwise_collisions: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregatorStats {
    pub fires: u64,
    pub theta: f64,
    /// Sum over nodes of the highest suppressed count each has reported.
    pub suppressed_total: u64,
}

/// Metrics payload served at `/metrics`.
///
/// `total_collided_messages` counts distinct messages whose airtime
/// overlapped at least one foreign transmission, each message at most
/// once, attributed to its own node. `total_pairwise_overlaps` sums the
/// per-node pairwise counters, so every overlapping pair contributes two:
/// one per endpoint. Both totals equal the sum of the matching per-node
/// summary columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub nodes: BTreeMap<String, NodeSeries>,
    pub timestamps: Vec<String>,
    pub summary: BTreeMap<String, NodeSummary>,
    pub msgs_per_sec: f64,
    pub aggregator: AggregatorStats,
    pub total_messages: u64,
    pub total_collided_messages: u64,
    pub total_pairwise_overlaps: u64,
    pub collision_mode: String,
    pub inhibition: InhibitionSnapshot,
    pub last_updated_iso: Option<String>,
}
