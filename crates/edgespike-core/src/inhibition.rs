//! Fleet-wide inhibition state.
//!
//! One writer (the gateway, on aggregator fire) and N readers (one read
//! per node step). The stored multiplier reverts to 1.0 once the expiry
//! timestamp passes; readers observe that lazily on their next call.
//!
//! In-process transports share a single instance between the gateway and
//! every node. TCP node processes own a private instance that is fed by
//! broadcast inhibit commands instead.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::clock::unix_now_s;

struct Inner {
    beta: f64,
    expiry_ts: f64,
}

/// Threshold multiplier with a wall-clock expiry.
pub struct InhibitionState {
    step_s: f64,
    inner: Mutex<Inner>,
}

impl InhibitionState {
    /// `step_s` is the real-time duration of one simulation step, used to
    /// translate an inhibition duration in steps into seconds.
    pub fn new(step_s: f64) -> Self {
        Self {
            step_s,
            inner: Mutex::new(Inner {
                beta: 1.0,
                expiry_ts: 0.0,
            }),
        }
    }

    pub fn step_s(&self) -> f64 {
        self.step_s
    }

    /// Raise the multiplier for the next `t_inh_steps` steps. Later calls
    /// overwrite any prior activation.
    pub fn activate(&self, beta: f64, t_inh_steps: i64) {
        let mut inner = self.inner.lock().unwrap();
        inner.beta = beta;
        inner.expiry_ts = unix_now_s() + t_inh_steps.max(0) as f64 * self.step_s;
    }

    /// Effective multiplier right now; 1.0 once the activation expired.
    pub fn current_beta(&self) -> f64 {
        let mut inner = self.inner.lock().unwrap();
        if inner.expiry_ts > 0.0 && unix_now_s() >= inner.expiry_ts {
            inner.beta = 1.0;
            inner.expiry_ts = 0.0;
        }
        inner.beta
    }

    /// Effective multiplier and expiry for the metrics feed.
    pub fn snapshot(&self) -> InhibitionSnapshot {
        let mut inner = self.inner.lock().unwrap();
        if inner.expiry_ts > 0.0 && unix_now_s() >= inner.expiry_ts {
            inner.beta = 1.0;
            inner.expiry_ts = 0.0;
        }
        InhibitionSnapshot {
            beta: inner.beta,
            expiry_ts: inner.expiry_ts,
        }
    }
}

/// Point-in-time view of the inhibition state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InhibitionSnapshot {
    pub beta: f64,
    pub expiry_ts: f64,
}
