//! Wall-clock helpers shared by the inhibition and gateway state.

use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch as a float, matching the resolution the
/// transmission window and inhibition expiry arithmetic work in.
pub(crate) fn unix_now_s() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
