//! Wire protocol: newline-delimited JSON, one object per line.
//!
//! Upstream (node → gateway) carries sensor readings and spike flags;
//! downstream (gateway → node) carries inhibit commands. Decoding accepts
//! unknown fields so older nodes keep working against newer gateways, and
//! tolerates a missing node id: the gateway degrades such messages to
//! feed-only entries instead of rejecting them.

use chrono::Utc;
use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// One sensor report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamMessage {
    /// ISO-8601 UTC timestamp assigned at the node.
    pub ts: String,
    #[serde(default)]
    pub node: Option<u32>,
    #[serde(default)]
    pub value: f64,
    /// 1 iff the sensor LIF fired this step.
    #[serde(default)]
    pub spike: u8,
    /// Monotonically non-decreasing count of inhibition near-misses.
    #[serde(default)]
    pub suppressed_total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    /// Set to 1 on forced non-spike reports emitted by the baseline
    /// interval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline: Option<u8>,
}

impl UpstreamMessage {
    pub fn is_spike(&self) -> bool {
        self.spike == 1
    }
}

/// Broadcast command raising every node's firing threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InhibitCommand {
    pub cmd: String,
    pub beta: f64,
    pub t_inh: i64,
}

impl InhibitCommand {
    pub const NAME: &'static str = "inhibit";

    pub fn new(beta: f64, t_inh: i64) -> Self {
        Self {
            cmd: Self::NAME.to_string(),
            beta,
            t_inh,
        }
    }

    pub fn is_inhibit(&self) -> bool {
        self.cmd == Self::NAME
    }
}

/// Current wall-clock time in the `ts` wire format.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

/// Encode one message as a `\n`-terminated JSON line.
pub fn encode_line<T: Serialize>(msg: &T) -> serde_json::Result<String> {
    let mut line = serde_json::to_string(msg)?;
    line.push('\n');
    Ok(line)
}

/// Decode one line. Malformed input yields `None`; the transport skips it
/// and keeps reading.
pub fn decode_line<T: DeserializeOwned>(line: &str) -> Option<T> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str(line) {
        Ok(msg) => Some(msg),
        Err(e) => {
            debug!("skipping malformed line: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> UpstreamMessage {
        UpstreamMessage {
            ts: "2025-01-01T00:00:00+00:00".to_string(),
            node: Some(60),
            value: 51.3,
            spike: 1,
            suppressed_total: Some(4),
            name: Some("node-60".to_string()),
            ip: Some("10.0.0.70".to_string()),
            baseline: None,
        }
    }

    #[test]
    fn upstream_round_trip() {
        let msg = sample();
        let line = encode_line(&msg).unwrap();
        assert!(line.ends_with('\n'));
        let back: UpstreamMessage = decode_line(&line).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn optional_fields_are_omitted() {
        let msg = UpstreamMessage {
            name: None,
            ip: None,
            ..sample()
        };
        let line = encode_line(&msg).unwrap();
        assert!(!line.contains("\"name\""));
        assert!(!line.contains("\"ip\""));
        assert!(!line.contains("\"baseline\""));
    }

    #[test]
    fn unknown_fields_are_accepted() {
        let line = r#"{"ts":"2025-01-01T00:00:00+00:00","node":3,"value":1.0,
                       "spike":0,"suppressed_total":0,"firmware":"v9"}"#;
        let msg: UpstreamMessage = decode_line(line).unwrap();
        assert_eq!(msg.node, Some(3));
    }

    #[test]
    fn missing_node_parses_as_none() {
        let line = r#"{"ts":"2025-01-01T00:00:00+00:00","value":2.5,"spike":1}"#;
        let msg: UpstreamMessage = decode_line(line).unwrap();
        assert_eq!(msg.node, None);
        assert_eq!(msg.suppressed_total, None);
        assert!(msg.is_spike());
    }

    #[test]
    fn malformed_lines_are_skipped() {
        assert!(decode_line::<UpstreamMessage>("{not json").is_none());
        assert!(decode_line::<UpstreamMessage>("").is_none());
        assert!(decode_line::<UpstreamMessage>("   \n").is_none());
    }

    #[test]
    fn inhibit_command_round_trip() {
        let cmd = InhibitCommand::new(2.0, 5);
        let line = encode_line(&cmd).unwrap();
        assert!(line.contains("\"cmd\":\"inhibit\""));
        let back: InhibitCommand = decode_line(&line).unwrap();
        assert_eq!(back, cmd);
        assert!(back.is_inhibit());
    }

    #[test]
    fn foreign_command_is_not_inhibit() {
        let line = r#"{"cmd":"reboot","beta":0.0,"t_inh":0}"#;
        let cmd: InhibitCommand = decode_line(line).unwrap();
        assert!(!cmd.is_inhibit());
    }
}
