//! Cross-frame scroll message protocol.
//!
//! Cooperating content posts `{"type":"scroll-sync","ratio":<number>}` to its
//! host whenever it scrolls, and scrolls itself when it receives the same
//! shape. The channel is shared with unrelated traffic, so anything else is
//! classified as foreign or malformed and must be ignored by the receiver.

use serde::{Deserialize, Serialize};

pub const MESSAGE_TYPE: &str = "scroll-sync";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct WireMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    ratio: Option<f64>,
}

/// Classification of an inbound payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Inbound {
    /// Valid scroll report; ratio already clamped into `[0, 1]`.
    Ratio(f64),
    /// Well-formed message of another type.
    Foreign,
    /// Not JSON, wrong shape, or a scroll-sync message without a usable ratio.
    Malformed,
}

pub fn classify(payload: &str) -> Inbound {
    let msg = match serde_json::from_str::<WireMessage>(payload) {
        Ok(msg) => msg,
        Err(_) => return Inbound::Malformed,
    };
    if msg.kind != MESSAGE_TYPE {
        return Inbound::Foreign;
    }
    match msg.ratio {
        Some(r) if r.is_finite() => Inbound::Ratio(r.clamp(0.0, 1.0)),
        _ => Inbound::Malformed,
    }
}

/// Ratio carried by `payload`, if it is a valid scroll-sync message.
pub fn parse(payload: &str) -> Option<f64> {
    match classify(payload) {
        Inbound::Ratio(r) => Some(r),
        Inbound::Foreign | Inbound::Malformed => None,
    }
}

pub fn encode(ratio: f64) -> String {
    let ratio = if ratio.is_finite() {
        ratio.clamp(0.0, 1.0)
    } else {
        0.0
    };
    serde_json::json!({ "type": MESSAGE_TYPE, "ratio": ratio }).to_string()
}
