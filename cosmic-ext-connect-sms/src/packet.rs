//! CConnect Network Packet
//!
//! The subset of the CConnect packet structure used by the SMS adapter.
//! Framing and transfer are left to the daemon's connection layer; this crate
//! only builds and inspects packets.
//!
//! ## Packet Structure
//!
//! Each packet contains:
//! - `id`: UNIX epoch timestamp in milliseconds
//! - `type`: Packet type in format `cconnect.<plugin>[.<action>]`
//! - `body`: JSON dictionary of plugin-specific parameters
//!
//! ## References
//! - [Valent Protocol Reference](https://valent.andyholmes.ca/documentation/protocol.html)

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Represents a CConnect network packet
///
/// # Examples
///
/// ```
/// use cosmic_ext_connect_sms::Packet;
/// use serde_json::json;
///
/// let packet = Packet::new("kdeconnect.sms.messages", json!({ "messages": [] }));
///
/// assert!(packet.is_type("cconnect.sms.messages"));
/// assert!(!packet.is_type("cconnect.sms.request"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Packet {
    /// UNIX timestamp in milliseconds
    pub id: i64,

    /// Packet type, e.g. "cconnect.sms.messages"
    #[serde(rename = "type")]
    pub packet_type: String,

    /// Plugin-specific parameters
    #[serde(default)]
    pub body: Value,
}

impl Packet {
    /// Creates a new packet with the specified type and body
    ///
    /// The packet ID is set to the current timestamp in milliseconds.
    pub fn new(packet_type: impl Into<String>, body: Value) -> Self {
        Self {
            id: current_timestamp(),
            packet_type: packet_type.into(),
            body,
        }
    }

    /// Check if packet is of a specific type
    ///
    /// `cconnect.` and `kdeconnect.` prefixes are treated as interchangeable.
    pub fn is_type(&self, packet_type: &str) -> bool {
        if self.packet_type == packet_type {
            return true;
        }

        if let Some(rest) = packet_type.strip_prefix("cconnect.") {
            return self.packet_type == format!("kdeconnect.{}", rest);
        }
        if let Some(rest) = packet_type.strip_prefix("kdeconnect.") {
            return self.packet_type == format!("cconnect.{}", rest);
        }

        false
    }
}

/// Generate current UNIX timestamp in milliseconds
pub fn current_timestamp() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_packet() {
        let packet = Packet::new("cconnect.sms.request", json!({}));
        assert_eq!(packet.packet_type, "cconnect.sms.request");
        assert!(packet.body.is_object());
        assert!(packet.id > 0);
    }

    #[test]
    fn test_is_type_accepts_kde_prefix() {
        let packet = Packet::new("kdeconnect.sms.messages", json!({}));
        assert!(packet.is_type("cconnect.sms.messages"));
        assert!(packet.is_type("kdeconnect.sms.messages"));
        assert!(!packet.is_type("cconnect.sms.request"));
    }
}
