//! Conversation message value type
//!
//! A [`Message`] is immutable once constructed; the store shares it behind an
//! `Arc` between the ordered history, event observers and readers.
//!
//! ## Wire Format
//!
//! Messages arrive inside `cconnect.sms.messages` packets:
//!
//! ```json
//! {
//!     "_id": 18,
//!     "thread_id": 7,
//!     "date": 1700000000000,
//!     "body": "See you soon",
//!     "addresses": [{ "address": "+1234567890" }],
//!     "event": 1,
//!     "sub_id": 1,
//!     "type": 1,
//!     "read": 1
//! }
//! ```
//!
//! `event` is a bitmask: `0x1` marks a text message, `0x2` a multi-target
//! (group) message.

use serde::{Deserialize, Serialize};

/// Conversation (thread) identifier assigned by the phone
pub type ThreadId = i64;

/// Message identifier, unique within a thread
pub type MessageId = i64;

/// Event bit for a plain text message
pub const EVENT_TEXT_MESSAGE: i32 = 0x1;

/// Event bit for a message with more than one participant
pub const EVENT_MULTI_TARGET: i32 = 0x2;

/// Subscription id used when the phone does not report one
pub const UNKNOWN_SUBSCRIPTION_ID: i64 = -1;

/// A sender or recipient of a message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub address: String,
}

impl Address {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

/// Direction of a message as reported by the phone's SMS database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Received from a remote party
    Received,
    /// Sent from the phone
    Sent,
    /// Drafts, outbox, failed, ...
    Other(i32),
}

impl From<i32> for MessageKind {
    fn from(value: i32) -> Self {
        match value {
            1 => Self::Received,
            2 => Self::Sent,
            other => Self::Other(other),
        }
    }
}

impl From<MessageKind> for i32 {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Received => 1,
            MessageKind::Sent => 2,
            MessageKind::Other(other) => other,
        }
    }
}

/// One message of a conversation
///
/// # Examples
///
/// ```rust
/// use cosmic_ext_connect_sms::conversations::{Address, Message};
///
/// let message = Message::new(1, 7, 1_700_000_000_000, vec![Address::new("+1234567890")], "Hi")
///     .with_subscription_id(2);
///
/// assert_eq!(message.thread_id(), 7);
/// assert!(!message.is_multitarget());
/// assert_eq!(message.subscription_id(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WireMessage", into = "WireMessage")]
pub struct Message {
    uid: MessageId,
    thread_id: ThreadId,
    timestamp: i64,
    addresses: Vec<Address>,
    is_multitarget: bool,
    subscription_id: i64,
    body: String,
    kind: MessageKind,
    read: bool,
}

impl Message {
    /// Create a received, unread, single-target text message
    pub fn new(
        uid: MessageId,
        thread_id: ThreadId,
        timestamp: i64,
        addresses: Vec<Address>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            uid,
            thread_id,
            timestamp,
            addresses,
            is_multitarget: false,
            subscription_id: UNKNOWN_SUBSCRIPTION_ID,
            body: body.into(),
            kind: MessageKind::Received,
            read: false,
        }
    }

    /// Builder pattern: Mark the message as part of a group conversation
    pub fn with_multitarget(mut self, is_multitarget: bool) -> Self {
        self.is_multitarget = is_multitarget;
        self
    }

    /// Builder pattern: Set the SIM subscription the message belongs to
    pub fn with_subscription_id(mut self, subscription_id: i64) -> Self {
        self.subscription_id = subscription_id;
        self
    }

    /// Builder pattern: Set the message direction
    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }

    /// Builder pattern: Set the read flag
    pub fn with_read(mut self, read: bool) -> Self {
        self.read = read;
        self
    }

    pub fn uid(&self) -> MessageId {
        self.uid
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Timestamp in milliseconds since epoch
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn addresses(&self) -> &[Address] {
        &self.addresses
    }

    pub fn is_multitarget(&self) -> bool {
        self.is_multitarget
    }

    pub fn subscription_id(&self) -> i64 {
        self.subscription_id
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn is_read(&self) -> bool {
        self.read
    }
}

/// Field layout used on the wire
#[derive(Serialize, Deserialize)]
struct WireMessage {
    #[serde(rename = "_id")]
    uid: MessageId,
    thread_id: ThreadId,
    date: i64,
    #[serde(default)]
    body: String,
    #[serde(default)]
    addresses: Vec<Address>,
    #[serde(default = "default_event")]
    event: i32,
    #[serde(default = "default_sub_id")]
    sub_id: i64,
    #[serde(rename = "type", default = "default_type")]
    message_type: i32,
    #[serde(default)]
    read: i32,
}

fn default_event() -> i32 {
    EVENT_TEXT_MESSAGE
}

fn default_sub_id() -> i64 {
    UNKNOWN_SUBSCRIPTION_ID
}

fn default_type() -> i32 {
    MessageKind::Received.into()
}

impl From<WireMessage> for Message {
    fn from(wire: WireMessage) -> Self {
        Self {
            uid: wire.uid,
            thread_id: wire.thread_id,
            timestamp: wire.date,
            addresses: wire.addresses,
            is_multitarget: wire.event & EVENT_MULTI_TARGET != 0,
            subscription_id: wire.sub_id,
            body: wire.body,
            kind: MessageKind::from(wire.message_type),
            read: wire.read != 0,
        }
    }
}

impl From<Message> for WireMessage {
    fn from(message: Message) -> Self {
        let mut event = EVENT_TEXT_MESSAGE;
        if message.is_multitarget {
            event |= EVENT_MULTI_TARGET;
        }

        Self {
            uid: message.uid,
            thread_id: message.thread_id,
            date: message.timestamp,
            body: message.body,
            addresses: message.addresses,
            event,
            sub_id: message.subscription_id,
            message_type: message.kind.into(),
            read: i32::from(message.read),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_wire_message() {
        let message: Message = serde_json::from_value(json!({
            "_id": 18,
            "thread_id": 7,
            "date": 1700000000000i64,
            "body": "See you soon",
            "addresses": [{ "address": "+1234567890" }],
            "event": 1,
            "sub_id": 1,
            "type": 2,
            "read": 1
        }))
        .unwrap();

        assert_eq!(message.uid(), 18);
        assert_eq!(message.thread_id(), 7);
        assert_eq!(message.timestamp(), 1700000000000);
        assert_eq!(message.addresses(), &[Address::new("+1234567890")]);
        assert!(!message.is_multitarget());
        assert_eq!(message.subscription_id(), 1);
        assert_eq!(message.kind(), MessageKind::Sent);
        assert!(message.is_read());
    }

    #[test]
    fn test_multitarget_event_bit() {
        let message: Message = serde_json::from_value(json!({
            "_id": 1,
            "thread_id": 2,
            "date": 3,
            "addresses": [{ "address": "a" }, { "address": "b" }],
            "event": EVENT_TEXT_MESSAGE | EVENT_MULTI_TARGET
        }))
        .unwrap();

        assert!(message.is_multitarget());
        assert_eq!(message.addresses().len(), 2);
    }

    #[test]
    fn test_missing_optional_fields() {
        let message: Message =
            serde_json::from_value(json!({ "_id": 1, "thread_id": 2, "date": 3 })).unwrap();

        assert_eq!(message.body(), "");
        assert!(message.addresses().is_empty());
        assert_eq!(message.subscription_id(), UNKNOWN_SUBSCRIPTION_ID);
        assert_eq!(message.kind(), MessageKind::Received);
        assert!(!message.is_read());
    }

    #[test]
    fn test_encode_sets_event_bits() {
        let message = Message::new(1, 2, 3, vec![], "hi").with_multitarget(true);
        let value = serde_json::to_value(&message).unwrap();

        assert_eq!(value["event"], EVENT_TEXT_MESSAGE | EVENT_MULTI_TARGET);
        assert_eq!(value["_id"], 1);
        assert_eq!(value["date"], 3);
    }

    #[test]
    fn test_message_kind_conversion() {
        assert_eq!(MessageKind::from(1), MessageKind::Received);
        assert_eq!(MessageKind::from(5), MessageKind::Other(5));
        assert_eq!(i32::from(MessageKind::Sent), 2);
    }
}
