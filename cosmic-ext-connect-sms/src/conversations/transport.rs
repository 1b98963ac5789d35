//! SMS transport seam
//!
//! The store never talks to the network itself. It asks an [`SmsTransport`]
//! to pull history or send a message; answers come back later as
//! `cconnect.sms.messages` packets fed into
//! [`Conversations::handle_packet`](super::Conversations::handle_packet).
//!
//! ## Protocol
//!
//! **Packet Types**:
//! - `cconnect.sms.messages` - SMS message data (incoming)
//! - `cconnect.sms.request_conversations` - Request latest message of every thread (outgoing)
//! - `cconnect.sms.request_conversation` - Request thread messages (outgoing)
//! - `cconnect.sms.request` - Send SMS message (outgoing)
//!
//! ## References
//!
//! - [Valent Protocol Documentation](https://valent.andyholmes.ca/documentation/protocol.html)

use super::message::{Message, ThreadId};
use crate::{ConversationError, Packet, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc::Sender;
use tracing::debug;

/// Packet type for SMS messages
pub const PACKET_TYPE_SMS_MESSAGES: &str = "cconnect.sms.messages";

/// Packet type for requesting conversation list
pub const PACKET_TYPE_SMS_REQUEST_CONVERSATIONS: &str = "cconnect.sms.request_conversations";

/// Packet type for requesting conversation messages
pub const PACKET_TYPE_SMS_REQUEST_CONVERSATION: &str = "cconnect.sms.request_conversation";

/// Packet type for sending SMS
pub const PACKET_TYPE_SMS_REQUEST: &str = "cconnect.sms.request";

/// Outbound requests to the phone
///
/// All requests are fire-and-forget: returning `Ok` means the request was
/// handed to the transport, not that the phone answered.
#[async_trait]
pub trait SmsTransport: Send + Sync {
    /// Ask the phone for the messages of one conversation
    async fn request_conversation(&self, thread_id: ThreadId) -> Result<()>;

    /// Ask the phone for the latest message of every conversation
    async fn request_all_conversations(&self) -> Result<()>;

    /// Send a text message
    async fn send_sms(
        &self,
        address: &str,
        body: &str,
        subscription_id: Option<i64>,
    ) -> Result<()>;
}

/// Builds SMS packets and hands them to the device's packet sender
///
/// Packets are queued as `(device_id, packet)` pairs, the same shape plugins
/// use to send proactive packets.
pub struct PacketSmsTransport {
    device_id: String,
    packet_sender: Sender<(String, Packet)>,
    messages_per_request: Option<i32>,
}

impl PacketSmsTransport {
    pub fn new(device_id: impl Into<String>, packet_sender: Sender<(String, Packet)>) -> Self {
        Self {
            device_id: device_id.into(),
            packet_sender,
            messages_per_request: None,
        }
    }

    /// Builder pattern: Limit the number of messages per conversation request
    pub fn with_messages_per_request(mut self, count: Option<i32>) -> Self {
        self.messages_per_request = count;
        self
    }

    async fn send_packet(&self, packet: Packet) -> Result<()> {
        self.packet_sender
            .send((self.device_id.clone(), packet))
            .await
            .map_err(|_| {
                ConversationError::Transport(format!(
                    "Packet channel for {} is closed",
                    self.device_id
                ))
            })
    }
}

#[async_trait]
impl SmsTransport for PacketSmsTransport {
    async fn request_conversation(&self, thread_id: ThreadId) -> Result<()> {
        self.send_packet(create_conversation_request(
            thread_id,
            None,
            self.messages_per_request,
        ))
        .await
    }

    async fn request_all_conversations(&self) -> Result<()> {
        self.send_packet(create_conversations_request()).await
    }

    async fn send_sms(
        &self,
        address: &str,
        body: &str,
        subscription_id: Option<i64>,
    ) -> Result<()> {
        self.send_packet(create_send_sms_request(address, body, subscription_id))
            .await
    }
}

/// Create a request for conversation list
///
/// Requests the latest message in each thread.
pub fn create_conversations_request() -> Packet {
    debug!("Creating conversations list request");
    Packet::new(PACKET_TYPE_SMS_REQUEST_CONVERSATIONS, json!({}))
}

/// Create a request for messages in a conversation
///
/// # Arguments
///
/// * `thread_id` - The conversation thread ID
/// * `start_timestamp` - Optional earliest message timestamp (ms since epoch)
/// * `count` - Optional maximum number of messages to return
pub fn create_conversation_request(
    thread_id: ThreadId,
    start_timestamp: Option<i64>,
    count: Option<i32>,
) -> Packet {
    debug!("Creating conversation request for thread {}", thread_id);

    let mut body = json!({
        "threadID": thread_id,
    });

    if let Some(ts) = start_timestamp {
        body["rangeStartTimestamp"] = json!(ts);
    }

    if let Some(n) = count {
        body["numberToRequest"] = json!(n);
    }

    Packet::new(PACKET_TYPE_SMS_REQUEST_CONVERSATION, body)
}

/// Create a request to send an SMS
pub fn create_send_sms_request(
    phone_number: &str,
    message: &str,
    subscription_id: Option<i64>,
) -> Packet {
    debug!("Creating send SMS request to {}", phone_number);

    let mut body = json!({
        "sendSms": true,
        "phoneNumber": phone_number,
        "messageBody": message,
    });

    if let Some(sub_id) = subscription_id {
        body["subID"] = json!(sub_id);
    }

    Packet::new(PACKET_TYPE_SMS_REQUEST, body)
}

#[derive(Deserialize)]
struct SmsMessagesBody {
    #[serde(default)]
    messages: Vec<Message>,
}

/// Decode the messages carried by a `cconnect.sms.messages` packet
///
/// # Errors
///
/// Returns `ConversationError::InvalidPacket` for other packet types or a
/// malformed body.
pub fn parse_messages_packet(packet: &Packet) -> Result<Vec<Message>> {
    if !packet.is_type(PACKET_TYPE_SMS_MESSAGES) {
        return Err(ConversationError::InvalidPacket(format!(
            "Expected {}, got {}",
            PACKET_TYPE_SMS_MESSAGES, packet.packet_type
        )));
    }

    let body: SmsMessagesBody = serde_json::from_value(packet.body.clone())
        .map_err(|e| ConversationError::InvalidPacket(format!("Failed to parse SMS: {}", e)))?;

    Ok(body.messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_create_conversations_request() {
        let packet = create_conversations_request();

        assert_eq!(packet.packet_type, "cconnect.sms.request_conversations");
        assert!(packet.body.as_object().unwrap().is_empty());
    }

    #[test]
    fn test_create_conversation_request() {
        let packet = create_conversation_request(123, Some(1000000), Some(50));

        assert_eq!(packet.packet_type, "cconnect.sms.request_conversation");
        assert_eq!(packet.body["threadID"], 123);
        assert_eq!(packet.body["rangeStartTimestamp"], 1000000);
        assert_eq!(packet.body["numberToRequest"], 50);
    }

    #[test]
    fn test_create_send_sms_request() {
        let packet = create_send_sms_request("+1234567890", "Hello!", Some(2));

        assert_eq!(packet.packet_type, "cconnect.sms.request");
        assert_eq!(packet.body["sendSms"], true);
        assert_eq!(packet.body["phoneNumber"], "+1234567890");
        assert_eq!(packet.body["messageBody"], "Hello!");
        assert_eq!(packet.body["subID"], 2);

        let packet = create_send_sms_request("+1234567890", "Hello!", None);
        assert!(packet.body.get("subID").is_none());
    }

    #[test]
    fn test_parse_messages_packet() {
        let packet = Packet::new(
            "kdeconnect.sms.messages",
            json!({
                "messages": [
                    { "_id": 1, "thread_id": 7, "date": 10, "body": "a",
                      "addresses": [{ "address": "+1" }] },
                    { "_id": 2, "thread_id": 7, "date": 20, "body": "b",
                      "addresses": [{ "address": "+1" }] }
                ]
            }),
        );

        let messages = parse_messages_packet(&packet).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].body(), "b");
    }

    #[test]
    fn test_parse_rejects_other_packets() {
        let packet = Packet::new("cconnect.ping", json!({}));
        assert!(matches!(
            parse_messages_packet(&packet),
            Err(ConversationError::InvalidPacket(_))
        ));

        let packet = Packet::new(PACKET_TYPE_SMS_MESSAGES, json!({ "messages": 5 }));
        assert!(matches!(
            parse_messages_packet(&packet),
            Err(ConversationError::InvalidPacket(_))
        ));
    }

    #[tokio::test]
    async fn test_packet_transport_queues_packets() {
        let (tx, mut rx) = mpsc::channel(8);
        let transport = PacketSmsTransport::new("phone-1", tx).with_messages_per_request(Some(25));

        transport.request_conversation(42).await.unwrap();
        transport.request_all_conversations().await.unwrap();
        transport.send_sms("+1555", "On my way", None).await.unwrap();

        let (device_id, packet) = rx.recv().await.unwrap();
        assert_eq!(device_id, "phone-1");
        assert_eq!(packet.packet_type, PACKET_TYPE_SMS_REQUEST_CONVERSATION);
        assert_eq!(packet.body["threadID"], 42);
        assert_eq!(packet.body["numberToRequest"], 25);

        let (_, packet) = rx.recv().await.unwrap();
        assert_eq!(packet.packet_type, PACKET_TYPE_SMS_REQUEST_CONVERSATIONS);

        let (_, packet) = rx.recv().await.unwrap();
        assert_eq!(packet.packet_type, PACKET_TYPE_SMS_REQUEST);
        assert_eq!(packet.body["messageBody"], "On my way");
    }

    #[tokio::test]
    async fn test_packet_transport_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let transport = PacketSmsTransport::new("phone-1", tx);

        let result = transport.request_all_conversations().await;
        assert!(matches!(result, Err(ConversationError::Transport(_))));
    }
}
