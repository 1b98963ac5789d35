//! Per-device conversations interface
//!
//! [`Conversations`] is the live store of one paired phone. It combines the
//! [`ConversationStore`] bookkeeping, the [`FetchCoordinator`] that parks
//! callers waiting for history, the [`EventEmitter`] for observers, and the
//! [`SmsTransport`] used to reach the phone.
//!
//! ## Delivery Path
//!
//! ```text
//! packet ─▶ handle_packet ─▶ add_messages ─▶ store (write lock)
//!                                              ├─▶ created / updated / loaded events
//!                                              └─▶ fetch.resolve(touched) ─▶ wake callers
//! ```
//!
//! Fetch callers are only woken after the whole batch is in the store, so a
//! caller returning from [`Conversations::request_conversation`] already sees
//! the delivered messages.

use super::events::{ConversationEvent, ConversationObserver, EventEmitter};
use super::fetch::{FetchCoordinator, FetchOutcome};
use super::message::{Address, Message, ThreadId};
use super::store::ConversationStore;
use super::transport::{
    parse_messages_packet, PacketSmsTransport, SmsTransport, PACKET_TYPE_SMS_MESSAGES,
};
use crate::{ConversationError, ConversationsConfig, Packet, Result};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

/// Live conversation store of one device
pub struct Conversations {
    device_id: String,
    store: RwLock<ConversationStore>,
    fetch: FetchCoordinator,
    events: EventEmitter,
    transport: Arc<dyn SmsTransport>,
}

impl Conversations {
    /// Create an empty store using default configuration
    pub fn new(device_id: impl Into<String>, transport: Arc<dyn SmsTransport>) -> Self {
        Self::with_config(device_id, transport, &ConversationsConfig::default())
    }

    /// Create an empty store
    pub fn with_config(
        device_id: impl Into<String>,
        transport: Arc<dyn SmsTransport>,
        config: &ConversationsConfig,
    ) -> Self {
        let device_id = device_id.into();
        info!("Creating conversations store for device {}", device_id);

        Self {
            device_id,
            store: RwLock::new(ConversationStore::new()),
            fetch: FetchCoordinator::with_timeout(config.fetch_timeout()),
            events: EventEmitter::new(),
            transport,
        }
    }

    /// Create a store that talks to the phone over a packet channel
    pub fn for_device(
        device_id: impl Into<String>,
        packet_sender: mpsc::Sender<(String, Packet)>,
        config: &ConversationsConfig,
    ) -> Self {
        let device_id = device_id.into();
        let transport = PacketSmsTransport::new(device_id.clone(), packet_sender)
            .with_messages_per_request(config.messages_per_request);
        Self::with_config(device_id, Arc::new(transport), config)
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Register an observer for conversation events
    pub fn subscribe(&self, observer: Arc<dyn ConversationObserver>) {
        self.events.subscribe(observer);
    }

    /// Receive conversation events over a channel
    pub fn subscribe_channel(&self) -> mpsc::UnboundedReceiver<ConversationEvent> {
        self.events.subscribe_channel()
    }

    /// Add messages delivered by the phone
    ///
    /// Publishes the resulting events, then releases callers waiting for any
    /// touched conversation. Returns the touched thread ids.
    pub async fn add_messages<I>(&self, batch: I) -> BTreeSet<ThreadId>
    where
        I: IntoIterator<Item = Message>,
    {
        let outcome = {
            let mut store = self.store.write().await;
            let outcome = store.add_messages(batch);
            // Published under the write lock so concurrent batches cannot
            // interleave their events
            self.events.emit_all(&outcome.events);
            outcome
        };

        debug!(
            "Device {}: {} new messages across {} conversations",
            self.device_id,
            outcome.inserted,
            outcome.touched.len()
        );

        self.fetch.resolve(&outcome.touched);
        outcome.touched
    }

    /// Handle a packet from the phone
    ///
    /// `cconnect.sms.messages` packets are added to the store; other packet
    /// types are ignored.
    ///
    /// # Errors
    ///
    /// Returns `ConversationError::InvalidPacket` if an SMS packet cannot be decoded.
    pub async fn handle_packet(&self, packet: &Packet) -> Result<()> {
        if !packet.is_type(PACKET_TYPE_SMS_MESSAGES) {
            warn!("Unexpected packet type: {}", packet.packet_type);
            return Ok(());
        }

        let messages = parse_messages_packet(packet)?;
        debug!(
            "Received {} SMS messages from {}",
            messages.len(),
            self.device_id
        );
        self.add_messages(messages).await;
        Ok(())
    }

    /// Newest message of every conversation, for a conversation list
    pub async fn active_conversations(&self) -> Vec<Arc<Message>> {
        self.store.read().await.latest_message_per_conversation()
    }

    /// Full history of a conversation, oldest first
    pub async fn get_conversation(&self, thread_id: ThreadId) -> Vec<Arc<Message>> {
        self.store.read().await.conversation(thread_id)
    }

    /// Number of distinct messages known for a conversation
    pub async fn message_count(&self, thread_id: ThreadId) -> usize {
        self.store.read().await.message_count(thread_id)
    }

    /// Accept a message removal from the phone
    ///
    /// Removal is not implemented yet; see [`ConversationStore::remove_message`].
    pub async fn remove_message(&self, internal_id: &str) {
        self.store.write().await.remove_message(internal_id);
    }

    /// Fetch a conversation from the phone and wait until it is delivered
    ///
    /// Only one request per conversation is in flight at a time. If one is
    /// already outstanding this returns [`FetchOutcome::AlreadyInFlight`]
    /// immediately, without waiting for it.
    pub async fn request_conversation(&self, thread_id: ThreadId) -> Result<FetchOutcome> {
        let transport = Arc::clone(&self.transport);
        self.fetch
            .request(thread_id, || async move {
                transport.request_conversation(thread_id).await
            })
            .await
    }

    /// Messages `start..end` of a conversation, counted from the newest
    ///
    /// Fetches the conversation from the phone first when fewer than `end`
    /// messages are known. The result is newest first and clamped to the
    /// messages that are actually known.
    ///
    /// # Errors
    ///
    /// Returns `ConversationError::InvalidRange` for negative bounds or
    /// `end < start`, before anything is requested.
    pub async fn request_conversation_range(
        &self,
        thread_id: ThreadId,
        start: i64,
        end: i64,
    ) -> Result<Vec<Arc<Message>>> {
        if start < 0 || end < 0 {
            warn!("request_conversation_range: start and end must be >= 0");
            return Err(ConversationError::InvalidRange { start, end });
        }
        if end < start {
            warn!("request_conversation_range: start must be before end");
            return Err(ConversationError::InvalidRange { start, end });
        }

        let known = self.message_count(thread_id).await;
        if (known as i64) < end {
            let outcome = self.request_conversation(thread_id).await?;
            debug!(
                "Conversation {} fetch finished with {:?}",
                thread_id, outcome
            );
        }

        let history = self.get_conversation(thread_id).await;
        Ok(history
            .into_iter()
            .rev()
            .skip(start as usize)
            .take((end - start) as usize)
            .collect())
    }

    /// Ask the phone for the latest message of every conversation
    pub async fn request_all_conversation_threads(&self) -> Result<()> {
        debug!("Requesting all conversation threads from {}", self.device_id);
        self.transport.request_all_conversations().await
    }

    /// Reply to a conversation
    ///
    /// The reply goes to the single address of the conversation's newest
    /// message, from the same SIM subscription.
    ///
    /// # Errors
    ///
    /// - `EmptyConversation` if no message of the thread is known
    /// - `UnsupportedGroupReply` if the newest message is a group message
    /// - `UnsupportedMultiRecipient` if the newest message has several addresses
    pub async fn reply_to_conversation(&self, thread_id: ThreadId, body: &str) -> Result<()> {
        let latest = self.store.read().await.latest_message(thread_id);

        let Some(latest) = latest else {
            warn!("Got a conversationID for a conversation with no messages!");
            return Err(ConversationError::EmptyConversation(thread_id));
        };

        if latest.is_multitarget() {
            warn!("Tried to reply to a group MMS, which is not supported");
            return Err(ConversationError::UnsupportedGroupReply(thread_id));
        }

        let address = match latest.addresses() {
            [address] => address,
            [] => return Err(ConversationError::NoRecipients),
            addresses => {
                warn!("Sending replies to multiple recipients is not supported");
                return Err(ConversationError::UnsupportedMultiRecipient {
                    thread_id,
                    recipients: addresses.len(),
                });
            }
        };

        self.transport
            .send_sms(&address.address, body, Some(latest.subscription_id()))
            .await
    }

    /// Send a message that does not belong to a known conversation
    ///
    /// Only the first address is used.
    pub async fn send_without_conversation(&self, addresses: &[Address], body: &str) -> Result<()> {
        let first = addresses.first().ok_or(ConversationError::NoRecipients)?;
        self.transport.send_sms(&first.address, body, None).await
    }

    /// Release every caller waiting for a fetch and refuse further fetches
    pub fn shutdown(&self) {
        info!("Shutting down conversations store for device {}", self.device_id);
        self.fetch.shutdown();
    }

    pub fn is_shut_down(&self) -> bool {
        self.fetch.is_shut_down()
    }

    /// Number of conversations with an outstanding fetch
    pub fn pending_requests(&self) -> usize {
        self.fetch.in_flight_count()
    }
}

impl Drop for Conversations {
    fn drop(&mut self) {
        self.fetch.shutdown();
    }
}
