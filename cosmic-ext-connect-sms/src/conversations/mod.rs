//! SMS Conversations
//!
//! Keeps the text conversations of each paired phone in memory and pulls
//! history from the phone on demand.
//!
//! ## Components
//!
//! - [`Message`]: immutable message value decoded from `cconnect.sms.messages`
//! - [`ConversationStore`]: ordered, deduplicated per-thread histories
//! - [`FetchCoordinator`]: at most one outstanding history request per thread
//! - [`EventEmitter`]: fans created/updated/loaded events out to observers
//! - [`SmsTransport`]: outbound requests to the phone
//! - [`Conversations`]: the per-device store tying these together
//! - [`ConversationsRegistry`]: device id to store mapping
//!
//! ## Example
//!
//! ```rust,no_run
//! use cosmic_ext_connect_sms::conversations::{Conversations, PacketSmsTransport};
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//!
//! # async fn example() -> cosmic_ext_connect_sms::Result<()> {
//! let (packet_tx, _packet_rx) = mpsc::channel(100);
//! let transport = Arc::new(PacketSmsTransport::new("phone-id", packet_tx));
//! let conversations = Conversations::new("phone-id", transport);
//!
//! let mut events = conversations.subscribe_channel();
//! conversations.request_all_conversation_threads().await?;
//!
//! while let Some(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```

mod events;
mod fetch;
mod interface;
mod message;
mod registry;
mod store;
mod transport;

pub use events::{ConversationEvent, ConversationObserver, EventEmitter};
pub use fetch::{FetchCoordinator, FetchOutcome};
pub use interface::Conversations;
pub use message::{
    Address, Message, MessageId, MessageKind, ThreadId, EVENT_MULTI_TARGET, EVENT_TEXT_MESSAGE,
    UNKNOWN_SUBSCRIPTION_ID,
};
pub use registry::ConversationsRegistry;
pub use store::{BatchOutcome, ConversationStore};
pub use transport::{
    create_conversation_request, create_conversations_request, create_send_sms_request,
    parse_messages_packet, PacketSmsTransport, SmsTransport, PACKET_TYPE_SMS_MESSAGES,
    PACKET_TYPE_SMS_REQUEST, PACKET_TYPE_SMS_REQUEST_CONVERSATION,
    PACKET_TYPE_SMS_REQUEST_CONVERSATIONS,
};
