//! CConnect SMS Conversations
//!
//! This library keeps the SMS conversations of paired phones in memory,
//! enabling desktop clients to list threads, page through history and reply
//! without waiting on the phone for every view.
//!
//! Messages reach the store as `cconnect.sms.messages` packets. History that
//! is not known yet is requested from the phone, and the caller waits until
//! the phone delivers it.

pub mod config;
pub mod conversations;
pub mod packet;

mod error;

pub use config::ConversationsConfig;
pub use conversations::{
    Address, ConversationEvent, ConversationObserver, Conversations, ConversationsRegistry,
    FetchOutcome, Message, MessageId, MessageKind, SmsTransport, ThreadId,
};
pub use error::{ConversationError, Result};
pub use packet::{current_timestamp, Packet};
