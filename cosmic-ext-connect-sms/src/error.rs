//! Error handling for SMS conversations
//!
//! This module provides the error type shared by the conversation store, the
//! fetch coordinator and the reply path. Errors are converted from underlying
//! library errors using `thiserror`.
//!
//! ## Error Handling Patterns
//!
//! ### Basic Usage
//!
//! ```rust
//! use cosmic_ext_connect_sms::Result;
//!
//! fn parse(data: &str) -> Result<serde_json::Value> {
//!     // JSON errors are converted using the From trait
//!     let value: serde_json::Value = serde_json::from_str(data)?;
//!     Ok(value)
//! }
//! ```
//!
//! ### Error Matching
//!
//! Reply validation failures are ordinary, recoverable conditions:
//!
//! ```rust
//! use cosmic_ext_connect_sms::ConversationError;
//!
//! fn describe(error: &ConversationError) -> &'static str {
//!     match error {
//!         ConversationError::EmptyConversation(_) => "nothing to reply to",
//!         ConversationError::UnsupportedGroupReply(_)
//!         | ConversationError::UnsupportedMultiRecipient { .. } => "group replies are not supported",
//!         _ => "other",
//!     }
//! }
//! ```
//!
//! ## Error Categories
//!
//! ### Caller Errors
//! Rejected at the boundary before any state is touched:
//! - `InvalidRange`: negative or inverted history window
//! - `NoRecipients`: send requested with an empty address list
//!
//! ### Reply Validation
//! - `EmptyConversation`: the thread has no messages
//! - `UnsupportedGroupReply`: the latest message is a group (multitarget) message
//! - `UnsupportedMultiRecipient`: the latest message has more than one address
//!
//! ### Collaborator Errors
//! - `Transport`: the remote side could not be asked for data
//! - `Timeout`: a bounded fetch wait elapsed (only when configured)
//! - `InvalidPacket`: an inbound packet could not be decoded

use thiserror::Error;

/// Result type for conversation operations
pub type Result<T> = std::result::Result<T, ConversationError>;

/// Errors that can occur while working with SMS conversations
///
/// None of these are fatal to a store: every variant is reported to the
/// immediate caller and the store stays usable.
///
/// # Examples
///
/// ```rust
/// use cosmic_ext_connect_sms::ConversationError;
///
/// let error = ConversationError::EmptyConversation(42);
/// assert_eq!(error.to_string(), "Conversation 42 has no messages");
///
/// let error = ConversationError::InvalidRange { start: 5, end: 2 };
/// assert_eq!(error.to_string(), "Invalid message range: 5..2");
/// ```
#[derive(Error, Debug)]
pub enum ConversationError {
    /// I/O error (reading configuration, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// History window with negative or inverted bounds
    #[error("Invalid message range: {start}..{end}")]
    InvalidRange { start: i64, end: i64 },

    /// Reply requested for a thread with no known messages
    #[error("Conversation {0} has no messages")]
    EmptyConversation(i64),

    /// Reply requested for a group MMS thread
    #[error("Replying to group conversation {0} is not supported")]
    UnsupportedGroupReply(i64),

    /// Reply requested for a thread whose latest message has several recipients
    #[error("Conversation {thread_id} has {recipients} recipients, replies to multiple recipients are not supported")]
    UnsupportedMultiRecipient { thread_id: i64, recipients: usize },

    /// Send requested without any address
    #[error("No recipient address given")]
    NoRecipients,

    /// The transport collaborator refused or failed a request
    #[error("Transport error: {0}")]
    Transport(String),

    /// Bounded wait for a remote fetch elapsed
    #[error("Timed out waiting for conversation {0}")]
    Timeout(i64),

    /// Invalid or malformed packet
    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ConversationError {
    /// Check if this error is transient and the operation may be retried
    ///
    /// # Examples
    ///
    /// ```rust
    /// use cosmic_ext_connect_sms::ConversationError;
    ///
    /// assert!(ConversationError::Timeout(7).is_recoverable());
    /// assert!(!ConversationError::UnsupportedGroupReply(7).is_recoverable());
    /// ```
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ConversationError::Timeout(_)
                | ConversationError::Transport(_)
                | ConversationError::Io(_)
        )
    }

    /// Get a user-friendly error message suitable for display in UI
    pub fn user_message(&self) -> String {
        match self {
            ConversationError::EmptyConversation(_) => {
                "This conversation has no messages yet. Try refreshing it first.".to_string()
            }
            ConversationError::UnsupportedGroupReply(_) => {
                "Replying to group messages is not supported yet.".to_string()
            }
            ConversationError::UnsupportedMultiRecipient { recipients, .. } => {
                format!(
                    "Replying to {} recipients at once is not supported yet.",
                    recipients
                )
            }
            ConversationError::NoRecipients => "Enter at least one phone number.".to_string(),
            ConversationError::InvalidRange { start, end } => {
                format!("Invalid message range {}..{}.", start, end)
            }
            ConversationError::Timeout(_) => {
                "The phone did not answer in time. Check that it is connected.".to_string()
            }
            ConversationError::Transport(msg) => {
                format!("Could not reach the phone: {}.", msg)
            }
            ConversationError::InvalidPacket(msg) => {
                format!("Invalid data received: {}.", msg)
            }
            ConversationError::Configuration(msg) => {
                format!("Configuration error: {}. Check your settings.", msg)
            }
            ConversationError::Io(e) => format!("I/O error: {}.", e),
            ConversationError::Json(e) => format!("Data format error: {}.", e),
        }
    }
}
