//! Conversation store
//!
//! Pure bookkeeping for the messages of one device: per-thread histories
//! ordered by `(timestamp, arrival)`, plus per-thread sets of known message
//! ids used to drop re-deliveries before they reach the ordered history.
//!
//! The store never fails and never blocks. Locking, event delivery and fetch
//! wake-ups are the job of [`Conversations`](super::Conversations), which
//! wraps a store per device.

use super::events::ConversationEvent;
use super::message::{Message, MessageId, ThreadId};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Sort key of a message within its thread
///
/// Timestamps may collide; the arrival sequence breaks ties so the order is
/// total and stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct OrderKey {
    timestamp: i64,
    sequence: u64,
}

#[derive(Debug, Default)]
struct Conversation {
    messages: BTreeMap<OrderKey, Arc<Message>>,
}

impl Conversation {
    fn latest(&self) -> Option<&Arc<Message>> {
        self.messages.last_key_value().map(|(_, message)| message)
    }
}

/// Result of adding one batch of messages
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Every thread that had at least one message in the batch, duplicate or not
    pub touched: BTreeSet<ThreadId>,
    /// Events to publish, in order
    pub events: Vec<ConversationEvent>,
    /// Number of messages that were new
    pub inserted: usize,
}

/// Ordered, deduplicated message histories keyed by thread
#[derive(Debug, Default)]
pub struct ConversationStore {
    conversations: BTreeMap<ThreadId, Conversation>,
    known_messages: HashMap<ThreadId, HashSet<MessageId>>,
    next_sequence: u64,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a batch of messages, in input order
    ///
    /// Messages already known for their thread are skipped, but their thread
    /// still counts as touched: a caller waiting for that thread must be
    /// released even when the phone had nothing new to say.
    ///
    /// For each new message the outcome carries `Created` when it is the
    /// first message of its thread, `Updated` when it became the newest one,
    /// and nothing when it landed somewhere in the older history. After the
    /// per-message events, one `Loaded` event follows for every touched
    /// thread, in ascending thread order.
    pub fn add_messages<I>(&mut self, batch: I) -> BatchOutcome
    where
        I: IntoIterator<Item = Message>,
    {
        let mut outcome = BatchOutcome::default();

        for message in batch {
            let thread_id = message.thread_id();
            outcome.touched.insert(thread_id);

            let known = self.known_messages.entry(thread_id).or_default();
            if !known.insert(message.uid()) {
                debug!(
                    "Message {} already known in thread {}",
                    message.uid(),
                    thread_id
                );
                continue;
            }

            let key = OrderKey {
                timestamp: message.timestamp(),
                sequence: self.next_sequence,
            };
            self.next_sequence += 1;

            let conversation = self.conversations.entry(thread_id).or_default();
            let was_empty = conversation.messages.is_empty();
            let message = Arc::new(message);
            conversation.messages.insert(key, Arc::clone(&message));
            outcome.inserted += 1;

            let is_latest = conversation
                .messages
                .last_key_value()
                .is_some_and(|(latest, _)| *latest == key);

            if was_empty {
                outcome.events.push(ConversationEvent::Created(message));
            } else if is_latest {
                outcome.events.push(ConversationEvent::Updated(message));
            }
        }

        for &thread_id in &outcome.touched {
            outcome.events.push(ConversationEvent::Loaded {
                thread_id,
                message_count: self.message_count(thread_id),
            });
        }

        outcome
    }

    /// Newest message of every conversation, ordered by thread id
    pub fn latest_message_per_conversation(&self) -> Vec<Arc<Message>> {
        let mut latest = Vec::with_capacity(self.conversations.len());

        for (thread_id, conversation) in &self.conversations {
            match conversation.latest() {
                Some(message) => latest.push(Arc::clone(message)),
                None => {
                    warn!("Conversation with ID {} is unexpectedly empty", thread_id);
                }
            }
        }

        latest
    }

    /// Full history of a conversation, oldest first
    ///
    /// Unknown threads yield an empty history.
    pub fn conversation(&self, thread_id: ThreadId) -> Vec<Arc<Message>> {
        self.conversations
            .get(&thread_id)
            .map(|conversation| conversation.messages.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Newest message of a conversation
    pub fn latest_message(&self, thread_id: ThreadId) -> Option<Arc<Message>> {
        self.conversations
            .get(&thread_id)
            .and_then(Conversation::latest)
            .cloned()
    }

    /// Number of distinct messages known for a thread
    pub fn message_count(&self, thread_id: ThreadId) -> usize {
        self.known_messages
            .get(&thread_id)
            .map_or(0, HashSet::len)
    }

    /// Accepts a removal request from the phone without acting on it
    ///
    /// Removal is not implemented: the message stays in its history and its
    /// id stays known, so a re-delivery is still deduplicated.
    pub fn remove_message(&mut self, internal_id: &str) {
        debug!("Ignoring removal of message {}", internal_id);
    }

    #[cfg(test)]
    fn contains(&self, thread_id: ThreadId, uid: MessageId) -> bool {
        self.known_messages
            .get(&thread_id)
            .is_some_and(|known| known.contains(&uid))
    }

    #[cfg(test)]
    fn insert_empty_conversation(&mut self, thread_id: ThreadId) {
        self.conversations.entry(thread_id).or_default();
    }
}
