//! Conversation events
//!
//! The store reports three kinds of changes:
//!
//! - **Created**: the first message of a thread became known
//! - **Updated**: a message became the newest one of an existing thread
//! - **Loaded**: a delivery touched a thread; carries the number of known messages
//!
//! Observers register with an [`EventEmitter`] and are called synchronously,
//! in emission order. For one delivered batch, every created/updated event
//! precedes the loaded events, and each touched thread gets exactly one
//! loaded event.
//!
//! Observers run while the store is locked for writing and must not call back
//! into the store. Forward the event (for example over a channel) instead;
//! [`EventEmitter::subscribe_channel`] does exactly that.

use super::message::{Message, ThreadId};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;
use tracing::debug;

/// A change to the set of known conversations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationEvent {
    /// First message of a new conversation
    Created(Arc<Message>),
    /// New latest message of an existing conversation
    Updated(Arc<Message>),
    /// A delivery touched this conversation
    Loaded {
        thread_id: ThreadId,
        message_count: usize,
    },
}

impl ConversationEvent {
    /// Thread the event refers to
    pub fn thread_id(&self) -> ThreadId {
        match self {
            Self::Created(message) | Self::Updated(message) => message.thread_id(),
            Self::Loaded { thread_id, .. } => *thread_id,
        }
    }
}

/// Receives conversation events
///
/// All methods default to doing nothing, so observers only implement what
/// they care about.
pub trait ConversationObserver: Send + Sync {
    fn conversation_created(&self, _message: &Arc<Message>) {}

    fn conversation_updated(&self, _message: &Arc<Message>) {}

    fn conversation_loaded(&self, _thread_id: ThreadId, _message_count: usize) {}

    /// Whether this observer will never accept events again
    ///
    /// Closed observers are dropped by the emitter.
    fn is_closed(&self) -> bool {
        false
    }
}

impl ConversationObserver for mpsc::UnboundedSender<ConversationEvent> {
    fn conversation_created(&self, message: &Arc<Message>) {
        let _ = self.send(ConversationEvent::Created(Arc::clone(message)));
    }

    fn conversation_updated(&self, message: &Arc<Message>) {
        let _ = self.send(ConversationEvent::Updated(Arc::clone(message)));
    }

    fn conversation_loaded(&self, thread_id: ThreadId, message_count: usize) {
        let _ = self.send(ConversationEvent::Loaded {
            thread_id,
            message_count,
        });
    }

    fn is_closed(&self) -> bool {
        mpsc::UnboundedSender::is_closed(self)
    }
}

/// Fans conversation events out to registered observers
#[derive(Default)]
pub struct EventEmitter {
    observers: RwLock<Vec<Arc<dyn ConversationObserver>>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer
    pub fn subscribe(&self, observer: Arc<dyn ConversationObserver>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    /// Register a channel observer and return its receiving end
    pub fn subscribe_channel(&self) -> mpsc::UnboundedReceiver<ConversationEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribe(Arc::new(tx));
        rx
    }

    #[cfg(test)]
    fn observer_count(&self) -> usize {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Deliver events to every observer, in order
    pub fn emit_all(&self, events: &[ConversationEvent]) {
        if events.is_empty() {
            return;
        }

        let mut saw_closed = false;
        {
            let observers = self.observers.read().unwrap_or_else(PoisonError::into_inner);
            for observer in observers.iter() {
                if observer.is_closed() {
                    saw_closed = true;
                    continue;
                }
                for event in events {
                    dispatch(observer.as_ref(), event);
                }
            }
        }

        if saw_closed {
            let mut observers = self
                .observers
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let before = observers.len();
            observers.retain(|observer| !observer.is_closed());
            debug!(
                "Dropped {} closed conversation observers",
                before - observers.len()
            );
        }
    }
}

fn dispatch(observer: &dyn ConversationObserver, event: &ConversationEvent) {
    match event {
        ConversationEvent::Created(message) => observer.conversation_created(message),
        ConversationEvent::Updated(message) => observer.conversation_updated(message),
        ConversationEvent::Loaded {
            thread_id,
            message_count,
        } => observer.conversation_loaded(*thread_id, *message_count),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct LoadedCounter {
        loaded: Mutex<Vec<(ThreadId, usize)>>,
    }

    impl ConversationObserver for LoadedCounter {
        fn conversation_loaded(&self, thread_id: ThreadId, message_count: usize) {
            self.loaded.lock().unwrap().push((thread_id, message_count));
        }
    }

    fn message(uid: i64, thread_id: ThreadId) -> Arc<Message> {
        Arc::new(Message::new(uid, thread_id, 10, vec![], "body"))
    }

    #[test]
    fn test_channel_observer_receives_in_order() {
        let emitter = EventEmitter::new();
        let mut rx = emitter.subscribe_channel();

        let first = message(1, 5);
        emitter.emit_all(&[
            ConversationEvent::Created(Arc::clone(&first)),
            ConversationEvent::Loaded {
                thread_id: 5,
                message_count: 1,
            },
        ]);

        assert_eq!(rx.try_recv().unwrap(), ConversationEvent::Created(first));
        assert_eq!(
            rx.try_recv().unwrap(),
            ConversationEvent::Loaded {
                thread_id: 5,
                message_count: 1
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_partial_observer_uses_defaults() {
        let emitter = EventEmitter::new();
        let counter = Arc::new(LoadedCounter::default());
        emitter.subscribe(counter.clone());

        emitter.emit_all(&[
            ConversationEvent::Updated(message(2, 9)),
            ConversationEvent::Loaded {
                thread_id: 9,
                message_count: 4,
            },
        ]);

        assert_eq!(*counter.loaded.lock().unwrap(), vec![(9, 4)]);
    }

    #[test]
    fn test_closed_channel_is_dropped() {
        let emitter = EventEmitter::new();
        let rx = emitter.subscribe_channel();
        let _kept = emitter.subscribe_channel();
        assert_eq!(emitter.observer_count(), 2);

        drop(rx);
        emitter.emit_all(&[ConversationEvent::Loaded {
            thread_id: 1,
            message_count: 1,
        }]);

        assert_eq!(emitter.observer_count(), 1);
    }

    #[test]
    fn test_event_thread_id() {
        assert_eq!(ConversationEvent::Created(message(1, 3)).thread_id(), 3);
        assert_eq!(
            ConversationEvent::Loaded {
                thread_id: 8,
                message_count: 0
            }
            .thread_id(),
            8
        );
    }
}
