//! Remote fetch coordination
//!
//! Tracks which conversations have an outstanding history request to the
//! phone and parks the requesting caller until the messages arrive.
//!
//! ## State Machine
//!
//! ```text
//!          request (dispatch)
//!   Idle ───────────────────────▶ InFlight
//!    ▲                              │
//!    └──── resolve / shutdown ──────┘
//! ```
//!
//! - A conversation is dispatched to the phone at most once while in flight.
//!   A second request for the same conversation returns
//!   [`FetchOutcome::AlreadyInFlight`] immediately, without waiting for the
//!   first one. It gets no guarantee that the history is complete when it
//!   returns.
//! - [`FetchCoordinator::resolve`] takes the delivered threads out of flight
//!   and wakes every parked caller; each re-checks its own conversation.
//! - [`FetchCoordinator::shutdown`] empties the in-flight set and wakes
//!   everyone, so tearing a store down never leaves a caller parked. Requests
//!   made after shutdown return [`FetchOutcome::Cancelled`] without
//!   dispatching.
//! - A request whose future is dropped before it settles, for example by an
//!   outer timeout, takes its conversation out of flight so the next request
//!   dispatches again.
//!
//! The in-flight set lives behind one mutex which is never held while the
//! request is dispatched or while a caller is parked.

use super::message::ThreadId;
use crate::{ConversationError, Result};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// How a conversation request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Messages for the conversation were delivered
    Completed,
    /// Another caller already has a request in flight; nothing was dispatched
    AlreadyInFlight,
    /// The store was shut down before (or while) waiting
    Cancelled,
}

#[derive(Debug, Default)]
struct FetchState {
    /// In-flight conversations and the ticket of the request that owns them
    in_flight: HashMap<ThreadId, u64>,
    next_ticket: u64,
    shut_down: bool,
}

/// Serializes remote history requests per conversation
#[derive(Debug, Default)]
pub struct FetchCoordinator {
    state: Mutex<FetchState>,
    wakeup: Notify,
    timeout: Option<Duration>,
}

impl FetchCoordinator {
    /// Coordinator whose callers wait until resolve or shutdown
    pub fn new() -> Self {
        Self::default()
    }

    /// Coordinator with an optional upper bound on each wait
    ///
    /// When the bound elapses the conversation leaves the in-flight set, so a
    /// later request dispatches again, and the caller gets
    /// [`ConversationError::Timeout`].
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    /// Request a conversation and wait for it to be delivered
    ///
    /// `dispatch` asks the phone for the conversation. It runs without the
    /// lock held and only when no request for `thread_id` is in flight.
    ///
    /// # Errors
    ///
    /// Returns the dispatch error if the request could not be sent (the
    /// conversation is taken out of flight again), or
    /// [`ConversationError::Timeout`] if a configured bound elapsed.
    pub async fn request<F, Fut>(&self, thread_id: ThreadId, dispatch: F) -> Result<FetchOutcome>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let ticket = {
            let mut state = self.lock_state();
            if state.shut_down {
                debug!(
                    "Not requesting conversation {}: store is shut down",
                    thread_id
                );
                return Ok(FetchOutcome::Cancelled);
            }
            if state.in_flight.contains_key(&thread_id) {
                debug!(
                    "Not allowing two callers to wait for conversation {}",
                    thread_id
                );
                return Ok(FetchOutcome::AlreadyInFlight);
            }
            let ticket = state.next_ticket;
            state.next_ticket += 1;
            state.in_flight.insert(thread_id, ticket);
            ticket
        };

        // Dropping the request future before it settles releases the entry
        let _entry = InFlightEntry {
            coordinator: self,
            thread_id,
            ticket,
        };

        debug!("Requesting conversation {} from remote", thread_id);
        if let Err(e) = dispatch().await {
            warn!("Failed to request conversation {}: {}", thread_id, e);
            return Err(e);
        }

        match self.timeout {
            None => Ok(self.wait_until_settled(thread_id, ticket).await),
            Some(limit) => {
                match tokio::time::timeout(limit, self.wait_until_settled(thread_id, ticket)).await
                {
                    Ok(outcome) => Ok(outcome),
                    Err(_) => {
                        warn!(
                            "Conversation {} not delivered within {:?}",
                            thread_id, limit
                        );
                        Err(ConversationError::Timeout(thread_id))
                    }
                }
            }
        }
    }

    /// Take delivered conversations out of flight and wake all parked callers
    pub fn resolve<'a, I>(&self, touched: I)
    where
        I: IntoIterator<Item = &'a ThreadId>,
    {
        {
            let mut state = self.lock_state();
            for thread_id in touched {
                if state.in_flight.remove(thread_id).is_some() {
                    debug!("Conversation {} delivered", thread_id);
                }
            }
        }
        self.wakeup.notify_waiters();
    }

    /// Release every parked caller and refuse further requests
    ///
    /// Idempotent.
    pub fn shutdown(&self) {
        {
            let mut state = self.lock_state();
            if !state.shut_down {
                info!(
                    "Shutting down fetch coordinator, releasing {} pending requests",
                    state.in_flight.len()
                );
            }
            state.shut_down = true;
            state.in_flight.clear();
        }
        self.wakeup.notify_waiters();
    }

    /// Whether a request for the conversation is outstanding
    pub fn is_in_flight(&self, thread_id: ThreadId) -> bool {
        self.lock_state().in_flight.contains_key(&thread_id)
    }

    /// Number of outstanding requests
    pub fn in_flight_count(&self) -> usize {
        self.lock_state().in_flight.len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.lock_state().shut_down
    }

    async fn wait_until_settled(&self, thread_id: ThreadId, ticket: u64) -> FetchOutcome {
        loop {
            // Register for the wakeup before checking, so a resolve between
            // the check and the await is not lost
            let notified = self.wakeup.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let state = self.lock_state();
                if state.in_flight.get(&thread_id) != Some(&ticket) {
                    return if state.shut_down {
                        FetchOutcome::Cancelled
                    } else {
                        FetchOutcome::Completed
                    };
                }
            }

            notified.await;
        }
    }

    /// Drop our own in-flight entry, leaving newer requests alone
    fn release(&self, thread_id: ThreadId, ticket: u64) {
        let mut state = self.lock_state();
        if state.in_flight.get(&thread_id) == Some(&ticket) {
            debug!("Releasing request for conversation {}", thread_id);
            state.in_flight.remove(&thread_id);
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, FetchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// In-flight entry owned by one pending request
///
/// Released on drop unless resolve or shutdown already took it.
struct InFlightEntry<'a> {
    coordinator: &'a FetchCoordinator,
    thread_id: ThreadId,
    ticket: u64,
}

impl Drop for InFlightEntry<'_> {
    fn drop(&mut self) {
        self.coordinator.release(self.thread_id, self.ticket);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio_test::{assert_pending, assert_ready, task};

    async fn ok() -> Result<()> {
        Ok(())
    }

    #[test]
    fn test_request_blocks_until_resolved() {
        let coordinator = FetchCoordinator::new();
        let mut request = task::spawn(coordinator.request(7, ok));

        assert_pending!(request.poll());
        assert!(coordinator.is_in_flight(7));

        coordinator.resolve(&[7]);

        assert!(request.is_woken());
        let outcome = assert_ready!(request.poll()).unwrap();
        assert_eq!(outcome, FetchOutcome::Completed);
        assert!(!coordinator.is_in_flight(7));
    }

    #[test]
    fn test_resolve_other_thread_keeps_waiting() {
        let coordinator = FetchCoordinator::new();
        let mut request = task::spawn(coordinator.request(7, ok));
        assert_pending!(request.poll());

        coordinator.resolve(&[8]);

        assert_pending!(request.poll());
        assert!(coordinator.is_in_flight(7));
    }

    #[test]
    fn test_second_request_does_not_dispatch_or_wait() {
        let coordinator = FetchCoordinator::new();
        let counter = AtomicUsize::new(0);
        let dispatched = &counter;
        let dispatch = move || async move {
            dispatched.fetch_add(1, Ordering::SeqCst);
            Ok::<(), ConversationError>(())
        };

        let mut first = task::spawn(coordinator.request(7, dispatch));
        assert_pending!(first.poll());

        let mut second = task::spawn(coordinator.request(7, dispatch));
        let outcome = assert_ready!(second.poll()).unwrap();

        assert_eq!(outcome, FetchOutcome::AlreadyInFlight);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_shutdown_releases_waiters() {
        let coordinator = FetchCoordinator::new();
        let mut first = task::spawn(coordinator.request(9, ok));
        let mut second = task::spawn(coordinator.request(10, ok));
        assert_pending!(first.poll());
        assert_pending!(second.poll());

        coordinator.shutdown();

        assert_eq!(
            assert_ready!(first.poll()).unwrap(),
            FetchOutcome::Cancelled
        );
        assert_eq!(
            assert_ready!(second.poll()).unwrap(),
            FetchOutcome::Cancelled
        );
        assert_eq!(coordinator.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_request_after_shutdown_is_cancelled() {
        let coordinator = FetchCoordinator::new();
        coordinator.shutdown();
        coordinator.shutdown();

        let counter = AtomicUsize::new(0);
        let dispatched = &counter;
        let outcome = coordinator
            .request(1, move || async move {
                dispatched.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(outcome, FetchOutcome::Cancelled);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dispatch_failure_clears_in_flight() {
        let coordinator = FetchCoordinator::new();

        let result = coordinator
            .request(3, || async {
                Err(ConversationError::Transport("channel closed".to_string()))
            })
            .await;

        assert!(matches!(result, Err(ConversationError::Transport(_))));
        assert!(!coordinator.is_in_flight(3));
    }

    #[tokio::test]
    async fn test_bounded_wait_times_out() {
        let coordinator = FetchCoordinator::with_timeout(Some(Duration::from_millis(20)));

        let result = coordinator.request(4, ok).await;

        assert!(matches!(result, Err(ConversationError::Timeout(4))));
        assert!(!coordinator.is_in_flight(4));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_resolve_from_another_task() {
        let coordinator = Arc::new(FetchCoordinator::new());

        let waiter = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.request(5, ok).await })
        };

        while !coordinator.is_in_flight(5) {
            tokio::task::yield_now().await;
        }
        coordinator.resolve(&[5]);

        let outcome = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("waiter was not released")
            .unwrap()
            .unwrap();
        assert_eq!(outcome, FetchOutcome::Completed);
    }

    #[test]
    fn test_dropped_request_leaves_flight() {
        let coordinator = FetchCoordinator::new();
        let counter = AtomicUsize::new(0);
        let dispatched = &counter;
        let dispatch = move || async move {
            dispatched.fetch_add(1, Ordering::SeqCst);
            Ok::<(), ConversationError>(())
        };

        let mut abandoned = task::spawn(coordinator.request(7, dispatch));
        assert_pending!(abandoned.poll());
        assert!(coordinator.is_in_flight(7));

        drop(abandoned);
        assert!(!coordinator.is_in_flight(7));

        let mut retry = task::spawn(coordinator.request(7, dispatch));
        assert_pending!(retry.poll());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_outer_timeout_does_not_strand_thread() {
        let coordinator = FetchCoordinator::new();

        let elapsed = tokio::time::timeout(Duration::from_millis(20), coordinator.request(8, ok)).await;

        assert!(elapsed.is_err());
        assert!(!coordinator.is_in_flight(8));
        assert_eq!(coordinator.in_flight_count(), 0);
    }

    #[test]
    fn test_dropping_settled_request_keeps_newer_entry() {
        let coordinator = FetchCoordinator::new();
        let mut first = task::spawn(coordinator.request(6, ok));
        assert_pending!(first.poll());

        coordinator.resolve(&[6]);
        let mut second = task::spawn(coordinator.request(6, ok));
        assert_pending!(second.poll());

        drop(first);
        assert!(coordinator.is_in_flight(6));
    }

    #[test]
    fn test_rerequest_after_resolve_does_not_strand_first_caller() {
        let coordinator = FetchCoordinator::new();
        let mut first = task::spawn(coordinator.request(6, ok));
        assert_pending!(first.poll());

        coordinator.resolve(&[6]);
        let mut second = task::spawn(coordinator.request(6, ok));
        assert_pending!(second.poll());

        assert_eq!(
            assert_ready!(first.poll()).unwrap(),
            FetchOutcome::Completed
        );
        assert!(coordinator.is_in_flight(6));
    }
}
