//! One-shot user prompts
//!
//! A consent dialog or presence prompt is shown asynchronously by the host, but
//! the command worker waits for its answer synchronously. [`prompt`] creates a
//! linked pair: the [`Prompt`] resolver handed to the UI, and the
//! [`PendingPrompt`] the worker waits on.
//!
//! A prompt settles exactly once. The first of [`Prompt::resolve`],
//! [`PendingPrompt::cancel`] or dropping the resolver wins; later attempts
//! are ignored.
//!
//! ```
//! use authorizer_ctap::prompt::{self, Outcome};
//!
//! let (resolver, pending) = prompt::prompt::<bool>();
//! std::thread::spawn(move || resolver.resolve(true));
//! assert_eq!(pending.wait(), Outcome::Resolved(true));
//! ```

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// State of a prompt as seen by the waiting side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome<T> {
    /// Not answered yet
    Pending,
    /// Answered by the user
    Resolved(T),
    /// Withdrawn by the authenticator, or the UI dropped it unanswered
    Cancelled,
}

impl<T> Outcome<T> {
    /// Whether the prompt has settled
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Debug)]
struct Slot<T> {
    state: Mutex<Outcome<T>>,
    settled: Condvar,
}

impl<T> Slot<T> {
    /// Move from pending to `outcome`; no-op once settled
    fn settle(&self, outcome: Outcome<T>) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.is_settled() {
            return false;
        }
        *state = outcome;
        self.settled.notify_all();
        true
    }
}

/// Type-erased cancellation of a pending prompt
trait Cancel: Send + Sync {
    fn cancel(&self);
}

impl<T: Send> Cancel for Slot<T> {
    fn cancel(&self) {
        self.settle(Outcome::Cancelled);
    }
}

/// Create a linked resolver and waiter
pub fn prompt<T>() -> (Prompt<T>, PendingPrompt<T>) {
    let slot = Arc::new(Slot {
        state: Mutex::new(Outcome::Pending),
        settled: Condvar::new(),
    });
    (
        Prompt {
            slot: Some(Arc::clone(&slot)),
        },
        PendingPrompt { slot },
    )
}

/// The answering side of a prompt, held by the UI
///
/// Dropping it without calling [`resolve`](Self::resolve) cancels the prompt.
#[derive(Debug)]
pub struct Prompt<T> {
    slot: Option<Arc<Slot<T>>>,
}

impl<T> Prompt<T> {
    /// Answer the prompt
    pub fn resolve(mut self, value: T) {
        if let Some(slot) = self.slot.take() {
            slot.settle(Outcome::Resolved(value));
        }
    }

    /// Whether the waiting side has already given up
    pub fn is_cancelled(&self) -> bool {
        self.slot.as_ref().is_some_and(|slot| {
            matches!(
                *slot.state.lock().unwrap_or_else(PoisonError::into_inner),
                Outcome::Cancelled
            )
        })
    }
}

impl<T> Drop for Prompt<T> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            slot.settle(Outcome::Cancelled);
        }
    }
}

/// The waiting side of a prompt
#[derive(Debug)]
pub struct PendingPrompt<T> {
    slot: Arc<Slot<T>>,
}

impl<T: Clone> PendingPrompt<T> {
    /// A prompt that is already answered
    pub fn resolved(value: T) -> Self {
        let (resolver, pending) = prompt();
        resolver.resolve(value);
        pending
    }

    /// Current state without blocking
    pub fn try_outcome(&self) -> Outcome<T> {
        self.slot
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Block until the prompt settles
    pub fn wait(&self) -> Outcome<T> {
        let mut state = self.slot.state.lock().unwrap_or_else(PoisonError::into_inner);
        while !state.is_settled() {
            state = self
                .slot
                .settled
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.clone()
    }

    /// Block until the prompt settles or `timeout` elapses
    ///
    /// Returns [`Outcome::Pending`] on timeout; the prompt stays open.
    pub fn wait_timeout(&self, timeout: Duration) -> Outcome<T> {
        let deadline = Instant::now() + timeout;
        let mut state = self.slot.state.lock().unwrap_or_else(PoisonError::into_inner);
        while !state.is_settled() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            state = self
                .slot
                .settled
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        state.clone()
    }
}

impl<T> PendingPrompt<T> {
    /// Withdraw the prompt, releasing any waiter
    pub fn cancel(&self) {
        self.slot.settle(Outcome::Cancelled);
    }
}

impl<T: Send + 'static> PendingPrompt<T> {
    /// A handle that cancels this prompt from another thread
    pub fn canceller(&self) -> Canceller {
        Canceller {
            slot: Arc::clone(&self.slot) as Arc<dyn Cancel>,
        }
    }
}

/// Cancels a prompt regardless of its answer type
#[derive(Clone)]
pub struct Canceller {
    slot: Arc<dyn Cancel>,
}

impl Canceller {
    /// Withdraw the prompt
    pub fn cancel(&self) {
        self.slot.cancel();
    }
}

impl std::fmt::Debug for Canceller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Canceller").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::thread;

    #[test]
    fn test_resolve_from_other_thread() {
        let (resolver, pending) = prompt::<bool>();
        assert_eq!(pending.try_outcome(), Outcome::Pending);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            resolver.resolve(true);
        });

        assert_eq!(pending.wait(), Outcome::Resolved(true));
        handle.join().unwrap();
    }

    #[test]
    fn test_drop_resolver_cancels() {
        let (resolver, pending) = prompt::<bool>();
        drop(resolver);
        assert_eq!(pending.wait(), Outcome::Cancelled);
    }

    #[test]
    fn test_cancel_releases_waiter() {
        let (resolver, pending) = prompt::<usize>();
        let canceller = pending.canceller();

        let waiter = thread::spawn(move || pending.wait());
        thread::sleep(Duration::from_millis(20));
        canceller.cancel();

        assert_eq!(waiter.join().unwrap(), Outcome::Cancelled);
        assert!(resolver.is_cancelled());
    }

    #[test]
    fn test_first_settlement_wins() {
        let (resolver, pending) = prompt::<bool>();
        pending.cancel();
        resolver.resolve(true);
        assert_eq!(pending.try_outcome(), Outcome::Cancelled);

        let (resolver, pending) = prompt::<bool>();
        resolver.resolve(false);
        pending.cancel();
        assert_eq!(pending.try_outcome(), Outcome::Resolved(false));
    }

    #[test]
    fn test_wait_timeout_leaves_prompt_open() {
        let (resolver, pending) = prompt::<bool>();
        assert_eq!(
            pending.wait_timeout(Duration::from_millis(10)),
            Outcome::Pending
        );

        resolver.resolve(true);
        assert_eq!(
            pending.wait_timeout(Duration::from_millis(10)),
            Outcome::Resolved(true)
        );
    }

    #[test]
    fn test_already_resolved() {
        let pending = PendingPrompt::resolved(3usize);
        assert_eq!(pending.wait(), Outcome::Resolved(3));
    }
}
