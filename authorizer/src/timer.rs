//! Single-shot timers
//!
//! Each [`Timer`] owns a thread that sleeps until the armed deadline and
//! then calls its callback with the generation that was armed. Re-arming or
//! disarming bumps the generation, so a callback racing with either can
//! tell it is stale by asking [`Timer::is_current`] under the caller's own
//! lock.

use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::trace;

/// Identifies one arming of a timer
pub type Generation = u64;

#[derive(Debug, Default)]
struct State {
    deadline: Option<(Instant, Generation)>,
    generation: Generation,
    shutdown: bool,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<State>,
    wake: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A re-armable single-shot timer
#[derive(Debug)]
pub struct Timer {
    name: &'static str,
    shared: Arc<Shared>,
}

impl Timer {
    /// A timer with no thread yet; see [`start`](Self::start)
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            shared: Arc::default(),
        }
    }

    /// Start the timer thread
    ///
    /// `on_fire` runs on that thread, without any timer lock held.
    pub fn start<F>(&self, on_fire: F) -> io::Result<()>
    where
        F: Fn(Generation) + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        thread::Builder::new()
            .name(format!("authorizer-{}", self.name))
            .spawn(move || run(&shared, on_fire))?;
        Ok(())
    }

    /// Fire once after `after`, replacing any earlier arming
    pub fn arm(&self, after: Duration) -> Generation {
        let mut state = self.shared.lock();
        state.generation += 1;
        state.deadline = Some((Instant::now() + after, state.generation));
        self.shared.wake.notify_all();
        trace!(timer = self.name, ?after, generation = state.generation, "Timer armed");
        state.generation
    }

    pub fn disarm(&self) {
        let mut state = self.shared.lock();
        state.generation += 1;
        state.deadline = None;
        self.shared.wake.notify_all();
    }

    /// Whether `generation` is still the latest arming
    pub fn is_current(&self, generation: Generation) -> bool {
        self.shared.lock().generation == generation
    }

    pub fn is_armed(&self) -> bool {
        self.shared.lock().deadline.is_some()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.shared.lock().shutdown = true;
        self.shared.wake.notify_all();
    }
}

fn run<F: Fn(Generation)>(shared: &Shared, on_fire: F) {
    let mut state = shared.lock();
    loop {
        if state.shutdown {
            return;
        }

        state = match state.deadline {
            None => shared
                .wake
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner),
            Some((deadline, generation)) => {
                let now = Instant::now();
                if now >= deadline {
                    state.deadline = None;
                    drop(state);
                    on_fire(generation);
                    shared.lock()
                } else {
                    shared
                        .wake
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            }
        };
    }
}
