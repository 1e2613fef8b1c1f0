//! Scripted user interaction
//!
//! Answers prompts with preset values instead of asking a person. Answers can
//! be queued per prompt, delayed, or withheld until the test releases them.

use crate::callbacks::{CallbackSet, ConsentRequest, PromptKind, UserInteraction};
use crate::memory::MemoryCredentialSafe;
use crate::prompt::{self, PendingPrompt, Prompt};
use crate::types::CredentialSource;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

/// Callbacks used throughout the test suites
pub type TestCallbacks = CallbackSet<ScriptedInteraction, MemoryCredentialSafe>;

/// How a prompt gets answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Accept,
    Deny,
    /// Leave the prompt open until [`ScriptedInteraction::release`]
    Withhold,
}

#[derive(Debug, Default)]
struct Script {
    queued: VecDeque<Answer>,
    shown: Vec<ConsentRequest>,
    withheld: Vec<Prompt<bool>>,
    selections: usize,
}

/// [`UserInteraction`] that follows a script
#[derive(Debug, Clone)]
pub struct ScriptedInteraction {
    default: Answer,
    selection: Option<usize>,
    delay: Option<Duration>,
    script: Arc<Mutex<Script>>,
}

impl ScriptedInteraction {
    /// Answer every prompt with `default`, picking the first credential
    pub fn new(default: Answer) -> Self {
        Self {
            default,
            selection: Some(0),
            delay: None,
            script: Arc::default(),
        }
    }

    /// Answer credential selection with `index`, or cancel it with `None`
    pub fn with_selection(mut self, index: Option<usize>) -> Self {
        self.selection = index;
        self
    }

    /// Resolve prompts from another thread after `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Use `answer` for the next prompt instead of the default
    pub fn push_answer(&self, answer: Answer) {
        self.lock().queued.push_back(answer);
    }

    /// Kinds of every dialog and prompt shown so far
    pub fn shown(&self) -> Vec<PromptKind> {
        self.lock().shown.iter().map(|r| r.kind).collect()
    }

    /// Every dialog and prompt shown so far
    pub fn requests(&self) -> Vec<ConsentRequest> {
        self.lock().shown.clone()
    }

    /// How many times credential selection was requested
    pub fn selections(&self) -> usize {
        self.lock().selections
    }

    /// Answer every withheld prompt
    pub fn release(&self, value: bool) {
        let withheld = std::mem::take(&mut self.lock().withheld);
        for resolver in withheld {
            resolver.resolve(value);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn answer(&self, request: &ConsentRequest) -> PendingPrompt<bool> {
        let answer = {
            let mut script = self.lock();
            script.shown.push(request.clone());
            script.queued.pop_front().unwrap_or(self.default)
        };

        let (resolver, pending) = prompt::prompt();
        match answer {
            Answer::Withhold => self.lock().withheld.push(resolver),
            Answer::Accept | Answer::Deny => {
                self.resolve_later(resolver, answer == Answer::Accept)
            }
        }
        pending
    }

    fn resolve_later<T: Send + 'static>(&self, resolver: Prompt<T>, value: T) {
        match self.delay {
            Some(delay) => {
                thread::spawn(move || {
                    thread::sleep(delay);
                    resolver.resolve(value);
                });
            }
            None => resolver.resolve(value),
        }
    }
}

impl UserInteraction for ScriptedInteraction {
    fn show_dialog(&self, request: &ConsentRequest) -> PendingPrompt<bool> {
        self.answer(request)
    }

    fn show_prompt(&self, request: &ConsentRequest) -> PendingPrompt<bool> {
        self.answer(request)
    }

    fn select_credential(
        &self,
        _rp_id: &str,
        _candidates: &[CredentialSource],
    ) -> PendingPrompt<usize> {
        self.lock().selections += 1;

        let (resolver, pending) = prompt::prompt();
        match self.selection {
            Some(index) => self.resolve_later(resolver, index),
            None => drop(resolver),
        }
        pending
    }
}
