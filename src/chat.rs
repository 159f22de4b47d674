//! Prompt channel: serializes user prompts into one outstanding backend
//! request and records every exchange in an append-only transcript.

use std::fmt;
use std::sync::{Mutex, MutexGuard};

use crate::backend::SharedBackend;
use crate::error_taxonomy;
use crate::logging;

pub const CANCELLED_MESSAGE: &str = "Request cancelled before a response arrived.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    Error,
}

impl Role {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Ordered record of the conversation. Entries are only ever appended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}

/// Why a submission was refused without contacting the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitRejection {
    EmptyPrompt,
    RequestInFlight,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Rejected(SubmitRejection),
    Answered(String),
    Failed(String),
}

#[derive(Debug, Clone, Default)]
pub struct ChannelState {
    pub transcript: Transcript,
    pub input: String,
    pub in_flight: bool,
}

#[derive(Debug, Clone)]
pub enum ChannelEvent {
    EditInput(String),
    Submit(String),
    Responded(Result<String, String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEffect {
    /// Send this prompt to the backend.
    Send(String),
    Rejected(SubmitRejection),
}

/// Apply `event` to `state`.
pub fn update(state: &mut ChannelState, event: ChannelEvent) -> Option<ChannelEffect> {
    match event {
        ChannelEvent::EditInput(text) => {
            state.input = text;
            None
        }
        ChannelEvent::Submit(text) => {
            let prompt = text.trim();
            if prompt.is_empty() {
                return Some(ChannelEffect::Rejected(SubmitRejection::EmptyPrompt));
            }
            if state.in_flight {
                return Some(ChannelEffect::Rejected(SubmitRejection::RequestInFlight));
            }
            state.input.clear();
            state.transcript.push(Message::new(Role::User, prompt));
            state.in_flight = true;
            Some(ChannelEffect::Send(prompt.to_string()))
        }
        ChannelEvent::Responded(result) if state.in_flight => {
            let message = match result {
                Ok(response) => Message::new(Role::Assistant, response),
                Err(error) => Message::new(Role::Error, error),
            };
            state.transcript.push(message);
            state.in_flight = false;
            None
        }
        ChannelEvent::Responded(_) => None,
    }
}

/// Prompt submission surface bound to a backend.
pub struct PromptChannel {
    backend: SharedBackend,
    state: Mutex<ChannelState>,
}

/// Records a cancellation if the request future is dropped before the
/// response is recorded, so the in-flight flag never sticks.
struct InFlight<'a> {
    channel: &'a PromptChannel,
    settled: bool,
}

impl InFlight<'_> {
    fn settle(mut self, result: Result<String, String>) {
        self.settled = true;
        self.channel.dispatch(ChannelEvent::Responded(result));
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            logging::warn("prompt request dropped before completion");
            self.channel
                .dispatch(ChannelEvent::Responded(Err(CANCELLED_MESSAGE.to_string())));
        }
    }
}

impl PromptChannel {
    #[must_use]
    pub fn new(backend: SharedBackend) -> Self {
        Self {
            backend,
            state: Mutex::new(ChannelState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChannelState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn dispatch(&self, event: ChannelEvent) -> Option<ChannelEffect> {
        update(&mut self.lock(), event)
    }

    pub fn set_input(&self, text: impl Into<String>) {
        self.dispatch(ChannelEvent::EditInput(text.into()));
    }

    #[must_use]
    pub fn input(&self) -> String {
        self.lock().input.clone()
    }

    #[must_use]
    pub fn transcript(&self) -> Transcript {
        self.lock().transcript.clone()
    }

    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.lock().in_flight
    }

    /// Submit whatever is in the input buffer.
    pub async fn submit_input(&self) -> SubmitOutcome {
        let text = self.input();
        self.submit(&text).await
    }

    /// Send `text` to the backend unless it is blank or a request is
    /// already outstanding; both cases are no-ops.
    pub async fn submit(&self, text: &str) -> SubmitOutcome {
        let prompt = match self.dispatch(ChannelEvent::Submit(text.to_string())) {
            Some(ChannelEffect::Send(prompt)) => prompt,
            Some(ChannelEffect::Rejected(reason)) => {
                logging::debug(format!("prompt not submitted: {reason:?}"));
                return SubmitOutcome::Rejected(reason);
            }
            None => return SubmitOutcome::Rejected(SubmitRejection::EmptyPrompt),
        };

        let guard = InFlight {
            channel: self,
            settled: false,
        };
        match self.backend.submit_prompt(&prompt).await {
            Ok(response) => {
                guard.settle(Ok(response.clone()));
                SubmitOutcome::Answered(response)
            }
            Err(err) => {
                let message = error_taxonomy::report("submit_prompt", &err);
                guard.settle(Err(message.clone()));
                SubmitOutcome::Failed(message)
            }
        }
    }
}
