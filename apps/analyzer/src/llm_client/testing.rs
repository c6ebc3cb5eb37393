//! Scripted provider for tests: canned replies per model and a log of every call.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{ChatProvider, ChatRequest, ErrorKind, ExtractionError};

type Reply = Result<String, ExtractionError>;

#[derive(Debug, Clone)]
pub struct CallRecord {
    pub model: String,
    pub user_message: String,
    pub started: Instant,
    pub finished: Instant,
}

#[derive(Default)]
pub struct ScriptedProvider {
    queued: Mutex<HashMap<String, VecDeque<Reply>>>,
    always: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<CallRecord>>,
    delay: Duration,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call to `model` not consumed by a queued reply gets `reply`.
    pub fn always(self, model: &str, reply: Reply) -> Self {
        self.always
            .lock()
            .unwrap()
            .insert(model.to_string(), reply);
        self
    }

    /// Queues a one-shot reply for `model`, consumed before any `always` reply.
    pub fn then(self, model: &str, reply: Reply) -> Self {
        self.queued
            .lock()
            .unwrap()
            .entry(model.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    /// Simulated latency for every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.calls.lock().unwrap().clone()
    }

    fn next_reply(&self, model: &str) -> Reply {
        if let Some(reply) = self
            .queued
            .lock()
            .unwrap()
            .get_mut(model)
            .and_then(VecDeque::pop_front)
        {
            return reply;
        }
        self.always
            .lock()
            .unwrap()
            .get(model)
            .cloned()
            .unwrap_or_else(|| {
                Err(ExtractionError::new(
                    ErrorKind::Service,
                    format!("model {model} is not scripted"),
                ))
            })
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    async fn complete(&self, request: &ChatRequest) -> Result<String, ExtractionError> {
        let started = Instant::now();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let reply = self.next_reply(&request.model);
        let user_message = request
            .messages
            .iter()
            .find(|m| m.role == "user")
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.calls.lock().unwrap().push(CallRecord {
            model: request.model.clone(),
            user_message,
            started,
            finished: Instant::now(),
        });
        reply
    }
}
