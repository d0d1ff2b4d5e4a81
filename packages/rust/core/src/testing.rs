//! Shared test doubles for the core engines.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use briefdesk_llm::{GenerationRequest, GenerativeProvider};
use briefdesk_shared::{BriefdeskError, Result};

pub enum MockReply {
    Text(String),
    Error(String),
}

/// Scriptable [`GenerativeProvider`] that records every prompt it receives.
pub struct MockProvider {
    script: Mutex<VecDeque<MockReply>>,
    fallback: MockReply,
    calls: Mutex<Vec<String>>,
}

impl MockProvider {
    /// Answer every call with the same text.
    pub fn returning(text: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: MockReply::Text(text.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fail every call with an Llm error.
    pub fn failing(message: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: MockReply::Error(message.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer calls from a script, then fall back to the last behavior.
    pub fn scripted(replies: Vec<MockReply>, fallback: MockReply) -> Self {
        Self {
            script: Mutex::new(replies.into()),
            fallback,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Prompts received so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("mock lock").clone()
    }
}

#[async_trait]
impl GenerativeProvider for MockProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.calls
            .lock()
            .expect("mock lock")
            .push(request.prompt.clone());

        let reply = self.script.lock().expect("mock lock").pop_front();
        match reply.as_ref().unwrap_or(&self.fallback) {
            MockReply::Text(text) => Ok(text.clone()),
            MockReply::Error(msg) => Err(BriefdeskError::Llm(msg.clone())),
        }
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}
