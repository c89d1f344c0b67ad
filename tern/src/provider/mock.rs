//! Mock generator and tool-chat for engine tests.
//!
//! Scripted responses are consumed in order; every request is recorded so
//! tests can assert call counts, prompts, and per-role temperatures.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::agent::{AgentMessage, ToolSpec};
use crate::error::EngineError;

use super::{ChatOutcome, GenerateRequest, Generator, ToolChat};

/// Scripted [`Generator`]. Responses pop front; when the script runs dry the
/// last response repeats (convenient for "skeptic always fails" loops).
#[derive(Default)]
pub struct MockGenerator {
    responses: Mutex<Vec<String>>,
    calls: Mutex<Vec<GenerateRequest>>,
    repeat_last: bool,
}

impl MockGenerator {
    pub fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(String::from).collect()),
            calls: Mutex::new(Vec::new()),
            repeat_last: false,
        }
    }

    /// Keeps replaying the final scripted response instead of erroring when
    /// the script is exhausted.
    pub fn repeating(mut self) -> Self {
        self.repeat_last = true;
        self
    }

    /// Requests seen so far, in order.
    pub fn calls(&self) -> Vec<GenerateRequest> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn generate(&self, req: &GenerateRequest) -> Result<String, EngineError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(req.clone());
        }
        let mut responses = self
            .responses
            .lock()
            .map_err(|_| EngineError::Internal("mock lock poisoned".into()))?;
        if responses.is_empty() {
            return Err(EngineError::Internal("mock generator script exhausted".into()));
        }
        if responses.len() == 1 && self.repeat_last {
            return Ok(responses[0].clone());
        }
        Ok(responses.remove(0))
    }
}

/// Scripted [`ToolChat`] for agent step tests.
#[derive(Default)]
pub struct MockToolChat {
    outcomes: Mutex<Vec<ChatOutcome>>,
    calls: Mutex<Vec<Vec<AgentMessage>>>,
}

impl MockToolChat {
    pub fn new(outcomes: Vec<ChatOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Message histories seen so far.
    pub fn calls(&self) -> Vec<Vec<AgentMessage>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ToolChat for MockToolChat {
    async fn chat_step(
        &self,
        messages: &[AgentMessage],
        _tools: &[ToolSpec],
    ) -> Result<ChatOutcome, EngineError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }
        let mut outcomes = self
            .outcomes
            .lock()
            .map_err(|_| EngineError::Internal("mock lock poisoned".into()))?;
        if outcomes.is_empty() {
            return Err(EngineError::Internal("mock tool chat script exhausted".into()));
        }
        Ok(outcomes.remove(0))
    }
}
