//! # Test Utilities
//!
//! Scriptable stand-ins for the upstream AI provider and alert handlers, shared
//! by unit tests, integration tests, benchmarks and the demo binary.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::monitoring::{AlertHandler, AlertInstance, AlertRule};
use crate::optimizer::{AiProvider, AiResponse, ProviderError};

/// An [`AiProvider`] that replays queued responses, then falls back to a
/// default answer
#[derive(Debug)]
pub struct MockAiProvider {
    name: String,
    default_text: String,
    delay: Option<Duration>,
    scripted: Mutex<VecDeque<Result<AiResponse, ProviderError>>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl MockAiProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_text: "Mock analysis: no significant issues found.".to_string(),
            delay: None,
            scripted: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_default_text(mut self, text: impl Into<String>) -> Self {
        self.default_text = text.into();
        self
    }

    /// Sleep on the tokio clock before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_response(&self, text: impl Into<String>) {
        let text = text.into();
        self.scripted.lock().push_back(Ok(Self::response_for(&text)));
    }

    pub fn push_error(&self, error: ProviderError) {
        self.scripted.lock().push_back(Err(error));
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    fn response_for(text: &str) -> AiResponse {
        AiResponse {
            text: text.to_string(),
            input_tokens: 10,
            output_tokens: u32::try_from(text.split_whitespace().count()).unwrap_or(u32::MAX),
        }
    }
}

#[async_trait]
impl AiProvider for MockAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        prompt: &str,
        _max_tokens: u32,
        _temperature: f32,
    ) -> Result<AiResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(prompt.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.scripted.lock().pop_front();
        scripted.unwrap_or_else(|| Ok(Self::response_for(&self.default_text)))
    }
}

/// How a [`RecordingAlertHandler`] behaves when invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerBehavior {
    Succeed,
    Fail,
    Panic,
    Hang,
}

/// An [`AlertHandler`] that records every alert it receives
#[derive(Debug)]
pub struct RecordingAlertHandler {
    behavior: HandlerBehavior,
    received: Mutex<Vec<AlertInstance>>,
}

impl RecordingAlertHandler {
    pub fn new() -> Self {
        Self::with_behavior(HandlerBehavior::Succeed)
    }

    pub fn with_behavior(behavior: HandlerBehavior) -> Self {
        Self {
            behavior,
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn received(&self) -> Vec<AlertInstance> {
        self.received.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.received.lock().len()
    }
}

impl Default for RecordingAlertHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AlertHandler for RecordingAlertHandler {
    async fn handle(&self, alert: &AlertInstance, _rule: &AlertRule) -> Result<(), String> {
        self.received.lock().push(alert.clone());
        match self.behavior {
            HandlerBehavior::Succeed => Ok(()),
            HandlerBehavior::Fail => Err("handler rejected alert".to_string()),
            HandlerBehavior::Panic => panic!("alert handler panicked"),
            HandlerBehavior::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}
