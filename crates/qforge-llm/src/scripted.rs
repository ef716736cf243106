//! Deterministic completion backend for offline runs and hermetic tests.
//!
//! Responses are served from a queue (or a fixed fallback), and failures
//! can be injected ahead of successes to exercise retry and failover
//! paths without a network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use qforge_core::{QForgeError, QResult};

use crate::backend::{CompletionBackend, CompletionRequest, CompletionResponse, ModelTier};

enum Step {
    Ok(String),
    TransportErr(String),
}

pub struct ScriptedBackend {
    name: String,
    tier_models: HashMap<ModelTier, String>,
    steps: Mutex<Vec<Step>>,
    fallback: String,
    calls: AtomicUsize,
    available: bool,
}

impl ScriptedBackend {
    pub fn new(name: &str) -> Self {
        let mut tier_models = HashMap::new();
        for tier in ModelTier::ALL {
            tier_models.insert(tier, format!("scripted-{name}"));
        }
        Self {
            name: name.to_string(),
            tier_models,
            steps: Mutex::new(Vec::new()),
            fallback: "{}".to_string(),
            calls: AtomicUsize::new(0),
            available: true,
        }
    }

    /// Serve this content once, before any later-pushed steps
    pub fn push_response(&self, content: &str) {
        self.steps.lock().unwrap().push(Step::Ok(content.to_string()));
    }

    /// Fail one call with a transport error carrying the given reason
    pub fn push_transport_error(&self, reason: &str) {
        self.steps
            .lock()
            .unwrap()
            .push(Step::TransportErr(reason.to_string()));
    }

    /// Content returned when the step queue is empty
    pub fn with_fallback(mut self, content: &str) -> Self {
        self.fallback = content.to_string();
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Restrict served tiers (the default serves all three)
    pub fn with_tiers(mut self, tiers: &[ModelTier]) -> Self {
        self.tier_models.retain(|tier, _| tiers.contains(tier));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn model_for(&self, tier: ModelTier) -> Option<String> {
        self.tier_models.get(&tier).cloned()
    }

    async fn is_available(&self) -> bool {
        self.available
    }

    async fn complete(
        &self,
        _request: &CompletionRequest,
        model: &str,
    ) -> QResult<CompletionResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let step = {
            let mut steps = self.steps.lock().unwrap();
            if steps.is_empty() {
                None
            } else {
                Some(steps.remove(0))
            }
        };

        match step {
            Some(Step::TransportErr(reason)) => Err(QForgeError::Transport {
                provider: self.name.clone(),
                reason,
            }),
            Some(Step::Ok(content)) => Ok(self.response(content, model)),
            None => Ok(self.response(self.fallback.clone(), model)),
        }
    }
}

impl ScriptedBackend {
    fn response(&self, content: String, model: &str) -> CompletionResponse {
        let tokens_used = (content.len() as u64).div_ceil(4);
        CompletionResponse {
            content,
            provider: self.name.clone(),
            model: model.to_string(),
            tokens_used,
            cached: false,
            latency_ms: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_steps_then_fallback() {
        let backend = ScriptedBackend::new("stub").with_fallback("done");
        backend.push_transport_error("timed out");
        backend.push_response("first");

        let request = CompletionRequest::new(ModelTier::Fast, "hi");

        let err = backend.complete(&request, "m").await.unwrap_err();
        assert!(err.is_retryable());

        let ok = backend.complete(&request, "m").await.unwrap();
        assert_eq!(ok.content, "first");

        let fallback = backend.complete(&request, "m").await.unwrap();
        assert_eq!(fallback.content, "done");
        assert_eq!(backend.call_count(), 3);
    }
}
