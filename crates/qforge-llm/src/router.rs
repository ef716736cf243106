//! # LLM Router
//!
//! Tier-aware provider selection with retry, failover, content-hash
//! caching and budget enforcement. Safe for concurrent callers; cache
//! writes are last-write-wins and identical concurrent requests may both
//! reach a provider.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use qforge_core::{redact_secrets, QForgeError, QResult};

use crate::backend::{CompletionBackend, CompletionRequest, CompletionResponse, ModelTier};
use crate::cache::{cache_key, CacheStats, ResponseCache};
use crate::usage::{UsageStats, UsageTracker};

#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Preferred backend name per tier
    pub tier_defaults: HashMap<ModelTier, String>,
    /// Backend names tried last, in declared order
    pub fallbacks: Vec<String>,
    /// Additional attempts per backend after the first
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    pub cache_ttl: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            tier_defaults: HashMap::new(),
            fallbacks: Vec::new(),
            max_retries: 3,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            cache_ttl: Duration::from_secs(3600),
        }
    }
}

/// Router observability snapshot
#[derive(Debug, Clone, Serialize)]
pub struct RouterStatus {
    pub backends: Vec<BackendStatus>,
    pub cache: CacheStats,
    pub usage: UsageStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackendStatus {
    pub name: String,
    pub available: bool,
}

pub struct LlmRouter {
    backends: Vec<Arc<dyn CompletionBackend>>,
    cache: Arc<dyn ResponseCache>,
    usage: Arc<UsageTracker>,
    config: RouterConfig,
}

impl LlmRouter {
    pub fn new(
        backends: Vec<Arc<dyn CompletionBackend>>,
        cache: Arc<dyn ResponseCache>,
        usage: Arc<UsageTracker>,
        config: RouterConfig,
    ) -> Self {
        Self {
            backends,
            cache,
            usage,
            config,
        }
    }

    /// Route one completion: cache, budget, then ordered failover with
    /// per-backend retry. Cancellation aborts immediately.
    pub async fn complete(
        &self,
        request: &CompletionRequest,
        cancel: &CancellationToken,
    ) -> QResult<CompletionResponse> {
        let key = cache_key(request);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }

        self.usage.check_budget(request.estimated_tokens())?;

        let mut diagnostics = Vec::new();

        for (backend, model) in self.provider_order(request.tier) {
            if !backend.is_available().await {
                diagnostics.push(format!("{}: unavailable", backend.name()));
                continue;
            }

            match self.complete_with_retry(&*backend, &model, request, cancel).await {
                Ok(response) => {
                    self.usage.record(&response.provider, &response.model, response.tokens_used);
                    self.cache.set(&key, response.clone(), self.config.cache_ttl);
                    return Ok(response);
                }
                Err(QForgeError::Cancelled) => return Err(QForgeError::Cancelled),
                Err(err) => {
                    warn!(backend = backend.name(), error = %err, "backend exhausted");
                    diagnostics.push(format!("{}: {}", backend.name(), err));
                }
            }
        }

        Err(QForgeError::AllProvidersFailed {
            detail: redact_secrets(&diagnostics.join("; ")),
        })
    }

    /// Tier default first, then remaining backends serving the tier in
    /// declared order, then configured fallbacks.
    fn provider_order(&self, tier: ModelTier) -> Vec<(Arc<dyn CompletionBackend>, String)> {
        let mut order: Vec<(Arc<dyn CompletionBackend>, String)> = Vec::new();
        let mut taken: Vec<String> = Vec::new();

        let default_name = self.config.tier_defaults.get(&tier);
        if let Some(name) = default_name {
            if let Some(backend) = self.backend_by_name(name) {
                if let Some(model) = backend.model_for(tier) {
                    taken.push(backend.name().to_string());
                    order.push((backend, model));
                }
            }
        }

        for backend in &self.backends {
            if taken.iter().any(|n| n == backend.name()) {
                continue;
            }
            if let Some(model) = backend.model_for(tier) {
                taken.push(backend.name().to_string());
                order.push((Arc::clone(backend), model));
            }
        }

        for name in &self.config.fallbacks {
            if taken.iter().any(|n| n == name) {
                continue;
            }
            if let Some(backend) = self.backend_by_name(name) {
                // a fallback without a tier model serves its cheapest
                let model = backend
                    .model_for(tier)
                    .or_else(|| backend.model_for(ModelTier::Fast));
                if let Some(model) = model {
                    taken.push(backend.name().to_string());
                    order.push((backend, model));
                }
            }
        }

        order
    }

    fn backend_by_name(&self, name: &str) -> Option<Arc<dyn CompletionBackend>> {
        self.backends
            .iter()
            .find(|b| b.name() == name)
            .map(Arc::clone)
    }

    async fn complete_with_retry(
        &self,
        backend: &dyn CompletionBackend,
        model: &str,
        request: &CompletionRequest,
        cancel: &CancellationToken,
    ) -> QResult<CompletionResponse> {
        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(QForgeError::Cancelled);
            }

            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(QForgeError::Cancelled),
                result = backend.complete(request, model) => result,
            };

            match result {
                Ok(response) => return Ok(response),
                Err(err) if err.is_retryable() && attempt < self.config.max_retries => {
                    let delay = self.backoff_delay(attempt);
                    info!(
                        backend = backend.name(),
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after transient failure"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(QForgeError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// `min(max_backoff, initial · multiplier^attempt)` plus at least 10%
    /// jitter on top.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.initial_backoff.as_secs_f64()
            * self.config.backoff_multiplier.powi(attempt as i32);
        let capped = base.min(self.config.max_backoff.as_secs_f64());
        let jitter_fraction = 0.10 + rand::thread_rng().gen::<f64>() * 0.10;
        Duration::from_secs_f64(capped * (1.0 + jitter_fraction))
    }

    /// True when at least one backend answers its availability probe
    pub async fn health_check(&self) -> bool {
        for backend in &self.backends {
            if backend.is_available().await {
                return true;
            }
        }
        false
    }

    pub async fn status(&self) -> RouterStatus {
        let mut backends = Vec::new();
        for backend in &self.backends {
            backends.push(BackendStatus {
                name: backend.name().to_string(),
                available: backend.is_available().await,
            });
        }
        RouterStatus {
            backends,
            cache: self.cache.stats(),
            usage: self.usage.stats(),
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn usage_stats(&self) -> UsageStats {
        self.usage.stats()
    }
}
