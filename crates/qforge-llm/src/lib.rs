//! # QForge LLM
//!
//! Completion plumbing for the generation pipeline: provider backends,
//! the tier-aware router with retry and failover, a bounded response
//! cache and budget-enforcing usage tracking.

pub mod backend;
pub mod cache;
pub mod router;
pub mod scripted;
pub mod usage;

pub use backend::{
    AnthropicBackend, ChatMessage, CompletionBackend, CompletionRequest, CompletionResponse,
    MessageRole, ModelTier, OllamaBackend,
};
pub use cache::{cache_key, CacheStats, InMemoryCache, NullCache, ResponseCache};
pub use router::{LlmRouter, RouterConfig, RouterStatus};
pub use scripted::ScriptedBackend;
pub use usage::{BudgetLimits, UsageRecord, UsageStats, UsageTracker};
