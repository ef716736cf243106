//! Engine configuration, layered defaults < optional file < environment.
//!
//! Environment variables use the `QFORGE_` prefix with `__` as the
//! nesting separator, e.g. `QFORGE_BUDGET__HOURLY_TOKENS=50000`.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use qforge_core::{QForgeError, QResult};
use qforge_llm::{
    AnthropicBackend, BudgetLimits, CompletionBackend, InMemoryCache, LlmRouter, ModelTier,
    OllamaBackend, RouterConfig, UsageTracker,
};

/// Per-tier model names for one provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TierModels {
    pub fast: Option<String>,
    pub balanced: Option<String>,
    pub thorough: Option<String>,
}

impl TierModels {
    pub fn to_map(&self) -> HashMap<ModelTier, String> {
        let mut map = HashMap::new();
        if let Some(m) = &self.fast {
            map.insert(ModelTier::Fast, m.clone());
        }
        if let Some(m) = &self.balanced {
            map.insert(ModelTier::Balanced, m.clone());
        }
        if let Some(m) = &self.thorough {
            map.insert(ModelTier::Thorough, m.clone());
        }
        map
    }

    pub fn is_empty(&self) -> bool {
        self.fast.is_none() && self.balanced.is_none() && self.thorough.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetSettings {
    pub hourly_tokens: Option<u64>,
    pub daily_tokens: Option<u64>,
    pub monthly_cost_usd: Option<f64>,
    pub requests_per_minute: Option<u64>,
}

impl Default for BudgetSettings {
    fn default() -> Self {
        Self {
            hourly_tokens: None,
            daily_tokens: None,
            monthly_cost_usd: None,
            requests_per_minute: Some(60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualitySettings {
    pub min_score: f64,
    pub min_coverage: f64,
    pub min_mutation: f64,
    pub min_avg_assertions: f64,
    pub max_trivial_ratio: f64,
    /// assertion / coverage / mutation / static
    pub weights: [f64; 4],
}

impl Default for QualitySettings {
    fn default() -> Self {
        Self {
            min_score: 60.0,
            min_coverage: 70.0,
            min_mutation: 0.5,
            min_avg_assertions: 1.0,
            max_trivial_ratio: 0.5,
            weights: [0.20, 0.20, 0.40, 0.20],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub workspaces_root: String,
    pub ollama_base_url: Option<String>,
    pub ollama_models: TierModels,
    pub anthropic_api_key: Option<String>,
    pub anthropic_models: TierModels,
    pub generation_tier: String,
    pub fix_tier: String,
    pub max_workers: usize,
    pub max_intents: usize,
    pub validate_tests: bool,
    pub run_quality: bool,
    pub dry_run: bool,
    pub budget: BudgetSettings,
    pub quality: QualitySettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            workspaces_root: "./workspaces".to_string(),
            ollama_base_url: None,
            ollama_models: TierModels {
                fast: Some("qwen2.5-coder:7b".to_string()),
                balanced: Some("qwen2.5-coder:14b".to_string()),
                thorough: Some("qwen2.5-coder:32b".to_string()),
            },
            anthropic_api_key: None,
            anthropic_models: TierModels::default(),
            generation_tier: "balanced".to_string(),
            fix_tier: "fast".to_string(),
            max_workers: 1,
            max_intents: 100,
            validate_tests: true,
            run_quality: true,
            dry_run: false,
            budget: BudgetSettings::default(),
            quality: QualitySettings::default(),
        }
    }
}

impl EngineSettings {
    /// Load defaults, then an optional config file, then `QFORGE_*`
    /// environment overrides.
    pub fn load(file: Option<&str>) -> QResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("QFORGE")
                .separator("__")
                .try_parsing(true),
        );

        let loaded = builder
            .build()
            .and_then(|c| c.try_deserialize::<EngineSettings>())
            .map_err(|e| QForgeError::Input {
                reason: format!("configuration error: {e}"),
            })?;
        Ok(loaded)
    }

    pub fn tier(&self, name: &str) -> ModelTier {
        match name {
            "fast" => ModelTier::Fast,
            "thorough" => ModelTier::Thorough,
            _ => ModelTier::Balanced,
        }
    }

    pub fn budget_limits(&self) -> BudgetLimits {
        BudgetLimits {
            hourly_tokens: self.budget.hourly_tokens,
            daily_tokens: self.budget.daily_tokens,
            monthly_cost_usd: self.budget.monthly_cost_usd,
            requests_per_minute: self.budget.requests_per_minute,
        }
    }

    /// Assemble the router from the configured providers: Ollama serves
    /// as the local default, Anthropic joins when a key is present.
    pub fn build_router(&self) -> QResult<LlmRouter> {
        let mut backends: Vec<Arc<dyn CompletionBackend>> = Vec::new();
        let mut tier_defaults = HashMap::new();
        let mut fallbacks = Vec::new();

        if !self.ollama_models.is_empty() {
            let ollama =
                OllamaBackend::new(self.ollama_base_url.clone(), self.ollama_models.to_map())?;
            backends.push(Arc::new(ollama));
            fallbacks.push("ollama".to_string());
            for tier in ModelTier::ALL {
                tier_defaults.insert(tier, "ollama".to_string());
            }
        }

        if let Some(api_key) = self.anthropic_api_key.clone().filter(|k| !k.is_empty()) {
            let anthropic = AnthropicBackend::new(api_key, self.anthropic_models.to_map())?;
            backends.push(Arc::new(anthropic));
            // remote quality beats local for the expensive tiers
            if self.anthropic_models.balanced.is_some() {
                tier_defaults.insert(ModelTier::Balanced, "anthropic".to_string());
            }
            if self.anthropic_models.thorough.is_some() {
                tier_defaults.insert(ModelTier::Thorough, "anthropic".to_string());
            }
        }

        let cache = Arc::new(InMemoryCache::default());
        let usage = Arc::new(UsageTracker::new(self.budget_limits()));
        if tokio::runtime::Handle::try_current().is_ok() {
            // periodic cache sweep and usage-window resets; the handles are
            // detached on purpose
            let _ = cache.start_sweep();
            let _ = usage.start_reset_tasks();
        }
        let config = RouterConfig {
            tier_defaults,
            fallbacks,
            ..Default::default()
        };

        Ok(LlmRouter::new(backends, cache, usage, config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = EngineSettings::default();
        assert_eq!(settings.max_workers, 1);
        assert!(settings.validate_tests);
        assert_eq!(settings.quality.min_score, 60.0);
        assert_eq!(settings.quality.weights, [0.20, 0.20, 0.40, 0.20]);
        assert_eq!(settings.tier("fast"), ModelTier::Fast);
        assert_eq!(settings.tier("anything-else"), ModelTier::Balanced);
    }

    #[test]
    fn test_tier_models_map() {
        let models = TierModels {
            fast: Some("small".to_string()),
            balanced: None,
            thorough: Some("big".to_string()),
        };
        let map = models.to_map();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&ModelTier::Fast).unwrap(), "small");
        assert!(!map.contains_key(&ModelTier::Balanced));
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let settings = EngineSettings::load(None).unwrap();
        assert_eq!(settings.max_intents, 100);
    }
}
