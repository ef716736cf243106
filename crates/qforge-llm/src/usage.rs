//! # Usage Tracking & Budget Enforcement
//!
//! Atomic counters over rolling token windows, a monthly cost
//! accumulator, a per-minute request counter and a bounded history of
//! recent usage records. Budget checks run before any provider is
//! touched; exceeding any configured window refuses the request.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

use qforge_core::{QForgeError, QResult};

const HISTORY_CAPACITY: usize = 1000;

/// Configured spending limits; zero-value fields are unlimited except
/// where a limit of zero is explicitly set (which refuses everything
/// with a non-zero estimate).
#[derive(Debug, Clone)]
pub struct BudgetLimits {
    pub hourly_tokens: Option<u64>,
    pub daily_tokens: Option<u64>,
    pub monthly_cost_usd: Option<f64>,
    pub requests_per_minute: Option<u64>,
}

impl Default for BudgetLimits {
    fn default() -> Self {
        Self {
            hourly_tokens: None,
            daily_tokens: None,
            monthly_cost_usd: None,
            requests_per_minute: Some(60),
        }
    }
}

/// One recorded completion
#[derive(Debug, Clone, Serialize)]
pub struct UsageRecord {
    pub provider: String,
    pub model: String,
    pub tokens: u64,
    pub cost_usd: f64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Aggregated usage counters for observability
#[derive(Debug, Clone, Serialize)]
pub struct UsageStats {
    pub hourly_tokens: u64,
    pub daily_tokens: u64,
    pub monthly_tokens: u64,
    pub monthly_cost_usd: f64,
    pub requests_this_minute: u64,
    pub total_requests: u64,
}

struct MinuteWindow {
    count: u64,
    last_reset: Instant,
}

struct CostState {
    monthly_cost_usd: f64,
    month: u32,
    year: i32,
    history: VecDeque<UsageRecord>,
}

pub struct UsageTracker {
    limits: BudgetLimits,
    hourly_tokens: AtomicU64,
    daily_tokens: AtomicU64,
    monthly_tokens: AtomicU64,
    total_requests: AtomicU64,
    minute: Mutex<MinuteWindow>,
    cost: Mutex<CostState>,
    /// provider -> model (or "default") -> USD per 1K tokens
    prices: HashMap<String, HashMap<String, f64>>,
}

impl UsageTracker {
    pub fn new(limits: BudgetLimits) -> Self {
        let now = chrono::Utc::now();
        Self {
            limits,
            hourly_tokens: AtomicU64::new(0),
            daily_tokens: AtomicU64::new(0),
            monthly_tokens: AtomicU64::new(0),
            total_requests: AtomicU64::new(0),
            minute: Mutex::new(MinuteWindow {
                count: 0,
                last_reset: Instant::now(),
            }),
            cost: Mutex::new(CostState {
                monthly_cost_usd: 0.0,
                month: chrono::Datelike::month(&now),
                year: chrono::Datelike::year(&now),
                history: VecDeque::with_capacity(HISTORY_CAPACITY),
            }),
            prices: default_prices(),
        }
    }

    pub fn with_prices(mut self, prices: HashMap<String, HashMap<String, f64>>) -> Self {
        self.prices = prices;
        self
    }

    /// Refuse the request when any window would be exceeded by the
    /// estimate. Nothing is charged here.
    pub fn check_budget(&self, estimated_tokens: u64) -> QResult<()> {
        if let Some(limit) = self.limits.hourly_tokens {
            let current = self.hourly_tokens.load(Ordering::SeqCst);
            if current + estimated_tokens > limit {
                return Err(QForgeError::BudgetExceeded {
                    window: "hourly tokens".to_string(),
                    limit,
                    requested: estimated_tokens,
                });
            }
        }

        if let Some(limit) = self.limits.daily_tokens {
            let current = self.daily_tokens.load(Ordering::SeqCst);
            if current + estimated_tokens > limit {
                return Err(QForgeError::BudgetExceeded {
                    window: "daily tokens".to_string(),
                    limit,
                    requested: estimated_tokens,
                });
            }
        }

        if let Some(limit) = self.limits.monthly_cost_usd {
            let cost = self.cost.lock().unwrap();
            if cost.monthly_cost_usd >= limit {
                return Err(QForgeError::BudgetExceeded {
                    window: "monthly cost".to_string(),
                    limit: limit as u64,
                    requested: estimated_tokens,
                });
            }
        }

        if let Some(limit) = self.limits.requests_per_minute {
            let mut minute = self.minute.lock().unwrap();
            if minute.last_reset.elapsed() >= Duration::from_secs(60) {
                minute.count = 0;
                minute.last_reset = Instant::now();
            }
            if minute.count + 1 > limit {
                return Err(QForgeError::BudgetExceeded {
                    window: "requests per minute".to_string(),
                    limit,
                    requested: 1,
                });
            }
            minute.count += 1;
        }

        Ok(())
    }

    /// Record a completed call: bump every window, accumulate cost and
    /// append to the bounded history.
    pub fn record(&self, provider: &str, model: &str, tokens: u64) {
        self.hourly_tokens.fetch_add(tokens, Ordering::SeqCst);
        self.daily_tokens.fetch_add(tokens, Ordering::SeqCst);
        self.monthly_tokens.fetch_add(tokens, Ordering::SeqCst);
        self.total_requests.fetch_add(1, Ordering::SeqCst);

        let cost_usd = self.cost_of(provider, model, tokens);

        let mut cost = self.cost.lock().unwrap();
        self.roll_month(&mut cost);
        cost.monthly_cost_usd += cost_usd;
        if cost.history.len() >= HISTORY_CAPACITY {
            cost.history.pop_front();
        }
        cost.history.push_back(UsageRecord {
            provider: provider.to_string(),
            model: model.to_string(),
            tokens,
            cost_usd,
            timestamp: chrono::Utc::now(),
        });

        debug!(provider, model, tokens, cost_usd, "usage recorded");
    }

    /// tokens/1000 · price-per-1K for the provider's model, falling back
    /// to the provider's "default" row; unknown providers are free
    /// (local models).
    pub fn cost_of(&self, provider: &str, model: &str, tokens: u64) -> f64 {
        let Some(models) = self.prices.get(provider) else {
            return 0.0;
        };
        let per_1k = models
            .get(model)
            .or_else(|| models.get("default"))
            .copied()
            .unwrap_or(0.0);
        (tokens as f64 / 1000.0) * per_1k
    }

    pub fn stats(&self) -> UsageStats {
        let minute = self.minute.lock().unwrap();
        let requests_this_minute = if minute.last_reset.elapsed() >= Duration::from_secs(60) {
            0
        } else {
            minute.count
        };
        drop(minute);

        let cost = self.cost.lock().unwrap();
        UsageStats {
            hourly_tokens: self.hourly_tokens.load(Ordering::SeqCst),
            daily_tokens: self.daily_tokens.load(Ordering::SeqCst),
            monthly_tokens: self.monthly_tokens.load(Ordering::SeqCst),
            monthly_cost_usd: cost.monthly_cost_usd,
            requests_this_minute,
            total_requests: self.total_requests.load(Ordering::SeqCst),
        }
    }

    /// Recent records, oldest first
    pub fn history(&self) -> Vec<UsageRecord> {
        self.cost.lock().unwrap().history.iter().cloned().collect()
    }

    /// Spawn the monotonic window-reset tickers (hourly and daily).
    /// Monthly cost rolls over on the calendar boundary inside `record`.
    pub fn start_reset_tasks(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            let mut hourly = tokio::time::interval(Duration::from_secs(3600));
            let mut daily = tokio::time::interval(Duration::from_secs(86400));
            // both fire immediately on the first tick; consume those
            hourly.tick().await;
            daily.tick().await;
            loop {
                tokio::select! {
                    _ = hourly.tick() => {
                        tracker.hourly_tokens.store(0, Ordering::SeqCst);
                    }
                    _ = daily.tick() => {
                        tracker.hourly_tokens.store(0, Ordering::SeqCst);
                        tracker.daily_tokens.store(0, Ordering::SeqCst);
                    }
                }
            }
        })
    }

    fn roll_month(&self, cost: &mut CostState) {
        let now = chrono::Utc::now();
        let (month, year) = (chrono::Datelike::month(&now), chrono::Datelike::year(&now));
        if month != cost.month || year != cost.year {
            cost.monthly_cost_usd = 0.0;
            cost.month = month;
            cost.year = year;
            self.monthly_tokens.store(0, Ordering::SeqCst);
        }
    }
}

fn default_prices() -> HashMap<String, HashMap<String, f64>> {
    let mut prices = HashMap::new();

    let mut anthropic = HashMap::new();
    anthropic.insert("default".to_string(), 0.009);
    prices.insert("anthropic".to_string(), anthropic);

    // local providers price at zero by omission
    prices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_refusal_without_provider_call() {
        let tracker = UsageTracker::new(BudgetLimits {
            hourly_tokens: Some(1000),
            ..Default::default()
        });

        tracker.record("ollama", "m", 1000);
        let err = tracker.check_budget(100).unwrap_err();
        match err {
            QForgeError::BudgetExceeded { window, limit, requested } => {
                assert_eq!(window, "hourly tokens");
                assert_eq!(limit, 1000);
                assert_eq!(requested, 100);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_zero_limit_refuses_nonzero_estimate() {
        let tracker = UsageTracker::new(BudgetLimits {
            hourly_tokens: Some(0),
            ..Default::default()
        });
        assert!(tracker.check_budget(1).is_err());
        assert!(tracker.check_budget(0).is_ok());
    }

    #[test]
    fn test_request_rate_window() {
        let tracker = UsageTracker::new(BudgetLimits {
            requests_per_minute: Some(2),
            ..Default::default()
        });

        assert!(tracker.check_budget(1).is_ok());
        assert!(tracker.check_budget(1).is_ok());
        assert!(tracker.check_budget(1).is_err());
    }

    #[test]
    fn test_cost_table_lookup() {
        let tracker = UsageTracker::new(BudgetLimits::default());

        // anthropic priced via the default row
        let cost = tracker.cost_of("anthropic", "claude-3-5-haiku-latest", 2000);
        assert!((cost - 0.018).abs() < 1e-9);

        // local providers cost nothing
        assert_eq!(tracker.cost_of("ollama", "qwen2.5-coder", 100_000), 0.0);
    }

    #[test]
    fn test_history_is_bounded() {
        let tracker = UsageTracker::new(BudgetLimits::default());
        for i in 0..(HISTORY_CAPACITY + 10) {
            tracker.record("ollama", "m", i as u64);
        }
        let history = tracker.history();
        assert_eq!(history.len(), HISTORY_CAPACITY);
        // oldest entries were dropped
        assert_eq!(history[0].tokens, 10);
    }

    #[test]
    fn test_stats_accumulate() {
        let tracker = UsageTracker::new(BudgetLimits::default());
        tracker.record("anthropic", "default", 500);
        tracker.record("anthropic", "default", 250);

        let stats = tracker.stats();
        assert_eq!(stats.hourly_tokens, 750);
        assert_eq!(stats.daily_tokens, 750);
        assert_eq!(stats.monthly_tokens, 750);
        assert_eq!(stats.total_requests, 2);
        assert!(stats.monthly_cost_usd > 0.0);
    }
}
