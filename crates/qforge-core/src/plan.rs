//! Test plan: the prioritized queue of intents derived from a system model.

use serde::{Deserialize, Serialize};

use crate::model::TargetKind;

/// Granularity of a planned test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentLevel {
    Unit,
    Api,
    E2e,
}

/// Coarse urgency band derived from numeric priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityBucket {
    Critical,
    High,
    Medium,
    Low,
}

impl PriorityBucket {
    pub fn from_priority(priority: u8) -> Self {
        match priority {
            90..=u8::MAX => PriorityBucket::Critical,
            70..=89 => PriorityBucket::High,
            40..=69 => PriorityBucket::Medium,
            _ => PriorityBucket::Low,
        }
    }
}

/// A planned request for one test against one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestIntent {
    pub level: IntentLevel,
    pub target_kind: TargetKind,
    pub target_id: String,
    pub priority: u8,
    pub bucket: PriorityBucket,
    pub reason: String,
}

/// Serializable snapshot of a full plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestPlan {
    pub model_id: String,
    pub repository: String,
    pub intents: Vec<TestIntent>,
}

impl TestPlan {
    /// Plans must be strictly non-increasing by priority with a stable
    /// tie-break on target id.
    pub fn check_ordering(&self) -> Result<(), String> {
        for pair in self.intents.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if b.priority > a.priority {
                return Err(format!(
                    "intent {} (priority {}) ordered after {} (priority {})",
                    b.target_id, b.priority, a.target_id, a.priority
                ));
            }
            if b.priority == a.priority && b.target_id < a.target_id {
                return Err(format!(
                    "unstable tie-break between {} and {}",
                    a.target_id, b.target_id
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_thresholds() {
        assert_eq!(PriorityBucket::from_priority(95), PriorityBucket::Critical);
        assert_eq!(PriorityBucket::from_priority(90), PriorityBucket::Critical);
        assert_eq!(PriorityBucket::from_priority(89), PriorityBucket::High);
        assert_eq!(PriorityBucket::from_priority(70), PriorityBucket::High);
        assert_eq!(PriorityBucket::from_priority(69), PriorityBucket::Medium);
        assert_eq!(PriorityBucket::from_priority(40), PriorityBucket::Medium);
        assert_eq!(PriorityBucket::from_priority(39), PriorityBucket::Low);
        assert_eq!(PriorityBucket::from_priority(0), PriorityBucket::Low);
    }

    #[test]
    fn test_ordering_check() {
        let intent = |priority: u8, id: &str| TestIntent {
            level: IntentLevel::Unit,
            target_kind: TargetKind::Function,
            target_id: id.to_string(),
            priority,
            bucket: PriorityBucket::from_priority(priority),
            reason: String::new(),
        };

        let plan = TestPlan {
            model_id: "m".to_string(),
            repository: "r".to_string(),
            intents: vec![intent(90, "a"), intent(60, "a"), intent(60, "b")],
        };
        assert!(plan.check_ordering().is_ok());

        let bad = TestPlan {
            model_id: "m".to_string(),
            repository: "r".to_string(),
            intents: vec![intent(60, "a"), intent(90, "b")],
        };
        assert!(bad.check_ordering().is_err());
    }

    #[test]
    fn test_plan_round_trip() {
        let plan = TestPlan {
            model_id: "model-1".to_string(),
            repository: "demo".to_string(),
            intents: vec![TestIntent {
                level: IntentLevel::Api,
                target_kind: TargetKind::Endpoint,
                target_id: "ep-1".to_string(),
                priority: 95,
                bucket: PriorityBucket::Critical,
                reason: "endpoint GET /users/:id".to_string(),
            }],
        };

        let json = serde_json::to_string(&plan).unwrap();
        assert!(json.contains("\"level\":\"api\""));
        assert!(json.contains("\"bucket\":\"critical\""));
        let back: TestPlan = serde_json::from_str(&json).unwrap();
        assert_eq!(back.intents, plan.intents);
    }
}
