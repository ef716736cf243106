//! # Test Planner
//!
//! Turns a system model into a prioritized, deterministic queue of test
//! intents: one api intent per endpoint, one unit intent per qualifying
//! function target, and e2e intents for endpoint groups that share a
//! route prefix.

use std::collections::BTreeMap;

use tracing::info;

use qforge_core::{
    IntentLevel, PriorityBucket, SystemModel, TargetKind, TestIntent, TestPlan,
};

/// Minimum endpoints sharing a prefix before an e2e intent is planned
const E2E_GROUP_MIN: usize = 2;

#[derive(Debug, Clone)]
pub struct PlanConfig {
    pub max_intents: usize,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self { max_intents: 100 }
    }
}

/// Produce the plan snapshot. Output is strictly non-increasing by
/// priority; ties order by target id ascending.
pub fn plan(model: &SystemModel, config: &PlanConfig) -> TestPlan {
    let mut intents = Vec::new();

    for target in &model.test_targets {
        match target.kind {
            TargetKind::Endpoint => intents.push(TestIntent {
                level: IntentLevel::Api,
                target_kind: TargetKind::Endpoint,
                target_id: target.target_id.clone(),
                priority: target.priority,
                bucket: PriorityBucket::from_priority(target.priority),
                reason: target.reason.clone(),
            }),
            TargetKind::Function | TargetKind::Method => intents.push(TestIntent {
                level: IntentLevel::Unit,
                target_kind: target.kind,
                target_id: target.target_id.clone(),
                priority: target.priority,
                bucket: PriorityBucket::from_priority(target.priority),
                reason: target.reason.clone(),
            }),
            // class and block targets are model inventory, not planned units
            TargetKind::Class | TargetKind::Block => {}
        }
    }

    intents.extend(e2e_intents(model));

    intents.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.target_id.cmp(&b.target_id))
    });
    intents.truncate(config.max_intents);

    info!(intents = intents.len(), "test plan built");

    TestPlan {
        model_id: model.commit.clone(),
        repository: model.repository.clone(),
        intents,
    }
}

/// One e2e intent per first-segment route group with enough endpoints
fn e2e_intents(model: &SystemModel) -> Vec<TestIntent> {
    let mut groups: BTreeMap<String, Vec<&str>> = BTreeMap::new();
    for endpoint in &model.endpoints {
        let prefix = endpoint
            .path
            .trim_start_matches('/')
            .split('/')
            .next()
            .unwrap_or("")
            .to_string();
        if !prefix.is_empty() {
            groups
                .entry(prefix)
                .or_default()
                .push(endpoint.id.as_str());
        }
    }

    groups
        .into_iter()
        .filter(|(_, ids)| ids.len() >= E2E_GROUP_MIN)
        .map(|(prefix, ids)| TestIntent {
            level: IntentLevel::E2e,
            target_kind: TargetKind::Block,
            target_id: ids[0].to_string(),
            priority: 85,
            bucket: PriorityBucket::from_priority(85),
            reason: format!("{} endpoints under /{prefix}", ids.len()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ModelBuilder;
    use crate::extractor::SourceExtractor;
    use qforge_core::SourceLanguage;

    fn model_for(path: &str, source: &str, language: SourceLanguage) -> SystemModel {
        let extractor = SourceExtractor::new();
        let parsed = extractor.parse_source(path, source, language).unwrap();
        let mut builder = ModelBuilder::new("demo", "main", "c0ffee");
        builder.add_file(parsed);
        builder.build().unwrap()
    }

    #[test]
    fn test_unit_plan_for_go_fixture() {
        let model = model_for(
            "mathutil/math.go",
            r#"package mathutil

func Add(a, b int) int {
	return a + b
}

func IsEven(n int) bool {
	return n%2 == 0
}
"#,
            SourceLanguage::Go,
        );

        let plan = plan(&model, &PlanConfig::default());
        assert_eq!(plan.intents.len(), 2);
        assert_eq!(plan.intents[0].priority, 60);
        assert_eq!(plan.intents[1].priority, 55);
        assert!(plan
            .intents
            .iter()
            .all(|i| i.level == IntentLevel::Unit));
        assert!(plan.check_ordering().is_ok());
    }

    #[test]
    fn test_endpoint_only_repo_plans_api_intents() {
        let model = model_for(
            "main.go",
            r#"package main

import "github.com/gin-gonic/gin"

func main() {
	r := gin.Default()
	r.GET("/users/:id", getUser)
}
"#,
            SourceLanguage::Go,
        );

        let plan = plan(&model, &PlanConfig::default());
        assert_eq!(plan.intents.len(), 1);
        assert_eq!(plan.intents[0].level, IntentLevel::Api);
        assert_eq!(plan.intents[0].priority, 95);
    }

    #[test]
    fn test_e2e_intent_for_shared_prefix() {
        let model = model_for(
            "main.go",
            r#"package main

import "github.com/gin-gonic/gin"

func main() {
	r := gin.Default()
	r.GET("/users/:id", getUser)
	r.POST("/users", createUser)
	r.GET("/healthz", health)
}
"#,
            SourceLanguage::Go,
        );

        let plan = plan(&model, &PlanConfig::default());
        let e2e: Vec<&TestIntent> = plan
            .intents
            .iter()
            .filter(|i| i.level == IntentLevel::E2e)
            .collect();
        assert_eq!(e2e.len(), 1);
        assert!(e2e[0].reason.contains("/users"));
    }

    #[test]
    fn test_max_intents_truncates() {
        let model = model_for(
            "m.go",
            r#"package m

func A(a int) int { return a }
func B(a int) int { return a }
func C(a int) int { return a }
"#,
            SourceLanguage::Go,
        );

        let plan = plan(&model, &PlanConfig { max_intents: 2 });
        assert_eq!(plan.intents.len(), 2);
        assert!(plan.check_ordering().is_ok());
    }

    #[test]
    fn test_empty_model_plans_nothing() {
        let builder = ModelBuilder::new("empty", "main", "");
        let model = builder.build().unwrap();
        let plan = plan(&model, &PlanConfig::default());
        assert!(plan.intents.is_empty());
    }

    #[test]
    fn test_tie_break_is_stable_by_target_id() {
        let model = model_for(
            "m.go",
            r#"package m

func A(a int) int { return a }
func B(a int) int { return a }
"#,
            SourceLanguage::Go,
        );

        let first = plan(&model, &PlanConfig::default());
        let second = plan(&model, &PlanConfig::default());
        assert_eq!(first.intents, second.intents);

        // equal priorities order by id ascending
        let ids: Vec<&str> = first.intents.iter().map(|i| i.target_id.as_str()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }
}
