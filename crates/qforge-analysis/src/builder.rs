//! # Model Builder
//!
//! Folds parsed files into a deduplicated system model, derives
//! risk-scored test targets, and runs the registered framework
//! supplements. The model is immutable once built; building twice from
//! the same inputs produces bit-identical JSON apart from the creation
//! timestamp.

use std::collections::{BTreeMap, HashSet};

use tracing::{info, warn};

use qforge_core::{
    ModuleInfo, ParsedFile, QResult, SourceLanguage, SystemModel, TargetKind, TestTarget, TypeInfo,
};

use crate::supplements::{default_supplements, FrameworkSupplement};

/// Complexity at or above which a private function is still worth testing
const PRIVATE_COMPLEXITY_GATE: u32 = 5;

pub struct ModelBuilder {
    repository: String,
    branch: String,
    commit: String,
    files: Vec<ParsedFile>,
    supplements: Vec<Box<dyn FrameworkSupplement>>,
}

impl ModelBuilder {
    pub fn new(repository: &str, branch: &str, commit: &str) -> Self {
        Self {
            repository: repository.to_string(),
            branch: branch.to_string(),
            commit: commit.to_string(),
            files: Vec::new(),
            supplements: default_supplements(),
        }
    }

    /// Replace the default supplement registry (order is significant:
    /// first registration wins duplicate endpoint claims)
    pub fn with_supplements(mut self, supplements: Vec<Box<dyn FrameworkSupplement>>) -> Self {
        self.supplements = supplements;
        self
    }

    pub fn add_file(&mut self, file: ParsedFile) {
        self.files.push(file);
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Emit the system model: fold files, run detected supplements,
    /// derive prioritized test targets.
    pub fn build(&self) -> QResult<SystemModel> {
        let mut model = SystemModel {
            repository: self.repository.clone(),
            branch: self.branch.clone(),
            commit: self.commit.clone(),
            created_at: chrono::Utc::now(),
            languages: Vec::new(),
            modules: Vec::new(),
            functions: Vec::new(),
            types: Vec::new(),
            endpoints: Vec::new(),
            test_targets: Vec::new(),
        };

        let mut seen_functions = HashSet::new();
        let mut seen_types = HashSet::new();
        let mut modules: BTreeMap<String, ModuleInfo> = BTreeMap::new();

        for file in &self.files {
            if !model.languages.contains(&file.language) {
                model.languages.push(file.language);
            }

            let dir = std::path::Path::new(&file.path)
                .parent()
                .map(|p| p.to_string_lossy().to_string())
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| ".".to_string());
            let module = modules.entry(dir.clone()).or_insert_with(|| ModuleInfo {
                name: dir.rsplit('/').next().unwrap_or(&dir).to_string(),
                path: dir.clone(),
                files: Vec::new(),
            });
            module.files.push(file.path.clone());

            // re-parsed duplicates collapse to the first occurrence
            for func in &file.functions {
                if seen_functions.insert(func.id.clone()) {
                    model.functions.push(func.clone());
                }
            }

            for class in &file.classes {
                if seen_types.insert(class.id.clone()) {
                    model.types.push(TypeInfo {
                        id: class.id.clone(),
                        name: class.name.clone(),
                        file: class.file.clone(),
                        kind: if file.language == SourceLanguage::Go {
                            "struct".to_string()
                        } else {
                            "class".to_string()
                        },
                    });
                }
            }
        }

        model.modules = modules.into_values().collect();

        self.run_supplements(&mut model);
        self.derive_targets(&mut model);

        info!(
            functions = model.functions.len(),
            endpoints = model.endpoints.len(),
            targets = model.test_targets.len(),
            "system model built"
        );

        Ok(model)
    }

    fn run_supplements(&self, model: &mut SystemModel) {
        for supplement in &self.supplements {
            if supplement.detect(&self.files) {
                info!(supplement = supplement.name(), "framework detected");
                supplement.analyze(model, &self.files);
            }
        }

        if let Err(reason) = model.check_invariants() {
            // a supplement producing a dangling link is a bug worth
            // surfacing, not a reason to drop the whole model
            warn!(reason, "model invariant violated after supplements");
        }
    }

    fn derive_targets(&self, model: &mut SystemModel) {
        let mut targets = Vec::new();

        // endpoints always lead the queue
        for endpoint in &model.endpoints {
            let mut priority: u8 = 90;
            if !endpoint.path_params.is_empty() {
                priority += 5;
            }
            if matches!(endpoint.method.as_str(), "POST" | "PUT" | "DELETE" | "PATCH") {
                priority += 5;
            }
            let priority = priority.min(100);
            targets.push(TestTarget {
                kind: TargetKind::Endpoint,
                target_id: endpoint.id.clone(),
                file: endpoint.file.clone(),
                start_line: endpoint.line,
                end_line: endpoint.line,
                priority,
                risk: f64::from(priority) / 100.0,
                reason: format!(
                    "{} endpoint {} {}",
                    endpoint.framework, endpoint.method, endpoint.path
                ),
            });
        }

        for func in &model.functions {
            let params = func.parameters.len() as u32;
            let (kind, priority, reason) = if func.exported {
                let priority =
                    50 + (func.complexity.saturating_sub(1) * 5).min(20) + (params * 5).min(10);
                let kind = if func.class_name.is_some() {
                    TargetKind::Method
                } else {
                    TargetKind::Function
                };
                (
                    kind,
                    priority as u8,
                    format!("exported {} (complexity {})", func.name, func.complexity),
                )
            } else {
                if func.complexity < PRIVATE_COMPLEXITY_GATE {
                    continue;
                }
                let priority = 20
                    + ((func.complexity - PRIVATE_COMPLEXITY_GATE) * 5).min(25)
                    + (params * 2).min(5);
                let kind = if func.class_name.is_some() {
                    TargetKind::Method
                } else {
                    TargetKind::Function
                };
                (
                    kind,
                    priority as u8,
                    format!("complex private {} (complexity {})", func.name, func.complexity),
                )
            };

            targets.push(TestTarget {
                kind,
                target_id: func.id.clone(),
                file: func.file.clone(),
                start_line: func.start_line,
                end_line: func.end_line,
                priority,
                risk: f64::from(priority) / 100.0,
                reason,
            });
        }

        // classes inherit the best score among their methods
        for class_info in &model.types {
            let best = model
                .functions
                .iter()
                .filter(|f| f.class_name.as_deref() == Some(class_info.name.as_str()))
                .filter_map(|f| {
                    targets
                        .iter()
                        .find(|t| t.target_id == f.id)
                        .map(|t| t.priority)
                })
                .max();
            if let Some(priority) = best {
                targets.push(TestTarget {
                    kind: TargetKind::Class,
                    target_id: class_info.id.clone(),
                    file: class_info.file.clone(),
                    start_line: 0,
                    end_line: 0,
                    priority,
                    risk: f64::from(priority) / 100.0,
                    reason: format!("{} {}", class_info.kind, class_info.name),
                });
            }
        }

        // priority descending; ties keep source order (stable sort)
        targets.sort_by(|a, b| b.priority.cmp(&a.priority));
        model.test_targets = targets;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::SourceExtractor;

    const GO_FIXTURE: &str = r#"package mathutil

func Add(a, b int) int {
	return a + b
}

func IsEven(n int) bool {
	return n%2 == 0
}
"#;

    fn build_from(path: &str, source: &str, language: SourceLanguage) -> SystemModel {
        let extractor = SourceExtractor::new();
        let parsed = extractor.parse_source(path, source, language).unwrap();
        let mut builder = ModelBuilder::new("demo", "main", "abc123");
        builder.add_file(parsed);
        builder.build().unwrap()
    }

    #[test]
    fn test_add_is_even_priorities() {
        let model = build_from("mathutil/math.go", GO_FIXTURE, SourceLanguage::Go);

        assert_eq!(model.test_targets.len(), 2);
        let add = &model.test_targets[0];
        let is_even = &model.test_targets[1];
        assert_eq!(add.priority, 60);
        assert_eq!(is_even.priority, 55);
        assert_eq!(add.kind, TargetKind::Function);
    }

    #[test]
    fn test_duplicate_files_collapse() {
        let extractor = SourceExtractor::new();
        let parsed = extractor
            .parse_source("m.go", GO_FIXTURE, SourceLanguage::Go)
            .unwrap();
        let mut builder = ModelBuilder::new("demo", "main", "abc123");
        builder.add_file(parsed.clone());
        builder.add_file(parsed);
        let model = builder.build().unwrap();

        assert_eq!(model.functions.len(), 2);
        assert!(model.check_invariants().is_ok());
    }

    #[test]
    fn test_build_is_deterministic() {
        let extractor = SourceExtractor::new();
        let parsed = extractor
            .parse_source("m.go", GO_FIXTURE, SourceLanguage::Go)
            .unwrap();

        let mut builder = ModelBuilder::new("demo", "main", "abc123");
        builder.add_file(parsed.clone());
        let mut a = builder.build().unwrap();

        let mut builder = ModelBuilder::new("demo", "main", "abc123");
        builder.add_file(parsed);
        let mut b = builder.build().unwrap();

        // creation timestamps differ; everything else must not
        let epoch = chrono::DateTime::<chrono::Utc>::UNIX_EPOCH;
        a.created_at = epoch;
        b.created_at = epoch;
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_gin_endpoint_model() {
        let source = r#"package main

import "github.com/gin-gonic/gin"

func getUser(c *gin.Context) {
	c.JSON(200, nil)
}

func main() {
	r := gin.Default()
	r.GET("/users/:id", getUser)
}
"#;
        let model = build_from("main.go", source, SourceLanguage::Go);

        assert_eq!(model.endpoints.len(), 1);
        let ep = &model.endpoints[0];
        assert_eq!(ep.framework, "gin");
        assert_eq!(ep.path_params, vec!["id"]);
        // handler cross-links to the parsed function
        let handler_id = ep.handler_id.as_ref().unwrap();
        assert_eq!(model.resolve_function(handler_id).unwrap().name, "getUser");

        let endpoint_target = model
            .test_targets
            .iter()
            .find(|t| t.kind == TargetKind::Endpoint)
            .unwrap();
        assert_eq!(endpoint_target.priority, 95);
    }

    #[test]
    fn test_private_functions_gated_by_complexity() {
        let source = r#"package rules

func simple(x int) int {
	return x
}

func gnarly(x int) int {
	if x > 0 {
		if x > 10 {
			return 3
		}
		for i := 0; i < x; i++ {
			if i%2 == 0 {
				x++
			}
		}
		return 2
	}
	return 1
}
"#;
        let model = build_from("rules/rules.go", source, SourceLanguage::Go);

        assert!(!model
            .test_targets
            .iter()
            .any(|t| t.reason.contains("simple")));
        let gnarly = model
            .test_targets
            .iter()
            .find(|t| t.reason.contains("gnarly"))
            .unwrap();
        assert!(gnarly.priority >= 20 && gnarly.priority <= 50);
    }

    #[test]
    fn test_languages_first_seen_order() {
        let extractor = SourceExtractor::new();
        let go = extractor
            .parse_source("a.go", "package a\nfunc A() {}\n", SourceLanguage::Go)
            .unwrap();
        let py = extractor
            .parse_source("b.py", "def b():\n    pass\n", SourceLanguage::Python)
            .unwrap();
        let go2 = extractor
            .parse_source("c.go", "package c\nfunc C() {}\n", SourceLanguage::Go)
            .unwrap();

        let mut builder = ModelBuilder::new("demo", "main", "");
        builder.add_file(go);
        builder.add_file(py);
        builder.add_file(go2);
        let model = builder.build().unwrap();

        assert_eq!(
            model.languages,
            vec![SourceLanguage::Go, SourceLanguage::Python]
        );
    }
}
