//! # Test Specification IR
//!
//! Language-agnostic Given-When-Then representation of a single test.
//! LLM completions are decoded into this shape and validated at the
//! boundary; nothing loosely typed crosses past it.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Assertion vocabulary shared by every emitter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssertionKind {
    Equals,
    NotEquals,
    Contains,
    GreaterThan,
    LessThan,
    Throws,
    Truthy,
    Falsy,
    Nil,
    NotNil,
}

impl AssertionKind {
    pub const ALL: [AssertionKind; 10] = [
        AssertionKind::Equals,
        AssertionKind::NotEquals,
        AssertionKind::Contains,
        AssertionKind::GreaterThan,
        AssertionKind::LessThan,
        AssertionKind::Throws,
        AssertionKind::Truthy,
        AssertionKind::Falsy,
        AssertionKind::Nil,
        AssertionKind::NotNil,
    ];
}

/// Behavioral category of a generated case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecTag {
    HappyPath,
    EdgeCase,
    Boundary,
    ErrorHandling,
}

/// Named, typed initial value in the Given block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GivenValue {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_hint: Option<String>,
    pub value: serde_json::Value,
}

/// The single call under test. Arguments may reference `$name` entries
/// declared in the Given block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhenCall {
    pub symbol: String,
    #[serde(default)]
    pub arguments: Vec<serde_json::Value>,
}

/// One expected outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assertion {
    /// Expression under inspection, usually `result` or a `$name` reference
    pub actual: String,
    #[serde(rename = "type")]
    pub kind: AssertionKind,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub expected: serde_json::Value,
}

/// A complete Given-When-Then test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSpec {
    pub name: String,
    #[serde(default)]
    pub given: Vec<GivenValue>,
    pub when: WhenCall,
    pub then: Vec<Assertion>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<SpecTag>,
}

/// Set of specs produced for one model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecSet {
    pub model_id: String,
    pub repository: String,
    pub specs: Vec<TestSpec>,
}

impl TestSpec {
    /// Enforces the reference invariant: every `$name` mentioned in the
    /// When arguments or any Then `actual` must be declared in Given, and
    /// the Then block must not be empty.
    pub fn validate(&self) -> Result<(), String> {
        if self.then.is_empty() {
            return Err(format!("spec '{}' has an empty then block", self.name));
        }

        let declared: HashSet<&str> = self.given.iter().map(|g| g.name.as_str()).collect();

        for arg in &self.when.arguments {
            if let Some(reference) = as_reference(arg) {
                if !declared.contains(reference) {
                    return Err(format!(
                        "spec '{}' references undeclared ${} in when.arguments",
                        self.name, reference
                    ));
                }
            }
        }

        for assertion in &self.then {
            for reference in references_in(&assertion.actual) {
                if !declared.contains(reference.as_str()) {
                    return Err(format!(
                        "spec '{}' references undeclared ${} in then.actual",
                        self.name, reference
                    ));
                }
            }
        }

        Ok(())
    }

    /// Resolve a When argument to its concrete value, substituting Given
    /// references.
    pub fn resolve_argument(&self, arg: &serde_json::Value) -> serde_json::Value {
        if let Some(reference) = as_reference(arg) {
            if let Some(given) = self.given.iter().find(|g| g.name == reference) {
                return given.value.clone();
            }
        }
        arg.clone()
    }
}

/// `$name` when the value is a string reference, None otherwise
pub fn as_reference(value: &serde_json::Value) -> Option<&str> {
    value
        .as_str()
        .and_then(|s| s.strip_prefix('$'))
        .filter(|s| !s.is_empty())
}

fn references_in(expr: &str) -> Vec<String> {
    let mut refs = Vec::new();
    let mut chars = expr.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        if c == '$' {
            let name: String = expr[idx + 1..]
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_')
                .collect();
            if !name.is_empty() {
                refs.push(name);
            }
        }
    }
    refs
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_spec() -> TestSpec {
        TestSpec {
            name: "adds two numbers".to_string(),
            given: vec![
                GivenValue {
                    name: "a".to_string(),
                    type_hint: Some("int".to_string()),
                    value: json!(2),
                },
                GivenValue {
                    name: "b".to_string(),
                    type_hint: Some("int".to_string()),
                    value: json!(3),
                },
            ],
            when: WhenCall {
                symbol: "Add".to_string(),
                arguments: vec![json!("$a"), json!("$b")],
            },
            then: vec![Assertion {
                actual: "result".to_string(),
                kind: AssertionKind::Equals,
                expected: json!(5),
            }],
            tags: vec![SpecTag::HappyPath],
        }
    }

    #[test]
    fn test_valid_spec() {
        assert!(sample_spec().validate().is_ok());
    }

    #[test]
    fn test_undeclared_when_reference() {
        let mut spec = sample_spec();
        spec.when.arguments.push(json!("$missing"));
        let err = spec.validate().unwrap_err();
        assert!(err.contains("$missing"));
    }

    #[test]
    fn test_undeclared_then_reference() {
        let mut spec = sample_spec();
        spec.then[0].actual = "$ghost".to_string();
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_empty_then_rejected() {
        let mut spec = sample_spec();
        spec.then.clear();
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_argument_resolution() {
        let spec = sample_spec();
        assert_eq!(spec.resolve_argument(&json!("$a")), json!(2));
        assert_eq!(spec.resolve_argument(&json!("$b")), json!(3));
        assert_eq!(spec.resolve_argument(&json!(7)), json!(7));
        // non-reference strings pass through untouched
        assert_eq!(spec.resolve_argument(&json!("plain")), json!("plain"));
    }

    #[test]
    fn test_spec_round_trip() {
        let spec = sample_spec();
        let json = serde_json::to_string(&spec).unwrap();
        assert!(json.contains("\"type\":\"equals\""));
        assert!(json.contains("\"happy_path\""));
        let back: TestSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);
    }

    #[test]
    fn test_assertion_vocabulary_serialization() {
        for kind in AssertionKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            let back: AssertionKind = serde_json::from_str(&json).unwrap();
            assert_eq!(back, kind);
        }
        let gt: AssertionKind = serde_json::from_str("\"greater_than\"").unwrap();
        assert_eq!(gt, AssertionKind::GreaterThan);
    }
}
