//! # System Model
//!
//! Normalized, language-agnostic representation of a parsed repository:
//! functions, classes, HTTP endpoints and derived test targets. The model
//! is an immutable snapshot once built and serializes to stable JSON.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Languages the extractor understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceLanguage {
    Go,
    Python,
    Javascript,
    Jsx,
    Typescript,
    Tsx,
    Java,
}

impl SourceLanguage {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "go" => Some(SourceLanguage::Go),
            "py" => Some(SourceLanguage::Python),
            "js" | "mjs" | "cjs" => Some(SourceLanguage::Javascript),
            "jsx" => Some(SourceLanguage::Jsx),
            "ts" => Some(SourceLanguage::Typescript),
            "tsx" => Some(SourceLanguage::Tsx),
            "java" => Some(SourceLanguage::Java),
            _ => None,
        }
    }

    pub fn from_path(path: &std::path::Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    pub fn tag(&self) -> &'static str {
        match self {
            SourceLanguage::Go => "go",
            SourceLanguage::Python => "python",
            SourceLanguage::Javascript => "javascript",
            SourceLanguage::Jsx => "jsx",
            SourceLanguage::Typescript => "typescript",
            SourceLanguage::Tsx => "tsx",
            SourceLanguage::Java => "java",
        }
    }

    /// Grammar family the language belongs to, used when scoping
    /// framework supplements to relevant files.
    pub fn is_ecmascript(&self) -> bool {
        matches!(
            self,
            SourceLanguage::Javascript
                | SourceLanguage::Jsx
                | SourceLanguage::Typescript
                | SourceLanguage::Tsx
        )
    }
}

/// Stable identifier for a symbol declared at a known location.
///
/// Re-parsing identical bytes yields the identical id.
pub fn symbol_id(file_path: &str, name: &str, start_line: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(file_path.as_bytes());
    hasher.update(b"::");
    hasher.update(name.as_bytes());
    hasher.update(b"::");
    hasher.update(start_line.to_string().as_bytes());
    let digest = hasher.finalize();
    hex_prefix(&digest, 16)
}

fn hex_prefix(bytes: &[u8], chars: usize) -> String {
    let mut out = String::with_capacity(chars);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
        if out.len() >= chars {
            break;
        }
    }
    out.truncate(chars);
    out
}

/// Function parameter in declaration order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedParameter {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default)]
    pub optional: bool,
}

/// A function extracted from source, immutable after extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedFunction {
    pub id: String,
    pub name: String,
    pub file: String,
    pub start_line: u32,
    pub end_line: u32,
    pub parameters: Vec<ParsedParameter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    pub body: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<String>,
    pub exported: bool,
    pub is_async: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    pub complexity: u32,
}

/// Property of a class or struct
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedProperty {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_hint: Option<String>,
    pub exported: bool,
}

/// A class, struct or interface extracted from source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedClass {
    pub id: String,
    pub name: String,
    pub file: String,
    pub start_line: u32,
    pub end_line: u32,
    pub methods: Vec<ParsedFunction>,
    pub properties: Vec<ParsedProperty>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extends: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub implements: Vec<String>,
}

/// Normalized parse result for one source file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedFile {
    pub path: String,
    pub language: SourceLanguage,
    pub functions: Vec<ParsedFunction>,
    pub classes: Vec<ParsedClass>,
    /// Original text, kept so framework supplements can scan route
    /// declarations the structural pass does not capture.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
}

/// HTTP endpoint discovered by a framework supplement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: String,
    /// Upper-case HTTP method
    pub method: String,
    /// Route path, may contain `:param` or `{param}` segments
    pub path: String,
    /// Handler symbol as written at the call site
    pub handler: String,
    /// Id of the handler function when it resolves inside the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler_id: Option<String>,
    pub file: String,
    pub line: u32,
    pub framework: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path_params: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_schema: Option<String>,
}

/// What a test target points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Endpoint,
    Function,
    Method,
    Class,
    Block,
}

/// A risk-scored candidate for test generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestTarget {
    pub kind: TargetKind,
    pub target_id: String,
    pub file: String,
    pub start_line: u32,
    pub end_line: u32,
    /// 0-100, higher generates earlier
    pub priority: u8,
    /// 0.0-1.0 estimated defect risk
    pub risk: f64,
    pub reason: String,
}

/// Module grouping within the model (one per source directory)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub name: String,
    pub path: String,
    pub files: Vec<String>,
}

/// Named type observed in the repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeInfo {
    pub id: String,
    pub name: String,
    pub file: String,
    pub kind: String,
}

/// Complete system model for a repository snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemModel {
    pub repository: String,
    pub branch: String,
    pub commit: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Languages of contained files in first-seen order
    pub languages: Vec<SourceLanguage>,
    pub modules: Vec<ModuleInfo>,
    pub functions: Vec<ParsedFunction>,
    pub types: Vec<TypeInfo>,
    pub endpoints: Vec<Endpoint>,
    pub test_targets: Vec<TestTarget>,
}

impl SystemModel {
    /// Resolve a function id to its canonical record. Endpoints hold ids,
    /// never owning pointers; this is the resolver side of that contract.
    pub fn resolve_function(&self, id: &str) -> Option<&ParsedFunction> {
        self.functions.iter().find(|f| f.id == id)
    }

    /// Look up a function by bare symbol name (first match in model order)
    pub fn function_by_name(&self, name: &str) -> Option<&ParsedFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Id-indexed view for repeated lookups
    pub fn function_index(&self) -> HashMap<&str, &ParsedFunction> {
        self.functions.iter().map(|f| (f.id.as_str(), f)).collect()
    }

    /// Model-level invariants: unique function ids, endpoint cross-links
    /// that resolve, handler symbol agreement.
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut seen = std::collections::HashSet::new();
        for f in &self.functions {
            if !seen.insert(f.id.as_str()) {
                return Err(format!("duplicate function id {}", f.id));
            }
        }
        for ep in &self.endpoints {
            if let Some(handler_id) = &ep.handler_id {
                match self.resolve_function(handler_id) {
                    None => {
                        return Err(format!(
                            "endpoint {} {} links to unknown function {}",
                            ep.method, ep.path, handler_id
                        ));
                    }
                    Some(f) if !ep.handler.is_empty() && f.name != ep.handler => {
                        return Err(format!(
                            "endpoint {} {} handler symbol {} disagrees with linked function {}",
                            ep.method, ep.path, ep.handler, f.name
                        ));
                    }
                    _ => {}
                }
            } else if ep.handler.is_empty() {
                return Err(format!(
                    "endpoint {} {} carries neither handler id nor symbol",
                    ep.method, ep.path
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
    fn test_symbol_id_stability() {
        let a = symbol_id("src/math.go", "Add", 10);
        let b = symbol_id("src/math.go", "Add", 10);
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);

        let c = symbol_id("src/math.go", "Add", 11);
        assert_ne!(a, c);
    }

    #[test]
    fn test_language_from_extension() {
        assert_eq!(SourceLanguage::from_extension("go"), Some(SourceLanguage::Go));
        assert_eq!(SourceLanguage::from_extension("tsx"), Some(SourceLanguage::Tsx));
        assert_eq!(SourceLanguage::from_extension("java"), Some(SourceLanguage::Java));
        assert_eq!(SourceLanguage::from_extension("rb"), None);
    }

    #[test]
    fn test_model_invariants() {
        let func = ParsedFunction {
            id: symbol_id("api.go", "getUser", 5),
            name: "getUser".to_string(),
            file: "api.go".to_string(),
            start_line: 5,
            end_line: 12,
            parameters: vec![],
            return_type: None,
            body: String::new(),
            comments: vec![],
            exported: false,
            is_async: false,
            class_name: None,
            complexity: 1,
        };

        let mut model = SystemModel {
            repository: "demo".to_string(),
            branch: "main".to_string(),
            commit: "abc123".to_string(),
            created_at: chrono::Utc::now(),
            languages: vec![SourceLanguage::Go],
            modules: vec![],
            functions: vec![func.clone()],
            types: vec![],
            endpoints: vec![Endpoint {
                id: "ep-1".to_string(),
                method: "GET".to_string(),
                path: "/users/:id".to_string(),
                handler: "getUser".to_string(),
                handler_id: Some(func.id.clone()),
                file: "api.go".to_string(),
                line: 20,
                framework: "gin".to_string(),
                path_params: vec!["id".to_string()],
                query_schema: None,
                body_schema: None,
            }],
            test_targets: vec![],
        };
        assert!(model.check_invariants().is_ok());

        // duplicate ids are rejected
        model.functions.push(func);
        assert!(model.check_invariants().is_err());
    }

    #[test]
    fn test_model_json_round_trip() {
        let model = SystemModel {
            repository: "demo".to_string(),
            branch: "main".to_string(),
            commit: "abc123".to_string(),
            created_at: chrono::Utc::now(),
            languages: vec![SourceLanguage::Go, SourceLanguage::Python],
            modules: vec![ModuleInfo {
                name: "api".to_string(),
                path: "src/api".to_string(),
                files: vec!["src/api/users.go".to_string()],
            }],
            functions: vec![],
            types: vec![],
            endpoints: vec![],
            test_targets: vec![],
        };

        let json = serde_json::to_string(&model).unwrap();
        let back: SystemModel = serde_json::from_str(&json).unwrap();
        assert_eq!(back.repository, model.repository);
        assert_eq!(back.languages, model.languages);
        assert_eq!(serde_json::to_string(&back).unwrap(), json);
    }
}
