//! # Framework Supplements
//!
//! Per-framework enrichers that discover HTTP endpoint declarations in an
//! already-built model. Detection is a cheap string scan for import or
//! manifest markers; analysis applies language-aware regexes to files of
//! the relevant language only.
//!
//! When two supplements claim the same (method, path, file, line) the
//! first-registered supplement wins; registration order is Express, Gin,
//! FastAPI.

use regex::Regex;
use tracing::debug;

use qforge_core::{symbol_id, Endpoint, ParsedFile, SourceLanguage, SystemModel};

/// A per-framework endpoint discoverer
pub trait FrameworkSupplement: Send + Sync {
    fn name(&self) -> &'static str;

    /// Cheap detection over raw file texts; no parsing
    fn detect(&self, files: &[ParsedFile]) -> bool;

    /// Discover endpoints and append them to the model
    fn analyze(&self, model: &mut SystemModel, files: &[ParsedFile]);
}

/// The default registry, in documented registration order
pub fn default_supplements() -> Vec<Box<dyn FrameworkSupplement>> {
    vec![
        Box::new(ExpressSupplement::new()),
        Box::new(GinSupplement::new()),
        Box::new(FastApiSupplement::new()),
    ]
}

/// Extract `:name` and `{name}` segments in declaration order
pub fn extract_path_params(path: &str) -> Vec<String> {
    let mut params = Vec::new();
    for segment in path.split('/') {
        if let Some(name) = segment.strip_prefix(':') {
            if !name.is_empty() {
                params.push(name.to_string());
            }
        } else if segment.starts_with('{') && segment.ends_with('}') && segment.len() > 2 {
            params.push(segment[1..segment.len() - 1].to_string());
        }
    }
    params
}

/// Append an endpoint unless the same (method, path, file, line) is
/// already claimed; cross-link the handler when the symbol resolves.
fn push_endpoint(
    model: &mut SystemModel,
    framework: &str,
    method: &str,
    path: &str,
    handler: &str,
    file: &str,
    line: u32,
) {
    let method = method.to_uppercase();
    let duplicate = model
        .endpoints
        .iter()
        .any(|e| e.method == method && e.path == path && e.file == file && e.line == line);
    if duplicate {
        debug!(method, path, file, line, "endpoint already claimed, keeping first registration");
        return;
    }

    let handler_id = model
        .functions
        .iter()
        .find(|f| f.name == handler)
        .map(|f| f.id.clone());

    let path_params = extract_path_params(path);
    model.endpoints.push(Endpoint {
        id: symbol_id(file, &format!("{method} {path}"), line),
        method,
        path: path.to_string(),
        handler: handler.to_string(),
        handler_id,
        file: file.to_string(),
        line,
        framework: framework.to_string(),
        path_params,
        query_schema: None,
        body_schema: None,
    });
}

fn line_of_offset(text: &str, offset: usize) -> u32 {
    text[..offset].bytes().filter(|b| *b == b'\n').count() as u32 + 1
}

// ============================================================================
// EXPRESS (javascript / typescript)
// ============================================================================

pub struct ExpressSupplement {
    route_re: Regex,
}

impl ExpressSupplement {
    pub fn new() -> Self {
        Self {
            // app.get('/users/:id', getUser) / router.post("/x", handler)
            route_re: Regex::new(
                r#"(?m)\b(?:app|router)\.(get|post|put|delete|patch|head|options)\s*\(\s*['"`]([^'"`]+)['"`]\s*,\s*([A-Za-z_$][\w$.]*)"#,
            )
            .unwrap(),
        }
    }
}

impl Default for ExpressSupplement {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameworkSupplement for ExpressSupplement {
    fn name(&self) -> &'static str {
        "express"
    }

    fn detect(&self, files: &[ParsedFile]) -> bool {
        files.iter().any(|f| {
            f.language.is_ecmascript()
                && (f.source.contains("require('express')")
                    || f.source.contains("require(\"express\")")
                    || f.source.contains("from 'express'")
                    || f.source.contains("from \"express\""))
        })
    }

    fn analyze(&self, model: &mut SystemModel, files: &[ParsedFile]) {
        for file in files.iter().filter(|f| f.language.is_ecmascript()) {
            for caps in self.route_re.captures_iter(&file.source) {
                let line = line_of_offset(&file.source, caps.get(0).unwrap().start());
                let handler = caps[3].rsplit('.').next().unwrap_or(&caps[3]).to_string();
                push_endpoint(model, self.name(), &caps[1], &caps[2], &handler, &file.path, line);
            }
        }
    }
}

// ============================================================================
// GIN (go)
// ============================================================================

pub struct GinSupplement {
    route_re: Regex,
}

impl GinSupplement {
    pub fn new() -> Self {
        Self {
            // r.GET("/users/:id", getUser) / group.POST("/items", h.Create)
            route_re: Regex::new(
                r#"(?m)\b\w+\.(GET|POST|PUT|DELETE|PATCH|HEAD|OPTIONS)\s*\(\s*"([^"]+)"\s*,\s*([A-Za-z_][\w.]*)"#,
            )
            .unwrap(),
        }
    }
}

impl Default for GinSupplement {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameworkSupplement for GinSupplement {
    fn name(&self) -> &'static str {
        "gin"
    }

    fn detect(&self, files: &[ParsedFile]) -> bool {
        files.iter().any(|f| {
            f.language == SourceLanguage::Go && f.source.contains("github.com/gin-gonic/gin")
        })
    }

    fn analyze(&self, model: &mut SystemModel, files: &[ParsedFile]) {
        for file in files.iter().filter(|f| f.language == SourceLanguage::Go) {
            for caps in self.route_re.captures_iter(&file.source) {
                let line = line_of_offset(&file.source, caps.get(0).unwrap().start());
                let handler = caps[3].rsplit('.').next().unwrap_or(&caps[3]).to_string();
                push_endpoint(model, self.name(), &caps[1], &caps[2], &handler, &file.path, line);
            }
        }
    }
}

// ============================================================================
// FASTAPI (python)
// ============================================================================

pub struct FastApiSupplement {
    route_re: Regex,
    def_re: Regex,
}

impl FastApiSupplement {
    pub fn new() -> Self {
        Self {
            // @app.get("/users/{user_id}") / @router.post('/items')
            route_re: Regex::new(
                r#"(?m)^\s*@(?:app|router)\.(get|post|put|delete|patch|head|options)\s*\(\s*['"]([^'"]+)['"]"#,
            )
            .unwrap(),
            def_re: Regex::new(r"(?m)^\s*(?:async\s+)?def\s+([A-Za-z_]\w*)").unwrap(),
        }
    }
}

impl Default for FastApiSupplement {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameworkSupplement for FastApiSupplement {
    fn name(&self) -> &'static str {
        "fastapi"
    }

    fn detect(&self, files: &[ParsedFile]) -> bool {
        files.iter().any(|f| {
            f.language == SourceLanguage::Python
                && (f.source.contains("from fastapi") || f.source.contains("import fastapi"))
        })
    }

    fn analyze(&self, model: &mut SystemModel, files: &[ParsedFile]) {
        for file in files.iter().filter(|f| f.language == SourceLanguage::Python) {
            for caps in self.route_re.captures_iter(&file.source) {
                let m = caps.get(0).unwrap();
                let line = line_of_offset(&file.source, m.start());
                // handler is the decorated function that follows the route
                let handler = self
                    .def_re
                    .captures(&file.source[m.end()..])
                    .map(|d| d[1].to_string())
                    .unwrap_or_default();
                push_endpoint(model, self.name(), &caps[1], &caps[2], &handler, &file.path, line);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn empty_model() -> SystemModel {
        SystemModel {
            repository: "demo".to_string(),
            branch: "main".to_string(),
            commit: String::new(),
            created_at: Utc::now(),
            languages: vec![],
            modules: vec![],
            functions: vec![],
            types: vec![],
            endpoints: vec![],
            test_targets: vec![],
        }
    }

    fn file(path: &str, language: SourceLanguage, source: &str) -> ParsedFile {
        ParsedFile {
            path: path.to_string(),
            language,
            functions: vec![],
            classes: vec![],
            source: source.to_string(),
        }
    }

    #[test]
    fn test_path_param_extraction() {
        assert_eq!(extract_path_params("/users/:id"), vec!["id"]);
        assert_eq!(
            extract_path_params("/orgs/{org}/repos/{repo}"),
            vec!["org", "repo"]
        );
        assert!(extract_path_params("/healthz").is_empty());
    }

    #[test]
    fn test_gin_route_extraction() {
        let source = r#"package main

import "github.com/gin-gonic/gin"

func main() {
	r := gin.Default()
	r.GET("/users/:id", getUser)
	r.POST("/users", createUser)
}
"#;
        let files = vec![file("main.go", SourceLanguage::Go, source)];
        let supplement = GinSupplement::new();
        assert!(supplement.detect(&files));

        let mut model = empty_model();
        supplement.analyze(&mut model, &files);

        assert_eq!(model.endpoints.len(), 2);
        let get = &model.endpoints[0];
        assert_eq!(get.method, "GET");
        assert_eq!(get.path, "/users/:id");
        assert_eq!(get.handler, "getUser");
        assert_eq!(get.path_params, vec!["id"]);
        assert_eq!(get.framework, "gin");
        assert_eq!(get.line, 7);
    }

    #[test]
    fn test_express_route_extraction() {
        let source = r#"const express = require('express');
const app = express();

app.get('/items/:itemId', listItems);
app.post('/items', handlers.createItem);
"#;
        let files = vec![file("app.js", SourceLanguage::Javascript, source)];
        let supplement = ExpressSupplement::new();
        assert!(supplement.detect(&files));

        let mut model = empty_model();
        supplement.analyze(&mut model, &files);

        assert_eq!(model.endpoints.len(), 2);
        assert_eq!(model.endpoints[0].path_params, vec!["itemId"]);
        // member expressions resolve to the trailing symbol
        assert_eq!(model.endpoints[1].handler, "createItem");
    }

    #[test]
    fn test_fastapi_route_extraction() {
        let source = r#"from fastapi import FastAPI

app = FastAPI()

@app.get("/users/{user_id}")
async def read_user(user_id: int):
    return {"id": user_id}
"#;
        let files = vec![file("main.py", SourceLanguage::Python, source)];
        let supplement = FastApiSupplement::new();
        assert!(supplement.detect(&files));

        let mut model = empty_model();
        supplement.analyze(&mut model, &files);

        assert_eq!(model.endpoints.len(), 1);
        let ep = &model.endpoints[0];
        assert_eq!(ep.method, "GET");
        assert_eq!(ep.handler, "read_user");
        assert_eq!(ep.path_params, vec!["user_id"]);
    }

    #[test]
    fn test_duplicate_claim_keeps_first_registration() {
        let mut model = empty_model();
        push_endpoint(&mut model, "express", "GET", "/x", "first", "a.js", 3);
        push_endpoint(&mut model, "gin", "GET", "/x", "second", "a.js", 3);

        assert_eq!(model.endpoints.len(), 1);
        assert_eq!(model.endpoints[0].framework, "express");
        assert_eq!(model.endpoints[0].handler, "first");
    }

    #[test]
    fn test_detect_requires_marker() {
        let files = vec![file(
            "plain.go",
            SourceLanguage::Go,
            "package main\nfunc main() {}\n",
        )];
        assert!(!GinSupplement::new().detect(&files));
        assert!(!ExpressSupplement::new().detect(&files));
        assert!(!FastApiSupplement::new().detect(&files));
    }
}
