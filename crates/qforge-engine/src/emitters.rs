//! # Test Emitters
//!
//! Render Given-When-Then specs into source code for a target test
//! framework. Given becomes setup, When becomes the call (or HTTP
//! invocation for api-level specs), Then maps the shared assertion
//! vocabulary onto framework idioms. Every emitter is total over the
//! assertion vocabulary.

use regex::Regex;
use serde_json::Value;

use qforge_core::{
    Assertion, AssertionKind, EmittedTest, QForgeError, QResult, TestSpec,
};

/// What an emitter needs besides the specs themselves
pub struct EmitRequest<'a> {
    /// Target symbol: a function name, or `METHOD /path` for api specs
    pub symbol: &'a str,
    /// Package / module hint for file headers
    pub module: &'a str,
    pub specs: &'a [TestSpec],
}

pub trait Emitter: Send + Sync {
    fn framework(&self) -> &'static str;
    fn language(&self) -> &'static str;
    fn file_name(&self, symbol: &str) -> String;
    fn emit(&self, request: &EmitRequest) -> QResult<EmittedTest>;
}

/// Maps language tags to their registered emitter
pub struct EmitterRegistry {
    emitters: Vec<Box<dyn Emitter>>,
}

impl EmitterRegistry {
    pub fn with_defaults() -> Self {
        Self {
            emitters: vec![
                Box::new(GoTestEmitter),
                Box::new(PytestEmitter),
                Box::new(JestEmitter { typescript: false }),
                Box::new(JestEmitter { typescript: true }),
                Box::new(JunitEmitter),
            ],
        }
    }

    pub fn for_language(&self, tag: &str) -> Option<&dyn Emitter> {
        let normalized = match tag {
            "jsx" => "javascript",
            "tsx" => "typescript",
            other => other,
        };
        self.emitters
            .iter()
            .find(|e| e.language() == normalized)
            .map(|e| e.as_ref())
    }
}

fn is_api_symbol(symbol: &str) -> bool {
    Regex::new(r"^[A-Z]+ /").unwrap().is_match(symbol)
}

fn split_api_symbol(symbol: &str) -> (String, String) {
    let mut parts = symbol.splitn(2, ' ');
    let method = parts.next().unwrap_or("GET").to_string();
    let path = parts.next().unwrap_or("/").to_string();
    (method, path)
}

/// Substitute `:param` / `{param}` segments with Given values when a
/// matching name is declared.
fn substitute_path(path: &str, spec: &TestSpec) -> String {
    path.split('/')
        .map(|segment| {
            let param = segment
                .strip_prefix(':')
                .or_else(|| segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')));
            match param.and_then(|p| spec.given.iter().find(|g| g.name == p)) {
                Some(given) => match &given.value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                },
                None => segment.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn sanitize(symbol: &str) -> String {
    let cleaned: String = symbol
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    cleaned.trim_matches('_').to_string()
}

fn snake_case(text: &str) -> String {
    let mut out = String::new();
    let mut prev_lower = false;
    for c in sanitize(text).chars() {
        if c.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower = false;
        } else {
            if c != '_' {
                prev_lower = true;
            } else {
                prev_lower = false;
            }
            out.push(c);
        }
    }
    out.split('_').filter(|s| !s.is_empty()).collect::<Vec<_>>().join("_")
}

fn pascal_case(text: &str) -> String {
    snake_case(text)
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

fn camel_case(text: &str) -> String {
    let pascal = pascal_case(text);
    let mut chars = pascal.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn assertion_total(specs: &[TestSpec]) -> u64 {
    specs.iter().map(|s| s.then.len() as u64).sum()
}

// ============================================================================
// GO (testing package)
// ============================================================================

pub struct GoTestEmitter;

impl GoTestEmitter {
    /// Go setup cannot use unreferenced locals, so Given values are
    /// inlined into the call and documented as comments.
    fn literal(value: &Value) -> String {
        match value {
            Value::Null => "nil".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => format!("{s:?}"),
            Value::Array(items) => {
                let rendered: Vec<String> = items.iter().map(Self::literal).collect();
                format!("[]any{{{}}}", rendered.join(", "))
            }
            Value::Object(map) => {
                let rendered: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{k:?}: {}", Self::literal(v)))
                    .collect();
                format!("map[string]any{{{}}}", rendered.join(", "))
            }
        }
    }

    fn actual_expr(spec: &TestSpec, actual: &str) -> String {
        if actual == "result" {
            return "result".to_string();
        }
        if let Some(name) = actual.strip_prefix('$') {
            if let Some(given) = spec.given.iter().find(|g| g.name == name) {
                return Self::literal(&given.value);
            }
        }
        actual.to_string()
    }

    fn assertion(out: &mut String, spec: &TestSpec, assertion: &Assertion) {
        let actual = Self::actual_expr(spec, &assertion.actual);
        let expected = Self::literal(&assertion.expected);
        let line = match assertion.kind {
            AssertionKind::Equals => format!(
                "\tif {actual} != {expected} {{\n\t\tt.Errorf(\"expected %v, got %v\", {expected}, {actual})\n\t}}\n"
            ),
            AssertionKind::NotEquals => format!(
                "\tif {actual} == {expected} {{\n\t\tt.Errorf(\"did not expect %v\", {actual})\n\t}}\n"
            ),
            AssertionKind::Contains => format!(
                "\tif !strings.Contains({actual}, {expected}) {{\n\t\tt.Errorf(\"expected %v to contain %v\", {actual}, {expected})\n\t}}\n"
            ),
            AssertionKind::GreaterThan => format!(
                "\tif !({actual} > {expected}) {{\n\t\tt.Errorf(\"expected %v > %v\", {actual}, {expected})\n\t}}\n"
            ),
            AssertionKind::LessThan => format!(
                "\tif !({actual} < {expected}) {{\n\t\tt.Errorf(\"expected %v < %v\", {actual}, {expected})\n\t}}\n"
            ),
            // throws is handled by the deferred recover around the call
            AssertionKind::Throws => String::new(),
            AssertionKind::Truthy => format!(
                "\tif !{actual} {{\n\t\tt.Errorf(\"expected {actual} to be true\")\n\t}}\n"
            ),
            AssertionKind::Falsy => format!(
                "\tif {actual} {{\n\t\tt.Errorf(\"expected {actual} to be false\")\n\t}}\n"
            ),
            AssertionKind::Nil => format!(
                "\tif {actual} != nil {{\n\t\tt.Errorf(\"expected nil, got %v\", {actual})\n\t}}\n"
            ),
            AssertionKind::NotNil => format!(
                "\tif {actual} == nil {{\n\t\tt.Errorf(\"expected non-nil\")\n\t}}\n"
            ),
        };
        out.push_str(&line);
    }

    fn emit_unit_case(&self, symbol: &str, spec: &TestSpec, out: &mut String) {
        for given in &spec.given {
            out.push_str(&format!(
                "\t// given: {} = {}\n",
                given.name,
                Self::literal(&given.value)
            ));
        }

        let args: Vec<String> = spec
            .when
            .arguments
            .iter()
            .map(|a| Self::literal(&spec.resolve_argument(a)))
            .collect();
        let call = format!("{}({})", spec.when.symbol.split(' ').next().unwrap_or(symbol), args.join(", "));

        let expects_panic = spec.then.iter().any(|a| a.kind == AssertionKind::Throws);
        if expects_panic {
            out.push_str("\tdefer func() {\n\t\tif recover() == nil {\n\t\t\tt.Errorf(\"expected panic\")\n\t\t}\n\t}()\n");
            out.push_str(&format!("\t{call}\n"));
            return;
        }

        let uses_result = spec.then.iter().any(|a| a.actual.contains("result"));
        if uses_result {
            out.push_str(&format!("\tresult := {call}\n"));
        } else {
            out.push_str(&format!("\t{call}\n"));
        }

        for assertion in &spec.then {
            Self::assertion(out, spec, assertion);
        }
    }

    fn emit_api_case(&self, spec: &TestSpec, out: &mut String) {
        let (method, path) = split_api_symbol(&spec.when.symbol);
        let path = substitute_path(&path, spec);

        out.push_str("\tbaseURL := os.Getenv(\"TEST_SERVER_URL\")\n");
        match method.as_str() {
            "POST" | "PUT" | "PATCH" => {
                out.push_str(&format!(
                    "\treq, _ := http.NewRequest({method:?}, baseURL+{path:?}, strings.NewReader(\"{{}}\"))\n"
                ));
                out.push_str("\treq.Header.Set(\"Content-Type\", \"application/json\")\n");
                out.push_str("\tresp, err := http.DefaultClient.Do(req)\n");
            }
            _ => {
                out.push_str(&format!("\tresp, err := http.Get(baseURL + {path:?})\n"));
            }
        }
        out.push_str("\tif err != nil {\n\t\tt.Fatalf(\"request failed: %v\", err)\n\t}\n");
        out.push_str("\tdefer resp.Body.Close()\n");
        out.push_str("\tbody, _ := io.ReadAll(resp.Body)\n");
        out.push_str("\tresult := string(body)\n");
        out.push_str("\t_ = result\n");

        for assertion in &spec.then {
            // status assertions address the response code directly
            if assertion.actual == "status" {
                let expected = Self::literal(&assertion.expected);
                out.push_str(&format!(
                    "\tif resp.StatusCode != {expected} {{\n\t\tt.Errorf(\"expected status %v, got %v\", {expected}, resp.StatusCode)\n\t}}\n"
                ));
            } else {
                Self::assertion(out, spec, assertion);
            }
        }
    }
}

impl Emitter for GoTestEmitter {
    fn framework(&self) -> &'static str {
        "go-test"
    }

    fn language(&self) -> &'static str {
        "go"
    }

    fn file_name(&self, symbol: &str) -> String {
        format!("{}_test.go", snake_case(symbol))
    }

    fn emit(&self, request: &EmitRequest) -> QResult<EmittedTest> {
        let api = is_api_symbol(request.symbol);

        let mut body = String::new();
        for spec in request.specs {
            let test_name = format!(
                "Test{}_{}",
                pascal_case(request.symbol),
                pascal_case(&spec.name)
            );
            body.push_str(&format!("func {test_name}(t *testing.T) {{\n"));
            if api || is_api_symbol(&spec.when.symbol) {
                self.emit_api_case(spec, &mut body);
            } else {
                self.emit_unit_case(request.symbol, spec, &mut body);
            }
            body.push_str("}\n\n");
        }

        let mut imports = vec!["\"testing\""];
        if body.contains("strings.") {
            imports.push("\"strings\"");
        }
        if body.contains("http.") {
            imports.push("\"net/http\"");
        }
        if body.contains("io.ReadAll") {
            imports.push("\"io\"");
        }
        if body.contains("os.Getenv") {
            imports.push("\"os\"");
        }
        imports.sort();

        let mut source = format!("package {}\n\nimport (\n", sanitize(request.module));
        for import in imports {
            source.push_str(&format!("\t{import}\n"));
        }
        source.push_str(")\n\n");
        source.push_str(&body);

        Ok(EmittedTest {
            path: self.file_name(request.symbol),
            language: "go".to_string(),
            framework: self.framework().to_string(),
            source,
            assertion_count: assertion_total(request.specs),
        })
    }
}

// ============================================================================
// PYTHON (pytest)
// ============================================================================

pub struct PytestEmitter;

impl PytestEmitter {
    fn literal(value: &Value) -> String {
        match value {
            Value::Null => "None".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => format!("{s:?}"),
            Value::Array(items) => {
                let rendered: Vec<String> = items.iter().map(Self::literal).collect();
                format!("[{}]", rendered.join(", "))
            }
            Value::Object(map) => {
                let rendered: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{k:?}: {}", Self::literal(v)))
                    .collect();
                format!("{{{}}}", rendered.join(", "))
            }
        }
    }

    fn actual_expr(actual: &str) -> String {
        actual.strip_prefix('$').unwrap_or(actual).to_string()
    }

    fn assertion(out: &mut String, assertion: &Assertion) {
        let actual = Self::actual_expr(&assertion.actual);
        let expected = Self::literal(&assertion.expected);
        let line = match assertion.kind {
            AssertionKind::Equals => format!("    assert {actual} == {expected}\n"),
            AssertionKind::NotEquals => format!("    assert {actual} != {expected}\n"),
            AssertionKind::Contains => format!("    assert {expected} in {actual}\n"),
            AssertionKind::GreaterThan => format!("    assert {actual} > {expected}\n"),
            AssertionKind::LessThan => format!("    assert {actual} < {expected}\n"),
            AssertionKind::Throws => String::new(),
            AssertionKind::Truthy => format!("    assert {actual}\n"),
            AssertionKind::Falsy => format!("    assert not {actual}\n"),
            AssertionKind::Nil => format!("    assert {actual} is None\n"),
            AssertionKind::NotNil => format!("    assert {actual} is not None\n"),
        };
        out.push_str(&line);
    }
}

impl Emitter for PytestEmitter {
    fn framework(&self) -> &'static str {
        "pytest"
    }

    fn language(&self) -> &'static str {
        "python"
    }

    fn file_name(&self, symbol: &str) -> String {
        format!("test_{}.py", snake_case(symbol))
    }

    fn emit(&self, request: &EmitRequest) -> QResult<EmittedTest> {
        let mut body = String::new();
        let mut uses_requests = false;
        let mut uses_pytest = false;

        for spec in request.specs {
            let test_name = format!("test_{}", snake_case(&spec.name));
            body.push_str(&format!("def {test_name}():\n"));

            for given in &spec.given {
                body.push_str(&format!(
                    "    {} = {}\n",
                    given.name,
                    Self::literal(&given.value)
                ));
            }

            if is_api_symbol(&spec.when.symbol) {
                uses_requests = true;
                let (method, path) = split_api_symbol(&spec.when.symbol);
                let path = substitute_path(&path, spec);
                body.push_str(
                    "    base_url = os.environ.get(\"TEST_SERVER_URL\", \"http://localhost:8000\")\n",
                );
                body.push_str(&format!(
                    "    response = requests.{}(base_url + {path:?})\n",
                    method.to_lowercase()
                ));
                body.push_str("    result = response.text\n");
                for assertion in &spec.then {
                    if assertion.actual == "status" {
                        body.push_str(&format!(
                            "    assert response.status_code == {}\n",
                            Self::literal(&assertion.expected)
                        ));
                    } else {
                        Self::assertion(&mut body, assertion);
                    }
                }
            } else {
                let args: Vec<String> = spec
                    .when
                    .arguments
                    .iter()
                    .map(|a| match qforge_core::as_reference(a) {
                        Some(name) => name.to_string(),
                        None => Self::literal(a),
                    })
                    .collect();
                let call = format!("{}({})", spec.when.symbol, args.join(", "));

                if spec.then.iter().any(|a| a.kind == AssertionKind::Throws) {
                    uses_pytest = true;
                    body.push_str("    with pytest.raises(Exception):\n");
                    body.push_str(&format!("        {call}\n"));
                } else {
                    body.push_str(&format!("    result = {call}\n"));
                    for assertion in &spec.then {
                        Self::assertion(&mut body, assertion);
                    }
                }
            }
            body.push('\n');
        }

        let mut source = String::new();
        if uses_pytest {
            source.push_str("import pytest\n");
        }
        if uses_requests {
            source.push_str("import os\n\nimport requests\n");
        }
        if !source.is_empty() {
            source.push('\n');
        }
        source.push_str(&format!("from {} import {}\n\n\n", sanitize(request.module), first_word(request.symbol)));
        source.push_str(&body);

        Ok(EmittedTest {
            path: self.file_name(request.symbol),
            language: "python".to_string(),
            framework: self.framework().to_string(),
            source,
            assertion_count: assertion_total(request.specs),
        })
    }
}

fn first_word(symbol: &str) -> String {
    if is_api_symbol(symbol) {
        "app".to_string()
    } else {
        symbol.split(['.', ' ']).next().unwrap_or(symbol).to_string()
    }
}

// ============================================================================
// JAVASCRIPT / TYPESCRIPT (jest)
// ============================================================================

pub struct JestEmitter {
    pub typescript: bool,
}

impl JestEmitter {
    fn literal(value: &Value) -> String {
        serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
    }

    fn actual_expr(actual: &str) -> String {
        actual.strip_prefix('$').unwrap_or(actual).to_string()
    }

    fn assertion(out: &mut String, assertion: &Assertion) {
        let actual = Self::actual_expr(&assertion.actual);
        let expected = Self::literal(&assertion.expected);
        let matcher_target = if assertion.expected.is_object() || assertion.expected.is_array() {
            "toEqual"
        } else {
            "toBe"
        };
        let line = match assertion.kind {
            AssertionKind::Equals => format!("    expect({actual}).{matcher_target}({expected});\n"),
            AssertionKind::NotEquals => {
                format!("    expect({actual}).not.{matcher_target}({expected});\n")
            }
            AssertionKind::Contains => format!("    expect({actual}).toContain({expected});\n"),
            AssertionKind::GreaterThan => {
                format!("    expect({actual}).toBeGreaterThan({expected});\n")
            }
            AssertionKind::LessThan => format!("    expect({actual}).toBeLessThan({expected});\n"),
            AssertionKind::Throws => String::new(),
            AssertionKind::Truthy => format!("    expect({actual}).toBeTruthy();\n"),
            AssertionKind::Falsy => format!("    expect({actual}).toBeFalsy();\n"),
            AssertionKind::Nil => format!("    expect({actual}).toBeNull();\n"),
            AssertionKind::NotNil => format!("    expect({actual}).not.toBeNull();\n"),
        };
        out.push_str(&line);
    }
}

impl Emitter for JestEmitter {
    fn framework(&self) -> &'static str {
        "jest"
    }

    fn language(&self) -> &'static str {
        if self.typescript {
            "typescript"
        } else {
            "javascript"
        }
    }

    fn file_name(&self, symbol: &str) -> String {
        let ext = if self.typescript { "ts" } else { "js" };
        format!("{}.test.{ext}", camel_case(symbol))
    }

    fn emit(&self, request: &EmitRequest) -> QResult<EmittedTest> {
        let mut body = String::new();
        let mut uses_supertest = false;

        body.push_str(&format!("describe('{}', () => {{\n", request.symbol.replace('\'', "")));

        for spec in request.specs {
            let api = is_api_symbol(&spec.when.symbol);
            let test_name = spec.name.replace('\'', "");
            if api {
                body.push_str(&format!("  test('{test_name}', async () => {{\n"));
            } else {
                body.push_str(&format!("  test('{test_name}', () => {{\n"));
            }

            for given in &spec.given {
                body.push_str(&format!(
                    "    const {} = {};\n",
                    given.name,
                    Self::literal(&given.value)
                ));
            }

            if api {
                uses_supertest = true;
                let (method, path) = split_api_symbol(&spec.when.symbol);
                let path = substitute_path(&path, spec);
                body.push_str(&format!(
                    "    const response = await request(app).{}('{path}');\n",
                    method.to_lowercase()
                ));
                body.push_str("    const result = response.text;\n");
                for assertion in &spec.then {
                    if assertion.actual == "status" {
                        body.push_str(&format!(
                            "    expect(response.status).toBe({});\n",
                            Self::literal(&assertion.expected)
                        ));
                    } else {
                        Self::assertion(&mut body, assertion);
                    }
                }
            } else {
                let args: Vec<String> = spec
                    .when
                    .arguments
                    .iter()
                    .map(|a| match qforge_core::as_reference(a) {
                        Some(name) => name.to_string(),
                        None => Self::literal(a),
                    })
                    .collect();
                let call = format!("{}({})", spec.when.symbol, args.join(", "));

                if spec.then.iter().any(|a| a.kind == AssertionKind::Throws) {
                    body.push_str(&format!("    expect(() => {call}).toThrow();\n"));
                } else {
                    body.push_str(&format!("    const result = {call};\n"));
                    for assertion in &spec.then {
                        Self::assertion(&mut body, assertion);
                    }
                }
            }
            body.push_str("  });\n\n");
        }
        body.push_str("});\n");

        let symbol = first_word(request.symbol);
        let module = sanitize(request.module);
        let mut source = String::new();
        if self.typescript {
            if uses_supertest {
                source.push_str("import request from 'supertest';\nimport app from './app';\n");
            } else {
                source.push_str(&format!("import {{ {symbol} }} from './{module}';\n"));
            }
        } else if uses_supertest {
            source.push_str("const request = require('supertest');\nconst app = require('./app');\n");
        } else {
            source.push_str(&format!("const {{ {symbol} }} = require('./{module}');\n"));
        }
        source.push('\n');
        source.push_str(&body);

        Ok(EmittedTest {
            path: self.file_name(request.symbol),
            language: self.language().to_string(),
            framework: self.framework().to_string(),
            source,
            assertion_count: assertion_total(request.specs),
        })
    }
}

// ============================================================================
// JAVA (junit 5)
// ============================================================================

pub struct JunitEmitter;

impl JunitEmitter {
    fn literal(value: &Value) -> String {
        match value {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => format!("{s:?}"),
            // structured values travel as their JSON text
            other => format!("{:?}", other.to_string()),
        }
    }

    fn actual_expr(actual: &str) -> String {
        actual.strip_prefix('$').unwrap_or(actual).to_string()
    }

    fn assertion(out: &mut String, assertion: &Assertion) {
        let actual = Self::actual_expr(&assertion.actual);
        let expected = Self::literal(&assertion.expected);
        let line = match assertion.kind {
            AssertionKind::Equals => format!("        assertEquals({expected}, {actual});\n"),
            AssertionKind::NotEquals => format!("        assertNotEquals({expected}, {actual});\n"),
            AssertionKind::Contains => {
                format!("        assertTrue({actual}.contains({expected}));\n")
            }
            AssertionKind::GreaterThan => format!("        assertTrue({actual} > {expected});\n"),
            AssertionKind::LessThan => format!("        assertTrue({actual} < {expected});\n"),
            AssertionKind::Throws => String::new(),
            AssertionKind::Truthy => format!("        assertTrue({actual});\n"),
            AssertionKind::Falsy => format!("        assertFalse({actual});\n"),
            AssertionKind::Nil => format!("        assertNull({actual});\n"),
            AssertionKind::NotNil => format!("        assertNotNull({actual});\n"),
        };
        out.push_str(&line);
    }
}

impl Emitter for JunitEmitter {
    fn framework(&self) -> &'static str {
        "junit"
    }

    fn language(&self) -> &'static str {
        "java"
    }

    fn file_name(&self, symbol: &str) -> String {
        format!("{}Test.java", pascal_case(symbol))
    }

    fn emit(&self, request: &EmitRequest) -> QResult<EmittedTest> {
        let class_name = format!("{}Test", pascal_case(request.symbol));
        let mut body = String::new();

        for spec in request.specs {
            let method_name = camel_case(&spec.name);
            body.push_str("    @Test\n");
            body.push_str(&format!("    void {method_name}() {{\n"));

            for given in &spec.given {
                body.push_str(&format!(
                    "        var {} = {};\n",
                    given.name,
                    Self::literal(&given.value)
                ));
            }

            let args: Vec<String> = spec
                .when
                .arguments
                .iter()
                .map(|a| match qforge_core::as_reference(a) {
                    Some(name) => name.to_string(),
                    None => Self::literal(a),
                })
                .collect();
            let call = format!("{}({})", first_word(&spec.when.symbol), args.join(", "));

            if spec.then.iter().any(|a| a.kind == AssertionKind::Throws) {
                body.push_str(&format!(
                    "        assertThrows(Exception.class, () -> {call});\n"
                ));
            } else {
                body.push_str(&format!("        var result = {call};\n"));
                for assertion in &spec.then {
                    Self::assertion(&mut body, assertion);
                }
            }
            body.push_str("    }\n\n");
        }

        let mut source = String::new();
        source.push_str("import org.junit.jupiter.api.Test;\n");
        source.push_str("import static org.junit.jupiter.api.Assertions.*;\n\n");
        source.push_str(&format!("class {class_name} {{\n\n"));
        source.push_str(&body);
        source.push_str("}\n");

        Ok(EmittedTest {
            path: self.file_name(request.symbol),
            language: "java".to_string(),
            framework: self.framework().to_string(),
            source,
            assertion_count: assertion_total(request.specs),
        })
    }
}

/// Unknown languages are a caller bug surfaced as an input error
pub fn emitter_for<'a>(registry: &'a EmitterRegistry, language: &str) -> QResult<&'a dyn Emitter> {
    registry.for_language(language).ok_or_else(|| QForgeError::Input {
        reason: format!("no emitter registered for language {language}"),
    })
}
