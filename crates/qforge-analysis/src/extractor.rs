//! # Language Extractor
//!
//! Parses source files into the normalized function/class shape using
//! tree-sitter grammars. Extraction is deterministic: re-parsing the same
//! bytes yields identical ids and ordering. Functions appear in source
//! order, parameters in declaration order, and leading comments are kept
//! in their original order.

use std::path::Path;

use anyhow::anyhow;
use tracing::debug;
use tree_sitter::{Node, Parser};

use qforge_core::{
    symbol_id, ParsedClass, ParsedFile, ParsedFunction, ParsedParameter, ParsedProperty, QForgeError,
    QResult, SourceLanguage,
};

/// Multi-language source extractor
pub struct SourceExtractor;

impl SourceExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Parse a file on disk, dispatching by extension. Unsupported
    /// extensions and non-files are input errors; callers filter.
    pub fn parse_file(&self, path: &Path) -> QResult<ParsedFile> {
        if path.as_os_str().is_empty() {
            return Err(QForgeError::Input {
                reason: "empty path".to_string(),
            });
        }
        if !path.is_file() {
            return Err(QForgeError::Input {
                reason: format!("not a file: {}", path.display()),
            });
        }
        let language = SourceLanguage::from_path(path).ok_or_else(|| QForgeError::Input {
            reason: format!("unsupported extension: {}", path.display()),
        })?;
        let source = std::fs::read_to_string(path)?;
        self.parse_source(&path.to_string_lossy(), &source, language)
    }

    /// Parse already-loaded source text
    pub fn parse_source(
        &self,
        path: &str,
        source: &str,
        language: SourceLanguage,
    ) -> QResult<ParsedFile> {
        debug!(path, language = language.tag(), bytes = source.len(), "parsing source file");

        let mut parser = Parser::new();
        parser
            .set_language(grammar_for(language))
            .map_err(|e| QForgeError::Parse {
                path: path.to_string(),
                reason: format!("grammar init failed: {e}"),
            })?;

        let tree = parser.parse(source, None).ok_or_else(|| QForgeError::Parse {
            path: path.to_string(),
            reason: "tree-sitter returned no tree".to_string(),
        })?;

        let mut walker = FileWalker {
            path,
            source,
            language,
            functions: Vec::new(),
            classes: Vec::new(),
        };
        walker.walk(tree.root_node(), None);
        walker.attach_go_methods();

        Ok(ParsedFile {
            path: path.to_string(),
            language,
            functions: walker.functions,
            classes: walker.classes,
            source: source.to_string(),
        })
    }
}

impl Default for SourceExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn grammar_for(language: SourceLanguage) -> tree_sitter::Language {
    match language {
        SourceLanguage::Go => tree_sitter_go::language(),
        SourceLanguage::Python => tree_sitter_python::language(),
        SourceLanguage::Javascript | SourceLanguage::Jsx => tree_sitter_javascript::language(),
        SourceLanguage::Typescript => tree_sitter_typescript::language_typescript(),
        SourceLanguage::Tsx => tree_sitter_typescript::language_tsx(),
        SourceLanguage::Java => tree_sitter_java::language(),
    }
}

struct FileWalker<'a> {
    path: &'a str,
    source: &'a str,
    language: SourceLanguage,
    functions: Vec<ParsedFunction>,
    classes: Vec<ParsedClass>,
}

impl<'a> FileWalker<'a> {
    fn walk(&mut self, node: Node, class_ctx: Option<&str>) {
        let kind = node.kind();

        if self.is_function_node(kind) {
            if let Some(func) = self.extract_function(node, class_ctx) {
                match class_ctx {
                    Some(class_name) => {
                        if let Some(class) = self.classes.iter_mut().find(|c| c.name == class_name) {
                            class.methods.push(func.clone());
                        }
                        self.functions.push(func);
                    }
                    None => self.functions.push(func),
                }
            }
            // arrow functions nested in a function body are not re-visited
            return;
        }

        if self.is_class_node(kind) {
            if let Some(class) = self.extract_class(node) {
                let name = class.name.clone();
                self.classes.push(class);
                if let Some(body) = node.child_by_field_name("body") {
                    let mut cursor = body.walk();
                    for child in body.children(&mut cursor) {
                        self.walk(child, Some(&name));
                    }
                }
            }
            return;
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.walk(child, class_ctx);
        }
    }

    fn is_function_node(&self, kind: &str) -> bool {
        match self.language {
            SourceLanguage::Go => {
                matches!(kind, "function_declaration" | "method_declaration")
            }
            SourceLanguage::Python => kind == "function_definition",
            SourceLanguage::Javascript
            | SourceLanguage::Jsx
            | SourceLanguage::Typescript
            | SourceLanguage::Tsx => {
                matches!(kind, "function_declaration" | "method_definition" | "variable_declarator")
            }
            SourceLanguage::Java => kind == "method_declaration",
        }
    }

    fn is_class_node(&self, kind: &str) -> bool {
        match self.language {
            SourceLanguage::Go => kind == "type_spec",
            SourceLanguage::Python => kind == "class_definition",
            SourceLanguage::Javascript
            | SourceLanguage::Jsx
            | SourceLanguage::Typescript
            | SourceLanguage::Tsx => kind == "class_declaration",
            SourceLanguage::Java => kind == "class_declaration",
        }
    }

    fn extract_function(&self, node: Node, class_ctx: Option<&str>) -> Option<ParsedFunction> {
        // variable_declarator only counts when it binds an arrow function
        // or function expression
        let (def_node, name) = if node.kind() == "variable_declarator" {
            let value = node.child_by_field_name("value")?;
            if !matches!(value.kind(), "arrow_function" | "function_expression" | "function") {
                return None;
            }
            let name = self.text(node.child_by_field_name("name")?);
            (value, name)
        } else {
            let name = self.text(node.child_by_field_name("name")?);
            (node, name)
        };

        if name.is_empty() {
            return None;
        }

        let start_line = node.start_position().row as u32 + 1;
        let end_line = node.end_position().row as u32 + 1;

        let parameters = self.extract_parameters(def_node);
        let return_type = self.extract_return_type(def_node);
        let body = def_node
            .child_by_field_name("body")
            .map(|b| self.text(b))
            .unwrap_or_default();
        let comments = self.leading_comments(outermost_declaration(node));
        let is_async = self.is_async(def_node);
        let exported = self.is_exported(node, &name, class_ctx);
        let class_name = class_ctx.map(|c| c.to_string()).or_else(|| self.go_receiver(node));

        Some(ParsedFunction {
            id: symbol_id(self.path, &name, start_line),
            name,
            file: self.path.to_string(),
            start_line,
            end_line,
            parameters,
            return_type,
            body: body.clone(),
            comments,
            exported,
            is_async,
            class_name,
            complexity: 1 + count_branches(def_node),
        })
    }

    fn extract_class(&self, node: Node) -> Option<ParsedClass> {
        // go type_spec: only struct and interface types become classes
        if self.language == SourceLanguage::Go {
            let ty = node.child_by_field_name("type")?;
            if !matches!(ty.kind(), "struct_type" | "interface_type") {
                return None;
            }
        }

        let name = self.text(node.child_by_field_name("name")?);
        let start_line = node.start_position().row as u32 + 1;
        let end_line = node.end_position().row as u32 + 1;

        Some(ParsedClass {
            id: symbol_id(self.path, &name, start_line),
            name: name.clone(),
            file: self.path.to_string(),
            start_line,
            end_line,
            methods: Vec::new(),
            properties: self.extract_properties(node),
            extends: self.extract_extends(node),
            implements: self.extract_implements(node),
        })
    }

    fn extract_parameters(&self, node: Node) -> Vec<ParsedParameter> {
        let params_node = node
            .child_by_field_name("parameters")
            .or_else(|| node.child_by_field_name("formal_parameters"));
        let Some(params_node) = params_node else {
            return Vec::new();
        };

        let mut params = Vec::new();
        let mut cursor = params_node.walk();
        for child in params_node.children(&mut cursor) {
            match child.kind() {
                // go: `a, b int` declares several names with one type
                "parameter_declaration" => {
                    let type_hint = child.child_by_field_name("type").map(|t| self.text(t));
                    let mut name_cursor = child.walk();
                    let names: Vec<String> = child
                        .children_by_field_name("name", &mut name_cursor)
                        .map(|n| self.text(n))
                        .collect();
                    if names.is_empty() {
                        if let Some(hint) = &type_hint {
                            params.push(ParsedParameter {
                                name: format!("arg{}", params.len()),
                                type_hint: Some(hint.clone()),
                                default: None,
                                optional: false,
                            });
                        }
                    } else {
                        for name in names {
                            params.push(ParsedParameter {
                                name,
                                type_hint: type_hint.clone(),
                                default: None,
                                optional: false,
                            });
                        }
                    }
                }
                "identifier" => params.push(ParsedParameter {
                    name: self.text(child),
                    type_hint: None,
                    default: None,
                    optional: false,
                }),
                "typed_parameter" => {
                    let name = child.child(0).map(|n| self.text(n)).unwrap_or_default();
                    params.push(ParsedParameter {
                        name,
                        type_hint: child.child_by_field_name("type").map(|t| self.text(t)),
                        default: None,
                        optional: false,
                    });
                }
                "default_parameter" | "typed_default_parameter" => {
                    let name = child
                        .child_by_field_name("name")
                        .map(|n| self.text(n))
                        .unwrap_or_default();
                    params.push(ParsedParameter {
                        name,
                        type_hint: child.child_by_field_name("type").map(|t| self.text(t)),
                        default: child.child_by_field_name("value").map(|v| self.text(v)),
                        optional: true,
                    });
                }
                "required_parameter" | "optional_parameter" => {
                    let name = child
                        .child_by_field_name("pattern")
                        .map(|n| self.text(n))
                        .unwrap_or_default();
                    let type_hint = child
                        .child_by_field_name("type")
                        .map(|t| self.text(t).trim_start_matches(':').trim().to_string());
                    params.push(ParsedParameter {
                        name,
                        type_hint,
                        default: child.child_by_field_name("value").map(|v| self.text(v)),
                        optional: child.kind() == "optional_parameter",
                    });
                }
                "formal_parameter" => {
                    let name = child
                        .child_by_field_name("name")
                        .map(|n| self.text(n))
                        .unwrap_or_default();
                    params.push(ParsedParameter {
                        name,
                        type_hint: child.child_by_field_name("type").map(|t| self.text(t)),
                        default: None,
                        optional: false,
                    });
                }
                "assignment_pattern" => {
                    let name = child
                        .child_by_field_name("left")
                        .map(|n| self.text(n))
                        .unwrap_or_default();
                    params.push(ParsedParameter {
                        name,
                        type_hint: None,
                        default: child.child_by_field_name("right").map(|v| self.text(v)),
                        optional: true,
                    });
                }
                _ => {}
            }
        }

        // python instance methods: drop the implicit receiver
        if self.language == SourceLanguage::Python {
            if let Some(first) = params.first() {
                if first.name == "self" || first.name == "cls" {
                    params.remove(0);
                }
            }
        }

        params
    }

    fn extract_return_type(&self, node: Node) -> Option<String> {
        let ret = node
            .child_by_field_name("result")
            .or_else(|| node.child_by_field_name("return_type"))
            .or_else(|| node.child_by_field_name("type"))?;
        let text = self.text(ret);
        let trimmed = text.trim_start_matches(':').trim_start_matches("->").trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    fn extract_properties(&self, node: Node) -> Vec<ParsedProperty> {
        let mut props = Vec::new();

        let body = match self.language {
            SourceLanguage::Go => node.child_by_field_name("type"),
            _ => node.child_by_field_name("body"),
        };
        let Some(body) = body else {
            return props;
        };

        let mut stack = vec![body];
        while let Some(current) = stack.pop() {
            let mut cursor = current.walk();
            for child in current.children(&mut cursor) {
                match child.kind() {
                    "field_declaration" => {
                        let name = child
                            .child_by_field_name("name")
                            .map(|n| self.text(n))
                            .unwrap_or_default();
                        if !name.is_empty() {
                            let exported = self.name_is_public(&name);
                            props.push(ParsedProperty {
                                name,
                                type_hint: child.child_by_field_name("type").map(|t| self.text(t)),
                                exported,
                            });
                        }
                    }
                    "public_field_definition" | "field_definition" => {
                        let name = child
                            .child_by_field_name("name")
                            .or_else(|| child.child_by_field_name("property"))
                            .map(|n| self.text(n))
                            .unwrap_or_default();
                        if !name.is_empty() {
                            props.push(ParsedProperty {
                                name,
                                type_hint: child
                                    .child_by_field_name("type")
                                    .map(|t| self.text(t).trim_start_matches(':').trim().to_string()),
                                exported: true,
                            });
                        }
                    }
                    "field_declaration_list" | "class_body" => stack.push(child),
                    _ => {}
                }
            }
        }

        props
    }

    fn extract_extends(&self, node: Node) -> Vec<String> {
        match self.language {
            SourceLanguage::Python => node
                .child_by_field_name("superclasses")
                .map(|args| {
                    let mut cursor = args.walk();
                    args.children(&mut cursor)
                        .filter(|c| c.kind() == "identifier" || c.kind() == "attribute")
                        .map(|c| self.text(c))
                        .collect()
                })
                .unwrap_or_default(),
            SourceLanguage::Java => node
                .child_by_field_name("superclass")
                .map(|s| vec![self.text(s).trim_start_matches("extends").trim().to_string()])
                .unwrap_or_default(),
            _ => {
                // ecmascript class_heritage: `extends Base`
                let mut cursor = node.walk();
                node.children(&mut cursor)
                    .filter(|c| c.kind() == "class_heritage")
                    .filter_map(|c| {
                        let text = self.text(c);
                        let trimmed = text.trim_start_matches("extends").trim().to_string();
                        if trimmed.is_empty() {
                            None
                        } else {
                            Some(trimmed)
                        }
                    })
                    .collect()
            }
        }
    }

    fn extract_implements(&self, node: Node) -> Vec<String> {
        if self.language != SourceLanguage::Java {
            return Vec::new();
        }
        node.child_by_field_name("interfaces")
            .map(|list| {
                let text = self.text(list);
                text.trim_start_matches("implements")
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn leading_comments(&self, node: Node) -> Vec<String> {
        let mut comments = Vec::new();
        let mut current = node.prev_sibling();
        while let Some(sibling) = current {
            match sibling.kind() {
                "comment" | "line_comment" | "block_comment" => {
                    comments.push(self.text(sibling));
                    current = sibling.prev_sibling();
                }
                _ => break,
            }
        }
        comments.reverse();
        comments
    }

    fn is_async(&self, node: Node) -> bool {
        let mut cursor = node.walk();
        let result = node.children(&mut cursor).any(|c| c.kind() == "async");
        result
    }

    fn is_exported(&self, node: Node, name: &str, class_ctx: Option<&str>) -> bool {
        match self.language {
            SourceLanguage::Go => self.name_is_public(name),
            SourceLanguage::Python => {
                !name.starts_with('_') && class_ctx.map_or(true, |c| !c.starts_with('_'))
            }
            SourceLanguage::Java => {
                let mut cursor = node.walk();
                let result = node
                    .children(&mut cursor)
                    .find(|c| c.kind() == "modifiers")
                    .map(|m| self.text(m).contains("public"))
                    .unwrap_or(false);
                result
            }
            _ => {
                // ecmascript: exported iff under an export statement
                let mut current = node.parent();
                while let Some(parent) = current {
                    if parent.kind() == "export_statement" {
                        return true;
                    }
                    current = parent.parent();
                }
                false
            }
        }
    }

    fn name_is_public(&self, name: &str) -> bool {
        name.chars().next().map(|c| c.is_uppercase()).unwrap_or(false)
    }

    fn go_receiver(&self, node: Node) -> Option<String> {
        if self.language != SourceLanguage::Go || node.kind() != "method_declaration" {
            return None;
        }
        let receiver = node.child_by_field_name("receiver")?;
        let mut stack = vec![receiver];
        while let Some(current) = stack.pop() {
            if current.kind() == "type_identifier" {
                return Some(self.text(current));
            }
            let mut cursor = current.walk();
            let children: Vec<Node> = current.children(&mut cursor).collect();
            stack.extend(children);
        }
        None
    }

    /// Go methods are declared outside the struct body; fold them into
    /// their receiver's class record after the walk.
    fn attach_go_methods(&mut self) {
        if self.language != SourceLanguage::Go {
            return;
        }
        let methods: Vec<ParsedFunction> = self
            .functions
            .iter()
            .filter(|f| f.class_name.is_some())
            .cloned()
            .collect();
        for method in methods {
            let class_name = method.class_name.clone().unwrap_or_default();
            if let Some(class) = self.classes.iter_mut().find(|c| c.name == class_name) {
                class.methods.push(method);
            }
        }
    }

    fn text(&self, node: Node) -> String {
        node.utf8_text(self.source.as_bytes())
            .map(|s| s.to_string())
            .unwrap_or_default()
    }
}

/// Decorators and export wrappers sit between a declaration and its
/// doc comments; comments attach to the outermost wrapper.
fn outermost_declaration(node: Node) -> Node {
    let mut current = node;
    while let Some(parent) = current.parent() {
        match parent.kind() {
            "decorated_definition" | "export_statement" | "lexical_declaration"
            | "variable_declaration" => current = parent,
            _ => break,
        }
    }
    current
}

fn count_branches(node: Node) -> u32 {
    const BRANCH_KINDS: [&str; 18] = [
        "if_statement",
        "for_statement",
        "for_in_statement",
        "while_statement",
        "do_statement",
        "expression_case",
        "type_case",
        "case_clause",
        "switch_case",
        "elif_clause",
        "except_clause",
        "catch_clause",
        "conditional_expression",
        "ternary_expression",
        "&&",
        "||",
        "and",
        "or",
    ];

    let mut count = 0;
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        let mut cursor = current.walk();
        for child in current.children(&mut cursor) {
            if BRANCH_KINDS.contains(&child.kind()) {
                count += 1;
            }
            stack.push(child);
        }
    }
    count
}

/// Convenience used by tests and fixtures: language from a bare tag
pub fn language_from_tag(tag: &str) -> QResult<SourceLanguage> {
    match tag {
        "go" => Ok(SourceLanguage::Go),
        "python" => Ok(SourceLanguage::Python),
        "javascript" => Ok(SourceLanguage::Javascript),
        "jsx" => Ok(SourceLanguage::Jsx),
        "typescript" => Ok(SourceLanguage::Typescript),
        "tsx" => Ok(SourceLanguage::Tsx),
        "java" => Ok(SourceLanguage::Java),
        other => Err(QForgeError::Generic(anyhow!("unknown language tag {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GO_FIXTURE: &str = r#"package mathutil

// Add returns the sum of two integers.
func Add(a, b int) int {
	return a + b
}

// IsEven reports whether n is divisible by two.
func IsEven(n int) bool {
	if n%2 == 0 {
		return true
	}
	return false
}

func helper(x int) int {
	return x * 2
}
"#;

    #[test]
    fn test_go_extraction() {
        let extractor = SourceExtractor::new();
        let parsed = extractor
            .parse_source("mathutil/math.go", GO_FIXTURE, SourceLanguage::Go)
            .unwrap();

        assert_eq!(parsed.functions.len(), 3);
        let add = &parsed.functions[0];
        assert_eq!(add.name, "Add");
        assert!(add.exported);
        assert_eq!(add.parameters.len(), 2);
        assert_eq!(add.parameters[0].name, "a");
        assert_eq!(add.parameters[1].name, "b");
        assert_eq!(add.parameters[0].type_hint.as_deref(), Some("int"));
        assert_eq!(add.return_type.as_deref(), Some("int"));
        assert_eq!(add.comments.len(), 1);
        assert!(add.comments[0].contains("sum of two integers"));
        assert_eq!(add.complexity, 1);

        let is_even = &parsed.functions[1];
        assert_eq!(is_even.name, "IsEven");
        assert!(is_even.complexity >= 2);

        let helper = &parsed.functions[2];
        assert!(!helper.exported);
    }

    #[test]
    fn test_go_extraction_deterministic() {
        let extractor = SourceExtractor::new();
        let a = extractor
            .parse_source("m.go", GO_FIXTURE, SourceLanguage::Go)
            .unwrap();
        let b = extractor
            .parse_source("m.go", GO_FIXTURE, SourceLanguage::Go)
            .unwrap();

        let ids_a: Vec<&str> = a.functions.iter().map(|f| f.id.as_str()).collect();
        let ids_b: Vec<&str> = b.functions.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn test_python_extraction() {
        let source = r#"
class UserService:
    def __init__(self, db):
        self.db = db

    def find_user(self, user_id, active=True):
        if active:
            return self.db.get(user_id)
        return None

async def fetch_all(client):
    return await client.list()

def _internal():
    pass
"#;
        let extractor = SourceExtractor::new();
        let parsed = extractor
            .parse_source("svc/users.py", source, SourceLanguage::Python)
            .unwrap();

        let class = &parsed.classes[0];
        assert_eq!(class.name, "UserService");
        assert_eq!(class.methods.len(), 2);

        let find_user = parsed
            .functions
            .iter()
            .find(|f| f.name == "find_user")
            .unwrap();
        assert_eq!(find_user.class_name.as_deref(), Some("UserService"));
        // implicit self dropped, default captured
        assert_eq!(find_user.parameters.len(), 2);
        assert_eq!(find_user.parameters[1].name, "active");
        assert_eq!(find_user.parameters[1].default.as_deref(), Some("True"));
        assert!(find_user.parameters[1].optional);

        let fetch_all = parsed
            .functions
            .iter()
            .find(|f| f.name == "fetch_all")
            .unwrap();
        assert!(fetch_all.is_async);
        assert!(fetch_all.exported);

        let internal = parsed
            .functions
            .iter()
            .find(|f| f.name == "_internal")
            .unwrap();
        assert!(!internal.exported);
    }

    #[test]
    fn test_typescript_extraction() {
        let source = r#"
export function greet(name: string): string {
    return `Hello, ${name}`;
}

const lookup = (id: number) => {
    return id > 0 ? "ok" : "bad";
};

export class Repo {
    find(id: number): string {
        return String(id);
    }
}
"#;
        let extractor = SourceExtractor::new();
        let parsed = extractor
            .parse_source("src/repo.ts", source, SourceLanguage::Typescript)
            .unwrap();

        let greet = parsed.functions.iter().find(|f| f.name == "greet").unwrap();
        assert!(greet.exported);
        assert_eq!(greet.parameters[0].name, "name");
        assert_eq!(greet.parameters[0].type_hint.as_deref(), Some("string"));
        assert_eq!(greet.return_type.as_deref(), Some("string"));

        let lookup = parsed.functions.iter().find(|f| f.name == "lookup").unwrap();
        assert!(!lookup.exported);

        let class = parsed.classes.iter().find(|c| c.name == "Repo").unwrap();
        assert_eq!(class.methods.len(), 1);
        assert_eq!(class.methods[0].name, "find");
    }

    #[test]
    fn test_javascript_extraction() {
        let source = r#"
function createServer(port) {
    return { port };
}

class Router {
    route(path, handler) {
        return handler(path);
    }
}
"#;
        let extractor = SourceExtractor::new();
        let parsed = extractor
            .parse_source("server.js", source, SourceLanguage::Javascript)
            .unwrap();

        assert!(parsed.functions.iter().any(|f| f.name == "createServer"));
        assert!(parsed.functions.iter().any(|f| f.name == "route"));
        assert_eq!(parsed.classes.len(), 1);
    }

    #[test]
    fn test_java_extraction() {
        let source = r#"
public class Calculator {
    private int base;

    public int add(int a, int b) {
        return a + b;
    }

    int scaled(int x) {
        if (x > 10) {
            return x * base;
        }
        return x;
    }
}
"#;
        let extractor = SourceExtractor::new();
        let parsed = extractor
            .parse_source("Calculator.java", source, SourceLanguage::Java)
            .unwrap();

        let class = &parsed.classes[0];
        assert_eq!(class.name, "Calculator");
        assert_eq!(class.methods.len(), 2);

        let add = parsed.functions.iter().find(|f| f.name == "add").unwrap();
        assert!(add.exported);
        assert_eq!(add.parameters.len(), 2);
        assert_eq!(add.return_type.as_deref(), Some("int"));

        let scaled = parsed.functions.iter().find(|f| f.name == "scaled").unwrap();
        assert!(!scaled.exported);
        assert!(scaled.complexity >= 2);
    }

    #[test]
    fn test_unsupported_extension_rejected() {
        let extractor = SourceExtractor::new();
        let err = extractor.parse_file(Path::new("README.md")).unwrap_err();
        assert!(matches!(err, QForgeError::Input { .. }));
    }

    #[test]
    fn test_go_struct_properties() {
        let source = r#"package store

type User struct {
	ID    int
	Name  string
	email string
}

func (u *User) Display() string {
	return u.Name
}
"#;
        let extractor = SourceExtractor::new();
        let parsed = extractor
            .parse_source("store/user.go", source, SourceLanguage::Go)
            .unwrap();

        let class = parsed.classes.iter().find(|c| c.name == "User").unwrap();
        assert_eq!(class.properties.len(), 3);
        assert!(class.properties[0].exported);
        assert!(!class.properties[2].exported);
        assert_eq!(class.methods.len(), 1);
        assert_eq!(class.methods[0].name, "Display");
    }
}
