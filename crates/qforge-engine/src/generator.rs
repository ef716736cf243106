//! # Spec Generator
//!
//! Materializes a test intent into Given-When-Then specifications via a
//! JSON-mode completion. Completions are cleaned (BOM, code fences),
//! decoded into the typed IR and validated; a single self-repair round
//! re-prompts with the validation error appended.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use qforge_core::{
    QForgeError, QResult, SystemModel, TargetKind, TestIntent, TestSpec,
};
use qforge_llm::{CompletionRequest, LlmRouter, ModelTier};

/// Hard ceiling on cases produced for one intent
const MAX_CASES_PER_INTENT: usize = 6;

const SYSTEM_PROMPT: &str = "You are a senior test engineer. You design small, \
precise test cases for a single target symbol and answer with JSON only, \
never prose.";

const SCHEMA_GUIDE: &str = r#"Respond with a JSON object of the shape:
{
  "specs": [
    {
      "name": "short description",
      "given": [{"name": "a", "type_hint": "int", "value": 2}],
      "when": {"symbol": "Add", "arguments": ["$a", "$b"]},
      "then": [{"actual": "result", "type": "equals", "expected": 5}],
      "tags": ["happy_path"]
    }
  ]
}
Assertion types: equals, not_equals, contains, greater_than, less_than,
throws, truthy, falsy, nil, not_nil.
Tags: happy_path, edge_case, boundary, error_handling.
Every "$name" used in when.arguments or then.actual must be declared in
given. Produce at most 6 specs and at least one assertion per spec."#;

pub struct SpecGenerator {
    router: Arc<LlmRouter>,
    tier: ModelTier,
    temperature: f32,
}

impl SpecGenerator {
    pub fn new(router: Arc<LlmRouter>, tier: ModelTier) -> Self {
        Self {
            router,
            tier,
            temperature: 0.2,
        }
    }

    /// Generate validated specs for one intent
    pub async fn generate(
        &self,
        intent: &TestIntent,
        model: &SystemModel,
        cancel: &CancellationToken,
    ) -> QResult<Vec<TestSpec>> {
        let prompt = self.build_prompt(intent, model)?;

        let mut request = CompletionRequest::new(self.tier, prompt.clone())
            .with_system(SYSTEM_PROMPT)
            .json();
        request.temperature = self.temperature;

        let response = self.router.complete(&request, cancel).await?;

        match decode_specs(&response.content) {
            Ok(specs) => Ok(specs),
            Err(first_error) => {
                // single-shot self-repair: re-prompt with the error appended
                warn!(error = %first_error, "spec decode failed, attempting self-repair");
                let repair_prompt = format!(
                    "{prompt}\n\nYour previous answer was rejected: {first_error}\n\
                     Return corrected JSON only."
                );
                let mut repair = CompletionRequest::new(self.tier, repair_prompt)
                    .with_system(SYSTEM_PROMPT)
                    .json();
                repair.temperature = self.temperature;

                let response = self.router.complete(&repair, cancel).await?;
                decode_specs(&response.content).map_err(|e| QForgeError::Protocol {
                    reason: format!("spec generation failed after self-repair: {e}"),
                })
            }
        }
    }

    fn build_prompt(&self, intent: &TestIntent, model: &SystemModel) -> QResult<String> {
        let subject = self.describe_target(intent, model)?;
        Ok(format!(
            "Write {} tests for the following target.\n\n{subject}\n\n{SCHEMA_GUIDE}",
            match intent.level {
                qforge_core::IntentLevel::Unit => "unit",
                qforge_core::IntentLevel::Api => "HTTP api",
                qforge_core::IntentLevel::E2e => "end-to-end",
            }
        ))
    }

    fn describe_target(&self, intent: &TestIntent, model: &SystemModel) -> QResult<String> {
        match intent.target_kind {
            TargetKind::Function | TargetKind::Method => {
                let func =
                    model
                        .resolve_function(&intent.target_id)
                        .ok_or_else(|| QForgeError::Input {
                            reason: format!("intent references unknown function {}", intent.target_id),
                        })?;
                let mut text = format!(
                    "Function `{}` in {} (lines {}-{}).\n",
                    func.name, func.file, func.start_line, func.end_line
                );
                if !func.comments.is_empty() {
                    text.push_str(&func.comments.join("\n"));
                    text.push('\n');
                }
                text.push_str("Source:\n");
                text.push_str(&func.body);
                Ok(text)
            }
            TargetKind::Endpoint | TargetKind::Block => {
                let endpoint = model
                    .endpoints
                    .iter()
                    .find(|e| e.id == intent.target_id)
                    .ok_or_else(|| QForgeError::Input {
                        reason: format!("intent references unknown endpoint {}", intent.target_id),
                    })?;
                let mut text = format!(
                    "HTTP endpoint {} {} ({} framework), handler `{}` declared in {}:{}.\n",
                    endpoint.method,
                    endpoint.path,
                    endpoint.framework,
                    endpoint.handler,
                    endpoint.file,
                    endpoint.line
                );
                if !endpoint.path_params.is_empty() {
                    text.push_str(&format!("Path parameters: {}\n", endpoint.path_params.join(", ")));
                }
                if let Some(handler_id) = &endpoint.handler_id {
                    if let Some(func) = model.resolve_function(handler_id) {
                        text.push_str("Handler source:\n");
                        text.push_str(&func.body);
                    }
                }
                // the call under test names the route, e.g. "GET /users/:id"
                text.push_str(&format!(
                    "\nUse \"{} {}\" as the when.symbol.",
                    endpoint.method, endpoint.path
                ));
                Ok(text)
            }
            TargetKind::Class => Err(QForgeError::Input {
                reason: "class intents are planned per-method".to_string(),
            }),
        }
    }
}

/// Strip fences and BOM, decode, validate, cap. Accepts `{"specs": []}`,
/// a bare array, or a single spec object.
pub fn decode_specs(raw: &str) -> Result<Vec<TestSpec>, String> {
    let cleaned = clean_completion(raw);

    #[derive(serde::Deserialize)]
    struct Payload {
        specs: Vec<TestSpec>,
    }

    let mut specs = if let Ok(payload) = serde_json::from_str::<Payload>(&cleaned) {
        payload.specs
    } else if let Ok(list) = serde_json::from_str::<Vec<TestSpec>>(&cleaned) {
        list
    } else {
        match serde_json::from_str::<TestSpec>(&cleaned) {
            Ok(single) => vec![single],
            Err(e) => return Err(format!("unparseable completion: {e}")),
        }
    };

    if specs.is_empty() {
        return Err("completion contained no specs".to_string());
    }

    if specs.len() > MAX_CASES_PER_INTENT {
        debug!(produced = specs.len(), "capping generated cases");
        specs.truncate(MAX_CASES_PER_INTENT);
    }

    for spec in &specs {
        spec.validate()?;
    }

    Ok(specs)
}

/// Drop a UTF-8 BOM and fenced code block markers around the payload
pub fn clean_completion(raw: &str) -> String {
    let text = raw.trim_start_matches('\u{feff}').trim();

    if let Some(rest) = text.strip_prefix("```") {
        // ```json\n ... \n```
        let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or(rest);
        let body = body.strip_suffix("```").unwrap_or(body);
        return body.trim().to_string();
    }

    text.to_string()
}
