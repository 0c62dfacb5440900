//! Tool-call recovery from free-form model output.
//!
//! Models asked to emit a structured tool call routinely wrap it in
//! prose, markdown fences, or cut it off mid-payload. Recovery is a
//! two-stage parse: strict JSON first, then locate-and-repair on the
//! best candidate substring. The repair rules are fixed and enumerable
//! so each one can be tested without a live model.
//!
//! A recovered call is only executable once its name is in the catalog
//! and every required argument is present. Missing pieces are reported,
//! never guessed.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde_json::Value;
use tracing::debug;

use crate::error::AgentError;

/// A structured request for an external capability.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: HashMap<String, Value>,
}

impl ToolInvocation {
    /// String argument, if present and a string.
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(Value::as_str)
    }
}

/// Declared shape of one registered tool.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub required: &'static [&'static str],
}

/// Allowlist of executable tools. Anything not in here is rejected
/// before execution.
#[derive(Debug, Clone)]
pub struct ToolCatalog {
    tools: Vec<ToolSpec>,
}

impl ToolCatalog {
    /// The two tools this agent executes.
    pub fn standard() -> Self {
        Self {
            tools: vec![
                ToolSpec {
                    name: "calculate",
                    description: "Safely evaluate an arithmetic expression",
                    required: &["expression"],
                },
                ToolSpec {
                    name: "web_search",
                    description: "Search the web for current information",
                    required: &["query"],
                },
            ],
        }
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn specs(&self) -> &[ToolSpec] {
        &self.tools
    }
}

/// Recover a tool invocation from raw model output.
pub fn recover(raw: &str, catalog: &ToolCatalog) -> Result<ToolInvocation, AgentError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AgentError::NoToolCallFound);
    }

    // Stage 1: strict parse of the whole output.
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if let Some(invocation) = invocation_from_value(&value) {
            return validate(invocation, catalog);
        }
    }

    // Stage 2: locate the best candidate payload and repair it.
    for candidate in candidates(trimmed) {
        let parsed = serde_json::from_str::<Value>(&candidate)
            .ok()
            .or_else(|| serde_json::from_str::<Value>(&repair(&candidate)).ok());
        if let Some(value) = parsed {
            if let Some(invocation) = invocation_from_value(&value) {
                debug!(tool = %invocation.name, "tool call recovered from malformed output");
                return validate(invocation, catalog);
            }
        }
    }

    Err(AgentError::NoToolCallFound)
}

fn validate(invocation: ToolInvocation, catalog: &ToolCatalog) -> Result<ToolInvocation, AgentError> {
    // An unregistered name means no executable tool call was found.
    let Some(spec) = catalog.get(&invocation.name) else {
        return Err(AgentError::NoToolCallFound);
    };
    for required in spec.required {
        let present = invocation
            .arguments
            .get(*required)
            .map(|v| !v.is_null())
            .unwrap_or(false);
        if !present {
            return Err(AgentError::IncompleteToolCall {
                tool: invocation.name.clone(),
                argument: (*required).to_string(),
            });
        }
    }
    Ok(invocation)
}

// =============================================================================
// Payload location
// =============================================================================

/// Candidate payload substrings, best first.
fn candidates(text: &str) -> Vec<String> {
    let mut found = Vec::new();

    // Fenced code block.
    if let Some(inner) = fenced_block(text) {
        found.push(inner.to_string());
    }

    // Balanced object starting at the first brace; drops trailing
    // commentary exactly at the matching close.
    if let Some(balanced) = balanced_object(text) {
        found.push(balanced.to_string());
    }

    // First brace to last brace (tolerates unbalanced interior noise).
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if end > start {
            found.push(text[start..=end].to_string());
        }
    }

    // First brace to end of text: the truncated-output case.
    if let Some(start) = text.find('{') {
        found.push(text[start..].to_string());
    }

    found.dedup();
    found
}

fn fenced_block(text: &str) -> Option<&str> {
    let start = if let Some(idx) = text.find("```json") {
        idx + 7
    } else {
        text.find("```")? + 3
    };
    let rest = &text[start..];
    let end = rest.find("```")?;
    Some(rest[..end].trim())
}

/// The longest brace-balanced prefix starting at the first `{`,
/// respecting string literals and escapes.
fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..start + i + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

// =============================================================================
// Repair
// =============================================================================

/// Best-effort repair of a near-JSON payload: quote bare keys, normalize
/// single-quoted payloads, drop trailing commas and dangling keys, close
/// an open string, then append the missing closers.
fn bare_key_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r#"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)\s*:"#).unwrap())
}

fn trailing_comma_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r#",\s*([}\]])"#).unwrap())
}

fn repair(candidate: &str) -> String {
    let mut s = candidate.trim().to_string();

    // Bare keys: { name: ... } -> { "name": ... }
    s = bare_key_re().replace_all(&s, "$1\"$2\":").into_owned();

    // A payload quoted entirely with single quotes.
    if !s.contains('"') && s.contains('\'') {
        s = s.replace('\'', "\"");
    }

    // Trailing commas before a closer.
    s = trailing_comma_re().replace_all(&s, "$1").into_owned();

    // Walk the payload to find what is still open at the end.
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for c in s.chars() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                stack.pop();
            }
            _ => {}
        }
    }

    if in_string {
        s.push('"');
    }

    // Truncation mid-pair: drop a dangling key or separator.
    loop {
        let trimmed = s.trim_end().to_string();
        if trimmed.ends_with(',') {
            s = trimmed[..trimmed.len() - 1].to_string();
        } else if trimmed.ends_with(':') {
            // Cut back to the comma or brace before the dangling key.
            let cut = trimmed.rfind(|c| c == ',' || c == '{').unwrap_or(0);
            if trimmed.as_bytes().get(cut) == Some(&b',') {
                s = trimmed[..cut].to_string();
            } else {
                s = trimmed[..=cut].to_string();
            }
        } else {
            break;
        }
    }

    for closer in stack.iter().rev() {
        s.push(*closer);
    }
    s
}

// =============================================================================
// Shape extraction
// =============================================================================

/// Pull `{name, arguments}` out of the shapes models actually emit:
/// a plain object, an array of calls (first one taken), a nested
/// `{"function": {"name": ..., "arguments": ...}}`, and arguments as
/// either an object or a JSON-encoded string.
fn invocation_from_value(value: &Value) -> Option<ToolInvocation> {
    let object = match value {
        Value::Array(items) => items.first()?,
        other => other,
    };
    let object = object.as_object()?;

    // Nested OpenAI-style {"function": {"name": ...}}.
    if let Some(function) = object.get("function").and_then(Value::as_object) {
        if let Some(name) = function.get("name").and_then(Value::as_str) {
            let arguments = function
                .get("arguments")
                .or_else(|| object.get("arguments"))
                .map(arguments_map)
                .unwrap_or_default();
            return Some(ToolInvocation {
                name: name.to_string(),
                arguments,
            });
        }
    }

    let name = object
        .get("name")
        .or_else(|| object.get("function"))
        .or_else(|| object.get("tool"))
        .and_then(Value::as_str)?;

    let arguments = object
        .get("arguments")
        .or_else(|| object.get("parameters"))
        .map(arguments_map)
        .unwrap_or_default();

    Some(ToolInvocation {
        name: name.to_string(),
        arguments,
    })
}

fn arguments_map(value: &Value) -> HashMap<String, Value> {
    match value {
        Value::Object(map) => map.clone().into_iter().collect(),
        // Arguments serialized as an embedded JSON string.
        Value::String(s) => serde_json::from_str::<Value>(s)
            .ok()
            .as_ref()
            .map(arguments_map)
            .unwrap_or_default(),
        _ => HashMap::new(),
    }
}
