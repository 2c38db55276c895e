use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use tracing::warn;

use super::{
    error::AppError,
    pipeline::{ParsedBody, PipelineStage, StageContext, StageOutcome},
    security_log::{SecurityEvent, SecurityEventType, SecurityEvents},
};
use crate::domain::errors::ErrorCode;

pub const QUERY_INJECTION_MESSAGE: &str =
    "Invalid query parameters detected. Potential injection attempt blocked.";

static XSS_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)<script|javascript:|on\w+\s*=").ok());

/// Keys a document store would read as an operator or a nested path
pub fn is_operator_key(key: &str) -> bool {
    key.starts_with('$') || key.contains('.')
}

/// `$where` becomes `_where`, `a.b` becomes `a_b`
pub fn neutralize_key(key: &str) -> String {
    let key = match key.strip_prefix('$') {
        Some(rest) => format!("_{rest}"),
        None => key.to_string(),
    };
    key.replace('.', "_")
}

fn has_operator_keys(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.iter().any(|(key, value)| is_operator_key(key) || has_operator_keys(value)),
        Value::Array(items) => items.iter().any(has_operator_keys),
        _ => false,
    }
}

fn neutralize_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            let mut rewritten = Map::with_capacity(map.len());
            let mut neutralized = Vec::new();
            for (key, mut value) in std::mem::take(map) {
                neutralize_value(&mut value);
                if is_operator_key(&key) {
                    neutralized.push((neutralize_key(&key), value));
                } else {
                    rewritten.insert(key, value);
                }
            }
            // A rewritten key replaces a plain key of the same name
            for (key, value) in neutralized {
                if rewritten.insert(key.clone(), value).is_some() {
                    warn!(key = %key, "Neutralized key replaced an existing body key");
                }
            }
            *map = rewritten;
        }
        Value::Array(items) => items.iter_mut().for_each(neutralize_value),
        _ => {}
    }
}

/// Rewrites operator-shaped body keys and refuses operator-shaped query keys
#[derive(Debug, Clone, Copy)]
pub struct OperatorKeyStage {
    events: SecurityEvents,
}

impl OperatorKeyStage {
    pub fn new(events: SecurityEvents) -> Self {
        Self { events }
    }
}

#[async_trait]
impl PipelineStage for OperatorKeyStage {
    fn name(&self) -> &'static str {
        "operator_keys"
    }

    async fn inspect(&self, ctx: &mut StageContext) -> StageOutcome {
        if let Some((key, _)) = ctx.query.iter().find(|(key, _)| is_operator_key(key)) {
            warn!(
                ip = %ctx.metadata.client_ip,
                path = %ctx.metadata.path,
                key = %key,
                "Operator key in query string"
            );
            self.events.record(
                &SecurityEvent::new(
                    SecurityEventType::InjectionAttempt,
                    "Query parameter injection attempt",
                    &ctx.metadata,
                )
                .with_detail(key.clone()),
            );
            return StageOutcome::Reject(
                AppError::bad_request()
                    .with_code(ErrorCode::InvalidInputFormat)
                    .with_message(QUERY_INJECTION_MESSAGE),
            );
        }

        let needs_rewrite = match ctx.parsed() {
            ParsedBody::Json(value) => has_operator_keys(value),
            ParsedBody::Form(pairs) => pairs.iter().any(|(key, _)| is_operator_key(key)),
            ParsedBody::None => false,
        };
        if !needs_rewrite {
            return StageOutcome::Continue;
        }

        warn!(ip = %ctx.metadata.client_ip, path = %ctx.metadata.path, "Sanitized operator keys in body");
        self.events.record(&SecurityEvent::new(
            SecurityEventType::InjectionAttempt,
            "Operator keys neutralized in request body",
            &ctx.metadata,
        ));

        match ctx.parsed_mut() {
            ParsedBody::Json(value) => neutralize_value(value),
            ParsedBody::Form(pairs) => {
                for (key, _) in pairs.iter_mut() {
                    if is_operator_key(key) {
                        *key = neutralize_key(key);
                    }
                }
            }
            ParsedBody::None => {}
        }

        StageOutcome::Continue
    }
}

/// Query and form keys allowed to carry several values
pub const MULTI_VALUE_PARAMETERS: [&str; 2] = ["filter", "sort"];

/// Keep only the last value of each repeated key outside
/// [`MULTI_VALUE_PARAMETERS`]. Returns the collapsed pairs and the keys that
/// were repeated.
pub fn collapse_repeated(pairs: &[(String, String)]) -> (Vec<(String, String)>, Vec<String>) {
    let mut kept: Vec<(String, String)> = Vec::with_capacity(pairs.len());
    let mut repeated: Vec<String> = Vec::new();

    for (key, value) in pairs {
        if MULTI_VALUE_PARAMETERS.contains(&key.as_str()) {
            kept.push((key.clone(), value.clone()));
            continue;
        }
        match kept.iter_mut().find(|(existing, _)| existing == key) {
            Some(slot) => {
                slot.1.clone_from(value);
                if !repeated.contains(key) {
                    repeated.push(key.clone());
                }
            }
            None => kept.push((key.clone(), value.clone())),
        }
    }

    (kept, repeated)
}

/// Collapses repeated query and form parameters before the handler sees them
#[derive(Debug, Clone, Copy)]
pub struct ParameterPollutionStage {
    events: SecurityEvents,
}

impl ParameterPollutionStage {
    pub fn new(events: SecurityEvents) -> Self {
        Self { events }
    }

    fn report(&self, ctx: &StageContext, source: &str, repeated: &[String]) {
        warn!(
            ip = %ctx.metadata.client_ip,
            path = %ctx.metadata.path,
            source,
            keys = %repeated.join(","),
            "Repeated parameters collapsed"
        );
        self.events.record(
            &SecurityEvent::new(
                SecurityEventType::SuspiciousActivity,
                "HTTP parameter pollution",
                &ctx.metadata,
            )
            .with_detail(repeated.join(",")),
        );
    }
}

#[async_trait]
impl PipelineStage for ParameterPollutionStage {
    fn name(&self) -> &'static str {
        "parameter_pollution"
    }

    async fn inspect(&self, ctx: &mut StageContext) -> StageOutcome {
        let (query, repeated) = collapse_repeated(&ctx.query);
        if !repeated.is_empty() {
            self.report(ctx, "query", &repeated);
            if let Err(error) = ctx.set_query(query) {
                return StageOutcome::Reject(error);
            }
        }

        if let ParsedBody::Form(pairs) = ctx.parsed() {
            let (pairs, repeated) = collapse_repeated(pairs);
            if !repeated.is_empty() {
                self.report(ctx, "body", &repeated);
                *ctx.parsed_mut() = ParsedBody::Form(pairs);
            }
        }

        StageOutcome::Continue
    }
}

/// Escape characters that let a string break out into markup
pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            '/' => escaped.push_str("&#x2F;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn needs_escape(input: &str) -> bool {
    input.contains(['<', '>', '"', '\'', '/'])
}

fn has_unescaped_strings(value: &Value) -> bool {
    match value {
        Value::String(text) => needs_escape(text),
        Value::Object(map) => map.values().any(has_unescaped_strings),
        Value::Array(items) => items.iter().any(has_unescaped_strings),
        _ => false,
    }
}

fn escape_value(value: &mut Value) {
    match value {
        Value::String(text) => {
            if needs_escape(text) {
                *text = escape_html(text);
            }
        }
        Value::Object(map) => map.values_mut().for_each(escape_value),
        Value::Array(items) => items.iter_mut().for_each(escape_value),
        _ => {}
    }
}

pub fn looks_like_xss(input: &str) -> bool {
    XSS_PATTERN.as_ref().is_some_and(|pattern| pattern.is_match(input))
}

/// Escapes string values in the body. Script-like query values are only reported.
#[derive(Debug, Clone, Copy)]
pub struct HtmlEscapeStage {
    events: SecurityEvents,
}

impl HtmlEscapeStage {
    pub fn new(events: SecurityEvents) -> Self {
        Self { events }
    }
}

#[async_trait]
impl PipelineStage for HtmlEscapeStage {
    fn name(&self) -> &'static str {
        "html_escape"
    }

    async fn inspect(&self, ctx: &mut StageContext) -> StageOutcome {
        if let Some((key, _)) = ctx.query.iter().find(|(_, value)| looks_like_xss(value)) {
            warn!(
                ip = %ctx.metadata.client_ip,
                path = %ctx.metadata.path,
                key = %key,
                "Possible XSS attempt in query string"
            );
            self.events.record(
                &SecurityEvent::new(
                    SecurityEventType::InjectionAttempt,
                    "Possible XSS attempt in query string",
                    &ctx.metadata,
                )
                .with_detail(key.clone()),
            );
        }

        let needs_rewrite = match ctx.parsed() {
            ParsedBody::Json(value) => has_unescaped_strings(value),
            ParsedBody::Form(pairs) => pairs.iter().any(|(_, value)| needs_escape(value)),
            ParsedBody::None => false,
        };

        if needs_rewrite {
            match ctx.parsed_mut() {
                ParsedBody::Json(value) => escape_value(value),
                ParsedBody::Form(pairs) => {
                    for (_, value) in pairs.iter_mut() {
                        *value = escape_html(value);
                    }
                }
                ParsedBody::None => {}
            }
        }

        StageOutcome::Continue
    }
}
