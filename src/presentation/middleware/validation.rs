use async_trait::async_trait;
use axum::{
    body::{to_bytes, Bytes},
    http::{header, Method},
};
use serde_json::Value;
use std::error::Error as StdError;
use tracing::debug;

use super::{
    error::AppError,
    pipeline::{ParsedBody, PipelineStage, StageContext, StageOutcome},
};
use crate::{domain::errors::ErrorCode, infrastructure::config::RequestLimits};

pub const INVALID_CONTENT_TYPE_MESSAGE: &str =
    "Invalid Content-Type. Expected application/json or application/x-www-form-urlencoded";

/// Buffers the body within its size cap and parses it once for later stages
#[derive(Debug, Clone)]
pub struct BodyLimitStage {
    json_limit: usize,
    urlencoded_limit: usize,
    parameter_limit: usize,
}

impl BodyLimitStage {
    pub fn new(limits: &RequestLimits) -> Self {
        Self {
            json_limit: limits.json_body_limit,
            urlencoded_limit: limits.urlencoded_body_limit,
            parameter_limit: limits.parameter_limit,
        }
    }

    fn too_large(limit: usize) -> AppError {
        AppError::payload_too_large()
            .with_message(format!("Request body too large. Maximum allowed: {limit} bytes"))
    }
}

#[async_trait]
impl PipelineStage for BodyLimitStage {
    fn name(&self) -> &'static str {
        "body_limits"
    }

    async fn inspect(&self, ctx: &mut StageContext) -> StageOutcome {
        let is_form = ctx.is_form();
        let limit = if is_form { self.urlencoded_limit } else { self.json_limit };

        if let Some(declared) = declared_length(ctx) {
            if declared > limit as u64 {
                return StageOutcome::Reject(Self::too_large(limit));
            }
        }

        let Some(body) = ctx.take_body() else {
            return StageOutcome::Continue;
        };

        let raw = match to_bytes(body, limit).await {
            Ok(raw) => raw,
            Err(err) if is_length_limit(&err) => {
                return StageOutcome::Reject(Self::too_large(limit));
            }
            Err(err) => {
                return StageOutcome::Reject(
                    AppError::bad_request()
                        .with_code(ErrorCode::InvalidInputFormat)
                        .with_message("Failed to read request body")
                        .with_cause(err),
                );
            }
        };

        let parsed = match parse_body(&raw, is_form, ctx.content_type()) {
            Ok(parsed) => parsed,
            Err(error) => return StageOutcome::Reject(error),
        };

        if let ParsedBody::Form(pairs) = &parsed {
            if pairs.len() > self.parameter_limit {
                return StageOutcome::Reject(AppError::payload_too_large().with_message(format!(
                    "Too many parameters. Maximum allowed: {}",
                    self.parameter_limit
                )));
            }
        }

        debug!(bytes = raw.len(), form = is_form, "Request body buffered");
        ctx.set_buffered(raw, parsed);
        StageOutcome::Continue
    }
}

/// `to_bytes` reports an exceeded limit as a `LengthLimitError` somewhere in
/// the error chain
fn is_length_limit(err: &axum::Error) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(error) = current {
        if error.is::<http_body_util::LengthLimitError>() {
            return true;
        }
        current = error.source();
    }
    false
}

fn is_json_content_type(content_type: &str) -> bool {
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    essence.eq_ignore_ascii_case("application/json") || essence.ends_with("+json")
}

fn parse_body(raw: &Bytes, is_form: bool, content_type: Option<&str>) -> Result<ParsedBody, AppError> {
    if raw.is_empty() {
        return Ok(ParsedBody::None);
    }

    if is_form {
        let pairs = url::form_urlencoded::parse(raw)
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        return Ok(ParsedBody::Form(pairs));
    }

    if content_type.is_some_and(is_json_content_type) {
        let value: Value = serde_json::from_slice(raw).map_err(|err| {
            AppError::bad_request()
                .with_code(ErrorCode::InvalidInputFormat)
                .with_message(format!("Malformed JSON body: {err}"))
                .with_cause(err)
        })?;
        return Ok(ParsedBody::Json(value));
    }

    Ok(ParsedBody::None)
}

/// Bodies on mutating requests must be JSON or form encoded
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentTypeStage;

#[async_trait]
impl PipelineStage for ContentTypeStage {
    fn name(&self) -> &'static str {
        "content_type"
    }

    async fn inspect(&self, ctx: &mut StageContext) -> StageOutcome {
        if matches!(ctx.parts.method, Method::GET | Method::HEAD | Method::OPTIONS) {
            return StageOutcome::Continue;
        }

        if ctx.raw_body().is_empty() {
            return StageOutcome::Continue;
        }

        let accepted = ctx.content_type().is_some_and(|content_type| {
            is_json_content_type(content_type) || ctx.is_form()
        });

        if accepted {
            StageOutcome::Continue
        } else {
            StageOutcome::Reject(
                AppError::bad_request()
                    .with_code(ErrorCode::InvalidInputFormat)
                    .with_message(INVALID_CONTENT_TYPE_MESSAGE),
            )
        }
    }
}

/// Caps query keys plus top-level body keys
#[derive(Debug, Clone, Copy)]
pub struct ParameterLimitStage {
    limit: usize,
}

impl ParameterLimitStage {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }
}

#[async_trait]
impl PipelineStage for ParameterLimitStage {
    fn name(&self) -> &'static str {
        "parameter_limit"
    }

    async fn inspect(&self, ctx: &mut StageContext) -> StageOutcome {
        let total = ctx.query.len() + ctx.parsed().key_count();

        if total > self.limit {
            return StageOutcome::Reject(
                AppError::bad_request()
                    .with_code(ErrorCode::FieldLengthExceeded)
                    .with_message(format!("Too many parameters. Maximum allowed: {}", self.limit)),
            );
        }

        StageOutcome::Continue
    }
}

/// Content length the client declared, if any
fn declared_length(ctx: &StageContext) -> Option<u64> {
    ctx.parts
        .headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
}
