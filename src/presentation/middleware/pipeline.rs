//! Ordered security pipeline.
//!
//! Every inbound request passes through the same fixed list of stages before
//! it reaches a route handler. A stage inspects (and may rewrite) the request
//! and then either lets it continue, rejects it with an [`AppError`] or answers
//! it directly with its own response. A stage may also put a deadline on the
//! remainder of the chain and post-process the response on the way out.

use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures_util::future::BoxFuture;
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tracing::debug;

use super::{
    error::AppError,
    rate_limit::RateLimitStage,
    request_metadata::{RequestContext, RequestMetadata},
    sanitize::{HtmlEscapeStage, OperatorKeyStage, ParameterPollutionStage},
    security::SecurityHeadersStage,
    security_log::{SecurityEvents, SecurityLogStage},
    timeout::RequestTimeoutStage,
    validation::{BodyLimitStage, ContentTypeStage, ParameterLimitStage},
};
use crate::infrastructure::config::AppConfig;

/// What a stage decided about the request
#[derive(Debug)]
pub enum StageOutcome {
    Continue,
    /// Stop here and let the error dispatcher render the envelope
    Reject(AppError),
    /// Stop here with a response the stage built itself
    Respond(Response),
}

/// Request body after buffering
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedBody {
    None,
    Json(Value),
    Form(Vec<(String, String)>),
}

impl ParsedBody {
    /// Number of top-level keys
    pub fn key_count(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Json(Value::Object(map)) => map.len(),
            Self::Json(_) => 0,
            Self::Form(pairs) => pairs.len(),
        }
    }
}

/// Mutable view of a request while it moves through the pipeline
pub struct StageContext {
    pub parts: Parts,
    pub metadata: Arc<RequestMetadata>,
    /// Decoded query pairs. Change them through [`StageContext::set_query`].
    pub query: Vec<(String, String)>,
    /// Headers added to whatever response the request ends with
    pub response_headers: HeaderMap,
    body: Option<Body>,
    raw: Bytes,
    parsed: ParsedBody,
    modified: bool,
}

impl StageContext {
    pub fn new(request: Request) -> Self {
        let metadata = Arc::clone(&RequestContext::from_request(&request).metadata);
        let (parts, body) = request.into_parts();
        let query = parts
            .uri
            .query()
            .map(|query| {
                url::form_urlencoded::parse(query.as_bytes())
                    .map(|(key, value)| (key.into_owned(), value.into_owned()))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            parts,
            metadata,
            query,
            response_headers: HeaderMap::new(),
            body: Some(body),
            raw: Bytes::new(),
            parsed: ParsedBody::None,
            modified: false,
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.parts.headers.get(header::CONTENT_TYPE).and_then(|value| value.to_str().ok())
    }

    pub fn is_form(&self) -> bool {
        self.content_type()
            .is_some_and(|content_type| content_type.starts_with("application/x-www-form-urlencoded"))
    }

    /// The unread body. `None` once a stage has buffered it.
    pub fn take_body(&mut self) -> Option<Body> {
        self.body.take()
    }

    pub fn set_buffered(&mut self, raw: Bytes, parsed: ParsedBody) {
        self.body = None;
        self.raw = raw;
        self.parsed = parsed;
        self.modified = false;
    }

    pub fn raw_body(&self) -> &Bytes {
        &self.raw
    }

    pub fn parsed(&self) -> &ParsedBody {
        &self.parsed
    }

    /// Mutable access marks the body for re-encoding
    pub fn parsed_mut(&mut self) -> &mut ParsedBody {
        self.modified = true;
        &mut self.parsed
    }

    pub fn path(&self) -> &str {
        &self.metadata.path
    }

    /// Replace the query pairs and rewrite the request URI to carry them
    pub fn set_query(&mut self, pairs: Vec<(String, String)>) -> Result<(), AppError> {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(&pairs)
            .finish();
        let path = self.parts.uri.path();
        let path_and_query =
            if query.is_empty() { path.to_string() } else { format!("{path}?{query}") };

        let mut uri = self.parts.uri.clone().into_parts();
        uri.path_and_query = Some(path_and_query.parse().map_err(AppError::unexpected)?);
        self.parts.uri = Uri::from_parts(uri).map_err(AppError::unexpected)?;
        self.query = pairs;
        Ok(())
    }

    /// Reassemble the request for the handler
    pub fn into_request(self) -> Result<Request, AppError> {
        let Self { mut parts, body, raw, parsed, modified, .. } = self;

        if let Some(body) = body {
            return Ok(Request::from_parts(parts, body));
        }

        let bytes = if modified {
            match parsed {
                ParsedBody::Json(value) => Bytes::from(serde_json::to_vec(&value)?),
                ParsedBody::Form(pairs) => Bytes::from(
                    url::form_urlencoded::Serializer::new(String::new())
                        .extend_pairs(pairs)
                        .finish(),
                ),
                ParsedBody::None => raw,
            }
        } else {
            raw
        };

        parts.headers.insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
        Ok(Request::from_parts(parts, Body::from(bytes)))
    }
}

/// One guard in the security pipeline
#[async_trait]
pub trait PipelineStage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn inspect(&self, ctx: &mut StageContext) -> StageOutcome;

    /// Time allowed for the rest of the chain, handler included
    fn deadline(&self) -> Option<Duration> {
        None
    }

    /// Response used when [`PipelineStage::deadline`] expires
    fn on_deadline(&self, _metadata: &RequestMetadata) -> Response {
        AppError::timeout().into_response()
    }

    /// Post-process the response of a request this stage let through
    fn finish(&self, _response: &mut Response) {}
}

/// Runs the stages in order, then the handler
pub struct SecurityPipeline {
    stages: Vec<Box<dyn PipelineStage>>,
}

impl SecurityPipeline {
    pub fn new(stages: Vec<Box<dyn PipelineStage>>) -> Self {
        Self { stages }
    }

    /// The standard chain, in its fixed order
    pub fn from_config(config: &AppConfig) -> Self {
        let events = SecurityEvents::from_config(&config.security);

        Self::new(vec![
            Box::new(SecurityHeadersStage::for_mode(config.mode)),
            Box::new(BodyLimitStage::new(&config.limits)),
            Box::new(RequestTimeoutStage::new(config.limits.request_timeout)),
            Box::new(ContentTypeStage),
            Box::new(ParameterLimitStage::new(config.limits.parameter_limit)),
            Box::new(RateLimitStage::new(&config.rate_limiting, events)),
            Box::new(OperatorKeyStage::new(events)),
            Box::new(ParameterPollutionStage::new(events)),
            Box::new(HtmlEscapeStage::new(events)),
            Box::new(SecurityLogStage::new(&config.security)),
        ])
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    pub async fn run(&self, request: Request, next: Next) -> Response {
        self.run_from(0, StageContext::new(request), next).await
    }

    fn run_from(&self, index: usize, mut ctx: StageContext, next: Next) -> BoxFuture<'_, Response> {
        Box::pin(async move {
            let Some(stage) = self.stages.get(index) else {
                return Self::call_handler(ctx, next).await;
            };

            match stage.inspect(&mut ctx).await {
                StageOutcome::Continue => {}
                StageOutcome::Reject(error) => {
                    debug!(stage = stage.name(), code = %error.code, "Request rejected");
                    return with_headers(error.into_response(), ctx.response_headers);
                }
                StageOutcome::Respond(response) => {
                    debug!(stage = stage.name(), status = %response.status(), "Request answered");
                    return with_headers(response, ctx.response_headers);
                }
            }

            let mut response = match stage.deadline() {
                Some(deadline) => {
                    let metadata = Arc::clone(&ctx.metadata);
                    // Expiry drops the pending chain, so only one response exists
                    match tokio::time::timeout(deadline, self.run_from(index + 1, ctx, next)).await
                    {
                        Ok(response) => response,
                        Err(_) => stage.on_deadline(&metadata),
                    }
                }
                None => self.run_from(index + 1, ctx, next).await,
            };

            stage.finish(&mut response);
            response
        })
    }

    async fn call_handler(mut ctx: StageContext, next: Next) -> Response {
        let headers = std::mem::take(&mut ctx.response_headers);
        let response = match ctx.into_request() {
            Ok(request) => next.run(request).await,
            Err(error) => error.into_response(),
        };
        with_headers(response, headers)
    }
}

fn with_headers(mut response: Response, headers: HeaderMap) -> Response {
    response.headers_mut().extend(headers);
    response
}

/// Middleware entry point
pub async fn security_pipeline(
    State(pipeline): State<Arc<SecurityPipeline>>,
    request: Request,
    next: Next,
) -> Response {
    pipeline.run(request, next).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::RuntimeMode;
    use axum::{http::StatusCode, routing::post, Router};
    use http_body_util::BodyExt;
    use serde_json::json;
    use std::sync::Mutex;
    use tower::ServiceExt;

    struct Recording {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        outcome: fn() -> StageOutcome,
    }

    #[async_trait]
    impl PipelineStage for Recording {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn inspect(&self, ctx: &mut StageContext) -> StageOutcome {
            self.log.lock().unwrap().push(format!("inspect:{}", self.name));
            ctx.response_headers.insert("x-stage", HeaderValue::from_static("seen"));
            (self.outcome)()
        }

        fn finish(&self, _response: &mut Response) {
            self.log.lock().unwrap().push(format!("finish:{}", self.name));
        }
    }

    struct Rename;

    #[async_trait]
    impl PipelineStage for Rename {
        fn name(&self) -> &'static str {
            "rename"
        }

        async fn inspect(&self, ctx: &mut StageContext) -> StageOutcome {
            if let Some(body) = ctx.take_body() {
                let raw = axum::body::to_bytes(body, 1024).await.unwrap();
                let value: Value = serde_json::from_slice(&raw).unwrap();
                ctx.set_buffered(raw, ParsedBody::Json(value));
            }
            if let ParsedBody::Json(Value::Object(map)) = ctx.parsed_mut() {
                map.insert("added".to_string(), json!(true));
            }
            StageOutcome::Continue
        }
    }

    fn continue_outcome() -> StageOutcome {
        StageOutcome::Continue
    }

    fn reject_outcome() -> StageOutcome {
        StageOutcome::Reject(AppError::forbidden())
    }

    async fn echo(body: axum::body::Bytes) -> axum::body::Bytes {
        body
    }

    fn app(pipeline: SecurityPipeline) -> Router {
        Router::new()
            .route("/echo", post(echo))
            .layer(axum::middleware::from_fn_with_state(Arc::new(pipeline), security_pipeline))
    }

    fn post_json(body: &Value) -> Request {
        Request::builder()
            .method("POST")
            .uri("/echo")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_stages_run_in_order_and_finish_in_reverse() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let stage = |name: &'static str| -> Box<dyn PipelineStage> {
            Box::new(Recording { name, log: Arc::clone(&log), outcome: continue_outcome })
        };
        let pipeline = SecurityPipeline::new(vec![stage("a"), stage("b")]);

        let response = app(pipeline).oneshot(post_json(&json!({}))).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("x-stage").unwrap(), "seen");
        assert_eq!(*log.lock().unwrap(), vec!["inspect:a", "inspect:b", "finish:b", "finish:a"]);
    }

    #[tokio::test]
    async fn test_reject_short_circuits() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = SecurityPipeline::new(vec![
            Box::new(Recording { name: "a", log: Arc::clone(&log), outcome: continue_outcome }),
            Box::new(Recording { name: "b", log: Arc::clone(&log), outcome: reject_outcome }),
            Box::new(Recording { name: "c", log: Arc::clone(&log), outcome: continue_outcome }),
        ]);

        let response = app(pipeline).oneshot(post_json(&json!({}))).await.unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.extensions().get::<AppError>().is_some());
        assert_eq!(response.headers().get("x-stage").unwrap(), "seen");
        assert_eq!(*log.lock().unwrap(), vec!["inspect:a", "inspect:b", "finish:a"]);
    }

    #[tokio::test]
    async fn test_modified_body_is_reencoded() {
        let pipeline = SecurityPipeline::new(vec![Box::new(Rename)]);
        let response = app(pipeline).oneshot(post_json(&json!({"name": "x"}))).await.unwrap();

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value, json!({"name": "x", "added": true}));
    }

    #[test]
    fn test_standard_order() {
        let pipeline = SecurityPipeline::from_config(&AppConfig::defaults_for(RuntimeMode::Test));
        assert_eq!(
            pipeline.stage_names(),
            vec![
                "security_headers",
                "body_limits",
                "request_timeout",
                "content_type",
                "parameter_limit",
                "rate_limit",
                "operator_keys",
                "parameter_pollution",
                "html_escape",
                "security_log",
            ]
        );
    }

    #[test]
    fn test_form_reencoding() {
        let request = Request::builder()
            .method("POST")
            .uri("/form?x=1")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::empty())
            .unwrap();
        let mut ctx = StageContext::new(request);
        assert!(ctx.is_form());
        assert_eq!(ctx.query, vec![("x".to_string(), "1".to_string())]);

        ctx.set_buffered(Bytes::from_static(b"a=1"), ParsedBody::Form(vec![]));
        *ctx.parsed_mut() = ParsedBody::Form(vec![("a b".to_string(), "<1>".to_string())]);
        let request = ctx.into_request().unwrap();

        assert_eq!(request.headers().get("content-length").unwrap(), "11");
    }

    #[test]
    fn test_set_query_rewrites_the_uri() {
        let request = Request::builder().uri("/api/users?page=1&page=2").body(Body::empty()).unwrap();
        let mut ctx = StageContext::new(request);

        ctx.set_query(vec![("page".to_string(), "2".to_string()), ("q".to_string(), "a b".to_string())])
            .unwrap();
        let request = ctx.into_request().unwrap();
        assert_eq!(request.uri().path(), "/api/users");
        assert_eq!(request.uri().query(), Some("page=2&q=a+b"));

        let mut ctx = StageContext::new(Request::builder().uri("/api/users?x=1").body(Body::empty()).unwrap());
        ctx.set_query(Vec::new()).unwrap();
        assert_eq!(ctx.into_request().unwrap().uri().to_string(), "/api/users");
    }
}
