//! Request context and ambient propagation
//!
//! A [`RequestContext`] is built once per inbound request and never changes
//! afterwards. The middleware publishes it, together with the request's
//! [`AuditLogger`], in two task-local slots so any code running inside the
//! request's future can look both up without a parameter:
//!
//! ```rust,ignore
//! async fn save_worklog(draft: Draft) -> Result<()> {
//!     jira.post(&draft).await?;
//!     worklog_audit::audit::log(catalog::worklog_saved(&draft.issue, draft.seconds));
//!     Ok(())
//! }
//! ```
//!
//! Task-locals are scoped to one future rather than to an OS thread, so two
//! requests interleaved on the same worker thread never observe each other's
//! slots. They do not follow `tokio::spawn`; use [`spawn`] or
//! [`in_current_scope`] to carry them into a detached task.

use chrono::{DateTime, Utc};
use http::{HeaderMap, Method, Uri};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;

use super::logger::AuditLogger;
use crate::ids::{CorrelationId, RequestId};

// Either slot may be set without the other.
tokio::task_local! {
    static CURRENT_CONTEXT: Arc<RequestContext>;
    static CURRENT_LOGGER: AuditLogger;
}

/// Headers consulted for the client address, in priority order
pub const CLIENT_IP_HEADERS: &[&str] = &["x-forwarded-for", "x-real-ip", "cf-connecting-ip"];

/// Anything the middleware can build a context from
///
/// Implemented for `http::Request<B>` and `http::request::Parts`.
pub trait AuditRequest {
    /// Request method
    fn method(&self) -> &Method;
    /// Request URI
    fn uri(&self) -> &Uri;
    /// Request headers
    fn headers(&self) -> &HeaderMap;

    /// Look up a header as UTF-8 text
    fn header(&self, name: &str) -> Option<&str> {
        self.headers().get(name).and_then(|v| v.to_str().ok())
    }
}

impl<B> AuditRequest for http::Request<B> {
    fn method(&self) -> &Method {
        self.method()
    }

    fn uri(&self) -> &Uri {
        self.uri()
    }

    fn headers(&self) -> &HeaderMap {
        self.headers()
    }
}

impl AuditRequest for http::request::Parts {
    fn method(&self) -> &Method {
        &self.method
    }

    fn uri(&self) -> &Uri {
        &self.uri
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

/// Correlation identifiers and metadata for one inbound request
#[derive(Debug, Clone)]
pub struct RequestContext {
    correlation_id: CorrelationId,
    request_id: RequestId,
    session_id: Option<String>,
    request_path: String,
    request_method: String,
    ip_address: Option<String>,
    user_agent: Option<String>,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl RequestContext {
    /// Build a context for `request` with fresh correlation and request ids
    pub fn from_request<R: AuditRequest + ?Sized>(request: &R, session_id: Option<String>) -> Self {
        Self::request_builder(request).session_id(session_id).build()
    }

    /// Start a builder pre-filled with the request's method, path, client
    /// address and user agent
    pub fn request_builder<R: AuditRequest + ?Sized>(request: &R) -> RequestContextBuilder {
        Self::builder(request.method().as_str(), request.uri().path())
            .ip_address(client_ip(request.headers()))
            .user_agent(
                request
                    .header(http::header::USER_AGENT.as_str())
                    .map(String::from),
            )
    }

    /// Start building a context by hand, e.g. for background jobs or tests
    pub fn builder(method: impl Into<String>, path: impl Into<String>) -> RequestContextBuilder {
        RequestContextBuilder {
            correlation_id: None,
            request_method: method.into(),
            request_path: path.into(),
            session_id: None,
            ip_address: None,
            user_agent: None,
        }
    }

    /// Logical flow this request belongs to
    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// This request's identifier
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Browser session, if resolved before the context was built
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Request path
    pub fn request_path(&self) -> &str {
        &self.request_path
    }

    /// Request method
    pub fn request_method(&self) -> &str {
        &self.request_method
    }

    /// Client address as extracted from proxy headers (unmasked)
    pub fn ip_address(&self) -> Option<&str> {
        self.ip_address.as_deref()
    }

    /// Client user agent (unsanitized)
    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    /// Wall-clock time the context was created
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Whole milliseconds since the context was created
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Builder for [`RequestContext`]
#[derive(Debug)]
pub struct RequestContextBuilder {
    correlation_id: Option<CorrelationId>,
    request_method: String,
    request_path: String,
    session_id: Option<String>,
    ip_address: Option<String>,
    user_agent: Option<String>,
}

impl RequestContextBuilder {
    /// Reuse an existing correlation id, e.g. across an OAuth redirect chain
    pub fn correlation_id(mut self, id: Option<CorrelationId>) -> Self {
        self.correlation_id = id;
        self
    }

    /// Set the browser session
    pub fn session_id(mut self, id: Option<String>) -> Self {
        self.session_id = id;
        self
    }

    /// Set the client address
    pub fn ip_address(mut self, ip: Option<String>) -> Self {
        self.ip_address = ip;
        self
    }

    /// Set the client user agent
    pub fn user_agent(mut self, user_agent: Option<String>) -> Self {
        self.user_agent = user_agent;
        self
    }

    /// Stamp the start time and mint the request id
    pub fn build(self) -> RequestContext {
        RequestContext {
            correlation_id: self.correlation_id.unwrap_or_default(),
            request_id: RequestId::new(),
            session_id: self.session_id,
            request_path: self.request_path,
            request_method: self.request_method,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }
}

/// Extract the client address from proxy headers
///
/// Takes the first hop of `x-forwarded-for`, then falls back to `x-real-ip`
/// and `cf-connecting-ip`. Empty values are skipped.
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    CLIENT_IP_HEADERS.iter().find_map(|name| {
        let value = headers.get(*name)?.to_str().ok()?;
        let first = value.split(',').next().unwrap_or(value).trim();
        (!first.is_empty()).then(|| first.to_string())
    })
}

/// The context of the request currently executing, if any
pub fn current_context() -> Option<Arc<RequestContext>> {
    CURRENT_CONTEXT.try_with(Arc::clone).ok()
}

/// The audit logger of the request currently executing, if any
pub fn current_logger() -> Option<AuditLogger> {
    CURRENT_LOGGER.try_with(AuditLogger::clone).ok()
}

/// Run `fut` with `context` and `logger` published in the ambient slots
pub async fn scope<F>(context: Arc<RequestContext>, logger: AuditLogger, fut: F) -> F::Output
where
    F: Future,
{
    CURRENT_CONTEXT
        .scope(context, CURRENT_LOGGER.scope(logger, fut))
        .await
}

/// Carry the current ambient slots (if any) into `fut`
///
/// Use this for futures that will be polled outside the current task, such as
/// ones handed to `tokio::spawn` or a `JoinSet`.
pub fn in_current_scope<F>(fut: F) -> impl Future<Output = F::Output>
where
    F: Future,
{
    let context = current_context();
    let logger = current_logger();

    async move {
        match (context, logger) {
            (Some(context), Some(logger)) => scope(context, logger, fut).await,
            (Some(context), None) => CURRENT_CONTEXT.scope(context, fut).await,
            (None, Some(logger)) => CURRENT_LOGGER.scope(logger, fut).await,
            (None, None) => fut.await,
        }
    }
}

/// `tokio::spawn` that keeps the spawning request's context and logger
pub fn spawn<F>(fut: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(in_current_scope(fut))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::storage::MemorySink;

    fn request(headers: &[(&str, &str)]) -> http::Request<()> {
        let mut builder = http::Request::builder()
            .method("POST")
            .uri("/api/worklogs?issue=PROJ-1");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap()
    }

    fn logger_for(context: &Arc<RequestContext>) -> AuditLogger {
        AuditLogger::new(context.clone(), Arc::new(MemorySink::new()))
    }

    #[test]
    fn test_from_request_extracts_metadata() {
        let req = request(&[
            ("user-agent", "Mozilla/5.0"),
            ("x-forwarded-for", "203.0.113.7, 10.0.0.1"),
        ]);
        let ctx = RequestContext::from_request(&req, Some("sess-1".to_string()));

        assert_eq!(ctx.request_method(), "POST");
        assert_eq!(ctx.request_path(), "/api/worklogs");
        assert_eq!(ctx.ip_address(), Some("203.0.113.7"));
        assert_eq!(ctx.user_agent(), Some("Mozilla/5.0"));
        assert_eq!(ctx.session_id(), Some("sess-1"));
        assert!(ctx.request_id().as_str().starts_with("req_"));
        assert!(ctx.correlation_id().as_str().starts_with("cor_"));
    }

    #[test]
    fn test_contexts_get_distinct_ids() {
        let req = request(&[]);
        let a = RequestContext::from_request(&req, None);
        let b = RequestContext::from_request(&req, None);
        assert_ne!(a.request_id(), b.request_id());
        assert_ne!(a.correlation_id(), b.correlation_id());
    }

    #[test]
    fn test_correlation_id_can_be_reused() {
        let flow = CorrelationId::new();
        let first = RequestContext::builder("GET", "/auth/jira")
            .correlation_id(Some(flow.clone()))
            .build();
        let second = RequestContext::builder("GET", "/auth/jira/callback")
            .correlation_id(Some(flow.clone()))
            .build();

        assert_eq!(first.correlation_id(), &flow);
        assert_eq!(second.correlation_id(), &flow);
        assert_ne!(first.request_id(), second.request_id());
    }

    #[test]
    fn test_client_ip_fallback_order() {
        let req = request(&[("x-real-ip", "198.51.100.2"), ("cf-connecting-ip", "192.0.2.9")]);
        assert_eq!(client_ip(req.headers()), Some("198.51.100.2".to_string()));

        let req = request(&[("cf-connecting-ip", "192.0.2.9")]);
        assert_eq!(client_ip(req.headers()), Some("192.0.2.9".to_string()));

        let req = request(&[("x-forwarded-for", " "), ("x-real-ip", "198.51.100.2")]);
        assert_eq!(client_ip(req.headers()), Some("198.51.100.2".to_string()));

        assert_eq!(client_ip(request(&[]).headers()), None);
    }

    #[test]
    fn test_parts_implement_audit_request() {
        let (parts, _) = request(&[("user-agent", "curl/8.0")]).into_parts();
        let ctx = RequestContext::from_request(&parts, None);
        assert_eq!(ctx.user_agent(), Some("curl/8.0"));
        assert_eq!(parts.header("user-agent"), Some("curl/8.0"));
    }

    #[tokio::test]
    async fn test_lookups_outside_scope_are_none() {
        assert!(current_context().is_none());
        assert!(current_logger().is_none());
    }

    #[tokio::test]
    async fn test_scope_publishes_both_slots() {
        let ctx = Arc::new(RequestContext::builder("GET", "/").build());
        let logger = logger_for(&ctx);
        let expected = ctx.request_id().clone();

        scope(ctx, logger, async move {
            tokio::task::yield_now().await;
            let seen = current_context().unwrap();
            assert_eq!(seen.request_id(), &expected);
            assert_eq!(current_logger().unwrap().context().request_id(), &expected);
        })
        .await;

        assert!(current_context().is_none());
    }

    #[tokio::test]
    async fn test_spawn_carries_scope_and_plain_tokio_spawn_does_not() {
        let ctx = Arc::new(RequestContext::builder("GET", "/").build());
        let logger = logger_for(&ctx);
        let expected = ctx.request_id().clone();

        scope(ctx, logger, async move {
            let carried = spawn(async { current_context().map(|c| c.request_id().clone()) })
                .await
                .unwrap();
            assert_eq!(carried, Some(expected));

            let dropped = tokio::spawn(async { current_context().is_some() })
                .await
                .unwrap();
            assert!(!dropped);
        })
        .await;
    }
}
