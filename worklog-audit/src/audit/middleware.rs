//! Audit middleware
//!
//! Wraps a request handler so that it runs with a fresh [`RequestContext`] and
//! [`AuditLogger`] published in the ambient slots, and so that whatever the
//! handler logged is flushed exactly once when it settles: on success, on
//! error, on panic, and (best effort) when the request is cancelled.
//!
//! A flush failure is reported on the operational log and never replaces the
//! handler's own result.
//!
//! # Example
//!
//! ```rust,ignore
//! use worklog_audit::audit::{self, AuditMiddleware, MemorySink};
//!
//! let audit = AuditMiddleware::new(Arc::new(MemorySink::new()));
//! let app = audit::audit_layer(
//!     Router::new().route("/api/worklogs", post(save_worklog)),
//!     audit,
//! );
//! ```

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
    Router,
};
use futures::future::BoxFuture;
use futures::FutureExt;
use http::{HeaderMap, HeaderName, HeaderValue};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::context::{self, AuditRequest, RequestContext};
use super::logger::AuditLogger;
use super::sanitize::Sanitizer;
use super::storage::AuditSink;
use crate::config::AuditConfig;
use crate::ids::CorrelationId;

/// Header the request id is echoed back in
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Lifecycle of one request's audit scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeState {
    /// Context and logger exist; the handler has not started
    Created,
    /// The handler is executing with the ambient slots visible
    Running,
    /// The handler settled and the buffer is being persisted
    Flushing,
    /// Terminal; the buffer is empty
    Cleared,
}

/// One request's context and logger, driven through [`ScopeState`]
///
/// Dropping a scope that has not reached [`ScopeState::Cleared`] (for
/// example because the request future was aborted) spawns a best-effort flush
/// of whatever was buffered.
#[derive(Debug)]
pub struct AuditScope {
    context: Arc<RequestContext>,
    logger: AuditLogger,
    state: ScopeState,
}

impl AuditScope {
    /// Create a scope around an existing logger
    pub fn new(logger: AuditLogger) -> Self {
        Self {
            context: Arc::clone(logger.context()),
            logger,
            state: ScopeState::Created,
        }
    }

    pub fn state(&self) -> ScopeState {
        self.state
    }

    pub fn context(&self) -> &Arc<RequestContext> {
        &self.context
    }

    pub fn logger(&self) -> &AuditLogger {
        &self.logger
    }

    /// Run `fut` inside the scope, then flush and clear
    ///
    /// The future's output is returned unchanged. A panic inside `fut` is
    /// caught long enough to flush, then resumed.
    pub async fn run<F>(mut self, fut: F) -> F::Output
    where
        F: Future,
    {
        self.state = ScopeState::Running;
        let outcome = context::scope(
            Arc::clone(&self.context),
            self.logger.clone(),
            AssertUnwindSafe(fut).catch_unwind(),
        )
        .await;

        if outcome.is_err() {
            tracing::warn!(
                request_id = %self.context.request_id(),
                "Handler panicked; flushing audit trail before unwinding"
            );
        }
        self.finish().await;

        match outcome {
            Ok(output) => output,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    /// Like [`run`](Self::run), but stop waiting for `fut` once `token` is cancelled
    ///
    /// Returns `None` on cancellation; entries logged before that point are
    /// still flushed.
    pub async fn run_until_cancelled<F>(
        mut self,
        token: &CancellationToken,
        fut: F,
    ) -> Option<F::Output>
    where
        F: Future,
    {
        self.state = ScopeState::Running;
        let scoped = context::scope(
            Arc::clone(&self.context),
            self.logger.clone(),
            AssertUnwindSafe(fut).catch_unwind(),
        );

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            outcome = scoped => Some(outcome),
        };

        if outcome.is_none() {
            tracing::info!(
                request_id = %self.context.request_id(),
                pending = self.logger.pending(),
                "Request cancelled; flushing partial audit trail"
            );
        }
        self.finish().await;

        match outcome {
            None => None,
            Some(Ok(output)) => Some(output),
            Some(Err(panic)) => std::panic::resume_unwind(panic),
        }
    }

    /// Flush and clear on a task of its own, so dropping the request future
    /// mid-write does not cancel the sink
    async fn finish(&mut self) {
        self.state = ScopeState::Flushing;
        let logger = self.logger.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                if let Err(e) = handle.spawn(flush_and_clear(logger)).await {
                    tracing::error!(
                        request_id = %self.context.request_id(),
                        error = %e,
                        "Audit flush task failed"
                    );
                }
            }
            Err(_) => flush_and_clear(logger).await,
        }
        self.state = ScopeState::Cleared;
    }
}

async fn flush_and_clear(logger: AuditLogger) {
    if let Err(e) = logger.flush().await {
        let context = logger.context();
        tracing::error!(
            request_id = %context.request_id(),
            correlation_id = %context.correlation_id(),
            pending = logger.pending(),
            error = %e,
            "Failed to flush audit trail"
        );
    }
    logger.clear();
}

impl Drop for AuditScope {
    fn drop(&mut self) {
        // A scope dropped while Flushing has already handed its buffer to the flush task
        if matches!(self.state, ScopeState::Cleared | ScopeState::Flushing) {
            return;
        }
        if self.logger.pending() == 0 {
            self.state = ScopeState::Cleared;
            return;
        }

        let logger = self.logger.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::info!(
                    request_id = %self.context.request_id(),
                    pending = logger.pending(),
                    "Audit scope dropped before completion; flushing partial trail"
                );
                handle.spawn(flush_and_clear(logger));
            }
            Err(_) => {
                let dropped = logger.clear();
                tracing::error!(
                    request_id = %self.context.request_id(),
                    dropped,
                    "Audit scope dropped outside a runtime; entries lost"
                );
            }
        }
        self.state = ScopeState::Cleared;
    }
}

/// Resolves the browser session before the request context is built
#[async_trait]
pub trait SessionResolver: Send + Sync {
    async fn resolve(&self, headers: &HeaderMap) -> Option<String>;
}

/// Reads the session id from a named cookie
#[derive(Debug, Clone)]
pub struct CookieSessionResolver {
    cookie_name: String,
}

impl CookieSessionResolver {
    pub fn new(cookie_name: impl Into<String>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
        }
    }
}

#[async_trait]
impl SessionResolver for CookieSessionResolver {
    async fn resolve(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(http::header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, value)| *name == self.cookie_name && !value.is_empty())
            .map(|(_, value)| value.to_string())
    }
}

/// Builds an [`AuditScope`] per request and runs handlers inside it
///
/// Cheap to clone; use as axum middleware state or call [`handle`](Self::handle)
/// directly.
#[derive(Clone)]
pub struct AuditMiddleware {
    sink: Arc<dyn AuditSink>,
    sanitizer: Sanitizer,
    config: Arc<AuditConfig>,
    session_resolver: Option<Arc<dyn SessionResolver>>,
}

impl std::fmt::Debug for AuditMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditMiddleware")
            .field("config", &self.config)
            .field("sanitizer", &self.sanitizer)
            .field("session_resolver", &self.session_resolver.is_some())
            .finish()
    }
}

impl AuditMiddleware {
    /// Create middleware with default settings
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self::from_config(&AuditConfig::default(), sink)
    }

    pub fn from_config(config: &AuditConfig, sink: Arc<dyn AuditSink>) -> Self {
        Self {
            sink,
            sanitizer: Sanitizer::from_config(config),
            config: Arc::new(config.clone()),
            session_resolver: None,
        }
    }

    /// Resolve the session id before each context is built
    pub fn with_session_resolver(mut self, resolver: impl SessionResolver + 'static) -> Self {
        self.session_resolver = Some(Arc::new(resolver));
        self
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Whether `path` bypasses auditing entirely
    pub fn is_excluded(&self, path: &str) -> bool {
        !self.config.enabled || path_matches_patterns(path, &self.config.excluded_routes)
    }

    /// Run the configured session resolver, if any
    pub async fn resolve_session(&self, headers: &HeaderMap) -> Option<String> {
        match &self.session_resolver {
            Some(resolver) => resolver.resolve(headers).await,
            None => None,
        }
    }

    /// Build the context and logger for `request`
    pub fn open_scope<R>(&self, request: &R, session_id: Option<String>) -> AuditScope
    where
        R: AuditRequest + ?Sized,
    {
        let correlation_id = if self.config.trust_correlation_header {
            request
                .header(&self.config.correlation_header)
                .and_then(|value| value.parse::<CorrelationId>().ok())
        } else {
            None
        };

        let context = RequestContext::request_builder(request)
            .correlation_id(correlation_id)
            .session_id(session_id)
            .build();

        AuditScope::new(AuditLogger::with_sanitizer(
            Arc::new(context),
            Arc::clone(&self.sink),
            self.sanitizer,
        ))
    }

    /// Invoke `handler` with `request` inside a fresh audit scope
    pub async fn handle<B, H, Fut>(&self, request: http::Request<B>, handler: H) -> Fut::Output
    where
        H: FnOnce(http::Request<B>) -> Fut,
        Fut: Future,
    {
        let (parts, body) = request.into_parts();
        let session_id = self.resolve_session(&parts.headers).await;
        let scope = self.open_scope(&parts, session_id);
        scope
            .run(handler(http::Request::from_parts(parts, body)))
            .await
    }

    /// Wrap `handler` so every call runs through [`handle`](Self::handle)
    pub fn wrap<B, H, Fut>(
        &self,
        handler: H,
    ) -> impl Fn(http::Request<B>) -> BoxFuture<'static, Fut::Output> + Clone + Send + Sync + 'static
    where
        B: Send + 'static,
        H: Fn(http::Request<B>) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: Send + 'static,
    {
        let middleware = self.clone();
        move |request| {
            let middleware = middleware.clone();
            let handler = handler.clone();
            async move { middleware.handle(request, handler).await }.boxed()
        }
    }
}

/// Audit middleware function for axum
///
/// Use with `axum::middleware::from_fn_with_state`, or apply it to a whole
/// router with [`audit_layer`]. The request id and correlation id are echoed
/// on the response.
pub async fn audit_middleware(
    State(audit): State<AuditMiddleware>,
    request: Request,
    next: Next,
) -> Response {
    if audit.is_excluded(request.uri().path()) {
        return next.run(request).await;
    }

    // The body is not Sync, so only the parts are held across the resolver
    let (parts, body) = request.into_parts();
    let session_id = audit.resolve_session(&parts.headers).await;
    let scope = audit.open_scope(&parts, session_id);
    let context = Arc::clone(scope.context());

    let request = Request::from_parts(parts, body);
    let mut response = scope.run(next.run(request)).await;

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(context.request_id().as_str()) {
        headers.insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    if let (Ok(name), Ok(value)) = (
        HeaderName::from_bytes(audit.config.correlation_header.as_bytes()),
        HeaderValue::from_str(context.correlation_id().as_str()),
    ) {
        headers.insert(name, value);
    }

    response
}

/// Apply [`audit_middleware`] to every route of `router`
pub fn audit_layer<S>(router: Router<S>, audit: AuditMiddleware) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(axum::middleware::from_fn_with_state(audit, audit_middleware))
}

/// Check if a path matches any of the given glob patterns
///
/// Supports simple wildcard matching:
/// - `*` matches within one position of the pattern
/// - trailing `/*` matches anything below the prefix, `/**` also the prefix itself
pub fn path_matches_patterns(path: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|pattern| path_matches_glob(path, pattern))
}

fn path_matches_glob(path: &str, pattern: &str) -> bool {
    if path == pattern {
        return true;
    }

    // Prefixes only match on a segment boundary: `/internal/*` is not `/internal-admin`
    if let Some(prefix) = pattern.strip_suffix("/**") {
        return path == prefix || below(path, prefix);
    }
    if let Some(prefix) = pattern.strip_suffix("/*") {
        return below(path, prefix);
    }

    match pattern.split_once('*') {
        Some((head, tail)) if !tail.contains('*') => {
            path.len() >= head.len() + tail.len()
                && path.starts_with(head)
                && path.ends_with(tail)
                && !path[head.len()..path.len() - tail.len()].contains('/')
        }
        _ => false,
    }
}

fn below(path: &str, prefix: &str) -> bool {
    path.strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('/'))
        .is_some_and(|rest| !rest.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::event::{ActionType, AuditLogEntry, AuditSeverity, NewAuditEntry, ResourceType};
    use crate::audit::logger;
    use crate::audit::storage::MemorySink;
    use crate::ids::RequestId;
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn request(path: &str) -> http::Request<()> {
        http::Request::builder()
            .method("POST")
            .uri(path)
            .header("user-agent", "worklog-tests/1.0")
            .body(())
            .unwrap()
    }

    fn entry(description: &str) -> NewAuditEntry {
        NewAuditEntry::new(ActionType::DataMutation, ResourceType::Worklog, description)
    }

    fn setup() -> (Arc<MemorySink>, AuditMiddleware) {
        let sink = Arc::new(MemorySink::new());
        let audit = AuditMiddleware::new(sink.clone());
        (sink, audit)
    }

    fn current_request_id() -> Option<RequestId> {
        context::current_context().map(|c| c.request_id().clone())
    }

    #[tokio::test]
    async fn test_success_flushes_once() {
        let (sink, audit) = setup();

        let result = audit
            .handle(request("/api/worklogs"), |_req| async {
                logger::log(entry("first"));
                logger::log(entry("second"));
                Ok::<_, std::io::Error>(42)
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(sink.batches(), 1);
        let entries = sink.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].sequence_number, 0);
        assert_eq!(entries[1].sequence_number, 1);
        assert_eq!(entries[0].request_id, entries[1].request_id);
        assert_eq!(entries[0].correlation_id, entries[1].correlation_id);
        assert!(entries.iter().all(|e| e.occurred_at.is_some()));
    }

    #[tokio::test]
    async fn test_handler_without_entries_writes_nothing() {
        let (sink, audit) = setup();
        audit.handle(request("/api/worklogs"), |_req| async {}).await;
        assert_eq!(sink.batches(), 0);
    }

    #[tokio::test]
    async fn test_error_is_returned_after_flush() {
        let (sink, audit) = setup();

        let result: Result<(), std::io::Error> = audit
            .handle(request("/api/session"), |_req| async {
                logger::log(
                    NewAuditEntry::new(
                        ActionType::Authentication,
                        ResourceType::Session,
                        "bad password",
                    )
                    .failed(AuditSeverity::Warning),
                );
                Err(std::io::Error::new(std::io::ErrorKind::Other, "boom"))
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::Other);
        assert_eq!(err.to_string(), "boom");

        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action_description, "bad password");
        assert_eq!(entries[0].severity, AuditSeverity::Warning);
    }

    #[tokio::test]
    async fn test_flush_failure_does_not_mask_result() {
        let (sink, audit) = setup();
        sink.fail_writes(true);

        let ok = audit
            .handle(request("/api/worklogs"), |_req| async {
                logger::log(entry("lost"));
                "done"
            })
            .await;
        assert_eq!(ok, "done");

        let err: Result<(), &str> = audit
            .handle(request("/api/worklogs"), |_req| async {
                logger::log(entry("lost too"));
                Err("original")
            })
            .await;
        assert_eq!(err, Err("original"));
        assert!(sink.entries().is_empty());
    }

    #[tokio::test]
    async fn test_panic_flushes_then_resumes() {
        let (sink, audit) = setup();

        let outcome = AssertUnwindSafe(audit.handle(request("/api/worklogs"), |_req| async {
            logger::log(entry("before panic"));
            panic!("handler exploded");
        }))
        .catch_unwind()
        .await;

        assert!(outcome.is_err());
        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action_description, "before panic");
    }

    #[tokio::test]
    async fn test_interleaved_requests_stay_isolated() {
        let (sink, audit) = setup();
        let (tx, rx) = oneshot::channel::<()>();

        let a = audit.handle(request("/a"), |_req| async move {
            logger::log(entry("A1"));
            rx.await.ok();
            logger::log(entry("A2"));
            current_request_id()
        });
        let b = audit.handle(request("/b"), |_req| async move {
            logger::log(entry("B1"));
            tx.send(()).ok();
            current_request_id()
        });

        let (a_id, b_id) = tokio::join!(a, b);
        let a_id = a_id.unwrap();
        let b_id = b_id.unwrap();
        assert_ne!(a_id, b_id);

        let entries = sink.entries();
        let descriptions_for = |id: &RequestId| {
            let mut found: Vec<_> = entries
                .iter()
                .filter(|e| &e.request_id == id)
                .map(|e| e.action_description.clone())
                .collect();
            found.sort();
            found
        };
        assert_eq!(descriptions_for(&a_id), vec!["A1", "A2"]);
        assert_eq!(descriptions_for(&b_id), vec!["B1"]);
    }

    #[tokio::test]
    async fn test_ambient_slots_empty_outside_scope() {
        let (_sink, audit) = setup();
        audit
            .handle(request("/api/worklogs"), |_req| async {
                assert!(context::current_logger().is_some());
            })
            .await;
        assert!(context::current_logger().is_none());
        assert!(logger::log(entry("nowhere")).is_none());
    }

    #[tokio::test]
    async fn test_spawned_tasks_share_the_request_logger() {
        let (sink, audit) = setup();

        audit
            .handle(request("/api/worklogs"), |_req| async {
                let background = context::spawn(async {
                    logger::log(entry("from spawned task"));
                });
                background.await.unwrap();
                logger::log(entry("after join"));
            })
            .await;

        let entries = sink.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action_description, "from spawned task");
        assert_eq!(entries[0].request_id, entries[1].request_id);
    }

    #[tokio::test]
    async fn test_cancellation_token_flushes_partial_trail() {
        let (sink, audit) = setup();
        let token = CancellationToken::new();
        let scope = audit.open_scope(&request("/api/commits"), None);

        let cancel = token.clone();
        let output = scope
            .run_until_cancelled(&token, async move {
                logger::log(entry("started"));
                cancel.cancel();
                futures::future::pending::<()>().await;
            })
            .await;

        assert!(output.is_none());
        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action_description, "started");
    }

    #[tokio::test]
    async fn test_dropped_scope_flushes_in_background() {
        let (sink, audit) = setup();

        let aborted = tokio::time::timeout(
            Duration::from_millis(10),
            audit.handle(request("/api/commits"), |_req| async {
                logger::log(entry("partial"));
                futures::future::pending::<()>().await;
            }),
        )
        .await;
        assert!(aborted.is_err());

        for _ in 0..10 {
            if !sink.entries().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action_description, "partial");
    }

    struct SlowSink {
        inner: MemorySink,
        delay: Duration,
    }

    #[async_trait]
    impl AuditSink for SlowSink {
        async fn write_batch(&self, entries: &[AuditLogEntry]) -> crate::error::Result<()> {
            tokio::time::sleep(self.delay).await;
            self.inner.write_batch(entries).await
        }
    }

    #[tokio::test]
    async fn test_request_dropped_during_flush_still_persists() {
        let sink = Arc::new(SlowSink {
            inner: MemorySink::new(),
            delay: Duration::from_millis(50),
        });
        let audit = AuditMiddleware::new(sink.clone());

        let aborted = tokio::time::timeout(
            Duration::from_millis(10),
            audit.handle(request("/api/worklogs"), |_req| async {
                logger::log(entry("in flight"));
            }),
        )
        .await;
        assert!(aborted.is_err());

        tokio::time::sleep(Duration::from_millis(200)).await;
        let entries = sink.inner.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action_description, "in flight");
    }

    #[tokio::test]
    async fn test_scope_starts_created() {
        let (_sink, audit) = setup();
        let scope = audit.open_scope(&request("/api/worklogs"), None);
        assert_eq!(scope.state(), ScopeState::Created);
        assert_eq!(scope.context().request_path(), "/api/worklogs");
        assert_eq!(scope.context().user_agent(), Some("worklog-tests/1.0"));
    }

    #[tokio::test]
    async fn test_session_resolver_runs_before_context() {
        let sink = Arc::new(MemorySink::new());
        let audit = AuditMiddleware::new(sink.clone())
            .with_session_resolver(CookieSessionResolver::new("worklog_session"));

        let req = http::Request::builder()
            .uri("/api/worklogs")
            .header("cookie", "theme=dark; worklog_session=sess-123")
            .body(())
            .unwrap();

        let session = audit
            .handle(req, |_req| async {
                logger::log(entry("with session"));
                context::current_context().and_then(|c| c.session_id().map(String::from))
            })
            .await;

        assert_eq!(session.as_deref(), Some("sess-123"));
        assert_eq!(sink.entries()[0].session_id.as_deref(), Some("sess-123"));
    }

    #[tokio::test]
    async fn test_cookie_resolver_ignores_missing_cookie() {
        let resolver = CookieSessionResolver::new("worklog_session");
        let mut headers = HeaderMap::new();
        assert_eq!(resolver.resolve(&headers).await, None);

        headers.insert("cookie", HeaderValue::from_static("worklog_session="));
        assert_eq!(resolver.resolve(&headers).await, None);
    }

    #[tokio::test]
    async fn test_correlation_header_reused_only_when_trusted() {
        let inbound = CorrelationId::new();
        let req = || {
            http::Request::builder()
                .uri("/oauth/callback")
                .header("x-correlation-id", inbound.as_str())
                .body(())
                .unwrap()
        };

        let (_sink, untrusted) = setup();
        let scope = untrusted.open_scope(&req(), None);
        assert_ne!(scope.context().correlation_id(), &inbound);

        let config = AuditConfig {
            trust_correlation_header: true,
            ..AuditConfig::default()
        };
        let trusted = AuditMiddleware::from_config(&config, Arc::new(MemorySink::new()));
        let scope = trusted.open_scope(&req(), None);
        assert_eq!(scope.context().correlation_id(), &inbound);

        let bogus = http::Request::builder()
            .uri("/oauth/callback")
            .header("x-correlation-id", "not-a-typeid")
            .body(())
            .unwrap();
        let scope = trusted.open_scope(&bogus, None);
        assert_ne!(scope.context().correlation_id().as_str(), "not-a-typeid");
    }

    #[tokio::test]
    async fn test_wrap_produces_reusable_handler() {
        let (sink, audit) = setup();
        let wrapped = audit.wrap(|req: http::Request<()>| async move {
            logger::log(entry(req.uri().path()));
            req.uri().path().len()
        });

        assert_eq!(wrapped(request("/one")).await, 4);
        assert_eq!(wrapped(request("/three")).await, 6);

        let entries = sink.entries();
        assert_eq!(entries.len(), 2);
        assert_ne!(entries[0].request_id, entries[1].request_id);
        assert_eq!(entries[1].sequence_number, 0);
    }

    #[test]
    fn test_excluded_routes() {
        let sink: Arc<dyn AuditSink> = Arc::new(MemorySink::new());
        let audit = AuditMiddleware::new(Arc::clone(&sink));
        assert!(audit.is_excluded("/health"));
        assert!(!audit.is_excluded("/api/worklogs"));

        let disabled = AuditMiddleware::from_config(
            &AuditConfig {
                enabled: false,
                ..AuditConfig::default()
            },
            sink,
        );
        assert!(disabled.is_excluded("/api/worklogs"));
    }

    #[test]
    fn test_path_matches_exact() {
        assert!(path_matches_glob("/api/worklogs", "/api/worklogs"));
        assert!(!path_matches_glob("/api/worklogs", "/api/commits"));
    }

    #[test]
    fn test_path_matches_trailing_wildcard() {
        assert!(path_matches_glob("/internal/metrics", "/internal/*"));
        assert!(path_matches_glob("/internal/ready", "/internal/*"));
        assert!(!path_matches_glob("/internal", "/internal/*"));
        assert!(!path_matches_glob("/api/worklogs", "/internal/*"));
        assert!(!path_matches_glob("/internal-admin/users", "/internal/*"));
        assert!(!path_matches_glob("/internalx", "/internal/*"));
        assert!(!path_matches_glob("/internal/", "/internal/*"));
    }

    #[test]
    fn test_path_matches_double_wildcard() {
        assert!(path_matches_glob("/static/css/app.css", "/static/**"));
        assert!(path_matches_glob("/static", "/static/**"));
        assert!(!path_matches_glob("/staticfoo", "/static/**"));
        assert!(!path_matches_glob("/static-assets/app.css", "/static/**"));
    }

    #[test]
    fn test_inner_wildcard_stays_within_one_segment() {
        let pattern = "/api/worklogs/*/preview";
        assert!(path_matches_glob("/api/worklogs/123/preview", pattern));
        assert!(!path_matches_glob("/api/worklogs/1/2/preview", pattern));
    }

    #[test]
    fn test_sibling_paths_are_still_audited() {
        let sink: Arc<dyn AuditSink> = Arc::new(MemorySink::new());
        let audit = AuditMiddleware::from_config(
            &AuditConfig {
                excluded_routes: vec!["/internal/*".to_string(), "/static/**".to_string()],
                ..AuditConfig::default()
            },
            sink,
        );

        assert!(audit.is_excluded("/internal/metrics"));
        assert!(audit.is_excluded("/static/app.js"));
        assert!(!audit.is_excluded("/internal-admin/users"));
        assert!(!audit.is_excluded("/staticfoo"));
    }

    #[test]
    fn test_path_matches_patterns_list() {
        let patterns = vec![
            "/static/*".to_string(),
            "/api/worklogs/*/preview".to_string(),
        ];

        assert!(path_matches_patterns("/static/logo.svg", &patterns));
        assert!(path_matches_patterns("/api/worklogs/123/preview", &patterns));
        assert!(!path_matches_patterns("/api/worklogs/123", &patterns));
        assert!(!path_matches_patterns("/api/worklogs/preview", &patterns));
    }
}
