//! The render dispatcher: request in, response out.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::header::IF_NONE_MATCH;
use http::StatusCode;
use ssr_cache::{etag_matches, generate_etag, InflightFetches, ResourceCache};
use ssr_core::{
    HostEnv, MatchedRoute, RenderConfig, RenderError, RendererKind, RequestContext, RouteMatch, RouteMatcher,
    MARK_ALL_READY, MARK_SHELL_READY,
};
use ssr_security::Nonce;
use ssr_streaming::{
    renderer_for, BufferedResponse, Component, Document, ErrorReporter, ForwardOutcome, HeadContent, Node,
    RenderJob, ResponseHead, ResponseSink, Scope, StreamRenderer, StreamResult, TracingReporter,
};

use crate::bootstrap::BootstrapScripts;
use crate::collaborators::{BuildManifest, ComponentLoader, StaticManifest};
use crate::error::DispatchError;
use crate::error_page::ErrorPageRenderer;
use crate::headers::HeaderBatch;
use crate::hydration::HydrationPayload;

/// How a request was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The route rendered; stream errors may still have been contained.
    Rendered,
    /// A static document matched the client's `If-None-Match`.
    NotModified,
    /// The matcher redirected; nothing was rendered.
    Redirected,
    /// No route matched.
    NotFound,
    /// A server error document replaced the response.
    ErrorPage,
    /// The request was cancelled; the response was abandoned.
    Cancelled,
}

/// What happened while answering one request.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    /// Status committed to the sink, if any head was sent.
    pub status: Option<StatusCode>,
    /// Outcome kind.
    pub outcome: DispatchOutcome,
    /// Renderer that drove the render, if rendering started.
    pub renderer: Option<RendererKind>,
    /// Tracking id shown on a server error document.
    pub tracking_id: Option<String>,
    /// Error that replaced the response.
    pub error: Option<RenderError>,
    /// Errors after the shell that no boundary caught.
    pub stream_errors: Vec<RenderError>,
}

impl DispatchReport {
    fn new(outcome: DispatchOutcome, status: Option<StatusCode>) -> Self {
        Self {
            status,
            outcome,
            renderer: None,
            tracking_id: None,
            error: None,
            stream_errors: Vec::new(),
        }
    }

    fn with_renderer(mut self, kind: Option<RendererKind>) -> Self {
        self.renderer = kind;
        self
    }
}

/// Turns requests into responses.
///
/// Matches the route, short-circuits redirects and misses, renders the
/// route component through the configured streaming renderer, enforces
/// the shell timeout, and writes headers then body into the sink. Render
/// failures before any byte is sent become error documents; failures
/// after that are contained and reported.
pub struct RenderDispatcher {
    config: RenderConfig,
    matcher: Arc<dyn RouteMatcher>,
    loader: Arc<dyn ComponentLoader>,
    manifest: Arc<dyn BuildManifest>,
    cache: Arc<ResourceCache>,
    fetches: Arc<InflightFetches<serde_json::Value>>,
    renderer: Arc<dyn StreamRenderer>,
    reporter: Arc<dyn ErrorReporter>,
    error_pages: ErrorPageRenderer,
}

impl RenderDispatcher {
    /// Create a dispatcher.
    ///
    /// The renderer comes from the config override, else the pipe variant;
    /// use [`RenderDispatcher::with_host_env`] to probe a host.
    pub fn new(config: RenderConfig, matcher: Arc<dyn RouteMatcher>, loader: Arc<dyn ComponentLoader>) -> Self {
        let renderer = renderer_for(RendererKind::select(config.renderer, &HostEnv::default()));
        let cache = Arc::new(ResourceCache::new().with_default_ttl(config.cache_ttl()));
        let error_pages = ErrorPageRenderer::new(config.environment);

        Self {
            config,
            matcher,
            loader,
            manifest: Arc::new(StaticManifest::default()),
            cache,
            fetches: Arc::new(InflightFetches::new()),
            renderer,
            reporter: Arc::new(TracingReporter),
            error_pages,
        }
    }

    /// Select the renderer for `host`, unless the config forces one.
    pub fn with_host_env(mut self, host: &HostEnv) -> Self {
        self.renderer = renderer_for(RendererKind::select(self.config.renderer, host));
        self
    }

    /// Use a specific renderer.
    pub fn with_renderer(mut self, renderer: Arc<dyn StreamRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Share an existing resource cache.
    pub fn with_cache(mut self, cache: Arc<ResourceCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Resolve bootstrap chunks through `manifest`.
    pub fn with_manifest(mut self, manifest: Arc<dyn BuildManifest>) -> Self {
        self.manifest = manifest;
        self
    }

    /// Send boundary errors to `reporter`.
    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// The configuration.
    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// The resource cache shared by every request.
    pub fn cache(&self) -> &Arc<ResourceCache> {
        &self.cache
    }

    /// Outbound fetches currently shared between requests.
    pub fn fetches(&self) -> &Arc<InflightFetches<serde_json::Value>> {
        &self.fetches
    }

    /// Which renderer drives responses.
    pub fn renderer_kind(&self) -> RendererKind {
        self.renderer.kind()
    }

    /// A context for `request` in the configured default mode.
    pub fn context_for<B>(&self, request: &http::Request<B>) -> RequestContext {
        RequestContext::from_request(request, self.config.response_mode)
    }

    /// Answer `request` into `sink`.
    ///
    /// Marks `shell-ready` and `all-ready` on `ctx` as they happen.
    /// Returns an error only when the response itself cannot be written.
    pub async fn dispatch<B>(
        &self,
        request: &http::Request<B>,
        ctx: &mut RequestContext,
        sink: &mut dyn ResponseSink,
    ) -> Result<DispatchReport, DispatchError> {
        let path = request.uri().path().to_string();
        tracing::debug!(request_id = %ctx.id, method = %request.method(), path = %path, mode = %ctx.mode, "dispatching");

        let matched = match self.matcher.match_route(request.method(), &path) {
            RouteMatch::Found(matched) => matched,
            RouteMatch::Redirect { status, location } => {
                return self.redirect(ctx, status, &location, sink).await;
            }
            RouteMatch::NotFound => {
                let error = RenderError::RouteNotFound(path.clone());
                return self.error_page(ctx, error, &path, None, sink).await;
            }
        };

        let Some(component) = self.loader.load(&matched.route.file_path) else {
            let error = RenderError::unhandled(anyhow::anyhow!("no component for {}", matched.route.file_path));
            return self.error_page(ctx, error, &path, None, sink).await;
        };

        let bootstrap = match BootstrapScripts::resolve(&self.config.bootstrap, self.manifest.as_ref()) {
            Ok(bootstrap) => bootstrap,
            Err(err) => {
                return self.error_page(ctx, RenderError::unhandled(err.into()), &path, None, sink).await;
            }
        };

        let kind = Some(self.renderer.kind());
        let job = self.job(component, matched, &path, ctx, bootstrap);
        let result = self.renderer.render(job);

        if let Err(error) = self.await_shell(result.as_ref()).await {
            result.abort();
            if ctx.is_cancelled() {
                tracing::debug!(request_id = %ctx.id, "request cancelled before shell");
                return Ok(DispatchReport::new(DispatchOutcome::Cancelled, None).with_renderer(kind));
            }
            return self.error_page(ctx, error, &path, kind, sink).await;
        }
        ctx.mark(MARK_SHELL_READY);

        if ctx.mode.is_streaming() {
            self.stream(ctx, result, sink).await
        } else {
            self.render_static(request, ctx, result, sink).await
        }
    }

    fn job(
        &self,
        component: Arc<dyn Component>,
        matched: MatchedRoute,
        path: &str,
        ctx: &RequestContext,
        bootstrap: BootstrapScripts,
    ) -> RenderJob {
        let scope = Scope::new(self.cache.clone(), ctx.id.clone())
            .with_fetches(self.fetches.clone())
            .with_params(matched.params)
            .with_path(path);

        let head = self
            .config
            .stylesheets
            .iter()
            .fold(HeadContent::new(self.config.title.clone()), |head, href| {
                head.with_stylesheet(href.clone())
            });
        let document = Document::new(head).with_root_id(self.config.root_id.clone());

        let cache = self.cache.clone();
        let routes = self.matcher.routes();
        let global = self.config.hydration_global.clone();
        let nonce = ctx.nonce.clone();
        let request_id = ctx.id.clone();
        let tail = move || {
            // Runs at all-ready, so every resource the render read has settled.
            let payload = HydrationPayload::from_cache(routes, &cache);
            let mut html = payload.render_script(&global, &nonce).unwrap_or_else(|err| {
                tracing::warn!(request_id = %request_id, error = %err, "hydration payload not serializable");
                String::new()
            });
            html.push_str(&bootstrap.render(&nonce));
            html
        };

        RenderJob::new(Node::component(component), scope)
            .with_document(document)
            .with_nonce(ctx.nonce.clone())
            .with_reveal(self.config.reveal)
            .with_reporter(self.reporter.clone())
            .with_cancellation(ctx.cancellation().clone())
            .with_tail(tail)
    }

    async fn await_shell(&self, result: &dyn StreamResult) -> Result<(), RenderError> {
        match self.config.shell_timeout() {
            Some(limit) => match tokio::time::timeout(limit, result.shell_ready()).await {
                Ok(ready) => ready,
                Err(_) => {
                    tracing::warn!(timeout_ms = limit.as_millis() as u64, "shell not ready in time, aborting render");
                    Err(RenderError::ShellTimeout(limit))
                }
            },
            None => result.shell_ready().await,
        }
    }

    async fn stream(
        &self,
        ctx: &mut RequestContext,
        mut result: Box<dyn StreamResult>,
        sink: &mut dyn ResponseSink,
    ) -> Result<DispatchReport, DispatchError> {
        let headers = HeaderBatch::for_document(ctx).into_header_map()?;
        sink.send_head(ResponseHead::new(StatusCode::OK).with_headers(headers)).await?;

        let forwarded = result.forward(sink).await?;
        let outcome = match forwarded {
            ForwardOutcome::Completed => {
                ctx.mark(MARK_ALL_READY);
                DispatchOutcome::Rendered
            }
            ForwardOutcome::Aborted => {
                tracing::debug!(request_id = %ctx.id, "response abandoned mid-stream");
                DispatchOutcome::Cancelled
            }
        };

        let mut report = DispatchReport::new(outcome, Some(StatusCode::OK)).with_renderer(Some(result.kind()));
        report.stream_errors = result.lifecycle().stream_errors;
        Ok(report)
    }

    /// Render fully, then send with an ETag. Answers a matching
    /// `If-None-Match` with 304 and no body.
    async fn render_static<B>(
        &self,
        request: &http::Request<B>,
        ctx: &mut RequestContext,
        mut result: Box<dyn StreamResult>,
        sink: &mut dyn ResponseSink,
    ) -> Result<DispatchReport, DispatchError> {
        let kind = Some(result.kind());
        let mut buffer = BufferedResponse::new();
        buffer.send_head(ResponseHead::new(StatusCode::OK)).await?;

        if result.forward(&mut buffer).await? == ForwardOutcome::Aborted {
            tracing::debug!(request_id = %ctx.id, "static render abandoned");
            return Ok(DispatchReport::new(DispatchOutcome::Cancelled, None).with_renderer(kind));
        }
        ctx.mark(MARK_ALL_READY);

        let body = buffer.body();
        let etag = content_etag(&body, &ctx.nonce);
        let not_modified = request
            .headers()
            .get(IF_NONE_MATCH)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| etag_matches(v, &etag));
        let headers = HeaderBatch::for_document(ctx).with_etag(etag).into_header_map()?;

        let (status, outcome) = if not_modified {
            (StatusCode::NOT_MODIFIED, DispatchOutcome::NotModified)
        } else {
            (StatusCode::OK, DispatchOutcome::Rendered)
        };
        sink.send_head(ResponseHead::new(status).with_headers(headers)).await?;
        if !not_modified {
            sink.write(body).await?;
        }
        sink.finish().await?;

        let mut report = DispatchReport::new(outcome, Some(status)).with_renderer(kind);
        report.stream_errors = result.lifecycle().stream_errors;
        Ok(report)
    }

    async fn redirect(
        &self,
        ctx: &RequestContext,
        status: StatusCode,
        location: &str,
        sink: &mut dyn ResponseSink,
    ) -> Result<DispatchReport, DispatchError> {
        tracing::debug!(request_id = %ctx.id, status = status.as_u16(), location = %location, "redirecting");

        let headers = HeaderBatch::for_redirect(ctx, location).into_header_map()?;
        sink.send_head(ResponseHead::new(status).with_headers(headers)).await?;
        sink.finish().await?;

        Ok(DispatchReport::new(DispatchOutcome::Redirected, Some(status)))
    }

    async fn error_page(
        &self,
        ctx: &RequestContext,
        error: RenderError,
        path: &str,
        renderer: Option<RendererKind>,
        sink: &mut dyn ResponseSink,
    ) -> Result<DispatchReport, DispatchError> {
        let document = self.error_pages.render(&error, path);
        match &document.tracking_id {
            Some(tracking_id) => tracing::error!(
                request_id = %ctx.id,
                tracking_id = %tracking_id,
                status = document.status.as_u16(),
                error = %error,
                "request failed"
            ),
            None => tracing::debug!(request_id = %ctx.id, path = %path, "no route matched"),
        }

        let headers = HeaderBatch::for_error_page(ctx).into_header_map()?;
        sink.send_head(ResponseHead::new(document.status).with_headers(headers)).await?;
        sink.write(Bytes::from(document.html)).await?;
        sink.finish().await?;

        let outcome = if document.status == StatusCode::NOT_FOUND {
            DispatchOutcome::NotFound
        } else {
            DispatchOutcome::ErrorPage
        };
        let mut report = DispatchReport::new(outcome, Some(document.status)).with_renderer(renderer);
        report.tracking_id = document.tracking_id;
        report.error = Some(error);
        Ok(report)
    }
}

/// ETag over the document with the request nonce taken out, so the same
/// page hashes the same on every request.
fn content_etag(body: &[u8], nonce: &Nonce) -> String {
    let html = String::from_utf8_lossy(body);
    generate_etag(html.replace(nonce.as_str(), "").as_bytes())
}

impl fmt::Debug for RenderDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderDispatcher")
            .field("app_name", &self.config.app_name)
            .field("renderer", &self.renderer.kind())
            .field("environment", &self.config.environment)
            .finish_non_exhaustive()
    }
}
