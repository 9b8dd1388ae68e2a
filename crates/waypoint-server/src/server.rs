//! `WaypointServer` — the proxy's axum HTTP surface.
//!
//! One router mounts the wire-format routes from the route table, the MCP
//! passthrough route, and the ambient `/health`, `/ready`, `/metrics`
//! endpoints. Every proxied route funnels through [`forward_core`]: the
//! guard pipeline in [`crate::pipeline`], then [`waypoint_forwarder::Forwarder::forward`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::CompressionLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tracing::{info, instrument, warn};

use waypoint_auth::AuthState;
use waypoint_circuitbreaker::{Breaker, FuseTracker};
use waypoint_core::errors::ErrorKind;
use waypoint_core::{CostLimits, ProviderId, ProviderType, RequestId as WaypointRequestId, Session, WireFormat};
use waypoint_forwarder::{ForwardError, ForwardRequest, Forwarder};
use waypoint_ratelimit::limiter::{RateLimitLease, RateLimiter};
use waypoint_redis::RedisClient;
use waypoint_selector::endpoint_resolver::PathPolicy;
use waypoint_session::fingerprint::{CodexCompleter, FingerprintInputs, IdSources};
use waypoint_session::tracker::SessionTracker;
use waypoint_settings::{LogFormat as SettingsLogFormat, WaypointSettings, WriteMode};
use waypoint_storage::{
    AsyncWriter, EndpointRepository, KeyRepository, MessageRequestRecord, MessageRequestWriter, Pool,
    ProviderRepository, SyncWriter,
};

use crate::catalog::RepositoryProviderContext;
use crate::cost::{extract_usage, CostCalculator, TableCostCalculator, Usage};
use crate::dispatch::ReqwestDispatcher;
use crate::health::{self, LivenessResponse};
use crate::metrics;
use crate::pipeline;
use crate::shutdown::ShutdownCoordinator;

/// Generates UUIDv7 request ids for `x-request-id`.
#[derive(Clone)]
struct UuidV7RequestId;

impl MakeRequestId for UuidV7RequestId {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = uuid::Uuid::now_v7().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

type AppForwarder = Forwarder<ReqwestDispatcher, RepositoryProviderContext>;

/// Shared state reachable from every handler.
#[derive(Clone)]
pub struct AppState {
    directory: Arc<KeyRepository>,
    providers: Arc<ProviderRepository>,
    db_pool: Pool,
    redis: RedisClient,
    rate_limiter: Arc<RateLimiter>,
    session_tracker: Arc<SessionTracker>,
    codex_completer: Arc<CodexCompleter>,
    forwarder: Arc<AppForwarder>,
    cost_calculator: Arc<dyn CostCalculator>,
    message_writer: Arc<dyn MessageRequestWriter>,
    settings: Arc<WaypointSettings>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics_handle: Arc<metrics_exporter_prometheus::PrometheusHandle>,
    start_time: Instant,
}

/// The proxy's HTTP server: route wiring and the component graph every
/// handler is built from.
pub struct WaypointServer {
    settings: Arc<WaypointSettings>,
    state: AppState,
}

impl WaypointServer {
    /// Wire together every guard-pipeline and forwarder component from a
    /// loaded settings file, a database pool, and a connected Redis client.
    #[must_use]
    pub fn new(settings: WaypointSettings, db_pool: Pool, redis: RedisClient) -> Self {
        let settings = Arc::new(settings);
        let providers = Arc::new(ProviderRepository::new(db_pool.clone()));
        let endpoints = EndpointRepository::new(db_pool.clone());
        let directory = Arc::new(KeyRepository::new(db_pool.clone()));

        let provider_breaker = Breaker::for_providers(redis.clone());
        let endpoint_breaker = Breaker::for_endpoints(redis.clone());
        let fuse = FuseTracker::new(redis.clone());
        let context = RepositoryProviderContext::new(ProviderRepository::new(db_pool.clone()), endpoints);
        let dispatcher = ReqwestDispatcher::new(reqwest::Client::new());
        let forwarder = Arc::new(Forwarder::new(provider_breaker, endpoint_breaker, fuse, dispatcher, context));

        let rate_limiter = Arc::new(RateLimiter::new(redis.clone()));
        let session_tracker = Arc::new(SessionTracker::new(redis.clone()));
        let codex_completer = Arc::new(CodexCompleter::new(redis.clone()));

        let message_writer: Arc<dyn MessageRequestWriter> = match settings.message_request.write_mode {
            WriteMode::Sync => Arc::new(SyncWriter::new(db_pool.clone())),
            WriteMode::Async => AsyncWriter::spawn(
                db_pool.clone(),
                settings.message_request.async_batch_size,
                settings.message_request.async_flush_interval_ms,
                settings.message_request.async_max_pending,
            ),
        };

        let metrics_handle = Arc::new(metrics::install_recorder());

        let state = AppState {
            directory,
            providers,
            db_pool,
            redis,
            rate_limiter,
            session_tracker,
            codex_completer,
            forwarder,
            cost_calculator: Arc::new(TableCostCalculator::default()),
            message_writer,
            settings: settings.clone(),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            metrics_handle,
            start_time: Instant::now(),
        };

        Self { settings, state }
    }

    #[must_use]
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Build the router: the §6 wire-format routes, MCP passthrough, and
    /// `/health`, `/ready`, `/metrics`.
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .route("/v1/messages", post(claude_messages_handler))
            .route("/v1/messages/count_tokens", post(claude_count_tokens_handler))
            .route("/v1/chat/completions", post(openai_chat_handler))
            .route("/v1/responses", post(codex_responses_handler))
            .route("/v1/responses/compact", post(codex_responses_compact_handler))
            .route("/v1beta/models/{*rest}", post(gemini_handler))
            .route("/v1/publishers/google/models/{*rest}", post(gemini_handler))
            .route("/v1internal/models/{*rest}", post(gemini_handler))
            .route("/v1/models", get(list_models_handler))
            .route("/mcp/{provider_id}/{*rest}", post(mcp_handler))
            .route("/health", get(liveness_handler))
            .route("/ready", get(readiness_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(self.state.clone())
            // Outermost layers execute first on request, last on response.
            .layer(CatchPanicLayer::new())
            .layer(CompressionLayer::new())
            .layer(RequestBodyLimitLayer::new(10 * 1024 * 1024))
            .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(120)))
            .layer(SetRequestIdLayer::x_request_id(UuidV7RequestId))
            .layer(PropagateRequestIdLayer::x_request_id())
    }

    /// Bind and serve. Returns the bound address and a join handle driving
    /// the listener loop, which exits once the shutdown coordinator's token
    /// is cancelled.
    #[instrument(skip_all, fields(host = %self.settings.server.host, port = self.settings.server.port))]
    pub async fn listen(&self) -> Result<(SocketAddr, tokio::task::JoinHandle<()>), std::io::Error> {
        let addr = format!("{}:{}", self.settings.server.host, self.settings.server.port);
        let listener = TcpListener::bind(&addr).await?;
        let bound_addr = listener.local_addr()?;
        info!(addr = %bound_addr, "waypoint server listening");

        let router = self.router();
        let shutdown_token = self.state.shutdown.token();

        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    shutdown_token.cancelled().await;
                    info!("server shutdown initiated");
                })
                .await;
            info!("server shutdown complete");
        });

        Ok((bound_addr, handle))
    }
}

/// Map `WaypointSettings`'s log format onto `waypoint-logging`'s.
#[must_use]
pub fn log_format(settings: &WaypointSettings) -> waypoint_logging::LogFormat {
    match settings.server.log_format {
        SettingsLogFormat::Pretty => waypoint_logging::LogFormat::Pretty,
        SettingsLogFormat::Json => waypoint_logging::LogFormat::Json,
    }
}

async fn claude_messages_handler(state: State<AppState>, headers: HeaderMap, uri: Uri, body: Bytes) -> Response {
    forward_core(state, headers, uri, body, WireFormat::Claude, PathPolicy::Strict, None).await
}

async fn claude_count_tokens_handler(state: State<AppState>, headers: HeaderMap, uri: Uri, body: Bytes) -> Response {
    forward_core(state, headers, uri, body, WireFormat::Claude, PathPolicy::Strict, None).await
}

async fn openai_chat_handler(state: State<AppState>, headers: HeaderMap, uri: Uri, body: Bytes) -> Response {
    forward_core(state, headers, uri, body, WireFormat::Openai, PathPolicy::Strict, None).await
}

async fn codex_responses_handler(state: State<AppState>, headers: HeaderMap, uri: Uri, body: Bytes) -> Response {
    forward_core(state, headers, uri, body, WireFormat::Codex, PathPolicy::Strict, None).await
}

async fn codex_responses_compact_handler(state: State<AppState>, headers: HeaderMap, uri: Uri, body: Bytes) -> Response {
    forward_core(state, headers, uri, body, WireFormat::Codex, PathPolicy::Strict, None).await
}

/// `{model}:{action}` is Gemini/Vertex's REST shape: the model lives in the
/// path, not the body, so it's split out here and threaded through as an
/// override rather than read from `body.model` like the other wire formats.
async fn gemini_handler(state: State<AppState>, headers: HeaderMap, Path(rest): Path<String>, uri: Uri, body: Bytes) -> Response {
    let (model, action) = rest.split_once(':').unwrap_or((rest.as_str(), ""));
    let model_override = ModelOverride {
        model: model.to_string(),
        streaming: action.contains("stream"),
    };
    forward_core(state, headers, uri, body, WireFormat::Gemini, PathPolicy::Strict, Some(model_override)).await
}

/// Path-derived request shape for wire formats (Gemini) that don't carry
/// the model name in the JSON body.
struct ModelOverride {
    model: String,
    streaming: bool,
}

fn header_lookup(headers: &HeaderMap) -> impl Fn(&str) -> Option<String> + '_ {
    move |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
}

fn extract_model(body: &serde_json::Value) -> String {
    body.get("model").and_then(serde_json::Value::as_str).unwrap_or_default().to_string()
}

fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').next().unwrap_or(v).trim().to_string())
}

fn effective_limits(auth: &AuthState) -> CostLimits {
    if auth.key.limits.total_usd > 0.0 || auth.key.limits.monthly_usd > 0.0 || auth.key.limits.daily_usd > 0.0 {
        auth.key.limits.clone()
    } else {
        auth.user.limits.clone()
    }
}

fn billed_model(requested_model: &str, provider: Option<&waypoint_core::Provider>, settings: &WaypointSettings) -> String {
    use waypoint_settings::BillingModelSource;
    match (settings.system.billing_model_source, provider) {
        (BillingModelSource::Redirected, Some(provider)) => provider
            .model_redirects
            .get(requested_model)
            .cloned()
            .unwrap_or_else(|| requested_model.to_string()),
        _ => requested_model.to_string(),
    }
}

/// The shared guard-pipeline-then-forward path every standard wire-format
/// route runs.
async fn forward_core(
    State(state): State<AppState>,
    mut headers: HeaderMap,
    uri: Uri,
    body: Bytes,
    wire_format: WireFormat,
    path_policy: PathPolicy,
    model_override: Option<ModelOverride>,
) -> Response {
    let path = uri.path().to_string();

    let auth = match pipeline::authenticate_stage(&*state.directory, header_lookup(&headers)).await {
        Ok(auth) => auth,
        Err(response) => {
            metrics::increment_counter(metrics::GUARD_REJECTIONS_TOTAL, "stage", "auth".to_string());
            return response;
        }
    };

    let mut body_json: serde_json::Value = serde_json::from_slice(&body).unwrap_or_default();

    if wire_format == WireFormat::Claude
        && state.settings.system.intercept_anthropic_warmup_requests
        && pipeline::is_anthropic_warmup_request(&path, &body)
    {
        let requested_model = extract_model(&body_json);
        let trace_id = uuid::Uuid::now_v7().to_string();
        return Json(pipeline::warmup_response_body(Some(&requested_model), &trace_id)).into_response();
    }

    let requested_model = model_override.as_ref().map_or_else(|| extract_model(&body_json), |o| o.model.clone());
    let streaming_override = model_override.as_ref().map(|o| o.streaming);

    let effective_groups = pipeline::effective_groups(&auth.key, &auth.user);
    let client_ip_value = client_ip(&headers);

    let mut candidate_session_id = headers
        .get("session_id")
        .or_else(|| headers.get("x-session-id"))
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if wire_format == WireFormat::Codex && state.settings.system.enable_codex_session_id_completion {
        let body_session_id = candidate_session_id.clone().or_else(|| pipeline::extract_codex_body_session_id(&body_json));
        let sources = IdSources {
            header_session_id: candidate_session_id.as_deref(),
            body_session_id: body_session_id.as_deref(),
        };
        let system_and_user_text = body_json.to_string();
        let user_agent = headers.get("user-agent").and_then(|v| v.to_str().ok()).unwrap_or_default();
        let inputs = FingerprintInputs {
            key_id: auth.key.id.as_str(),
            ip: client_ip_value.as_deref().unwrap_or_default(),
            user_agent,
            system_and_user_text: &system_and_user_text,
        };
        let completion = pipeline::complete_codex_session(&state.codex_completer, &sources, &inputs).await;
        if completion.mirror_to_header {
            if let Ok(value) = HeaderValue::from_str(&completion.session_id) {
                headers.insert("session_id", value.clone());
                headers.insert("x-session-id", value);
            }
        }
        if completion.mirror_to_body {
            pipeline::mirror_codex_session_id(&mut body_json, &completion.session_id);
        }
        candidate_session_id = Some(completion.session_id);
    }

    let session =
        pipeline::assign_session_stage(&state.session_tracker, auth.key.id.as_str(), auth.user.id.as_str(), candidate_session_id.as_deref()).await;

    let reserve_usd = pipeline::reserve_estimate(&effective_limits(&auth), state.settings.system.quota_lease_fraction);
    let lease = match pipeline::rate_limit_stage(&state.rate_limiter, &auth.key, &auth.user, session.id.as_str(), reserve_usd).await {
        Ok(lease) => lease,
        Err(response) => {
            metrics::increment_counter(metrics::GUARD_REJECTIONS_TOTAL, "stage", "rate_limit".to_string());
            return response;
        }
    };

    let is_probe = pipeline::is_count_tokens_probe(&path);
    if !is_probe {
        state.session_tracker.increment_concurrent(session.id.as_str()).await;
    }

    let outbound_body = Bytes::from(body_json.to_string());
    let streaming = streaming_override.unwrap_or_else(|| body_json.get("stream").and_then(serde_json::Value::as_bool).unwrap_or(false));

    let forward_request = ForwardRequest {
        wire_format,
        requested_model: requested_model.clone(),
        effective_groups,
        sticky_provider: session.sticky_provider.clone(),
        client_headers: headers,
        client_ip: client_ip_value,
        body: outbound_body,
        streaming,
        path: path.clone(),
        path_policy,
    };

    let catalog = match state.providers.list_selectable() {
        Ok(catalog) => catalog,
        Err(err) => {
            warn!(%err, "failed to load provider catalog");
            finish_request(&state, &session, is_probe).await;
            return pipeline::error_response(ErrorKind::Internal, "provider catalog unavailable");
        }
    };

    let cancel = state.shutdown.token();
    let mut rng = StdRng::from_os_rng();
    let outcome = state.forwarder.forward(&forward_request, &catalog, &cancel, &mut rng).await;

    finish_request(&state, &session, is_probe).await;

    match outcome {
        Ok(success) => {
            let served_provider = success.chain.last().and_then(|item| catalog.iter().find(|p| p.id == item.provider_id));
            let usage = extract_usage(wire_format, &success.body);
            let cost_multiplier = served_provider.map_or(1.0, |p| p.cost_multiplier);
            let cost = state.cost_calculator.cost(&requested_model, usage, cost_multiplier);

            record_reconciliation(&state.redis, lease, cost).await;
            record_message(
                &state,
                &auth,
                success.chain.last().map(|i| i.provider_id.clone()),
                &billed_model(&requested_model, served_provider, &state.settings),
                cost,
                usage,
                Some(success.status),
            )
            .await;

            let mut response = Response::builder().status(success.status);
            for (name, value) in &success.headers {
                response = response.header(name, value);
            }
            response
                .body(axum::body::Body::from(success.body))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        Err(err) => {
            record_reconciliation(&state.redis, lease, 0.0).await;
            record_message(&state, &auth, None, &requested_model, 0.0, Usage::default(), Some(err.status_code())).await;
            forward_error_response(err)
        }
    }
}

async fn finish_request(state: &AppState, session: &Session, is_probe: bool) {
    if !is_probe {
        state.session_tracker.decrement_concurrent(session.id.as_str()).await;
    }
    state
        .rate_limiter
        .release_concurrency(session.key_id.as_str(), session.user_id.as_str(), session.id.as_str())
        .await;
}

async fn record_reconciliation(redis: &RedisClient, lease: RateLimitLease, actual_cost_usd: f64) {
    if let Err(err) = lease.reconcile(redis, actual_cost_usd).await {
        warn!(%err, "failed to reconcile rate limit lease");
    }
}

async fn record_message(
    state: &AppState,
    auth: &AuthState,
    provider_id: Option<ProviderId>,
    model: &str,
    cost_usd: f64,
    usage: Usage,
    status_code: Option<u16>,
) {
    let record = MessageRequestRecord {
        request_id: WaypointRequestId::new(),
        key_id: auth.key.id.clone(),
        user_id: auth.user.id.clone(),
        provider_id,
        model: model.to_string(),
        status_code,
        cost_usd,
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
        created_at: chrono::Utc::now(),
    };
    if let Err(err) = state.message_writer.enqueue(record).await {
        warn!(%err, "failed to enqueue message request record");
    }
}

fn forward_error_response(err: ForwardError) -> Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = Json(serde_json::json!({
        "error": {
            "category": format!("{:?}", err.category()),
            "message": err.to_string(),
        }
    }));
    (status, body).into_response()
}

async fn list_models_handler(State(state): State<AppState>) -> Response {
    let catalog = state.providers.list_selectable().unwrap_or_default();
    let mut models: Vec<String> = catalog.into_iter().flat_map(|p| p.allowed_models).collect();
    models.sort();
    models.dedup();
    let data: Vec<_> = models.into_iter().map(|id| serde_json::json!({ "id": id, "object": "model" })).collect();
    Json(serde_json::json!({ "object": "list", "data": data })).into_response()
}

/// Passthrough for `/mcp/{provider_id}/...`: a single named provider, full
/// guard pipeline, but a single-provider catalog and `provider.url`-lenient
/// endpoint resolution instead of ranking across the whole catalog — MCP's
/// session-oriented protocol does not tolerate mid-stream provider retries.
async fn mcp_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((provider_id, rest)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let auth = match pipeline::authenticate_stage(&*state.directory, header_lookup(&headers)).await {
        Ok(auth) => auth,
        Err(response) => return response,
    };

    let provider = match state.providers.find_by_id(&ProviderId::from(provider_id)) {
        Ok(provider) => provider,
        Err(_) => return pipeline::error_response(ErrorKind::NoProviderAvailable, "unknown MCP provider"),
    };

    let effective_groups = pipeline::effective_groups(&auth.key, &auth.user);
    if !effective_groups.is_empty() && !effective_groups.contains(&provider.group_tag) {
        return pipeline::error_response(ErrorKind::PermissionDenied, "provider group not permitted");
    }

    let wire_format = default_wire_format(provider.provider_type);
    let _session = pipeline::assign_session_stage(&state.session_tracker, auth.key.id.as_str(), auth.user.id.as_str(), None).await;

    let forward_request = ForwardRequest {
        wire_format,
        requested_model: String::new(),
        effective_groups,
        sticky_provider: Some(provider.id.clone()),
        client_headers: headers,
        client_ip: None,
        body,
        streaming: false,
        path: format!("/mcp/{rest}"),
        path_policy: PathPolicy::Lenient,
    };

    let cancel = state.shutdown.token();
    let mut rng = StdRng::from_os_rng();
    let catalog = vec![provider];
    match state.forwarder.forward(&forward_request, &catalog, &cancel, &mut rng).await {
        Ok(success) => {
            let mut response = Response::builder().status(success.status);
            for (name, value) in &success.headers {
                response = response.header(name, value);
            }
            response
                .body(axum::body::Body::from(success.body))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        Err(err) => forward_error_response(err),
    }
}

fn default_wire_format(provider_type: ProviderType) -> WireFormat {
    match provider_type {
        ProviderType::Claude | ProviderType::ClaudeAuth => WireFormat::Claude,
        ProviderType::Codex => WireFormat::Codex,
        ProviderType::OpenaiCompatible => WireFormat::Openai,
        ProviderType::Gemini | ProviderType::GeminiCli => WireFormat::Gemini,
    }
}

async fn liveness_handler(State(state): State<AppState>) -> Json<LivenessResponse> {
    Json(health::liveness(state.start_time))
}

async fn readiness_handler(State(state): State<AppState>) -> Response {
    let response = health::readiness(&state.db_pool, &state.redis).await;
    let status = if response.is_ready() { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(response)).into_response()
}

async fn metrics_handler(State(state): State<AppState>) -> String {
    metrics::render(&state.metrics_handle)
}
