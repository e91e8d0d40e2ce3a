//! HTTP server exposing the tracker.
//!
//! Page routes answer with the JSON documents a front end would render.
//! Form posts answer with a 303 redirect on success.

use axum::{
    Json, Router,
    extract::{
        Form, Path as AxumPath, State,
        rejection::{FormRejection, JsonRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

use crate::analytics::AnalyticsReport;
use crate::clock::Clock;
use crate::commands::{
    self, AnalyticsOverview, ChallengeDetail, ChallengeList, parse_bounty_lenient,
    parse_optional_f64, parse_optional_i64, parse_required_i64,
};
use crate::models::{NewVulnerability, Severity, VulnerabilityUpdate};
use crate::storage::Storage;
use crate::{Error, Result};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Store handle; every operation holds the lock for its whole duration
    pub storage: Arc<Mutex<Storage>>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(storage: Storage, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage: Arc::new(Mutex::new(storage)),
            clock,
        }
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/challenges", post(create_challenge))
        .route("/challenges/:id", get(show_challenge))
        .route("/challenges/:id/delete", post(delete_challenge))
        .route("/vulnerabilities", post(add_vulnerability))
        .route("/vulnerabilities/:id", post(edit_vulnerability))
        .route("/vulnerabilities/:id/delete", post(delete_vulnerability))
        .route("/activity", post(record_activity))
        .route("/analytics", get(analytics_overview))
        .route("/analytics/:id", get(challenge_analytics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server and run until Ctrl+C.
pub async fn start_server(
    storage: Storage,
    clock: Arc<dyn Clock>,
    host: &str,
    port: u16,
) -> Result<()> {
    let host_addr: std::net::IpAddr = host
        .parse()
        .map_err(|e| Error::Config(format!("Invalid host address '{}': {}", host, e)))?;
    let addr = SocketAddr::from((host_addr, port));

    let app = router(AppState::new(storage, clock));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Bounty tracker listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
    }
}

// === Errors ===

/// An error rendered as `{"error": message}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(detail: impl std::fmt::Display) -> Self {
        tracing::error!("Request failed: {}", detail);
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Internal server error".to_string(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Validation(message) => Self::bad_request(message),
            Error::NotFound(message) => Self {
                status: StatusCode::NOT_FOUND,
                message,
            },
            other => Self::internal(other),
        }
    }
}

impl From<FormRejection> for ApiError {
    fn from(rejection: FormRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Run a store operation on the blocking pool.
///
/// SQLite calls and the time-service request both block, so neither runs on
/// the async workers.
async fn with_store<T, F>(state: &AppState, op: F) -> ApiResult<T>
where
    F: FnOnce(&mut Storage, &dyn Clock) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let storage = state.storage.clone();
    let clock = state.clock.clone();
    tokio::task::spawn_blocking(move || {
        let mut storage = storage.blocking_lock();
        op(&mut storage, clock.as_ref())
    })
    .await
    .map_err(ApiError::internal)?
    .map_err(ApiError::from)
}

// === Pages ===

async fn index(State(state): State<AppState>) -> ApiResult<Json<ChallengeList>> {
    let list = with_store(&state, |storage, _| commands::challenge_list(storage)).await?;
    Ok(Json(list))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "git_commit": crate::GIT_COMMIT,
    }))
}

async fn show_challenge(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<i64>,
) -> ApiResult<Json<ChallengeDetail>> {
    let detail =
        with_store(&state, move |storage, clock| commands::challenge_show(storage, clock, id))
            .await?;
    Ok(Json(detail))
}

async fn analytics_overview(State(state): State<AppState>) -> ApiResult<Json<AnalyticsOverview>> {
    let overview = with_store(&state, |storage, _| commands::analytics_overview(storage)).await?;
    Ok(Json(overview))
}

async fn challenge_analytics(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<i64>,
) -> ApiResult<Json<AnalyticsReport>> {
    let report = with_store(&state, move |storage, _| commands::analytics_for(storage, id)).await?;
    Ok(Json(report))
}

// === Forms ===

#[derive(Debug, Deserialize)]
struct ChallengeForm {
    days: Option<String>,
    target_money: Option<String>,
    target_vulns: Option<String>,
}

async fn create_challenge(
    State(state): State<AppState>,
    form: std::result::Result<Form<ChallengeForm>, FormRejection>,
) -> ApiResult<Redirect> {
    let Form(form) = form?;
    let days = parse_required_i64("Number of days", form.days.as_deref())?;
    let target_money = parse_optional_f64("target_money", form.target_money.as_deref())?;
    let target_vulns = parse_optional_i64("target_vulns", form.target_vulns.as_deref())?;

    let challenge = with_store(&state, move |storage, clock| {
        commands::challenge_create(storage, clock, days, target_money, target_vulns)
    })
    .await?;
    Ok(Redirect::to(&format!("/challenges/{}", challenge.id)))
}

async fn delete_challenge(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<i64>,
) -> ApiResult<Redirect> {
    with_store(&state, move |storage, _| commands::challenge_delete(storage, id)).await?;
    Ok(Redirect::to("/"))
}

#[derive(Debug, Deserialize)]
struct VulnerabilityForm {
    challenge_id: Option<String>,
    title: Option<String>,
    severity: Option<String>,
    company: Option<String>,
    bounty: Option<String>,
    description: Option<String>,
}

/// Parse a severity field; empty means absent.
fn parse_severity(raw: Option<&str>) -> ApiResult<Option<Severity>> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<Severity>().map_err(ApiError::bad_request))
        .transpose()
}

async fn add_vulnerability(
    State(state): State<AppState>,
    form: std::result::Result<Form<VulnerabilityForm>, FormRejection>,
) -> ApiResult<Redirect> {
    let Form(form) = form?;
    let new = NewVulnerability {
        challenge_id: parse_required_i64("challenge_id", form.challenge_id.as_deref())?,
        title: form.title.unwrap_or_default(),
        severity: parse_severity(form.severity.as_deref())?,
        company: form.company,
        bounty: Some(parse_bounty_lenient(form.bounty.as_deref())),
        description: form.description,
    };

    let vuln = with_store(&state, move |storage, clock| commands::vuln_add(storage, clock, new))
        .await?;
    Ok(Redirect::to(&format!("/challenges/{}", vuln.challenge_id)))
}

async fn edit_vulnerability(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<i64>,
    form: std::result::Result<Form<VulnerabilityForm>, FormRejection>,
) -> ApiResult<Redirect> {
    let Form(form) = form?;
    let update = VulnerabilityUpdate {
        title: form.title,
        severity: parse_severity(form.severity.as_deref())?,
        company: form.company,
        bounty: parse_optional_f64("bounty", form.bounty.as_deref())?,
        description: form.description,
    };

    let vuln = with_store(&state, move |storage, clock| {
        commands::vuln_edit(storage, clock, id, update)
    })
    .await?;
    Ok(Redirect::to(&format!("/challenges/{}", vuln.challenge_id)))
}

async fn delete_vulnerability(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<i64>,
) -> ApiResult<Redirect> {
    let deleted = with_store(&state, move |storage, _| commands::vuln_delete(storage, id)).await?;
    Ok(Redirect::to(&format!("/challenges/{}", deleted.challenge_id)))
}

// === Activity ===

/// Challenge id from a heartbeat body. Accepts a number or a numeric string.
fn activity_challenge_id(body: &Value) -> Option<i64> {
    match body.get("challenge_id")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

async fn record_activity(
    State(state): State<AppState>,
    body: std::result::Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(body) = body?;
    let challenge_id = activity_challenge_id(&body);

    let beat = with_store(&state, move |storage, clock| {
        commands::heartbeat(storage, clock, challenge_id)
    })
    .await?;
    Ok(Json(json!({
        "success": true,
        "total_minutes": beat.total_minutes,
    })))
}
