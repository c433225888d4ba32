//! Axum JSON API for the labor-market dashboard.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use jobdash_core::{Page, ReportQuery, Row};
use jobdash_report::{DashboardSummary, GeoTop, ReportError};
use jobdash_storage::{ping, QueryExecutor};
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, info_span};

pub const CRATE_NAME: &str = "jobdash-web";

#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<dyn QueryExecutor>,
}

impl AppState {
    pub fn new(executor: impl QueryExecutor + 'static) -> Self {
        Self {
            executor: Arc::new(executor),
        }
    }

    fn executor(&self) -> &dyn QueryExecutor {
        self.executor.as_ref()
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 3000,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind: std::env::var("JOBDASH_BIND")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.bind),
            port: std::env::var("JOBDASH_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
        }
    }
}

/// Query string of the request as a [`ReportQuery`]. Never rejects: pairs are
/// decoded one at a time, a bad percent escape stays literal and only its own
/// filter fails to parse.
#[derive(Debug, Clone)]
pub struct ReportParams(pub ReportQuery);

impl<S> FromRequestParts<S> for ReportParams
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let query_string = parts.uri.query().unwrap_or("");
        let pairs = form_urlencoded::parse(query_string.as_bytes())
            .filter(|(key, _)| !key.is_empty())
            .map(|(key, value)| (key.into_owned(), value.into_owned()));
        Ok(ReportParams(ReportQuery::from_pairs(pairs)))
    }
}

/// `{error}` response. Capability gaps are the client's to fix (400); store
/// failures are ours (500).
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn report(endpoint: &'static str, err: ReportError) -> Self {
        let status = match err {
            ReportError::CapabilityUnavailable(_) => StatusCode::BAD_REQUEST,
            ReportError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        error!(endpoint, status = %status, error = %err, "report_failed");
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn respond<T: Serialize>(endpoint: &'static str, result: Result<T, ReportError>) -> ApiResult<T> {
    result.map(Json).map_err(|err| ApiError::report(endpoint, err))
}

pub fn app(state: AppState) -> Router {
    let trace_layer = TraceLayer::new_for_http().make_span_with(|request: &axum::extract::Request| {
        let uri = request.uri().to_string();
        info_span!("http_request", method = ?request.method(), uri)
    });

    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/geographies", get(geographies_handler))
        .route("/provinces", get(provinces_handler))
        .route("/districts", get(districts_handler))
        .route("/jobs", get(jobs_handler))
        .route("/dashboard/summary", get(summary_handler))
        .route("/dashboard/overview", get(overview_handler))
        .route("/dashboard/market", get(market_handler))
        .route("/dashboard/wage-distribution", get(wage_distribution_handler))
        .route("/dashboard/geo/provinces", get(geo_provinces_handler))
        .route("/dashboard/geo/area", get(geo_area_handler))
        .route("/dashboard/geo/top", get(geo_top_handler))
        .route("/dashboard/gov/status", get(gov_status_handler))
        .route("/dashboard/gov/lco", get(gov_lco_handler))
        .route("/dashboard/behavior/demographics", get(demographics_handler))
        .route("/dashboard/behavior/apps-per-user", get(apps_per_user_handler))
        .route("/dashboard/hire-rate/gender", get(hire_rate_gender_handler))
        .route("/dashboard/gender-ratio/job-type", get(gender_ratio_handler))
        .route("/stats/global-summary", get(global_summary_handler))
        .layer(trace_layer)
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

pub async fn serve(config: &ServerConfig, state: AppState) -> anyhow::Result<()> {
    let listener = TcpListener::bind((config.bind.as_str(), config.port)).await?;
    info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn healthz_handler(State(state): State<Arc<AppState>>) -> Response {
    match ping(state.executor()).await {
        Ok(()) => Json(json!({ "status": "ok" })).into_response(),
        Err(err) => {
            error!(endpoint = "/healthz", error = %err, "health_check_failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": err.to_string() })),
            )
                .into_response()
        }
    }
}

async fn geographies_handler(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Row>> {
    respond("/geographies", jobdash_report::geographies(state.executor()).await)
}

async fn provinces_handler(
    State(state): State<Arc<AppState>>,
    ReportParams(query): ReportParams,
) -> ApiResult<Vec<Row>> {
    respond("/provinces", jobdash_report::provinces(state.executor(), &query).await)
}

async fn districts_handler(
    State(state): State<Arc<AppState>>,
    ReportParams(query): ReportParams,
) -> ApiResult<Vec<Row>> {
    respond("/districts", jobdash_report::districts(state.executor(), &query).await)
}

async fn jobs_handler(
    State(state): State<Arc<AppState>>,
    ReportParams(query): ReportParams,
) -> ApiResult<Page<Row>> {
    respond("/jobs", jobdash_report::jobs(state.executor(), &query).await)
}

async fn summary_handler(
    State(state): State<Arc<AppState>>,
    ReportParams(query): ReportParams,
) -> ApiResult<DashboardSummary> {
    respond(
        "/dashboard/summary",
        jobdash_report::dashboard_summary(state.executor(), &query).await,
    )
}

async fn overview_handler(
    State(state): State<Arc<AppState>>,
    ReportParams(query): ReportParams,
) -> ApiResult<Row> {
    respond("/dashboard/overview", jobdash_report::overview(state.executor(), &query).await)
}

async fn market_handler(
    State(state): State<Arc<AppState>>,
    ReportParams(query): ReportParams,
) -> ApiResult<Vec<Row>> {
    respond("/dashboard/market", jobdash_report::market(state.executor(), &query).await)
}

async fn wage_distribution_handler(
    State(state): State<Arc<AppState>>,
    ReportParams(query): ReportParams,
) -> ApiResult<Vec<Row>> {
    respond(
        "/dashboard/wage-distribution",
        jobdash_report::wage_distribution(state.executor(), &query).await,
    )
}

async fn geo_provinces_handler(
    State(state): State<Arc<AppState>>,
    ReportParams(query): ReportParams,
) -> ApiResult<Vec<Row>> {
    respond(
        "/dashboard/geo/provinces",
        jobdash_report::geo_provinces(state.executor(), &query).await,
    )
}

async fn geo_area_handler(
    State(state): State<Arc<AppState>>,
    ReportParams(query): ReportParams,
) -> ApiResult<Page<Row>> {
    respond("/dashboard/geo/area", jobdash_report::geo_area(state.executor(), &query).await)
}

async fn geo_top_handler(
    State(state): State<Arc<AppState>>,
    ReportParams(query): ReportParams,
) -> ApiResult<GeoTop> {
    respond("/dashboard/geo/top", jobdash_report::geo_top(state.executor(), &query).await)
}

async fn gov_status_handler(
    State(state): State<Arc<AppState>>,
    ReportParams(query): ReportParams,
) -> ApiResult<Vec<Row>> {
    respond("/dashboard/gov/status", jobdash_report::gov_status(state.executor(), &query).await)
}

async fn gov_lco_handler(
    State(state): State<Arc<AppState>>,
    ReportParams(query): ReportParams,
) -> ApiResult<Page<Row>> {
    respond("/dashboard/gov/lco", jobdash_report::gov_lco(state.executor(), &query).await)
}

async fn demographics_handler(
    State(state): State<Arc<AppState>>,
    ReportParams(query): ReportParams,
) -> ApiResult<Vec<Row>> {
    respond(
        "/dashboard/behavior/demographics",
        jobdash_report::demographics(state.executor(), &query).await,
    )
}

async fn apps_per_user_handler(
    State(state): State<Arc<AppState>>,
    ReportParams(query): ReportParams,
) -> ApiResult<Vec<Row>> {
    respond(
        "/dashboard/behavior/apps-per-user",
        jobdash_report::apps_per_user(state.executor(), &query).await,
    )
}

async fn hire_rate_gender_handler(
    State(state): State<Arc<AppState>>,
    ReportParams(query): ReportParams,
) -> ApiResult<Vec<Row>> {
    respond(
        "/dashboard/hire-rate/gender",
        jobdash_report::hire_rate_by_gender(state.executor(), &query).await,
    )
}

async fn gender_ratio_handler(
    State(state): State<Arc<AppState>>,
    ReportParams(query): ReportParams,
) -> ApiResult<Vec<Row>> {
    respond(
        "/dashboard/gender-ratio/job-type",
        jobdash_report::gender_ratio_by_job_type(state.executor(), &query).await,
    )
}

async fn global_summary_handler(State(state): State<Arc<AppState>>) -> ApiResult<Row> {
    respond(
        "/stats/global-summary",
        jobdash_report::global_summary(state.executor()).await,
    )
}
