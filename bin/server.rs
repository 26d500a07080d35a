// RegShield - Web Server
// REST API with Axum over the screening pipeline

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use regshield::{
    ComplianceService, LedgerEntry, LedgerStatus, PolicyThresholds, RiskSignals, ScreeningConfig,
    ScreeningError, ScreeningOutcome, Transaction,
};

/// Reports kept at most; past this the oldest is dropped, fetched or not
const MAX_REPORTS: usize = 1000;

/// STR narratives by transaction ID. A finished report is handed out once and
/// then removed.
#[derive(Clone)]
struct ReportStore {
    slots: Arc<RwLock<ReportSlots>>,
    capacity: usize,
}

#[derive(Default)]
struct ReportSlots {
    /// None while generation is still running
    reports: HashMap<String, Option<String>>,
    order: VecDeque<String>,
}

#[derive(Debug, PartialEq)]
enum ReportState {
    Ready(String),
    Pending,
    Missing,
}

impl ReportStore {
    fn with_capacity(capacity: usize) -> Self {
        ReportStore {
            slots: Arc::new(RwLock::new(ReportSlots::default())),
            capacity,
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, ReportSlots> {
        self.slots.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserve a slot for a report that is being generated
    fn start(&self, transaction_id: &str) {
        let mut slots = self.write();
        if slots.reports.insert(transaction_id.to_string(), None).is_none() {
            slots.order.push_back(transaction_id.to_string());
        }

        while slots.reports.len() > self.capacity {
            let Some(oldest) = slots.order.pop_front() else {
                break;
            };
            slots.reports.remove(&oldest);
            tracing::debug!(transaction_id = %oldest, "report evicted");
        }
    }

    /// A report whose slot was evicted meanwhile is discarded
    fn finish(&self, transaction_id: &str, text: String) {
        if let Some(slot) = self.write().reports.get_mut(transaction_id) {
            *slot = Some(text);
        }
    }

    /// Hand out a finished report and forget it
    fn take(&self, transaction_id: &str) -> ReportState {
        let mut slots = self.write();
        match slots.reports.remove(transaction_id) {
            None => ReportState::Missing,
            Some(None) => {
                slots.reports.insert(transaction_id.to_string(), None);
                ReportState::Pending
            }
            Some(Some(text)) => {
                slots.order.retain(|id| id != transaction_id);
                ReportState::Ready(text)
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.slots.read().unwrap_or_else(PoisonError::into_inner).reports.len()
    }
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    service: Arc<ComplianceService>,
    reports: ReportStore,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

fn error_response(e: ScreeningError) -> Response {
    let status = match &e {
        ScreeningError::GatedAccountBreach { .. } => StatusCode::CONFLICT,
        ScreeningError::InvalidTransaction(_) | ScreeningError::InvalidThreshold(_) => StatusCode::BAD_REQUEST,
        ScreeningError::AccountNotFound(_) => StatusCode::NOT_FOUND,
        ScreeningError::Storage(_) => {
            tracing::error!(error = %e, "storage failure");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    (status, Json(ApiResponse::<()>::fail(e.to_string()))).into_response()
}

fn join_error(e: tokio::task::JoinError) -> Response {
    tracing::error!(error = %e, "blocking task failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::<()>::fail("internal error")),
    )
        .into_response()
}

/// Evaluation response: the outcome plus where to fetch the STR, if one is due
#[derive(Serialize)]
struct EvaluateResponse {
    #[serde(flatten)]
    outcome: ScreeningOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    str_report_url: Option<String>,
}

#[derive(Deserialize)]
struct ShiftThresholdParams {
    new_threshold: f64,
}

#[derive(Deserialize)]
struct WeightedRiskParams {
    account_id: String,
    velocity: f64,
    geo_entropy: f64,
    hops_to_blacklist: u32,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /api/evaluate - Screen one transaction
async fn evaluate(State(state): State<AppState>, Json(tx): Json<Transaction>) -> Response {
    let service = Arc::clone(&state.service);
    let outcome = match tokio::task::spawn_blocking(move || service.screen(tx)).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => return error_response(e),
        Err(e) => return join_error(e),
    };

    let str_report_url = if outcome.evaluation.requires_str() {
        let transaction_id = outcome.transaction.transaction_id.clone();
        state.reports.start(&transaction_id);

        // Narrative is produced after the response is built
        let service = Arc::clone(&state.service);
        let reports = state.reports.clone();
        let pending = outcome.clone();
        tokio::task::spawn_blocking(move || {
            let text = service.narrate(&pending);
            reports.finish(&pending.transaction.transaction_id, text);
        });

        Some(format!("/api/reports/{}", transaction_id))
    } else {
        None
    };

    (
        StatusCode::OK,
        Json(ApiResponse::ok(EvaluateResponse {
            outcome,
            str_report_url,
        })),
    )
        .into_response()
}

/// GET /api/verify_ledger - Replay the hash chain
async fn verify_ledger(State(state): State<AppState>) -> Response {
    let service = Arc::clone(&state.service);
    match tokio::task::spawn_blocking(move || service.verify_ledger()).await {
        Ok(Ok(status)) => {
            let code = if status.is_verified() {
                StatusCode::OK
            } else {
                StatusCode::CONFLICT
            };
            (code, Json(ApiResponse::<LedgerStatus>::ok(status))).into_response()
        }
        Ok(Err(e)) => error_response(e),
        Err(e) => join_error(e),
    }
}

/// GET /api/ledger - All entries in append order
async fn get_ledger(State(state): State<AppState>) -> Response {
    let service = Arc::clone(&state.service);
    match tokio::task::spawn_blocking(move || service.ledger_entries()).await {
        Ok(Ok(entries)) => (StatusCode::OK, Json(ApiResponse::<Vec<LedgerEntry>>::ok(entries))).into_response(),
        Ok(Err(e)) => error_response(e),
        Err(e) => join_error(e),
    }
}

/// POST /api/admin/shift_threshold?new_threshold=
async fn shift_threshold(
    State(state): State<AppState>,
    Query(params): Query<ShiftThresholdParams>,
) -> Response {
    match state.service.shift_threshold(params.new_threshold) {
        Ok(thresholds) => (StatusCode::OK, Json(ApiResponse::<PolicyThresholds>::ok(thresholds))).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /api/admin/apply_weighted_risk?account_id=&velocity=&geo_entropy=&hops_to_blacklist=
async fn apply_weighted_risk(
    State(state): State<AppState>,
    Query(params): Query<WeightedRiskParams>,
) -> Response {
    let signals = RiskSignals::new(params.velocity, params.geo_entropy, params.hops_to_blacklist);
    match state.service.apply_weighted_risk(&params.account_id, signals) {
        Ok(decision) => (StatusCode::OK, Json(ApiResponse::ok(decision))).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/reports/:transaction_id - STR narrative (202 while still generating, 404 once fetched)
async fn get_report(State(state): State<AppState>, Path(transaction_id): Path<String>) -> Response {
    match state.reports.take(&transaction_id) {
        ReportState::Ready(text) => (StatusCode::OK, Json(ApiResponse::ok(text))).into_response(),
        ReportState::Pending => (
            StatusCode::ACCEPTED,
            Json(ApiResponse::<()>::fail("report is being generated")),
        )
            .into_response(),
        ReportState::Missing => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<()>::fail(format!("No STR for transaction {}", transaction_id))),
        )
            .into_response(),
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ScreeningConfig::load()?;
    let (service, _) = ComplianceService::from_config(&config, true)?;
    tracing::info!(
        db = %config.database_path.display(),
        history = service.history().len(),
        accounts = service.accounts().count(),
        "compliance service ready"
    );

    let state = AppState {
        service: Arc::new(service),
        reports: ReportStore::with_capacity(MAX_REPORTS),
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/evaluate", post(evaluate))
        .route("/verify_ledger", get(verify_ledger))
        .route("/ledger", get(get_ledger))
        .route("/admin/shift_threshold", post(shift_threshold))
        .route("/admin/apply_weighted_risk", post(apply_weighted_risk))
        .route("/reports/:transaction_id", get(get_report))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.server_addr).await?;
    tracing::info!(addr = %config.server_addr, "server listening");

    axum::serve(listener, app).await?;
    Ok(())
}
