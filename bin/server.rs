// Financial Dashboard - Web Server
// REST API with Axum over the shared SQLite store

use axum::{
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use log::{error, info, warn};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use findash::api::{
    self, HealthResponse, NetWorthResponse, PortfolioValueResponse, ProjectionQuery,
    ProjectionResponse, RecentTransaction, RefreshResponse, SummaryResponse, DEFAULT_RECENT_LIMIT,
};
use findash::db;
use findash::import::{import_kind, ImportKind, ImportReport};
use findash::metrics::{BudgetStatus, CashFlow};
use findash::prices::SimulatedPriceSource;
use findash::{open_database, AllocationRules, AppConfig, EngineError, ImportError};

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    config: Arc<AppConfig>,
    rules: Arc<AllocationRules>,
}

impl AppState {
    fn new(conn: Connection, config: AppConfig, rules: AllocationRules) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            config: Arc::new(config),
            rules: Arc::new(rules),
        }
    }

    fn conn(&self) -> ApiResult<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| ApiError::Internal("database lock poisoned".to_string()))
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Error, Debug)]
enum ApiError {
    #[error("{0}")]
    Engine(#[from] EngineError),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Internal(String),
    #[error("{0:#}")]
    Anyhow(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    code: u16,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Engine(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Anyhow(e) => {
                if e.downcast_ref::<ImportError>().is_some() || e.downcast_ref::<csv::Error>().is_some() {
                    StatusCode::BAD_REQUEST
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            }
        };
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        let body = Json(ErrorBody {
            code: status.as_u16(),
            message: self.to_string(),
        });
        (status, body).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// Query parameters
// ============================================================================

#[derive(Deserialize)]
struct CashFlowParams {
    days: Option<i64>,
}

#[derive(Deserialize)]
struct BudgetParams {
    month: Option<String>,
}

#[derive(Deserialize)]
struct LimitParams {
    limit: Option<usize>,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /health - Health check
async fn health_check() -> Json<HealthResponse> {
    Json(api::health())
}

/// GET /api/net-worth
async fn get_net_worth(State(state): State<AppState>) -> ApiResult<Json<NetWorthResponse>> {
    let conn = state.conn()?;
    Ok(Json(api::get_net_worth(&conn)?))
}

/// GET /api/portfolio/value
async fn get_portfolio_value(State(state): State<AppState>) -> ApiResult<Json<PortfolioValueResponse>> {
    let conn = state.conn()?;
    Ok(Json(api::get_portfolio_value(&conn)?))
}

/// GET /api/cash-flow?days=
async fn get_cash_flow(
    State(state): State<AppState>,
    Query(params): Query<CashFlowParams>,
) -> ApiResult<Json<CashFlow>> {
    let days = params.days.unwrap_or(state.config.cash_flow_days);
    let conn = state.conn()?;
    Ok(Json(api::get_cash_flow(&conn, days)?))
}

/// GET /api/asset-allocation
async fn get_asset_allocation(State(state): State<AppState>) -> ApiResult<Json<BTreeMap<String, f64>>> {
    let conn = state.conn()?;
    Ok(Json(api::get_asset_allocation(&conn, &state.rules)?))
}

/// GET /api/budget?month=
async fn get_budget(
    State(state): State<AppState>,
    Query(params): Query<BudgetParams>,
) -> ApiResult<Json<Vec<BudgetStatus>>> {
    let conn = state.conn()?;
    Ok(Json(api::get_budget_status(&conn, params.month.as_deref())?))
}

/// GET /api/monte-carlo - the lock is released before simulating
async fn monte_carlo(
    State(state): State<AppState>,
    Query(query): Query<ProjectionQuery>,
) -> ApiResult<Json<ProjectionResponse>> {
    let params = {
        let conn = state.conn()?;
        api::projection_params(&conn, &query, state.config.projection_defaults())?
    };

    let result = tokio::task::spawn_blocking(move || api::run_projection(&params, query.seed))
        .await
        .map_err(|e| ApiError::Internal(format!("projection task failed: {}", e)))??;

    Ok(Json(result))
}

/// GET /api/transactions?limit=
async fn get_transactions(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> ApiResult<Json<Vec<RecentTransaction>>> {
    let limit = params.limit.unwrap_or(DEFAULT_RECENT_LIMIT);
    let conn = state.conn()?;
    Ok(Json(api::get_recent_transactions(&conn, limit)?))
}

/// DELETE /api/transactions/:id
async fn delete_transaction(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let conn = state.conn()?;
    if db::delete_transaction(&conn, id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Transaction {} not found", id)))
    }
}

/// GET /api/summary
async fn get_summary(State(state): State<AppState>) -> ApiResult<Json<SummaryResponse>> {
    let conn = state.conn()?;
    Ok(Json(api::get_summary(&conn, state.config.cash_flow_days)?))
}

/// POST /api/upload/:kind - body is the CSV text
async fn upload_csv(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    body: String,
) -> ApiResult<Json<ImportReport>> {
    let kind: ImportKind = kind.parse().map_err(ApiError::BadRequest)?;
    let conn = state.conn()?;
    let report = import_kind(&conn, kind, body.as_bytes())?;
    if report.total_errors > 0 {
        warn!("Upload of {} finished with {} row errors", kind, report.total_errors);
    }
    Ok(Json(report))
}

/// POST /api/portfolio/refresh-prices
async fn refresh_prices(State(state): State<AppState>) -> ApiResult<Json<RefreshResponse>> {
    let mut source = SimulatedPriceSource::new(ChaCha8Rng::from_entropy());
    let conn = state.conn()?;
    Ok(Json(api::refresh_portfolio_prices(&conn, &mut source)?))
}

// ============================================================================
// Router
// ============================================================================

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/net-worth", get(get_net_worth))
        .route("/portfolio/value", get(get_portfolio_value))
        .route("/portfolio/refresh-prices", post(refresh_prices))
        .route("/cash-flow", get(get_cash_flow))
        .route("/asset-allocation", get(get_asset_allocation))
        .route("/budget", get(get_budget))
        .route("/monte-carlo", get(monte_carlo))
        .route("/transactions", get(get_transactions))
        .route("/transactions/:id", delete(delete_transaction))
        .route("/summary", get(get_summary))
        .route("/upload/:kind", post(upload_csv));

    let cors = cors_layer(&state.config.allowed_origins);

    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .nest("/api", api_routes)
        .layer(ServiceBuilder::new().layer(cors))
        .with_state(state)
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::from_env();
    info!("🌐 {} - Web Server", config.app_name);

    let conn = open_database(&config.db_path)?;
    let rules = config.allocation_rules()?;
    let addr = config.listen_addr();

    let app = build_router(AppState::new(conn, config, rules));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🚀 Server running on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use tower::ServiceExt;

    const ACCOUNTS_CSV: &str = "name,account_type,balance
Chase Checking,checking,5000
Chase Sapphire Credit,credit,1000
";

    const INVESTMENTS_CSV: &str = "symbol,shares,purchase_price,current_price,purchase_date
SPY,10,380,400,2024-01-15
BOND,20,50,50,2024-01-15
";

    fn test_app() -> Router {
        let conn = Connection::open_in_memory().unwrap();
        db::setup_database(&conn).unwrap();
        build_router(AppState::new(conn, AppConfig::default(), AllocationRules::default()))
    }

    async fn send(app: &Router, method: Method, uri: &str, body: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app();

        let (status, body) = send(&app, Method::GET, "/health", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let (status, _) = send(&app, Method::GET, "/", "").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_upload_then_metrics() {
        let app = test_app();

        let (status, report) = send(&app, Method::POST, "/api/upload/accounts", ACCOUNTS_CSV).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["added_count"], 2);

        let (status, _) = send(&app, Method::POST, "/api/upload/investments", INVESTMENTS_CSV).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(&app, Method::GET, "/api/net-worth", "").await;
        assert_eq!(body["net_worth"], 9000.0);

        let (_, body) = send(&app, Method::GET, "/api/portfolio/value", "").await;
        assert_eq!(body["portfolio_value"], 5000.0);

        let (_, body) = send(&app, Method::GET, "/api/asset-allocation", "").await;
        assert_eq!(body["Stocks"], 80.0);
        assert_eq!(body["Bonds"], 20.0);
    }

    #[tokio::test]
    async fn test_upload_rejects_bad_file_and_kind() {
        let app = test_app();

        let (status, body) = send(&app, Method::POST, "/api/upload/accounts", "name,balance\nX,1\n").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 400);
        assert!(body["message"].as_str().unwrap().contains("account_type"));

        let (status, _) = send(&app, Method::POST, "/api/upload/stocks", ACCOUNTS_CSV).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_monte_carlo_seeded_and_validated() {
        let app = test_app();
        send(&app, Method::POST, "/api/upload/investments", INVESTMENTS_CSV).await;

        let uri = "/api/monte-carlo?years=5&trials=200&seed=42";
        let (status, first) = send(&app, Method::GET, uri, "").await;
        let (_, second) = send(&app, Method::GET, uri, "").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(first, second);
        assert_eq!(first["current_value"], 5000.0);
        assert_eq!(first["trials"], 200);

        let (status, body) = send(&app, Method::GET, "/api/monte-carlo?trials=0", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("trials"));

        let (status, body) = send(&app, Method::GET, "/api/monte-carlo?trials=2147483647", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 400);
        assert!(body["message"].as_str().unwrap().contains("cannot exceed"));

        let (status, _) = send(&app, Method::GET, "/api/monte-carlo?years=2147483647&trials=1", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_transactions_list_and_delete() {
        let app = test_app();
        let csv = "date,amount,description,category,account_name
2025-09-20,1500.00,Salary Deposit,Income,Chase Checking
2025-09-19,-85.50,Grocery Store,Food,Chase Checking
";
        send(&app, Method::POST, "/api/upload/transactions", csv).await;

        let (_, list) = send(&app, Method::GET, "/api/transactions?limit=1", "").await;
        let items = list.as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["description"], "Salary Deposit");
        assert_eq!(items[0]["account"], "Chase Checking");

        let id = items[0]["id"].as_i64().unwrap();
        let (status, _) = send(&app, Method::DELETE, &format!("/api/transactions/{}", id), "").await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = send(&app, Method::DELETE, &format!("/api/transactions/{}", id), "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], 404);
    }

    #[tokio::test]
    async fn test_budget_month_validation() {
        let app = test_app();
        let csv = "category,month,monthly_limit,spent\nFood,2025-09,800,900\n";
        send(&app, Method::POST, "/api/upload/budgets", csv).await;

        let (status, body) = send(&app, Method::GET, "/api/budget?month=2025-09", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["remaining"], -100.0);

        let (status, _) = send(&app, Method::GET, "/api/budget?month=Sept", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_refresh_prices_updates_value() {
        let app = test_app();
        send(&app, Method::POST, "/api/upload/investments", INVESTMENTS_CSV).await;

        let (status, body) = send(&app, Method::POST, "/api/portfolio/refresh-prices", "").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["updated"], 2);
        let (_, value) = send(&app, Method::GET, "/api/portfolio/value", "").await;
        assert_eq!(value["portfolio_value"], body["portfolio_value"]);
    }

    #[tokio::test]
    async fn test_summary_shape() {
        let app = test_app();
        send(&app, Method::POST, "/api/upload/accounts", ACCOUNTS_CSV).await;

        let (status, body) = send(&app, Method::GET, "/api/summary", "").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["net_worth"], 4000.0);
        assert_eq!(body["total_transactions"], 0);
        assert!(body["last_updated"].is_string());
    }
}
