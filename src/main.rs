use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use menurec::services::training::{RefreshOutcome, TrainingStatus};
use menurec::{init_tracing, AppState, Config, EngineError, PreferenceUpdate, RankOutcome, RecommendationResponse, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

#[derive(Debug, Serialize, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    message: String,
}

impl<T> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: "Success".to_string(),
        }
    }

    fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: message.into(),
        }
    }

    fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message,
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, (StatusCode, Json<ApiResponse<T>>)>;

fn error_response<T>(e: EngineError) -> (StatusCode, Json<ApiResponse<T>>) {
    let status = match &e {
        EngineError::InvalidPreference(_) => StatusCode::BAD_REQUEST,
        EngineError::DataUnavailable(_) | EngineError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!("Request failed: {}", e);
    }
    (status, Json(ApiResponse::error(e.to_string())))
}

fn outcome_response(user_id: UserId, outcome: RankOutcome) -> ApiResult<RecommendationResponse> {
    match outcome {
        RankOutcome::Ranked(items) => Ok(Json(ApiResponse::success(RecommendationResponse::new(user_id, items)))),
        RankOutcome::Empty => Ok(Json(ApiResponse::with_message(
            RecommendationResponse::new(user_id, Vec::new()),
            "No recommendations available",
        ))),
        RankOutcome::Unavailable(reason) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::error(reason)),
        )),
    }
}

async fn health_check() -> Json<ApiResponse<HashMap<String, String>>> {
    let mut status = HashMap::new();
    status.insert("status".to_string(), "healthy".to_string());
    status.insert("service".to_string(), "menurec".to_string());
    status.insert("version".to_string(), env!("CARGO_PKG_VERSION").to_string());

    Json(ApiResponse::success(status))
}

async fn generate_recommendations(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> ApiResult<RecommendationResponse> {
    let outcome = state
        .recommendation_service
        .generate_and_store(user_id)
        .await
        .map_err(error_response)?;
    outcome_response(user_id, outcome)
}

async fn get_recommendations(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> ApiResult<RecommendationResponse> {
    if !state.snapshots.current().is_trained() {
        return outcome_response(user_id, RankOutcome::Unavailable("models are still training".to_string()));
    }
    let response = state
        .recommendation_service
        .get_or_generate(user_id)
        .await
        .map_err(error_response)?;
    Ok(Json(ApiResponse::success(response)))
}

async fn update_preferences(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Json(updates): Json<Vec<PreferenceUpdate>>,
) -> ApiResult<RecommendationResponse> {
    let service = &state.recommendation_service;

    match service.on_preferences_changed(user_id, updates).await {
        Ok(outcome) => info!("Preferences of user {} live in snapshot {}", user_id, outcome.version()),
        Err(e @ EngineError::InvalidPreference(_)) => return Err(error_response(e)),
        // preferences are stored; the next successful retrain picks them up
        Err(e) => warn!("Retrain after preference update failed: {}", e),
    }

    let outcome = service.generate_and_store(user_id).await.map_err(error_response)?;
    outcome_response(user_id, outcome)
}

async fn refresh_models(State(state): State<AppState>) -> ApiResult<RefreshOutcome> {
    let outcome = state
        .training_service
        .refresh_models()
        .await
        .map_err(error_response)?;
    Ok(Json(ApiResponse::success(outcome)))
}

async fn model_status(State(state): State<AppState>) -> Json<ApiResponse<TrainingStatus>> {
    Json(ApiResponse::success(state.training_service.status()))
}

async fn serving_stats(State(state): State<AppState>) -> Json<ApiResponse<HashMap<String, u64>>> {
    Json(ApiResponse::success(state.recommendation_service.serving_stats()))
}

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/generate_recommendations/:user_id", post(generate_recommendations))
        .route("/api/recommendations/:user_id", get(get_recommendations))
        .route("/api/preferences/:user_id", post(update_preferences))
        .route("/api/models/refresh", post(refresh_models))
        .route("/api/models/status", get(model_status))
        .route("/api/stats", get(serving_stats))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let config_path = std::env::var("MENUREC_CONFIG").unwrap_or_else(|_| "config/default.toml".to_string());
    let config = Config::load_or_default(&config_path)?;
    info!("Starting menurec server with config: {:?}", config.server);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.workers.max(1))
        .enable_all()
        .build()?;
    runtime.block_on(serve(config))
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let state = AppState::new(config.clone()).await?;

    // serve immediately; requests before the first snapshot get 503
    let training = state.training_service.clone();
    tokio::spawn(async move {
        match training.refresh_models().await {
            Ok(outcome) => info!("Initial model snapshot ready: version {}", outcome.version()),
            Err(e) => error!("Initial model build failed: {}", e),
        }
        training.start_retrain_worker();
    });

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(config.server.socket_addr()).await?;
    info!("Server listening on {}", config.server.socket_addr());

    axum::serve(listener, app).await?;

    Ok(())
}
