use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{delete, get, post};
use clap::Parser;
use tower_http::trace::TraceLayer;

use ctiscan::app::context::Context;
use ctiscan::app::model::NewTarget;
use ctiscan::app::service;
use ctiscan::cli::ConfigOverrides;
use ctiscan::error::Error;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct AppArgs {
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: SocketAddr,

    #[command(flatten)]
    overrides: ConfigOverrides,
}

#[derive(Clone)]
struct AppState {
    ctx: Arc<Context>,
}

type ApiResult<T> = Result<T, (StatusCode, String)>;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    let args = AppArgs::parse();
    let mut config = ctiscan::config::Config::from_env()?;
    args.overrides.apply(&mut config);
    let _guard = ctiscan::logging::init(config.log_dir.as_deref())?;
    tracing::info!(?args, "starting ctiscan-app");

    let ctx = Arc::new(Context::from_config(config)?);
    let cancel = ctx.cancel.clone();
    let state = AppState { ctx };

    let app = Router::new()
        .route("/healthz", get(|| async { "ok\n" }))
        .route("/targets", get(list_targets).post(add_target))
        .route("/targets/:id", delete(delete_target))
        .route("/targets/:id/fetch", post(fetch_target))
        .route("/targets/:id/extract", post(extract_target))
        .route("/targets/:id/scan", post(scan_target))
        .route("/targets/:id/items", get(list_items))
        .route("/targets/:id/items/reset", post(reset_items))
        .route("/targets/:id/summary", get(summary))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .map_err(|err| anyhow::anyhow!("bind {}: {err}", args.addr))?;
    tracing::info!(addr = %args.addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::warn!("interrupt received; shutting down");
            cancel.cancel();
        })
        .await?;
    Ok(())
}

fn api_error(err: Error) -> (StatusCode, String) {
    let status = match &err {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        Error::MissingArtifact { .. } | Error::UnsupportedEngine(_) => StatusCode::CONFLICT,
        Error::PolicyViolation { .. } => StatusCode::FORBIDDEN,
        Error::Fetch(_) | Error::Render(_) => StatusCode::BAD_GATEWAY,
        Error::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        Error::Parse(_) | Error::Store(_) | Error::Artifact(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    if status.is_server_error() {
        tracing::error!(error = %err, "request failed");
    }
    (status, err.to_string())
}

async fn list_targets(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let targets = service::list_targets(&state.ctx).await.map_err(api_error)?;
    Ok(Json(targets))
}

async fn add_target(
    State(state): State<AppState>,
    Json(new): Json<NewTarget>,
) -> ApiResult<impl IntoResponse> {
    let target = service::register_target(&state.ctx, new)
        .await
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(target)))
}

async fn delete_target(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    service::delete_target(&state.ctx, &id)
        .await
        .map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn fetch_target(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let target = service::fetch_target(&state.ctx, &id)
        .await
        .map_err(api_error)?;
    Ok(Json(target))
}

async fn extract_target(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let report = service::extract(&state.ctx, &id).await.map_err(api_error)?;
    Ok(Json(report))
}

async fn scan_target(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let report = service::scan(&state.ctx, &id).await.map_err(api_error)?;
    Ok(Json(report))
}

async fn list_items(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let items = service::list_work_items(&state.ctx, &id)
        .await
        .map_err(api_error)?;
    Ok(Json(items))
}

async fn reset_items(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let reset = service::reset_failed(&state.ctx, &id)
        .await
        .map_err(api_error)?;
    Ok(Json(serde_json::json!({ "reset": reset })))
}

async fn summary(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let summary = service::severity_summary(&state.ctx, &id)
        .await
        .map_err(api_error)?;
    Ok(Json(summary))
}
