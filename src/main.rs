mod auth;
mod config;
mod db;
mod email;
mod error;
mod handlers;
mod models;
mod object_store;
mod rate_limiter;
mod render;
mod security;
mod state;
mod video_core;
mod workers;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::http::{Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::{Router, routing::get};
use config::Config;
use email::{EmailSender, NullEmailSender, SmtpEmailSender};
use object_store::ObjectStore;
use state::AppState;
use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::timeout::TimeoutLayer;
use tracing::{Instrument, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,sendrec=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let config = Arc::new(config);

    let db = db::connect(&config.database_url)
        .await
        .context("connect to database")?;

    let objects = ObjectStore::new(&config.s3, config.max_upload_bytes);
    objects.ensure_bucket().await.context("ensure bucket exists")?;

    let email: Arc<dyn EmailSender> = match &config.smtp {
        Some(smtp) => Arc::new(SmtpEmailSender::new(smtp).context("build smtp transport")?),
        None => Arc::new(NullEmailSender),
    };

    let shutdown = CancellationToken::new();
    let state = AppState::new(db, objects, config.clone(), email, shutdown.clone());

    state.auth_limiter.clone().spawn_sweeper(shutdown.clone());
    state.video_limiter.clone().spawn_sweeper(shutdown.clone());
    state.comment_limiter.clone().spawn_sweeper(shutdown.clone());

    workers::transcription::spawn(state.clone(), shutdown.clone());
    workers::cleanup::spawn(state.clone(), shutdown.clone());
    workers::digest::spawn(state.clone(), shutdown.clone());

    let app = build_router(state.clone());

    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .with_context(|| format!("invalid BIND_ADDR {}", config.bind_addr))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!(%addr, "listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown))
    .await
    .context("server error")?;

    Ok(())
}

fn build_router(state: AppState) -> Router {
    use handlers::{auth as auth_h, health, videos, watch};
    use rate_limiter::gate;

    let auth_routes = Router::new()
        .route("/register", axum::routing::post(auth_h::register))
        .route("/login", axum::routing::post(auth_h::login))
        .route("/refresh", axum::routing::post(auth_h::refresh))
        .route("/logout", axum::routing::post(auth_h::logout))
        .route("/forgot-password", axum::routing::post(auth_h::forgot_password))
        .route("/reset-password", axum::routing::post(auth_h::reset_password))
        .layer(middleware::from_fn_with_state(state.clone(), gate::auth));

    let keys_routes = Router::new()
        .route("/keys", axum::routing::put(auth_h::create_api_key))
        .layer(middleware::from_fn_with_state(state.clone(), auth::middleware::require_auth));

    let video_routes = Router::new()
        .route(
            "/videos",
            axum::routing::post(videos::create_video).get(videos::list_videos),
        )
        .route("/videos/{id}", axum::routing::patch(videos::update_video).delete(videos::delete_video))
        .route("/videos/{id}/extend", axum::routing::post(videos::extend_video))
        .route("/videos/{id}/trim", axum::routing::post(videos::trim_video))
        .route("/videos/{id}/transcript", axum::routing::get(videos::list_transcript))
        .layer(middleware::from_fn_with_state(state.clone(), auth::middleware::require_auth))
        .layer(middleware::from_fn_with_state(state.clone(), gate::video));

    // Viewing/verifying a share link rides the (higher) video-API rate limit;
    // only comment *creation* is gated at the tighter 0.2 rps/burst-3 budget
    // spec.md §4.2 reserves for watch-page comment creation.
    let watch_view_routes = Router::new()
        .route("/watch/{token}", axum::routing::get(watch::watch_json))
        .route("/watch/{token}/verify", axum::routing::post(watch::verify_password))
        .route("/watch/{token}/comments", axum::routing::get(watch::list_comments))
        .layer(middleware::from_fn_with_state(state.clone(), gate::video));

    let comment_create_routes = Router::new()
        .route("/watch/{token}/comments", axum::routing::post(watch::create_comment))
        .layer(middleware::from_fn_with_state(state.clone(), gate::comment));

    let watch_comment_delete_routes = Router::new()
        .route(
            "/watch/{token}/comments/{comment_id}",
            axum::routing::delete(watch::delete_comment),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth::middleware::require_auth));

    let api = Router::new()
        .route("/health", get(health::health))
        .nest("/auth", auth_routes)
        .merge(keys_routes)
        .merge(video_routes)
        .merge(watch_view_routes)
        .merge(comment_create_routes)
        .merge(watch_comment_delete_routes);

    let html_routes = Router::new()
        .route("/watch/{token}", get(watch::watch_page))
        .route("/embed/{token}", get(watch::embed_page));

    let spa_fallback = ServeDir::new("public")
        .append_index_html_on_directories(true)
        .fallback(ServeFile::new("public/index.html"));

    Router::new()
        .nest("/api", api)
        .merge(html_routes)
        .fallback_service(spa_fallback)
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes as usize))
        .layer(middleware::from_fn_with_state(state.clone(), security::security_headers))
        .layer(middleware::from_fn(request_log))
        .layer(TimeoutLayer::new(Duration::from_secs(120)))
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state)
}

/// Structured per-request log, skipping `/api/health` per §4.10.
async fn request_log(req: Request<axum::body::Body>, next: Next) -> Response {
    let path = req.uri().path().to_string();
    if path == "/api/health" {
        return next.run(req).await;
    }
    let method = req.method().clone();
    let span = tracing::info_span!("request", %method, %path);
    async move {
        let started = std::time::Instant::now();
        let response = next.run(req).await;
        tracing::info!(
            status = response.status().as_u16(),
            latency_ms = started.elapsed().as_millis() as u64,
            "handled"
        );
        response
    }
    .instrument(span)
    .await
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(panic = %message, "handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        axum::Json(serde_json::json!({ "error": "internal error" })),
    )
        .into_response()
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received, draining in-flight requests");
    shutdown.cancel();
    tokio::time::sleep(SHUTDOWN_GRACE).await;
}
