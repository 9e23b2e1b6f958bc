use std::net::SocketAddr;

use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::error;

use crate::{
    auth, contacts,
    error::{AppError, AppResult},
    state::AppState,
    users,
};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest(
            "/api",
            Router::new()
                .merge(auth::router())
                .merge(contacts::router())
                .merge(users::router())
                .route("/healthchecker", get(healthchecker)),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!(
                        "http_request",
                        %method,
                        uri = %uri,
                        status = tracing::field::Empty
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis();
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

/// Round-trips the database so a broken pool shows up as 500.
async fn healthchecker(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let (one,): (i32,) = sqlx::query_as("SELECT 1")
        .fetch_one(&state.db)
        .await
        .map_err(|e| {
            error!(error = %e, "health check query failed");
            AppError::Internal(anyhow::anyhow!("Error connecting to the database"))
        })?;
    if one != 1 {
        return Err(AppError::Internal(anyhow::anyhow!(
            "Database is not configured correctly"
        )));
    }
    Ok(Json(json!({ "message": "Contactbook is up" })))
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
