//! The route pages and the JSON API the editor saves to.
use anyhow::Context;
use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{error, info};

mod handlers;
pub mod store;

use store::{RouteStore, StoreError};

pub fn router(store: Arc<RouteStore>) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/route/{id}", get(handlers::route_page))
        .route("/api/route", post(handlers::create_route))
        .route(
            "/api/route/{id}",
            get(handlers::get_route)
                .put(handlers::save_route)
                .post(handlers::save_route),
        )
        .route("/api/route/{id}/add_stop", post(handlers::add_stop))
        .route("/api/route/{id}/delete_stop", post(handlers::delete_stop))
        .with_state(store)
}

#[tracing::instrument(err, skip(store))]
pub async fn serve(bind_addr: SocketAddr, store: Arc<RouteStore>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Couldn't bind {bind_addr}"))?;

    info!("listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(store))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("server stopped");

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutting down"),
        Err(e) => {
            error!("couldn't listen for ctrl-c {e}");
            std::future::pending::<()>().await;
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("not found")]
    NotFound,

    #[error("{0}")]
    BadRequest(&'static str),

    #[error("storage error")]
    Store(#[source] StoreError),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => ApiError::NotFound,
            StoreError::BadIndex { .. } => ApiError::BadRequest("bad index"),
            other => ApiError::Store(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(e) => {
                error!("store failure {e:?}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
