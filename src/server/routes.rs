//! HTTP transport
//!
//! axum routes for `POST /` and `GET /`, delegating to the pipeline.

use std::io;
use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;

use crate::server::pipeline::Pipeline;
use crate::types::request::ContentResponse;

/// Builds the router serving the prompt endpoint and the liveness probe
pub fn router(pipeline: Pipeline) -> Router {
    Router::new()
        .route("/", get(handle_get).post(handle_post))
        .with_state(pipeline)
}

/// Serves `pipeline` on `listener` until the listener fails
pub async fn serve(listener: TcpListener, pipeline: Pipeline) -> io::Result<()> {
    let app = router(pipeline).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app).await
}

async fn handle_post(
    State(pipeline): State<Pipeline>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    body: Bytes,
) -> (StatusCode, Json<ContentResponse>) {
    let (status, response) = pipeline.handle_async(Some(remote), body).await;
    (status, Json(response))
}

async fn handle_get() -> (StatusCode, Json<ContentResponse>) {
    let (status, response) = Pipeline::liveness();
    (status, Json(response))
}
