//! DoH front-end: RFC 8484 framing over HTTPS, GET and POST.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{body::Bytes, Router};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::blocklist::BlocklistProvider;
use crate::dns::pipeline::{NameResolver, Pipeline, RootSnapshot};
use crate::dns::wire;

const CONTENT_TYPE_DNS_MESSAGE: &str = "application/dns-message";

#[derive(Deserialize)]
pub struct DohQuery {
    dns: Option<String>,
}

pub fn router<B, R, N>(pipeline: Arc<Pipeline<B, R, N>>) -> Router
where
    B: BlocklistProvider + 'static,
    R: RootSnapshot + 'static,
    N: NameResolver + 'static,
{
    Router::new()
        .route("/dns-query", get(doh_get::<B, R, N>).post(doh_post::<B, R, N>))
        .route("/health", get(health))
        .route("/", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(pipeline)
}

async fn health() -> &'static str {
    "ok"
}

async fn doh_get<B, R, N>(
    State(pipeline): State<Arc<Pipeline<B, R, N>>>,
    Query(params): Query<DohQuery>,
) -> Response
where
    B: BlocklistProvider,
    R: RootSnapshot,
    N: NameResolver,
{
    let Some(encoded) = params.dns else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let Ok(query_bytes) = URL_SAFE_NO_PAD.decode(encoded.as_bytes()) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    handle_query(&pipeline, &query_bytes).await
}

async fn doh_post<B, R, N>(State(pipeline): State<Arc<Pipeline<B, R, N>>>, body: Bytes) -> Response
where
    B: BlocklistProvider,
    R: RootSnapshot,
    N: NameResolver,
{
    handle_query(&pipeline, &body).await
}

async fn handle_query<B, R, N>(pipeline: &Pipeline<B, R, N>, query_bytes: &[u8]) -> Response
where
    B: BlocklistProvider,
    R: RootSnapshot,
    N: NameResolver,
{
    let message = match wire::parse_query(query_bytes) {
        Ok(m) => m,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };
    let Some(question) = message.question else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    let response_bytes = pipeline.resolve(message.id, question).await;

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, CONTENT_TYPE_DNS_MESSAGE)],
        response_bytes,
    )
        .into_response()
}
