use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub struct ProxyState {
    http: reqwest::Client,
    upstream_url: String,
}

impl ProxyState {
    pub fn new(upstream_url: String) -> Self {
        ProxyState {
            http: reqwest::Client::new(),
            upstream_url,
        }
    }
}

pub fn app_router(state: Arc<ProxyState>) -> Router {
    Router::new()
        .route("/api/vaults", get(proxy_vaults))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn proxy_vaults(State(state): State<Arc<ProxyState>>) -> impl IntoResponse {
    match fetch_upstream(&state).await {
        Ok(body) => (StatusCode::OK, Json(body)),
        Err(e) => {
            error!("Error fetching vault data: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to fetch vault data" })),
            )
        }
    }
}

/// The upstream body is forwarded untouched, `null` and all.
async fn fetch_upstream(state: &ProxyState) -> anyhow::Result<Value> {
    let response = state.http.get(&state.upstream_url).send().await?;

    if !response.status().is_success() {
        anyhow::bail!("API responded with status: {}", response.status().as_u16());
    }

    Ok(response.json().await?)
}

pub async fn serve(listen_addr: &str, state: Arc<ProxyState>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app_router(state)).await?;
    Ok(())
}
