use axum::Router;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use nest_dashboard::server::{ProxyState, app_router};
use serde_json::{Value, json};
use std::sync::Arc;

async fn spawn_app(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// Stands up a canned upstream and a proxy pointed at it, returning the
/// proxy's base URL.
async fn spawn_proxy(upstream_status: StatusCode, upstream_body: Value) -> String {
    let upstream = Router::new().route(
        "/api/vaults",
        get(move || {
            let body = upstream_body.clone();
            async move { (upstream_status, axum::Json(body)).into_response() }
        }),
    );
    let upstream_url = format!("{}/api/vaults", spawn_app(upstream).await);

    let state = Arc::new(ProxyState::new(upstream_url));
    spawn_app(app_router(state)).await
}

fn vault_fixture() -> Value {
    json!([
        {
            "vaultStatus": "active",
            "slug": "nest-alpha-vault",
            "name": "Nest Alpha Vault",
            "tvl": 1000000,
            "formattedTvl": "$1,000,000",
            "apy": 0.15,
            "price": 1.05,
            "featuredAssets": [],
            "plume": { "contractAddress": "0x1111111111111111111111111111111111111111" },
            "unexpectedField": { "nested": true }
        },
        {
            "vaultStatus": "active",
            "slug": "nest-treasury-vault",
            "name": "Nest Treasury Vault",
            "price": 0.98,
            "plume": { "contractAddress": "0x2222222222222222222222222222222222222222" }
        }
    ])
}

#[tokio::test]
async fn upstream_failure_maps_to_500_with_error_body() {
    let base = spawn_proxy(StatusCode::INTERNAL_SERVER_ERROR, json!({"boom": true})).await;

    let response = reqwest::get(format!("{base}/api/vaults")).await.unwrap();

    assert_eq!(response.status().as_u16(), 500);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "error": "Failed to fetch vault data" }));
}

#[tokio::test]
async fn empty_array_passes_through() {
    let base = spawn_proxy(StatusCode::OK, json!([])).await;

    let response = reqwest::get(format!("{base}/api/vaults")).await.unwrap();

    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn null_body_passes_through() {
    let base = spawn_proxy(StatusCode::OK, Value::Null).await;

    let response = reqwest::get(format!("{base}/api/vaults")).await.unwrap();

    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, Value::Null);
}

#[tokio::test]
async fn payload_passes_through_verbatim() {
    let base = spawn_proxy(StatusCode::OK, vault_fixture()).await;

    let response = reqwest::get(format!("{base}/api/vaults")).await.unwrap();

    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, vault_fixture());
}

#[tokio::test]
async fn unreachable_upstream_maps_to_500() {
    // Bind and drop so nothing is listening on the port.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let state = Arc::new(ProxyState::new(format!("http://{addr}/api/vaults")));
    let base = spawn_app(app_router(state)).await;

    let response = reqwest::get(format!("{base}/api/vaults")).await.unwrap();

    assert_eq!(response.status().as_u16(), 500);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "error": "Failed to fetch vault data" }));
}
