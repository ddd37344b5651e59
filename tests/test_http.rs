//! End-to-end HTTP tests driving a bound server

use earshot::{
    server, AudioWindow, EarshotApp, FeatureSet, FeatureSpec, MemoryFeatureStore, NdArray, Scope,
    ScriptValue, ServeConfig,
};
use std::sync::Arc;
use tokio::net::TcpListener;

async fn start_server() -> String {
    let store = MemoryFeatureStore::new();

    let samples: Vec<f32> = (0..8000).map(|i| (i as f32 * 0.05).sin() * 0.4).collect();
    store
        .insert_audio("demo", "audio", AudioWindow::mono(samples, 8000))
        .unwrap();
    store.insert_series(
        "demo",
        "loudness",
        NdArray::vector((0..8).map(|i| i as f64).collect()),
        1_000_000_000_000,
    );
    store.insert_packed("demo", "meta", b"0123456789".to_vec());

    let features: FeatureSet = [
        FeatureSpec::audio("audio"),
        FeatureSpec::series("loudness", 1),
        FeatureSpec::packed_json("meta"),
    ]
    .into_iter()
    .collect();

    let mut scope = Scope::new();
    scope.bind("doc", ScriptValue::Document("demo".to_string()));

    let app = Arc::new(
        EarshotApp::new(
            Arc::new(ServeConfig::default()),
            Arc::new(store),
            features,
            "loudness",
            "audio",
            scope,
        )
        .unwrap(),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server::serve(app, listener));

    format!("http://{}", addr)
}

#[tokio::test]
async fn test_feature_fetch_full() {
    let base = start_server().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/earshot/demo/meta", base))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers().get("Content-Type").unwrap(),
        "application/json"
    );
    assert_eq!(response.headers().get("Accept-Ranges").unwrap(), "bytes");
    assert_eq!(response.bytes().await.unwrap().as_ref(), b"0123456789");
}

#[tokio::test]
async fn test_feature_fetch_byte_range_is_206() {
    let base = start_server().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/earshot/demo/meta", base))
        .header("Range", "bytes=2-6")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 206);
    assert_eq!(response.bytes().await.unwrap().as_ref(), b"2345");
}

#[tokio::test]
async fn test_feature_fetch_time_range_renders_image() {
    let base = start_server().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/earshot/demo/loudness", base))
        .header("Range", "seconds=1-5")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers().get("Content-Type").unwrap(), "image/png");
    let body = response.bytes().await.unwrap();
    assert_eq!(&body[..4], &[0x89, b'P', b'N', b'G']);
}

#[tokio::test]
async fn test_audio_time_range_is_partial_flac() {
    let base = start_server().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/earshot/demo/audio", base))
        .header("Range", "seconds=0.25-0.75")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 206);
    assert_eq!(
        response.headers().get("Content-Type").unwrap(),
        "audio/flac"
    );
    let body = response.bytes().await.unwrap();
    assert_eq!(&body[..4], b"fLaC");
}

#[tokio::test]
async fn test_unsupported_unit_is_416_with_empty_body() {
    let base = start_server().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/earshot/demo/meta", base))
        .header("Range", "pages=1-2")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 416);
    assert!(response.bytes().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_document_is_404() {
    let base = start_server().await;
    let response = reqwest::get(format!("{}/earshot/nope/meta", base))
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_temp_miss_is_404() {
    let base = start_server().await;
    let response = reqwest::get(format!("{}/earshot/temp/no-such-id", base))
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_repl_round_trip_through_temp_store() {
    let base = start_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/earshot/repl", base))
        .body("doc.loudness")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: serde_json::Value =
        serde_json::from_slice(&response.bytes().await.unwrap()).unwrap();
    assert!(body["result"].is_string());
    assert_eq!(body["contentType"], "image/png");
    let url = body["url"].as_str().expect("preview URL expected");

    // The synthesized URL must be fetchable as a full-body response.
    let preview = client.get(format!("{}{}", base, url)).send().await.unwrap();
    assert_eq!(preview.status(), 200);
    assert_eq!(
        preview.headers().get("Content-Type").unwrap(),
        "image/png"
    );
}

#[tokio::test]
async fn test_repl_arithmetic_has_no_url_field() {
    let base = start_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/earshot/repl", base))
        .body("1 + 1")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: serde_json::Value =
        serde_json::from_slice(&response.bytes().await.unwrap()).unwrap();
    assert_eq!(body["result"], "2");
    assert!(body.get("url").is_none());
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn test_repl_error_is_400() {
    let base = start_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/earshot/repl", base))
        .body("no_such_name + 1")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let body: serde_json::Value =
        serde_json::from_slice(&response.bytes().await.unwrap()).unwrap();
    assert!(body["error"].is_string());
    assert!(body.get("result").is_none());
}

#[tokio::test]
async fn test_console_page_is_served() {
    let base = start_server().await;
    let response = reqwest::get(format!("{}/", base)).await.unwrap();
    assert_eq!(response.status(), 200);
    let body = response.text().await.unwrap();
    assert!(body.contains("earshot console"));
    // The repl route is injected for the configured base path.
    assert!(body.contains("/earshot/repl"));
}
