//! HTTP surface
//!
//! Thin adapters translating inbound requests into the app's two flows and
//! outbound results into responses. Routes, in match order:
//!
//! - `GET /` — embedded REPL console
//! - `GET /metrics` — Prometheus exposition (when enabled)
//! - `GET <base>/temp/<id>` — stored preview results (full body only)
//! - `POST <base>/repl` — evaluate a statement, answer JSON
//! - `GET <base>/<document>/<feature>` — feature fetch with optional Range
//!
//! The temp route is matched before the document/feature pattern, so a
//! document can never shadow it.

use crate::app::EarshotApp;
use crate::context::TempResult;
use crate::error::{Result, ServeError};
use crate::metrics;
use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

const UI_HTML: &str = include_str!("ui.html");

/// Bind the configured address and serve requests until the process exits
pub async fn run(app: Arc<EarshotApp>) -> Result<()> {
    let addr: SocketAddr = app
        .config()
        .listen_address
        .parse()
        .map_err(|e| ServeError::Config(format!("listen_address: {}", e)))?;
    let listener = TcpListener::bind(addr).await?;
    serve(app, listener).await
}

/// Serve requests on an already-bound listener
pub async fn serve(app: Arc<EarshotApp>, listener: TcpListener) -> Result<()> {
    let addr = listener.local_addr()?;
    info!("earshot listening on http://{}", addr);
    info!("console at http://{}/", addr);

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let app = Arc::clone(&app);

        tokio::task::spawn(async move {
            let service = service_fn(move |req| {
                let app = Arc::clone(&app);
                async move { handle(req, app).await }
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                error!("Error serving connection: {:?}", err);
            }
        });
    }
}

/// Route one request
async fn handle(
    req: Request<Incoming>,
    app: Arc<EarshotApp>,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    app.metrics().record_request();

    let method = req.method().clone();
    let path = req.uri().path().trim_end_matches('/').to_string();
    let base = app.config().base_path.clone();

    if method == Method::GET && path.is_empty() {
        return Ok(ui_response(&app));
    }
    if method == Method::GET && path == "/metrics" && app.config().enable_metrics {
        return Ok(metrics_response(&app));
    }

    let rest = match path.strip_prefix(&base) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => {
            rest.trim_start_matches('/').to_string()
        }
        _ => return Ok(not_found_response()),
    };

    if method == Method::POST && rest == "repl" {
        let body = req.into_body().collect().await?.to_bytes();
        let statement = String::from_utf8_lossy(&body).into_owned();
        return Ok(repl_response(&app, &statement));
    }

    if method == Method::GET {
        if let Some((head, tail)) = rest.split_once('/') {
            // The temp route is matched first so a document named "temp"
            // can never shadow stored previews.
            if head == "temp" {
                return Ok(temp_response(&app, tail));
            }
            let range_header = req
                .headers()
                .get("range")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();
            return Ok(feature_response(app, head.to_string(), tail.to_string(), range_header).await);
        }
    }

    Ok(not_found_response())
}

/// Serve a feature fetch, honoring the optional render deadline
///
/// Rendering and encoding are CPU-bound, so the work runs on a blocking
/// worker; when a deadline is configured, exceeding it fails the request
/// rather than silently blocking the server.
async fn feature_response(
    app: Arc<EarshotApp>,
    document: String,
    feature: String,
    range_header: String,
) -> Response<Full<Bytes>> {
    let deadline = app.config().render_timeout_ms.map(Duration::from_millis);
    let worker = {
        let app = Arc::clone(&app);
        move || app.feature_result(&document, &feature, &range_header)
    };

    let task = tokio::task::spawn_blocking(worker);
    let outcome = match deadline {
        Some(deadline) => match tokio::time::timeout(deadline, task).await {
            Ok(joined) => joined
                .unwrap_or_else(|e| Err(ServeError::Internal(format!("worker panic: {}", e)))),
            Err(_) => Err(ServeError::RenderTimeout(format!("{:?}", deadline))),
        },
        None => task
            .await
            .unwrap_or_else(|e| Err(ServeError::Internal(format!("worker panic: {}", e)))),
    };

    match outcome {
        Ok((result, partial)) => {
            app.metrics().record_bytes_served(result.data.len() as u64);
            let status = if partial {
                StatusCode::PARTIAL_CONTENT
            } else {
                StatusCode::OK
            };
            result_response(status, &result)
        }
        Err(e) => error_response(e),
    }
}

fn temp_response(app: &EarshotApp, id: &str) -> Response<Full<Bytes>> {
    match app.temp_result(id) {
        Some(result) => {
            app.metrics().record_bytes_served(result.data.len() as u64);
            result_response(StatusCode::OK, &result)
        }
        None => not_found_response(),
    }
}

#[derive(Serialize)]
struct ReplBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(rename = "contentType", skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn repl_response(app: &EarshotApp, statement: &str) -> Response<Full<Bytes>> {
    let (status, body) = match app.repl(statement) {
        Ok(outcome) => (
            StatusCode::OK,
            ReplBody {
                result: Some(outcome.result),
                url: outcome.url,
                content_type: outcome.content_type,
                error: None,
            },
        ),
        Err(e) => {
            warn!(error = %e, "repl statement failed");
            (
                StatusCode::BAD_REQUEST,
                ReplBody {
                    result: None,
                    url: None,
                    content_type: None,
                    error: Some(e.to_string()),
                },
            )
        }
    };

    let json = serde_json::to_vec(&body).unwrap_or_else(|_| b"{}".to_vec());
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(json)))
        .unwrap()
}

fn result_response(status: StatusCode, result: &TempResult) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", result.content_type.clone())
        .header("Accept-Ranges", "bytes")
        .body(Full::new(result.data.clone()))
        .unwrap()
}

fn error_response(err: ServeError) -> Response<Full<Bytes>> {
    let status = StatusCode::from_u16(err.to_http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    warn!(error = %err, status = status.as_u16(), "request failed");

    // Range failures answer with an empty body; the connection still closes
    // cleanly.
    let body = if status == StatusCode::RANGE_NOT_SATISFIABLE {
        Bytes::new()
    } else {
        Bytes::from(err.to_string())
    };

    Response::builder()
        .status(status)
        .header("Content-Type", "text/plain; charset=utf-8")
        .body(Full::new(body))
        .unwrap()
}

fn metrics_response(app: &EarshotApp) -> Response<Full<Bytes>> {
    let body = metrics::format_prometheus(&app.metrics().snapshot());
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

fn ui_response(app: &EarshotApp) -> Response<Full<Bytes>> {
    // The console needs to know where the repl route lives.
    let html = UI_HTML.replace("{{BASE_PATH}}", &app.config().base_path);
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/html; charset=utf-8")
        .body(Full::new(Bytes::from(html)))
        .unwrap()
}

fn not_found_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "text/plain")
        .body(Full::new(Bytes::from("404 Not Found")))
        .unwrap()
}
