//! HTTP surface: router, middleware, and the request dispatcher.
//!
//! Every request flows through one dispatcher; method routing happens there
//! so that unsupported methods fall out as 404 rather than 405. A middleware
//! layer stamps the `Server` header and logs method/path/status/latency.

use crate::{App, fetch, multipart, upload};
use axum::Router;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::Response;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;
use zimg_store::Rendition;

const SERVER_NAME: &str = "zimg/1.0.0 (Unix)";

const NOT_FOUND_PAGE: &str = "<html><body><h1>404 Not Found!</h1></body></html>";

const DEFAULT_WELCOME_PAGE: &str =
    "<html>\n<body>\n<h1>\nWelcome To zimg World!</h1>\n</body>\n</html>\n";

const EASTER_EGG_PAGE: &str = "<html>\n <head>\n  <title>Love is Eternal</title>\n </head>\n \
     <body>\n  <h1>Single1024</h1>\nSince 2008-12-22, there left no room in my heart for another \
     one.</br>\n</body>\n</html>\n";

pub fn router(app: Arc<App>) -> Router {
    Router::new()
        .fallback(dispatch)
        .layer(middleware::from_fn(log_requests))
        .with_state(app)
}

/// Stamp the Server header and log the request at a status-tiered level.
async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let mut response = next.run(request).await;

    response
        .headers_mut()
        .insert(header::SERVER, HeaderValue::from_static(SERVER_NAME));

    let status = response.status().as_u16();
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    if status >= 500 {
        tracing::error!("{} {} -> {} in {:.1}ms", method, path, status, latency_ms);
    } else if status >= 400 {
        tracing::warn!("{} {} -> {} in {:.1}ms", method, path, status, latency_ms);
    } else {
        tracing::debug!("{} {} -> {} in {:.1}ms", method, path, status, latency_ms);
    }

    response
}

async fn dispatch(State(app): State<Arc<App>>, request: Request) -> Response {
    let method = request.method().clone();
    if method == Method::POST {
        upload_handler(app, request).await
    } else if method == Method::GET {
        get_handler(app, request).await
    } else {
        not_found()
    }
}

// ============================================================================
// GET: welcome page, favicon, easter egg, and the fetch pipeline
// ============================================================================

async fn get_handler(app: Arc<App>, request: Request) -> Response {
    let uri = request.uri().clone();
    let path = uri.path();

    if path == "/" {
        return welcome_page(&app);
    }
    if path.contains("favicon.ico") {
        return html(StatusCode::OK, "");
    }
    // Path traversal guard, ahead of any lookup.
    if uri.to_string().contains("..") {
        tracing::warn!(%uri, "rejecting dotdot request");
        return not_found();
    }

    let fp = path.trim_start_matches('/');
    if !zimg_store::is_fingerprint(fp) {
        tracing::debug!(%path, "not a fingerprint request");
        return not_found();
    }

    let query = RenditionQuery::parse(uri.query());
    if query.w.as_deref() == Some("g") && query.h.as_deref() == Some("w") {
        return html(StatusCode::OK, EASTER_EGG_PAGE);
    }
    let rendition = query.rendition();

    let outcome = {
        let app = app.clone();
        let fp = fp.to_owned();
        tokio::task::spawn_blocking(move || fetch::fetch_image(&app, &fp, rendition)).await
    };

    match outcome {
        Ok(Ok(outcome)) => {
            if let Some(path) = outcome.write_back {
                materialize(outcome.bytes.clone(), path);
            }
            image_response(outcome.bytes)
        }
        Ok(Err(e)) => {
            tracing::warn!(%fp, error = %e, "fetch failed");
            not_found()
        }
        Err(e) => {
            tracing::error!(error = %e, "fetch task failed");
            not_found()
        }
    }
}

/// Write a rendered rendition to disk off the request path. Losing the
/// write lock means a peer is materializing the same bytes.
fn materialize(blob: Bytes, path: camino::Utf8PathBuf) {
    tokio::task::spawn_blocking(move || {
        if let Some(dir) = path.parent()
            && let Err(e) = zimg_store::ensure_dir(dir)
        {
            tracing::warn!(%path, error = %e, "rendition directory creation failed");
            return;
        }
        match zimg_store::write_new(&path, &blob) {
            Ok(()) => tracing::debug!(%path, "rendition materialized"),
            Err(zimg_store::StoreError::Busy) => {
                tracing::debug!(%path, "rendition is being written by a peer")
            }
            Err(e) => tracing::warn!(%path, error = %e, "rendition write-back failed"),
        }
    });
}

/// Raw query parameters for a fetch; kept as strings until the easter egg
/// check has seen them.
#[derive(Debug, Default)]
struct RenditionQuery {
    w: Option<String>,
    h: Option<String>,
    p: Option<String>,
    g: Option<String>,
}

impl RenditionQuery {
    fn parse(query: Option<&str>) -> Self {
        let mut out = RenditionQuery::default();
        for (key, value) in url::form_urlencoded::parse(query.unwrap_or("").as_bytes()) {
            match key.as_ref() {
                "w" => out.w = Some(value.into_owned()),
                "h" => out.h = Some(value.into_owned()),
                "p" => out.p = Some(value.into_owned()),
                "g" => out.g = Some(value.into_owned()),
                _ => {}
            }
        }
        out
    }

    /// Defaults: `w=0 h=0 p=1 g=0`; unparsable numerics read as 0.
    fn rendition(&self) -> Rendition {
        Rendition {
            width: int_param(self.w.as_deref(), 0),
            height: int_param(self.h.as_deref(), 0),
            proportion: int_param(self.p.as_deref(), 1) != 0,
            gray: int_param(self.g.as_deref(), 0) != 0,
        }
    }
}

fn int_param(value: Option<&str>, default: u32) -> u32 {
    match value {
        Some(s) => s.parse().unwrap_or(0),
        None => default,
    }
}

// ============================================================================
// POST: the upload pipeline
// ============================================================================

async fn upload_handler(app: Arc<App>, request: Request) -> Response {
    match try_upload(app, request).await {
        Ok(fp) => json_response(serde_json::json!({ "status": 0, "picture": fp })),
        Err(e) => {
            tracing::warn!(error = %e, "upload rejected");
            json_response(serde_json::json!({ "status": -1 }))
        }
    }
}

async fn try_upload(app: Arc<App>, request: Request) -> eyre::Result<String> {
    use eyre::{WrapErr, eyre};

    let content_length: usize = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| eyre!("missing or invalid Content-Length"))?;
    if content_length == 0 {
        return Err(eyre!("empty request body"));
    }

    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| eyre!("missing Content-Type"))?;
    let boundary = multipart::boundary(content_type)
        .ok_or_else(|| eyre!("Content-Type is not multipart/form-data with a boundary"))?
        .to_owned();

    let body = axum::body::to_bytes(request.into_body(), content_length)
        .await
        .wrap_err("failed to read request body")?;
    if body.is_empty() {
        return Err(eyre!("empty request body"));
    }

    let part = multipart::parse(&body, &boundary)?;
    let ext = upload::file_ext(&part.file_name)
        .ok_or_else(|| eyre!("filename {:?} has no extension", part.file_name))?;
    if !zimg_image::is_image_ext(&ext) {
        return Err(eyre!("unsupported file extension: {ext}"));
    }

    let payload = body.slice(part.payload);
    let app = app.clone();
    tokio::task::spawn_blocking(move || upload::save_image(&app, &payload))
        .await
        .wrap_err("upload task failed")?
}

// ============================================================================
// Response helpers
// ============================================================================

fn html(status: StatusCode, body: impl Into<Body>) -> Response {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/html")
        .body(body.into())
        .unwrap()
}

fn not_found() -> Response {
    html(StatusCode::NOT_FOUND, NOT_FOUND_PAGE)
}

fn welcome_page(app: &App) -> Response {
    let page = app
        .settings
        .root_path
        .as_ref()
        .and_then(|path| fs_err::read_to_string(path.as_std_path()).ok())
        .unwrap_or_else(|| DEFAULT_WELCOME_PAGE.to_string());
    html(StatusCode::OK, page)
}

fn image_response(bytes: Bytes) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "image/jpeg")
        .body(Body::from(bytes))
        .unwrap()
}

fn json_response(value: serde_json::Value) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(value.to_string()))
        .unwrap()
}
