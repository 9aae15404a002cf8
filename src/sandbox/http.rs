//! Loopback HTTP server for the native sandbox host.
//!
//! ```text
//! Browser ──► 127.0.0.1:PORT/              ──► rewritten payload + CSP header
//!        ├──► 127.0.0.1:PORT/fetch?url=    ──► RequestFilter ──► PageFetcher
//!        │                                          │
//!        │                                          └─► 403 when denied
//!        └──► 127.0.0.1:PORT/heartbeat.js  ──► polls /alive, blanks the page
//!                                              once the server is gone
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Empty, Full, combinators::BoxBody};
use hyper::header::{CACHE_CONTROL, CONTENT_SECURITY_POLICY, CONTENT_TYPE, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::RwLock;

use crate::providers::PageFetcher;
use crate::sandbox::error::{Result, SandboxError};
use crate::sandbox::filter::{FETCH_PATH, FilterDecision, RequestFilter};

type ServerBody = BoxBody<Bytes, Infallible>;

const HEARTBEAT_PATH: &str = "/heartbeat.js";
const ALIVE_PATH: &str = "/alive";
/// Consecutive failed polls before the page tears itself down.
const HEARTBEAT_MISSES: u32 = 2;

/// State shared across connections.
struct ViewState {
    page: String,
    csp: String,
    filter: RequestFilter,
    fetcher: Arc<dyn PageFetcher>,
    heartbeat_script: String,
    request_count: AtomicU64,
}

/// Serves one rendered view on the loopback interface.
pub struct ViewServer {
    state: Arc<ViewState>,
    addr: RwLock<Option<SocketAddr>>,
    shutdown_tx: RwLock<Option<tokio::sync::oneshot::Sender<()>>>,
}

impl ViewServer {
    /// `payload` is rewritten through `filter` once, here. The page polls the
    /// server every `heartbeat` and blanks itself when the server stops
    /// answering.
    pub fn new(
        payload: &str,
        filter: RequestFilter,
        fetcher: Arc<dyn PageFetcher>,
        heartbeat: Duration,
    ) -> Self {
        Self {
            state: Arc::new(ViewState {
                page: inject_heartbeat(&filter.rewrite_payload(payload)),
                csp: filter.content_security_policy(),
                filter,
                fetcher,
                heartbeat_script: heartbeat_script(heartbeat),
                request_count: AtomicU64::new(0),
            }),
            addr: RwLock::new(None),
            shutdown_tx: RwLock::new(None),
        }
    }

    /// Start serving on 127.0.0.1 (port 0 for auto-assign).
    pub async fn start(&self, port: u16) -> Result<SocketAddr> {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(|e| SandboxError::Server {
                reason: format!("failed to bind: {e}"),
            })?;
        let addr = listener.local_addr().map_err(|e| SandboxError::Server {
            reason: format!("failed to get local addr: {e}"),
        })?;

        *self.addr.write().await = Some(addr);

        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel();
        *self.shutdown_tx.write().await = Some(shutdown_tx);

        let state = self.state.clone();

        tokio::spawn(async move {
            tracing::debug!(%addr, "View server started");

            loop {
                tokio::select! {
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok((stream, _)) => {
                                let io = TokioIo::new(stream);
                                let state = state.clone();

                                tokio::spawn(async move {
                                    let service = service_fn(move |req| {
                                        let state = state.clone();
                                        async move { handle_request(req, state).await }
                                    });

                                    if let Err(e) = http1::Builder::new()
                                        .serve_connection(io, service)
                                        .await
                                    {
                                        tracing::debug!("View connection error: {}", e);
                                    }
                                });
                            }
                            Err(e) => {
                                tracing::error!("View server accept error: {}", e);
                            }
                        }
                    }
                    _ = &mut shutdown_rx => {
                        tracing::debug!("View server shutting down");
                        break;
                    }
                }
            }
        });

        Ok(addr)
    }

    pub async fn stop(&self) {
        if let Some(tx) = self.shutdown_tx.write().await.take() {
            let _ = tx.send(());
        }
    }

    pub async fn addr(&self) -> Option<SocketAddr> {
        *self.addr.read().await
    }

    pub fn request_count(&self) -> u64 {
        self.state.request_count.load(Ordering::SeqCst)
    }
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<ViewState>,
) -> std::result::Result<Response<ServerBody>, Infallible> {
    state.request_count.fetch_add(1, Ordering::SeqCst);

    if req.method() != Method::GET {
        return Ok(error_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "Only GET is served".to_string(),
        ));
    }

    match req.uri().path() {
        "/" => Ok(page_response(&state)),
        FETCH_PATH => Ok(fetch_response(req.uri().query(), &state).await),
        HEARTBEAT_PATH => Ok(heartbeat_response(&state)),
        ALIVE_PATH => Ok(alive_response()),
        _ => Ok(error_response(StatusCode::NOT_FOUND, "Not found".to_string())),
    }
}

fn page_response(state: &ViewState) -> Response<ServerBody> {
    let builder = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "text/html; charset=utf-8")
        .header(
            CONTENT_SECURITY_POLICY,
            HeaderValue::from_str(&state.csp).unwrap_or(HeaderValue::from_static("default-src 'none'")),
        );
    make_response_from_builder(builder, full_body(Bytes::from(state.page.clone())))
}

fn heartbeat_response(state: &ViewState) -> Response<ServerBody> {
    let builder = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "text/javascript; charset=utf-8")
        .header(CACHE_CONTROL, "no-store");
    make_response_from_builder(builder, full_body(Bytes::from(state.heartbeat_script.clone())))
}

fn alive_response() -> Response<ServerBody> {
    let builder = Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header(CACHE_CONTROL, "no-store");
    make_response_from_builder(builder, empty_body())
}

/// Add the heartbeat script before `</body>`, or at the end.
fn inject_heartbeat(page: &str) -> String {
    let tag = format!(r#"<script src="{HEARTBEAT_PATH}"></script>"#);
    match page.to_ascii_lowercase().rfind("</body>") {
        Some(at) => format!("{}{tag}{}", &page[..at], &page[at..]),
        None => format!("{page}{tag}"),
    }
}

/// Same-origin script that blanks and closes the view once the loopback
/// server stops answering.
fn heartbeat_script(interval: Duration) -> String {
    let interval_ms = interval.as_millis().max(100);
    format!(
        r#"(function () {{
  var misses = 0;
  function teardown() {{
    document.documentElement.innerHTML = "";
    window.close();
    location.replace("about:blank");
  }}
  function missed() {{
    misses += 1;
    if (misses >= {HEARTBEAT_MISSES}) teardown();
  }}
  setInterval(function () {{
    fetch("{ALIVE_PATH}", {{ cache: "no-store" }}).then(function (r) {{
      if (r.ok) {{ misses = 0; }} else {{ missed(); }}
    }}, missed);
  }}, {interval_ms});
}})();
"#
    )
}

async fn fetch_response(query: Option<&str>, state: &ViewState) -> Response<ServerBody> {
    let Some(target) = query.and_then(fetch_target) else {
        return error_response(StatusCode::BAD_REQUEST, "Missing url".to_string());
    };

    if let FilterDecision::Cancel { reason } = state.filter.decide(&target) {
        tracing::info!(url = %target, %reason, "Blocked sandbox fetch");
        return error_response(StatusCode::FORBIDDEN, reason);
    }

    match state.fetcher.fetch(&target).await {
        Ok(page) => {
            let content_type = page
                .content_type
                .unwrap_or_else(|| "application/octet-stream".to_string());
            let builder = Response::builder()
                .status(StatusCode::OK)
                .header(CONTENT_TYPE, content_type);
            make_response_from_builder(builder, full_body(Bytes::from(page.body)))
        }
        Err(e) => {
            tracing::debug!(url = %target, error = %e, "Sandbox fetch failed");
            error_response(StatusCode::BAD_GATEWAY, "Upstream fetch failed".to_string())
        }
    }
}

/// Pull the decoded `url` parameter out of a query string.
fn fetch_target(query: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        if key != "url" {
            return None;
        }
        urlencoding::decode(&value.replace('+', " "))
            .ok()
            .map(|v| v.into_owned())
    })
}

fn make_response_from_builder(
    builder: hyper::http::response::Builder,
    body: ServerBody,
) -> Response<ServerBody> {
    match builder.body(body) {
        Ok(resp) => resp,
        Err(e) => {
            tracing::error!("Failed to build response: {}", e);
            let mut resp = Response::new(empty_body());
            *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            resp
        }
    }
}

fn error_response(status: StatusCode, message: String) -> Response<ServerBody> {
    let builder = Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8");
    make_response_from_builder(builder, full_body(Bytes::from(message)))
}

fn empty_body() -> ServerBody {
    Empty::<Bytes>::new().boxed()
}

fn full_body(data: Bytes) -> ServerBody {
    Full::new(data).boxed()
}
