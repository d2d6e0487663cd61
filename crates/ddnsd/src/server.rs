//! HTTP control surface
//!
//! Three routes nested under the configured root path:
//!
//! - `GET /`: HTML table of every record and its runtime state
//! - `GET /update`: request an immediate cycle, then `303 See Other` back to `/`
//! - `GET /healthcheck`: `200` when healthy, `500` with the problems otherwise

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use chrono::{DateTime, Utc};
use ddns_core::health::{self, HostLookup};
use ddns_core::{DdnsEngine, RuntimeSnapshot, UpdateTrigger};
use std::fmt::Write;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub engine: DdnsEngine,
    pub trigger: UpdateTrigger,
    pub lookup: Arc<dyn HostLookup>,
    /// Root path, without a trailing slash unless it is `/`
    pub root: String,
}

pub fn create_router(state: AppState) -> Router {
    let root = state.root.clone();
    let routes = Router::new()
        .route("/", get(index))
        .route("/update", get(update))
        .route("/healthcheck", get(healthcheck))
        .with_state(state);

    let app = if root == "/" {
        routes
    } else {
        Router::new().nest(&root, routes)
    };
    app.fallback(fallback)
}

/// Serve `router` on `listener` until `shutdown` fires or its sender is dropped
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: oneshot::Receiver<()>,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "HTTP server listening");
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.await;
            debug!("HTTP server shutting down");
        })
        .await
}

async fn index(State(state): State<AppState>) -> Html<String> {
    Html(render(&state.engine.snapshots()))
}

async fn update(State(state): State<AppState>) -> Response {
    if !state.trigger.request() {
        warn!("Manual update requested after the scheduler stopped");
    }
    Redirect::to(&state.root).into_response()
}

async fn healthcheck(State(state): State<AppState>) -> Response {
    match health::evaluate(&state.engine.snapshots(), state.lookup.as_ref()).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(problems) => {
            warn!("Healthcheck failed: {}", problems);
            (StatusCode::INTERNAL_SERVER_ERROR, problems).into_response()
        }
    }
}

async fn fallback(uri: Uri) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, format!("No route for {uri}"))
}

fn render(snapshots: &[RuntimeSnapshot]) -> String {
    let mut page = String::from(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>DDNS Updater</title>\n\
         </head>\n<body>\n<table>\n<thead>\n<tr><th>Domain</th><th>Owner</th><th>Provider</th>\
         <th>IP Version</th><th>Update Status</th><th>Current IP</th><th>Previous IPs</th></tr>\n\
         </thead>\n<tbody>\n",
    );
    for snapshot in snapshots {
        let html = &snapshot.description.html;
        let _ = writeln!(
            page,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            html.domain,
            escape(&html.owner),
            html.provider,
            escape(&html.ip_version),
            status_cell(snapshot),
            current_ip_cell(snapshot.current_ip),
            escape(&join_ips(&snapshot.previous_ips)),
        );
    }
    page.push_str("</tbody>\n</table>\n</body>\n</html>\n");
    page
}

fn status_cell(snapshot: &RuntimeSnapshot) -> String {
    let mut cell = format!("<b>{}</b>", snapshot.status);
    if !snapshot.message.is_empty() {
        let _ = write!(cell, " ({})", escape(&snapshot.message));
    }
    let _ = write!(cell, ", {}", ago(snapshot.last_transition, Utc::now()));
    cell
}

fn current_ip_cell(ip: Option<IpAddr>) -> String {
    match ip {
        Some(ip) if !ip.is_unspecified() => ip.to_string(),
        Some(_) => "set by provider".to_string(),
        None => "N/A".to_string(),
    }
}

fn join_ips(ips: &[IpAddr]) -> String {
    if ips.is_empty() {
        return "N/A".to_string();
    }
    ips.iter().map(IpAddr::to_string).collect::<Vec<_>>().join(", ")
}

fn ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds().max(0) as u64;
    if secs == 0 {
        return "just now".to_string();
    }
    format!("{} ago", humantime::format_duration(std::time::Duration::from_secs(secs)))
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
