//! ==============================================================================
//! console.rs - operator console (presentation layer)
//! ==============================================================================
//!
//! purpose:
//!     server-rendered html page plus a small json api over the controller.
//!     every page render re-derives the pin views from the two stores; the
//!     page never keeps state of its own.
//!
//! routes:
//!     GET  /                      html console
//!     POST /pin/:p/edit           direction=INPUT|OUTPUT (pending edit only)
//!     POST /pin/:p/setup          [direction=...] (default: displayed direction)
//!     POST /pin/:p/write          state=HIGH|LOW
//!     POST /pin/:p/read
//!     POST /refresh               manual refresh
//!     POST /auto-refresh          toggle the scheduler
//!     POST /log/clear
//!     GET  /api/views             effective views as json
//!     GET  /api/activity          activity log as json
//!     GET  /api/status            banner, scheduler state, counts
//!     GET  /api/gpio-info         board summary, passed through
//!     GET  /api/changes?since=N   long-poll: returns once the revision moves
//!                                 past N, the banner expires, or after 25s
//!
//! form posts always redirect back to `/`. action failures are already in the
//! activity log and banner by then, so the redirect is the whole response.
//!
//! ==============================================================================

use crate::activity::{ActivityEntry, Severity};
use crate::controller::{Controller, RefreshTrigger};
use crate::domain::{Direction, Level, PinKind, Position};
use crate::error::ControlError;
use crate::reconcile::{EffectiveView, PinStatus};
use crate::scheduler::RefreshScheduler;

use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;
use tower_http::cors::CorsLayer;

/// shared between all handlers
#[derive(Clone)]
pub struct ConsoleState {
    pub controller: Controller,
    pub scheduler: RefreshScheduler,
}

pub fn router(state: ConsoleState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/pin/:position/edit", post(edit_handler))
        .route("/pin/:position/setup", post(setup_handler))
        .route("/pin/:position/write", post(write_handler))
        .route("/pin/:position/read", post(read_handler))
        .route("/refresh", post(refresh_handler))
        .route("/auto-refresh", post(auto_refresh_handler))
        .route("/log/clear", post(clear_log_handler))
        .route("/api/views", get(views_handler))
        .route("/api/activity", get(activity_handler))
        .route("/api/status", get(status_handler))
        .route("/api/gpio-info", get(gpio_info_handler))
        .route("/api/changes", get(changes_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// serve until `shutdown` resolves
pub async fn serve(
    bind: &str,
    state: ConsoleState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("console live at http://{}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

// ==============================================================================
// form handlers
// ==============================================================================

fn position(raw: u8) -> Result<Position, StatusCode> {
    Position::new(raw).ok_or(StatusCode::NOT_FOUND)
}

#[derive(Deserialize)]
struct EditForm {
    direction: String,
}

#[derive(Deserialize)]
struct SetupForm {
    direction: Option<String>,
}

#[derive(Deserialize)]
struct WriteForm {
    state: String,
}

fn parse_direction(raw: &str) -> Result<Direction, StatusCode> {
    raw.parse().map_err(|_| StatusCode::BAD_REQUEST)
}

fn parse_level(raw: &str) -> Result<Level, StatusCode> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "HIGH" | "1" | "TRUE" => Ok(Level::High),
        "LOW" | "0" | "FALSE" => Ok(Level::Low),
        _ => Err(StatusCode::BAD_REQUEST),
    }
}

/// the controller already put the failure in the log and banner
fn not_applied(position: Position, what: &str, e: &ControlError) {
    tracing::debug!(local = e.is_local(), "console {} on pin {} not applied: {}", what, position, e);
}

async fn edit_handler(
    State(state): State<ConsoleState>,
    Path(raw): Path<u8>,
    Form(form): Form<EditForm>,
) -> Result<Redirect, StatusCode> {
    let position = position(raw)?;
    let direction = parse_direction(&form.direction)?;
    if let Err(e) = state.controller.edit_direction(position, direction).await {
        not_applied(position, "edit", &e);
    }
    Ok(Redirect::to("/"))
}

async fn setup_handler(
    State(state): State<ConsoleState>,
    Path(raw): Path<u8>,
    Form(form): Form<SetupForm>,
) -> Result<Redirect, StatusCode> {
    let position = position(raw)?;
    match form.direction.as_deref().filter(|d| !d.is_empty()) {
        Some(direction) => {
            let direction = parse_direction(direction)?;
            if let Err(e) = state.controller.configure(position, direction).await {
                not_applied(position, "setup", &e);
            }
        }
        None => {
            if let Err(e) = state.controller.apply(position).await {
                not_applied(position, "apply", &e);
            }
        }
    }
    Ok(Redirect::to("/"))
}

async fn write_handler(
    State(state): State<ConsoleState>,
    Path(raw): Path<u8>,
    Form(form): Form<WriteForm>,
) -> Result<Redirect, StatusCode> {
    let position = position(raw)?;
    let level = parse_level(&form.state)?;
    if let Err(e) = state.controller.write(position, level).await {
        not_applied(position, "write", &e);
    }
    Ok(Redirect::to("/"))
}

async fn read_handler(State(state): State<ConsoleState>, Path(raw): Path<u8>) -> Result<Redirect, StatusCode> {
    let position = position(raw)?;
    if let Err(e) = state.controller.read(position).await {
        not_applied(position, "read", &e);
    }
    Ok(Redirect::to("/"))
}

async fn refresh_handler(State(state): State<ConsoleState>) -> Redirect {
    state.controller.refresh(RefreshTrigger::Manual).await;
    Redirect::to("/")
}

async fn auto_refresh_handler(State(state): State<ConsoleState>) -> Redirect {
    state.scheduler.toggle().await;
    Redirect::to("/")
}

async fn clear_log_handler(State(state): State<ConsoleState>) -> Redirect {
    state.controller.clear_log().await;
    Redirect::to("/")
}

// ==============================================================================
// json api
// ==============================================================================

async fn views_handler(State(state): State<ConsoleState>) -> Json<Vec<EffectiveView>> {
    Json(state.controller.views().await)
}

async fn activity_handler(State(state): State<ConsoleState>) -> Json<Vec<ActivityEntry>> {
    Json(state.controller.activity().await)
}

async fn status_handler(State(state): State<ConsoleState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "banner": state.controller.banner().await,
        "auto_refresh": state.scheduler.is_running().await,
        "interval_seconds": state.scheduler.interval().as_secs(),
        "pins": state.controller.views().await.len(),
        "pending_changes": state.controller.pending_count().await,
    }))
}

async fn gpio_info_handler(State(state): State<ConsoleState>) -> Response {
    match state.controller.gpio_info().await {
        Ok(info) => Json(info).into_response(),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(serde_json::json!({ "success": false, "message": e.to_string() })),
        )
            .into_response(),
    }
}

const LONG_POLL: Duration = Duration::from_secs(25);

#[derive(Deserialize)]
struct ChangesQuery {
    since: Option<u64>,
}

async fn changes_handler(State(state): State<ConsoleState>, Query(query): Query<ChangesQuery>) -> Json<serde_json::Value> {
    let mut rx = state.controller.subscribe();
    let since = query.since.unwrap_or_else(|| *rx.borrow_and_update());

    // a showing banner ends the wait when it expires, so the page drops it
    let banner_left = state.controller.banner_remaining().await.filter(|left| *left < LONG_POLL);
    let wait = banner_left.unwrap_or(LONG_POLL);
    let moved = tokio::time::timeout(wait, rx.wait_for(|revision| *revision != since))
        .await
        .is_ok();

    let revision = *rx.borrow();
    Json(serde_json::json!({
        "revision": revision,
        "banner_expired": !moved && banner_left.is_some(),
    }))
}

// ==============================================================================
// html page
// ==============================================================================

async fn index_handler(State(state): State<ConsoleState>) -> Html<String> {
    let pins: BTreeMap<Position, _> = state
        .controller
        .pins()
        .await
        .into_iter()
        .map(|pin| (pin.position, pin))
        .collect();
    let views = state.controller.views().await;
    let banner = state.controller.banner().await;
    let activity = state.controller.activity().await;
    let auto_refresh = state.scheduler.is_running().await;
    let revision = state.controller.revision();

    let mut html = String::with_capacity(16 * 1024);
    html.push_str("<!doctype html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>GPIO Console</title>\n");
    html.push_str(STYLE);
    html.push_str(&RELOAD_SCRIPT.replace("{revision}", &revision.to_string()));
    html.push_str("</head>\n<body>\n<h1>GPIO Console</h1>\n");

    // banner + toolbar
    let banner_class = match banner.severity {
        Some(Severity::Success) => "banner success",
        Some(Severity::Error) => "banner error",
        Some(Severity::Info) | None => "banner",
    };
    let _ = writeln!(html, "<div class=\"{}\">{}</div>", banner_class, html_escape(&banner.message));
    let _ = writeln!(
        html,
        "<div class=\"toolbar\">\
         <form method=\"post\" action=\"/refresh\"><button class=\"btn-primary\">Refresh</button></form>\
         <form method=\"post\" action=\"/auto-refresh\"><button class=\"btn-secondary\">Auto-refresh: {}</button></form>\
         </div>",
        if auto_refresh { "ON" } else { "OFF" }
    );

    // header pinout: odd positions on the left, even on the right
    html.push_str("<h2>Header</h2>\n<table class=\"pinout\">\n");
    let header: Vec<Position> = Position::all().collect();
    for row in header.chunks(2) {
        html.push_str("<tr>");
        for &position in row {
            match pins.get(&position) {
                Some(pin) => {
                    let _ = write!(
                        html,
                        "<td class=\"pin {}\" title=\"{}\">{}</td>",
                        pin.kind.as_str(),
                        html_escape(&pin.description),
                        position
                    );
                }
                None => {
                    let _ = write!(html, "<td class=\"pin missing\">{}</td>", position);
                }
            }
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</table>\n");

    // one card per addressable gpio line
    html.push_str("<h2>Pins</h2>\n<div class=\"cards\">\n");
    for view in &views {
        let Some(pin) = pins.get(&view.position) else {
            continue;
        };
        if pin.kind != PinKind::Gpio || !pin.has_control_number {
            continue;
        }
        render_card(&mut html, view, pin.control_number, &pin.description);
    }
    html.push_str("</div>\n");

    // activity log, newest first
    html.push_str("<h2>Activity</h2>\n<form method=\"post\" action=\"/log/clear\"><button class=\"btn-secondary\">Clear log</button></form>\n<ul class=\"log\">\n");
    for entry in activity.iter().rev() {
        let secs = entry.timestamp_ms / 1000;
        let _ = writeln!(
            html,
            "<li class=\"{}\">[{:02}:{:02}:{:02}] {}</li>",
            severity_class(entry.severity),
            (secs / 3600) % 24,
            (secs / 60) % 60,
            secs % 60,
            html_escape(&entry.message)
        );
    }
    html.push_str("</ul>\n</body>\n</html>\n");

    Html(html)
}

fn render_card(html: &mut String, view: &EffectiveView, control_number: Option<u32>, description: &str) {
    let p = view.position;
    let disabled = if view.controls_enabled { "" } else { " disabled" };

    let _ = writeln!(html, "<div class=\"card\" id=\"pin-{}\">", p);
    match control_number {
        Some(n) => {
            let _ = writeln!(html, "<h3>Pin {} <small>GPIO {}</small></h3>", p, n);
        }
        None => {
            let _ = writeln!(html, "<h3>Pin {}</h3>", p);
        }
    }
    let _ = writeln!(html, "<p class=\"desc\">{}</p>", html_escape(description));

    match &view.status {
        PinStatus::NotConfigured => {
            let _ = writeln!(html, "<p class=\"notice\">{}</p>", html_escape(&view.status_text()));
        }
        PinStatus::State { .. } => {
            let _ = writeln!(html, "<p class=\"status\">{}</p>", html_escape(&view.status_text()));
        }
        PinStatus::Blank => {}
    }

    let _ = write!(
        html,
        "<form method=\"post\" action=\"/pin/{}/edit\"><select name=\"direction\" onchange=\"this.form.submit()\"{}>",
        p, disabled
    );
    for direction in [Direction::Input, Direction::Output] {
        let selected = if direction == view.displayed_direction { " selected" } else { "" };
        let _ = write!(html, "<option value=\"{0}\"{1}>{0}</option>", direction, selected);
    }
    html.push_str("</select></form>\n");

    let _ = writeln!(
        html,
        "<div class=\"actions\">\
         <form method=\"post\" action=\"/pin/{p}/setup\"><button class=\"{style}\"{d}>{label}</button></form>\
         <form method=\"post\" action=\"/pin/{p}/read\"><button class=\"btn-secondary\"{d}>Read</button></form>\
         <form method=\"post\" action=\"/pin/{p}/write\"><input type=\"hidden\" name=\"state\" value=\"HIGH\"><button class=\"btn-high\"{d}>HIGH</button></form>\
         <form method=\"post\" action=\"/pin/{p}/write\"><input type=\"hidden\" name=\"state\" value=\"LOW\"><button class=\"btn-low\"{d}>LOW</button></form>\
         </div>",
        p = p,
        style = view.commit_style.css_class(),
        d = disabled,
        label = html_escape(view.commit_label),
    );
    html.push_str("</div>\n");
}

fn severity_class(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "info",
        Severity::Success => "success",
        Severity::Error => "error",
    }
}

/// escape html special characters to prevent xss
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// reload the page whenever the controller revision moves
const RELOAD_SCRIPT: &str = r#"<script>
(async () => {
  const since = {revision};
  for (;;) {
    try {
      const r = await fetch('/api/changes?since=' + since);
      const j = await r.json();
      if (j.revision !== since || j.banner_expired) { location.reload(); return; }
    } catch (e) {
      await new Promise(done => setTimeout(done, 2000));
    }
  }
})();
</script>
"#;

const STYLE: &str = r#"<style>
body { font-family: system-ui; padding: 1.5rem; background: #1a1a2e; color: #eee; }
.banner { padding: .6rem 1rem; border-radius: 6px; background: #16213e; margin-bottom: 1rem; }
.banner.success { background: #1e5128; }
.banner.error { background: #7a1f1f; }
.toolbar form, .actions form { display: inline-block; margin-right: .4rem; }
.pinout td { width: 2.4rem; text-align: center; border-radius: 4px; padding: .2rem; }
.pin.power { background: #b33; }
.pin.ground { background: #333; }
.pin.gpio { background: #2a6f2a; }
.pin.reserved, .pin.missing { background: #555; }
.cards { display: flex; flex-wrap: wrap; gap: 1rem; }
.card { background: #16213e; border-radius: 8px; padding: .8rem 1rem; min-width: 15rem; }
.card .notice { color: #f0a500; }
button { border: 0; border-radius: 4px; padding: .3rem .7rem; color: #fff; cursor: pointer; }
button[disabled] { opacity: .4; cursor: default; }
.btn-primary { background: #1f6feb; }
.btn-warning { background: #d29922; }
.btn-secondary { background: #555; }
.btn-high { background: #2a6f2a; }
.btn-low { background: #7a1f1f; }
.log li.error { color: #ff6b6b; }
.log li.success { color: #7bd88f; }
</style>
"#;
