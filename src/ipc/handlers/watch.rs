use crate::ipc::error::{err, event, ok};
use crate::ipc::handlers::sessions::load_sessions;
use crate::ipc::handlers::setup::{load_sessions_setup, MAX_REFRESH_INTERVAL_SECS};
use crate::ipc::helpers::{db_conn, ensure_class_exists, local_now, parse_opt_string};
use crate::ipc::types::{ActiveWatch, AppState, Inbound, Request};
use crate::status::{format_timestamp, status_color};
use crate::watch::{StatusWatcher, Ticker};
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};

pub const STATUS_CHANGED_EVENT: &str = "sessions.statusChanged";

/// An explicit `intervalSeconds` may go below the saved workspace floor
/// (`MIN_REFRESH_INTERVAL_SECS`); the saved value is only the default.
pub const MIN_WATCH_INTERVAL_SECS: u64 = 1;

fn handle_watch_start(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_id = match parse_opt_string(req.params.get("classId")) {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", format!("classId {}", msg), None),
    };
    if let Some(cid) = class_id.as_deref() {
        match ensure_class_exists(conn, cid) {
            Ok(()) => {}
            Err("not_found") => return err(&req.id, "not_found", "class not found", None),
            Err(code) => return err(&req.id, code, "class lookup failed", None),
        }
    }
    let interval_secs = match req.params.get("intervalSeconds") {
        None => load_sessions_setup(conn).refresh_interval_seconds,
        Some(v) if v.is_null() => load_sessions_setup(conn).refresh_interval_seconds,
        Some(v) => match v.as_u64() {
            Some(n) if (MIN_WATCH_INTERVAL_SECS..=MAX_REFRESH_INTERVAL_SECS).contains(&n) => n,
            _ => {
                return err(
                    &req.id,
                    "bad_params",
                    format!(
                        "intervalSeconds must be an integer between {} and {}",
                        MIN_WATCH_INTERVAL_SECS, MAX_REFRESH_INTERVAL_SECS
                    ),
                    None,
                )
            }
        },
    };

    let replaced = state.watch.take().is_some();
    let tx = state.inbound.clone();
    let ticker = Ticker::spawn(Duration::from_secs(interval_secs), move || {
        tx.send(Inbound::Tick).is_ok()
    });
    info!(interval_secs, class_id = ?class_id, replaced, "status watch started");
    state.watch = Some(ActiveWatch {
        ticker,
        watcher: StatusWatcher::new(),
        class_id,
        interval_secs,
    });

    ok(
        &req.id,
        json!({ "intervalSeconds": interval_secs, "replaced": replaced }),
    )
}

fn handle_watch_stop(state: &mut AppState, req: &Request) -> serde_json::Value {
    let was_running = match state.watch.take() {
        Some(mut active) => {
            active.ticker.stop();
            info!(interval_secs = active.interval_secs, "status watch stopped");
            true
        }
        None => false,
    };
    ok(&req.id, json!({ "wasRunning": was_running }))
}

/// Re-resolves the watched sessions and returns an event when any status moved.
pub fn on_tick(state: &mut AppState) -> Option<serde_json::Value> {
    let conn = state.db.as_ref()?;
    let active = state.watch.as_mut()?;
    let now = local_now();

    let rows = match load_sessions(conn, active.class_id.as_deref()) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "status watch tick failed to load sessions");
            return None;
        }
    };
    let changes = active
        .watcher
        .observe(rows.iter().map(|r| (r.id.clone(), r.status_at(now))));
    if changes.is_empty() {
        return None;
    }
    info!(changed = changes.len(), "session statuses changed");

    let changes: Vec<serde_json::Value> = changes
        .into_iter()
        .map(|c| {
            json!({
                "sessionId": c.session_id,
                "from": c.from,
                "to": c.to,
                "color": status_color(c.to),
            })
        })
        .collect();
    Some(event(
        STATUS_CHANGED_EVENT,
        json!({ "now": format_timestamp(&now), "changes": changes }),
    ))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "sessions.watch.start" => Some(handle_watch_start(state, req)),
        "sessions.watch.stop" => Some(handle_watch_stop(state, req)),
        _ => None,
    }
}
