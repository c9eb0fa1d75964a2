use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::db_conn;
use crate::ipc::types::{AppState, Request};
use crate::status::SessionStatus;
use rusqlite::Connection;
use serde_json::{json, Map, Value};

const SESSIONS_KEY: &str = "setup.sessions";

pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 60;
pub const MIN_REFRESH_INTERVAL_SECS: u64 = 15;
pub const MAX_REFRESH_INTERVAL_SECS: u64 = 3600;

#[derive(Clone, Debug)]
pub struct SessionsSetup {
    pub refresh_interval_seconds: u64,
    pub default_status_filter: Option<SessionStatus>,
    pub include_unscheduled_on_board: bool,
}

fn default_section() -> Value {
    json!({
        "refreshIntervalSeconds": DEFAULT_REFRESH_INTERVAL_SECS,
        "defaultStatusFilter": "all",
        "includeUnscheduledOnBoard": true
    })
}

fn as_object_mut(v: &mut Value) -> Result<&mut Map<String, Value>, String> {
    v.as_object_mut()
        .ok_or_else(|| "setup section must be an object".to_string())
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool().ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let Some(n) = v.as_i64() else {
        return Err(format!("{} must be integer", key));
    };
    if n < min || n > max {
        return Err(format!("{} must be between {} and {}", key, min, max));
    }
    Ok(n)
}

fn merge_section_patch(current: &mut Value, patch: &Map<String, Value>) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match k.as_str() {
            "refreshIntervalSeconds" => {
                let n = parse_i64_range(
                    v,
                    k,
                    MIN_REFRESH_INTERVAL_SECS as i64,
                    MAX_REFRESH_INTERVAL_SECS as i64,
                )?;
                obj.insert(k.clone(), Value::from(n));
            }
            "defaultStatusFilter" => {
                let Some(raw) = v.as_str() else {
                    return Err(format!("{} must be string", k));
                };
                let canonical = if raw.trim().eq_ignore_ascii_case("all") {
                    "all"
                } else {
                    match SessionStatus::parse(raw) {
                        Some(s) => s.as_str(),
                        None => {
                            return Err(
                                "defaultStatusFilter must be one of: all, upcoming, inProgress, finished, unscheduled"
                                    .into(),
                            )
                        }
                    }
                };
                obj.insert(k.clone(), Value::String(canonical.to_string()));
            }
            "includeUnscheduledOnBoard" => {
                obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
            }
            _ => return Err(format!("unknown sessions field: {}", k)),
        }
    }
    Ok(())
}

fn load_section(conn: &Connection) -> anyhow::Result<Value> {
    let mut current = default_section();
    if let Some(saved) = db::settings_get_json(conn, SESSIONS_KEY)? {
        if let Some(saved_obj) = saved.as_object() {
            // Best-effort apply: malformed historical values should not block setup UI.
            let _ = merge_section_patch(&mut current, saved_obj);
        }
    }
    Ok(current)
}

pub fn load_sessions_setup(conn: &Connection) -> SessionsSetup {
    let obj = load_section(conn).unwrap_or_else(|_| default_section());
    let refresh_interval_seconds = obj
        .get("refreshIntervalSeconds")
        .and_then(|v| v.as_u64())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_REFRESH_INTERVAL_SECS);
    let default_status_filter = obj
        .get("defaultStatusFilter")
        .and_then(|v| v.as_str())
        .and_then(SessionStatus::parse);
    let include_unscheduled_on_board = obj
        .get("includeUnscheduledOnBoard")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);
    SessionsSetup {
        refresh_interval_seconds,
        default_status_filter,
        include_unscheduled_on_board,
    }
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match load_section(conn) {
        Ok(sessions) => ok(&req.id, json!({ "sessions": sessions })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let Some(section) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    if section != "sessions" {
        return err(&req.id, "bad_params", "unknown section", None);
    }
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(&mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, SESSIONS_KEY, &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
