use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::status::parse_now;
use chrono::NaiveDateTime;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value as JsonValue;
use std::time::{SystemTime, UNIX_EPOCH};

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, JsonValue> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, JsonValue> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn parse_opt_string(v: Option<&JsonValue>) -> Result<Option<String>, &'static str> {
    match v {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let s = v.as_str().ok_or("must be string or null")?.trim().to_string();
            if s.is_empty() {
                Ok(None)
            } else {
                Ok(Some(s))
            }
        }
    }
}

pub fn now_ts() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

pub fn local_now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// `params.now` pins the clock for a request; otherwise the host's local time is used.
pub fn request_now(req: &Request) -> Result<NaiveDateTime, JsonValue> {
    match parse_opt_string(req.params.get("now")) {
        Ok(None) => Ok(local_now()),
        Ok(Some(raw)) => {
            parse_now(&raw).map_err(|e| err(&req.id, "bad_params", format!("now: {}", e), None))
        }
        Err(msg) => Err(err(&req.id, "bad_params", format!("now {}", msg), None)),
    }
}

pub fn ensure_class_exists(conn: &Connection, class_id: &str) -> Result<(), &'static str> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM classes WHERE id = ? LIMIT 1",
            [class_id],
            |_r| Ok(()),
        )
        .optional()
        .map_err(|_| "db_query_failed")?;
    if exists.is_some() {
        Ok(())
    } else {
        Err("not_found")
    }
}
