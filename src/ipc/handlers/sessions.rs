use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup::load_sessions_setup;
use crate::ipc::helpers::{
    db_conn, ensure_class_exists, now_ts, parse_opt_string, request_now, required_str,
};
use crate::ipc::types::{AppState, Request};
use crate::status::{
    format_timestamp, next_transition, parse_session_date, resolve_status, status_color,
    SessionStatus, TimeOfDay,
};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, params_from_iter, types::Value, Connection, OptionalExtension};
use serde_json::{json, Map, Value as JsonValue};
use uuid::Uuid;

const SESSION_COLUMNS: &str = "id, class_id, title, subject, teacher_name, meeting_link, session_date, start_time, end_time";

#[derive(Debug, Clone)]
pub struct SessionRow {
    pub id: String,
    pub class_id: String,
    pub title: String,
    pub subject: Option<String>,
    pub teacher_name: Option<String>,
    pub meeting_link: Option<String>,
    pub date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

type Schedule = (Option<NaiveDate>, Option<TimeOfDay>, Option<TimeOfDay>);

impl SessionRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            class_id: row.get(1)?,
            title: row.get(2)?,
            subject: row.get(3)?,
            teacher_name: row.get(4)?,
            meeting_link: row.get(5)?,
            date: row.get(6)?,
            start_time: row.get(7)?,
            end_time: row.get(8)?,
        })
    }

    /// Stored values that no longer parse count as absent.
    fn schedule(&self) -> Schedule {
        (
            self.date.as_deref().and_then(|s| parse_session_date(s).ok()),
            self.start_time.as_deref().and_then(|s| TimeOfDay::parse(s).ok()),
            self.end_time.as_deref().and_then(|s| TimeOfDay::parse(s).ok()),
        )
    }

    pub fn status_at(&self, now: NaiveDateTime) -> SessionStatus {
        let (date, start, end) = self.schedule();
        resolve_status(date, start, end, now)
    }

    fn next_transition_at(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        let (date, start, end) = self.schedule();
        next_transition(date, start, end, now)
    }

    fn to_json(&self, now: NaiveDateTime) -> JsonValue {
        let status = self.status_at(now);
        json!({
            "id": self.id,
            "classId": self.class_id,
            "title": self.title,
            "subject": self.subject,
            "teacherName": self.teacher_name,
            "meetingLink": self.meeting_link,
            "date": self.date,
            "startTime": self.start_time,
            "endTime": self.end_time,
            "status": status,
            "color": status_color(status),
            "nextTransitionAt": self.next_transition_at(now).map(|t| format_timestamp(&t)),
        })
    }
}

pub fn load_sessions(conn: &Connection, class_id: Option<&str>) -> rusqlite::Result<Vec<SessionRow>> {
    let sql = format!(
        "SELECT {} FROM sessions
         WHERE (?1 IS NULL OR class_id = ?1)
         ORDER BY session_date IS NULL, session_date, start_time IS NULL, start_time, title, id",
        SESSION_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![class_id], SessionRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn load_session(conn: &Connection, session_id: &str) -> rusqlite::Result<Option<SessionRow>> {
    let sql = format!("SELECT {} FROM sessions WHERE id = ?", SESSION_COLUMNS);
    conn.query_row(&sql, [session_id], SessionRow::from_row)
        .optional()
}

fn parse_date_field(v: Option<&JsonValue>, key: &str) -> Result<Option<NaiveDate>, String> {
    match parse_opt_string(v) {
        Ok(None) => Ok(None),
        Ok(Some(s)) => parse_session_date(&s)
            .map(Some)
            .map_err(|e| format!("{}: {}", key, e)),
        Err(msg) => Err(format!("{} {}", key, msg)),
    }
}

fn parse_time_field(v: Option<&JsonValue>, key: &str) -> Result<Option<TimeOfDay>, String> {
    match parse_opt_string(v) {
        Ok(None) => Ok(None),
        Ok(Some(s)) => TimeOfDay::parse(&s)
            .map(Some)
            .map_err(|e| format!("{}: {}", key, e)),
        Err(msg) => Err(format!("{} {}", key, msg)),
    }
}

fn ensure_time_order(start: Option<TimeOfDay>, end: Option<TimeOfDay>) -> Result<(), String> {
    if let (Some(s), Some(e)) = (start, end) {
        if s > e {
            return Err(format!("startTime {} must not be after endTime {}", s, e));
        }
    }
    Ok(())
}

fn date_text(d: Option<NaiveDate>) -> Option<String> {
    d.map(|d| d.format("%Y-%m-%d").to_string())
}

fn time_text(t: Option<TimeOfDay>) -> Option<String> {
    t.map(|t| t.to_string())
}

fn opt_text(v: Option<String>) -> Value {
    match v {
        Some(s) => Value::Text(s),
        None => Value::Null,
    }
}

fn parse_status_filter(req: &Request, conn: &Connection) -> Result<Option<SessionStatus>, JsonValue> {
    match req.params.get("status") {
        None | Some(JsonValue::Null) => Ok(load_sessions_setup(conn).default_status_filter),
        Some(v) => {
            let Some(raw) = v.as_str() else {
                return Err(err(&req.id, "bad_params", "status must be string", None));
            };
            if raw.trim().eq_ignore_ascii_case("all") {
                return Ok(None);
            }
            SessionStatus::parse(raw).map(Some).ok_or_else(|| {
                err(
                    &req.id,
                    "bad_params",
                    "status must be one of: all, upcoming, inProgress, finished, unscheduled",
                    None,
                )
            })
        }
    }
}

fn optional_class_filter(conn: &Connection, req: &Request) -> Result<Option<String>, JsonValue> {
    let class_id = match parse_opt_string(req.params.get("classId")) {
        Ok(v) => v,
        Err(msg) => return Err(err(&req.id, "bad_params", format!("classId {}", msg), None)),
    };
    if let Some(cid) = class_id.as_deref() {
        match ensure_class_exists(conn, cid) {
            Ok(()) => {}
            Err("not_found") => return Err(err(&req.id, "not_found", "class not found", None)),
            Err(code) => return Err(err(&req.id, code, "class lookup failed", None)),
        }
    }
    Ok(class_id)
}

fn handle_sessions_resolve(_state: &mut AppState, req: &Request) -> JsonValue {
    let now = match request_now(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let date = match parse_date_field(req.params.get("date"), "date") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let start = match parse_time_field(req.params.get("startTime"), "startTime") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let end = match parse_time_field(req.params.get("endTime"), "endTime") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    if let Err(msg) = ensure_time_order(start, end) {
        return err(&req.id, "bad_params", msg, None);
    }

    let status = resolve_status(date, start, end, now);
    ok(
        &req.id,
        json!({
            "status": status,
            "color": status_color(status),
            "nextTransitionAt": next_transition(date, start, end, now).map(|t| format_timestamp(&t)),
        }),
    )
}

fn handle_sessions_list(state: &mut AppState, req: &Request) -> JsonValue {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let now = match request_now(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = match optional_class_filter(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let filter = match parse_status_filter(req, conn) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let rows = match load_sessions(conn, class_id.as_deref()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut resolved: Vec<(SessionStatus, &SessionRow)> = rows
        .iter()
        .map(|r| (r.status_at(now), r))
        .filter(|(s, _)| filter.map(|f| f == *s).unwrap_or(true))
        .collect();
    // Stable: keeps date order, pushes unscheduled to the end.
    resolved.sort_by_key(|(s, _)| *s == SessionStatus::Unscheduled);

    let sessions: Vec<JsonValue> = resolved.iter().map(|(_, r)| r.to_json(now)).collect();
    ok(
        &req.id,
        json!({ "now": format_timestamp(&now), "sessions": sessions }),
    )
}

fn handle_sessions_open(state: &mut AppState, req: &Request) -> JsonValue {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let session_id = match required_str(req, "sessionId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let now = match request_now(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match load_session(conn, &session_id) {
        Ok(Some(row)) => ok(&req.id, json!({ "session": row.to_json(now) })),
        Ok(None) => err(&req.id, "not_found", "session not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_sessions_create(state: &mut AppState, req: &Request) -> JsonValue {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(input) = req.params.get("input").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing input", None);
    };
    match ensure_class_exists(conn, &class_id) {
        Ok(()) => {}
        Err("not_found") => return err(&req.id, "not_found", "class not found", None),
        Err(code) => return err(&req.id, code, "class lookup failed", None),
    }

    let title = match input.get("title").and_then(|v| v.as_str()).map(|s| s.trim()) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => return err(&req.id, "bad_params", "input.title must not be empty", None),
    };
    let mut text_fields: Vec<Option<String>> = Vec::with_capacity(3);
    for key in ["subject", "teacherName", "meetingLink"] {
        match parse_opt_string(input.get(key)) {
            Ok(v) => text_fields.push(v),
            Err(msg) => {
                return err(&req.id, "bad_params", format!("input.{} {}", key, msg), None)
            }
        }
    }
    let date = match parse_date_field(input.get("date"), "input.date") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let start = match parse_time_field(input.get("startTime"), "input.startTime") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let end = match parse_time_field(input.get("endTime"), "input.endTime") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    if let Err(msg) = ensure_time_order(start, end) {
        return err(&req.id, "bad_params", msg, None);
    }

    let session_id = Uuid::new_v4().to_string();
    let ts = now_ts();
    let mut text_fields = text_fields.into_iter();
    let values: Vec<Value> = vec![
        Value::Text(session_id.clone()),
        Value::Text(class_id),
        Value::Text(title),
        opt_text(text_fields.next().flatten()),
        opt_text(text_fields.next().flatten()),
        opt_text(text_fields.next().flatten()),
        opt_text(date_text(date)),
        opt_text(time_text(start)),
        opt_text(time_text(end)),
        Value::Text(ts.clone()),
        Value::Text(ts),
    ];
    if let Err(e) = conn.execute(
        "INSERT INTO sessions(
            id, class_id, title, subject, teacher_name, meeting_link,
            session_date, start_time, end_time, created_at, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params_from_iter(values),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "sessions" })),
        );
    }

    ok(&req.id, json!({ "sessionId": session_id }))
}

fn apply_patch(
    conn: &Connection,
    current: &SessionRow,
    patch: &Map<String, JsonValue>,
) -> Result<(Vec<String>, Vec<Value>), (&'static str, String)> {
    let bad = |msg: String| ("bad_params", msg);
    let (_, mut start, mut end) = current.schedule();
    let mut fields: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    for (k, v) in patch {
        match k.as_str() {
            "classId" => {
                let Some(cid) = v.as_str().map(|s| s.trim().to_string()) else {
                    return Err(bad("patch.classId must be string".into()));
                };
                match ensure_class_exists(conn, &cid) {
                    Ok(()) => {}
                    Err("not_found") => return Err(("not_found", "class not found".into())),
                    Err(code) => return Err((code, "class lookup failed".into())),
                }
                fields.push("class_id = ?".to_string());
                values.push(Value::Text(cid));
            }
            "title" => {
                let Some(s) = v.as_str().map(|s| s.trim()) else {
                    return Err(bad("patch.title must be string".into()));
                };
                if s.is_empty() {
                    return Err(bad("patch.title must not be empty".into()));
                }
                fields.push("title = ?".to_string());
                values.push(Value::Text(s.to_string()));
            }
            "subject" | "teacherName" | "meetingLink" => {
                let column = match k.as_str() {
                    "subject" => "subject",
                    "teacherName" => "teacher_name",
                    _ => "meeting_link",
                };
                let s = parse_opt_string(Some(v)).map_err(|m| bad(format!("patch.{} {}", k, m)))?;
                fields.push(format!("{} = ?", column));
                values.push(opt_text(s));
            }
            "date" => {
                let d = parse_date_field(Some(v), "patch.date").map_err(bad)?;
                fields.push("session_date = ?".to_string());
                values.push(opt_text(date_text(d)));
            }
            "startTime" => {
                start = parse_time_field(Some(v), "patch.startTime").map_err(bad)?;
                fields.push("start_time = ?".to_string());
                values.push(opt_text(time_text(start)));
            }
            "endTime" => {
                end = parse_time_field(Some(v), "patch.endTime").map_err(bad)?;
                fields.push("end_time = ?".to_string());
                values.push(opt_text(time_text(end)));
            }
            _ => return Err(bad(format!("unknown patch field: {}", k))),
        }
    }
    ensure_time_order(start, end).map_err(bad)?;
    Ok((fields, values))
}

fn handle_sessions_update(state: &mut AppState, req: &Request) -> JsonValue {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let session_id = match required_str(req, "sessionId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing patch", None);
    };

    let current = match load_session(conn, &session_id) {
        Ok(Some(r)) => r,
        Ok(None) => return err(&req.id, "not_found", "session not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let (mut fields, mut values) = match apply_patch(conn, &current, patch) {
        Ok(v) => v,
        Err((code, msg)) => return err(&req.id, code, msg, None),
    };
    if fields.is_empty() {
        return ok(&req.id, json!({ "ok": true }));
    }
    fields.push("updated_at = ?".to_string());
    values.push(Value::Text(now_ts()));
    values.push(Value::Text(session_id));
    let sql = format!("UPDATE sessions SET {} WHERE id = ?", fields.join(", "));
    if let Err(e) = conn.execute(&sql, params_from_iter(values)) {
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "sessions" })),
        );
    }
    ok(&req.id, json!({ "ok": true }))
}

fn handle_sessions_delete(state: &mut AppState, req: &Request) -> JsonValue {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let session_id = match required_str(req, "sessionId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match conn.execute("DELETE FROM sessions WHERE id = ?", [&session_id]) {
        Ok(0) => err(&req.id, "not_found", "session not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "sessions" })),
        ),
    }
}

fn handle_sessions_board(state: &mut AppState, req: &Request) -> JsonValue {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let now = match request_now(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = match optional_class_filter(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let rows = match load_sessions(conn, class_id.as_deref()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let setup = load_sessions_setup(conn);

    let mut counts = [0usize; 4];
    let mut next_refresh: Option<NaiveDateTime> = None;
    for row in &rows {
        let status = row.status_at(now);
        if status == SessionStatus::Unscheduled && !setup.include_unscheduled_on_board {
            continue;
        }
        if let Some(idx) = SessionStatus::ALL.iter().position(|s| *s == status) {
            counts[idx] += 1;
        }
        if let Some(t) = row.next_transition_at(now) {
            next_refresh = Some(next_refresh.map_or(t, |cur| cur.min(t)));
        }
    }

    let mut by_status = Map::new();
    for (status, n) in SessionStatus::ALL.iter().zip(counts.iter()) {
        by_status.insert(status.as_str().to_string(), json!(n));
    }
    ok(
        &req.id,
        json!({
            "now": format_timestamp(&now),
            "classId": class_id,
            "total": counts.iter().sum::<usize>(),
            "counts": by_status,
            "nextRefreshAt": next_refresh.map(|t| format_timestamp(&t)),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<JsonValue> {
    match req.method.as_str() {
        "sessions.resolve" => Some(handle_sessions_resolve(state, req)),
        "sessions.list" => Some(handle_sessions_list(state, req)),
        "sessions.open" => Some(handle_sessions_open(state, req)),
        "sessions.create" => Some(handle_sessions_create(state, req)),
        "sessions.update" => Some(handle_sessions_update(state, req)),
        "sessions.delete" => Some(handle_sessions_delete(state, req)),
        "sessions.board" => Some(handle_sessions_board(state, req)),
        _ => None,
    }
}
