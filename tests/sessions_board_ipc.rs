mod test_support;

use serde_json::json;
use test_support::{
    create_class, create_session, request_err, request_ok, select_workspace, spawn_sidecar,
    str_field,
};

fn count(board: &serde_json::Value, status: &str) -> i64 {
    board
        .get("counts")
        .and_then(|c| c.get(status))
        .and_then(|v| v.as_i64())
        .unwrap_or(-1)
}

#[test]
fn board_counts_and_next_refresh() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = select_workspace(&mut stdin, &mut reader, "classroomd-board");
    let class_id = create_class(&mut stdin, &mut reader, "Grade 10 Math");
    let other_class = create_class(&mut stdin, &mut reader, "Grade 11 Math");

    for (title, date, start, end) in [
        ("Yesterday", "2024-02-29", "09:00", "10:00"),
        ("Now", "2024-03-01", "09:00", "10:00"),
        ("Later", "2024-03-01", "11:00", "12:00"),
        ("Tomorrow", "2024-03-02", "08:00", "09:00"),
    ] {
        let _ = create_session(
            &mut stdin,
            &mut reader,
            &class_id,
            json!({ "title": title, "date": date, "startTime": start, "endTime": end }),
        );
    }
    let _ = create_session(&mut stdin, &mut reader, &class_id, json!({ "title": "Someday" }));
    let _ = create_session(
        &mut stdin,
        &mut reader,
        &other_class,
        json!({ "title": "Elsewhere", "date": "2024-03-01", "startTime": "09:05", "endTime": "09:10" }),
    );

    let board = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "sessions.board",
        json!({ "classId": class_id, "now": "2024-03-01T09:30" }),
    );
    assert_eq!(count(&board, "finished"), 1);
    assert_eq!(count(&board, "inProgress"), 1);
    assert_eq!(count(&board, "upcoming"), 2);
    assert_eq!(count(&board, "unscheduled"), 1);
    assert_eq!(board.get("total").and_then(|v| v.as_i64()), Some(5));
    // "Now" ends first: 10:00 inclusive, flips at 10:01.
    assert_eq!(str_field(&board, "nextRefreshAt"), Some("2024-03-01T10:01:00"));

    let all = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "sessions.board",
        json!({ "now": "2024-03-01T09:07" }),
    );
    assert_eq!(all.get("total").and_then(|v| v.as_i64()), Some(6));
    assert_eq!(count(&all, "inProgress"), 2);
    assert_eq!(str_field(&all, "nextRefreshAt"), Some("2024-03-01T09:11:00"));

    let done = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "sessions.board",
        json!({ "classId": class_id, "now": "2024-03-05T00:00" }),
    );
    assert_eq!(count(&done, "finished"), 4);
    assert!(done.get("nextRefreshAt").map(|v| v.is_null()).unwrap_or(false));
}

#[test]
fn board_can_hide_unscheduled() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = select_workspace(&mut stdin, &mut reader, "classroomd-board-hide");
    let class_id = create_class(&mut stdin, &mut reader, "Music");
    let _ = create_session(&mut stdin, &mut reader, &class_id, json!({ "title": "TBD" }));
    let _ = create_session(
        &mut stdin,
        &mut reader,
        &class_id,
        json!({ "title": "Choir", "date": "2024-03-01", "startTime": "09:00", "endTime": "10:00" }),
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "setup.update",
        json!({ "section": "sessions", "patch": { "includeUnscheduledOnBoard": false } }),
    );
    let board = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "sessions.board",
        json!({ "now": "2024-02-01T12:00" }),
    );
    assert_eq!(board.get("total").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(count(&board, "unscheduled"), 0);
    assert_eq!(count(&board, "upcoming"), 1);
}

#[test]
fn board_unknown_class_is_not_found() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = select_workspace(&mut stdin, &mut reader, "classroomd-board-missing");
    let code = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "sessions.board",
        json!({ "classId": "nope" }),
    );
    assert_eq!(code, "not_found");
}
