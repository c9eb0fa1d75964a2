mod test_support;

use serde_json::json;
use std::io::Write;
use test_support::{read_reply, request, request_err, request_ok, spawn_sidecar, temp_dir};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("classroomd-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health.get("workspacePath").map(|v| v.is_null()).unwrap_or(false));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert!(workspace.join("classroom.sqlite3").is_file());

    for (id, method) in [
        ("3", "classes.list"),
        ("4", "sessions.list"),
        ("5", "sessions.board"),
        ("6", "setup.get"),
        ("7", "sessions.resolve"),
        ("8", "sessions.watch.stop"),
    ] {
        let value = request(&mut stdin, &mut reader, id, method, json!({}));
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(true),
            "{} failed: {}",
            method,
            value
        );
    }

    let code = request_err(&mut stdin, &mut reader, "9", "students.list", json!({}));
    assert_eq!(code, "not_implemented");

    let code = request_err(&mut stdin, &mut reader, "10", "workspace.select", json!({}));
    assert_eq!(code, "bad_params");

    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush");
    let value = read_reply(&mut reader);
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("bad_json")
    );

    drop(stdin);
    let status = child.wait().expect("wait for sidecar");
    assert!(status.success());
}
