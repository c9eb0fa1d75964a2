mod db;
mod ipc;
mod status;
mod watch;

use std::env;
use std::io::{self, BufRead, Write};
use std::sync::mpsc;
use std::thread;

use ipc::Inbound;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging() {
    let debug_enabled = env::var("CLASSROOMD_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    // stdout is reserved for protocol lines.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn write_line(stdout: &mut io::Stdout, value: &serde_json::Value) {
    let _ = writeln!(
        stdout,
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{\"ok\":false}".to_string())
    );
    let _ = stdout.flush();
}

fn main() {
    init_logging();

    let (tx, rx) = mpsc::channel::<Inbound>();
    let reader_tx = tx.clone();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if reader_tx.send(Inbound::Line(line)).is_err() {
                return;
            }
        }
        let _ = reader_tx.send(Inbound::Eof);
    });

    let mut state = ipc::AppState::new(tx);
    let mut stdout = io::stdout();
    info!(version = env!("CARGO_PKG_VERSION"), "classroomd started");

    while let Ok(msg) = rx.recv() {
        match msg {
            Inbound::Line(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let req: ipc::Request = match serde_json::from_str(&line) {
                    Ok(v) => v,
                    Err(e) => {
                        // Can't reply without id.
                        warn!(error = %e, "dropping malformed request line");
                        write_line(
                            &mut stdout,
                            &serde_json::json!({
                                "ok": false,
                                "error": { "code": "bad_json", "message": e.to_string() }
                            }),
                        );
                        continue;
                    }
                };
                let resp = ipc::handle_request(&mut state, req);
                write_line(&mut stdout, &resp);
            }
            Inbound::Tick => {
                if let Some(ev) = ipc::handle_tick(&mut state) {
                    write_line(&mut stdout, &ev);
                }
            }
            Inbound::Eof => break,
        }
    }

    info!("stdin closed, shutting down");
}
