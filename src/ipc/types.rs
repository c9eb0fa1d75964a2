use std::path::PathBuf;
use std::sync::mpsc::Sender;

use rusqlite::Connection;
use serde::Deserialize;

use crate::watch::{StatusWatcher, Ticker};

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Everything the main loop waits on. Both the stdin reader and the ticker
/// feed the same channel so only one thread touches state and stdout.
#[derive(Debug)]
pub enum Inbound {
    Line(String),
    Tick,
    Eof,
}

pub struct ActiveWatch {
    pub ticker: Ticker,
    pub watcher: StatusWatcher,
    pub class_id: Option<String>,
    pub interval_secs: u64,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub inbound: Sender<Inbound>,
    pub watch: Option<ActiveWatch>,
}

impl AppState {
    pub fn new(inbound: Sender<Inbound>) -> Self {
        Self {
            workspace: None,
            db: None,
            inbound,
            watch: None,
        }
    }
}
