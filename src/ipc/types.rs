use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

/// One JSON-lines request from the host process.
#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Daemon state between requests. Every scoring method needs a selected
/// workspace; until then only `health` and `workspace.select` succeed.
#[derive(Default)]
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
}
