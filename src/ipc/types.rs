use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use super::cache::RosterCache;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    /// Caller identity as resolved by the host's auth provider.
    #[serde(default, rename = "userId")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub roster_cache: RosterCache,
}
