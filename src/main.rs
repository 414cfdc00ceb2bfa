mod config;
mod db;
mod ipc;
mod logging;
mod model;
mod roster;

use std::io::{self, BufRead, Write};

fn main() {
    let cfg = config::Config::from_env();
    logging::init(&cfg.log_filter);
    for w in &cfg.warnings {
        tracing::warn!("{w}");
    }

    let mut state = ipc::AppState {
        workspace: None,
        db: None,
        roster_cache: ipc::RosterCache::new(cfg.roster_ttl),
    };
    if let Some(path) = &cfg.workspace {
        match db::open_db(path) {
            Ok(conn) => {
                state.workspace = Some(path.clone());
                state.db = Some(conn);
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %format!("{e:#}"), "startup workspace not opened")
            }
        }
    }
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        roster_ttl_secs = cfg.roster_ttl.as_secs(),
        "classpointsd ready"
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "stdin read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}
