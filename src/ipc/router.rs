use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;

type Family = fn(&mut AppState, &Request) -> Option<serde_json::Value>;

const FAMILIES: &[Family] = &[
    handlers::core::try_handle,
    handlers::roster::try_handle,
    handlers::classes::try_handle,
    handlers::students::try_handle,
    handlers::groups::try_handle,
    handlers::behaviors::try_handle,
    handlers::rewards::try_handle,
    handlers::points::try_handle,
    handlers::attendance::try_handle,
    handlers::assignments::try_handle,
    handlers::expectations::try_handle,
];

/// Methods that never write; everything else invalidates cached rosters on success.
fn is_read_only(method: &str) -> bool {
    matches!(method, "health" | "roster.load" | "attendance.day")
}

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    for family in FAMILIES {
        if let Some(resp) = family(state, &req) {
            let succeeded = resp.get("ok").and_then(|v| v.as_bool()) == Some(true);
            if succeeded && !is_read_only(&req.method) {
                state.roster_cache.clear();
            }
            tracing::debug!(method = %req.method, ok = succeeded, "request handled");
            return resp;
        }
    }

    tracing::warn!(method = %req.method, "unknown method");
    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
