use crate::db;
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::{caller, get_optional_str};
use crate::ipc::types::{AppState, Request};
use crate::roster::{self, RosterError};
use serde_json::json;

const INTERNAL_MESSAGE: &str = "Unable to fetch classes due to an internal error.";

fn not_modified_or(
    if_none_match: Option<&str>,
    classes: serde_json::Value,
    fingerprint: String,
) -> serde_json::Value {
    if if_none_match == Some(fingerprint.as_str()) {
        json!({ "notModified": true, "fingerprint": fingerprint })
    } else {
        json!({ "classes": classes, "fingerprint": fingerprint })
    }
}

fn handle_roster_load(state: &mut AppState, req: &Request) -> serde_json::Value {
    let teacher_id = match caller(req) {
        Ok(v) => v.to_string(),
        Err(e) => return e.response(&req.id),
    };
    let Some(workspace) = state.workspace.clone() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let if_none_match = match get_optional_str(&req.params, "ifNoneMatch") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    if let Some(hit) = state.roster_cache.get(&teacher_id) {
        tracing::debug!(teacher_id = %teacher_id, "roster served from cache");
        return ok(
            &req.id,
            not_modified_or(
                if_none_match.as_deref(),
                hit.classes.clone(),
                hit.fingerprint.clone(),
            ),
        );
    }

    let classes = match roster::load_roster(&db::db_path(&workspace), &teacher_id) {
        Ok(v) => v,
        Err(RosterError::Unauthenticated) => {
            return HandlerErr::new("unauthenticated", "user not authenticated").response(&req.id)
        }
        Err(RosterError::Upstream(e)) => {
            tracing::error!(teacher_id = %teacher_id, error = %format!("{e:#}"), "roster load failed");
            return err(&req.id, "internal", INTERNAL_MESSAGE, None);
        }
    };

    let serialized = match serde_json::to_vec(&classes) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!(error = %e, "roster serialization failed");
            return err(&req.id, "internal", INTERNAL_MESSAGE, None);
        }
    };
    let value = match serde_json::from_slice::<serde_json::Value>(&serialized) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!(error = %e, "roster serialization failed");
            return err(&req.id, "internal", INTERNAL_MESSAGE, None);
        }
    };
    let fingerprint = roster::fingerprint(&serialized);
    state
        .roster_cache
        .put(&teacher_id, value.clone(), fingerprint.clone());

    ok(
        &req.id,
        not_modified_or(if_none_match.as_deref(), value, fingerprint),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "roster.load" => Some(handle_roster_load(state, req)),
        _ => None,
    }
}
