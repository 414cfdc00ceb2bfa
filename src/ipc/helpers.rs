use crate::ipc::error::{db_err, err, ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::Role;
use rusqlite::{Connection, OptionalExtension, Transaction};

/// What the caller is about to do with a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Apply behaviors, redeem, take attendance, mark tasks.
    Use,
    /// Create, edit or delete class configuration.
    Configure,
}

pub fn caller(req: &Request) -> Result<&str, HandlerErr> {
    req.user_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::new("unauthenticated", "user not authenticated"))
}

/// Authenticate, then run `op` against the workspace connection.
pub fn run<F>(state: &mut AppState, req: &Request, op: F) -> serde_json::Value
where
    F: FnOnce(&Connection, &str, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
{
    let user = match caller(req) {
        Ok(u) => u,
        Err(e) => return e.response(&req.id),
    };
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match op(conn, user, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn begin(conn: &Connection) -> Result<Transaction<'_>, HandlerErr> {
    conn.unchecked_transaction().map_err(db_err("db_tx_failed"))
}

pub fn commit(tx: Transaction<'_>) -> Result<(), HandlerErr> {
    tx.commit().map_err(db_err("db_commit_failed"))
}

pub fn class_role(conn: &Connection, user_id: &str, class_id: &str) -> Result<Option<Role>, HandlerErr> {
    conn.query_row(
        "SELECT role FROM teacher_classes WHERE user_id = ? AND class_id = ?",
        (user_id, class_id),
        |r| r.get::<_, Role>(0),
    )
    .optional()
    .map_err(db_err("db_query_failed"))
}

pub fn require_access(
    conn: &Connection,
    user_id: &str,
    class_id: &str,
    access: Access,
) -> Result<Role, HandlerErr> {
    let Some(role) = class_role(conn, user_id, class_id)? else {
        return Err(HandlerErr::forbidden("not a teacher of this class"));
    };
    if access == Access::Configure && !role.can_configure() {
        return Err(HandlerErr::forbidden("assistants cannot change class setup"));
    }
    Ok(role)
}

/// Class that owns row `id` in `table`, looked up via `id_col`.
pub fn owning_class(
    conn: &Connection,
    table: &str,
    id_col: &str,
    id: &str,
    what: &str,
) -> Result<String, HandlerErr> {
    let sql = format!("SELECT class_id FROM {table} WHERE {id_col} = ?");
    conn.query_row(&sql, [id], |r| r.get::<_, Option<String>>(0))
        .optional()
        .map_err(db_err("db_query_failed"))?
        .flatten()
        .ok_or_else(|| HandlerErr::not_found(what))
}

pub fn is_enrolled(conn: &Connection, class_id: &str, student_id: &str) -> Result<bool, HandlerErr> {
    conn.query_row(
        "SELECT 1 FROM student_classes WHERE class_id = ? AND student_id = ?",
        (class_id, student_id),
        |r| r.get::<_, i64>(0),
    )
    .optional()
    .map(|v| v.is_some())
    .map_err(db_err("db_query_failed"))
}

/// Every id must be enrolled in the class; reports the first that is not.
pub fn require_enrolled(conn: &Connection, class_id: &str, student_ids: &[String]) -> Result<(), HandlerErr> {
    for sid in student_ids {
        if !is_enrolled(conn, class_id, sid)? {
            return Err(HandlerErr::bad_params(format!(
                "student {} is not enrolled in this class",
                sid
            )));
        }
    }
    Ok(())
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Absent, null and blank all read as `None`.
pub fn get_optional_str(params: &serde_json::Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => {
            let s = v
                .as_str()
                .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a string", key)))?;
            let s = s.trim();
            Ok(if s.is_empty() { None } else { Some(s.to_string()) })
        }
    }
}

pub fn get_optional_i64(params: &serde_json::Value, key: &str) -> Result<Option<i64>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an integer", key))),
    }
}

pub fn get_str_list(params: &serde_json::Value, key: &str) -> Result<Vec<String>, HandlerErr> {
    let Some(v) = params.get(key) else {
        return Ok(Vec::new());
    };
    if v.is_null() {
        return Ok(Vec::new());
    }
    let arr = v
        .as_array()
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an array of strings", key)))?;
    let mut out: Vec<String> = Vec::with_capacity(arr.len());
    for item in arr {
        let s = item
            .as_str()
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an array of strings", key)))?;
        if !out.iter().any(|x| x == s) {
            out.push(s.to_string());
        }
    }
    Ok(out)
}

/// Partial-update read of a text column: `None` when the key is absent,
/// `Some(Null)` when explicitly null and the column allows it.
pub fn get_patch_text(
    params: &serde_json::Value,
    key: &str,
    nullable: bool,
) -> Result<Option<rusqlite::types::Value>, HandlerErr> {
    use rusqlite::types::Value;
    match params.get(key) {
        None => Ok(None),
        Some(serde_json::Value::Null) if nullable => Ok(Some(Value::Null)),
        Some(v) => {
            let s = v.as_str().map(str::trim).unwrap_or_default();
            if s.is_empty() {
                if nullable && v.is_string() {
                    return Ok(Some(Value::Null));
                }
                return Err(HandlerErr::bad_params(format!("{} must be a non-empty string", key)));
            }
            Ok(Some(Value::Text(s.to_string())))
        }
    }
}

/// `quantity` defaults to 1 and must be positive.
pub fn get_quantity(params: &serde_json::Value) -> Result<i64, HandlerErr> {
    let q = get_optional_i64(params, "quantity")?.unwrap_or(1);
    if q <= 0 {
        return Err(HandlerErr::bad_params("quantity must be positive"));
    }
    Ok(q)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn str_list_dedupes_and_rejects_non_strings() {
        let p = json!({ "ids": ["a", "b", "a"], "bad": [1] });
        assert_eq!(get_str_list(&p, "ids").expect("ids"), vec!["a", "b"]);
        assert!(get_str_list(&p, "missing").expect("missing").is_empty());
        assert_eq!(get_str_list(&p, "bad").unwrap_err().code, "bad_params");
    }

    #[test]
    fn blank_strings_are_missing() {
        let p = json!({ "name": "  ", "alt": null, "n": "x" });
        assert_eq!(get_required_str(&p, "name").unwrap_err().code, "bad_params");
        assert_eq!(get_optional_str(&p, "alt").expect("alt"), None);
        assert_eq!(get_optional_str(&p, "name").expect("name"), None);
        assert!(get_optional_i64(&p, "n").is_err());
    }

    #[test]
    fn quantity_defaults_to_one() {
        assert_eq!(get_quantity(&json!({})).expect("default"), 1);
        assert_eq!(get_quantity(&json!({ "quantity": 3 })).expect("three"), 3);
        assert!(get_quantity(&json!({ "quantity": 0 })).is_err());
    }

    #[test]
    fn caller_requires_non_blank_identity() {
        let mut req = Request {
            id: "1".into(),
            method: "roster.load".into(),
            user_id: None,
            params: json!({}),
        };
        assert_eq!(caller(&req).unwrap_err().code, "unauthenticated");
        req.user_id = Some("   ".into());
        assert!(caller(&req).is_err());
        req.user_id = Some("user_1".into());
        assert_eq!(caller(&req).expect("caller"), "user_1");
    }
}
