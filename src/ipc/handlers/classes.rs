use crate::db;
use crate::ipc::error::{db_err, db_table_err, HandlerErr};
use crate::ipc::helpers::{
    begin, class_role, commit, get_optional_str, get_patch_text, get_required_str,
    require_access, run, Access,
};
use crate::ipc::types::{AppState, Request};
use crate::model::Role;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::json;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_LEN: usize = 6;
const CODE_ATTEMPTS: usize = 16;

/// Dependency order: every table before the table it points at.
const CLASS_CASCADE: &[(&str, &str)] = &[
    (
        "student_sub_groups",
        "DELETE FROM student_sub_groups
         WHERE sub_group_id IN (SELECT sub_group_id FROM sub_groups WHERE class_id = ?)",
    ),
    ("sub_groups", "DELETE FROM sub_groups WHERE class_id = ?"),
    (
        "student_groups",
        "DELETE FROM student_groups
         WHERE group_id IN (SELECT group_id FROM class_groups WHERE class_id = ?)",
    ),
    ("class_groups", "DELETE FROM class_groups WHERE class_id = ?"),
    ("achievements", "DELETE FROM achievements WHERE class_id = ?"),
    ("points", "DELETE FROM points WHERE class_id = ?"),
    ("absent_dates", "DELETE FROM absent_dates WHERE class_id = ?"),
    (
        "student_assignments",
        "DELETE FROM student_assignments WHERE class_id = ?",
    ),
    ("assignments", "DELETE FROM assignments WHERE class_id = ?"),
    (
        "student_expectations",
        "DELETE FROM student_expectations WHERE class_id = ?",
    ),
    ("expectations", "DELETE FROM expectations WHERE class_id = ?"),
    ("topics", "DELETE FROM topics WHERE class_id = ?"),
    ("reward_items", "DELETE FROM reward_items WHERE class_id = ?"),
    ("behaviors", "DELETE FROM behaviors WHERE class_id = ?"),
    ("student_classes", "DELETE FROM student_classes WHERE class_id = ?"),
    ("teacher_classes", "DELETE FROM teacher_classes WHERE class_id = ?"),
    ("classes", "DELETE FROM classes WHERE class_id = ?"),
];

fn random_code() -> String {
    uuid::Uuid::new_v4().as_bytes()[..CODE_LEN]
        .iter()
        .map(|b| CODE_ALPHABET[*b as usize % CODE_ALPHABET.len()] as char)
        .collect()
}

fn unused_class_code(conn: &Connection) -> Result<String, HandlerErr> {
    for _ in 0..CODE_ATTEMPTS {
        let code = random_code();
        let taken = conn
            .query_row("SELECT 1 FROM classes WHERE class_code = ?", [&code], |r| {
                r.get::<_, i64>(0)
            })
            .optional()
            .map_err(db_err("db_query_failed"))?
            .is_some();
        if !taken {
            return Ok(code);
        }
    }
    Err(HandlerErr::new(
        "internal",
        "could not allocate a unique class code",
    ))
}

fn parse_completion(v: &serde_json::Value) -> Result<(bool, bool), HandlerErr> {
    let flag = |key: &str| -> Result<bool, HandlerErr> {
        match v.get(key) {
            None | Some(serde_json::Value::Null) => Ok(false),
            Some(b) => b
                .as_bool()
                .ok_or_else(|| HandlerErr::bad_params(format!("complete.{} must be a boolean", key))),
        }
    };
    if !v.is_object() {
        return Err(HandlerErr::bad_params("complete must be an object"));
    }
    Ok((flag("s1")?, flag("s2")?))
}

fn create_class(
    conn: &Connection,
    user: &str,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_str(params, "className")?;
    let language = get_optional_str(params, "classLanguage")?.unwrap_or_else(|| "en-US".into());
    let grade = get_optional_str(params, "classGrade")?;
    let year = get_optional_str(params, "classYear")?;
    let role = match get_optional_str(params, "role")? {
        None => Role::Primary,
        Some(r) => Role::parse(&r)
            .ok_or_else(|| HandlerErr::bad_params("role must be primary or assistant"))?,
    };
    let (s1, s2) = match params.get("complete") {
        None | Some(serde_json::Value::Null) => (false, false),
        Some(v) => parse_completion(v)?,
    };

    let tx = begin(conn)?;
    let class_id = db::new_id("class_");
    let code = unused_class_code(&tx)?;
    let now = db::now_ts();
    tx.execute(
        "INSERT INTO classes(class_id, class_name, class_language, class_grade, class_year,
                             class_code, complete_s1, complete_s2, created_date, updated_date)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![class_id, name, language, grade, year, code, s1, s2, now, now],
    )
    .map_err(db_table_err("db_insert_failed", "classes"))?;
    tx.execute(
        "INSERT INTO teacher_classes(assignment_id, user_id, class_id, role, assigned_date)
         VALUES(?, ?, ?, ?, ?)",
        (db::new_id("tc_"), user, &class_id, role.as_str(), &now),
    )
    .map_err(db_table_err("db_insert_failed", "teacher_classes"))?;
    commit(tx)?;

    tracing::info!(class_id = %class_id, user_id = user, "class created");
    Ok(json!({ "classId": class_id, "classCode": code }))
}

fn join_class(
    conn: &Connection,
    user: &str,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let code = get_required_str(params, "classCode")?.to_ascii_uppercase();
    let class_id: String = conn
        .query_row(
            "SELECT class_id FROM classes WHERE class_code = ?",
            [&code],
            |r| r.get(0),
        )
        .optional()
        .map_err(db_err("db_query_failed"))?
        .ok_or_else(|| HandlerErr::not_found("class"))?;

    if let Some(role) = class_role(conn, user, &class_id)? {
        return Ok(json!({ "classId": class_id, "role": role }));
    }
    conn.execute(
        "INSERT INTO teacher_classes(assignment_id, user_id, class_id, role, assigned_date)
         VALUES(?, ?, ?, ?, ?)",
        (
            db::new_id("tc_"),
            user,
            &class_id,
            Role::Assistant.as_str(),
            db::now_ts(),
        ),
    )
    .map_err(db_table_err("db_insert_failed", "teacher_classes"))?;
    tracing::info!(class_id = %class_id, user_id = user, "joined class as assistant");
    Ok(json!({ "classId": class_id, "role": Role::Assistant }))
}

fn update_class(
    conn: &Connection,
    user: &str,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    require_access(conn, user, &class_id, Access::Configure)?;

    let mut set_parts: Vec<&str> = Vec::new();
    let mut bind_values: Vec<Value> = Vec::new();
    for (key, column, nullable) in [
        ("className", "class_name = ?", false),
        ("classLanguage", "class_language = ?", false),
        ("classGrade", "class_grade = ?", true),
        ("classYear", "class_year = ?", true),
    ] {
        if let Some(v) = get_patch_text(params, key, nullable)? {
            set_parts.push(column);
            bind_values.push(v);
        }
    }
    if let Some(v) = params.get("complete").filter(|v| !v.is_null()) {
        let (s1, s2) = parse_completion(v)?;
        set_parts.push("complete_s1 = ?");
        bind_values.push(Value::Integer(s1 as i64));
        set_parts.push("complete_s2 = ?");
        bind_values.push(Value::Integer(s2 as i64));
    }
    if set_parts.is_empty() {
        return Err(HandlerErr::bad_params(
            "update must include at least one field",
        ));
    }
    set_parts.push("updated_date = ?");
    bind_values.push(Value::Text(db::now_ts()));

    let sql = format!(
        "UPDATE classes SET {} WHERE class_id = ?",
        set_parts.join(", ")
    );
    bind_values.push(Value::Text(class_id));
    let changed = conn
        .execute(&sql, params_from_iter(bind_values))
        .map_err(db_table_err("db_update_failed", "classes"))?;
    if changed == 0 {
        return Err(HandlerErr::not_found("class"));
    }
    Ok(json!({ "ok": true }))
}

fn remove_class(
    conn: &Connection,
    user: &str,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let role = require_access(conn, user, &class_id, Access::Use)?;

    if role == Role::Assistant {
        conn.execute(
            "DELETE FROM teacher_classes WHERE user_id = ? AND class_id = ?",
            (user, &class_id),
        )
        .map_err(db_table_err("db_delete_failed", "teacher_classes"))?;
        tracing::info!(class_id = %class_id, user_id = user, "left class");
        return Ok(json!({ "ok": true, "deleted": false }));
    }

    let tx = begin(conn)?;
    let enrolled: Vec<String> = {
        let mut stmt = tx
            .prepare("SELECT student_id FROM student_classes WHERE class_id = ?")
            .map_err(db_err("db_query_failed"))?;
        stmt.query_map([&class_id], |r| r.get(0))
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(db_err("db_query_failed"))?
    };
    for &(table, sql) in CLASS_CASCADE {
        tx.execute(sql, [&class_id])
            .map_err(db_table_err("db_delete_failed", table))?;
    }
    let mut students_removed = 0usize;
    for student_id in &enrolled {
        students_removed += tx
            .execute(
                "DELETE FROM students
                 WHERE student_id = ?1
                   AND NOT EXISTS (SELECT 1 FROM student_classes WHERE student_id = ?1)",
                [student_id],
            )
            .map_err(db_table_err("db_delete_failed", "students"))?;
    }
    commit(tx)?;

    tracing::info!(class_id = %class_id, students_removed, "class deleted");
    Ok(json!({ "ok": true, "deleted": true, "studentsRemoved": students_removed }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.create" => Some(run(state, req, create_class)),
        "classes.join" => Some(run(state, req, join_class)),
        "classes.update" => Some(run(state, req, update_class)),
        "classes.remove" => Some(run(state, req, remove_class)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_codes_use_the_unambiguous_alphabet() {
        for _ in 0..50 {
            let code = random_code();
            assert_eq!(code.len(), CODE_LEN);
            assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
            assert!(!code.contains('O') && !code.contains('0') && !code.contains('I'));
        }
    }

    #[test]
    fn completion_flags_default_to_false() {
        assert_eq!(
            parse_completion(&json!({ "s1": true })).expect("flags"),
            (true, false)
        );
        assert!(parse_completion(&json!({ "s1": "yes" })).is_err());
        assert!(parse_completion(&json!([true])).is_err());
    }
}
