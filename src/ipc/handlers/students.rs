use crate::db;
use crate::ipc::error::{db_err, db_table_err, HandlerErr};
use crate::ipc::helpers::{
    begin, commit, get_optional_i64, get_optional_str, get_patch_text, get_required_str,
    is_enrolled, require_access, run, Access,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Role, Sex};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::json;

/// Rows holding one student's data inside one class, cleared before the enrollment itself.
const STUDENT_CLASS_ROWS: &[(&str, &str)] = &[
    (
        "student_sub_groups",
        "DELETE FROM student_sub_groups
         WHERE student_id = ?1
           AND sub_group_id IN (SELECT sub_group_id FROM sub_groups WHERE class_id = ?2)",
    ),
    (
        "student_groups",
        "DELETE FROM student_groups
         WHERE student_id = ?1
           AND group_id IN (SELECT group_id FROM class_groups WHERE class_id = ?2)",
    ),
    (
        "points",
        "DELETE FROM points WHERE student_id = ?1 AND class_id = ?2",
    ),
    (
        "absent_dates",
        "DELETE FROM absent_dates WHERE student_id = ?1 AND class_id = ?2",
    ),
    (
        "student_assignments",
        "DELETE FROM student_assignments WHERE student_id = ?1 AND class_id = ?2",
    ),
    (
        "student_expectations",
        "DELETE FROM student_expectations WHERE student_id = ?1 AND class_id = ?2",
    ),
    (
        "student_classes",
        "DELETE FROM student_classes WHERE student_id = ?1 AND class_id = ?2",
    ),
];

#[derive(Debug, PartialEq)]
struct NewStudent {
    first: String,
    last: String,
    name_en: String,
    name_alt: Option<String>,
    grade: Option<String>,
    reading_level: Option<String>,
    sex: Option<Sex>,
    number: Option<i64>,
    email: Option<String>,
}

fn parse_sex(raw: Option<String>) -> Result<Option<Sex>, HandlerErr> {
    match raw {
        None => Ok(None),
        Some(s) => Sex::parse(&s.to_ascii_lowercase())
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params("sex must be male or female")),
    }
}

fn display_name(first: &str, last: &str) -> String {
    format!("{} {}", first, last).trim().to_string()
}

/// `Ok(None)` for rows without a first name; those are skipped, not rejected.
fn parse_new_student(v: &serde_json::Value) -> Result<Option<NewStudent>, HandlerErr> {
    if !v.is_object() {
        return Err(HandlerErr::bad_params("students entries must be objects"));
    }
    let Some(first) = get_optional_str(v, "firstName")? else {
        return Ok(None);
    };
    let last = get_optional_str(v, "lastName")?.unwrap_or_default();
    let name_en = get_optional_str(v, "nameEn")?.unwrap_or_else(|| display_name(&first, &last));
    Ok(Some(NewStudent {
        name_en,
        name_alt: get_optional_str(v, "nameAlt")?,
        grade: get_optional_str(v, "grade")?,
        reading_level: get_optional_str(v, "readingLevel")?,
        sex: parse_sex(get_optional_str(v, "sex")?)?,
        number: get_optional_i64(v, "number")?,
        email: get_optional_str(v, "email")?,
        first,
        last,
    }))
}

fn add_students(
    conn: &Connection,
    user: &str,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    require_access(conn, user, &class_id, Access::Configure)?;
    let Some(entries) = params.get("students").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing students"));
    };

    let mut parsed: Vec<NewStudent> = Vec::with_capacity(entries.len());
    let mut skipped = 0usize;
    for entry in entries {
        match parse_new_student(entry)? {
            Some(s) => parsed.push(s),
            None => skipped += 1,
        }
    }

    let tx = begin(conn)?;
    let now = db::now_ts();
    let mut student_ids: Vec<String> = Vec::with_capacity(parsed.len());
    for s in &parsed {
        let student_id = db::new_id("student_");
        tx.execute(
            "INSERT INTO students(student_id, student_name_en, student_name_first_en,
                                  student_name_last_en, student_name_alt, student_reading_level,
                                  student_grade, student_sex, student_number, student_email,
                                  created_date, updated_date)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            rusqlite::params![
                student_id,
                s.name_en,
                s.first,
                s.last,
                s.name_alt,
                s.reading_level,
                s.grade,
                s.sex.map(Sex::as_str),
                s.number,
                s.email,
                now,
                now
            ],
        )
        .map_err(db_table_err("db_insert_failed", "students"))?;
        tx.execute(
            "INSERT INTO student_classes(enrollment_id, student_id, class_id, enrollment_date)
             VALUES(?, ?, ?, ?)",
            (db::new_id("enroll_"), &student_id, &class_id, &now),
        )
        .map_err(db_table_err("db_insert_failed", "student_classes"))?;
        student_ids.push(student_id);
    }
    commit(tx)?;

    if skipped > 0 {
        tracing::warn!(class_id = %class_id, skipped, "student rows without a first name skipped");
    }
    Ok(json!({
        "added": student_ids.len(),
        "skipped": skipped,
        "studentIds": student_ids,
    }))
}

/// Edits are allowed for a primary teacher of any class the student is enrolled in.
fn require_student_owner(conn: &Connection, user: &str, student_id: &str) -> Result<(), HandlerErr> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM students WHERE student_id = ?",
            [student_id],
            |r| r.get::<_, i64>(0),
        )
        .optional()
        .map_err(db_err("db_query_failed"))?
        .is_some();
    if !exists {
        return Err(HandlerErr::not_found("student"));
    }
    let owns = conn
        .query_row(
            "SELECT 1
             FROM student_classes sc
             JOIN teacher_classes tc ON tc.class_id = sc.class_id
             WHERE sc.student_id = ? AND tc.user_id = ? AND tc.role = ?
             LIMIT 1",
            (student_id, user, Role::Primary.as_str()),
            |r| r.get::<_, i64>(0),
        )
        .optional()
        .map_err(db_err("db_query_failed"))?
        .is_some();
    if !owns {
        return Err(HandlerErr::forbidden(
            "only a primary teacher of the student's class can edit it",
        ));
    }
    Ok(())
}

fn update_student(
    conn: &Connection,
    user: &str,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    require_student_owner(conn, user, &student_id)?;

    let mut set_parts: Vec<&str> = Vec::new();
    let mut bind_values: Vec<Value> = Vec::new();
    for (key, column, nullable) in [
        ("firstName", "student_name_first_en = ?", false),
        ("lastName", "student_name_last_en = ?", true),
        ("nameEn", "student_name_en = ?", false),
        ("nameAlt", "student_name_alt = ?", true),
        ("grade", "student_grade = ?", true),
        ("readingLevel", "student_reading_level = ?", true),
        ("email", "student_email = ?", true),
    ] {
        if let Some(v) = get_patch_text(params, key, nullable)? {
            set_parts.push(column);
            // The last name column is NOT NULL; clearing it stores "".
            let v = match (key, v) {
                ("lastName", Value::Null) => Value::Text(String::new()),
                (_, v) => v,
            };
            bind_values.push(v);
        }
    }
    if let Some(v) = params.get("sex") {
        set_parts.push("student_sex = ?");
        let raw = if v.is_null() { None } else { get_optional_str(params, "sex")? };
        bind_values.push(match parse_sex(raw)? {
            Some(sex) => Value::Text(sex.as_str().to_string()),
            None => Value::Null,
        });
    }
    if params.get("number").is_some() {
        set_parts.push("student_number = ?");
        bind_values.push(match get_optional_i64(params, "number")? {
            Some(n) => Value::Integer(n),
            None => Value::Null,
        });
    }
    if set_parts.is_empty() {
        return Err(HandlerErr::bad_params(
            "update must include at least one field",
        ));
    }
    set_parts.push("updated_date = ?");
    bind_values.push(Value::Text(db::now_ts()));
    bind_values.push(Value::Text(student_id.clone()));

    let renamed = (params.get("firstName").is_some() || params.get("lastName").is_some())
        && params.get("nameEn").is_none();

    let tx = begin(conn)?;
    let sql = format!(
        "UPDATE students SET {} WHERE student_id = ?",
        set_parts.join(", ")
    );
    tx.execute(&sql, params_from_iter(bind_values))
        .map_err(db_table_err("db_update_failed", "students"))?;
    if renamed {
        tx.execute(
            "UPDATE students
             SET student_name_en = TRIM(student_name_first_en || ' ' || student_name_last_en)
             WHERE student_id = ?",
            [&student_id],
        )
        .map_err(db_table_err("db_update_failed", "students"))?;
    }
    commit(tx)?;
    Ok(json!({ "ok": true }))
}

fn remove_student(
    conn: &Connection,
    user: &str,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let student_id = get_required_str(params, "studentId")?;
    require_access(conn, user, &class_id, Access::Configure)?;
    if !is_enrolled(conn, &class_id, &student_id)? {
        return Err(HandlerErr::not_found("enrollment"));
    }

    let tx = begin(conn)?;
    for &(table, sql) in STUDENT_CLASS_ROWS {
        tx.execute(sql, (&student_id, &class_id))
            .map_err(db_table_err("db_delete_failed", table))?;
    }
    let student_deleted = tx
        .execute(
            "DELETE FROM students
             WHERE student_id = ?1
               AND NOT EXISTS (SELECT 1 FROM student_classes WHERE student_id = ?1)",
            [&student_id],
        )
        .map_err(db_table_err("db_delete_failed", "students"))?
        > 0;
    commit(tx)?;

    tracing::info!(class_id = %class_id, student_id = %student_id, student_deleted, "student removed from class");
    Ok(json!({ "ok": true, "studentDeleted": student_deleted }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.add" => Some(run(state, req, add_students)),
        "students.update" => Some(run(state, req, update_student)),
        "students.remove" => Some(run(state, req, remove_student)),
        _ => None,
    }
}
