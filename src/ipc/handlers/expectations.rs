use crate::db;
use crate::ipc::error::{db_table_err, HandlerErr};
use crate::ipc::helpers::{
    begin, commit, get_optional_i64, get_optional_str, get_required_str, is_enrolled,
    owning_class, require_access, run, Access,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;

fn create_expectation(
    conn: &Connection,
    user: &str,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let name = get_required_str(params, "name")?;
    let description = get_optional_str(params, "description")?;
    require_access(conn, user, &class_id, Access::Configure)?;

    let id = db::new_id("expectation_");
    let now = db::now_ts();
    conn.execute(
        "INSERT INTO expectations(id, user_id, class_id, name, description, created_date, updated_date)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (&id, user, &class_id, &name, &description, &now, &now),
    )
    .map_err(db_table_err("db_insert_failed", "expectations"))?;
    Ok(json!({ "expectationId": id }))
}

fn update_expectation(
    conn: &Connection,
    user: &str,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let expectation_id = get_required_str(params, "expectationId")?;
    let name = get_required_str(params, "name")?;
    let description = get_optional_str(params, "description")?;
    let class_id = owning_class(conn, "expectations", "id", &expectation_id, "expectation")?;
    require_access(conn, user, &class_id, Access::Configure)?;

    conn.execute(
        "UPDATE expectations SET name = ?, description = ?, updated_date = ? WHERE id = ?",
        (&name, &description, db::now_ts(), &expectation_id),
    )
    .map_err(db_table_err("db_update_failed", "expectations"))?;
    Ok(json!({ "ok": true }))
}

fn delete_expectation(
    conn: &Connection,
    user: &str,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let expectation_id = get_required_str(params, "expectationId")?;
    let class_id = owning_class(conn, "expectations", "id", &expectation_id, "expectation")?;
    require_access(conn, user, &class_id, Access::Configure)?;

    let tx = begin(conn)?;
    let values_removed = tx
        .execute(
            "DELETE FROM student_expectations WHERE expectation_id = ?",
            [&expectation_id],
        )
        .map_err(db_table_err("db_delete_failed", "student_expectations"))?;
    tx.execute("DELETE FROM expectations WHERE id = ?", [&expectation_id])
        .map_err(db_table_err("db_delete_failed", "expectations"))?;
    commit(tx)?;
    Ok(json!({ "ok": true, "valuesRemoved": values_removed }))
}

fn set_student_value(
    conn: &Connection,
    user: &str,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let expectation_id = get_required_str(params, "expectationId")?;
    let student_id = get_required_str(params, "studentId")?;
    let value = get_optional_str(params, "value")?;
    let number = get_optional_i64(params, "number")?;
    let class_id = owning_class(conn, "expectations", "id", &expectation_id, "expectation")?;
    require_access(conn, user, &class_id, Access::Use)?;
    if !is_enrolled(conn, &class_id, &student_id)? {
        return Err(HandlerErr::bad_params("student is not enrolled in this class"));
    }

    let now = db::now_ts();
    conn.execute(
        "INSERT INTO student_expectations(id, user_id, class_id, student_id, expectation_id,
                                          value, number, created_date, updated_date)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(expectation_id, student_id) DO UPDATE SET
           value = excluded.value,
           number = excluded.number,
           user_id = excluded.user_id,
           updated_date = excluded.updated_date",
        rusqlite::params![
            db::new_id("se_"),
            user,
            class_id,
            student_id,
            expectation_id,
            value,
            number,
            now,
            now
        ],
    )
    .map_err(db_table_err("db_insert_failed", "student_expectations"))?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "expectations.create" => Some(run(state, req, create_expectation)),
        "expectations.update" => Some(run(state, req, update_expectation)),
        "expectations.delete" => Some(run(state, req, delete_expectation)),
        "expectations.setStudentValue" => Some(run(state, req, set_student_value)),
        _ => None,
    }
}
