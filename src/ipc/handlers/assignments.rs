use crate::db;
use crate::ipc::error::{db_table_err, HandlerErr};
use crate::ipc::helpers::{
    get_optional_str, get_required_str, is_enrolled, owning_class, require_access, run, Access,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;

fn create_assignment(
    conn: &Connection,
    user: &str,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let name = get_required_str(params, "name")?;
    require_access(conn, user, &class_id, Access::Configure)?;

    let id = db::new_id("assignment_");
    let now = db::now_ts();
    conn.execute(
        "INSERT INTO assignments(id, user_id, class_id, name, description, data, due_date,
                                 topic, working_date, created_date, updated_date)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            id,
            user,
            class_id,
            name,
            get_optional_str(params, "description")?,
            get_optional_str(params, "data")?,
            get_optional_str(params, "dueDate")?,
            get_optional_str(params, "topic")?,
            get_optional_str(params, "workingDate")?,
            now,
            now
        ],
    )
    .map_err(db_table_err("db_insert_failed", "assignments"))?;
    Ok(json!({ "assignmentId": id }))
}

fn set_complete(
    conn: &Connection,
    user: &str,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let assignment_id = get_required_str(params, "assignmentId")?;
    let student_id = get_required_str(params, "studentId")?;
    let complete = params
        .get("complete")
        .and_then(|v| v.as_bool())
        .ok_or_else(|| HandlerErr::bad_params("complete must be a boolean"))?;
    let class_id = owning_class(conn, "assignments", "id", &assignment_id, "assignment")?;
    require_access(conn, user, &class_id, Access::Use)?;
    if !is_enrolled(conn, &class_id, &student_id)? {
        return Err(HandlerErr::bad_params("student is not enrolled in this class"));
    }

    let now = db::now_ts();
    let completed_ts = complete.then(|| now.clone());
    conn.execute(
        "INSERT INTO student_assignments(id, user_id, class_id, student_id, assignment_id,
                                         complete, completed_ts, created_date, updated_date)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(assignment_id, student_id) DO UPDATE SET
           complete = excluded.complete,
           completed_ts = excluded.completed_ts,
           user_id = excluded.user_id,
           updated_date = excluded.updated_date",
        rusqlite::params![
            db::new_id("sa_"),
            user,
            class_id,
            student_id,
            assignment_id,
            complete,
            completed_ts,
            now,
            now
        ],
    )
    .map_err(db_table_err("db_insert_failed", "student_assignments"))?;
    Ok(json!({ "complete": complete, "completedTs": completed_ts }))
}

fn create_topic(
    conn: &Connection,
    user: &str,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let name = get_required_str(params, "name")?;
    require_access(conn, user, &class_id, Access::Configure)?;

    let id = db::new_id("topic_");
    let now = db::now_ts();
    conn.execute(
        "INSERT INTO topics(id, user_id, class_id, name, created_date, updated_date)
         VALUES(?, ?, ?, ?, ?, ?)",
        (&id, user, &class_id, &name, &now, &now),
    )
    .map_err(db_table_err("db_insert_failed", "topics"))?;
    Ok(json!({ "topicId": id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "assignments.create" => Some(run(state, req, create_assignment)),
        "assignments.setComplete" => Some(run(state, req, set_complete)),
        "topics.create" => Some(run(state, req, create_topic)),
        _ => None,
    }
}
