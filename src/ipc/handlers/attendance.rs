use crate::db;
use crate::ipc::error::{db_err, db_table_err, HandlerErr};
use crate::ipc::helpers::{begin, commit, get_required_str, get_str_list, require_access, run, Access};
use crate::ipc::types::{AppState, Request};
use crate::model::attendance_of;
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::json;
use std::collections::BTreeSet;

fn parse_day(params: &serde_json::Value) -> Result<String, HandlerErr> {
    let raw = get_required_str(params, "date")?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .map_err(|_| HandlerErr::bad_params("date must be YYYY-MM-DD"))
}

fn enrolled_students(conn: &Connection, class_id: &str) -> Result<Vec<String>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT sc.student_id
             FROM student_classes sc
             JOIN students s ON s.student_id = sc.student_id
             WHERE sc.class_id = ?
             ORDER BY s.student_name_en, sc.student_id",
        )
        .map_err(db_err("db_query_failed"))?;
    stmt.query_map([class_id], |r| r.get(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err("db_query_failed"))
}

fn absent_on(conn: &Connection, class_id: &str, date: &str) -> Result<BTreeSet<String>, HandlerErr> {
    let mut stmt = conn
        .prepare("SELECT student_id FROM absent_dates WHERE class_id = ? AND date = ?")
        .map_err(db_err("db_query_failed"))?;
    stmt.query_map((class_id, date), |r| r.get(0))
        .and_then(|it| it.collect::<Result<BTreeSet<_>, _>>())
        .map_err(db_err("db_query_failed"))
}

#[derive(Debug, Default, PartialEq)]
struct AttendanceDiff {
    mark_absent: Vec<String>,
    clear: Vec<String>,
}

/// Rows to add and drop so that, within `scope`, exactly `absent` are recorded.
/// Nothing outside `scope` is touched.
fn diff_absences(
    scope: &BTreeSet<String>,
    absent: &BTreeSet<String>,
    recorded: &BTreeSet<String>,
) -> AttendanceDiff {
    AttendanceDiff {
        mark_absent: absent
            .iter()
            .filter(|s| scope.contains(*s) && !recorded.contains(*s))
            .cloned()
            .collect(),
        clear: recorded
            .iter()
            .filter(|s| scope.contains(*s) && !absent.contains(*s))
            .cloned()
            .collect(),
    }
}

fn save_attendance(
    conn: &Connection,
    user: &str,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let date = parse_day(params)?;
    let requested_absent = get_str_list(params, "absentStudentIds")?;
    require_access(conn, user, &class_id, Access::Use)?;

    let enrolled: BTreeSet<String> = enrolled_students(conn, &class_id)?.into_iter().collect();
    // A missing or empty subset means the whole class.
    let subset = get_str_list(params, "studentIds")?;
    let scope: BTreeSet<String> = if subset.is_empty() {
        enrolled
    } else {
        subset.into_iter().filter(|s| enrolled.contains(s)).collect()
    };
    let absent: BTreeSet<String> = requested_absent
        .into_iter()
        .filter(|s| scope.contains(s))
        .collect();
    let recorded = absent_on(conn, &class_id, &date)?;
    let diff = diff_absences(&scope, &absent, &recorded);

    let tx = begin(conn)?;
    let now = db::now_ts();
    for student_id in &diff.mark_absent {
        tx.execute(
            "INSERT INTO absent_dates(id, user_id, class_id, student_id, date, created_date, updated_date)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            (db::new_id("absent_"), user, &class_id, student_id, &date, &now, &now),
        )
        .map_err(db_table_err("db_insert_failed", "absent_dates"))?;
    }
    for student_id in &diff.clear {
        tx.execute(
            "DELETE FROM absent_dates WHERE class_id = ? AND student_id = ? AND date = ?",
            (&class_id, student_id, &date),
        )
        .map_err(db_table_err("db_delete_failed", "absent_dates"))?;
    }
    commit(tx)?;

    Ok(json!({
        "date": date,
        "added": diff.mark_absent.len(),
        "removed": diff.clear.len(),
    }))
}

fn attendance_day(
    conn: &Connection,
    user: &str,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let date = parse_day(params)?;
    require_access(conn, user, &class_id, Access::Use)?;

    let absent = absent_on(conn, &class_id, &date)?;
    let students: Vec<serde_json::Value> = enrolled_students(conn, &class_id)?
        .into_iter()
        .map(|student_id| {
            let status = attendance_of(&absent, &student_id);
            json!({ "studentId": student_id, "status": status })
        })
        .collect();
    Ok(json!({ "date": date, "students": students }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.save" => Some(run(state, req, save_attendance)),
        "attendance.day" => Some(run(state, req, attendance_day)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn diff_only_touches_changed_students() {
        let d = diff_absences(&set(&["a", "b", "c"]), &set(&["a", "b"]), &set(&["b", "c"]));
        assert_eq!(d.mark_absent, vec!["a".to_string()]);
        assert_eq!(d.clear, vec!["c".to_string()]);
    }

    #[test]
    fn records_outside_scope_are_kept() {
        let d = diff_absences(&set(&["a"]), &set(&[]), &set(&["a", "z"]));
        assert_eq!(d.clear, vec!["a".to_string()]);
        assert!(d.mark_absent.is_empty());
    }

    #[test]
    fn absences_outside_scope_are_not_written() {
        let d = diff_absences(&set(&["a"]), &set(&["a", "b"]), &set(&[]));
        assert_eq!(d.mark_absent, vec!["a".to_string()]);
        assert!(d.clear.is_empty());
    }

    #[test]
    fn dates_must_be_calendar_days() {
        assert_eq!(parse_day(&json!({ "date": "2024-03-01" })).expect("day"), "2024-03-01");
        assert!(parse_day(&json!({ "date": "2024-02-30" })).is_err());
        assert!(parse_day(&json!({ "date": "03/01/2024" })).is_err());
    }
}
