use crate::db;
use crate::ipc::error::{db_table_err, HandlerErr};
use crate::ipc::helpers::{
    begin, commit, get_required_str, get_str_list, owning_class, require_access,
    require_enrolled, run, Access,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;

/// The two membership tables share a shape; only names differ.
#[derive(Clone, Copy)]
struct Membership {
    table: &'static str,
    owner_col: &'static str,
}

const GROUP_MEMBERS: Membership = Membership {
    table: "student_groups",
    owner_col: "group_id",
};
const SUB_GROUP_MEMBERS: Membership = Membership {
    table: "student_sub_groups",
    owner_col: "sub_group_id",
};

impl Membership {
    fn replace(
        self,
        conn: &Connection,
        owner_id: &str,
        student_ids: &[String],
        now: &str,
    ) -> Result<(), HandlerErr> {
        conn.execute(
            &format!("DELETE FROM {} WHERE {} = ?", self.table, self.owner_col),
            [owner_id],
        )
        .map_err(db_table_err("db_delete_failed", self.table))?;
        let insert = format!(
            "INSERT INTO {}(enrollment_id, {}, student_id, enrollment_date) VALUES(?, ?, ?, ?)",
            self.table, self.owner_col
        );
        for student_id in student_ids {
            conn.execute(&insert, (db::new_id("member_"), owner_id, student_id, now))
                .map_err(db_table_err("db_insert_failed", self.table))?;
        }
        Ok(())
    }
}

fn create_group(
    conn: &Connection,
    user: &str,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let name = get_required_str(params, "groupName")?;
    let student_ids = get_str_list(params, "studentIds")?;
    require_access(conn, user, &class_id, Access::Configure)?;
    require_enrolled(conn, &class_id, &student_ids)?;

    let tx = begin(conn)?;
    let group_id = db::new_id("group_");
    let now = db::now_ts();
    tx.execute(
        "INSERT INTO class_groups(group_id, group_name, class_id, created_date, updated_date)
         VALUES(?, ?, ?, ?, ?)",
        (&group_id, &name, &class_id, &now, &now),
    )
    .map_err(db_table_err("db_insert_failed", "class_groups"))?;
    GROUP_MEMBERS.replace(&tx, &group_id, &student_ids, &now)?;
    commit(tx)?;
    Ok(json!({ "groupId": group_id }))
}

fn save_group(
    conn: &Connection,
    user: &str,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let group_id = get_required_str(params, "groupId")?;
    let name = get_required_str(params, "groupName")?;
    let student_ids = get_str_list(params, "studentIds")?;
    let class_id = owning_class(conn, "class_groups", "group_id", &group_id, "group")?;
    require_access(conn, user, &class_id, Access::Configure)?;
    require_enrolled(conn, &class_id, &student_ids)?;

    let tx = begin(conn)?;
    let now = db::now_ts();
    tx.execute(
        "UPDATE class_groups SET group_name = ?, updated_date = ? WHERE group_id = ?",
        (&name, &now, &group_id),
    )
    .map_err(db_table_err("db_update_failed", "class_groups"))?;
    GROUP_MEMBERS.replace(&tx, &group_id, &student_ids, &now)?;
    commit(tx)?;
    Ok(json!({ "groupId": group_id }))
}

fn delete_group(
    conn: &Connection,
    user: &str,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let group_id = get_required_str(params, "groupId")?;
    let class_id = owning_class(conn, "class_groups", "group_id", &group_id, "group")?;
    require_access(conn, user, &class_id, Access::Configure)?;

    let tx = begin(conn)?;
    for (table, sql) in [
        (
            "student_sub_groups",
            "DELETE FROM student_sub_groups
             WHERE sub_group_id IN (SELECT sub_group_id FROM sub_groups WHERE group_id = ?)",
        ),
        ("sub_groups", "DELETE FROM sub_groups WHERE group_id = ?"),
        ("student_groups", "DELETE FROM student_groups WHERE group_id = ?"),
        ("class_groups", "DELETE FROM class_groups WHERE group_id = ?"),
    ] {
        tx.execute(sql, [&group_id])
            .map_err(db_table_err("db_delete_failed", table))?;
    }
    commit(tx)?;
    Ok(json!({ "groupId": group_id }))
}

fn create_sub_group(
    conn: &Connection,
    user: &str,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let group_id = get_required_str(params, "groupId")?;
    let name = get_required_str(params, "subGroupName")?;
    let student_ids = get_str_list(params, "studentIds")?;
    let class_id = owning_class(conn, "class_groups", "group_id", &group_id, "group")?;
    require_access(conn, user, &class_id, Access::Configure)?;
    require_enrolled(conn, &class_id, &student_ids)?;

    let tx = begin(conn)?;
    let sub_group_id = db::new_id("subgroup_");
    let now = db::now_ts();
    tx.execute(
        "INSERT INTO sub_groups(sub_group_id, sub_group_name, group_id, class_id, created_date, updated_date)
         VALUES(?, ?, ?, ?, ?, ?)",
        (&sub_group_id, &name, &group_id, &class_id, &now, &now),
    )
    .map_err(db_table_err("db_insert_failed", "sub_groups"))?;
    SUB_GROUP_MEMBERS.replace(&tx, &sub_group_id, &student_ids, &now)?;
    commit(tx)?;
    Ok(json!({ "subGroupId": sub_group_id }))
}

fn save_sub_group(
    conn: &Connection,
    user: &str,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let sub_group_id = get_required_str(params, "subGroupId")?;
    let name = get_required_str(params, "subGroupName")?;
    let student_ids = get_str_list(params, "studentIds")?;
    let class_id = owning_class(conn, "sub_groups", "sub_group_id", &sub_group_id, "subgroup")?;
    require_access(conn, user, &class_id, Access::Configure)?;
    require_enrolled(conn, &class_id, &student_ids)?;

    let tx = begin(conn)?;
    let now = db::now_ts();
    tx.execute(
        "UPDATE sub_groups SET sub_group_name = ?, updated_date = ? WHERE sub_group_id = ?",
        (&name, &now, &sub_group_id),
    )
    .map_err(db_table_err("db_update_failed", "sub_groups"))?;
    SUB_GROUP_MEMBERS.replace(&tx, &sub_group_id, &student_ids, &now)?;
    commit(tx)?;
    Ok(json!({ "subGroupId": sub_group_id }))
}

fn delete_sub_group(
    conn: &Connection,
    user: &str,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let sub_group_id = get_required_str(params, "subGroupId")?;
    let class_id = owning_class(conn, "sub_groups", "sub_group_id", &sub_group_id, "subgroup")?;
    require_access(conn, user, &class_id, Access::Configure)?;

    let tx = begin(conn)?;
    SUB_GROUP_MEMBERS.replace(&tx, &sub_group_id, &[], "")?;
    tx.execute(
        "DELETE FROM sub_groups WHERE sub_group_id = ?",
        [&sub_group_id],
    )
    .map_err(db_table_err("db_delete_failed", "sub_groups"))?;
    commit(tx)?;
    Ok(json!({ "subGroupId": sub_group_id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "groups.create" => Some(run(state, req, create_group)),
        "groups.save" => Some(run(state, req, save_group)),
        "groups.delete" => Some(run(state, req, delete_group)),
        "subgroups.create" => Some(run(state, req, create_sub_group)),
        "subgroups.save" => Some(run(state, req, save_sub_group)),
        "subgroups.delete" => Some(run(state, req, delete_sub_group)),
        _ => None,
    }
}
