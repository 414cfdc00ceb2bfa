use crate::db;
use crate::ipc::error::{db_table_err, HandlerErr};
use crate::ipc::helpers::{
    begin, commit, get_optional_i64, get_optional_str, get_required_str, owning_class,
    require_access, run, Access,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{categorize, AchievementOwner};
use rusqlite::Connection;
use serde_json::json;

#[derive(Debug, PartialEq)]
pub(super) struct NewAchievement {
    threshold: i64,
    name: String,
}

pub(super) fn parse_achievements(
    params: &serde_json::Value,
) -> Result<Vec<NewAchievement>, HandlerErr> {
    let Some(v) = params.get("achievements").filter(|v| !v.is_null()) else {
        return Ok(Vec::new());
    };
    let arr = v
        .as_array()
        .ok_or_else(|| HandlerErr::bad_params("achievements must be an array"))?;
    arr.iter()
        .map(|a| {
            let threshold = get_optional_i64(a, "threshold")?
                .filter(|t| *t > 0)
                .ok_or_else(|| HandlerErr::bad_params("achievement threshold must be a positive integer"))?;
            Ok(NewAchievement {
                threshold,
                name: get_required_str(a, "name")?,
            })
        })
        .collect()
}

pub(super) fn insert_achievements(
    conn: &Connection,
    user: &str,
    class_id: &str,
    owner: &AchievementOwner,
    achievements: &[NewAchievement],
    now: &str,
) -> Result<(), HandlerErr> {
    for a in achievements {
        conn.execute(
            "INSERT INTO achievements(achievement_id, class_id, user_id, behavior_id, reward_item_id,
                                      threshold, name, created_date, updated_date)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
            rusqlite::params![
                db::new_id("achievement_"),
                class_id,
                user,
                owner.behavior_id(),
                owner.reward_item_id(),
                a.threshold,
                a.name,
                now,
                now
            ],
        )
        .map_err(db_table_err("db_insert_failed", "achievements"))?;
    }
    Ok(())
}

fn create_behavior(
    conn: &Connection,
    user: &str,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let name = get_required_str(params, "name")?;
    let point_value = get_optional_i64(params, "pointValue")?
        .ok_or_else(|| HandlerErr::bad_params("missing pointValue"))?;
    if categorize(point_value).is_none() {
        return Err(HandlerErr::bad_params("pointValue must not be zero"));
    }
    let achievements = parse_achievements(params)?;
    require_access(conn, user, &class_id, Access::Configure)?;

    let tx = begin(conn)?;
    let behavior_id = db::new_id("behavior_");
    let now = db::now_ts();
    tx.execute(
        "INSERT INTO behaviors(behavior_id, class_id, user_id, name, title, point_value,
                               description, icon, color, created_date, updated_date)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            behavior_id,
            class_id,
            user,
            name,
            get_optional_str(params, "title")?,
            point_value,
            get_optional_str(params, "description")?,
            get_optional_str(params, "icon")?,
            get_optional_str(params, "color")?,
            now,
            now
        ],
    )
    .map_err(db_table_err("db_insert_failed", "behaviors"))?;
    insert_achievements(
        &tx,
        user,
        &class_id,
        &AchievementOwner::Behavior(behavior_id.clone()),
        &achievements,
        &now,
    )?;
    commit(tx)?;
    Ok(json!({ "behaviorId": behavior_id }))
}

fn delete_behavior(
    conn: &Connection,
    user: &str,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let behavior_id = get_required_str(params, "behaviorId")?;
    let class_id = owning_class(conn, "behaviors", "behavior_id", &behavior_id, "behavior")?;
    require_access(conn, user, &class_id, Access::Configure)?;

    let tx = begin(conn)?;
    // Ledger rows outlive the behavior that produced them.
    tx.execute(
        "UPDATE points SET behavior_id = NULL WHERE behavior_id = ?",
        [&behavior_id],
    )
    .map_err(db_table_err("db_update_failed", "points"))?;
    tx.execute(
        "DELETE FROM achievements WHERE behavior_id = ?",
        [&behavior_id],
    )
    .map_err(db_table_err("db_delete_failed", "achievements"))?;
    tx.execute(
        "DELETE FROM behaviors WHERE behavior_id = ?",
        [&behavior_id],
    )
    .map_err(db_table_err("db_delete_failed", "behaviors"))?;
    commit(tx)?;
    Ok(json!({ "behaviorId": behavior_id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "behaviors.create" => Some(run(state, req, create_behavior)),
        "behaviors.delete" => Some(run(state, req, delete_behavior)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn achievements_need_positive_thresholds_and_names() {
        let ok = parse_achievements(&json!({
            "achievements": [{ "threshold": 10, "name": "Helper" }]
        }))
        .expect("parse");
        assert_eq!(
            ok,
            vec![NewAchievement {
                threshold: 10,
                name: "Helper".into()
            }]
        );
        assert!(parse_achievements(&json!({})).expect("absent").is_empty());
        assert!(parse_achievements(&json!({ "achievements": [{ "threshold": 0, "name": "x" }] })).is_err());
        assert!(parse_achievements(&json!({ "achievements": [{ "threshold": 5 }] })).is_err());
    }
}
