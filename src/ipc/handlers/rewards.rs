use super::behaviors::{insert_achievements, parse_achievements};
use crate::db;
use crate::ipc::error::{db_table_err, HandlerErr};
use crate::ipc::helpers::{
    begin, commit, get_optional_i64, get_optional_str, get_required_str, owning_class,
    require_access, run, Access,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{AchievementOwner, RewardType};
use rusqlite::Connection;
use serde_json::json;

fn create_reward(
    conn: &Connection,
    user: &str,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let name = get_required_str(params, "name")?;
    let price = get_optional_i64(params, "price")?
        .filter(|p| *p > 0)
        .ok_or_else(|| HandlerErr::bad_params("price must be a positive integer"))?;
    let reward_type = RewardType::parse(&get_required_str(params, "type")?)
        .ok_or_else(|| HandlerErr::bad_params("type must be solo, group or class"))?;
    let achievements = parse_achievements(params)?;
    require_access(conn, user, &class_id, Access::Configure)?;

    let tx = begin(conn)?;
    let item_id = db::new_id("item_");
    let now = db::now_ts();
    tx.execute(
        "INSERT INTO reward_items(item_id, class_id, user_id, name, title, price, description,
                                  icon, type, created_date, updated_date)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            item_id,
            class_id,
            user,
            name,
            get_optional_str(params, "title")?,
            price,
            get_optional_str(params, "description")?,
            get_optional_str(params, "icon")?,
            reward_type.as_str(),
            now,
            now
        ],
    )
    .map_err(db_table_err("db_insert_failed", "reward_items"))?;
    insert_achievements(
        &tx,
        user,
        &class_id,
        &AchievementOwner::RewardItem(item_id.clone()),
        &achievements,
        &now,
    )?;
    commit(tx)?;
    Ok(json!({ "itemId": item_id }))
}

fn delete_reward(
    conn: &Connection,
    user: &str,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let item_id = get_required_str(params, "itemId")?;
    let class_id = owning_class(conn, "reward_items", "item_id", &item_id, "reward item")?;
    require_access(conn, user, &class_id, Access::Configure)?;

    // Redemption rows keep their item id so the history still shows what was bought.
    let tx = begin(conn)?;
    tx.execute(
        "DELETE FROM achievements WHERE reward_item_id = ?",
        [&item_id],
    )
    .map_err(db_table_err("db_delete_failed", "achievements"))?;
    tx.execute("DELETE FROM reward_items WHERE item_id = ?", [&item_id])
        .map_err(db_table_err("db_delete_failed", "reward_items"))?;
    commit(tx)?;
    Ok(json!({ "itemId": item_id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "rewards.create" => Some(run(state, req, create_reward)),
        "rewards.delete" => Some(run(state, req, delete_reward)),
        _ => None,
    }
}
