use crate::db;
use crate::ipc::error::{db_err, db_table_err, HandlerErr};
use crate::ipc::helpers::{
    begin, commit, get_quantity, get_required_str, get_str_list, require_access,
    require_enrolled, run, Access,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{categorize, BehaviorCategory, PointType};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

/// Ledger row kind and signed amount for applying a behavior `quantity` times.
fn behavior_entry(point_value: i64, quantity: i64) -> Result<(PointType, i64), HandlerErr> {
    let point_type = match categorize(point_value) {
        Some(BehaviorCategory::Positive) => PointType::Positive,
        Some(BehaviorCategory::Negative) => PointType::Negative,
        None => {
            return Err(HandlerErr::bad_params(
                "behavior has no point value and cannot be applied",
            ))
        }
    };
    let amount = point_value
        .checked_mul(quantity)
        .ok_or_else(|| HandlerErr::bad_params("quantity too large"))?;
    Ok((point_type, amount))
}

/// Redemptions are stored as debits so a plain sum over the ledger is the balance.
fn redemption_amount(price: i64, quantity: i64) -> Result<i64, HandlerErr> {
    price
        .checked_mul(quantity)
        .map(|cost| -cost)
        .ok_or_else(|| HandlerErr::bad_params("quantity too large"))
}

fn required_students(params: &serde_json::Value) -> Result<Vec<String>, HandlerErr> {
    let ids = get_str_list(params, "studentIds")?;
    if ids.is_empty() {
        return Err(HandlerErr::bad_params("studentIds must not be empty"));
    }
    Ok(ids)
}

struct LedgerWrite<'a> {
    user: &'a str,
    class_id: &'a str,
    behavior_id: Option<&'a str>,
    reward_item_id: Option<&'a str>,
    point_type: PointType,
    amount: i64,
}

impl LedgerWrite<'_> {
    fn insert_for(&self, conn: &Connection, student_ids: &[String]) -> Result<Vec<String>, HandlerErr> {
        let tx = begin(conn)?;
        let now = db::now_ts();
        let mut ids = Vec::with_capacity(student_ids.len());
        for student_id in student_ids {
            let id = db::new_id("point_");
            tx.execute(
                "INSERT INTO points(id, user_id, class_id, student_id, behavior_id, reward_item_id,
                                    type, number_of_points, created_date, updated_date)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                rusqlite::params![
                    id,
                    self.user,
                    self.class_id,
                    student_id,
                    self.behavior_id,
                    self.reward_item_id,
                    self.point_type.as_str(),
                    self.amount,
                    now,
                    now
                ],
            )
            .map_err(db_table_err("db_insert_failed", "points"))?;
            ids.push(id);
        }
        commit(tx)?;
        Ok(ids)
    }
}

fn apply_behavior(
    conn: &Connection,
    user: &str,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let behavior_id = get_required_str(params, "behaviorId")?;
    let student_ids = required_students(params)?;
    let quantity = get_quantity(params)?;
    require_access(conn, user, &class_id, Access::Use)?;

    // Class-less behaviors are shared by all of the author's classes.
    let point_value: i64 = conn
        .query_row(
            "SELECT point_value FROM behaviors
             WHERE behavior_id = ? AND (class_id = ? OR class_id IS NULL)",
            (&behavior_id, &class_id),
            |r| r.get(0),
        )
        .optional()
        .map_err(db_err("db_query_failed"))?
        .ok_or_else(|| HandlerErr::not_found("behavior"))?;
    let (point_type, amount) = behavior_entry(point_value, quantity)?;
    require_enrolled(conn, &class_id, &student_ids)?;

    let point_ids = LedgerWrite {
        user,
        class_id: &class_id,
        behavior_id: Some(&behavior_id),
        reward_item_id: None,
        point_type,
        amount,
    }
    .insert_for(conn, &student_ids)?;

    tracing::info!(class_id = %class_id, behavior_id = %behavior_id, students = point_ids.len(), amount, "behavior applied");
    Ok(json!({
        "pointIds": point_ids,
        "type": point_type,
        "numberOfPoints": amount,
    }))
}

fn redeem(
    conn: &Connection,
    user: &str,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let item_id = get_required_str(params, "itemId")?;
    let student_ids = required_students(params)?;
    let quantity = get_quantity(params)?;
    require_access(conn, user, &class_id, Access::Use)?;

    let price: i64 = conn
        .query_row(
            "SELECT price FROM reward_items
             WHERE item_id = ? AND (class_id = ? OR class_id IS NULL)",
            (&item_id, &class_id),
            |r| r.get(0),
        )
        .optional()
        .map_err(db_err("db_query_failed"))?
        .ok_or_else(|| HandlerErr::not_found("reward item"))?;
    let amount = redemption_amount(price, quantity)?;
    require_enrolled(conn, &class_id, &student_ids)?;

    let point_ids = LedgerWrite {
        user,
        class_id: &class_id,
        behavior_id: None,
        reward_item_id: Some(&item_id),
        point_type: PointType::Redemption,
        amount,
    }
    .insert_for(conn, &student_ids)?;

    tracing::info!(class_id = %class_id, item_id = %item_id, students = point_ids.len(), amount, "reward redeemed");
    Ok(json!({
        "pointIds": point_ids,
        "type": PointType::Redemption,
        "numberOfPoints": amount,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "points.applyBehavior" => Some(run(state, req, apply_behavior)),
        "points.redeem" => Some(run(state, req, redeem)),
        _ => None,
    }
}
