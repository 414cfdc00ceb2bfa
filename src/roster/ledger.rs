use super::index::{rows_for, StudentKey};
use crate::model::{PointRow, PointType};
use serde::Serialize;
use std::collections::HashMap;

/// A ledger row as clients see it: everything but `updated_date`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointHistoryEntry {
    pub id: String,
    pub user_id: String,
    pub class_id: String,
    pub student_id: String,
    pub behavior_id: Option<String>,
    pub reward_item_id: Option<String>,
    #[serde(rename = "type")]
    pub point_type: PointType,
    pub number_of_points: i64,
    pub created_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RedemptionRecord {
    /// Copied as stored; null when the row lost its reward item.
    pub item_id: Option<String>,
    pub date: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Ledger {
    pub points: i64,
    pub point_history: Vec<PointHistoryEntry>,
    pub redemption_history: Vec<RedemptionRecord>,
}

/// Fold a student's transactions. Each row already carries its sign, so the
/// balance is a plain sum regardless of type.
pub fn reduce(transactions: &[&PointRow]) -> Ledger {
    let points = transactions.iter().map(|t| t.number_of_points).sum();
    let point_history = transactions
        .iter()
        .map(|t| PointHistoryEntry {
            id: t.id.clone(),
            user_id: t.user_id.clone(),
            class_id: t.class_id.clone(),
            student_id: t.student_id.clone(),
            behavior_id: t.behavior_id.clone(),
            reward_item_id: t.reward_item_id.clone(),
            point_type: t.point_type,
            number_of_points: t.number_of_points,
            created_date: t.created_date.clone(),
        })
        .collect();
    let redemption_history = transactions
        .iter()
        .filter(|t| t.point_type == PointType::Redemption)
        .map(|t| {
            if t.reward_item_id.is_none() {
                tracing::warn!(point_id = %t.id, "redemption without reward item");
            }
            RedemptionRecord {
                item_id: t.reward_item_id.clone(),
                date: t.created_date.clone(),
                quantity: t.number_of_points,
            }
        })
        .collect();

    Ledger {
        points,
        point_history,
        redemption_history,
    }
}

/// Ledger for one student in one class; a student with no rows has a zero balance.
pub fn student_ledger(
    points_by_student: &HashMap<StudentKey<'_>, Vec<&PointRow>>,
    class_id: &str,
    student_id: &str,
) -> Ledger {
    reduce(rows_for(points_by_student, &(class_id, student_id)))
}
