use super::fetch::BulkRows;
use crate::model::{
    AbsentDateRow, AchievementOwner, AchievementRow, AssignmentRow, BehaviorRow, EnrollmentRow,
    ExpectationRow, GroupRow, MembershipRow, PointRow, RewardItemRow, StudentAssignmentRow,
    StudentExpectationRow, StudentRow, SubGroupRow, TopicRow,
};
use std::collections::HashMap;
use std::hash::Hash;

/// Multimap over `rows`: rows keep their input order under each key.
/// Rows for which `key` returns `None` are left out.
pub fn group_by<T, K, I, F>(rows: I, mut key: F) -> HashMap<K, Vec<T>>
where
    I: IntoIterator<Item = T>,
    K: Eq + Hash,
    F: FnMut(&T) -> Option<K>,
{
    let mut out: HashMap<K, Vec<T>> = HashMap::new();
    for row in rows {
        if let Some(k) = key(&row) {
            out.entry(k).or_default().push(row);
        }
    }
    out
}

/// `(class_id, student_id)`
pub type StudentKey<'a> = (&'a str, &'a str);

pub struct RosterIndex<'a> {
    pub students: HashMap<&'a str, &'a StudentRow>,
    pub enrollments_by_class: HashMap<&'a str, Vec<&'a EnrollmentRow>>,
    pub groups_by_class: HashMap<&'a str, Vec<&'a GroupRow>>,
    pub sub_groups_by_group: HashMap<&'a str, Vec<&'a SubGroupRow>>,
    pub members_by_group: HashMap<&'a str, Vec<&'a MembershipRow>>,
    pub members_by_sub_group: HashMap<&'a str, Vec<&'a MembershipRow>>,
    pub points_by_student: HashMap<StudentKey<'a>, Vec<&'a PointRow>>,
    pub absences_by_student: HashMap<StudentKey<'a>, Vec<&'a AbsentDateRow>>,
    pub behaviors_by_class: HashMap<&'a str, Vec<&'a BehaviorRow>>,
    pub reward_items_by_class: HashMap<&'a str, Vec<&'a RewardItemRow>>,
    pub achievements_by_behavior: HashMap<&'a str, Vec<&'a AchievementRow>>,
    pub achievements_by_reward_item: HashMap<&'a str, Vec<&'a AchievementRow>>,
    pub topics_by_class: HashMap<&'a str, Vec<&'a TopicRow>>,
    pub assignments_by_class: HashMap<&'a str, Vec<&'a AssignmentRow>>,
    pub progress_by_assignment: HashMap<&'a str, Vec<&'a StudentAssignmentRow>>,
    pub expectations_by_class: HashMap<&'a str, Vec<&'a ExpectationRow>>,
    pub student_expectations_by_class: HashMap<&'a str, Vec<&'a StudentExpectationRow>>,
}

impl<'a> RosterIndex<'a> {
    pub fn build(rows: &'a BulkRows) -> Self {
        let orphans = rows
            .achievements
            .iter()
            .filter(|a| a.owner == AchievementOwner::Orphan)
            .count();
        if orphans > 0 {
            tracing::warn!(count = orphans, "achievements without an owner dropped");
        }

        RosterIndex {
            students: rows
                .students
                .iter()
                .map(|s| (s.student_id.as_str(), s))
                .collect(),
            enrollments_by_class: group_by(&rows.enrollments, |e| Some(e.class_id.as_str())),
            groups_by_class: group_by(&rows.groups, |g| Some(g.class_id.as_str())),
            sub_groups_by_group: group_by(&rows.sub_groups, |g| Some(g.group_id.as_str())),
            members_by_group: group_by(&rows.group_members, |m| Some(m.owner_id.as_str())),
            members_by_sub_group: group_by(&rows.sub_group_members, |m| {
                Some(m.owner_id.as_str())
            }),
            points_by_student: group_by(&rows.points, |p| {
                Some((p.class_id.as_str(), p.student_id.as_str()))
            }),
            absences_by_student: group_by(&rows.absences, |a| {
                Some((a.class_id.as_str(), a.student_id.as_str()))
            }),
            behaviors_by_class: group_by(&rows.behaviors, |b| b.class_id.as_deref()),
            reward_items_by_class: group_by(&rows.reward_items, |r| r.class_id.as_deref()),
            achievements_by_behavior: group_by(&rows.achievements, |a| a.owner.behavior_id()),
            achievements_by_reward_item: group_by(&rows.achievements, |a| {
                a.owner.reward_item_id()
            }),
            topics_by_class: group_by(&rows.topics, |t| Some(t.class_id.as_str())),
            assignments_by_class: group_by(&rows.assignments, |a| Some(a.class_id.as_str())),
            progress_by_assignment: group_by(&rows.student_assignments, |sa| {
                Some(sa.assignment_id.as_str())
            }),
            expectations_by_class: group_by(&rows.expectations, |e| Some(e.class_id.as_str())),
            student_expectations_by_class: group_by(&rows.student_expectations, |se| {
                Some(se.class_id.as_str())
            }),
        }
    }
}

/// Borrowed slice for `key`, empty when the key has no rows.
pub fn rows_for<'m, K, T>(map: &'m HashMap<K, Vec<T>>, key: &K) -> &'m [T]
where
    K: Eq + Hash,
{
    map.get(key).map(Vec::as_slice).unwrap_or(&[])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_by_keeps_row_order_within_key() {
        let rows = vec![("a", 1), ("b", 2), ("a", 3), ("a", 4)];
        let grouped = group_by(rows, |r| Some(r.0));
        assert_eq!(grouped["a"], vec![("a", 1), ("a", 3), ("a", 4)]);
        assert_eq!(grouped["b"], vec![("b", 2)]);
        assert_eq!(grouped.len(), 2);
    }

    #[test]
    fn group_by_drops_rows_without_key() {
        let rows = vec![Some("x"), None, Some("x"), None];
        let grouped = group_by(rows, |r| *r);
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped["x"].len(), 2);
    }

    #[test]
    fn rows_for_missing_key_is_empty() {
        let grouped: HashMap<&str, Vec<i32>> = group_by(vec![1, 2], |_| Some("k"));
        assert!(rows_for(&grouped, &"nope").is_empty());
        assert_eq!(rows_for(&grouped, &"k"), &[1, 2]);
    }
}
