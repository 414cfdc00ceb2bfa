use super::fetch::BulkRows;
use super::index::{rows_for, RosterIndex};
use super::ledger::{self, PointHistoryEntry, RedemptionRecord};
use crate::model::{
    AchievementRow, AssignmentRow, BehaviorRow, ClassRow, ExpectationRow, RewardItemRow, Sex,
    StudentExpectationRow, TopicRow,
};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentData {
    pub student_id: String,
    pub student_name_en: String,
    pub student_name_first_en: String,
    pub student_name_last_en: String,
    pub student_name_alt: Option<String>,
    pub student_reading_level: Option<String>,
    pub student_grade: Option<String>,
    pub student_sex: Option<Sex>,
    pub student_number: Option<i64>,
    pub student_email: Option<String>,
    pub enrollment_date: Option<String>,
    pub points: i64,
    pub point_history: Vec<PointHistoryEntry>,
    pub absent_dates: Vec<String>,
    pub redemption_history: Vec<RedemptionRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubGroupData {
    pub sub_group_id: String,
    pub sub_group_name: String,
    pub students: Vec<StudentData>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupData {
    pub group_id: String,
    pub group_name: String,
    pub students: Vec<StudentData>,
    pub sub_groups: Vec<SubGroupData>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BehaviorData {
    #[serde(flatten)]
    pub behavior: BehaviorRow,
    pub achievements: Vec<AchievementRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RewardItemData {
    #[serde(flatten)]
    pub item: RewardItemRow,
    pub achievements: Vec<AchievementRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentProgress {
    pub student_id: String,
    pub complete: bool,
    pub completed_ts: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentData {
    #[serde(flatten)]
    pub assignment: AssignmentRow,
    pub students: Vec<AssignmentProgress>,
}

/// One class with everything hanging off it, as sent to the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassData {
    #[serde(flatten)]
    pub class: ClassRow,
    pub groups: Vec<GroupData>,
    pub students: Vec<StudentData>,
    pub reward_items: Vec<RewardItemData>,
    pub behaviors: Vec<BehaviorData>,
    pub topics: Vec<TopicRow>,
    pub assignments: Vec<AssignmentData>,
    pub expectations: Vec<ExpectationRow>,
    pub student_expectations: Vec<StudentExpectationRow>,
}

/// Per-(class, student) values that do not depend on where the student is embedded.
#[derive(Debug, Clone)]
struct Enrichment {
    ledger: ledger::Ledger,
    absent_dates: Vec<String>,
}

/// Computes each student's enrichment once per call; embedding sites get clones.
struct Enricher<'i, 'a> {
    index: &'i RosterIndex<'a>,
    memo: HashMap<(&'a str, &'a str), Enrichment>,
}

impl<'i, 'a> Enricher<'i, 'a> {
    fn new(index: &'i RosterIndex<'a>) -> Self {
        Enricher {
            index,
            memo: HashMap::new(),
        }
    }

    /// `None` when the student row is missing (dangling membership/enrollment).
    fn student(
        &mut self,
        class_id: &'a str,
        student_id: &'a str,
        enrollment_date: Option<&String>,
    ) -> Option<StudentData> {
        let Some(row) = self.index.students.get(student_id).copied() else {
            tracing::warn!(class_id, student_id, "dangling student reference skipped");
            return None;
        };
        let index = self.index;
        let enrichment = self
            .memo
            .entry((class_id, student_id))
            .or_insert_with(|| Enrichment {
                ledger: ledger::student_ledger(&index.points_by_student, class_id, student_id),
                absent_dates: rows_for(&index.absences_by_student, &(class_id, student_id))
                    .iter()
                    .map(|a| a.date.clone())
                    .collect(),
            })
            .clone();

        Some(StudentData {
            student_id: row.student_id.clone(),
            student_name_en: row.student_name_en.clone(),
            student_name_first_en: row.student_name_first_en.clone(),
            student_name_last_en: row.student_name_last_en.clone(),
            student_name_alt: row.student_name_alt.clone(),
            student_reading_level: row.student_reading_level.clone(),
            student_grade: row.student_grade.clone(),
            student_sex: row.student_sex,
            student_number: row.student_number,
            student_email: row.student_email.clone(),
            enrollment_date: enrollment_date.cloned(),
            points: enrichment.ledger.points,
            point_history: enrichment.ledger.point_history,
            absent_dates: enrichment.absent_dates,
            redemption_history: enrichment.ledger.redemption_history,
        })
    }
}

pub fn assemble(rows: &BulkRows) -> Vec<ClassData> {
    let index = RosterIndex::build(rows);
    let mut enricher = Enricher::new(&index);
    rows.classes
        .iter()
        .map(|class| assemble_class(class, &index, &mut enricher))
        .collect()
}

fn assemble_class<'a>(
    class: &'a ClassRow,
    index: &RosterIndex<'a>,
    enricher: &mut Enricher<'_, 'a>,
) -> ClassData {
    let cid = class.class_id.as_str();

    let groups = rows_for(&index.groups_by_class, &cid)
        .iter()
        .map(|g| {
            let students = rows_for(&index.members_by_group, &g.group_id.as_str())
                .iter()
                .filter_map(|m| {
                    enricher.student(cid, m.student_id.as_str(), m.enrollment_date.as_ref())
                })
                .collect();
            let sub_groups = rows_for(&index.sub_groups_by_group, &g.group_id.as_str())
                .iter()
                .map(|sg| SubGroupData {
                    sub_group_id: sg.sub_group_id.clone(),
                    sub_group_name: sg.sub_group_name.clone(),
                    students: rows_for(&index.members_by_sub_group, &sg.sub_group_id.as_str())
                        .iter()
                        .filter_map(|m| {
                            enricher.student(
                                cid,
                                m.student_id.as_str(),
                                m.enrollment_date.as_ref(),
                            )
                        })
                        .collect(),
                })
                .collect();
            GroupData {
                group_id: g.group_id.clone(),
                group_name: g.group_name.clone(),
                students,
                sub_groups,
            }
        })
        .collect();

    let students = rows_for(&index.enrollments_by_class, &cid)
        .iter()
        .filter_map(|e| enricher.student(cid, e.student_id.as_str(), e.enrollment_date.as_ref()))
        .collect();

    let behaviors = rows_for(&index.behaviors_by_class, &cid)
        .iter()
        .map(|b| BehaviorData {
            behavior: (*b).clone(),
            achievements: rows_for(&index.achievements_by_behavior, &b.behavior_id.as_str())
                .iter()
                .map(|a| (*a).clone())
                .collect(),
        })
        .collect();

    let reward_items = rows_for(&index.reward_items_by_class, &cid)
        .iter()
        .map(|ri| RewardItemData {
            item: (*ri).clone(),
            achievements: rows_for(&index.achievements_by_reward_item, &ri.item_id.as_str())
                .iter()
                .map(|a| (*a).clone())
                .collect(),
        })
        .collect();

    let assignments = rows_for(&index.assignments_by_class, &cid)
        .iter()
        .map(|a| AssignmentData {
            assignment: (*a).clone(),
            students: rows_for(&index.progress_by_assignment, &a.id.as_str())
                .iter()
                .map(|sa| AssignmentProgress {
                    student_id: sa.student_id.clone(),
                    complete: sa.complete.unwrap_or(false),
                    completed_ts: sa.completed_ts.clone(),
                })
                .collect(),
        })
        .collect();

    ClassData {
        class: class.clone(),
        groups,
        students,
        reward_items,
        behaviors,
        topics: cloned(rows_for(&index.topics_by_class, &cid)),
        assignments,
        expectations: cloned(rows_for(&index.expectations_by_class, &cid)),
        student_expectations: cloned(rows_for(&index.student_expectations_by_class, &cid)),
    }
}

fn cloned<T: Clone>(rows: &[&T]) -> Vec<T> {
    rows.iter().map(|r| (*r).clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AchievementOwner, Completion, EnrollmentRow, GroupRow, MembershipRow, PointRow,
        PointType, RewardType, Role, StudentAssignmentRow, StudentRow,
    };

    fn class(id: &str) -> ClassRow {
        ClassRow {
            class_id: id.to_string(),
            class_name: "Room 5".to_string(),
            class_language: "en-US".to_string(),
            class_grade: Some("5".to_string()),
            class_year: Some("2024".to_string()),
            class_code: "ABC123".to_string(),
            created_date: "t".to_string(),
            updated_date: "t".to_string(),
            complete: Completion { s1: false, s2: false },
            assigned_date: None,
            role: Role::Primary,
        }
    }

    fn student(id: &str) -> StudentRow {
        StudentRow {
            student_id: id.to_string(),
            student_name_en: format!("Student {}", id),
            student_name_first_en: "First".to_string(),
            student_name_last_en: "Last".to_string(),
            student_name_alt: None,
            student_reading_level: None,
            student_grade: None,
            student_sex: None,
            student_number: None,
            student_email: None,
        }
    }

    fn enroll(class_id: &str, student_id: &str) -> EnrollmentRow {
        EnrollmentRow {
            class_id: class_id.to_string(),
            student_id: student_id.to_string(),
            enrollment_date: Some("2024-03-01".to_string()),
        }
    }

    fn point(class_id: &str, student_id: &str, n: i64) -> PointRow {
        PointRow {
            id: format!("p_{}_{}", student_id, n),
            user_id: "teacher_1".to_string(),
            class_id: class_id.to_string(),
            student_id: student_id.to_string(),
            behavior_id: None,
            reward_item_id: None,
            point_type: if n >= 0 { PointType::Positive } else { PointType::Negative },
            number_of_points: n,
            created_date: "t".to_string(),
            updated_date: "t".to_string(),
        }
    }

    fn behavior(id: &str, class_id: &str, value: i64) -> BehaviorRow {
        BehaviorRow {
            behavior_id: id.to_string(),
            name: "Helped a classmate".to_string(),
            title: None,
            point_value: value,
            description: None,
            icon: None,
            color: None,
            class_id: Some(class_id.to_string()),
            user_id: "teacher_1".to_string(),
            created_date: "t".to_string(),
            updated_date: "t".to_string(),
        }
    }

    fn achievement(id: &str, owner: AchievementOwner) -> AchievementRow {
        AchievementRow {
            achievement_id: id.to_string(),
            class_id: "c1".to_string(),
            user_id: "teacher_1".to_string(),
            owner,
            threshold: 5,
            name: "Five".to_string(),
            created_date: "t".to_string(),
            updated_date: "t".to_string(),
        }
    }

    #[test]
    fn empty_class_has_empty_lists() {
        let rows = BulkRows {
            classes: vec![class("c1")],
            ..Default::default()
        };
        let out = assemble(&rows);
        assert_eq!(out.len(), 1);
        let v = serde_json::to_value(&out[0]).expect("serialize");
        for key in [
            "groups",
            "students",
            "reward_items",
            "behaviors",
            "topics",
            "assignments",
            "expectations",
            "student_expectations",
        ] {
            assert_eq!(v[key], serde_json::json!([]), "{} should be []", key);
        }
        assert_eq!(v["class_id"], "c1");
        assert_eq!(v["role"], "primary");
        assert_eq!(v["complete"], serde_json::json!({ "s1": false, "s2": false }));
    }

    #[test]
    fn group_members_and_class_list_are_independent_copies() {
        let rows = BulkRows {
            classes: vec![class("c1")],
            students: vec![student("s1"), student("s2")],
            // s2 is in the group but not enrolled in the class.
            enrollments: vec![enroll("c1", "s1")],
            groups: vec![GroupRow {
                group_id: "g1".to_string(),
                group_name: "Red".to_string(),
                class_id: "c1".to_string(),
            }],
            group_members: vec![
                MembershipRow {
                    owner_id: "g1".to_string(),
                    student_id: "s1".to_string(),
                    enrollment_date: Some("2024-04-01".to_string()),
                },
                MembershipRow {
                    owner_id: "g1".to_string(),
                    student_id: "s2".to_string(),
                    enrollment_date: None,
                },
                MembershipRow {
                    owner_id: "g1".to_string(),
                    student_id: "ghost".to_string(),
                    enrollment_date: None,
                },
            ],
            points: vec![point("c1", "s1", 4), point("c1", "s1", -1)],
            ..Default::default()
        };
        let mut out = assemble(&rows);
        let class = &mut out[0];

        let in_group: Vec<&str> = class.groups[0]
            .students
            .iter()
            .map(|s| s.student_id.as_str())
            .collect();
        assert_eq!(in_group, vec!["s1", "s2"]);
        let in_class: Vec<&str> = class.students.iter().map(|s| s.student_id.as_str()).collect();
        assert_eq!(in_class, vec!["s1"]);

        assert_eq!(class.groups[0].students[0].points, 3);
        assert_eq!(class.students[0].points, 3);
        assert_eq!(
            class.groups[0].students[0].enrollment_date.as_deref(),
            Some("2024-04-01")
        );
        assert_eq!(class.students[0].enrollment_date.as_deref(), Some("2024-03-01"));

        class.groups[0].students[0].points = 99;
        assert_eq!(class.students[0].points, 3);
    }

    #[test]
    fn points_are_scoped_to_the_class() {
        let rows = BulkRows {
            classes: vec![class("c1"), class("c2")],
            students: vec![student("s1")],
            enrollments: vec![enroll("c1", "s1"), enroll("c2", "s1")],
            points: vec![point("c1", "s1", 5), point("c2", "s1", 2)],
            ..Default::default()
        };
        let out = assemble(&rows);
        assert_eq!(out[0].students[0].points, 5);
        assert_eq!(out[1].students[0].points, 2);
    }

    #[test]
    fn achievements_attach_to_their_owner_only() {
        let rows = BulkRows {
            classes: vec![class("c1")],
            behaviors: vec![behavior("b1", "c1", 1), behavior("b0", "c1", 0)],
            reward_items: vec![RewardItemRow {
                item_id: "r1".to_string(),
                price: 10,
                name: "Sticker".to_string(),
                title: None,
                description: None,
                icon: None,
                class_id: Some("c1".to_string()),
                user_id: "teacher_1".to_string(),
                reward_type: RewardType::Solo,
                created_date: "t".to_string(),
                updated_date: "t".to_string(),
            }],
            achievements: vec![
                achievement("a1", AchievementOwner::Behavior("b1".to_string())),
                achievement("a2", AchievementOwner::RewardItem("r1".to_string())),
                achievement("a3", AchievementOwner::Orphan),
            ],
            ..Default::default()
        };
        let out = assemble(&rows);
        let class = &out[0];

        let b1 = &class.behaviors[0];
        assert_eq!(b1.achievements.len(), 1);
        assert_eq!(b1.achievements[0].achievement_id, "a1");
        assert!(class.behaviors[1].achievements.is_empty());
        assert_eq!(class.reward_items[0].achievements.len(), 1);
        assert_eq!(class.reward_items[0].achievements[0].achievement_id, "a2");

        let all: Vec<&str> = class
            .behaviors
            .iter()
            .flat_map(|b| b.achievements.iter())
            .chain(class.reward_items.iter().flat_map(|r| r.achievements.iter()))
            .map(|a| a.achievement_id.as_str())
            .collect();
        assert!(!all.contains(&"a3"));

        // Zero-valued behaviors stay listed but are neither positive nor negative.
        assert_eq!(class.behaviors[1].behavior.category(), None);
    }

    #[test]
    fn dual_owner_achievement_is_listed_under_both_owners() {
        let rows = BulkRows {
            classes: vec![class("c1")],
            behaviors: vec![behavior("b1", "c1", 2)],
            reward_items: vec![RewardItemRow {
                item_id: "r1".to_string(),
                price: 4,
                name: "Pass".to_string(),
                title: None,
                description: None,
                icon: None,
                class_id: Some("c1".to_string()),
                user_id: "teacher_1".to_string(),
                reward_type: RewardType::Class,
                created_date: "t".to_string(),
                updated_date: "t".to_string(),
            }],
            achievements: vec![
                achievement("a1", AchievementOwner::from_columns(Some("b1".into()), Some("r1".into()))),
                achievement(
                    "a2",
                    AchievementOwner::from_columns(Some("b_gone".into()), Some("r1".into())),
                ),
            ],
            ..Default::default()
        };
        let out = assemble(&rows);
        let class = &out[0];

        let on_behavior: Vec<&str> = class.behaviors[0]
            .achievements
            .iter()
            .map(|a| a.achievement_id.as_str())
            .collect();
        assert_eq!(on_behavior, vec!["a1"]);
        let on_item: Vec<&str> = class.reward_items[0]
            .achievements
            .iter()
            .map(|a| a.achievement_id.as_str())
            .collect();
        assert_eq!(on_item, vec!["a1", "a2"]);

        let v = serde_json::to_value(&class.reward_items[0].achievements[1]).expect("serialize");
        assert_eq!(v["behavior_id"], serde_json::json!("b_gone"));
        assert_eq!(v["reward_item_id"], serde_json::json!("r1"));
    }

    #[test]
    fn assignment_completion_defaults_to_false() {
        let rows = BulkRows {
            classes: vec![class("c1")],
            assignments: vec![AssignmentRow {
                id: "as1".to_string(),
                user_id: "teacher_1".to_string(),
                class_id: "c1".to_string(),
                name: "Book report".to_string(),
                description: None,
                data: None,
                due_date: None,
                topic: None,
                working_date: None,
                created_date: "t".to_string(),
                updated_date: "t".to_string(),
            }],
            student_assignments: vec![
                StudentAssignmentRow {
                    class_id: "c1".to_string(),
                    student_id: "s1".to_string(),
                    assignment_id: "as1".to_string(),
                    complete: None,
                    completed_ts: None,
                },
                StudentAssignmentRow {
                    class_id: "c1".to_string(),
                    student_id: "s2".to_string(),
                    assignment_id: "as1".to_string(),
                    complete: Some(true),
                    completed_ts: Some("2024-05-01T00:00:00.000Z".to_string()),
                },
            ],
            ..Default::default()
        };
        let out = assemble(&rows);
        let progress = &out[0].assignments[0].students;
        assert_eq!(progress.len(), 2);
        assert!(!progress[0].complete);
        assert!(progress[1].complete);
        let v = serde_json::to_value(&out[0].assignments[0]).expect("serialize");
        assert_eq!(v["name"], "Book report");
        assert_eq!(v["students"][0]["complete"], false);
    }

    #[test]
    fn assembling_twice_is_identical() {
        let rows = BulkRows {
            classes: vec![class("c1")],
            students: vec![student("s1"), student("s2")],
            enrollments: vec![enroll("c1", "s1"), enroll("c1", "s2")],
            points: vec![point("c1", "s1", 2), point("c1", "s2", -3)],
            ..Default::default()
        };
        let a = serde_json::to_string(&assemble(&rows)).expect("serialize");
        let b = serde_json::to_string(&assemble(&rows)).expect("serialize");
        assert_eq!(a, b);
    }
}
