//! Row types for the classroom tables, as read back by the roster service.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ValueRef};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeSet;

macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let s = value.as_str()?;
                $name::parse(s).ok_or_else(|| {
                    FromSqlError::Other(
                        format!("invalid {} value: {}", stringify!($name), s).into(),
                    )
                })
            }
        }
    };
}

text_enum!(Role {
    Primary => "primary",
    Assistant => "assistant",
});

text_enum!(PointType {
    Positive => "positive",
    Negative => "negative",
    Redemption => "redemption",
});

text_enum!(RewardType {
    Solo => "solo",
    Group => "group",
    Class => "class",
});

text_enum!(Sex {
    Male => "male",
    Female => "female",
});

impl Role {
    /// Assistants may apply behaviors and mark tasks, but not configure or delete.
    pub fn can_configure(self) -> bool {
        matches!(self, Role::Primary)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Completion {
    pub s1: bool,
    pub s2: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassRow {
    pub class_id: String,
    pub class_name: String,
    pub class_language: String,
    pub class_grade: Option<String>,
    pub class_year: Option<String>,
    pub class_code: String,
    pub created_date: String,
    pub updated_date: String,
    pub complete: Completion,
    pub assigned_date: Option<String>,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StudentRow {
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
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnrollmentRow {
    pub class_id: String,
    pub student_id: String,
    pub enrollment_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupRow {
    pub group_id: String,
    pub group_name: String,
    pub class_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubGroupRow {
    pub sub_group_id: String,
    pub sub_group_name: String,
    pub group_id: String,
    pub class_id: String,
}

/// One row of `student_groups` or `student_sub_groups`; `owner_id` is the
/// group or subgroup id respectively.
#[derive(Debug, Clone, PartialEq)]
pub struct MembershipRow {
    pub owner_id: String,
    pub student_id: String,
    pub enrollment_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointRow {
    pub id: String,
    pub user_id: String,
    pub class_id: String,
    pub student_id: String,
    pub behavior_id: Option<String>,
    pub reward_item_id: Option<String>,
    pub point_type: PointType,
    pub number_of_points: i64,
    pub created_date: String,
    pub updated_date: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AbsentDateRow {
    pub class_id: String,
    pub student_id: String,
    pub date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RewardItemRow {
    pub item_id: String,
    pub price: i64,
    pub name: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub class_id: Option<String>,
    pub user_id: String,
    #[serde(rename = "type")]
    pub reward_type: RewardType,
    pub created_date: String,
    pub updated_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BehaviorRow {
    pub behavior_id: String,
    pub name: String,
    pub title: Option<String>,
    pub point_value: i64,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub class_id: Option<String>,
    pub user_id: String,
    pub created_date: String,
    pub updated_date: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BehaviorCategory {
    Positive,
    Negative,
}

impl BehaviorRow {
    pub fn category(&self) -> Option<BehaviorCategory> {
        categorize(self.point_value)
    }
}

/// Strictly positive values are rewards, strictly negative are penalties.
/// Zero belongs to neither.
pub fn categorize(point_value: i64) -> Option<BehaviorCategory> {
    match point_value {
        v if v > 0 => Some(BehaviorCategory::Positive),
        v if v < 0 => Some(BehaviorCategory::Negative),
        _ => None,
    }
}

/// Which entity an achievement hangs off. Stored as two nullable columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AchievementOwner {
    Behavior(String),
    RewardItem(String),
    Both {
        behavior_id: String,
        reward_item_id: String,
    },
    Orphan,
}

impl AchievementOwner {
    /// Empty strings count as null. A row with both columns set keeps both.
    pub fn from_columns(behavior_id: Option<String>, reward_item_id: Option<String>) -> Self {
        let behavior_id = behavior_id.filter(|s| !s.is_empty());
        let reward_item_id = reward_item_id.filter(|s| !s.is_empty());
        match (behavior_id, reward_item_id) {
            (Some(behavior_id), Some(reward_item_id)) => AchievementOwner::Both {
                behavior_id,
                reward_item_id,
            },
            (Some(b), None) => AchievementOwner::Behavior(b),
            (None, Some(r)) => AchievementOwner::RewardItem(r),
            (None, None) => AchievementOwner::Orphan,
        }
    }

    pub fn behavior_id(&self) -> Option<&str> {
        match self {
            AchievementOwner::Behavior(id) | AchievementOwner::Both { behavior_id: id, .. } => {
                Some(id)
            }
            _ => None,
        }
    }

    pub fn reward_item_id(&self) -> Option<&str> {
        match self {
            AchievementOwner::RewardItem(id)
            | AchievementOwner::Both {
                reward_item_id: id, ..
            } => Some(id),
            _ => None,
        }
    }
}

// Clients still read the two-column shape.
impl Serialize for AchievementOwner {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut st = serializer.serialize_struct("AchievementOwner", 2)?;
        st.serialize_field("behavior_id", &self.behavior_id())?;
        st.serialize_field("reward_item_id", &self.reward_item_id())?;
        st.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AchievementRow {
    pub achievement_id: String,
    pub class_id: String,
    pub user_id: String,
    #[serde(flatten)]
    pub owner: AchievementOwner,
    pub threshold: i64,
    pub name: String,
    pub created_date: String,
    pub updated_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicRow {
    pub id: String,
    pub user_id: String,
    pub class_id: String,
    pub name: String,
    pub created_date: String,
    pub updated_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentRow {
    pub id: String,
    pub user_id: String,
    pub class_id: String,
    pub name: String,
    pub description: Option<String>,
    pub data: Option<String>,
    pub due_date: Option<String>,
    pub topic: Option<String>,
    pub working_date: Option<String>,
    pub created_date: String,
    pub updated_date: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StudentAssignmentRow {
    pub class_id: String,
    pub student_id: String,
    pub assignment_id: String,
    pub complete: Option<bool>,
    pub completed_ts: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpectationRow {
    pub id: String,
    pub user_id: String,
    pub class_id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_date: String,
    pub updated_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentExpectationRow {
    pub id: String,
    pub user_id: String,
    pub class_id: String,
    pub student_id: String,
    pub expectation_id: String,
    pub value: Option<String>,
    pub number: Option<i64>,
    pub created_date: String,
    pub updated_date: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
}

/// Status for one student on a day, given the students recorded absent that day.
/// Only absences are recorded; anything unmarked is present.
pub fn attendance_of(absent_students: &BTreeSet<String>, student_id: &str) -> AttendanceStatus {
    if absent_students.contains(student_id) {
        AttendanceStatus::Absent
    } else {
        AttendanceStatus::Present
    }
}
