use crate::db;
use crate::model::{
    AbsentDateRow, AchievementOwner, AchievementRow, AssignmentRow, BehaviorRow, ClassRow,
    Completion, EnrollmentRow, ExpectationRow, GroupRow, MembershipRow, PointRow, RewardItemRow,
    Sex, StudentAssignmentRow, StudentExpectationRow, StudentRow, SubGroupRow, TopicRow,
};
use anyhow::{anyhow, Context};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};
use std::path::Path;
use std::thread::{self, Scope, ScopedJoinHandle};

/// Every flat collection the assembler needs for one teacher.
#[derive(Debug, Default)]
pub struct BulkRows {
    pub classes: Vec<ClassRow>,
    pub groups: Vec<GroupRow>,
    pub group_members: Vec<MembershipRow>,
    pub sub_groups: Vec<SubGroupRow>,
    pub sub_group_members: Vec<MembershipRow>,
    pub students: Vec<StudentRow>,
    pub enrollments: Vec<EnrollmentRow>,
    pub points: Vec<PointRow>,
    pub absences: Vec<AbsentDateRow>,
    pub reward_items: Vec<RewardItemRow>,
    pub behaviors: Vec<BehaviorRow>,
    pub achievements: Vec<AchievementRow>,
    pub topics: Vec<TopicRow>,
    pub assignments: Vec<AssignmentRow>,
    pub student_assignments: Vec<StudentAssignmentRow>,
    pub expectations: Vec<ExpectationRow>,
    pub student_expectations: Vec<StudentExpectationRow>,
}

/// Resolve the teacher's classes, then read everything they own.
///
/// Each class-scoped read runs on its own scoped thread with its own read-only
/// connection. Membership reads depend on the group ids, so they run on the
/// thread that fetched the groups. Any failure fails the whole fetch.
pub fn fetch_all(db_file: &Path, teacher_id: &str) -> anyhow::Result<BulkRows> {
    let classes = {
        let conn = db::open_read_only(db_file)?;
        query_teacher_classes(&conn, teacher_id).context("reading classes")?
    };
    if classes.is_empty() {
        return Ok(BulkRows::default());
    }
    let class_ids: Vec<String> = classes.iter().map(|c| c.class_id.clone()).collect();
    let ids = class_ids.as_slice();

    thread::scope(|s| -> anyhow::Result<BulkRows> {
        let groups = spawn_read(s, db_file, move |conn| {
            let groups = query_groups(conn, ids)?;
            let group_ids: Vec<String> = groups.iter().map(|g| g.group_id.clone()).collect();
            let members = query_memberships(conn, "student_groups", "group_id", &group_ids)?;
            Ok((groups, members))
        });
        let sub_groups = spawn_read(s, db_file, move |conn| {
            let sub_groups = query_sub_groups(conn, ids)?;
            let sub_group_ids: Vec<String> =
                sub_groups.iter().map(|g| g.sub_group_id.clone()).collect();
            let members =
                query_memberships(conn, "student_sub_groups", "sub_group_id", &sub_group_ids)?;
            Ok((sub_groups, members))
        });
        let students = spawn_read(s, db_file, query_students);
        let enrollments = spawn_read(s, db_file, move |conn| query_enrollments(conn, ids));
        let points = spawn_read(s, db_file, move |conn| query_points(conn, ids));
        let absences = spawn_read(s, db_file, move |conn| query_absences(conn, ids));
        let reward_items = spawn_read(s, db_file, move |conn| query_reward_items(conn, ids));
        let behaviors = spawn_read(s, db_file, move |conn| query_behaviors(conn, ids));
        let achievements = spawn_read(s, db_file, move |conn| query_achievements(conn, ids));
        let topics = spawn_read(s, db_file, move |conn| query_topics(conn, ids));
        let assignments = spawn_read(s, db_file, move |conn| query_assignments(conn, ids));
        let student_assignments =
            spawn_read(s, db_file, move |conn| query_student_assignments(conn, ids));
        let expectations = spawn_read(s, db_file, move |conn| query_expectations(conn, ids));
        let student_expectations =
            spawn_read(s, db_file, move |conn| query_student_expectations(conn, ids));

        let (groups, group_members) = join(groups, "groups")?;
        let (sub_groups, sub_group_members) = join(sub_groups, "sub_groups")?;
        Ok(BulkRows {
            classes,
            groups,
            group_members,
            sub_groups,
            sub_group_members,
            students: join(students, "students")?,
            enrollments: join(enrollments, "student_classes")?,
            points: join(points, "points")?,
            absences: join(absences, "absent_dates")?,
            reward_items: join(reward_items, "reward_items")?,
            behaviors: join(behaviors, "behaviors")?,
            achievements: join(achievements, "achievements")?,
            topics: join(topics, "topics")?,
            assignments: join(assignments, "assignments")?,
            student_assignments: join(student_assignments, "student_assignments")?,
            expectations: join(expectations, "expectations")?,
            student_expectations: join(student_expectations, "student_expectations")?,
        })
    })
}

fn spawn_read<'scope, 'env, T, F>(
    s: &'scope Scope<'scope, 'env>,
    db_file: &'env Path,
    read: F,
) -> ScopedJoinHandle<'scope, anyhow::Result<T>>
where
    T: Send + 'scope,
    F: FnOnce(&Connection) -> anyhow::Result<T> + Send + 'scope,
{
    s.spawn(move || {
        let conn = db::open_read_only(db_file)?;
        read(&conn)
    })
}

fn join<T>(handle: ScopedJoinHandle<'_, anyhow::Result<T>>, table: &str) -> anyhow::Result<T> {
    match handle.join() {
        Ok(res) => res.with_context(|| format!("reading {}", table)),
        Err(_) => Err(anyhow!("reader for {} panicked", table)),
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Run `sql` with its `{ids}` marker expanded to one placeholder per id.
fn query_in<T, F>(conn: &Connection, sql: &str, ids: &[String], map: F) -> anyhow::Result<Vec<T>>
where
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = sql.replace("{ids}", &placeholders(ids.len()));
    let mut stmt = conn.prepare(&sql)?;
    let bind = ids.iter().map(|id| Value::Text(id.clone()));
    let rows = stmt
        .query_map(params_from_iter(bind), map)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub(crate) fn query_teacher_classes(
    conn: &Connection,
    teacher_id: &str,
) -> anyhow::Result<Vec<ClassRow>> {
    let mut stmt = conn.prepare(
        "SELECT c.class_id, c.class_name, c.class_language, c.class_grade, c.class_year,
                c.class_code, c.created_date, c.updated_date, c.complete_s1, c.complete_s2,
                tc.assigned_date, tc.role
         FROM teacher_classes tc
         JOIN classes c ON c.class_id = tc.class_id
         WHERE tc.user_id = ?
         ORDER BY c.created_date, c.class_id",
    )?;
    let rows = stmt
        .query_map([teacher_id], |r| {
            Ok(ClassRow {
                class_id: r.get(0)?,
                class_name: r.get(1)?,
                class_language: r.get(2)?,
                class_grade: r.get(3)?,
                class_year: r.get(4)?,
                class_code: r.get(5)?,
                created_date: r.get(6)?,
                updated_date: r.get(7)?,
                complete: Completion {
                    s1: r.get::<_, i64>(8)? != 0,
                    s2: r.get::<_, i64>(9)? != 0,
                },
                assigned_date: r.get(10)?,
                role: r.get(11)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn query_groups(conn: &Connection, class_ids: &[String]) -> anyhow::Result<Vec<GroupRow>> {
    query_in(
        conn,
        "SELECT group_id, group_name, class_id
         FROM class_groups
         WHERE class_id IN ({ids})
         ORDER BY created_date, rowid",
        class_ids,
        |r| {
            Ok(GroupRow {
                group_id: r.get(0)?,
                group_name: r.get(1)?,
                class_id: r.get(2)?,
            })
        },
    )
}

fn query_sub_groups(conn: &Connection, class_ids: &[String]) -> anyhow::Result<Vec<SubGroupRow>> {
    query_in(
        conn,
        "SELECT sub_group_id, sub_group_name, group_id, class_id
         FROM sub_groups
         WHERE class_id IN ({ids})
         ORDER BY created_date, rowid",
        class_ids,
        |r| {
            Ok(SubGroupRow {
                sub_group_id: r.get(0)?,
                sub_group_name: r.get(1)?,
                group_id: r.get(2)?,
                class_id: r.get(3)?,
            })
        },
    )
}

/// `table` is either `student_groups` or `student_sub_groups`.
fn query_memberships(
    conn: &Connection,
    table: &str,
    owner_col: &str,
    owner_ids: &[String],
) -> anyhow::Result<Vec<MembershipRow>> {
    let sql = format!(
        "SELECT {owner_col}, student_id, enrollment_date
         FROM {table}
         WHERE {owner_col} IN ({{ids}})
         ORDER BY rowid"
    );
    query_in(conn, &sql, owner_ids, |r| {
        Ok(MembershipRow {
            owner_id: r.get(0)?,
            student_id: r.get(1)?,
            enrollment_date: r.get(2)?,
        })
    })
}

// Students are global rows, so this read is not class-gated.
fn query_students(conn: &Connection) -> anyhow::Result<Vec<StudentRow>> {
    let mut stmt = conn.prepare(
        "SELECT student_id, student_name_en, student_name_first_en, student_name_last_en,
                student_name_alt, student_reading_level, student_grade, student_sex,
                student_number, student_email
         FROM students
         ORDER BY rowid",
    )?;
    let rows = stmt
        .query_map([], |r| {
            let student_id: String = r.get(0)?;
            let sex: Option<String> = r.get(7)?;
            let student_sex = decode_sex(&student_id, sex.as_deref());
            Ok(StudentRow {
                student_id,
                student_name_en: r.get(1)?,
                student_name_first_en: r.get(2)?,
                student_name_last_en: r.get(3)?,
                student_name_alt: r.get(4)?,
                student_reading_level: r.get(5)?,
                student_grade: r.get(6)?,
                student_sex,
                student_number: r.get(8)?,
                student_email: r.get(9)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Blank is null. Unknown text reads as null and logs a warning.
fn decode_sex(student_id: &str, raw: Option<&str>) -> Option<Sex> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
    let sex = Sex::parse(raw);
    if sex.is_none() {
        tracing::warn!(student_id, value = raw, "unrecognized student_sex dropped");
    }
    sex
}

fn query_enrollments(conn: &Connection, class_ids: &[String]) -> anyhow::Result<Vec<EnrollmentRow>> {
    query_in(
        conn,
        "SELECT class_id, student_id, enrollment_date
         FROM student_classes
         WHERE class_id IN ({ids})
         ORDER BY rowid",
        class_ids,
        |r| {
            Ok(EnrollmentRow {
                class_id: r.get(0)?,
                student_id: r.get(1)?,
                enrollment_date: r.get(2)?,
            })
        },
    )
}

fn query_points(conn: &Connection, class_ids: &[String]) -> anyhow::Result<Vec<PointRow>> {
    query_in(
        conn,
        "SELECT id, user_id, class_id, student_id, behavior_id, reward_item_id, type,
                number_of_points, created_date, updated_date
         FROM points
         WHERE class_id IN ({ids})
         ORDER BY created_date, rowid",
        class_ids,
        |r| {
            Ok(PointRow {
                id: r.get(0)?,
                user_id: r.get(1)?,
                class_id: r.get(2)?,
                student_id: r.get(3)?,
                behavior_id: r.get(4)?,
                reward_item_id: r.get(5)?,
                point_type: r.get(6)?,
                number_of_points: r.get(7)?,
                created_date: r.get(8)?,
                updated_date: r.get(9)?,
            })
        },
    )
}

fn query_absences(conn: &Connection, class_ids: &[String]) -> anyhow::Result<Vec<AbsentDateRow>> {
    query_in(
        conn,
        "SELECT class_id, student_id, date
         FROM absent_dates
         WHERE class_id IN ({ids})
         ORDER BY date, rowid",
        class_ids,
        |r| {
            Ok(AbsentDateRow {
                class_id: r.get(0)?,
                student_id: r.get(1)?,
                date: r.get(2)?,
            })
        },
    )
}

fn query_reward_items(conn: &Connection, class_ids: &[String]) -> anyhow::Result<Vec<RewardItemRow>> {
    query_in(
        conn,
        "SELECT item_id, price, name, title, description, icon, class_id, user_id, type,
                created_date, updated_date
         FROM reward_items
         WHERE class_id IN ({ids})
         ORDER BY created_date, rowid",
        class_ids,
        |r| {
            Ok(RewardItemRow {
                item_id: r.get(0)?,
                price: r.get(1)?,
                name: r.get(2)?,
                title: r.get(3)?,
                description: r.get(4)?,
                icon: r.get(5)?,
                class_id: r.get(6)?,
                user_id: r.get(7)?,
                reward_type: r.get(8)?,
                created_date: r.get(9)?,
                updated_date: r.get(10)?,
            })
        },
    )
}

fn query_behaviors(conn: &Connection, class_ids: &[String]) -> anyhow::Result<Vec<BehaviorRow>> {
    query_in(
        conn,
        "SELECT behavior_id, name, title, point_value, description, icon, color, class_id,
                user_id, created_date, updated_date
         FROM behaviors
         WHERE class_id IN ({ids})
         ORDER BY created_date, rowid",
        class_ids,
        |r| {
            Ok(BehaviorRow {
                behavior_id: r.get(0)?,
                name: r.get(1)?,
                title: r.get(2)?,
                point_value: r.get(3)?,
                description: r.get(4)?,
                icon: r.get(5)?,
                color: r.get(6)?,
                class_id: r.get(7)?,
                user_id: r.get(8)?,
                created_date: r.get(9)?,
                updated_date: r.get(10)?,
            })
        },
    )
}

fn query_achievements(conn: &Connection, class_ids: &[String]) -> anyhow::Result<Vec<AchievementRow>> {
    query_in(
        conn,
        "SELECT achievement_id, class_id, user_id, behavior_id, reward_item_id, threshold,
                name, created_date, updated_date
         FROM achievements
         WHERE class_id IN ({ids})
         ORDER BY threshold, rowid",
        class_ids,
        |r| {
            Ok(AchievementRow {
                achievement_id: r.get(0)?,
                class_id: r.get(1)?,
                user_id: r.get(2)?,
                owner: AchievementOwner::from_columns(r.get(3)?, r.get(4)?),
                threshold: r.get(5)?,
                name: r.get(6)?,
                created_date: r.get(7)?,
                updated_date: r.get(8)?,
            })
        },
    )
}

fn query_topics(conn: &Connection, class_ids: &[String]) -> anyhow::Result<Vec<TopicRow>> {
    query_in(
        conn,
        "SELECT id, user_id, class_id, name, created_date, updated_date
         FROM topics
         WHERE class_id IN ({ids})
         ORDER BY created_date, rowid",
        class_ids,
        |r| {
            Ok(TopicRow {
                id: r.get(0)?,
                user_id: r.get(1)?,
                class_id: r.get(2)?,
                name: r.get(3)?,
                created_date: r.get(4)?,
                updated_date: r.get(5)?,
            })
        },
    )
}

fn query_assignments(conn: &Connection, class_ids: &[String]) -> anyhow::Result<Vec<AssignmentRow>> {
    query_in(
        conn,
        "SELECT id, user_id, class_id, name, description, data, due_date, topic,
                working_date, created_date, updated_date
         FROM assignments
         WHERE class_id IN ({ids})
         ORDER BY created_date, rowid",
        class_ids,
        |r| {
            Ok(AssignmentRow {
                id: r.get(0)?,
                user_id: r.get(1)?,
                class_id: r.get(2)?,
                name: r.get(3)?,
                description: r.get(4)?,
                data: r.get(5)?,
                due_date: r.get(6)?,
                topic: r.get(7)?,
                working_date: r.get(8)?,
                created_date: r.get(9)?,
                updated_date: r.get(10)?,
            })
        },
    )
}

fn query_student_assignments(
    conn: &Connection,
    class_ids: &[String],
) -> anyhow::Result<Vec<StudentAssignmentRow>> {
    query_in(
        conn,
        "SELECT class_id, student_id, assignment_id, complete, completed_ts
         FROM student_assignments
         WHERE class_id IN ({ids})
         ORDER BY rowid",
        class_ids,
        |r| {
            Ok(StudentAssignmentRow {
                class_id: r.get(0)?,
                student_id: r.get(1)?,
                assignment_id: r.get(2)?,
                complete: r.get::<_, Option<i64>>(3)?.map(|v| v != 0),
                completed_ts: r.get(4)?,
            })
        },
    )
}

fn query_expectations(conn: &Connection, class_ids: &[String]) -> anyhow::Result<Vec<ExpectationRow>> {
    query_in(
        conn,
        "SELECT id, user_id, class_id, name, description, created_date, updated_date
         FROM expectations
         WHERE class_id IN ({ids})
         ORDER BY created_date, rowid",
        class_ids,
        |r| {
            Ok(ExpectationRow {
                id: r.get(0)?,
                user_id: r.get(1)?,
                class_id: r.get(2)?,
                name: r.get(3)?,
                description: r.get(4)?,
                created_date: r.get(5)?,
                updated_date: r.get(6)?,
            })
        },
    )
}

fn query_student_expectations(
    conn: &Connection,
    class_ids: &[String],
) -> anyhow::Result<Vec<StudentExpectationRow>> {
    query_in(
        conn,
        "SELECT id, user_id, class_id, student_id, expectation_id, value, number,
                created_date, updated_date
         FROM student_expectations
         WHERE class_id IN ({ids})
         ORDER BY rowid",
        class_ids,
        |r| {
            Ok(StudentExpectationRow {
                id: r.get(0)?,
                user_id: r.get(1)?,
                class_id: r.get(2)?,
                student_id: r.get(3)?,
                expectation_id: r.get(4)?,
                value: r.get(5)?,
                number: r.get(6)?,
                created_date: r.get(7)?,
                updated_date: r.get(8)?,
            })
        },
    )
}
