use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};

pub const DB_FILE: &str = "classpoints.sqlite3";

pub fn db_path(workspace: &Path) -> PathBuf {
    workspace.join(DB_FILE)
}

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let conn = Connection::open(db_path(workspace))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    // WAL lets the roster readers run next to the writer connection.
    conn.query_row("PRAGMA journal_mode = WAL", [], |r| r.get::<_, String>(0))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            class_id TEXT PRIMARY KEY,
            class_name TEXT NOT NULL,
            class_language TEXT NOT NULL,
            class_grade TEXT,
            class_year TEXT,
            class_code TEXT NOT NULL UNIQUE,
            complete_s1 INTEGER NOT NULL DEFAULT 0,
            complete_s2 INTEGER NOT NULL DEFAULT 0,
            created_date TEXT NOT NULL,
            updated_date TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teacher_classes(
            assignment_id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            role TEXT NOT NULL,
            assigned_date TEXT,
            FOREIGN KEY(class_id) REFERENCES classes(class_id),
            UNIQUE(user_id, class_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_teacher_classes_user ON teacher_classes(user_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            student_id TEXT PRIMARY KEY,
            student_name_en TEXT NOT NULL,
            student_name_first_en TEXT NOT NULL,
            student_name_last_en TEXT NOT NULL,
            student_name_alt TEXT,
            student_reading_level TEXT,
            student_grade TEXT,
            student_sex TEXT,
            student_number INTEGER,
            student_email TEXT,
            created_date TEXT NOT NULL,
            updated_date TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_classes(
            enrollment_id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            enrollment_date TEXT,
            FOREIGN KEY(student_id) REFERENCES students(student_id),
            FOREIGN KEY(class_id) REFERENCES classes(class_id),
            UNIQUE(student_id, class_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_student_classes_class ON student_classes(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_groups(
            group_id TEXT PRIMARY KEY,
            group_name TEXT NOT NULL,
            class_id TEXT NOT NULL,
            created_date TEXT NOT NULL,
            updated_date TEXT NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(class_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_class_groups_class ON class_groups(class_id)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_groups(
            enrollment_id TEXT PRIMARY KEY,
            group_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            enrollment_date TEXT,
            FOREIGN KEY(group_id) REFERENCES class_groups(group_id),
            UNIQUE(group_id, student_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_student_groups_group ON student_groups(group_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sub_groups(
            sub_group_id TEXT PRIMARY KEY,
            sub_group_name TEXT NOT NULL,
            group_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            created_date TEXT NOT NULL,
            updated_date TEXT NOT NULL,
            FOREIGN KEY(group_id) REFERENCES class_groups(group_id),
            FOREIGN KEY(class_id) REFERENCES classes(class_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sub_groups_class ON sub_groups(class_id)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_sub_groups(
            enrollment_id TEXT PRIMARY KEY,
            sub_group_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            enrollment_date TEXT,
            FOREIGN KEY(sub_group_id) REFERENCES sub_groups(sub_group_id),
            UNIQUE(sub_group_id, student_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_student_sub_groups_sub_group ON student_sub_groups(sub_group_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS behaviors(
            behavior_id TEXT PRIMARY KEY,
            class_id TEXT,
            user_id TEXT NOT NULL,
            name TEXT NOT NULL,
            title TEXT,
            point_value INTEGER NOT NULL,
            description TEXT,
            icon TEXT,
            color TEXT,
            created_date TEXT NOT NULL,
            updated_date TEXT NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(class_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_behaviors_class ON behaviors(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS reward_items(
            item_id TEXT PRIMARY KEY,
            class_id TEXT,
            user_id TEXT NOT NULL,
            name TEXT NOT NULL,
            title TEXT,
            price INTEGER NOT NULL,
            description TEXT,
            icon TEXT,
            type TEXT NOT NULL,
            created_date TEXT NOT NULL,
            updated_date TEXT NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(class_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_reward_items_class ON reward_items(class_id)",
        [],
    )?;

    // behavior_id / reward_item_id are unconstrained; orphans are dropped at read time.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS achievements(
            achievement_id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            behavior_id TEXT,
            reward_item_id TEXT,
            threshold INTEGER NOT NULL,
            name TEXT NOT NULL,
            created_date TEXT NOT NULL,
            updated_date TEXT NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(class_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_achievements_class ON achievements(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS points(
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            behavior_id TEXT,
            reward_item_id TEXT,
            type TEXT NOT NULL,
            number_of_points INTEGER NOT NULL,
            created_date TEXT NOT NULL,
            updated_date TEXT NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(class_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_points_class ON points(class_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_points_student ON points(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS absent_dates(
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            date TEXT NOT NULL,
            created_date TEXT NOT NULL,
            updated_date TEXT NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(class_id),
            UNIQUE(class_id, student_id, date)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_absent_dates_class_date ON absent_dates(class_id, date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS topics(
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            name TEXT NOT NULL,
            created_date TEXT NOT NULL,
            updated_date TEXT NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(class_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_topics_class ON topics(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assignments(
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            name TEXT NOT NULL,
            description TEXT,
            data TEXT,
            due_date TEXT,
            topic TEXT,
            working_date TEXT,
            created_date TEXT NOT NULL,
            updated_date TEXT NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(class_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assignments_class ON assignments(class_id)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_assignments(
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            assignment_id TEXT NOT NULL,
            complete INTEGER,
            completed_ts TEXT,
            created_date TEXT NOT NULL,
            updated_date TEXT NOT NULL,
            FOREIGN KEY(assignment_id) REFERENCES assignments(id),
            UNIQUE(assignment_id, student_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_student_assignments_class ON student_assignments(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS expectations(
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            name TEXT NOT NULL,
            description TEXT,
            created_date TEXT NOT NULL,
            updated_date TEXT NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(class_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_expectations_class ON expectations(class_id)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_expectations(
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            expectation_id TEXT NOT NULL,
            value TEXT,
            number INTEGER,
            created_date TEXT NOT NULL,
            updated_date TEXT NOT NULL,
            FOREIGN KEY(expectation_id) REFERENCES expectations(id),
            UNIQUE(expectation_id, student_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_student_expectations_class ON student_expectations(class_id)",
        [],
    )?;

    tracing::info!(path = %db_path(workspace).display(), "workspace database ready");
    Ok(conn)
}

/// Read-only handle on an already initialised workspace database.
pub fn open_read_only(db_file: &Path) -> anyhow::Result<Connection> {
    let conn = Connection::open_with_flags(
        db_file,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    Ok(conn)
}

pub fn now_ts() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Prefixed UUIDv4, e.g. `class_6c1f…`.
pub fn new_id(prefix: &str) -> String {
    format!("{}{}", prefix, uuid::Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> PathBuf {
        let p = std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&p).expect("create temp dir");
        p
    }

    #[test]
    fn open_db_is_idempotent() {
        let ws = temp_dir("classpoints-db-open");
        drop(open_db(&ws).expect("first open"));
        let conn = open_db(&ws).expect("second open");
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'points'",
                [],
                |r| r.get(0),
            )
            .expect("count");
        assert_eq!(n, 1);
    }

    #[test]
    fn new_id_carries_prefix() {
        let id = new_id("class_");
        assert!(id.starts_with("class_"));
        assert_eq!(id.len(), "class_".len() + 36);
    }
}
