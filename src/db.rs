use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE: &str = "scoringd.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Creates missing tables and brings older workspaces up to date.
pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    // Organisation and people tables are written by other services; the
    // daemon only reads them.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schools(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS tracks(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            name TEXT NOT NULL,
            FOREIGN KEY(school_id) REFERENCES schools(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS departments(
            id TEXT PRIMARY KEY,
            track_id TEXT NOT NULL,
            name TEXT NOT NULL,
            FOREIGN KEY(track_id) REFERENCES tracks(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            department_id TEXT,
            name TEXT NOT NULL,
            scoring_scheme TEXT,
            active INTEGER NOT NULL DEFAULT 1,
            FOREIGN KEY(school_id) REFERENCES schools(id),
            FOREIGN KEY(department_id) REFERENCES departments(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_classes_school ON classes(school_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_classes_department ON classes(department_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_subjects(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            UNIQUE(class_id, subject_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrollments(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            session TEXT NOT NULL,
            term TEXT,
            active INTEGER NOT NULL DEFAULT 1,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_class ON enrollments(class_id, session)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS school_admins(
            actor_id TEXT NOT NULL,
            school_id TEXT NOT NULL,
            PRIMARY KEY(actor_id, school_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_teachers(
            actor_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            session TEXT NOT NULL,
            term TEXT NOT NULL,
            PRIMARY KEY(actor_id, class_id, session, term)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS subject_teachers(
            actor_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            session TEXT NOT NULL,
            term TEXT NOT NULL,
            PRIMARY KEY(actor_id, class_id, subject_id, session, term)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS examinations(
            id TEXT PRIMARY KEY,
            subject_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            session TEXT NOT NULL,
            term TEXT NOT NULL,
            exam_type TEXT NOT NULL,
            total_marks INTEGER
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_examinations_lookup
         ON examinations(subject_id, class_id, session, term, exam_type)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS exam_submissions(
            id TEXT PRIMARY KEY,
            examination_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            score REAL,
            status TEXT NOT NULL,
            FOREIGN KEY(examination_id) REFERENCES examinations(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_exam_submissions_exam ON exam_submissions(examination_id, student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assessments(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            session TEXT NOT NULL,
            term TEXT NOT NULL,
            attendance INTEGER NOT NULL DEFAULT 0,
            fluency INTEGER NOT NULL DEFAULT 0,
            handwriting INTEGER NOT NULL DEFAULT 0,
            game INTEGER NOT NULL DEFAULT 0,
            initiative INTEGER NOT NULL DEFAULT 0,
            critical_thinking INTEGER NOT NULL DEFAULT 0,
            punctuality INTEGER NOT NULL DEFAULT 0,
            attentiveness INTEGER NOT NULL DEFAULT 0,
            neatness INTEGER NOT NULL DEFAULT 0,
            self_discipline INTEGER NOT NULL DEFAULT 0,
            politeness INTEGER NOT NULL DEFAULT 0,
            class_teacher_comment TEXT,
            head_teacher_comment TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(student_id, session, term)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subject_scores(
            id TEXT PRIMARY KEY,
            assessment_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            class_subject_id TEXT,
            ca1 INTEGER,
            ca2 INTEGER,
            exam INTEGER,
            total INTEGER,
            grade TEXT,
            remark TEXT,
            FOREIGN KEY(assessment_id) REFERENCES assessments(id),
            UNIQUE(assessment_id, subject_id)
        )",
        [],
    )?;
    // Workspaces created before named components only had the fixed columns.
    ensure_subject_scores_scores_json(conn)?;
    ensure_subject_scores_updated_at(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subject_scores_assessment ON subject_scores(assessment_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

fn ensure_subject_scores_scores_json(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "subject_scores", "scores_json")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE subject_scores ADD COLUMN scores_json TEXT", [])?;
    Ok(())
}

fn ensure_subject_scores_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "subject_scores", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE subject_scores ADD COLUMN updated_at TEXT", [])?;
    Ok(())
}

pub fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    let raw = serde_json::to_string(value)?;
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, raw),
    )?;
    Ok(())
}
