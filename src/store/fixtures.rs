//! A small seeded school for unit tests.
//!
//! sch1 has a junior track with one department holding jss1 and jss2, plus
//! ss1 outside any department and an inactive ss3. jss1 carries a
//! CA1/CA2/Exam scheme and offers maths and english.

use crate::db;
use rusqlite::Connection;

pub const SESSION: &str = "2024/2025";
pub const TERM: &str = "First Term";

pub fn init_logging() {
    crate::logging::init_test();
}

pub fn school() -> Connection {
    let conn = Connection::open_in_memory().expect("open");
    db::init_schema(&conn).expect("schema");
    conn.execute_batch(
        "INSERT INTO schools(id, name) VALUES('sch1', 'Hillside');
         INSERT INTO tracks(id, school_id, name) VALUES('junior', 'sch1', 'Junior');
         INSERT INTO departments(id, track_id, name) VALUES('dep-junior', 'junior', 'General');

         INSERT INTO classes(id, school_id, department_id, name, scoring_scheme, active)
         VALUES('jss1', 'sch1', 'dep-junior', 'JSS 1',
                '[{\"name\":\"CA1\",\"maxMark\":30},{\"name\":\"CA2\",\"maxMark\":30},{\"name\":\"Exam\",\"maxMark\":40}]',
                1);
         INSERT INTO classes(id, school_id, department_id, name, active)
         VALUES('jss2', 'sch1', 'dep-junior', 'JSS 2', 1);
         INSERT INTO classes(id, school_id, name, active) VALUES('ss1', 'sch1', 'SS 1', 1);
         INSERT INTO classes(id, school_id, name, active) VALUES('ss3', 'sch1', 'SS 3', 0);

         INSERT INTO subjects(id, name) VALUES('maths', 'Mathematics');
         INSERT INTO subjects(id, name) VALUES('english', 'English');
         INSERT INTO subjects(id, name) VALUES('music', 'Music');
         INSERT INTO class_subjects(id, class_id, subject_id) VALUES('cs-maths', 'jss1', 'maths');
         INSERT INTO class_subjects(id, class_id, subject_id) VALUES('cs-english', 'jss1', 'english');

         INSERT INTO students(id, last_name, first_name) VALUES('s1', 'Adeyemi', 'Tola');
         INSERT INTO students(id, last_name, first_name) VALUES('s2', 'Bello', 'Sani');
         INSERT INTO students(id, last_name, first_name) VALUES('s3', 'Chukwu', 'Ada');
         INSERT INTO enrollments(id, student_id, class_id, session, term)
         VALUES('e1', 's1', 'jss1', '2024/2025', 'First Term');
         INSERT INTO enrollments(id, student_id, class_id, session, term)
         VALUES('e2', 's2', 'jss1', '2024/2025', NULL);
         INSERT INTO enrollments(id, student_id, class_id, session, term, active)
         VALUES('e3', 's3', 'jss1', '2024/2025', 'First Term', 0);

         INSERT INTO school_admins(actor_id, school_id) VALUES('admin', 'sch1');
         INSERT INTO class_teachers(actor_id, class_id, session, term)
         VALUES('form', 'jss1', '2024/2025', 'First Term');
         INSERT INTO subject_teachers(actor_id, class_id, subject_id, session, term)
         VALUES('maths-teacher', 'jss1', 'maths', '2024/2025', 'First Term');",
    )
    .expect("seed");
    conn
}

pub fn exam(
    conn: &Connection,
    id: &str,
    class_id: &str,
    subject_id: &str,
    exam_type: &str,
    total_marks: Option<i64>,
) {
    conn.execute(
        "INSERT INTO examinations(id, subject_id, class_id, session, term, exam_type, total_marks)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (id, subject_id, class_id, SESSION, TERM, exam_type, total_marks),
    )
    .expect("insert examination");
}

pub fn submission(
    conn: &Connection,
    examination_id: &str,
    student_id: &str,
    score: Option<f64>,
    status: &str,
) {
    let id = format!("{}-{}", examination_id, student_id);
    conn.execute(
        "INSERT INTO exam_submissions(id, examination_id, student_id, score, status)
         VALUES(?, ?, ?, ?, ?)",
        (id, examination_id, student_id, score, status),
    )
    .expect("insert submission");
}
