use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
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

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_scoringd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn scoringd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .get("error")
            .cloned()
            .unwrap_or_else(|| json!({ "message": "unknown" }))
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> String {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

fn seed_school(workspace: &Path) -> rusqlite::Connection {
    let conn = rusqlite::Connection::open(workspace.join("scoringd.sqlite3")).expect("open db");
    conn.execute_batch(
        "INSERT INTO schools(id, name) VALUES('sch1', 'Hillside');
         INSERT INTO tracks(id, school_id, name) VALUES('junior', 'sch1', 'Junior');
         INSERT INTO departments(id, track_id, name) VALUES('dep-junior', 'junior', 'General');
         INSERT INTO classes(id, school_id, department_id, name, active)
         VALUES('jss1', 'sch1', 'dep-junior', 'JSS 1', 1);
         INSERT INTO classes(id, school_id, department_id, name, active)
         VALUES('jss2', 'sch1', 'dep-junior', 'JSS 2', 1);
         INSERT INTO classes(id, school_id, name, active) VALUES('ss1', 'sch1', 'SS 1', 1);
         INSERT INTO classes(id, school_id, name, active) VALUES('ss3', 'sch1', 'SS 3', 0);
         INSERT INTO subjects(id, name) VALUES('maths', 'Mathematics');
         INSERT INTO subjects(id, name) VALUES('english', 'English');
         INSERT INTO class_subjects(id, class_id, subject_id) VALUES('cs-maths', 'jss1', 'maths');
         INSERT INTO class_subjects(id, class_id, subject_id) VALUES('cs-english', 'jss1', 'english');
         INSERT INTO students(id, last_name, first_name) VALUES('s1', 'Adeyemi', 'Tola');
         INSERT INTO students(id, last_name, first_name) VALUES('s2', 'Bello', 'Sani');
         INSERT INTO enrollments(id, student_id, class_id, session, term)
         VALUES('e1', 's1', 'jss1', '2024/2025', 'First Term');
         INSERT INTO enrollments(id, student_id, class_id, session, term)
         VALUES('e2', 's2', 'jss1', '2024/2025', 'First Term');
         INSERT INTO school_admins(actor_id, school_id) VALUES('admin', 'sch1');
         INSERT INTO class_teachers(actor_id, class_id, session, term)
         VALUES('form', 'jss1', '2024/2025', 'First Term');
         INSERT INTO subject_teachers(actor_id, class_id, subject_id, session, term)
         VALUES('maths-teacher', 'jss1', 'maths', '2024/2025', 'First Term');",
    )
    .expect("seed school");
    conn
}

fn save_params(actor_id: &str, subjects: serde_json::Value) -> serde_json::Value {
    json!({
        "actorId": actor_id,
        "classId": "jss1",
        "studentId": "s1",
        "session": "2024/2025",
        "term": "First Term",
        "subjects": subjects
    })
}

fn read_params(subject_id: &str) -> serde_json::Value {
    json!({
        "studentId": "s1",
        "session": "2024/2025",
        "term": "First Term",
        "subjectId": subject_id
    })
}

#[test]
fn subject_teacher_is_limited_to_own_subject() {
    let workspace = temp_dir("scoringd-save-subject-teacher");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _conn = seed_school(&workspace);

    let mut params = save_params(
        "maths-teacher",
        json!([
            { "subjectId": "maths", "components": { "CA1": 25, "Exam": 40 } },
            { "subjectId": "english", "components": { "CA1": 20 } }
        ]),
    );
    params["assessment"] = json!({ "punctuality": 5 });
    let saved = request_ok(&mut stdin, &mut reader, "2", "scores.save", params);
    assert_eq!(saved["success"], true);
    assert_eq!(saved["assessmentUpdated"], false);
    assert_eq!(saved["skippedSubjects"], json!(["english"]));
    assert_eq!(saved["skipped"][0]["reason"], "unauthorized");
    assert_eq!(saved["saved"][0]["record"]["total"], 65);
    assert_eq!(saved["saved"][0]["record"]["grade"], "B");
    assert_eq!(saved["saved"][0]["record"]["remark"], "Very Good");

    let english = request_ok(&mut stdin, &mut reader, "3", "scores.read", read_params("english"));
    assert_eq!(english["exists"], false);
    assert!(english["record"]["total"].is_null());

    let report = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "assessments.get",
        json!({ "classId": "jss1", "studentId": "s1", "session": "2024/2025", "term": "First Term" }),
    );
    assert_eq!(report["assessment"]["punctuality"], 0);
    assert_eq!(report["subjects"].as_array().map(|a| a.len()), Some(2));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn class_teacher_writes_traits_and_merges_sparse_patches() {
    let workspace = temp_dir("scoringd-save-class-teacher");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _conn = seed_school(&workspace);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "scores.save",
        save_params("form", json!([{ "subjectId": "english", "ca1": 20, "ca2": 15 }])),
    );
    let legacy = request_ok(&mut stdin, &mut reader, "3", "scores.read", read_params("english"));
    assert_eq!(legacy["record"]["total"], 35);
    assert_eq!(legacy["record"]["components"], json!({}));

    let mut params = save_params(
        "form",
        json!([{ "subjectId": "english", "components": { "Exam": 40 } }]),
    );
    params["assessment"] = json!({
        "neatness": 4,
        "classTeacherComment": "Works hard"
    });
    let saved = request_ok(&mut stdin, &mut reader, "4", "scores.save", params);
    assert_eq!(saved["assessmentUpdated"], true);
    let record = &saved["saved"][0]["record"];
    assert_eq!(
        record["components"],
        json!({ "CA 1": 20, "CA 2": 15, "Exam": 40 })
    );
    assert_eq!(record["total"], 75);
    assert_eq!(record["exam"], 40);
    assert_eq!(record["grade"], "A");

    let report = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "assessments.get",
        json!({ "classId": "jss1", "studentId": "s1", "session": "2024/2025", "term": "First Term" }),
    );
    assert_eq!(report["assessment"]["neatness"], 4);
    assert_eq!(report["assessment"]["classTeacherComment"], "Works hard");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn refused_saves_write_nothing() {
    let workspace = temp_dir("scoringd-save-refused");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let conn = seed_school(&workspace);

    let denied = request(
        &mut stdin,
        &mut reader,
        "2",
        "scores.save",
        save_params("stranger", json!([{ "subjectId": "maths", "ca1": 10 }])),
    );
    assert_eq!(error_code(&denied), "access_denied");
    assert_eq!(denied["error"]["details"]["actorId"], "stranger");

    let too_high = request(
        &mut stdin,
        &mut reader,
        "3",
        "scores.save",
        save_params(
            "admin",
            json!([
                { "subjectId": "english", "ca1": 20 },
                { "subjectId": "maths", "components": { "CA1": 60, "Exam": 50 } }
            ]),
        ),
    );
    assert_eq!(error_code(&too_high), "score_out_of_range");
    assert_eq!(too_high["error"]["details"]["total"], 110);

    let negative = request(
        &mut stdin,
        &mut reader,
        "4",
        "scores.save",
        save_params("admin", json!([{ "subjectId": "maths", "exam": -4 }])),
    );
    assert_eq!(error_code(&negative), "bad_params");

    let malformed = request(
        &mut stdin,
        &mut reader,
        "5",
        "scores.save",
        json!({ "actorId": "admin", "classId": "jss1" }),
    );
    assert_eq!(error_code(&malformed), "bad_params");

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM assessments", [], |r| r.get(0))
        .expect("count assessments");
    assert_eq!(count, 0);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
