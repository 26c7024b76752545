use super::{get_required_str, parse_params, HandlerErr};
use crate::config;
use crate::engine::report::report_for;
use crate::engine::repositories::AssessmentKey;
use crate::engine::save::{read_score, save_scores, SaveRequest};
use crate::ipc::error::{engine_err, err, ok};
use crate::ipc::types::{AppState, Request};
use crate::store::SqliteDirectory;
use serde_json::json;

fn assessment_key(params: &serde_json::Value) -> Result<AssessmentKey, HandlerErr> {
    Ok(AssessmentKey {
        student_id: get_required_str(params, "studentId")?,
        session: get_required_str(params, "session")?,
        term: get_required_str(params, "term")?,
    })
}

fn handle_scores_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let save_req: SaveRequest = match parse_params(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let limits = match config::load_limits(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let dir = SqliteDirectory::new(conn);
    match save_scores(&dir, &save_req, limits.max_subjects_per_save) {
        Ok(outcome) => match serde_json::to_value(&outcome) {
            Ok(v) => ok(&req.id, v),
            Err(e) => err(&req.id, "internal", e.to_string(), None),
        },
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_scores_read(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let (key, subject_id) = match assessment_key(&req.params)
        .and_then(|k| Ok((k, get_required_str(&req.params, "subjectId")?)))
    {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let dir = SqliteDirectory::new(conn);
    match read_score(&dir, &key, &subject_id) {
        Ok(stored) => ok(
            &req.id,
            json!({
                "exists": stored.is_some(),
                "record": stored.unwrap_or_default(),
            }),
        ),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_assessments_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let (class_id, key) = match get_required_str(&req.params, "classId")
        .and_then(|c| Ok((c, assessment_key(&req.params)?)))
    {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let dir = SqliteDirectory::new(conn);
    match report_for(&dir, &class_id, &key) {
        Ok(view) => match serde_json::to_value(&view) {
            Ok(v) => ok(&req.id, v),
            Err(e) => err(&req.id, "internal", e.to_string(), None),
        },
        Err(e) => engine_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "scores.save" => Some(handle_scores_save(state, req)),
        "scores.read" => Some(handle_scores_read(state, req)),
        "assessments.get" => Some(handle_assessments_get(state, req)),
        _ => None,
    }
}
