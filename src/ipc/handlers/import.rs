use super::parse_params;
use crate::config;
use crate::engine::import::{ImportOrchestrator, ImportRequest};
use crate::ipc::error::{engine_err, err, ok};
use crate::ipc::types::{AppState, Request};
use crate::store::SqliteDirectory;

fn handle_scores_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let import_req: ImportRequest = match parse_params(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if import_req.component_name.trim().is_empty() {
        return err(&req.id, "bad_params", "componentName must not be empty", None);
    }
    let (scoring, limits) = match config::load_scoring(conn)
        .and_then(|s| Ok((s, config::load_limits(conn)?)))
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let dir = SqliteDirectory::new(conn);
    let orchestrator = ImportOrchestrator::new(&dir, &scoring, limits.max_import_sources);
    match orchestrator.run(&import_req) {
        Ok(summary) => match serde_json::to_value(&summary) {
            Ok(v) => ok(&req.id, v),
            Err(e) => err(&req.id, "internal", e.to_string(), None),
        },
        Err(e) => engine_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "scores.import" => Some(handle_scores_import(state, req)),
        _ => None,
    }
}
