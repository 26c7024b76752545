use super::{get_required_str, parse_params, HandlerErr};
use crate::engine::repositories::ClassDirectory;
use crate::engine::scheme::{apply_scheme, Component, ScopeType};
use crate::error::EngineError;
use crate::ipc::error::{engine_err, err, ok};
use crate::ipc::types::{AppState, Request};
use crate::store::SqliteDirectory;
use serde_json::json;

fn parse_scope(params: &serde_json::Value) -> Result<(ScopeType, String), HandlerErr> {
    let raw = get_required_str(params, "scopeType")?;
    let Some(scope) = ScopeType::parse(&raw) else {
        return Err(HandlerErr::bad_params(
            "scopeType must be one of: SCHOOL, TRACK, DEPARTMENT, CLASS",
        ));
    };
    let scope_id = get_required_str(params, "scopeId")?;
    Ok((scope, scope_id))
}

fn handle_schemes_apply(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let (scope, scope_id) = match parse_scope(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let components: Vec<Component> = match req.params.get("components") {
        Some(v) => match parse_params(v) {
            Ok(c) => c,
            Err(e) => return e.response(&req.id),
        },
        None => return err(&req.id, "bad_params", "missing components", None),
    };

    let dir = SqliteDirectory::new(conn);
    match apply_scheme(&dir, scope, &scope_id, components) {
        Ok(applied) => ok(
            &req.id,
            json!({
                "appliedCount": applied.applied_count(),
                "classIds": applied.class_ids,
            }),
        ),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_schemes_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let class_id = match get_required_str(&req.params, "classId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let dir = SqliteDirectory::new(conn);
    match dir.class_exists(&class_id) {
        Ok(true) => {}
        Ok(false) => {
            return engine_err(
                &req.id,
                &EngineError::NotFound {
                    entity: "class",
                    id: class_id,
                },
            )
        }
        Err(e) => return engine_err(&req.id, &e),
    }
    match dir.effective_scheme(&class_id) {
        Ok(scheme) => ok(
            &req.id,
            json!({
                "classId": class_id,
                "scheme": scheme.map(|s| s.components().to_vec()),
            }),
        ),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_schemes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let (scope, scope_id) = match parse_scope(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let dir = SqliteDirectory::new(conn);
    let classes = match dir.classes_in_scope(scope, &scope_id) {
        Ok(v) => v,
        Err(e) => return engine_err(&req.id, &e),
    };

    let mut rows = Vec::with_capacity(classes.len());
    for class in classes {
        // One unreadable scheme must not hide the rest of the listing.
        let (scheme, corrupt) = match dir.effective_scheme(&class.id) {
            Ok(s) => (s.map(|s| s.components().to_vec()), false),
            Err(EngineError::CorruptRecord(msg)) => {
                tracing::warn!(class_id = %class.id, error = %msg, "stored scheme is corrupt");
                (None, true)
            }
            Err(e) => return engine_err(&req.id, &e),
        };
        rows.push(json!({
            "classId": class.id,
            "className": class.name,
            "scheme": scheme,
            "corrupt": corrupt,
        }));
    }
    ok(&req.id, json!({ "classes": rows }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "schemes.apply" => Some(handle_schemes_apply(state, req)),
        "schemes.get" => Some(handle_schemes_get(state, req)),
        "schemes.list" => Some(handle_schemes_list(state, req)),
        _ => None,
    }
}
