use serde_json::json;
use thiserror::Error;

/// Errors raised by the scoring engine and its storage collaborator.
///
/// Every variant maps to a stable wire code so IPC callers can branch on it
/// without parsing messages.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("total maximum marks must equal 100, current total: {total}")]
    InvalidSchemeTotal { total: i64 },

    #[error("invalid scheme component at index {index}: {message}")]
    InvalidComponent { index: usize, message: String },

    #[error("score total {total} is outside 0..=100")]
    ScoreOutOfRange { total: i64 },

    #[error("negative marks are not allowed ({field} = {value})")]
    NegativeMark { field: String, value: i64 },

    #[error("divisor must be a positive number, got {0}")]
    InvalidDivisor(f64),

    #[error("import needs at least one source")]
    NoSources,

    #[error("too many {what}: {count} > {max}")]
    TooMany {
        what: &'static str,
        count: usize,
        max: usize,
    },

    #[error("actor {actor_id} has no standing in class {class_id}")]
    AccessDenied { actor_id: String, class_id: String },

    #[error("missing {entity} mapping: {detail}")]
    MissingMapping {
        entity: &'static str,
        detail: String,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("stored record is corrupt: {0}")]
    CorruptRecord(String),

    #[error(transparent)]
    Db(#[from] rusqlite::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidSchemeTotal { .. } => "invalid_scheme_total",
            Self::InvalidComponent { .. } => "invalid_scheme_component",
            Self::ScoreOutOfRange { .. } => "score_out_of_range",
            Self::NegativeMark { .. }
            | Self::InvalidDivisor(_)
            | Self::NoSources
            | Self::TooMany { .. } => "bad_params",
            Self::AccessDenied { .. } => "access_denied",
            Self::MissingMapping { .. } => "missing_mapping",
            Self::NotFound { .. } => "not_found",
            Self::CorruptRecord(_) => "corrupt_record",
            Self::Db(_) => "db_failed",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::InvalidSchemeTotal { total } => Some(json!({ "total": total })),
            Self::InvalidComponent { index, .. } => Some(json!({ "index": index })),
            Self::ScoreOutOfRange { total } => Some(json!({ "total": total })),
            Self::NegativeMark { field, value } => {
                Some(json!({ "field": field, "value": value }))
            }
            Self::TooMany { count, max, .. } => Some(json!({ "count": count, "max": max })),
            Self::AccessDenied { actor_id, class_id } => {
                Some(json!({ "actorId": actor_id, "classId": class_id }))
            }
            Self::NotFound { entity, id } => Some(json!({ "entity": entity, "id": id })),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::CorruptRecord(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_total_error_reports_total() {
        let e = EngineError::InvalidSchemeTotal { total: 90 };
        assert_eq!(e.code(), "invalid_scheme_total");
        assert_eq!(e.details(), Some(json!({ "total": 90 })));
        assert!(e.to_string().contains("90"));
    }

    #[test]
    fn parameter_problems_share_bad_params_code() {
        assert_eq!(EngineError::NoSources.code(), "bad_params");
        assert_eq!(EngineError::InvalidDivisor(0.0).code(), "bad_params");
        assert_eq!(
            EngineError::NegativeMark {
                field: "ca1".into(),
                value: -1
            }
            .code(),
            "bad_params"
        );
    }
}
