//! Engine settings, stored per workspace as JSON sections in `settings`.
//!
//! Every section has defaults; stored values are merged over them field by
//! field, and a stored field that no longer validates falls back to its
//! default instead of blocking the daemon.

use crate::db;
use crate::engine::aggregate::Rounding;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupSection {
    Scoring,
    Limits,
}

impl SetupSection {
    pub const ALL: [SetupSection; 2] = [SetupSection::Scoring, SetupSection::Limits];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scoring" => Some(Self::Scoring),
            "limits" => Some(Self::Limits),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Scoring => "scoring",
            Self::Limits => "limits",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Scoring => "setup.scoring",
            Self::Limits => "setup.limits",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringConfig {
    pub default_component_max: i64,
    pub rounding: Rounding,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            default_component_max: 100,
            rounding: Rounding::Nearest,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitsConfig {
    pub max_subjects_per_save: usize,
    pub max_import_sources: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_subjects_per_save: 64,
            max_import_sources: 8,
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Scoring => json!(ScoringConfig::default()),
        SetupSection::Limits => json!(LimitsConfig::default()),
    }
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.len() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

/// Applies `patch` onto `current`, rejecting unknown fields and values
/// outside their allowed range.
pub fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match section {
            SetupSection::Scoring => match k.as_str() {
                "defaultComponentMax" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 100)?));
                }
                "rounding" => {
                    let s = parse_string_max(v, k, 16)?;
                    let Some(r) = Rounding::parse(&s) else {
                        return Err("rounding must be one of: nearest, truncate".into());
                    };
                    obj.insert(k.clone(), Value::String(r.as_str().to_string()));
                }
                _ => return Err(format!("unknown scoring field: {}", k)),
            },
            SetupSection::Limits => match k.as_str() {
                "maxSubjectsPerSave" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 500)?));
                }
                "maxImportSources" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 16)?));
                }
                _ => return Err(format!("unknown limits field: {}", k)),
            },
        }
    }
    Ok(())
}

pub fn load_section(conn: &Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            for (k, v) in saved_obj {
                let mut one = Map::new();
                one.insert(k.clone(), v.clone());
                if let Err(msg) = merge_section_patch(section, &mut current, &one) {
                    tracing::warn!(section = section.name(), error = %msg, "ignoring stored setting");
                }
            }
        }
    }
    Ok(current)
}

/// Validates and persists a partial update, returning the new section.
pub fn update_section(
    conn: &Connection,
    section: SetupSection,
    patch: &Map<String, Value>,
) -> anyhow::Result<Result<Value, String>> {
    let mut current = load_section(conn, section)?;
    if let Err(msg) = merge_section_patch(section, &mut current, patch) {
        return Ok(Err(msg));
    }
    db::settings_set_json(conn, section.key(), &current)?;
    tracing::info!(section = section.name(), "settings updated");
    Ok(Ok(current))
}

pub fn load_scoring(conn: &Connection) -> anyhow::Result<ScoringConfig> {
    let v = load_section(conn, SetupSection::Scoring)?;
    Ok(serde_json::from_value(v)?)
}

pub fn load_limits(conn: &Connection) -> anyhow::Result<LimitsConfig> {
    let v = load_section(conn, SetupSection::Limits)?;
    Ok(serde_json::from_value(v)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open");
        db::init_schema(&conn).expect("schema");
        conn
    }

    fn patch(v: Value) -> Map<String, Value> {
        v.as_object().cloned().expect("object")
    }

    #[test]
    fn defaults_apply_without_stored_settings() {
        let c = conn();
        assert_eq!(load_scoring(&c).expect("scoring"), ScoringConfig::default());
        assert_eq!(load_limits(&c).expect("limits"), LimitsConfig::default());
    }

    #[test]
    fn update_persists_and_normalises_values() {
        let c = conn();
        let out = update_section(
            &c,
            SetupSection::Scoring,
            &patch(json!({ "rounding": " TRUNCATE ", "defaultComponentMax": 40 })),
        )
        .expect("db")
        .expect("valid");
        assert_eq!(out["rounding"], "truncate");

        let cfg = load_scoring(&c).expect("scoring");
        assert_eq!(cfg.rounding, Rounding::Truncate);
        assert_eq!(cfg.default_component_max, 40);
    }

    #[test]
    fn invalid_patch_is_rejected_and_nothing_is_written() {
        let c = conn();
        let msg = update_section(
            &c,
            SetupSection::Limits,
            &patch(json!({ "maxSubjectsPerSave": 10, "maxImportSources": 0 })),
        )
        .expect("db")
        .expect_err("out of range");
        assert!(msg.contains("maxImportSources"));
        assert_eq!(load_limits(&c).expect("limits"), LimitsConfig::default());

        let msg = update_section(&c, SetupSection::Scoring, &patch(json!({ "colour": "red" })))
            .expect("db")
            .expect_err("unknown");
        assert!(msg.contains("unknown scoring field"));
    }

    #[test]
    fn corrupt_stored_field_falls_back_to_default() {
        let c = conn();
        db::settings_set_json(
            &c,
            "setup.limits",
            &json!({ "maxSubjectsPerSave": 9999, "maxImportSources": 3 }),
        )
        .expect("seed");
        let limits = load_limits(&c).expect("limits");
        assert_eq!(limits.max_subjects_per_save, 64);
        assert_eq!(limits.max_import_sources, 3);
    }
}
