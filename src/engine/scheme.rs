use crate::engine::record::LegacyField;
use crate::engine::repositories::{ClassDirectory, Transactional};
use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const SCHEME_TOTAL: i64 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub name: String,
    #[serde(alias = "max")]
    pub max_mark: i64,
}

impl Component {
    pub fn new(name: impl Into<String>, max_mark: i64) -> Self {
        Self {
            name: name.into(),
            max_mark,
        }
    }
}

/// A scheme whose component maximums are known to sum to 100.
///
/// Only [`validate`] builds one, so holding a `ValidScheme` is proof the
/// invariant was checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidScheme {
    components: Vec<Component>,
}

impl ValidScheme {
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// Exact name first, then trimmed case-insensitive, then any spelling
    /// of the same legacy column ("CA 1" finds "CA1").
    pub fn find(&self, name: &str) -> Option<&Component> {
        self.components
            .iter()
            .find(|c| c.name == name)
            .or_else(|| {
                let wanted = name.trim();
                self.components
                    .iter()
                    .find(|c| c.name.eq_ignore_ascii_case(wanted))
            })
            .or_else(|| {
                let field = LegacyField::from_label(name)?;
                self.components
                    .iter()
                    .find(|c| LegacyField::from_label(&c.name) == Some(field))
            })
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.components).unwrap_or_else(|_| "[]".to_string())
    }

    /// Stored schemes are re-checked on the way back in.
    pub fn from_stored(raw: &str) -> EngineResult<Self> {
        let components: Vec<Component> = serde_json::from_str(raw)?;
        validate(components).map_err(|e| EngineError::CorruptRecord(e.to_string()))
    }
}

pub fn validate(components: Vec<Component>) -> EngineResult<ValidScheme> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out: Vec<Component> = Vec::with_capacity(components.len());

    for (index, c) in components.into_iter().enumerate() {
        let name = c.name.trim().to_string();
        if name.is_empty() {
            return Err(EngineError::InvalidComponent {
                index,
                message: "name must not be empty".to_string(),
            });
        }
        if c.max_mark < 0 {
            return Err(EngineError::InvalidComponent {
                index,
                message: format!("maxMark must be >= 0, got {}", c.max_mark),
            });
        }
        if !seen.insert(name.to_ascii_lowercase()) {
            return Err(EngineError::InvalidComponent {
                index,
                message: format!("duplicate component name: {}", name),
            });
        }
        out.push(Component {
            name,
            max_mark: c.max_mark,
        });
    }

    let total: i64 = out.iter().map(|c| c.max_mark).sum();
    if total != SCHEME_TOTAL {
        return Err(EngineError::InvalidSchemeTotal { total });
    }
    Ok(ValidScheme { components: out })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeType {
    School,
    Track,
    Department,
    Class,
}

impl ScopeType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SCHOOL" => Some(Self::School),
            "TRACK" => Some(Self::Track),
            "DEPARTMENT" => Some(Self::Department),
            "CLASS" => Some(Self::Class),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::School => "SCHOOL",
            Self::Track => "TRACK",
            Self::Department => "DEPARTMENT",
            Self::Class => "CLASS",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppliedScheme {
    pub class_ids: Vec<String>,
}

impl AppliedScheme {
    pub fn applied_count(&self) -> usize {
        self.class_ids.len()
    }
}

/// Validates `components` and overwrites the scheme of every active class in
/// the scope, all or nothing.
pub fn apply_scheme<D>(
    dir: &D,
    scope: ScopeType,
    scope_id: &str,
    components: Vec<Component>,
) -> EngineResult<AppliedScheme>
where
    D: ClassDirectory + Transactional,
{
    let scheme = validate(components)?;

    let class_ids = dir.atomically(|d| {
        let classes = d.classes_in_scope(scope, scope_id)?;
        let mut ids = Vec::with_capacity(classes.len());
        for class in classes {
            d.write_scheme(&class.id, &scheme)?;
            ids.push(class.id);
        }
        Ok(ids)
    })?;

    tracing::info!(
        scope = scope.as_str(),
        scope_id,
        applied = class_ids.len(),
        "scoring scheme applied"
    );
    Ok(AppliedScheme { class_ids })
}
