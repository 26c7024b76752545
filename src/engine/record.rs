use crate::engine::rubric::grade_for_total;
use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The fixed score columns kept for consumers that predate named components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyField {
    Ca1,
    Ca2,
    Exam,
}

impl LegacyField {
    pub const ALL: [LegacyField; 3] = [LegacyField::Ca1, LegacyField::Ca2, LegacyField::Exam];

    /// Recognises component labels that mirror a legacy column.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "ca 1" | "ca1" | "continuous assessment 1" => Some(Self::Ca1),
            "ca 2" | "ca2" | "continuous assessment 2" => Some(Self::Ca2),
            "exam" | "examination" => Some(Self::Exam),
            _ => None,
        }
    }

    pub fn canonical_label(self) -> &'static str {
        match self {
            Self::Ca1 => "CA 1",
            Self::Ca2 => "CA 2",
            Self::Exam => "Exam",
        }
    }

    pub fn field_name(self) -> &'static str {
        match self {
            Self::Ca1 => "ca1",
            Self::Ca2 => "ca2",
            Self::Exam => "exam",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRecord {
    pub ca1: Option<i64>,
    pub ca2: Option<i64>,
    pub exam: Option<i64>,
    #[serde(default)]
    pub components: BTreeMap<String, Option<i64>>,
    pub total: Option<i64>,
    pub grade: Option<String>,
    pub remark: Option<String>,
}

impl ScoreRecord {
    pub fn legacy(&self, field: LegacyField) -> Option<i64> {
        match field {
            LegacyField::Ca1 => self.ca1,
            LegacyField::Ca2 => self.ca2,
            LegacyField::Exam => self.exam,
        }
    }

    fn set_legacy(&mut self, field: LegacyField, value: Option<i64>) {
        match field {
            LegacyField::Ca1 => self.ca1 = value,
            LegacyField::Ca2 => self.ca2 = value,
            LegacyField::Exam => self.exam = value,
        }
    }
}

/// The fields one caller intends to set. Absent legacy fields and absent
/// component keys are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScorePatch {
    #[serde(default)]
    pub ca1: Option<i64>,
    #[serde(default)]
    pub ca2: Option<i64>,
    #[serde(default)]
    pub exam: Option<i64>,
    #[serde(default, alias = "scores")]
    pub components: BTreeMap<String, Option<i64>>,
}

impl ScorePatch {
    pub fn component(name: impl Into<String>, value: i64) -> Self {
        let mut components = BTreeMap::new();
        components.insert(name.into(), Some(value));
        Self {
            components,
            ..Self::default()
        }
    }

    pub fn legacy(&self, field: LegacyField) -> Option<i64> {
        match field {
            LegacyField::Ca1 => self.ca1,
            LegacyField::Ca2 => self.ca2,
            LegacyField::Exam => self.exam,
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        for field in LegacyField::ALL {
            if let Some(v) = self.legacy(field) {
                if v < 0 {
                    return Err(EngineError::NegativeMark {
                        field: field.field_name().to_string(),
                        value: v,
                    });
                }
            }
        }
        for (index, (name, value)) in self.components.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(EngineError::InvalidComponent {
                    index,
                    message: "component name must not be empty".to_string(),
                });
            }
            if let Some(v) = value {
                if *v < 0 {
                    return Err(EngineError::NegativeMark {
                        field: name.clone(),
                        value: *v,
                    });
                }
            }
        }
        Ok(())
    }

    fn writes_slot(&self, field: LegacyField) -> bool {
        self.legacy(field).is_some()
            || self
                .components
                .keys()
                .any(|k| LegacyField::from_label(k) == Some(field))
    }
}

/// Sum of marks; an overflowing sum is out of range by definition.
fn checked_sum(values: impl IntoIterator<Item = i64>) -> EngineResult<i64> {
    values
        .into_iter()
        .try_fold(0i64, |acc, v| acc.checked_add(v))
        .ok_or(EngineError::ScoreOutOfRange { total: i64::MAX })
}

fn key_for(map: &BTreeMap<String, Option<i64>>, field: LegacyField) -> Option<String> {
    map.keys()
        .find(|k| LegacyField::from_label(k) == Some(field))
        .cloned()
}

/// Sparse merge of `patch` over `existing`, followed by total and grade
/// derivation.
///
/// Component entries are keyed by name, so merging the same patch twice
/// yields the same record as merging it once.
pub fn merge(existing: &ScoreRecord, patch: &ScorePatch) -> EngineResult<ScoreRecord> {
    patch.validate()?;
    let mut out = existing.clone();

    if existing.components.is_empty() && patch.components.is_empty() {
        for field in LegacyField::ALL {
            if let Some(v) = patch.legacy(field) {
                out.set_legacy(field, Some(v));
            }
        }
        out.total = if LegacyField::ALL.iter().any(|f| out.legacy(*f).is_some()) {
            Some(checked_sum(LegacyField::ALL.iter().filter_map(|f| out.legacy(*f)))?)
        } else {
            None
        };
    } else {
        let mut map = existing.components.clone();

        if map.is_empty() {
            for field in LegacyField::ALL {
                if patch.writes_slot(field) {
                    continue;
                }
                if let Some(v) = existing.legacy(field) {
                    map.insert(field.canonical_label().to_string(), Some(v));
                }
            }
        }

        for field in LegacyField::ALL {
            if let Some(v) = patch.legacy(field) {
                let key = key_for(&map, field).unwrap_or_else(|| field.canonical_label().to_string());
                map.insert(key, Some(v));
            }
        }

        for (name, value) in &patch.components {
            map.insert(name.clone(), *value);
        }

        for field in LegacyField::ALL {
            let key = key_for(&patch.components, field).or_else(|| key_for(&map, field));
            if let Some(key) = key {
                out.set_legacy(field, map.get(&key).copied().flatten());
            }
        }

        // A non-empty map always has a total, even when every mark is null.
        out.total = Some(checked_sum(map.values().flatten().copied())?);
        out.components = map;
    }

    let grade = grade_for_total(out.total)?;
    out.grade = grade.map(|g| g.letter.to_string());
    out.remark = grade.map(|g| g.remark.to_string());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn components(items: &[(&str, Option<i64>)]) -> BTreeMap<String, Option<i64>> {
        items.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn sparse_merge_is_idempotent() {
        let existing = merge(&ScoreRecord::default(), &ScorePatch::component("Exam", 40))
            .expect("seed");
        let patch = ScorePatch::component("CA1", 25);

        let once = merge(&existing, &patch).expect("once");
        let twice = merge(&once, &patch).expect("twice");

        assert_eq!(once, twice);
        assert_eq!(
            once.components,
            components(&[("CA1", Some(25)), ("Exam", Some(40))])
        );
        assert_eq!(once.total, Some(65));
        assert_eq!(once.grade.as_deref(), Some("B"));
        assert_eq!(once.remark.as_deref(), Some("Very Good"));
    }

    #[test]
    fn legacy_only_record_sums_non_null_fields() {
        let patch = ScorePatch {
            ca1: Some(12),
            exam: Some(30),
            ..ScorePatch::default()
        };
        let r = merge(&ScoreRecord::default(), &patch).expect("merge");
        assert!(r.components.is_empty());
        assert_eq!(r.total, Some(42));
        assert_eq!(r.grade.as_deref(), Some("E"));
    }

    #[test]
    fn empty_patch_on_empty_record_has_no_total_or_grade() {
        let r = merge(&ScoreRecord::default(), &ScorePatch::default()).expect("merge");
        assert_eq!(r.total, None);
        assert_eq!(r.grade, None);
        assert_eq!(r.remark, None);
    }

    #[test]
    fn all_null_components_total_zero() {
        let patch = ScorePatch {
            components: components(&[("CA1", None)]),
            ..ScorePatch::default()
        };
        let r = merge(&ScoreRecord::default(), &patch).expect("merge");
        assert_eq!(r.total, Some(0));
        assert_eq!(r.grade.as_deref(), Some("F"));
        assert_eq!(r.remark.as_deref(), Some("Fail"));
    }

    #[test]
    fn overflowing_component_sum_is_out_of_range() {
        let patch = ScorePatch {
            components: components(&[("A", Some(i64::MAX)), ("B", Some(i64::MAX)), ("C", Some(2))]),
            ..ScorePatch::default()
        };
        assert!(matches!(
            merge(&ScoreRecord::default(), &patch),
            Err(EngineError::ScoreOutOfRange { .. })
        ));
    }

    #[test]
    fn overflowing_legacy_sum_is_out_of_range() {
        let patch = ScorePatch {
            ca1: Some(i64::MAX),
            ca2: Some(i64::MAX),
            exam: Some(2),
            ..ScorePatch::default()
        };
        assert!(matches!(
            merge(&ScoreRecord::default(), &patch),
            Err(EngineError::ScoreOutOfRange { .. })
        ));
    }

    #[test]
    fn component_write_mirrors_legacy_field() {
        let r = merge(&ScoreRecord::default(), &ScorePatch::component("CA 1", 18)).expect("merge");
        assert_eq!(r.ca1, Some(18));
        assert_eq!(r.ca2, None);
        assert_eq!(r.total, Some(18));
    }

    #[test]
    fn first_component_write_seeds_existing_legacy_values() {
        let legacy = merge(
            &ScoreRecord::default(),
            &ScorePatch {
                ca1: Some(20),
                ca2: Some(15),
                ..ScorePatch::default()
            },
        )
        .expect("legacy");

        let r = merge(&legacy, &ScorePatch::component("Exam", 40)).expect("merge");
        assert_eq!(
            r.components,
            components(&[("CA 1", Some(20)), ("CA 2", Some(15)), ("Exam", Some(40))])
        );
        assert_eq!(r.total, Some(75));
        assert_eq!(r.exam, Some(40));
    }

    #[test]
    fn seeding_skips_slot_the_patch_rewrites() {
        let legacy = merge(
            &ScoreRecord::default(),
            &ScorePatch {
                ca1: Some(25),
                ..ScorePatch::default()
            },
        )
        .expect("legacy");

        let r = merge(&legacy, &ScorePatch::component("CA1", 30)).expect("merge");
        assert_eq!(r.components, components(&[("CA1", Some(30))]));
        assert_eq!(r.ca1, Some(30));
        assert_eq!(r.total, Some(30));
    }

    #[test]
    fn legacy_write_on_map_record_updates_matching_component() {
        let existing = merge(
            &ScoreRecord::default(),
            &ScorePatch {
                components: components(&[("CA1", Some(20)), ("Exam", Some(40))]),
                ..ScorePatch::default()
            },
        )
        .expect("seed");

        let r = merge(
            &existing,
            &ScorePatch {
                ca1: Some(10),
                ..ScorePatch::default()
            },
        )
        .expect("merge");
        assert_eq!(
            r.components,
            components(&[("CA1", Some(10)), ("Exam", Some(40))])
        );
        assert_eq!(r.ca1, Some(10));
        assert_eq!(r.total, Some(50));
    }

    #[test]
    fn totals_above_100_are_rejected() {
        let patch = ScorePatch {
            components: components(&[("CA1", Some(60)), ("Exam", Some(50))]),
            ..ScorePatch::default()
        };
        assert!(matches!(
            merge(&ScoreRecord::default(), &patch),
            Err(EngineError::ScoreOutOfRange { total: 110 })
        ));
    }

    #[test]
    fn negative_marks_are_rejected() {
        let patch = ScorePatch {
            exam: Some(-3),
            ..ScorePatch::default()
        };
        assert!(matches!(
            merge(&ScoreRecord::default(), &patch),
            Err(EngineError::NegativeMark { value: -3, .. })
        ));
    }

    #[test]
    fn legacy_labels_match_case_insensitively() {
        assert_eq!(LegacyField::from_label(" CA 1"), Some(LegacyField::Ca1));
        assert_eq!(
            LegacyField::from_label("Continuous Assessment 2"),
            Some(LegacyField::Ca2)
        );
        assert_eq!(LegacyField::from_label("EXAMINATION"), Some(LegacyField::Exam));
        assert_eq!(LegacyField::from_label("Project"), None);
    }
}
