use crate::engine::authz::Gate;
use crate::engine::record::{merge, ScorePatch, ScoreRecord};
use crate::engine::repositories::{
    AssessmentKey, AssessmentPatch, ClassDirectory, ClassSubject, RoleResolver, RoleScope,
    Roster, ScoreStore, Transactional,
};
use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectPatch {
    pub subject_id: String,
    #[serde(flatten)]
    pub patch: ScorePatch,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    pub actor_id: String,
    pub class_id: String,
    #[serde(flatten)]
    pub key: AssessmentKey,
    #[serde(default)]
    pub assessment: Option<AssessmentPatch>,
    #[serde(default, alias = "scores")]
    pub subjects: Vec<SubjectPatch>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Unauthorized,
    MissingMapping,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedSubject {
    pub subject_id: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedSubject {
    pub subject_id: String,
    pub record: ScoreRecord,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveOutcome {
    pub success: bool,
    pub assessment_updated: bool,
    pub saved: Vec<SavedSubject>,
    pub skipped_subjects: Vec<String>,
    pub skipped: Vec<SkippedSubject>,
}

/// Reads one record and merges `patch` into it, then writes it back.
///
/// Callers own the transaction; the read and the write must not interleave
/// with another writer of the same record.
pub fn upsert_score<S: ScoreStore>(
    store: &S,
    assessment_id: &str,
    subject: &ClassSubject,
    patch: &ScorePatch,
) -> EngineResult<ScoreRecord> {
    let existing = store
        .load_score(assessment_id, &subject.subject_id)?
        .unwrap_or_default();
    let merged = merge(&existing, patch)?;
    store.store_score(assessment_id, subject, &merged)?;
    Ok(merged)
}

/// Manual save of assessment traits and any number of subject records.
///
/// Refused outright only when the actor has no standing in the class or a
/// patch is malformed; subjects the actor may not grade are skipped. Every
/// check runs before the first write, and the writes share one transaction.
pub fn save_scores<D>(dir: &D, req: &SaveRequest, max_subjects: usize) -> EngineResult<SaveOutcome>
where
    D: RoleResolver + Roster + ClassDirectory + ScoreStore + Transactional,
{
    if req.subjects.len() > max_subjects {
        return Err(EngineError::TooMany {
            what: "subjects",
            count: req.subjects.len(),
            max: max_subjects,
        });
    }
    for s in &req.subjects {
        s.patch.validate()?;
    }
    if !dir.class_exists(&req.class_id)? {
        return Err(EngineError::NotFound {
            entity: "class",
            id: req.class_id.clone(),
        });
    }

    let scope = RoleScope {
        actor_id: &req.actor_id,
        class_id: &req.class_id,
        session: &req.key.session,
        term: &req.key.term,
    };
    let gate = Gate::open(dir, &scope)?;

    if !dir.is_enrolled(
        &req.key.student_id,
        &req.class_id,
        &req.key.session,
        Some(&req.key.term),
    )? {
        return Err(EngineError::MissingMapping {
            entity: "enrollment",
            detail: format!(
                "student {} is not enrolled in class {} for {}",
                req.key.student_id, req.class_id, req.key.session
            ),
        });
    }

    let class_subjects: HashMap<String, ClassSubject> = dir
        .subjects_of_class(&req.class_id)?
        .into_iter()
        .map(|cs| (cs.subject_id.clone(), cs))
        .collect();

    let assessment_patch = match &req.assessment {
        Some(p) if !p.is_empty() && gate.may_write_assessment() => Some(p),
        _ => None,
    };

    dir.atomically(|d| {
        let existing_id = d.find_assessment(&req.key)?;
        let mut outcome = SaveOutcome::default();
        // A subject repeated within one request merges over its earlier patch.
        let mut planned: Vec<(ClassSubject, ScoreRecord)> = Vec::new();

        for s in &req.subjects {
            if !gate.standing(&s.subject_id)?.may_write_score() {
                outcome.skipped.push(SkippedSubject {
                    subject_id: s.subject_id.clone(),
                    reason: SkipReason::Unauthorized,
                });
                continue;
            }
            let Some(cs) = class_subjects.get(&s.subject_id) else {
                outcome.skipped.push(SkippedSubject {
                    subject_id: s.subject_id.clone(),
                    reason: SkipReason::MissingMapping,
                });
                continue;
            };

            if let Some(slot) = planned.iter_mut().find(|(p, _)| p.subject_id == cs.subject_id) {
                slot.1 = merge(&slot.1, &s.patch)?;
                continue;
            }
            let current = match &existing_id {
                Some(aid) => d.load_score(aid, &cs.subject_id)?.unwrap_or_default(),
                None => ScoreRecord::default(),
            };
            planned.push((cs.clone(), merge(&current, &s.patch)?));
        }

        if assessment_patch.is_none() && planned.is_empty() {
            outcome.success = true;
            outcome.skipped_subjects = outcome.skipped.iter().map(|s| s.subject_id.clone()).collect();
            return Ok(outcome);
        }

        let assessment_id = match existing_id {
            Some(id) => id,
            None => d.ensure_assessment(&req.key)?,
        };
        if let Some(p) = assessment_patch {
            d.apply_assessment_patch(&assessment_id, p)?;
            outcome.assessment_updated = true;
        }
        for (cs, record) in planned {
            d.store_score(&assessment_id, &cs, &record)?;
            outcome.saved.push(SavedSubject {
                subject_id: cs.subject_id,
                record,
            });
        }

        outcome.success = true;
        outcome.skipped_subjects = outcome.skipped.iter().map(|s| s.subject_id.clone()).collect();
        Ok(outcome)
    })
    .map(|outcome| {
        tracing::info!(
            student_id = %req.key.student_id,
            class_id = %req.class_id,
            role = ?gate.class_role(),
            saved = outcome.saved.len(),
            skipped = outcome.skipped.len(),
            "scores saved"
        );
        outcome
    })
}

/// `None` until something has been entered for this subject.
pub fn read_score<S: ScoreStore>(
    store: &S,
    key: &AssessmentKey,
    subject_id: &str,
) -> EngineResult<Option<ScoreRecord>> {
    match store.find_assessment(key)? {
        Some(aid) => store.load_score(&aid, subject_id),
        None => Ok(None),
    }
}
