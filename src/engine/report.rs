use crate::engine::record::ScoreRecord;
use crate::engine::repositories::{AssessmentKey, AssessmentView, ClassDirectory, ScoreStore};
use crate::engine::scheme::Component;
use crate::error::{EngineError, EngineResult};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSubject {
    pub subject_id: String,
    pub subject_name: String,
    pub exists: bool,
    pub record: ScoreRecord,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportView {
    pub class_id: String,
    #[serde(flatten)]
    pub key: AssessmentKey,
    pub assessment: Option<AssessmentView>,
    pub scheme: Option<Vec<Component>>,
    pub subjects: Vec<ReportSubject>,
}

/// One student's assessment as a report card sees it: every subject the
/// class offers, with an empty record where nothing was entered yet.
pub fn report_for<D>(dir: &D, class_id: &str, key: &AssessmentKey) -> EngineResult<ReportView>
where
    D: ClassDirectory + ScoreStore,
{
    if !dir.class_exists(class_id)? {
        return Err(EngineError::NotFound {
            entity: "class",
            id: class_id.to_string(),
        });
    }
    let scheme = dir
        .effective_scheme(class_id)?
        .map(|s| s.components().to_vec());
    let assessment = dir.load_assessment(key)?;

    let mut subjects = Vec::new();
    for cs in dir.subjects_of_class(class_id)? {
        let stored = match &assessment {
            Some(a) => dir.load_score(&a.id, &cs.subject_id)?,
            None => None,
        };
        subjects.push(ReportSubject {
            subject_id: cs.subject_id,
            subject_name: cs.subject_name,
            exists: stored.is_some(),
            record: stored.unwrap_or_default(),
        });
    }

    Ok(ReportView {
        class_id: class_id.to_string(),
        key: key.clone(),
        assessment,
        scheme,
        subjects,
    })
}
