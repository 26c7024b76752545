use crate::config::ScoringConfig;
use crate::engine::aggregate::{aggregate, AggregationMode, SourceReading, SourceSpec};
use crate::engine::authz::Gate;
use crate::engine::record::ScorePatch;
use crate::engine::repositories::{
    AssessmentKey, ClassDirectory, ClassSubject, RoleResolver, RoleScope, Roster, ScoreStore,
    SourceQuery, SourceScores, Transactional,
};
use crate::engine::save::upsert_score;
use crate::engine::scheme::Component;
use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};

fn default_divisor() -> f64 {
    1.0
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    pub class_id: String,
    pub session: String,
    pub term: String,
    pub component_name: String,
    pub sources: Vec<SourceSpec>,
    #[serde(default = "default_divisor")]
    pub divisor: f64,
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub actor_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSkip {
    pub student_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub component_name: String,
    pub target_max: i64,
    pub imported_count: usize,
    pub no_data_count: usize,
    pub skipped: Vec<ImportSkip>,
}

/// Drives one component import across a class.
///
/// Every (student, subject) cell is its own transaction. A failing cell is
/// recorded in the summary and the batch moves on; cells already written stay
/// written.
pub struct ImportOrchestrator<'a, D> {
    dir: &'a D,
    config: &'a ScoringConfig,
    max_sources: usize,
}

impl<'a, D> ImportOrchestrator<'a, D>
where
    D: RoleResolver + Roster + ClassDirectory + SourceScores + ScoreStore + Transactional,
{
    pub fn new(dir: &'a D, config: &'a ScoringConfig, max_sources: usize) -> Self {
        Self {
            dir,
            config,
            max_sources,
        }
    }

    pub fn run(&self, req: &ImportRequest) -> EngineResult<ImportSummary> {
        if req.sources.len() > self.max_sources {
            return Err(EngineError::TooMany {
                what: "sources",
                count: req.sources.len(),
                max: self.max_sources,
            });
        }
        let mode = AggregationMode::select(req.sources.len(), req.divisor)?;
        if !self.dir.class_exists(&req.class_id)? {
            return Err(EngineError::NotFound {
                entity: "class",
                id: req.class_id.clone(),
            });
        }

        let gate = match req.actor_id.as_deref() {
            Some(actor_id) => Gate::open(
                self.dir,
                &RoleScope {
                    actor_id,
                    class_id: &req.class_id,
                    session: &req.session,
                    term: &req.term,
                },
            )?,
            None => Gate::trusted(&req.class_id),
        };

        let target = self.resolve_target(&req.class_id, &req.component_name)?;
        let mut summary = ImportSummary {
            component_name: target.name.clone(),
            target_max: target.max_mark,
            ..ImportSummary::default()
        };

        let students = match &req.student_id {
            Some(sid) => {
                if !self
                    .dir
                    .is_enrolled(sid, &req.class_id, &req.session, Some(&req.term))?
                {
                    let e = EngineError::MissingMapping {
                        entity: "enrollment",
                        detail: format!("student {} is not enrolled in class {}", sid, req.class_id),
                    };
                    tracing::warn!(student_id = %sid, error = %e, "import skipped student");
                    summary.skipped.push(skip(sid, None, &e));
                    return Ok(summary);
                }
                vec![sid.clone()]
            }
            None => self
                .dir
                .students_in_class(&req.class_id, &req.session, Some(&req.term))?,
        };
        let subjects = self.dir.subjects_of_class(&req.class_id)?;

        let mut writable: Vec<&ClassSubject> = Vec::with_capacity(subjects.len());
        for cs in &subjects {
            if gate.standing(&cs.subject_id)?.may_write_score() {
                writable.push(cs);
            } else {
                tracing::debug!(subject_id = %cs.subject_id, "import skips subject outside actor's standing");
            }
        }

        for student_id in &students {
            for cs in &writable {
                match self.import_cell(req, &target, mode, student_id, cs) {
                    Ok(true) => summary.imported_count += 1,
                    Ok(false) => summary.no_data_count += 1,
                    Err(e) => {
                        tracing::warn!(
                            student_id = %student_id,
                            subject_id = %cs.subject_id,
                            error = %e,
                            "import skipped record"
                        );
                        summary
                            .skipped
                            .push(skip(student_id, Some(&cs.subject_id), &e));
                    }
                }
            }
        }

        tracing::info!(
            class_id = %req.class_id,
            component = %summary.component_name,
            imported = summary.imported_count,
            no_data = summary.no_data_count,
            skipped = summary.skipped.len(),
            "component import finished"
        );
        Ok(summary)
    }

    fn resolve_target(&self, class_id: &str, component_name: &str) -> EngineResult<Component> {
        let scheme = self.dir.effective_scheme(class_id)?;
        if let Some(c) = scheme.as_ref().and_then(|s| s.find(component_name)) {
            return Ok(c.clone());
        }
        tracing::debug!(
            class_id,
            component_name,
            fallback_max = self.config.default_component_max,
            "component not in class scheme, using default maximum"
        );
        Ok(Component::new(
            component_name.trim(),
            self.config.default_component_max,
        ))
    }

    /// Returns whether a value was written.
    fn import_cell(
        &self,
        req: &ImportRequest,
        target: &Component,
        mode: AggregationMode,
        student_id: &str,
        cs: &ClassSubject,
    ) -> EngineResult<bool> {
        let mut readings: Vec<Option<SourceReading>> = Vec::with_capacity(req.sources.len());
        for source in &req.sources {
            let query = SourceQuery {
                subject_id: &cs.subject_id,
                class_id: &req.class_id,
                term: &req.term,
                session: &req.session,
                exam_type: &source.exam_type,
            };
            readings.push(self.dir.source_score(&query, student_id)?);
        }

        let Some(value) = aggregate(target, &req.sources, &readings, mode, self.config.rounding)
        else {
            return Ok(false);
        };

        let key = AssessmentKey {
            student_id: student_id.to_string(),
            session: req.session.clone(),
            term: req.term.clone(),
        };
        let patch = ScorePatch::component(target.name.clone(), value);
        self.dir.atomically(|d| {
            let assessment_id = d.ensure_assessment(&key)?;
            upsert_score(d, &assessment_id, cs, &patch)
        })?;
        Ok(true)
    }
}

fn skip(student_id: &str, subject_id: Option<&str>, e: &EngineError) -> ImportSkip {
    ImportSkip {
        student_id: student_id.to_string(),
        subject_id: subject_id.map(str::to_string),
        code: e.code().to_string(),
        message: e.to_string(),
    }
}
