//! Contracts of the collaborators the engine consumes.
//!
//! The engine never talks to storage directly; the daemon wires these to
//! SQLite (`crate::store`) and the unit tests wire them to in-memory fakes.

use crate::engine::aggregate::SourceReading;
use crate::engine::authz::ActorRole;
use crate::engine::record::ScoreRecord;
use crate::engine::scheme::{ScopeType, ValidScheme};
use crate::error::EngineResult;
use serde::{Deserialize, Serialize};

/// Identifies one Assessment: a student in one session and term.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentKey {
    pub student_id: String,
    pub session: String,
    pub term: String,
}

/// The (class, session, term) tuple roles are resolved against.
#[derive(Debug, Clone, Copy)]
pub struct RoleScope<'a> {
    pub actor_id: &'a str,
    pub class_id: &'a str,
    pub session: &'a str,
    pub term: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassRef {
    pub id: String,
    pub name: String,
}

/// A subject offered in a class, with the id of the link row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassSubject {
    pub subject_id: String,
    pub subject_name: String,
    pub class_subject_id: String,
}

/// Everything that identifies one examination source except the student.
#[derive(Debug, Clone, Copy)]
pub struct SourceQuery<'a> {
    pub subject_id: &'a str,
    pub class_id: &'a str,
    pub term: &'a str,
    pub session: &'a str,
    pub exam_type: &'a str,
}

/// Sparse update of assessment-level traits and comments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentPatch {
    pub attendance: Option<i64>,
    pub fluency: Option<i64>,
    pub handwriting: Option<i64>,
    pub game: Option<i64>,
    pub initiative: Option<i64>,
    pub critical_thinking: Option<i64>,
    pub punctuality: Option<i64>,
    pub attentiveness: Option<i64>,
    pub neatness: Option<i64>,
    pub self_discipline: Option<i64>,
    pub politeness: Option<i64>,
    pub class_teacher_comment: Option<String>,
    pub head_teacher_comment: Option<String>,
}

impl AssessmentPatch {
    /// Column name and value of every trait present in the patch.
    pub fn traits(&self) -> Vec<(&'static str, i64)> {
        [
            ("attendance", self.attendance),
            ("fluency", self.fluency),
            ("handwriting", self.handwriting),
            ("game", self.game),
            ("initiative", self.initiative),
            ("critical_thinking", self.critical_thinking),
            ("punctuality", self.punctuality),
            ("attentiveness", self.attentiveness),
            ("neatness", self.neatness),
            ("self_discipline", self.self_discipline),
            ("politeness", self.politeness),
        ]
        .into_iter()
        .filter_map(|(col, v)| v.map(|v| (col, v)))
        .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.traits().is_empty()
            && self.class_teacher_comment.is_none()
            && self.head_teacher_comment.is_none()
    }
}

/// Stored assessment-level data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentView {
    pub id: String,
    pub attendance: i64,
    pub fluency: i64,
    pub handwriting: i64,
    pub game: i64,
    pub initiative: i64,
    pub critical_thinking: i64,
    pub punctuality: i64,
    pub attentiveness: i64,
    pub neatness: i64,
    pub self_discipline: i64,
    pub politeness: i64,
    pub class_teacher_comment: Option<String>,
    pub head_teacher_comment: Option<String>,
}

pub trait RoleResolver {
    /// With `subject_id = None` the answer is the actor's standing in the
    /// class as a whole; `SubjectTeacher` then means "teaches at least one
    /// subject of this class".
    fn resolve_actor_role(
        &self,
        scope: &RoleScope<'_>,
        subject_id: Option<&str>,
    ) -> EngineResult<ActorRole>;
}

pub trait Roster {
    fn students_in_class(
        &self,
        class_id: &str,
        session: &str,
        term: Option<&str>,
    ) -> EngineResult<Vec<String>>;

    fn is_enrolled(
        &self,
        student_id: &str,
        class_id: &str,
        session: &str,
        term: Option<&str>,
    ) -> EngineResult<bool>;
}

pub trait ClassDirectory {
    fn class_exists(&self, class_id: &str) -> EngineResult<bool>;

    fn effective_scheme(&self, class_id: &str) -> EngineResult<Option<ValidScheme>>;

    fn subjects_of_class(&self, class_id: &str) -> EngineResult<Vec<ClassSubject>>;

    /// Active classes under a scope. Fails with `NotFound` when the scope
    /// entity itself does not exist.
    fn classes_in_scope(&self, scope: ScopeType, scope_id: &str) -> EngineResult<Vec<ClassRef>>;

    fn write_scheme(&self, class_id: &str, scheme: &ValidScheme) -> EngineResult<()>;
}

pub trait SourceScores {
    fn source_score(
        &self,
        query: &SourceQuery<'_>,
        student_id: &str,
    ) -> EngineResult<Option<SourceReading>>;
}

pub trait ScoreStore {
    fn find_assessment(&self, key: &AssessmentKey) -> EngineResult<Option<String>>;

    /// Returns the assessment id, creating the row on first use.
    fn ensure_assessment(&self, key: &AssessmentKey) -> EngineResult<String>;

    fn load_assessment(&self, key: &AssessmentKey) -> EngineResult<Option<AssessmentView>>;

    fn apply_assessment_patch(
        &self,
        assessment_id: &str,
        patch: &AssessmentPatch,
    ) -> EngineResult<()>;

    fn load_score(&self, assessment_id: &str, subject_id: &str)
        -> EngineResult<Option<ScoreRecord>>;

    fn store_score(
        &self,
        assessment_id: &str,
        subject: &ClassSubject,
        record: &ScoreRecord,
    ) -> EngineResult<()>;
}

/// Runs `f` as one unit: every write inside commits together or not at all.
pub trait Transactional {
    fn atomically<T, F>(&self, f: F) -> EngineResult<T>
    where
        F: FnOnce(&Self) -> EngineResult<T>;
}
