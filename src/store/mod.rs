//! SQLite implementation of the engine's collaborators.

#[cfg(test)]
pub(crate) mod fixtures;

use crate::engine::aggregate::SourceReading;
use crate::engine::authz::ActorRole;
use crate::engine::record::ScoreRecord;
use crate::engine::repositories::{
    AssessmentKey, AssessmentPatch, AssessmentView, ClassDirectory, ClassRef, ClassSubject,
    RoleResolver, RoleScope, Roster, ScoreStore, SourceQuery, SourceScores, Transactional,
};
use crate::engine::scheme::{ScopeType, ValidScheme};
use crate::error::{EngineError, EngineResult};
use rusqlite::{Connection, OptionalExtension};
use std::collections::BTreeMap;
use uuid::Uuid;

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub struct SqliteDirectory<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteDirectory<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn exists(&self, sql: &str, params: impl rusqlite::Params) -> EngineResult<bool> {
        Ok(self
            .conn
            .query_row(sql, params, |r| r.get::<_, i64>(0))
            .optional()?
            .is_some())
    }

    fn class_school(&self, class_id: &str) -> EngineResult<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT school_id FROM classes WHERE id = ?",
                [class_id],
                |r| r.get(0),
            )
            .optional()?)
    }

    fn scope_exists(&self, scope: ScopeType, scope_id: &str) -> EngineResult<bool> {
        let sql = match scope {
            ScopeType::School => "SELECT 1 FROM schools WHERE id = ?",
            ScopeType::Track => "SELECT 1 FROM tracks WHERE id = ?",
            ScopeType::Department => "SELECT 1 FROM departments WHERE id = ?",
            ScopeType::Class => "SELECT 1 FROM classes WHERE id = ?",
        };
        self.exists(sql, [scope_id])
    }
}

impl RoleResolver for SqliteDirectory<'_> {
    fn resolve_actor_role(
        &self,
        scope: &RoleScope<'_>,
        subject_id: Option<&str>,
    ) -> EngineResult<ActorRole> {
        if let Some(school_id) = self.class_school(scope.class_id)? {
            if self.exists(
                "SELECT 1 FROM school_admins WHERE actor_id = ? AND school_id = ?",
                (scope.actor_id, &school_id),
            )? {
                return Ok(ActorRole::Admin);
            }
        }
        if self.exists(
            "SELECT 1 FROM class_teachers
             WHERE actor_id = ? AND class_id = ? AND session = ? AND term = ?",
            (scope.actor_id, scope.class_id, scope.session, scope.term),
        )? {
            return Ok(ActorRole::ClassTeacher);
        }
        let teaches = match subject_id {
            Some(subject_id) => self.exists(
                "SELECT 1 FROM subject_teachers
                 WHERE actor_id = ? AND class_id = ? AND subject_id = ? AND session = ? AND term = ?",
                (
                    scope.actor_id,
                    scope.class_id,
                    subject_id,
                    scope.session,
                    scope.term,
                ),
            )?,
            None => self.exists(
                "SELECT 1 FROM subject_teachers
                 WHERE actor_id = ? AND class_id = ? AND session = ? AND term = ?
                 LIMIT 1",
                (scope.actor_id, scope.class_id, scope.session, scope.term),
            )?,
        };
        Ok(if teaches {
            ActorRole::SubjectTeacher
        } else {
            ActorRole::None
        })
    }
}

impl Roster for SqliteDirectory<'_> {
    fn students_in_class(
        &self,
        class_id: &str,
        session: &str,
        term: Option<&str>,
    ) -> EngineResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT student_id FROM enrollments
             WHERE class_id = ?1 AND session = ?2 AND active = 1
               AND (?3 IS NULL OR term IS NULL OR term = ?3)
             GROUP BY student_id
             ORDER BY MIN(rowid)",
        )?;
        let ids = stmt
            .query_map((class_id, session, term), |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn is_enrolled(
        &self,
        student_id: &str,
        class_id: &str,
        session: &str,
        term: Option<&str>,
    ) -> EngineResult<bool> {
        self.exists(
            "SELECT 1 FROM enrollments
             WHERE student_id = ?1 AND class_id = ?2 AND session = ?3 AND active = 1
               AND (?4 IS NULL OR term IS NULL OR term = ?4)
             LIMIT 1",
            (student_id, class_id, session, term),
        )
    }
}

impl ClassDirectory for SqliteDirectory<'_> {
    fn class_exists(&self, class_id: &str) -> EngineResult<bool> {
        self.exists("SELECT 1 FROM classes WHERE id = ?", [class_id])
    }

    fn effective_scheme(&self, class_id: &str) -> EngineResult<Option<ValidScheme>> {
        let raw: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT scoring_scheme FROM classes WHERE id = ?",
                [class_id],
                |r| r.get(0),
            )
            .optional()?;
        match raw.flatten() {
            Some(s) if !s.trim().is_empty() => Ok(Some(ValidScheme::from_stored(&s)?)),
            _ => Ok(None),
        }
    }

    fn subjects_of_class(&self, class_id: &str) -> EngineResult<Vec<ClassSubject>> {
        let mut stmt = self.conn.prepare(
            "SELECT cs.subject_id, COALESCE(s.name, cs.subject_id), cs.id
             FROM class_subjects cs
             LEFT JOIN subjects s ON s.id = cs.subject_id
             WHERE cs.class_id = ? AND cs.active = 1
             ORDER BY cs.rowid",
        )?;
        let subjects = stmt
            .query_map([class_id], |r| {
                Ok(ClassSubject {
                    subject_id: r.get(0)?,
                    subject_name: r.get(1)?,
                    class_subject_id: r.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(subjects)
    }

    fn classes_in_scope(&self, scope: ScopeType, scope_id: &str) -> EngineResult<Vec<ClassRef>> {
        if !self.scope_exists(scope, scope_id)? {
            return Err(EngineError::NotFound {
                entity: match scope {
                    ScopeType::School => "school",
                    ScopeType::Track => "track",
                    ScopeType::Department => "department",
                    ScopeType::Class => "class",
                },
                id: scope_id.to_string(),
            });
        }
        let sql = match scope {
            ScopeType::School => {
                "SELECT id, name FROM classes WHERE school_id = ? AND active = 1 ORDER BY name"
            }
            ScopeType::Track => {
                "SELECT c.id, c.name FROM classes c
                 JOIN departments d ON d.id = c.department_id
                 WHERE d.track_id = ? AND c.active = 1
                 ORDER BY c.name"
            }
            ScopeType::Department => {
                "SELECT id, name FROM classes WHERE department_id = ? AND active = 1 ORDER BY name"
            }
            ScopeType::Class => "SELECT id, name FROM classes WHERE id = ? AND active = 1",
        };
        let mut stmt = self.conn.prepare(sql)?;
        let classes = stmt
            .query_map([scope_id], |r| {
                Ok(ClassRef {
                    id: r.get(0)?,
                    name: r.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(classes)
    }

    fn write_scheme(&self, class_id: &str, scheme: &ValidScheme) -> EngineResult<()> {
        self.conn.execute(
            "UPDATE classes SET scoring_scheme = ? WHERE id = ?",
            (scheme.to_json(), class_id),
        )?;
        Ok(())
    }
}

impl SourceScores for SqliteDirectory<'_> {
    fn source_score(
        &self,
        query: &SourceQuery<'_>,
        student_id: &str,
    ) -> EngineResult<Option<SourceReading>> {
        // Several examinations may match; the earliest one is the source.
        let exam: Option<(String, Option<i64>)> = self
            .conn
            .query_row(
                "SELECT id, total_marks FROM examinations
                 WHERE subject_id = ? AND class_id = ? AND term = ? AND session = ? AND exam_type = ?
                 ORDER BY rowid
                 LIMIT 1",
                (
                    query.subject_id,
                    query.class_id,
                    query.term,
                    query.session,
                    query.exam_type,
                ),
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        let Some((exam_id, total_marks)) = exam else {
            return Ok(None);
        };

        let score: Option<f64> = self
            .conn
            .query_row(
                "SELECT score FROM exam_submissions
                 WHERE examination_id = ? AND student_id = ?
                   AND status = 'submitted' AND score IS NOT NULL
                 ORDER BY rowid
                 LIMIT 1",
                (&exam_id, student_id),
                |r| r.get(0),
            )
            .optional()?;
        Ok(score.map(|raw_score| SourceReading {
            raw_score,
            source_max: total_marks,
        }))
    }
}

impl ScoreStore for SqliteDirectory<'_> {
    fn find_assessment(&self, key: &AssessmentKey) -> EngineResult<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id FROM assessments WHERE student_id = ? AND session = ? AND term = ?",
                (&key.student_id, &key.session, &key.term),
                |r| r.get(0),
            )
            .optional()?)
    }

    fn ensure_assessment(&self, key: &AssessmentKey) -> EngineResult<String> {
        if let Some(id) = self.find_assessment(key)? {
            return Ok(id);
        }
        let id = Uuid::new_v4().to_string();
        let ts = now();
        self.conn.execute(
            "INSERT INTO assessments(id, student_id, session, term, created_at, updated_at)
             VALUES(?, ?, ?, ?, ?, ?)",
            (&id, &key.student_id, &key.session, &key.term, &ts, &ts),
        )?;
        tracing::debug!(assessment_id = %id, student_id = %key.student_id, "assessment created");
        Ok(id)
    }

    fn load_assessment(&self, key: &AssessmentKey) -> EngineResult<Option<AssessmentView>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, attendance, fluency, handwriting, game, initiative,
                        critical_thinking, punctuality, attentiveness, neatness,
                        self_discipline, politeness, class_teacher_comment, head_teacher_comment
                 FROM assessments
                 WHERE student_id = ? AND session = ? AND term = ?",
                (&key.student_id, &key.session, &key.term),
                |r| {
                    Ok(AssessmentView {
                        id: r.get(0)?,
                        attendance: r.get(1)?,
                        fluency: r.get(2)?,
                        handwriting: r.get(3)?,
                        game: r.get(4)?,
                        initiative: r.get(5)?,
                        critical_thinking: r.get(6)?,
                        punctuality: r.get(7)?,
                        attentiveness: r.get(8)?,
                        neatness: r.get(9)?,
                        self_discipline: r.get(10)?,
                        politeness: r.get(11)?,
                        class_teacher_comment: r.get(12)?,
                        head_teacher_comment: r.get(13)?,
                    })
                },
            )
            .optional()?)
    }

    fn apply_assessment_patch(
        &self,
        assessment_id: &str,
        patch: &AssessmentPatch,
    ) -> EngineResult<()> {
        // Column names come from a fixed list, never from the request.
        for (column, value) in patch.traits() {
            let sql = format!("UPDATE assessments SET {} = ? WHERE id = ?", column);
            self.conn.execute(&sql, (value, assessment_id))?;
        }
        if let Some(c) = &patch.class_teacher_comment {
            self.conn.execute(
                "UPDATE assessments SET class_teacher_comment = ? WHERE id = ?",
                (c, assessment_id),
            )?;
        }
        if let Some(c) = &patch.head_teacher_comment {
            self.conn.execute(
                "UPDATE assessments SET head_teacher_comment = ? WHERE id = ?",
                (c, assessment_id),
            )?;
        }
        self.conn.execute(
            "UPDATE assessments SET updated_at = ? WHERE id = ?",
            (now(), assessment_id),
        )?;
        Ok(())
    }

    fn load_score(&self, assessment_id: &str, subject_id: &str) -> EngineResult<Option<ScoreRecord>> {
        type Row = (
            Option<i64>,
            Option<i64>,
            Option<i64>,
            Option<i64>,
            Option<String>,
            Option<String>,
            Option<String>,
        );
        let row: Option<Row> = self
            .conn
            .query_row(
                "SELECT ca1, ca2, exam, total, scores_json, grade, remark
                 FROM subject_scores
                 WHERE assessment_id = ? AND subject_id = ?",
                (assessment_id, subject_id),
                |r| {
                    Ok((
                        r.get(0)?,
                        r.get(1)?,
                        r.get(2)?,
                        r.get(3)?,
                        r.get(4)?,
                        r.get(5)?,
                        r.get(6)?,
                    ))
                },
            )
            .optional()?;
        let Some((ca1, ca2, exam, total, scores_json, grade, remark)) = row else {
            return Ok(None);
        };
        let components: BTreeMap<String, Option<i64>> = match scores_json {
            Some(s) if !s.trim().is_empty() => serde_json::from_str(&s)?,
            _ => BTreeMap::new(),
        };
        Ok(Some(ScoreRecord {
            ca1,
            ca2,
            exam,
            components,
            total,
            grade,
            remark,
        }))
    }

    fn store_score(
        &self,
        assessment_id: &str,
        subject: &ClassSubject,
        record: &ScoreRecord,
    ) -> EngineResult<()> {
        let scores_json = if record.components.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&record.components)?)
        };
        self.conn.execute(
            "INSERT INTO subject_scores(
                id, assessment_id, subject_id, class_subject_id,
                ca1, ca2, exam, total, scores_json, grade, remark, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(assessment_id, subject_id) DO UPDATE SET
                class_subject_id = excluded.class_subject_id,
                ca1 = excluded.ca1,
                ca2 = excluded.ca2,
                exam = excluded.exam,
                total = excluded.total,
                scores_json = excluded.scores_json,
                grade = excluded.grade,
                remark = excluded.remark,
                updated_at = excluded.updated_at",
            rusqlite::params![
                Uuid::new_v4().to_string(),
                assessment_id,
                subject.subject_id,
                subject.class_subject_id,
                record.ca1,
                record.ca2,
                record.exam,
                record.total,
                scores_json,
                record.grade,
                record.remark,
                now(),
            ],
        )?;
        Ok(())
    }
}

impl Transactional for SqliteDirectory<'_> {
    fn atomically<T, F>(&self, f: F) -> EngineResult<T>
    where
        F: FnOnce(&Self) -> EngineResult<T>,
    {
        let tx = self.conn.unchecked_transaction()?;
        // Dropping `tx` on the error path rolls back.
        let out = f(self)?;
        tx.commit()?;
        Ok(out)
    }
}
