use crate::engine::repositories::{RoleResolver, RoleScope};
use crate::error::{EngineError, EngineResult};

/// What the role-lookup collaborator reports for an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorRole {
    Admin,
    ClassTeacher,
    SubjectTeacher,
    None,
}

/// The closed set of authorisation states for one (class, subject) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Standing {
    Admin,
    ClassTeacherOf { class_id: String },
    SubjectTeacherOf { class_id: String, subject_id: String },
    Unauthorized,
}

impl Standing {
    pub fn may_write_score(&self) -> bool {
        !matches!(self, Standing::Unauthorized)
    }
}

/// Write gate for one request against one class.
///
/// Opening the gate is where a request with no standing at all is refused;
/// once open, per-subject checks only ever skip.
#[derive(Debug)]
pub struct Gate<'r, R: RoleResolver> {
    resolver: Option<&'r R>,
    actor_id: String,
    class_id: String,
    session: String,
    term: String,
    class_role: ActorRole,
}

impl<'r, R: RoleResolver> Gate<'r, R> {
    pub fn open(resolver: &'r R, scope: &RoleScope<'_>) -> EngineResult<Self> {
        let class_role = resolver.resolve_actor_role(scope, None)?;
        if class_role == ActorRole::None {
            return Err(EngineError::AccessDenied {
                actor_id: scope.actor_id.to_string(),
                class_id: scope.class_id.to_string(),
            });
        }
        Ok(Self {
            resolver: Some(resolver),
            actor_id: scope.actor_id.to_string(),
            class_id: scope.class_id.to_string(),
            session: scope.session.to_string(),
            term: scope.term.to_string(),
            class_role,
        })
    }

    /// A gate for trusted administrative callers that carry no actor.
    pub fn trusted(class_id: &str) -> Self {
        Self {
            resolver: None,
            actor_id: String::new(),
            class_id: class_id.to_string(),
            session: String::new(),
            term: String::new(),
            class_role: ActorRole::Admin,
        }
    }

    pub fn class_role(&self) -> ActorRole {
        self.class_role
    }

    /// Traits and comments belong to the class as a whole.
    pub fn may_write_assessment(&self) -> bool {
        matches!(self.class_role, ActorRole::Admin | ActorRole::ClassTeacher)
    }

    pub fn standing(&self, subject_id: &str) -> EngineResult<Standing> {
        match self.class_role {
            ActorRole::Admin => return Ok(Standing::Admin),
            ActorRole::ClassTeacher => {
                return Ok(Standing::ClassTeacherOf {
                    class_id: self.class_id.clone(),
                })
            }
            ActorRole::SubjectTeacher | ActorRole::None => {}
        }

        let Some(resolver) = self.resolver else {
            return Ok(Standing::Unauthorized);
        };
        let scope = RoleScope {
            actor_id: &self.actor_id,
            class_id: &self.class_id,
            session: &self.session,
            term: &self.term,
        };
        Ok(match resolver.resolve_actor_role(&scope, Some(subject_id))? {
            ActorRole::Admin => Standing::Admin,
            ActorRole::ClassTeacher => Standing::ClassTeacherOf {
                class_id: self.class_id.clone(),
            },
            ActorRole::SubjectTeacher => Standing::SubjectTeacherOf {
                class_id: self.class_id.clone(),
                subject_id: subject_id.to_string(),
            },
            ActorRole::None => Standing::Unauthorized,
        })
    }
}
