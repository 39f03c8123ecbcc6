use serde::{Deserialize, Serialize};

use lyceum_core::{CourseId, DomainError, DomainResult, UserId};

/// A course as seen by the progression engine (read-only here).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub title: String,
    /// Free-text subject ("Computer Science", "Mathematics", ...), used for skill mapping.
    pub subject: String,
    /// Teacher who owns the course.
    pub owner_id: UserId,
    /// Course-level switch for AI-generated content.
    pub ai_enabled: bool,
}

impl Course {
    pub fn new(
        id: CourseId,
        title: impl Into<String>,
        subject: impl Into<String>,
        owner_id: UserId,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            subject: subject.into(),
            owner_id,
            ai_enabled: true,
        }
    }

    pub fn with_ai_enabled(mut self, enabled: bool) -> Self {
        self.ai_enabled = enabled;
        self
    }

    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.owner_id == user
    }

    pub fn ensure_owner(&self, user: UserId) -> DomainResult<()> {
        if self.is_owned_by(user) {
            Ok(())
        } else {
            Err(DomainError::unauthorized(format!(
                "user {user} does not own course {}",
                self.id
            )))
        }
    }
}
