use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lyceum_core::{CourseId, DomainError, DomainResult, EnrollmentId, RecordId, UserId};

use crate::final_grade::GradeComponents;

/// Finalized outcome of one enrollment (at most one per enrollment).
///
/// Immutable once published, except through `republish`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grade {
    pub id: RecordId,
    pub enrollment_id: EnrollmentId,
    pub student_id: UserId,
    pub course_id: CourseId,
    pub components: GradeComponents,
    pub published: bool,
    pub published_at: Option<DateTime<Utc>>,
    /// Bumped on every republish; 0 for the first publication.
    pub revision: u32,
}

impl Grade {
    pub fn draft(
        enrollment_id: EnrollmentId,
        student_id: UserId,
        course_id: CourseId,
        components: GradeComponents,
    ) -> Self {
        Self {
            id: RecordId::new(),
            enrollment_id,
            student_id,
            course_id,
            components,
            published: false,
            published_at: None,
            revision: 0,
        }
    }

    /// Upsert-and-publish used by completion: an unpublished draft takes the new
    /// components, a published grade is returned unchanged.
    pub fn finalize(
        existing: Option<Grade>,
        enrollment_id: EnrollmentId,
        student_id: UserId,
        course_id: CourseId,
        components: GradeComponents,
        at: DateTime<Utc>,
    ) -> Grade {
        match existing {
            Some(g) if g.published => g,
            Some(mut g) => {
                g.components = components;
                g.published = true;
                g.published_at = Some(at);
                g
            }
            None => {
                let mut g = Grade::draft(enrollment_id, student_id, course_id, components);
                g.published = true;
                g.published_at = Some(at);
                g
            }
        }
    }

    /// Explicit, human-triggered correction of a published grade.
    pub fn republish(&mut self, components: GradeComponents, at: DateTime<Utc>) -> DomainResult<()> {
        if !self.published {
            return Err(DomainError::invalid_state(
                "only a published grade can be republished",
            ));
        }
        self.components = components;
        self.published_at = Some(at);
        self.revision += 1;
        Ok(())
    }
}
