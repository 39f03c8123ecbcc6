//! Post-completion teacher ratings.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use lyceum_core::{DomainError, EnrollmentId, UserId};
use lyceum_enrollment::{TeacherRating, TeacherRatingSummary};

use crate::activity::{ActivityEvent, TEACHER_STREAM};
use crate::error::{CascadeWarning, EngineResult};
use crate::services::EngineContext;

#[derive(Debug, Clone, PartialEq)]
pub struct RatingOutcome {
    pub rating: TeacherRating,
    /// False when an earlier rating by the same student was replaced.
    pub created: bool,
    pub summary: TeacherRatingSummary,
    pub warnings: Vec<CascadeWarning>,
}

#[derive(Debug, Clone)]
pub struct RatingGate {
    ctx: Arc<EngineContext>,
}

impl RatingGate {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    /// Rate the course owner. Only the enrolled student may rate, and only once
    /// the enrollment is completed; a second rating replaces the first.
    pub fn submit_rating(
        &self,
        enrollment_id: EnrollmentId,
        actor: UserId,
        stars: u8,
        feedback: Option<String>,
    ) -> EngineResult<RatingOutcome> {
        let enrollment = self.ctx.load_enrollment(enrollment_id)?;
        if enrollment.student_id() != actor {
            return Err(DomainError::unauthorized(format!(
                "user {actor} cannot rate on behalf of enrollment {enrollment_id}"
            ))
            .into());
        }
        let course = self.ctx.load_course(enrollment.course_id())?;

        let now = Utc::now();
        let rating = TeacherRating::new(&enrollment, course.owner_id, stars, feedback, now)?;
        let (rating, created) = self.ctx.store.upsert_rating(rating)?;

        let ratings = self.ctx.store.ratings_for_teacher(course.owner_id)?;
        let summary = TeacherRatingSummary::from_ratings(course.owner_id, &ratings);
        self.ctx.store.save_teacher_summary(&summary)?;

        info!(
            teacher_id = %course.owner_id,
            %enrollment_id,
            stars,
            created,
            average = summary.average,
            count = summary.count,
            "teacher rated"
        );

        let mut warnings = Vec::new();
        if let Err(w) = self.ctx.activity.record(
            *course.owner_id.as_uuid(),
            TEACHER_STREAM,
            Some(actor),
            &[ActivityEvent::TeacherRated {
                teacher_id: course.owner_id,
                course_id: course.id,
                stars: rating.stars,
                created,
                occurred_at: now,
            }],
        ) {
            warnings.push(w);
        }

        Ok(RatingOutcome {
            rating,
            created,
            summary,
            warnings,
        })
    }

    pub fn summary(&self, teacher_id: UserId) -> EngineResult<Option<TeacherRatingSummary>> {
        Ok(self.ctx.store.teacher_summary(teacher_id)?)
    }
}
