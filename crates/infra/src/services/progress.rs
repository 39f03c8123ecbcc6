//! Completion-percentage recomputation.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use lyceum_core::{
    AggregateRoot, CourseId, EnrollmentId, ExpectedVersion, Percentage, UserId, aggregate::execute,
};
use lyceum_coursework::{Assignment, GradedWork, Submission, completion_percentage};
use lyceum_enrollment::{Enrollment, EnrollmentCommand, RecordProgress};

use crate::activity::ENROLLMENT_STREAM;
use crate::error::{CascadeWarning, EngineResult};
use crate::services::{EngineContext, retry_on_conflict};

/// Published coursework of one student in one course, read in one pass.
#[derive(Debug, Clone, Default)]
pub struct CourseworkSnapshot {
    pub published_assignments: usize,
    /// Graded submissions on published assignments, with their assignment.
    pub graded: Vec<(Submission, Assignment)>,
}

impl CourseworkSnapshot {
    pub fn load(ctx: &EngineContext, course_id: CourseId, student_id: UserId) -> EngineResult<Self> {
        let published: HashMap<_, Assignment> = ctx
            .store
            .assignments_for_course(course_id)?
            .into_iter()
            .filter(|a| a.published)
            .map(|a| (a.id, a))
            .collect();

        let graded = ctx
            .store
            .submissions_for(course_id, student_id)?
            .into_iter()
            .filter(|s| s.is_graded())
            .filter_map(|s| published.get(&s.assignment_id).cloned().map(|a| (s, a)))
            .collect();

        Ok(Self {
            published_assignments: published.len(),
            graded,
        })
    }

    pub fn completion(&self) -> Percentage {
        completion_percentage(self.published_assignments, self.graded.len())
    }

    pub fn graded_work(&self) -> Vec<GradedWork> {
        self.graded
            .iter()
            .filter_map(|(s, a)| {
                s.points_earned.map(|points| GradedWork {
                    category: a.kind.category(),
                    points_earned: points,
                    max_points: a.max_points,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub enrollment: Enrollment,
    pub percentage: Percentage,
    /// False when the stored value already matched (or the status is frozen).
    pub changed: bool,
    pub warnings: Vec<CascadeWarning>,
}

#[derive(Debug, Clone)]
pub struct ProgressTracker {
    ctx: Arc<EngineContext>,
}

impl ProgressTracker {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    /// Pure read: graded published work ÷ published assignments.
    pub fn compute(&self, course_id: CourseId, student_id: UserId) -> EngineResult<Percentage> {
        Ok(CourseworkSnapshot::load(&self.ctx, course_id, student_id)?.completion())
    }

    /// Full recomputation with an idempotent overwrite of the stored value.
    pub fn recompute(&self, id: EnrollmentId) -> EngineResult<ProgressUpdate> {
        retry_on_conflict(self.ctx.config.max_conflict_retries, "recompute_progress", |_| {
            self.try_recompute(id)
        })
    }

    /// One attempt. The enrollment is read before the coursework so a
    /// compare-and-swap success means no newer progress write was missed.
    pub(crate) fn try_recompute(&self, id: EnrollmentId) -> EngineResult<ProgressUpdate> {
        let current = self.ctx.load_enrollment(id)?;
        let percentage = self.compute(current.course_id(), current.student_id())?;

        let mut next = current.clone();
        let events = execute(
            &mut next,
            &EnrollmentCommand::RecordProgress(RecordProgress {
                enrollment_id: id,
                percentage,
                occurred_at: Utc::now(),
            }),
        )?;

        if events.is_empty() {
            return Ok(ProgressUpdate {
                percentage: next.completion(),
                enrollment: next,
                changed: false,
                warnings: Vec::new(),
            });
        }

        self.ctx
            .store
            .save_enrollment(&next, ExpectedVersion::Exact(current.version()))?;
        debug!(
            enrollment_id = %id,
            from = %current.completion(),
            to = %next.completion(),
            "progress recorded"
        );
        let warnings = match self
            .ctx
            .activity
            .record(*id.as_uuid(), ENROLLMENT_STREAM, None, &events)
        {
            Ok(_) => Vec::new(),
            Err(w) => vec![w],
        };

        Ok(ProgressUpdate {
            percentage: next.completion(),
            enrollment: next,
            changed: true,
            warnings,
        })
    }
}
