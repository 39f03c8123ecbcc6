use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lyceum_core::{AssignmentId, CourseId, DomainError, DomainResult, Percentage, SubmissionId, UserId};

use crate::assignment::Assignment;

/// One student's attempt at one assignment.
///
/// Ungraded until `record_grade` is called; re-grading overwrites the previous
/// score, feedback, grader and grading time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub assignment_id: AssignmentId,
    pub course_id: CourseId,
    pub student_id: UserId,
    pub submitted_at: DateTime<Utc>,
    pub is_late: bool,
    /// Submitted text, handed to the feedback generator when present.
    pub content: Option<String>,
    pub points_earned: Option<f64>,
    pub percentage_score: Option<Percentage>,
    pub feedback: Option<String>,
    pub graded_at: Option<DateTime<Utc>>,
    pub graded_by: Option<UserId>,
}

impl Submission {
    /// Record a new submission; lateness is derived from the assignment due time.
    pub fn submit(
        id: SubmissionId,
        assignment: &Assignment,
        student_id: UserId,
        content: Option<String>,
        submitted_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if !assignment.published {
            return Err(DomainError::invalid_state(
                "cannot submit to an unpublished assignment",
            ));
        }
        Ok(Self {
            id,
            assignment_id: assignment.id,
            course_id: assignment.course_id,
            student_id,
            submitted_at,
            is_late: assignment.is_late(submitted_at),
            content,
            points_earned: None,
            percentage_score: None,
            feedback: None,
            graded_at: None,
            graded_by: None,
        })
    }

    pub fn is_graded(&self) -> bool {
        self.points_earned.is_some()
    }

    /// Validate and record a score. Returns whether this was a re-grade.
    pub fn record_grade(
        &mut self,
        assignment: &Assignment,
        points_earned: f64,
        feedback: Option<String>,
        grader: UserId,
        graded_at: DateTime<Utc>,
    ) -> DomainResult<bool> {
        if assignment.id != self.assignment_id {
            return Err(DomainError::invariant("assignment_id mismatch"));
        }
        assignment.validate_points(points_earned)?;

        let regrade = self.is_graded();
        self.points_earned = Some(points_earned);
        self.percentage_score = Some(Percentage::ratio(points_earned, assignment.max_points));
        self.feedback = feedback;
        self.graded_by = Some(grader);
        self.graded_at = Some(graded_at);
        Ok(regrade)
    }
}
