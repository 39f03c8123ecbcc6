//! Grading and the grade → progress → completion unit.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use lyceum_ai::{FeedbackGenerator, FeedbackReport, FeedbackRequest, RuleBasedFeedback};
use lyceum_core::{AssignmentId, DomainError, SubmissionId, UserId};
use lyceum_coursework::{Assignment, Course, Submission};
use lyceum_enrollment::EnrollmentStatus;

use crate::activity::{ActivityEvent, SUBMISSION_STREAM};
use crate::error::{CascadeStep, CascadeWarning, EngineResult};
use crate::notification::{Notification, NotificationKind};
use crate::services::completion::{CompletionOrchestrator, TriggerOutcome};
use crate::services::EngineContext;
use crate::services::progress::ProgressUpdate;
use crate::store::StoreError;
use crate::timeout::CallGuard;

#[derive(Debug, Clone, PartialEq)]
pub struct GradeSubmission {
    pub submission_id: SubmissionId,
    pub points_earned: f64,
    /// Generated when absent.
    pub feedback: Option<String>,
    pub grader: UserId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradingOutcome {
    pub submission: Submission,
    pub regrade: bool,
    /// Present when the feedback text was generated rather than supplied.
    pub feedback_report: Option<FeedbackReport>,
    /// None when the student has no enrollment in the course.
    pub progress: Option<ProgressUpdate>,
    pub completion: Option<TriggerOutcome>,
    pub warnings: Vec<CascadeWarning>,
}

impl GradingOutcome {
    /// Grading warnings, then progress, then the completion cascade if it ran.
    pub fn all_warnings(&self) -> Vec<&CascadeWarning> {
        let progress = self
            .progress
            .as_ref()
            .map(|p| p.warnings.as_slice())
            .unwrap_or_default();
        let cascade = self
            .completion
            .as_ref()
            .and_then(TriggerOutcome::report)
            .map(|r| r.warnings.as_slice())
            .unwrap_or_default();
        self.warnings.iter().chain(progress).chain(cascade).collect()
    }

    pub fn completed(&self) -> bool {
        matches!(self.completion, Some(TriggerOutcome::Completed(_)))
    }
}

#[derive(Clone)]
pub struct GradingEngine {
    ctx: Arc<EngineContext>,
    completion: CompletionOrchestrator,
    feedback: Option<Arc<dyn FeedbackGenerator>>,
    feedback_calls: CallGuard,
}

impl std::fmt::Debug for GradingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GradingEngine")
            .field("feedback_generator", &self.feedback.is_some())
            .finish_non_exhaustive()
    }
}

impl GradingEngine {
    pub fn new(
        ctx: Arc<EngineContext>,
        completion: CompletionOrchestrator,
        feedback: Option<Arc<dyn FeedbackGenerator>>,
    ) -> Self {
        let feedback_calls = ctx.config.call_guard("feedback");
        Self {
            ctx,
            completion,
            feedback,
            feedback_calls,
        }
    }

    /// Record a student's attempt. One submission per (assignment, student).
    pub fn submit(
        &self,
        assignment_id: AssignmentId,
        student_id: UserId,
        content: Option<String>,
    ) -> EngineResult<Submission> {
        let assignment = self.load_assignment(assignment_id)?;
        let enrollment = self
            .ctx
            .store
            .find_enrollment(student_id, assignment.course_id)?
            .ok_or_else(|| {
                DomainError::not_found(format!(
                    "enrollment of {student_id} in course {}",
                    assignment.course_id
                ))
            })?;
        if enrollment.status() != EnrollmentStatus::Active {
            return Err(DomainError::invalid_state(format!(
                "submissions require an active enrollment, found '{}'",
                enrollment.status()
            ))
            .into());
        }

        let submission =
            Submission::submit(SubmissionId::new(), &assignment, student_id, content, Utc::now())?;
        match self.ctx.store.insert_submission(&submission) {
            Ok(()) => {}
            Err(StoreError::UniqueViolation(msg)) => return Err(DomainError::conflict(msg).into()),
            Err(err) => return Err(err.into()),
        }

        info!(
            submission_id = %submission.id,
            %assignment_id,
            %student_id,
            late = submission.is_late,
            "submission received"
        );
        Ok(submission)
    }

    /// Grade (or re-grade) a submission, then recompute progress and, at 100%,
    /// hand the enrollment to the completion orchestrator.
    pub fn grade(&self, request: GradeSubmission) -> EngineResult<GradingOutcome> {
        let mut submission = self
            .ctx
            .store
            .submission(request.submission_id)?
            .ok_or_else(|| DomainError::not_found(format!("submission {}", request.submission_id)))?;
        let assignment = self.load_assignment(submission.assignment_id)?;
        assignment.validate_points(request.points_earned)?;
        let course = self.ctx.load_course(submission.course_id)?;
        course.ensure_owner(request.grader)?;

        let mut warnings = Vec::new();
        let supplied = request.feedback.filter(|text| !text.trim().is_empty());
        let (feedback, feedback_report) = match supplied {
            Some(text) => (text, None),
            None => {
                let report = self.generate_feedback(
                    &course,
                    &assignment,
                    &submission,
                    request.points_earned,
                    &mut warnings,
                )?;
                (report.feedback.clone(), Some(report))
            }
        };

        let now = Utc::now();
        let regrade = submission.record_grade(
            &assignment,
            request.points_earned,
            Some(feedback),
            request.grader,
            now,
        )?;
        self.ctx.store.save_submission(&submission)?;

        let percentage = submission
            .percentage_score
            .ok_or_else(|| DomainError::invariant("graded submission without a percentage"))?;
        info!(
            submission_id = %submission.id,
            grader = %request.grader,
            points = request.points_earned,
            %percentage,
            regrade,
            "submission graded"
        );

        if let Err(w) = self.ctx.activity.record(
            *submission.id.as_uuid(),
            SUBMISSION_STREAM,
            Some(request.grader),
            &[ActivityEvent::SubmissionGraded {
                submission_id: submission.id,
                assignment_id: assignment.id,
                student_id: submission.student_id,
                points_earned: request.points_earned,
                percentage,
                regrade,
                occurred_at: now,
            }],
        ) {
            warnings.push(w);
        }

        let enrollment = self
            .ctx
            .store
            .find_enrollment(submission.student_id, submission.course_id)?;

        let mut notification = Notification::new(
            submission.student_id,
            NotificationKind::SubmissionGraded,
            "Submission graded",
            format!("{} was graded: {percentage}.", assignment.title),
        )
        .with_submission(submission.id);
        if let Some(enrollment) = &enrollment {
            notification = notification.with_enrollment(enrollment.id_typed(), course.id);
        }
        if let Some(w) = self.ctx.notify(notification) {
            warnings.push(w);
        }

        let Some(enrollment) = enrollment else {
            debug!(submission_id = %submission.id, "no enrollment, progress not tracked");
            return Ok(GradingOutcome {
                submission,
                regrade,
                feedback_report,
                progress: None,
                completion: None,
                warnings,
            });
        };

        let (progress, completion) = self
            .completion
            .settle(enrollment.id_typed(), "grade_progress_completion")?;

        Ok(GradingOutcome {
            submission,
            regrade,
            feedback_report,
            progress: Some(progress),
            completion,
            warnings,
        })
    }

    fn load_assignment(&self, id: AssignmentId) -> EngineResult<Assignment> {
        self.ctx
            .store
            .assignment(id)?
            .ok_or_else(|| DomainError::not_found(format!("assignment {id}")).into())
    }

    fn generate_feedback(
        &self,
        course: &Course,
        assignment: &Assignment,
        submission: &Submission,
        points_earned: f64,
        warnings: &mut Vec<CascadeWarning>,
    ) -> EngineResult<FeedbackReport> {
        let previous_scores = self
            .ctx
            .store
            .submissions_for(course.id, submission.student_id)?
            .into_iter()
            .filter(|s| s.id != submission.id)
            .filter_map(|s| s.percentage_score.map(|p| p.value()))
            .collect();

        let request = FeedbackRequest {
            assignment_title: assignment.title.clone(),
            submission_text: submission.content.clone(),
            points_earned,
            max_points: assignment.max_points,
            is_late: submission.is_late,
            previous_scores,
        };

        if let (true, Some(generator)) = (course.ai_enabled, &self.feedback) {
            let generator = Arc::clone(generator);
            let call = request.clone();
            match self.feedback_calls.call(move || generator.generate(&call)) {
                Ok(Ok(report)) => return Ok(report),
                Ok(Err(err)) => {
                    warn!(submission_id = %submission.id, error = %err, "feedback generator failed");
                    warnings.push(CascadeWarning::new(CascadeStep::Feedback, err));
                }
                Err(err) => {
                    warn!(submission_id = %submission.id, error = %err, "feedback generator unreachable");
                    warnings.push(CascadeWarning::new(CascadeStep::Feedback, err));
                }
            }
        }

        RuleBasedFeedback
            .generate(&request)
            .map_err(|e| DomainError::validation(e.to_string()).into())
    }
}
