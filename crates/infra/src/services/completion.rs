//! Completion detection and the downstream cascade.
//!
//! The transition to `completed` is committed together with the published
//! grade in one compare-and-swap on the enrollment row. Only the caller whose
//! commit succeeds runs the fan-out, so the cascade fires at most once per
//! enrollment no matter how many graders reach 100% concurrently.
//!
//! Fan-out steps (certificate, career update, notifications) run after the
//! commit. Each failure is logged and returned as a [`CascadeWarning`]; none of
//! them rolls back the grade or blocks the others.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use lyceum_core::{AggregateRoot, DomainError, EnrollmentId, ExpectedVersion, UserId, aggregate::execute};
use lyceum_coursework::{FinalGradeCalculator, Grade};
use lyceum_credentials::Certificate;
use lyceum_enrollment::{
    CompleteEnrollment, Enrollment, EnrollmentCommand, EnrollmentStatus, ReviseFinalGrade,
};

use crate::activity::ENROLLMENT_STREAM;
use crate::error::{CascadeStep, CascadeWarning, EngineResult};
use crate::notification::{Notification, NotificationKind};
use crate::services::career::{CareerRecommendationEngine, CareerUpdate};
use crate::services::certificates::CertificateIssuer;
use crate::services::progress::{CourseworkSnapshot, ProgressTracker, ProgressUpdate};
use crate::services::{EngineContext, retry_on_conflict};

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionReport {
    pub enrollment: Enrollment,
    pub grade: Grade,
    pub certificate: Option<Certificate>,
    pub career: Option<CareerUpdate>,
    pub warnings: Vec<CascadeWarning>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome {
    /// The enrollment was completed earlier; nothing ran.
    AlreadyCompleted(Enrollment),
    /// This call performed the transition and ran the cascade.
    Completed(Box<CompletionReport>),
}

impl TriggerOutcome {
    pub fn report(&self) -> Option<&CompletionReport> {
        match self {
            TriggerOutcome::Completed(report) => Some(report),
            TriggerOutcome::AlreadyCompleted(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RepublishOutcome {
    pub enrollment: Enrollment,
    pub grade: Grade,
    pub career: Option<CareerUpdate>,
    pub warnings: Vec<CascadeWarning>,
}

#[derive(Debug, Clone)]
pub struct CompletionOrchestrator {
    ctx: Arc<EngineContext>,
    progress: ProgressTracker,
    certificates: CertificateIssuer,
    career: CareerRecommendationEngine,
}

impl CompletionOrchestrator {
    pub fn new(
        ctx: Arc<EngineContext>,
        progress: ProgressTracker,
        certificates: CertificateIssuer,
        career: CareerRecommendationEngine,
    ) -> Self {
        Self {
            ctx,
            progress,
            certificates,
            career,
        }
    }

    fn calculator(&self) -> FinalGradeCalculator {
        FinalGradeCalculator::new(self.ctx.config.weighting)
    }

    /// Single entry point once progress reaches 100%. Idempotent per enrollment.
    pub fn trigger(&self, id: EnrollmentId) -> EngineResult<TriggerOutcome> {
        retry_on_conflict(self.ctx.config.max_conflict_retries, "trigger_completion", |_| {
            let enrollment = self.ctx.load_enrollment(id)?;
            self.try_trigger(&enrollment)
        })
    }

    /// Recompute progress and complete the enrollment if it is active at 100%.
    ///
    /// Runs after every grade and after every transition back to `active`, so
    /// an enrollment that reached 100% while suspended completes on reinstate.
    /// The pair is retried as one unit on a lost compare-and-swap.
    pub fn settle(
        &self,
        id: EnrollmentId,
        operation: &'static str,
    ) -> EngineResult<(ProgressUpdate, Option<TriggerOutcome>)> {
        retry_on_conflict(self.ctx.config.max_conflict_retries, operation, |attempt| {
            let progress = self.progress.try_recompute(id)?;
            let ready = progress.percentage.is_full()
                && progress.enrollment.status() == EnrollmentStatus::Active;
            let completion = if ready {
                debug!(enrollment_id = %id, attempt, operation, "progress at 100%, triggering completion");
                Some(self.try_trigger(&progress.enrollment)?)
            } else {
                None
            };
            Ok((progress, completion))
        })
    }

    /// One attempt against an already loaded enrollment. A lost race surfaces
    /// as a store conflict for the caller's retry loop.
    pub(crate) fn try_trigger(&self, enrollment: &Enrollment) -> EngineResult<TriggerOutcome> {
        if enrollment.is_completed() {
            return Ok(TriggerOutcome::AlreadyCompleted(enrollment.clone()));
        }
        if enrollment.status() != EnrollmentStatus::Active {
            return Err(DomainError::invalid_state(format!(
                "cannot complete enrollment in status '{}'",
                enrollment.status()
            ))
            .into());
        }

        let id = enrollment.id_typed();
        let snapshot =
            CourseworkSnapshot::load(&self.ctx, enrollment.course_id(), enrollment.student_id())?;
        if !snapshot.completion().is_full() {
            return Err(DomainError::invalid_state(format!(
                "enrollment {id} is at {}, not 100%",
                snapshot.completion()
            ))
            .into());
        }

        let now = Utc::now();
        let components = self.calculator().compute(&snapshot.graded_work());
        let grade = Grade::finalize(
            self.ctx.store.grade_for(id)?,
            id,
            enrollment.student_id(),
            enrollment.course_id(),
            components,
            now,
        );

        let mut completed = enrollment.clone();
        let events = execute(
            &mut completed,
            &EnrollmentCommand::Complete(CompleteEnrollment {
                enrollment_id: id,
                final_score: grade.components.final_score,
                letter_grade: grade.components.letter,
                occurred_at: now,
            }),
        )?;

        self.ctx.store.commit_final_grade(
            &completed,
            ExpectedVersion::Exact(enrollment.version()),
            &grade,
        )?;
        info!(
            enrollment_id = %id,
            final_score = %grade.components.final_score,
            letter = %grade.components.letter,
            "enrollment completed"
        );

        let mut warnings = Vec::new();
        if let Err(w) = self
            .ctx
            .activity
            .record(*id.as_uuid(), ENROLLMENT_STREAM, None, &events)
        {
            warnings.push(w);
        }

        let report = self.fan_out(completed, grade, warnings, true);
        Ok(TriggerOutcome::Completed(Box::new(report)))
    }

    /// Re-run the idempotent fan-out steps of a completed enrollment (after a
    /// crash or a failed step). Completion is not re-announced.
    pub fn resume_fan_out(&self, id: EnrollmentId) -> EngineResult<CompletionReport> {
        let enrollment = self.ctx.load_enrollment(id)?;
        if !enrollment.is_completed() {
            return Err(DomainError::invalid_state(format!(
                "enrollment {id} is not completed"
            ))
            .into());
        }
        let grade = self
            .ctx
            .store
            .grade_for(id)?
            .ok_or_else(|| DomainError::invalid_state(format!("enrollment {id} has no grade")))?;

        Ok(self.fan_out(enrollment, grade, Vec::new(), false))
    }

    /// Human-triggered score correction after completion. Skills follow the
    /// corrected grade; the certificate keeps its issue-time snapshot.
    pub fn republish_grade(&self, id: EnrollmentId, actor: UserId) -> EngineResult<RepublishOutcome> {
        let (enrollment, grade, events) =
            retry_on_conflict(self.ctx.config.max_conflict_retries, "republish_grade", |_| {
                let current = self.ctx.load_enrollment(id)?;
                if !current.is_completed() {
                    return Err(DomainError::invalid_state(format!(
                        "cannot republish the grade of enrollment in status '{}'",
                        current.status()
                    ))
                    .into());
                }
                self.ctx.load_course(current.course_id())?.ensure_owner(actor)?;

                let snapshot =
                    CourseworkSnapshot::load(&self.ctx, current.course_id(), current.student_id())?;
                let now = Utc::now();
                let mut grade = self.ctx.store.grade_for(id)?.ok_or_else(|| {
                    DomainError::invalid_state(format!("enrollment {id} has no grade"))
                })?;
                grade.republish(self.calculator().compute(&snapshot.graded_work()), now)?;

                let mut next = current.clone();
                let events = execute(
                    &mut next,
                    &EnrollmentCommand::ReviseFinalGrade(ReviseFinalGrade {
                        enrollment_id: id,
                        final_score: grade.components.final_score,
                        letter_grade: grade.components.letter,
                        revised_by: actor,
                        occurred_at: now,
                    }),
                )?;
                self.ctx.store.commit_final_grade(
                    &next,
                    ExpectedVersion::Exact(current.version()),
                    &grade,
                )?;
                Ok((next, grade, events))
            })?;

        info!(
            enrollment_id = %id,
            revision = grade.revision,
            final_score = %grade.components.final_score,
            "grade republished"
        );

        let mut warnings = Vec::new();
        if let Err(w) = self
            .ctx
            .activity
            .record(*id.as_uuid(), ENROLLMENT_STREAM, Some(actor), &events)
        {
            warnings.push(w);
        }
        let career = self.run_career(id, &mut warnings);

        Ok(RepublishOutcome {
            enrollment,
            grade,
            career,
            warnings,
        })
    }

    fn run_career(&self, id: EnrollmentId, warnings: &mut Vec<CascadeWarning>) -> Option<CareerUpdate> {
        match self.career.update_for_completion(id) {
            Ok(update) => {
                warnings.extend(update.warnings.iter().cloned());
                Some(update)
            }
            Err(err) => {
                warn!(enrollment_id = %id, error = %err, "career update failed");
                warnings.push(CascadeWarning::new(CascadeStep::CareerUpdate, err));
                None
            }
        }
    }

    fn fan_out(
        &self,
        enrollment: Enrollment,
        grade: Grade,
        mut warnings: Vec<CascadeWarning>,
        announce: bool,
    ) -> CompletionReport {
        let id = enrollment.id_typed();

        let (certificate, certificate_created) = match self.certificates.issue(id) {
            Ok(issued) => {
                warnings.extend(issued.warnings);
                (Some(issued.certificate), issued.created)
            }
            Err(err) => {
                warn!(enrollment_id = %id, error = %err, "certificate issuance failed");
                warnings.push(CascadeWarning::new(CascadeStep::Certificate, err));
                (None, false)
            }
        };

        let career = self.run_career(id, &mut warnings);

        let mut notifications = Vec::new();
        let course_title = self
            .ctx
            .load_course(enrollment.course_id())
            .map(|c| c.title)
            .unwrap_or_else(|_| "your course".to_string());

        if announce {
            notifications.push(Notification::new(
                enrollment.student_id(),
                NotificationKind::CourseCompleted,
                "Course completed",
                format!(
                    "You completed {course_title} with {} ({}).",
                    grade.components.letter, grade.components.final_score
                ),
            ));
        }
        if let (Some(cert), true) = (&certificate, certificate_created) {
            notifications.push(
                Notification::new(
                    enrollment.student_id(),
                    NotificationKind::CertificateIssued,
                    "Certificate issued",
                    format!(
                        "Your certificate for {course_title} is ready. Verification code: {}",
                        cert.verification_code
                    ),
                )
                .with_certificate(cert.certificate_id.clone()),
            );
        }
        if career.as_ref().is_some_and(CareerUpdate::any_level_changed) {
            notifications.push(Notification::new(
                enrollment.student_id(),
                NotificationKind::SkillsUpdated,
                "Skills updated",
                format!("Your skill profile was updated after completing {course_title}."),
            ));
        }

        for notification in notifications {
            let notification = notification.with_enrollment(id, enrollment.course_id());
            if let Some(w) = self.ctx.notify(notification) {
                warnings.push(w);
            }
        }

        CompletionReport {
            enrollment,
            grade,
            certificate,
            career,
            warnings,
        }
    }
}
