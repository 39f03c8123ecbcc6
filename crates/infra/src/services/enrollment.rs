//! Enrollment lifecycle service.
//!
//! Every transition follows the same pipeline:
//!
//! ```text
//! load enrollment + course → authorize → handle command (pure) → apply
//!   → save (compare-and-swap on version) → activity log → notification
//! ```
//!
//! A lost compare-and-swap reloads and re-decides, bounded by
//! `EngineConfig::max_conflict_retries`. Transitions into `active` then settle
//! progress, which completes an enrollment already fully graded.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use lyceum_core::{
    AggregateRoot, CourseId, DomainError, EnrollmentId, ExpectedVersion, UserId, aggregate::execute,
};
use lyceum_coursework::Course;
use lyceum_enrollment::{
    ActivateEnrollment, ApproveEnrollment, DropEnrollment, Enrollment, EnrollmentCommand,
    EnrollmentEvent, EnrollmentStatus, RejectEnrollment, ReinstateEnrollment, RequestEnrollment, SuspendEnrollment,
};

use crate::activity::ENROLLMENT_STREAM;
use crate::error::{CascadeStep, CascadeWarning, EngineResult};
use crate::notification::{Notification, NotificationKind};
use crate::services::completion::{CompletionOrchestrator, TriggerOutcome};
use crate::services::progress::ProgressUpdate;
use crate::services::{EngineContext, retry_on_conflict};
use crate::store::StoreError;

/// Result of a lifecycle transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub enrollment: Enrollment,
    pub events: Vec<EnrollmentEvent>,
    /// Set when the transition made the enrollment active.
    pub progress: Option<ProgressUpdate>,
    /// Set when settling progress ran the completion gate.
    pub completion: Option<TriggerOutcome>,
    pub warnings: Vec<CascadeWarning>,
}

impl Transition {
    /// Transition warnings, then progress, then the completion cascade if it ran.
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

#[derive(Debug, Clone)]
pub struct EnrollmentService {
    ctx: Arc<EngineContext>,
    completion: CompletionOrchestrator,
}

fn owner_only(actor: UserId) -> impl Fn(&Enrollment, &Course) -> Result<(), DomainError> {
    move |_, course| course.ensure_owner(actor)
}

impl EnrollmentService {
    pub fn new(ctx: Arc<EngineContext>, completion: CompletionOrchestrator) -> Self {
        Self { ctx, completion }
    }

    pub fn get(&self, id: EnrollmentId) -> EngineResult<Enrollment> {
        self.ctx.load_enrollment(id)
    }

    /// Create a pending enrollment; a second request for the same
    /// `(student, course)` pair is a `Conflict`.
    pub fn request(&self, student_id: UserId, course_id: CourseId) -> EngineResult<Transition> {
        self.ctx.load_course(course_id)?;

        let id = EnrollmentId::new();
        let mut enrollment = Enrollment::empty(id, student_id, course_id);
        let events = execute(
            &mut enrollment,
            &EnrollmentCommand::Request(RequestEnrollment {
                enrollment_id: id,
                student_id,
                course_id,
                occurred_at: Utc::now(),
            }),
        )?;

        match self.ctx.store.insert_enrollment(&enrollment) {
            Ok(()) => {}
            Err(StoreError::UniqueViolation(msg)) => return Err(DomainError::conflict(msg).into()),
            Err(err) => return Err(err.into()),
        }

        info!(
            enrollment_id = %id,
            %student_id,
            %course_id,
            "enrollment requested"
        );
        Ok(self.finish(enrollment, events, student_id, None))
    }

    /// Approve and activate: `pending → active`, unlocking AI features.
    pub fn approve(&self, id: EnrollmentId, approver: UserId) -> EngineResult<Transition> {
        self.approve_with(id, approver, true)
    }

    /// Approve without activating: `pending → approved`.
    pub fn approve_only(&self, id: EnrollmentId, approver: UserId) -> EngineResult<Transition> {
        self.approve_with(id, approver, false)
    }

    fn approve_with(
        &self,
        id: EnrollmentId,
        approver: UserId,
        activate: bool,
    ) -> EngineResult<Transition> {
        let (enrollment, events) =
            self.transition(id, "approve", owner_only(approver), |e, at| {
                EnrollmentCommand::Approve(ApproveEnrollment {
                    enrollment_id: e.id_typed(),
                    approver,
                    activate,
                    occurred_at: at,
                })
            })?;

        let course = self.ctx.load_course(enrollment.course_id())?;
        let notification = Notification::new(
            enrollment.student_id(),
            NotificationKind::EnrollmentApproved,
            "Enrollment approved",
            format!("Your enrollment in {} has been approved.", course.title),
        )
        .with_enrollment(id, course.id);

        let transition = self.finish(enrollment, events, approver, Some(notification));
        Ok(self.settle(transition, "approve"))
    }

    pub fn reject(
        &self,
        id: EnrollmentId,
        rejected_by: UserId,
        reason: impl Into<String>,
    ) -> EngineResult<Transition> {
        let reason = reason.into();
        let (enrollment, events) =
            self.transition(id, "reject", owner_only(rejected_by), |e, at| {
                EnrollmentCommand::Reject(RejectEnrollment {
                    enrollment_id: e.id_typed(),
                    rejected_by,
                    reason: reason.clone(),
                    occurred_at: at,
                })
            })?;

        let course = self.ctx.load_course(enrollment.course_id())?;
        let notification = Notification::new(
            enrollment.student_id(),
            NotificationKind::EnrollmentRejected,
            "Enrollment rejected",
            format!(
                "Your enrollment in {} was rejected: {}",
                course.title,
                enrollment.rejection_reason().unwrap_or_default()
            ),
        )
        .with_enrollment(id, course.id);

        Ok(self.finish(enrollment, events, rejected_by, Some(notification)))
    }

    pub fn activate(&self, id: EnrollmentId, actor: UserId) -> EngineResult<Transition> {
        let (enrollment, events) = self.transition(id, "activate", owner_only(actor), |e, at| {
            EnrollmentCommand::Activate(ActivateEnrollment {
                enrollment_id: e.id_typed(),
                occurred_at: at,
            })
        })?;
        let transition = self.finish(enrollment, events, actor, None);
        Ok(self.settle(transition, "activate"))
    }

    pub fn suspend(
        &self,
        id: EnrollmentId,
        actor: UserId,
        reason: Option<String>,
    ) -> EngineResult<Transition> {
        let (enrollment, events) = self.transition(id, "suspend", owner_only(actor), |e, at| {
            EnrollmentCommand::Suspend(SuspendEnrollment {
                enrollment_id: e.id_typed(),
                suspended_by: actor,
                reason: reason.clone(),
                occurred_at: at,
            })
        })?;
        Ok(self.finish(enrollment, events, actor, None))
    }

    pub fn reinstate(&self, id: EnrollmentId, actor: UserId) -> EngineResult<Transition> {
        let (enrollment, events) = self.transition(id, "reinstate", owner_only(actor), |e, at| {
            EnrollmentCommand::Reinstate(ReinstateEnrollment {
                enrollment_id: e.id_typed(),
                reinstated_by: actor,
                occurred_at: at,
            })
        })?;
        let transition = self.finish(enrollment, events, actor, None);
        Ok(self.settle(transition, "reinstate"))
    }

    /// The student or the course owner may drop an enrollment.
    pub fn drop_enrollment(
        &self,
        id: EnrollmentId,
        actor: UserId,
        reason: Option<String>,
    ) -> EngineResult<Transition> {
        let authorize = move |e: &Enrollment, course: &Course| {
            if e.student_id() == actor || course.is_owned_by(actor) {
                Ok(())
            } else {
                Err(DomainError::unauthorized(format!(
                    "user {actor} may not drop enrollment {}",
                    e.id_typed()
                )))
            }
        };
        let (enrollment, events) = self.transition(id, "drop", authorize, |e, at| {
            EnrollmentCommand::Drop(DropEnrollment {
                enrollment_id: e.id_typed(),
                dropped_by: actor,
                reason: reason.clone(),
                occurred_at: at,
            })
        })?;
        Ok(self.finish(enrollment, events, actor, None))
    }

    /// Three-way AI gate, read fresh from the store on every call.
    pub fn is_ai_enabled(&self, id: EnrollmentId) -> EngineResult<bool> {
        let enrollment = self.ctx.load_enrollment(id)?;
        let course = self.ctx.load_course(enrollment.course_id())?;
        Ok(enrollment.is_ai_enabled(&course))
    }

    fn transition<A, C>(
        &self,
        id: EnrollmentId,
        action: &'static str,
        authorize: A,
        command: C,
    ) -> EngineResult<(Enrollment, Vec<EnrollmentEvent>)>
    where
        A: Fn(&Enrollment, &Course) -> Result<(), DomainError>,
        C: Fn(&Enrollment, DateTime<Utc>) -> EnrollmentCommand,
    {
        retry_on_conflict(self.ctx.config.max_conflict_retries, action, |_| {
            let current = self.ctx.load_enrollment(id)?;
            let course = self.ctx.load_course(current.course_id())?;
            authorize(&current, &course)?;

            let mut next = current.clone();
            let events = execute(&mut next, &command(&current, Utc::now()))?;
            if !events.is_empty() {
                self.ctx
                    .store
                    .save_enrollment(&next, ExpectedVersion::Exact(current.version()))?;
                info!(
                    enrollment_id = %id,
                    action,
                    from = %current.status(),
                    to = %next.status(),
                    version = next.version(),
                    "enrollment transition"
                );
            }
            Ok((next, events))
        })
    }

    fn finish(
        &self,
        enrollment: Enrollment,
        events: Vec<EnrollmentEvent>,
        actor: UserId,
        notification: Option<Notification>,
    ) -> Transition {
        let mut warnings = Vec::new();

        if let Err(w) = self.ctx.activity.record(
            *enrollment.id_typed().as_uuid(),
            ENROLLMENT_STREAM,
            Some(actor),
            &events,
        ) {
            warnings.push(w);
        }
        if let Some(w) = notification.and_then(|n| self.ctx.notify(n)) {
            warnings.push(w);
        }

        Transition {
            enrollment,
            events,
            progress: None,
            completion: None,
            warnings,
        }
    }

    /// Progress settles only once the enrollment is active. The transition has
    /// committed by now, so a failure here is a warning, not an error.
    fn settle(&self, mut transition: Transition, operation: &'static str) -> Transition {
        if transition.events.is_empty()
            || transition.enrollment.status() != EnrollmentStatus::Active
        {
            return transition;
        }

        let id = transition.enrollment.id_typed();
        match self.completion.settle(id, operation) {
            Ok((progress, completion)) => {
                if let Some(report) = completion.as_ref().and_then(TriggerOutcome::report) {
                    transition.enrollment = report.enrollment.clone();
                }
                transition.progress = Some(progress);
                transition.completion = completion;
            }
            Err(err) => {
                warn!(enrollment_id = %id, operation, error = %err, "progress not settled");
                transition.warnings.push(CascadeWarning::new(CascadeStep::Completion, err));
            }
        }
        transition
    }
}
