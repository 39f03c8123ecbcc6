use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lyceum_core::{Aggregate, AggregateRoot, CourseId, DomainError, EnrollmentId, Percentage, UserId};
use lyceum_coursework::{Course, LetterGrade};
use lyceum_events::Event;

/// Enrollment status lifecycle.
///
/// `pending → {approved | active | rejected}`, `approved → active`,
/// `active → {completed, dropped, suspended}`, `suspended → {active, dropped}`.
/// `completed`, `rejected` and `dropped` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    Pending,
    Approved,
    Active,
    Suspended,
    Completed,
    Dropped,
    Rejected,
}

impl EnrollmentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EnrollmentStatus::Completed | EnrollmentStatus::Dropped | EnrollmentStatus::Rejected
        )
    }

    /// Statuses in which graded work still moves the completion percentage.
    pub fn tracks_progress(self) -> bool {
        matches!(
            self,
            EnrollmentStatus::Approved | EnrollmentStatus::Active | EnrollmentStatus::Suspended
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EnrollmentStatus::Pending => "pending",
            EnrollmentStatus::Approved => "approved",
            EnrollmentStatus::Active => "active",
            EnrollmentStatus::Suspended => "suspended",
            EnrollmentStatus::Completed => "completed",
            EnrollmentStatus::Dropped => "dropped",
            EnrollmentStatus::Rejected => "rejected",
        }
    }
}

impl core::fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate root: Enrollment (one student in one course).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    id: EnrollmentId,
    student_id: UserId,
    course_id: CourseId,
    status: EnrollmentStatus,
    completion: Percentage,
    final_score: Option<Percentage>,
    letter_grade: Option<LetterGrade>,
    ai_features_unlocked: bool,
    requested_at: Option<DateTime<Utc>>,
    approved_by: Option<UserId>,
    approved_at: Option<DateTime<Utc>>,
    rejection_reason: Option<String>,
    completed_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Enrollment {
    /// Create an empty, not-yet-requested aggregate instance.
    pub fn empty(id: EnrollmentId, student_id: UserId, course_id: CourseId) -> Self {
        Self {
            id,
            student_id,
            course_id,
            status: EnrollmentStatus::Pending,
            completion: Percentage::ZERO,
            final_score: None,
            letter_grade: None,
            ai_features_unlocked: false,
            requested_at: None,
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
            completed_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> EnrollmentId {
        self.id
    }

    pub fn student_id(&self) -> UserId {
        self.student_id
    }

    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    pub fn status(&self) -> EnrollmentStatus {
        self.status
    }

    pub fn completion(&self) -> Percentage {
        self.completion
    }

    pub fn final_score(&self) -> Option<Percentage> {
        self.final_score
    }

    pub fn letter_grade(&self) -> Option<LetterGrade> {
        self.letter_grade
    }

    pub fn ai_features_unlocked(&self) -> bool {
        self.ai_features_unlocked
    }

    pub fn approved_by(&self) -> Option<UserId> {
        self.approved_by
    }

    pub fn approved_at(&self) -> Option<DateTime<Utc>> {
        self.approved_at
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection_reason.as_deref()
    }

    pub fn requested_at(&self) -> Option<DateTime<Utc>> {
        self.requested_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn is_completed(&self) -> bool {
        self.status == EnrollmentStatus::Completed
    }

    /// Three-way AI gate; evaluated on every call, never cached.
    pub fn is_ai_enabled(&self, course: &Course) -> bool {
        ai_features_enabled(self, course)
    }
}

/// AI features are visible only while the enrollment is approved/active, its
/// unlock flag is set and the course still allows AI content.
pub fn ai_features_enabled(enrollment: &Enrollment, course: &Course) -> bool {
    enrollment.course_id == course.id
        && matches!(
            enrollment.status,
            EnrollmentStatus::Active | EnrollmentStatus::Approved
        )
        && enrollment.ai_features_unlocked
        && course.ai_enabled
}

impl AggregateRoot for Enrollment {
    type Id = EnrollmentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RequestEnrollment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnrollment {
    pub enrollment_id: EnrollmentId,
    pub student_id: UserId,
    pub course_id: CourseId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApproveEnrollment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApproveEnrollment {
    pub enrollment_id: EnrollmentId,
    pub approver: UserId,
    /// Move straight to `active` (the normal path) instead of stopping at `approved`.
    pub activate: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RejectEnrollment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectEnrollment {
    pub enrollment_id: EnrollmentId,
    pub rejected_by: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ActivateEnrollment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivateEnrollment {
    pub enrollment_id: EnrollmentId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DropEnrollment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropEnrollment {
    pub enrollment_id: EnrollmentId,
    pub dropped_by: UserId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SuspendEnrollment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspendEnrollment {
    pub enrollment_id: EnrollmentId,
    pub suspended_by: UserId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReinstateEnrollment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReinstateEnrollment {
    pub enrollment_id: EnrollmentId,
    pub reinstated_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordProgress (result of a full recomputation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordProgress {
    pub enrollment_id: EnrollmentId,
    pub percentage: Percentage,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CompleteEnrollment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteEnrollment {
    pub enrollment_id: EnrollmentId,
    pub final_score: Percentage,
    pub letter_grade: LetterGrade,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReviseFinalGrade (republish after a score correction).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviseFinalGrade {
    pub enrollment_id: EnrollmentId,
    pub final_score: Percentage,
    pub letter_grade: LetterGrade,
    pub revised_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EnrollmentCommand {
    Request(RequestEnrollment),
    Approve(ApproveEnrollment),
    Reject(RejectEnrollment),
    Activate(ActivateEnrollment),
    Drop(DropEnrollment),
    Suspend(SuspendEnrollment),
    Reinstate(ReinstateEnrollment),
    RecordProgress(RecordProgress),
    Complete(CompleteEnrollment),
    ReviseFinalGrade(ReviseFinalGrade),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EnrollmentEvent {
    Requested {
        enrollment_id: EnrollmentId,
        student_id: UserId,
        course_id: CourseId,
        occurred_at: DateTime<Utc>,
    },
    Approved {
        enrollment_id: EnrollmentId,
        approver: UserId,
        activated: bool,
        occurred_at: DateTime<Utc>,
    },
    Rejected {
        enrollment_id: EnrollmentId,
        rejected_by: UserId,
        reason: String,
        occurred_at: DateTime<Utc>,
    },
    Activated {
        enrollment_id: EnrollmentId,
        occurred_at: DateTime<Utc>,
    },
    Dropped {
        enrollment_id: EnrollmentId,
        dropped_by: UserId,
        reason: Option<String>,
        occurred_at: DateTime<Utc>,
    },
    Suspended {
        enrollment_id: EnrollmentId,
        suspended_by: UserId,
        reason: Option<String>,
        occurred_at: DateTime<Utc>,
    },
    Reinstated {
        enrollment_id: EnrollmentId,
        reinstated_by: UserId,
        occurred_at: DateTime<Utc>,
    },
    ProgressRecorded {
        enrollment_id: EnrollmentId,
        previous: Percentage,
        percentage: Percentage,
        occurred_at: DateTime<Utc>,
    },
    Completed {
        enrollment_id: EnrollmentId,
        final_score: Percentage,
        letter_grade: LetterGrade,
        occurred_at: DateTime<Utc>,
    },
    FinalGradeRevised {
        enrollment_id: EnrollmentId,
        final_score: Percentage,
        letter_grade: LetterGrade,
        revised_by: UserId,
        occurred_at: DateTime<Utc>,
    },
}

impl Event for EnrollmentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            EnrollmentEvent::Requested { .. } => "enrollment.requested",
            EnrollmentEvent::Approved { .. } => "enrollment.approved",
            EnrollmentEvent::Rejected { .. } => "enrollment.rejected",
            EnrollmentEvent::Activated { .. } => "enrollment.activated",
            EnrollmentEvent::Dropped { .. } => "enrollment.dropped",
            EnrollmentEvent::Suspended { .. } => "enrollment.suspended",
            EnrollmentEvent::Reinstated { .. } => "enrollment.reinstated",
            EnrollmentEvent::ProgressRecorded { .. } => "enrollment.progress_recorded",
            EnrollmentEvent::Completed { .. } => "enrollment.completed",
            EnrollmentEvent::FinalGradeRevised { .. } => "enrollment.final_grade_revised",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            EnrollmentEvent::Requested { occurred_at, .. }
            | EnrollmentEvent::Approved { occurred_at, .. }
            | EnrollmentEvent::Rejected { occurred_at, .. }
            | EnrollmentEvent::Activated { occurred_at, .. }
            | EnrollmentEvent::Dropped { occurred_at, .. }
            | EnrollmentEvent::Suspended { occurred_at, .. }
            | EnrollmentEvent::Reinstated { occurred_at, .. }
            | EnrollmentEvent::ProgressRecorded { occurred_at, .. }
            | EnrollmentEvent::Completed { occurred_at, .. }
            | EnrollmentEvent::FinalGradeRevised { occurred_at, .. } => *occurred_at,
        }
    }
}

impl Aggregate for Enrollment {
    type Command = EnrollmentCommand;
    type Event = EnrollmentEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            EnrollmentEvent::Requested { occurred_at, .. } => {
                self.status = EnrollmentStatus::Pending;
                self.requested_at = Some(*occurred_at);
                self.created = true;
            }
            EnrollmentEvent::Approved {
                approver,
                activated,
                occurred_at,
                ..
            } => {
                self.status = if *activated {
                    EnrollmentStatus::Active
                } else {
                    EnrollmentStatus::Approved
                };
                self.approved_by = Some(*approver);
                self.approved_at = Some(*occurred_at);
                self.ai_features_unlocked = true;
            }
            EnrollmentEvent::Rejected { reason, .. } => {
                self.status = EnrollmentStatus::Rejected;
                self.ai_features_unlocked = false;
                self.rejection_reason = Some(reason.clone());
            }
            EnrollmentEvent::Activated { .. } => {
                self.status = EnrollmentStatus::Active;
            }
            EnrollmentEvent::Dropped { .. } => {
                self.status = EnrollmentStatus::Dropped;
                self.ai_features_unlocked = false;
            }
            EnrollmentEvent::Suspended { .. } => {
                self.status = EnrollmentStatus::Suspended;
            }
            EnrollmentEvent::Reinstated { .. } => {
                self.status = EnrollmentStatus::Active;
            }
            EnrollmentEvent::ProgressRecorded { percentage, .. } => {
                self.completion = *percentage;
            }
            EnrollmentEvent::Completed {
                final_score,
                letter_grade,
                occurred_at,
                ..
            } => {
                self.status = EnrollmentStatus::Completed;
                self.completion = Percentage::FULL;
                self.final_score = Some(*final_score);
                self.letter_grade = Some(*letter_grade);
                self.completed_at = Some(*occurred_at);
            }
            EnrollmentEvent::FinalGradeRevised {
                final_score,
                letter_grade,
                ..
            } => {
                self.final_score = Some(*final_score);
                self.letter_grade = Some(*letter_grade);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            EnrollmentCommand::Request(cmd) => self.handle_request(cmd),
            EnrollmentCommand::Approve(cmd) => self.handle_approve(cmd),
            EnrollmentCommand::Reject(cmd) => self.handle_reject(cmd),
            EnrollmentCommand::Activate(cmd) => self.handle_activate(cmd),
            EnrollmentCommand::Drop(cmd) => self.handle_drop(cmd),
            EnrollmentCommand::Suspend(cmd) => self.handle_suspend(cmd),
            EnrollmentCommand::Reinstate(cmd) => self.handle_reinstate(cmd),
            EnrollmentCommand::RecordProgress(cmd) => self.handle_record_progress(cmd),
            EnrollmentCommand::Complete(cmd) => self.handle_complete(cmd),
            EnrollmentCommand::ReviseFinalGrade(cmd) => self.handle_revise(cmd),
        }
    }
}

impl Enrollment {
    fn ensure_exists(&self, enrollment_id: EnrollmentId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("enrollment {enrollment_id}")));
        }
        if self.id != enrollment_id {
            return Err(DomainError::invariant("enrollment_id mismatch"));
        }
        Ok(())
    }

    fn ensure_status(&self, allowed: &[EnrollmentStatus], action: &str) -> Result<(), DomainError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(DomainError::invalid_state(format!(
                "cannot {action} enrollment in status '{}'",
                self.status
            )))
        }
    }

    fn handle_request(&self, cmd: &RequestEnrollment) -> Result<Vec<EnrollmentEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("enrollment already exists"));
        }
        if cmd.enrollment_id != self.id
            || cmd.student_id != self.student_id
            || cmd.course_id != self.course_id
        {
            return Err(DomainError::invariant("enrollment identity mismatch"));
        }

        Ok(vec![EnrollmentEvent::Requested {
            enrollment_id: cmd.enrollment_id,
            student_id: cmd.student_id,
            course_id: cmd.course_id,
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_approve(&self, cmd: &ApproveEnrollment) -> Result<Vec<EnrollmentEvent>, DomainError> {
        self.ensure_exists(cmd.enrollment_id)?;
        self.ensure_status(&[EnrollmentStatus::Pending], "approve")?;

        Ok(vec![EnrollmentEvent::Approved {
            enrollment_id: cmd.enrollment_id,
            approver: cmd.approver,
            activated: cmd.activate,
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_reject(&self, cmd: &RejectEnrollment) -> Result<Vec<EnrollmentEvent>, DomainError> {
        self.ensure_exists(cmd.enrollment_id)?;
        self.ensure_status(&[EnrollmentStatus::Pending], "reject")?;

        let reason = cmd.reason.trim();
        if reason.is_empty() {
            return Err(DomainError::validation("rejection reason is required"));
        }

        Ok(vec![EnrollmentEvent::Rejected {
            enrollment_id: cmd.enrollment_id,
            rejected_by: cmd.rejected_by,
            reason: reason.to_string(),
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_activate(&self, cmd: &ActivateEnrollment) -> Result<Vec<EnrollmentEvent>, DomainError> {
        self.ensure_exists(cmd.enrollment_id)?;
        self.ensure_status(&[EnrollmentStatus::Approved], "activate")?;

        Ok(vec![EnrollmentEvent::Activated {
            enrollment_id: cmd.enrollment_id,
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_drop(&self, cmd: &DropEnrollment) -> Result<Vec<EnrollmentEvent>, DomainError> {
        self.ensure_exists(cmd.enrollment_id)?;
        self.ensure_status(
            &[
                EnrollmentStatus::Approved,
                EnrollmentStatus::Active,
                EnrollmentStatus::Suspended,
            ],
            "drop",
        )?;

        Ok(vec![EnrollmentEvent::Dropped {
            enrollment_id: cmd.enrollment_id,
            dropped_by: cmd.dropped_by,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_suspend(&self, cmd: &SuspendEnrollment) -> Result<Vec<EnrollmentEvent>, DomainError> {
        self.ensure_exists(cmd.enrollment_id)?;
        self.ensure_status(&[EnrollmentStatus::Active], "suspend")?;

        Ok(vec![EnrollmentEvent::Suspended {
            enrollment_id: cmd.enrollment_id,
            suspended_by: cmd.suspended_by,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_reinstate(
        &self,
        cmd: &ReinstateEnrollment,
    ) -> Result<Vec<EnrollmentEvent>, DomainError> {
        self.ensure_exists(cmd.enrollment_id)?;
        self.ensure_status(&[EnrollmentStatus::Suspended], "reinstate")?;

        Ok(vec![EnrollmentEvent::Reinstated {
            enrollment_id: cmd.enrollment_id,
            reinstated_by: cmd.reinstated_by,
            occurred_at: cmd.occurred_at,
        }])
    }

    /// No events when the value is unchanged or the status no longer tracks
    /// progress (completed enrollments stay frozen at 100%).
    fn handle_record_progress(
        &self,
        cmd: &RecordProgress,
    ) -> Result<Vec<EnrollmentEvent>, DomainError> {
        self.ensure_exists(cmd.enrollment_id)?;

        if !self.status.tracks_progress() || cmd.percentage == self.completion {
            return Ok(vec![]);
        }

        Ok(vec![EnrollmentEvent::ProgressRecorded {
            enrollment_id: cmd.enrollment_id,
            previous: self.completion,
            percentage: cmd.percentage,
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_complete(&self, cmd: &CompleteEnrollment) -> Result<Vec<EnrollmentEvent>, DomainError> {
        self.ensure_exists(cmd.enrollment_id)?;
        self.ensure_status(&[EnrollmentStatus::Active], "complete")?;

        Ok(vec![EnrollmentEvent::Completed {
            enrollment_id: cmd.enrollment_id,
            final_score: cmd.final_score,
            letter_grade: cmd.letter_grade,
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_revise(&self, cmd: &ReviseFinalGrade) -> Result<Vec<EnrollmentEvent>, DomainError> {
        self.ensure_exists(cmd.enrollment_id)?;
        self.ensure_status(&[EnrollmentStatus::Completed], "revise the final grade of")?;

        Ok(vec![EnrollmentEvent::FinalGradeRevised {
            enrollment_id: cmd.enrollment_id,
            final_score: cmd.final_score,
            letter_grade: cmd.letter_grade,
            revised_by: cmd.revised_by,
            occurred_at: cmd.occurred_at,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lyceum_core::aggregate::execute;
    use proptest::prelude::*;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn test_course(id: CourseId) -> Course {
        Course::new(id, "Rust 101", "Computer Science", UserId::new())
    }

    fn requested() -> Enrollment {
        let mut e = Enrollment::empty(EnrollmentId::new(), UserId::new(), CourseId::new());
        let cmd = RequestEnrollment {
            enrollment_id: e.id_typed(),
            student_id: e.student_id(),
            course_id: e.course_id(),
            occurred_at: test_time(),
        };
        execute(&mut e, &EnrollmentCommand::Request(cmd)).unwrap();
        e
    }

    fn approve_cmd(e: &Enrollment) -> EnrollmentCommand {
        EnrollmentCommand::Approve(ApproveEnrollment {
            enrollment_id: e.id_typed(),
            approver: UserId::new(),
            activate: true,
            occurred_at: test_time(),
        })
    }

    fn active() -> Enrollment {
        let mut e = requested();
        let cmd = approve_cmd(&e);
        execute(&mut e, &cmd).unwrap();
        e
    }

    fn progress_cmd(e: &Enrollment, value: f64) -> EnrollmentCommand {
        EnrollmentCommand::RecordProgress(RecordProgress {
            enrollment_id: e.id_typed(),
            percentage: Percentage::clamped(value),
            occurred_at: test_time(),
        })
    }

    fn complete_cmd(e: &Enrollment) -> EnrollmentCommand {
        EnrollmentCommand::Complete(CompleteEnrollment {
            enrollment_id: e.id_typed(),
            final_score: Percentage::clamped(91.0),
            letter_grade: LetterGrade::AMinus,
            occurred_at: test_time(),
        })
    }

    #[test]
    fn request_creates_pending_enrollment() {
        let e = requested();
        assert_eq!(e.status(), EnrollmentStatus::Pending);
        assert!(!e.ai_features_unlocked());
        assert_eq!(e.version(), 1);
    }

    #[test]
    fn duplicate_request_conflicts() {
        let e = requested();
        let err = e
            .handle(&EnrollmentCommand::Request(RequestEnrollment {
                enrollment_id: e.id_typed(),
                student_id: e.student_id(),
                course_id: e.course_id(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn approve_activates_and_unlocks_ai() {
        let e = active();
        assert_eq!(e.status(), EnrollmentStatus::Active);
        assert!(e.ai_features_unlocked());
        assert!(e.approved_by().is_some());
        assert!(e.approved_at().is_some());
    }

    #[test]
    fn approving_twice_is_invalid_state() {
        let e = active();
        let err = e.handle(&approve_cmd(&e)).unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[test]
    fn reject_requires_reason_and_locks_ai() {
        let mut e = requested();
        let blank = EnrollmentCommand::Reject(RejectEnrollment {
            enrollment_id: e.id_typed(),
            rejected_by: UserId::new(),
            reason: "   ".to_string(),
            occurred_at: test_time(),
        });
        assert!(matches!(e.handle(&blank), Err(DomainError::Validation(_))));

        let cmd = EnrollmentCommand::Reject(RejectEnrollment {
            enrollment_id: e.id_typed(),
            rejected_by: UserId::new(),
            reason: "course full".to_string(),
            occurred_at: test_time(),
        });
        execute(&mut e, &cmd).unwrap();
        assert_eq!(e.status(), EnrollmentStatus::Rejected);
        assert_eq!(e.rejection_reason(), Some("course full"));
        assert!(!e.ai_features_unlocked());

        // Rejected enrollments can never be approved afterwards.
        assert!(matches!(
            e.handle(&approve_cmd(&e)),
            Err(DomainError::InvalidState(_))
        ));
    }

    #[test]
    fn approval_without_activation_then_activate() {
        let mut e = requested();
        let cmd = EnrollmentCommand::Approve(ApproveEnrollment {
            enrollment_id: e.id_typed(),
            approver: UserId::new(),
            activate: false,
            occurred_at: test_time(),
        });
        execute(&mut e, &cmd).unwrap();
        assert_eq!(e.status(), EnrollmentStatus::Approved);

        let activate = EnrollmentCommand::Activate(ActivateEnrollment {
            enrollment_id: e.id_typed(),
            occurred_at: test_time(),
        });
        execute(&mut e, &activate).unwrap();
        assert_eq!(e.status(), EnrollmentStatus::Active);
    }

    #[test]
    fn ai_gate_requires_all_three_conditions() {
        let e = active();
        let course = test_course(e.course_id());
        assert!(e.is_ai_enabled(&course));

        let disabled = course.clone().with_ai_enabled(false);
        assert!(!e.is_ai_enabled(&disabled));

        let pending = requested();
        assert!(!pending.is_ai_enabled(&test_course(pending.course_id())));

        let mut suspended = active();
        let cmd = EnrollmentCommand::Suspend(SuspendEnrollment {
            enrollment_id: suspended.id_typed(),
            suspended_by: UserId::new(),
            reason: None,
            occurred_at: test_time(),
        });
        execute(&mut suspended, &cmd).unwrap();
        assert!(suspended.ai_features_unlocked());
        assert!(!suspended.is_ai_enabled(&test_course(suspended.course_id())));
    }

    #[test]
    fn unchanged_progress_emits_nothing() {
        let mut e = active();
        let cmd = progress_cmd(&e, 50.0);
        execute(&mut e, &cmd).unwrap();
        let version = e.version();

        let events = e.handle(&progress_cmd(&e, 50.0)).unwrap();
        assert!(events.is_empty());
        assert_eq!(e.version(), version);
    }

    #[test]
    fn completion_freezes_progress_at_hundred() {
        let mut e = active();
        let cmd = complete_cmd(&e);
        execute(&mut e, &cmd).unwrap();

        assert!(e.is_completed());
        assert_eq!(e.completion(), Percentage::FULL);
        assert_eq!(e.letter_grade(), Some(LetterGrade::AMinus));

        assert!(e.handle(&progress_cmd(&e, 40.0)).unwrap().is_empty());
        assert!(matches!(
            e.handle(&complete_cmd(&e)),
            Err(DomainError::InvalidState(_))
        ));
    }

    #[test]
    fn suspended_enrollment_cannot_complete_until_reinstated() {
        let mut e = active();
        let suspend = EnrollmentCommand::Suspend(SuspendEnrollment {
            enrollment_id: e.id_typed(),
            suspended_by: UserId::new(),
            reason: Some("academic integrity review".to_string()),
            occurred_at: test_time(),
        });
        execute(&mut e, &suspend).unwrap();
        assert!(matches!(
            e.handle(&complete_cmd(&e)),
            Err(DomainError::InvalidState(_))
        ));

        let reinstate = EnrollmentCommand::Reinstate(ReinstateEnrollment {
            enrollment_id: e.id_typed(),
            reinstated_by: UserId::new(),
            occurred_at: test_time(),
        });
        execute(&mut e, &reinstate).unwrap();
        let cmd = complete_cmd(&e);
        execute(&mut e, &cmd).unwrap();
        assert!(e.is_completed());
    }

    #[test]
    fn revising_requires_completion() {
        let e = active();
        let cmd = EnrollmentCommand::ReviseFinalGrade(ReviseFinalGrade {
            enrollment_id: e.id_typed(),
            final_score: Percentage::clamped(70.0),
            letter_grade: LetterGrade::CMinus,
            revised_by: UserId::new(),
            occurred_at: test_time(),
        });
        assert!(matches!(e.handle(&cmd), Err(DomainError::InvalidState(_))));
    }

    fn any_command(e: &Enrollment, pick: u8) -> EnrollmentCommand {
        let id = e.id_typed();
        let at = test_time();
        match pick % 8 {
            0 => approve_cmd(e),
            1 => EnrollmentCommand::Reject(RejectEnrollment {
                enrollment_id: id,
                rejected_by: UserId::new(),
                reason: "no".to_string(),
                occurred_at: at,
            }),
            2 => EnrollmentCommand::Activate(ActivateEnrollment {
                enrollment_id: id,
                occurred_at: at,
            }),
            3 => EnrollmentCommand::Drop(DropEnrollment {
                enrollment_id: id,
                dropped_by: UserId::new(),
                reason: None,
                occurred_at: at,
            }),
            4 => EnrollmentCommand::Suspend(SuspendEnrollment {
                enrollment_id: id,
                suspended_by: UserId::new(),
                reason: None,
                occurred_at: at,
            }),
            5 => EnrollmentCommand::Reinstate(ReinstateEnrollment {
                enrollment_id: id,
                reinstated_by: UserId::new(),
                occurred_at: at,
            }),
            6 => progress_cmd(e, 100.0),
            _ => complete_cmd(e),
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: once dropped or rejected, no command sequence changes the status.
        #[test]
        fn dropped_and_rejected_never_resume(picks in prop::collection::vec(any::<u8>(), 1..30)) {
            let mut e = requested();
            let mut terminal: Option<EnrollmentStatus> = None;

            for pick in picks {
                let cmd = any_command(&e, pick);
                let _ = execute(&mut e, &cmd);

                if let Some(status) = terminal {
                    prop_assert_eq!(e.status(), status);
                }
                if matches!(e.status(), EnrollmentStatus::Dropped | EnrollmentStatus::Rejected) {
                    terminal = Some(e.status());
                }
            }
        }
    }
}
