//! Append-only activity log with publication on the event bus.
//!
//! Entries are appended to the store first and published second, after the
//! state change they describe has committed. A failure at either step is
//! reported as a warning and never undoes the committed change.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use lyceum_core::{AssignmentId, CourseId, EnrollmentId, Percentage, SubmissionId, UserId};
use lyceum_events::{Event, EventBus, InMemoryEventBus, Subscription};

use crate::error::{CascadeStep, CascadeWarning};
use crate::notification::NotificationKind;
use crate::store::{AcademicStore, ActivityEntry, ActivityRecord, StoreError};

pub const ENROLLMENT_STREAM: &str = "enrollment";
pub const SUBMISSION_STREAM: &str = "submission";
pub const CERTIFICATE_STREAM: &str = "certificate";
pub const STUDENT_STREAM: &str = "student";
pub const TEACHER_STREAM: &str = "teacher";

/// Facts recorded for records that are not event-sourced aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActivityEvent {
    SubmissionGraded {
        submission_id: SubmissionId,
        assignment_id: AssignmentId,
        student_id: UserId,
        points_earned: f64,
        percentage: Percentage,
        regrade: bool,
        occurred_at: DateTime<Utc>,
    },
    CertificateIssued {
        certificate_id: String,
        enrollment_id: EnrollmentId,
        occurred_at: DateTime<Utc>,
    },
    SkillsUpdated {
        student_id: UserId,
        course_id: CourseId,
        skills: Vec<String>,
        occurred_at: DateTime<Utc>,
    },
    RecommendationsRecomputed {
        student_id: UserId,
        kept: usize,
        occurred_at: DateTime<Utc>,
    },
    TeacherRated {
        teacher_id: UserId,
        course_id: CourseId,
        stars: u8,
        created: bool,
        occurred_at: DateTime<Utc>,
    },
    NotificationFailed {
        user_id: UserId,
        kind: NotificationKind,
        error: String,
        occurred_at: DateTime<Utc>,
    },
    CertificateRenderFailed {
        certificate_id: String,
        enrollment_id: EnrollmentId,
        error: String,
        occurred_at: DateTime<Utc>,
    },
}

impl Event for ActivityEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ActivityEvent::SubmissionGraded { .. } => "submission.graded",
            ActivityEvent::CertificateIssued { .. } => "certificate.issued",
            ActivityEvent::SkillsUpdated { .. } => "career.skills_updated",
            ActivityEvent::RecommendationsRecomputed { .. } => "career.recommendations_recomputed",
            ActivityEvent::TeacherRated { .. } => "rating.submitted",
            ActivityEvent::NotificationFailed { .. } => "delivery.notification_failed",
            ActivityEvent::CertificateRenderFailed { .. } => "delivery.render_failed",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ActivityEvent::SubmissionGraded { occurred_at, .. }
            | ActivityEvent::CertificateIssued { occurred_at, .. }
            | ActivityEvent::SkillsUpdated { occurred_at, .. }
            | ActivityEvent::RecommendationsRecomputed { occurred_at, .. }
            | ActivityEvent::TeacherRated { occurred_at, .. }
            | ActivityEvent::NotificationFailed { occurred_at, .. }
            | ActivityEvent::CertificateRenderFailed { occurred_at, .. } => *occurred_at,
        }
    }
}

pub type ActivityBus = InMemoryEventBus<ActivityRecord>;

#[derive(Clone)]
pub struct ActivityLog {
    store: Arc<dyn AcademicStore>,
    bus: Arc<ActivityBus>,
}

impl std::fmt::Debug for ActivityLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityLog").finish_non_exhaustive()
    }
}

impl ActivityLog {
    pub fn new(store: Arc<dyn AcademicStore>, bus: Arc<ActivityBus>) -> Self {
        Self { store, bus }
    }

    pub fn subscribe(&self) -> Subscription<ActivityRecord> {
        self.bus.subscribe()
    }

    /// Only records appended to streams of `stream_type` (see the `*_STREAM` constants).
    pub fn subscribe_stream(&self, stream_type: &str) -> Subscription<ActivityRecord> {
        self.bus.subscribe_topic(stream_type)
    }

    pub fn history(&self, stream_id: Uuid) -> Result<Vec<ActivityRecord>, StoreError> {
        self.store.activity_for(stream_id)
    }

    /// Append then publish each event, in order.
    pub fn record<E>(
        &self,
        stream_id: Uuid,
        stream_type: &str,
        actor: Option<UserId>,
        events: &[E],
    ) -> Result<Vec<ActivityRecord>, CascadeWarning>
    where
        E: Event + Serialize,
    {
        let mut committed = Vec::with_capacity(events.len());

        for event in events {
            let payload = serde_json::to_value(event).map_err(|e| {
                self.warn(stream_id, event.event_type(), format!("serialize: {e}"))
            })?;

            let record = self
                .store
                .append_activity(ActivityEntry {
                    stream_id,
                    stream_type: stream_type.to_string(),
                    event_type: event.event_type().to_string(),
                    actor,
                    occurred_at: event.occurred_at(),
                    payload,
                })
                .map_err(|e| self.warn(stream_id, event.event_type(), e))?;

            let delivered = self
                .bus
                .publish(record.clone())
                .map_err(|e| self.warn(stream_id, event.event_type(), format!("publish: {e}")))?;
            debug!(%stream_id, event_type = event.event_type(), delivered, "activity published");

            committed.push(record);
        }

        Ok(committed)
    }

    fn warn(&self, stream_id: Uuid, event_type: &str, error: impl std::fmt::Display) -> CascadeWarning {
        let warning = CascadeWarning::new(CascadeStep::ActivityLog, format!("{event_type}: {error}"));
        warn!(%stream_id, event_type, error = %warning.message, "activity log write failed");
        warning
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryAcademicStore;

    #[test]
    fn record_appends_then_publishes() {
        let store: Arc<dyn AcademicStore> = Arc::new(InMemoryAcademicStore::new());
        let log = ActivityLog::new(store, Arc::new(ActivityBus::new()));
        let sub = log.subscribe();
        let stream = Uuid::now_v7();

        let event = ActivityEvent::RecommendationsRecomputed {
            student_id: UserId::new(),
            kept: 2,
            occurred_at: Utc::now(),
        };
        let records = log
            .record(stream, STUDENT_STREAM, None, &[event.clone(), event])
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[1].sequence_number(), 2);
        assert_eq!(records[0].event_type(), "career.recommendations_recomputed");

        let published = sub.drain();
        assert_eq!(published, records);
        assert_eq!(log.history(stream).unwrap(), records);
    }

    #[test]
    fn stream_subscribers_skip_other_stream_types() {
        let store: Arc<dyn AcademicStore> = Arc::new(InMemoryAcademicStore::new());
        let log = ActivityLog::new(store, Arc::new(ActivityBus::new()));
        let teachers = log.subscribe_stream(TEACHER_STREAM);

        let recomputed = ActivityEvent::RecommendationsRecomputed {
            student_id: UserId::new(),
            kept: 0,
            occurred_at: Utc::now(),
        };
        log.record(Uuid::now_v7(), STUDENT_STREAM, None, &[recomputed])
            .unwrap();
        assert!(teachers.try_next().is_none());

        let rated = ActivityEvent::TeacherRated {
            teacher_id: UserId::new(),
            course_id: CourseId::new(),
            stars: 4,
            created: true,
            occurred_at: Utc::now(),
        };
        log.record(Uuid::now_v7(), TEACHER_STREAM, None, &[rated]).unwrap();
        let seen = teachers.drain();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].event_type(), "rating.submitted");
    }
}
