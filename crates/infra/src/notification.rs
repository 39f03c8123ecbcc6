//! Notification delivery boundary.
//!
//! The [`Notifier`] bounds every attempt with a [`CallGuard`] and retries
//! transient failures per its [`RetryPolicy`]. It blocks for the whole retry
//! schedule, so the engine only ever calls it from the delivery worker (see
//! [`crate::delivery`]).

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use lyceum_core::{CourseId, EnrollmentId, SubmissionId, UserId};

use crate::retry::RetryPolicy;
use crate::timeout::CallGuard;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    EnrollmentApproved,
    EnrollmentRejected,
    SubmissionGraded,
    CourseCompleted,
    CertificateIssued,
    SkillsUpdated,
}

/// Typed references carried with a notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationMetadata {
    pub enrollment_id: Option<EnrollmentId>,
    pub course_id: Option<CourseId>,
    pub submission_id: Option<SubmissionId>,
    pub certificate_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub metadata: NotificationMetadata,
}

impl Notification {
    pub fn new(
        user_id: UserId,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            kind,
            title: title.into(),
            message: message.into(),
            metadata: NotificationMetadata::default(),
        }
    }

    pub fn with_enrollment(mut self, enrollment_id: EnrollmentId, course_id: CourseId) -> Self {
        self.metadata.enrollment_id = Some(enrollment_id);
        self.metadata.course_id = Some(course_id);
        self
    }

    pub fn with_submission(mut self, submission_id: SubmissionId) -> Self {
        self.metadata.submission_id = Some(submission_id);
        self
    }

    pub fn with_certificate(mut self, certificate_id: impl Into<String>) -> Self {
        self.metadata.certificate_id = Some(certificate_id.into());
        self
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotifyError {
    #[error("notification channel unavailable: {0}")]
    Unavailable(String),

    #[error("notification timed out or crashed: {0}")]
    Call(String),

    #[error("notification undeliverable after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

/// External delivery collaborator. Implementations may block on IO.
pub trait NotificationDispatcher: Send + Sync {
    fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes notifications to the log. Default when no channel is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDispatcher;

impl NotificationDispatcher for LogDispatcher {
    fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            user_id = %notification.user_id,
            kind = ?notification.kind,
            title = %notification.title,
            "notification"
        );
        Ok(())
    }
}

/// Keeps every delivered notification in memory.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn count(&self, kind: NotificationKind) -> usize {
        self.sent().iter().filter(|n| n.kind == kind).count()
    }
}

impl NotificationDispatcher for RecordingDispatcher {
    fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .map_err(|_| NotifyError::Unavailable("recording sink poisoned".to_string()))?
            .push(notification.clone());
        Ok(())
    }
}

/// Time-bounded, retrying front for a [`NotificationDispatcher`].
#[derive(Clone)]
pub struct Notifier {
    dispatcher: Arc<dyn NotificationDispatcher>,
    policy: RetryPolicy,
    calls: CallGuard,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("policy", &self.policy)
            .field("calls", &self.calls)
            .finish_non_exhaustive()
    }
}

impl Notifier {
    pub fn new(dispatcher: Arc<dyn NotificationDispatcher>, policy: RetryPolicy, calls: CallGuard) -> Self {
        Self {
            dispatcher,
            policy,
            calls,
        }
    }

    /// Deliver with bounded retries; returns the number of attempts used.
    pub fn notify(&self, notification: Notification) -> Result<u32, NotifyError> {
        let notification = Arc::new(notification);
        let kind = notification.kind;
        let user_id = notification.user_id;

        let delivered = self.policy.run(
            |_| {
                let dispatcher = Arc::clone(&self.dispatcher);
                let message = Arc::clone(&notification);
                self.calls
                    .call(move || dispatcher.send(&message))
                    .map_err(|e| NotifyError::Call(e.to_string()))
                    .and_then(|r| r)
            },
            |attempt, pause, err| {
                warn!(
                    %user_id,
                    ?kind,
                    attempt,
                    pause_ms = pause.as_millis() as u64,
                    error = %err,
                    "notification failed, retrying"
                );
            },
        );

        match delivered {
            Ok(((), attempts)) => {
                debug!(%user_id, ?kind, attempts, "notification delivered");
                Ok(attempts)
            }
            Err((err, attempts)) => Err(NotifyError::Exhausted {
                attempts,
                last: err.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::thread;
    use std::time::Duration;

    /// Fails the first `failures` sends, then delegates to a recorder.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
        inner: RecordingDispatcher,
    }

    impl NotificationDispatcher for Flaky {
        fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                return Err(NotifyError::Unavailable(format!("call {call}")));
            }
            self.inner.send(notification)
        }
    }

    fn flaky(failures: u32) -> Arc<Flaky> {
        Arc::new(Flaky {
            failures,
            calls: AtomicU32::new(0),
            inner: RecordingDispatcher::new(),
        })
    }

    fn notification() -> Notification {
        Notification::new(
            UserId::new(),
            NotificationKind::CourseCompleted,
            "Course completed",
            "Well done",
        )
    }

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::fixed(attempts, Duration::from_millis(1))
    }

    fn calls(timeout: Duration) -> CallGuard {
        CallGuard::new("notifier", timeout, 4)
    }

    #[test]
    fn transient_failures_are_retried() {
        let dispatcher = flaky(2);
        let notifier = Notifier::new(dispatcher.clone(), policy(3), calls(Duration::from_secs(1)));

        assert_eq!(notifier.notify(notification()).unwrap(), 3);
        assert_eq!(dispatcher.inner.count(NotificationKind::CourseCompleted), 1);
    }

    #[test]
    fn attempts_are_bounded() {
        let dispatcher = flaky(10);
        let notifier = Notifier::new(dispatcher.clone(), policy(3), calls(Duration::from_secs(1)));

        match notifier.notify(notification()) {
            Err(NotifyError::Exhausted { attempts: 3, .. }) => {}
            other => panic!("expected Exhausted after 3 attempts, got {other:?}"),
        }
        assert_eq!(dispatcher.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn slow_channel_times_out() {
        struct Slow;
        impl NotificationDispatcher for Slow {
            fn send(&self, _: &Notification) -> Result<(), NotifyError> {
                thread::sleep(Duration::from_millis(300));
                Ok(())
            }
        }

        let notifier = Notifier::new(Arc::new(Slow), policy(1), calls(Duration::from_millis(10)));
        assert!(matches!(
            notifier.notify(notification()),
            Err(NotifyError::Exhausted { attempts: 1, .. })
        ));
    }
}
