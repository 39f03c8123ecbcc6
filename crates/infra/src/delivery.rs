//! Background delivery of notifications and certificate documents.
//!
//! Services enqueue a [`DeliveryJob`] and return at once. A single named worker
//! thread drains the queue in order and calls the [`Notifier`] (timeout plus
//! retries) or the [`CertificateRenderer`] behind its call guard. A final
//! failure is logged, counted in [`DeliveryStats`] and appended to the activity
//! log of the record it concerns; it never reaches the caller that enqueued it.
//!
//! The worker exits once every [`DeliveryQueue`] clone is dropped and the queue
//! is drained. If the thread cannot be started, jobs run inline on the caller.

use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, warn};

use lyceum_credentials::Certificate;

use crate::activity::{ActivityEvent, ActivityLog, CERTIFICATE_STREAM, ENROLLMENT_STREAM, STUDENT_STREAM};
use crate::error::{CascadeStep, CascadeWarning};
use crate::notification::{Notification, Notifier};
use crate::renderer::CertificateRenderer;
use crate::store::AcademicStore;
use crate::timeout::CallGuard;

const WORKER_NAME: &str = "lyceum-delivery";

#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryJob {
    Notify(Notification),
    /// Render the document of a stored certificate and attach it.
    Render(Certificate),
}

impl DeliveryJob {
    fn step(&self) -> CascadeStep {
        match self {
            DeliveryJob::Notify(_) => CascadeStep::Notification,
            DeliveryJob::Render(_) => CascadeStep::CertificateRender,
        }
    }
}

/// Counters since the queue was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryStats {
    pub enqueued: u64,
    pub delivered: u64,
    pub failed: u64,
}

impl DeliveryStats {
    pub fn pending(&self) -> u64 {
        self.enqueued.saturating_sub(self.delivered + self.failed)
    }
}

/// Executes jobs against the external collaborators.
pub(crate) struct Deliverer {
    pub notifier: Notifier,
    pub renderer: Option<Arc<dyn CertificateRenderer>>,
    pub render_calls: CallGuard,
    pub store: Arc<dyn AcademicStore>,
    pub activity: ActivityLog,
}

impl Deliverer {
    fn run(&self, job: DeliveryJob) -> bool {
        match job {
            DeliveryJob::Notify(notification) => self.notify(notification),
            DeliveryJob::Render(certificate) => self.render(certificate),
        }
    }

    fn notify(&self, notification: Notification) -> bool {
        let user_id = notification.user_id;
        let kind = notification.kind;
        let enrollment_id = notification.metadata.enrollment_id;

        let err = match self.notifier.notify(notification) {
            Ok(_) => return true,
            Err(err) => err,
        };
        warn!(%user_id, ?kind, error = %err, "notification dropped");

        let (stream_id, stream_type) = match enrollment_id {
            Some(id) => (*id.as_uuid(), ENROLLMENT_STREAM),
            None => (*user_id.as_uuid(), STUDENT_STREAM),
        };
        let event = ActivityEvent::NotificationFailed {
            user_id,
            kind,
            error: err.to_string(),
            occurred_at: Utc::now(),
        };
        // `record` logs its own failure; nobody waits on this job.
        let _ = self.activity.record(stream_id, stream_type, None, &[event]);
        false
    }

    fn render(&self, certificate: Certificate) -> bool {
        let Some(renderer) = self.renderer.clone() else {
            return true;
        };

        let snapshot = certificate.snapshot.clone();
        let rendered = self
            .render_calls
            .call(move || renderer.render(&snapshot))
            .map_err(|e| e.to_string())
            .and_then(|r| r.map_err(|e| e.to_string()))
            .and_then(|bytes| {
                self.store
                    .attach_certificate_artifact(&certificate.certificate_id, bytes)
                    .map_err(|e| e.to_string())
            });

        let err = match rendered {
            Ok(_) => {
                debug!(certificate_id = %certificate.certificate_id, "certificate rendered");
                return true;
            }
            Err(err) => err,
        };
        warn!(certificate_id = %certificate.certificate_id, error = %err, "certificate render skipped");

        let event = ActivityEvent::CertificateRenderFailed {
            certificate_id: certificate.certificate_id.clone(),
            enrollment_id: certificate.enrollment_id,
            error: err,
            occurred_at: Utc::now(),
        };
        // `record` logs its own failure; nobody waits on this job.
        let _ = self.activity.record(
            *certificate.enrollment_id.as_uuid(),
            CERTIFICATE_STREAM,
            None,
            &[event],
        );
        false
    }
}

#[derive(Default)]
struct QueueState {
    stats: Mutex<DeliveryStats>,
    idle: Condvar,
}

impl QueueState {
    fn settle(&self, delivered: bool) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        if delivered {
            stats.delivered += 1;
        } else {
            stats.failed += 1;
        }
        if stats.pending() == 0 {
            self.idle.notify_all();
        }
    }
}

#[derive(Clone)]
enum Mode {
    Worker(mpsc::Sender<DeliveryJob>),
    Inline(Arc<Deliverer>),
}

/// Producer side of the delivery worker.
#[derive(Clone)]
pub struct DeliveryQueue {
    mode: Mode,
    renders: bool,
    state: Arc<QueueState>,
}

impl std::fmt::Debug for DeliveryQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryQueue")
            .field("background", &matches!(self.mode, Mode::Worker(_)))
            .field("renders", &self.renders)
            .field("stats", &self.stats())
            .finish()
    }
}

impl DeliveryQueue {
    pub(crate) fn spawn(deliverer: Deliverer) -> Self {
        let renders = deliverer.renderer.is_some();
        let state = Arc::new(QueueState::default());
        let deliverer = Arc::new(deliverer);

        let (tx, rx) = mpsc::channel::<DeliveryJob>();
        let worker = Arc::clone(&deliverer);
        let worker_state = Arc::clone(&state);
        let spawned = thread::Builder::new()
            .name(WORKER_NAME.to_string())
            .spawn(move || worker_loop(&worker, &worker_state, rx));

        let mode = match spawned {
            Ok(_) => Mode::Worker(tx),
            Err(err) => {
                error!(worker = WORKER_NAME, error = %err, "delivery worker not started, delivering inline");
                Mode::Inline(deliverer)
            }
        };

        Self {
            mode,
            renders,
            state,
        }
    }

    /// Queue a notification. A warning means it was not accepted.
    pub fn notify(&self, notification: Notification) -> Option<CascadeWarning> {
        self.enqueue(DeliveryJob::Notify(notification))
    }

    /// Queue rendering of `certificate`; a no-op when no renderer is configured.
    pub fn render(&self, certificate: Certificate) -> Option<CascadeWarning> {
        if !self.renders {
            return None;
        }
        self.enqueue(DeliveryJob::Render(certificate))
    }

    pub fn stats(&self) -> DeliveryStats {
        *self.state.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until every accepted job has been handled, or `timeout` passes.
    /// Returns whether the queue drained.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut stats = self.state.stats.lock().unwrap_or_else(PoisonError::into_inner);
        while stats.pending() > 0 {
            let Some(left) = deadline.checked_duration_since(Instant::now()) else {
                return false;
            };
            stats = match self.state.idle.wait_timeout(stats, left) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }

    fn enqueue(&self, job: DeliveryJob) -> Option<CascadeWarning> {
        let step = job.step();
        self.state
            .stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .enqueued += 1;

        match &self.mode {
            Mode::Worker(tx) => match tx.send(job) {
                Ok(()) => None,
                Err(_) => {
                    warn!(worker = WORKER_NAME, ?step, "delivery worker gone, job dropped");
                    self.state.settle(false);
                    Some(CascadeWarning::new(step, "delivery worker unavailable"))
                }
            },
            Mode::Inline(deliverer) => {
                let delivered = deliverer.run(job);
                self.state.settle(delivered);
                None
            }
        }
    }
}

fn worker_loop(deliverer: &Deliverer, state: &QueueState, rx: mpsc::Receiver<DeliveryJob>) {
    while let Ok(job) = rx.recv() {
        let delivered = deliverer.run(job);
        state.settle(delivered);
    }
    debug!(worker = WORKER_NAME, "delivery worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use lyceum_core::UserId;

    use crate::activity::ActivityBus;
    use crate::notification::{NotificationDispatcher, NotificationKind, NotifyError, RecordingDispatcher};
    use crate::retry::RetryPolicy;
    use crate::store::InMemoryAcademicStore;

    struct Hanging {
        calls: AtomicUsize,
    }

    impl NotificationDispatcher for Hanging {
        fn send(&self, _: &Notification) -> Result<(), NotifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(400));
            Ok(())
        }
    }

    fn queue(dispatcher: Arc<dyn NotificationDispatcher>) -> (DeliveryQueue, ActivityLog) {
        let store: Arc<dyn AcademicStore> = Arc::new(InMemoryAcademicStore::new());
        let activity = ActivityLog::new(Arc::clone(&store), Arc::new(ActivityBus::new()));
        let deliverer = Deliverer {
            notifier: Notifier::new(
                dispatcher,
                RetryPolicy::fixed(2, Duration::from_millis(1)),
                CallGuard::new("notifier", Duration::from_millis(50), 2),
            ),
            renderer: None,
            render_calls: CallGuard::new("renderer", Duration::from_millis(50), 2),
            store,
            activity: activity.clone(),
        };
        (DeliveryQueue::spawn(deliverer), activity)
    }

    fn notification(user: UserId) -> Notification {
        Notification::new(user, NotificationKind::SubmissionGraded, "Graded", "Task 1 was graded.")
    }

    #[test]
    fn delivers_in_the_background() {
        let recorder = Arc::new(RecordingDispatcher::new());
        let (queue, _) = queue(recorder.clone());

        for _ in 0..3 {
            assert!(queue.notify(notification(UserId::new())).is_none());
        }
        assert!(queue.wait_idle(Duration::from_secs(5)));
        assert_eq!(recorder.count(NotificationKind::SubmissionGraded), 3);
        assert_eq!(
            queue.stats(),
            DeliveryStats {
                enqueued: 3,
                delivered: 3,
                failed: 0
            }
        );
    }

    #[test]
    fn hung_channel_does_not_block_the_producer() {
        let hanging = Arc::new(Hanging {
            calls: AtomicUsize::new(0),
        });
        let (queue, activity) = queue(hanging.clone());
        let user = UserId::new();

        let started = Instant::now();
        for _ in 0..5 {
            assert!(queue.notify(notification(user)).is_none());
        }
        assert!(started.elapsed() < Duration::from_millis(100));

        assert!(queue.wait_idle(Duration::from_secs(10)));
        let stats = queue.stats();
        assert_eq!(stats.failed, 5);
        assert_eq!(stats.pending(), 0);

        let history = activity.history(*user.as_uuid()).unwrap();
        assert_eq!(history.len(), 5);
        assert!(history.iter().all(|r| r.event_type() == "delivery.notification_failed"));
    }
}
