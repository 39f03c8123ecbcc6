//! Application services of the progression engine.
//!
//! Control flow is explicit: `GradingEngine` calls `ProgressTracker`, which
//! hands a fully graded enrollment to `CompletionOrchestrator`, which fans out to
//! `CertificateIssuer` and `CareerRecommendationEngine`. Notifications and
//! certificate rendering are queued on the `DeliveryQueue` and never run on the
//! caller's thread.

pub mod career;
pub mod certificates;
pub mod completion;
pub mod enrollment;
pub mod grading;
pub mod progress;
pub mod rating;

use std::sync::Arc;

use tracing::{debug, warn};

use lyceum_core::{CourseId, DomainError, EnrollmentId};
use lyceum_coursework::Course;
use lyceum_enrollment::Enrollment;

use crate::activity::ActivityLog;
use crate::config::EngineConfig;
use crate::delivery::DeliveryQueue;
use crate::error::{CascadeWarning, EngineError, EngineResult};
use crate::notification::Notification;
use crate::store::AcademicStore;

/// Dependencies shared by every service.
#[derive(Debug, Clone)]
pub struct EngineContext {
    pub store: Arc<dyn AcademicStore>,
    pub config: EngineConfig,
    pub activity: ActivityLog,
    pub deliveries: DeliveryQueue,
}

impl EngineContext {
    pub(crate) fn load_enrollment(&self, id: EnrollmentId) -> EngineResult<Enrollment> {
        self.store
            .enrollment(id)?
            .ok_or_else(|| DomainError::not_found(format!("enrollment {id}")).into())
    }

    pub(crate) fn load_course(&self, id: CourseId) -> EngineResult<Course> {
        self.store
            .course(id)?
            .ok_or_else(|| DomainError::not_found(format!("course {id}")).into())
    }

    /// Hand off to the delivery worker; only a refused hand-off is a warning.
    pub(crate) fn notify(&self, notification: Notification) -> Option<CascadeWarning> {
        self.deliveries.notify(notification)
    }
}

/// Run `unit` until it stops failing with a compare-and-swap conflict, at most
/// `max_attempts` times. Each attempt must reload whatever it writes.
pub(crate) fn retry_on_conflict<T>(
    max_attempts: u32,
    operation: &'static str,
    mut unit: impl FnMut(u32) -> EngineResult<T>,
) -> EngineResult<T> {
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match unit(attempt) {
            Err(err) if err.is_conflict() => {
                if attempt >= max_attempts {
                    warn!(operation, attempts = attempt, "conflict retries exhausted");
                    return Err(EngineError::ConcurrencyConflict { attempts: attempt });
                }
                debug!(operation, attempt, error = %err, "conflict, retrying unit");
                attempt += 1;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;

    #[test]
    fn conflicts_are_retried_then_surface() {
        let mut calls = 0;
        let out: EngineResult<()> = retry_on_conflict(3, "test", |_| {
            calls += 1;
            Err(StoreError::Concurrency("stale".into()).into())
        });
        assert_eq!(out, Err(EngineError::ConcurrencyConflict { attempts: 3 }));
        assert_eq!(calls, 3);
    }

    #[test]
    fn other_errors_are_not_retried() {
        let mut calls = 0;
        let out: EngineResult<()> = retry_on_conflict(3, "test", |_| {
            calls += 1;
            Err(DomainError::validation("bad").into())
        });
        assert!(matches!(out, Err(EngineError::Domain(DomainError::Validation(_)))));
        assert_eq!(calls, 1);
    }

    #[test]
    fn success_after_a_conflict() {
        let out = retry_on_conflict(3, "test", |attempt| {
            if attempt == 1 {
                Err(StoreError::Concurrency("stale".into()).into())
            } else {
                Ok(attempt)
            }
        });
        assert_eq!(out, Ok(2));
    }
}
