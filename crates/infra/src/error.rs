use std::fmt;

use serde::Serialize;
use thiserror::Error;

use lyceum_core::DomainError;

use crate::store::StoreError;

/// Failure of an engine operation.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    /// Validation, authorization or state-machine rejection. Never retried.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The grade → progress → completion unit kept losing compare-and-swap races.
    #[error("concurrency conflict persisted after {attempts} attempts")]
    ConcurrencyConflict { attempts: u32 },

    /// The store failed; the current unit of work was aborted.
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

impl EngineError {
    pub(crate) fn is_conflict(&self) -> bool {
        matches!(self, EngineError::Persistence(StoreError::Concurrency(_)))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Downstream step that may fail without failing its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeStep {
    Feedback,
    Certificate,
    CertificateRender,
    CareerUpdate,
    Completion,
    Notification,
    ActivityLog,
}

impl CascadeStep {
    pub fn as_str(self) -> &'static str {
        match self {
            CascadeStep::Feedback => "feedback",
            CascadeStep::Certificate => "certificate",
            CascadeStep::CertificateRender => "certificate_render",
            CascadeStep::CareerUpdate => "career_update",
            CascadeStep::Completion => "completion",
            CascadeStep::Notification => "notification",
            CascadeStep::ActivityLog => "activity_log",
        }
    }
}

/// Non-fatal external-service failure attached to an otherwise successful result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CascadeWarning {
    pub step: CascadeStep,
    pub message: String,
}

impl CascadeWarning {
    pub fn new(step: CascadeStep, message: impl fmt::Display) -> Self {
        Self {
            step,
            message: message.to_string(),
        }
    }
}

impl fmt::Display for CascadeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.step.as_str(), self.message)
    }
}
