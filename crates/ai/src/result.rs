use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Academic risk estimate attached to a feedback report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// `< 60` high, `< 75` medium, otherwise low.
    pub fn from_score(score: f64) -> Self {
        if score < 60.0 {
            RiskLevel::High
        } else if score < 75.0 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// Which generator produced a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackSource {
    Generated,
    RuleBased,
}

/// Result of a feedback generation.
///
/// This is *not* a domain event. It is advice the grading engine may store as the
/// submission's feedback text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackReport {
    pub feedback: String,

    /// Predicted course-level score on the 0–100 scale.
    pub predicted_score: f64,

    pub risk: RiskLevel,

    pub source: FeedbackSource,

    /// Free-form metadata (model name, timings, etc).
    pub metadata: JsonValue,
}

impl FeedbackReport {
    pub fn new(feedback: impl Into<String>, predicted_score: f64, source: FeedbackSource) -> Self {
        Self {
            feedback: feedback.into(),
            predicted_score,
            risk: RiskLevel::from_score(predicted_score),
            source,
            metadata: JsonValue::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Debug, Error)]
pub enum AiError {
    #[error("invalid feedback input: {0}")]
    InvalidInput(String),

    #[error("feedback service unavailable: {0}")]
    Unavailable(String),

    #[error("inference failed: {0}")]
    InferenceFailed(String),
}
