use serde::{Deserialize, Serialize};
use serde_json::json;

use lyceum_core::{Percentage, round2};

use crate::result::{AiError, FeedbackReport, FeedbackSource};

/// Everything a generator may look at for one graded submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRequest {
    pub assignment_title: String,
    pub submission_text: Option<String>,
    pub points_earned: f64,
    pub max_points: f64,
    pub is_late: bool,
    /// Percentages of the student's previously graded submissions in the course.
    pub previous_scores: Vec<f64>,
}

impl FeedbackRequest {
    pub fn score(&self) -> Percentage {
        Percentage::ratio(self.points_earned, self.max_points)
    }
}

/// Injected feedback collaborator. Implementations may block on IO; callers
/// bound the call with a timeout.
pub trait FeedbackGenerator: Send + Sync {
    fn generate(&self, request: &FeedbackRequest) -> Result<FeedbackReport, AiError>;
}

/// Deterministic fallback: score-threshold phrases and a history-averaged prediction.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedFeedback;

const PHRASES: [(f64, &str); 4] = [
    (
        90.0,
        "Excellent work! You have demonstrated a strong command of the material.",
    ),
    (80.0, "Good work. A few details could still be refined."),
    (70.0, "Satisfactory. Review the sections where points were lost."),
    (
        60.0,
        "Needs improvement. Revisit the core concepts and practise further.",
    ),
];

const FAILING: &str = "Unsatisfactory. Please review this material with your teacher.";

impl RuleBasedFeedback {
    pub fn phrase_for(score: f64) -> &'static str {
        PHRASES
            .iter()
            .find(|(min, _)| score >= *min)
            .map(|(_, phrase)| *phrase)
            .unwrap_or(FAILING)
    }

    /// Mean of the history and the current score.
    pub fn predict(current: f64, previous: &[f64]) -> f64 {
        let total: f64 = previous.iter().sum::<f64>() + current;
        round2(total / (previous.len() + 1) as f64)
    }
}

impl FeedbackGenerator for RuleBasedFeedback {
    fn generate(&self, request: &FeedbackRequest) -> Result<FeedbackReport, AiError> {
        if request.max_points.is_nan() || request.max_points <= 0.0 {
            return Err(AiError::InvalidInput("max_points must be positive".into()));
        }

        let score = request.score().value();
        let mut text = format!(
            "{} ({}: {score:.2}%)",
            Self::phrase_for(score),
            request.assignment_title
        );
        if request.is_late {
            text.push_str(" Submitted after the due date.");
        }

        let predicted = Self::predict(score, &request.previous_scores);
        Ok(FeedbackReport::new(text, predicted, FeedbackSource::RuleBased)
            .with_metadata(json!({ "history_len": request.previous_scores.len() })))
    }
}
