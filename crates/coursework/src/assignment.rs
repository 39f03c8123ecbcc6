use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lyceum_core::{AssignmentId, CourseId, DomainError, DomainResult};

/// Kind of gradable work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentType {
    Homework,
    Quiz,
    Exam,
    Project,
    Lab,
    Essay,
    Presentation,
}

/// Weighting bucket used by the final-grade calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradeCategory {
    Assignments,
    Quizzes,
    Exams,
    Projects,
}

impl GradeCategory {
    pub const ALL: [GradeCategory; 4] = [
        GradeCategory::Assignments,
        GradeCategory::Quizzes,
        GradeCategory::Exams,
        GradeCategory::Projects,
    ];

    /// Fixed weight of the category in the final score (weights sum to 1.0).
    pub fn weight(self) -> f64 {
        match self {
            GradeCategory::Assignments => 0.30,
            GradeCategory::Quizzes => 0.20,
            GradeCategory::Exams => 0.30,
            GradeCategory::Projects => 0.20,
        }
    }
}

impl AssignmentType {
    /// Homework-like work (labs, essays, presentations) counts as "assignments".
    pub fn category(self) -> GradeCategory {
        match self {
            AssignmentType::Homework
            | AssignmentType::Lab
            | AssignmentType::Essay
            | AssignmentType::Presentation => GradeCategory::Assignments,
            AssignmentType::Quiz => GradeCategory::Quizzes,
            AssignmentType::Exam => GradeCategory::Exams,
            AssignmentType::Project => GradeCategory::Projects,
        }
    }
}

/// A gradable unit of a course. Read-only to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub course_id: CourseId,
    pub title: String,
    pub kind: AssignmentType,
    pub max_points: f64,
    pub due_at: Option<DateTime<Utc>>,
    pub published: bool,
}

impl Assignment {
    pub fn new(
        id: AssignmentId,
        course_id: CourseId,
        title: impl Into<String>,
        kind: AssignmentType,
        max_points: f64,
    ) -> DomainResult<Self> {
        if !(max_points.is_finite() && max_points > 0.0) {
            return Err(DomainError::validation(
                "assignment max_points must be a positive number",
            ));
        }
        Ok(Self {
            id,
            course_id,
            title: title.into(),
            kind,
            max_points,
            due_at: None,
            published: false,
        })
    }

    pub fn due(mut self, due_at: DateTime<Utc>) -> Self {
        self.due_at = Some(due_at);
        self
    }

    pub fn published(mut self) -> Self {
        self.published = true;
        self
    }

    /// Inclusive range check for earned points.
    pub fn validate_points(&self, points_earned: f64) -> DomainResult<()> {
        if !points_earned.is_finite() || points_earned < 0.0 || points_earned > self.max_points {
            return Err(DomainError::out_of_range(
                "points_earned",
                points_earned,
                0.0,
                self.max_points,
            ));
        }
        Ok(())
    }

    pub fn is_late(&self, submitted_at: DateTime<Utc>) -> bool {
        self.due_at.is_some_and(|due| submitted_at > due)
    }
}
