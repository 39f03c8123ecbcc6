use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lyceum_core::{CourseId, DomainError, DomainResult, EnrollmentId, RecordId, UserId, round2};

use crate::enrollment::Enrollment;

pub const MIN_STARS: u8 = 1;
pub const MAX_STARS: u8 = 5;

/// A student's rating of a course teacher. One per (student, teacher, course).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeacherRating {
    pub id: RecordId,
    pub enrollment_id: EnrollmentId,
    pub student_id: UserId,
    pub teacher_id: UserId,
    pub course_id: CourseId,
    pub stars: u8,
    pub feedback: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn validate_stars(stars: u8) -> DomainResult<()> {
    if (MIN_STARS..=MAX_STARS).contains(&stars) {
        Ok(())
    } else {
        Err(DomainError::out_of_range(
            "stars",
            f64::from(stars),
            f64::from(MIN_STARS),
            f64::from(MAX_STARS),
        ))
    }
}

impl TeacherRating {
    /// Ratings are accepted only for completed enrollments.
    pub fn new(
        enrollment: &Enrollment,
        teacher_id: UserId,
        stars: u8,
        feedback: Option<String>,
        at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if !enrollment.is_completed() {
            return Err(DomainError::invalid_state(format!(
                "ratings require a completed enrollment (status '{}')",
                enrollment.status()
            )));
        }
        validate_stars(stars)?;

        Ok(Self {
            id: RecordId::new(),
            enrollment_id: enrollment.id_typed(),
            student_id: enrollment.student_id(),
            teacher_id,
            course_id: enrollment.course_id(),
            stars,
            feedback: feedback.filter(|f| !f.trim().is_empty()),
            created_at: at,
            updated_at: at,
        })
    }

    /// Same rater rating again: keep identity, take the new values.
    pub fn revise(&mut self, stars: u8, feedback: Option<String>, at: DateTime<Utc>) -> DomainResult<()> {
        validate_stars(stars)?;
        self.stars = stars;
        self.feedback = feedback.filter(|f| !f.trim().is_empty());
        self.updated_at = at;
        Ok(())
    }

    pub fn key(&self) -> (UserId, UserId, CourseId) {
        (self.student_id, self.teacher_id, self.course_id)
    }
}

/// Running average across every rating a teacher has received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeacherRatingSummary {
    pub teacher_id: UserId,
    pub average: f64,
    pub count: usize,
}

impl TeacherRatingSummary {
    /// Full recompute; never incremental.
    pub fn from_ratings<'a, I>(teacher_id: UserId, ratings: I) -> Self
    where
        I: IntoIterator<Item = &'a TeacherRating>,
    {
        let (sum, count) = ratings
            .into_iter()
            .filter(|r| r.teacher_id == teacher_id)
            .fold((0u64, 0usize), |(sum, count), r| {
                (sum + u64::from(r.stars), count + 1)
            });

        let average = if count == 0 {
            0.0
        } else {
            round2(sum as f64 / count as f64)
        };

        Self {
            teacher_id,
            average,
            count,
        }
    }
}
