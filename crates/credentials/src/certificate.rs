use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lyceum_core::{CourseId, DomainError, DomainResult, EnrollmentId, Percentage, UserId};
use lyceum_coursework::{Course, Grade, LetterGrade};
use lyceum_enrollment::Enrollment;

/// Grade facts frozen onto the certificate at issue time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificateSnapshot {
    pub certificate_id: String,
    pub student_id: UserId,
    pub course_id: CourseId,
    pub course_title: String,
    pub final_score: Percentage,
    pub letter_grade: LetterGrade,
    pub gpa_points: f64,
    pub issued_at: DateTime<Utc>,
}

/// Proof of completion. At most one per enrollment; identifiers never reused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certificate {
    pub certificate_id: String,
    pub verification_code: String,
    pub enrollment_id: EnrollmentId,
    pub snapshot: CertificateSnapshot,
    /// Set once a renderer produced the binary document.
    pub artifact_available: bool,
}

impl Certificate {
    /// Requires a completed enrollment at 100% and its published grade.
    pub fn issue(
        enrollment: &Enrollment,
        grade: &Grade,
        course: &Course,
        certificate_id: String,
        verification_code: String,
        issued_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if !enrollment.is_completed() || !enrollment.completion().is_full() {
            return Err(DomainError::invalid_state(format!(
                "certificate requires a completed enrollment (status '{}', completion {})",
                enrollment.status(),
                enrollment.completion()
            )));
        }
        if !grade.published {
            return Err(DomainError::invalid_state(
                "certificate requires a published grade",
            ));
        }
        if grade.enrollment_id != enrollment.id_typed() || course.id != enrollment.course_id() {
            return Err(DomainError::invariant("certificate inputs belong to different enrollments"));
        }
        if certificate_id.trim().is_empty() || verification_code.trim().is_empty() {
            return Err(DomainError::invalid_id("certificate identifiers must not be empty"));
        }
        if certificate_id == verification_code {
            return Err(DomainError::invalid_id(
                "verification code must differ from the certificate id",
            ));
        }

        let components = &grade.components;
        Ok(Self {
            snapshot: CertificateSnapshot {
                certificate_id: certificate_id.clone(),
                student_id: enrollment.student_id(),
                course_id: course.id,
                course_title: course.title.clone(),
                final_score: components.final_score,
                letter_grade: components.letter,
                gpa_points: components.gpa_points,
                issued_at,
            },
            certificate_id,
            verification_code,
            enrollment_id: enrollment.id_typed(),
            artifact_available: false,
        })
    }

    /// Identifier match is exact; code match ignores case and surrounding space.
    pub fn matches(&self, identifier_or_code: &str) -> bool {
        let needle = identifier_or_code.trim();
        self.certificate_id == needle || self.verification_code.eq_ignore_ascii_case(needle)
    }
}

/// Result of a verification lookup. Unknown identifiers are `valid = false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub valid: bool,
    pub snapshot: Option<CertificateSnapshot>,
}

impl Verification {
    pub fn invalid() -> Self {
        Self {
            valid: false,
            snapshot: None,
        }
    }

    pub fn of(certificate: &Certificate) -> Self {
        Self {
            valid: true,
            snapshot: Some(certificate.snapshot.clone()),
        }
    }
}
