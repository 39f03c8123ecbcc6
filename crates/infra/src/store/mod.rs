//! Persistence boundary for the progression engine.
//!
//! The engine needs a small set of guarantees from its store, all expressed on
//! [`AcademicStore`]:
//!
//! - unique `(student, course)` enrollments, `(assignment, student)` submissions,
//!   one grade and one certificate per enrollment, `(student, skill)` skill rows
//!   and `(student, job)` recommendation rows;
//! - compare-and-swap writes on the enrollment row (`ExpectedVersion`);
//! - one atomic multi-row commit for "enrollment completed + grade published".
//!
//! [`InMemoryAcademicStore`] implements these guarantees behind one lock and is
//! the backend used in tests and benches.

mod in_memory;

pub use in_memory::InMemoryAcademicStore;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use lyceum_career::{JobListing, JobRecommendation, SkillChange, SkillRecord};
use lyceum_core::{
    AssignmentId, CourseId, EnrollmentId, ExpectedVersion, SubmissionId, UserId,
};
use lyceum_coursework::{Assignment, Course, Grade, Submission};
use lyceum_credentials::Certificate;
use lyceum_enrollment::{Enrollment, TeacherRating, TeacherRatingSummary};
use lyceum_events::EventEnvelope;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Compare-and-swap failed: the row changed since it was read.
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Backend failure (lock poisoning, lost connection).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_concurrency(&self) -> bool {
        matches!(self, StoreError::Concurrency(_))
    }
}

/// A committed activity-log entry (append-only, JSON payload).
pub type ActivityRecord = EventEnvelope<JsonValue>;

/// Input for [`AcademicStore::append_activity`]; the store assigns the
/// per-stream sequence number.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityEntry {
    pub stream_id: Uuid,
    pub stream_type: String,
    pub event_type: String,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
    pub payload: JsonValue,
}

/// Transactional store used by every engine.
///
/// Reads return the last committed value; no method hands out references into
/// shared state.
pub trait AcademicStore: Send + Sync {
    // Catalogue (loaded out of band, read-only to the engine).
    fn put_course(&self, course: Course) -> Result<(), StoreError>;
    fn course(&self, id: CourseId) -> Result<Option<Course>, StoreError>;
    fn put_assignment(&self, assignment: Assignment) -> Result<(), StoreError>;
    fn assignment(&self, id: AssignmentId) -> Result<Option<Assignment>, StoreError>;
    fn assignments_for_course(&self, course_id: CourseId) -> Result<Vec<Assignment>, StoreError>;

    // Enrollments.
    /// Fails with `UniqueViolation` when the `(student, course)` pair exists.
    fn insert_enrollment(&self, enrollment: &Enrollment) -> Result<(), StoreError>;
    fn enrollment(&self, id: EnrollmentId) -> Result<Option<Enrollment>, StoreError>;
    fn find_enrollment(
        &self,
        student_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<Enrollment>, StoreError>;
    /// Compare-and-swap on the stored enrollment version.
    fn save_enrollment(
        &self,
        enrollment: &Enrollment,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError>;

    // Submissions.
    /// Fails with `UniqueViolation` when the `(assignment, student)` pair exists.
    fn insert_submission(&self, submission: &Submission) -> Result<(), StoreError>;
    fn submission(&self, id: SubmissionId) -> Result<Option<Submission>, StoreError>;
    fn save_submission(&self, submission: &Submission) -> Result<(), StoreError>;
    fn submissions_for(
        &self,
        course_id: CourseId,
        student_id: UserId,
    ) -> Result<Vec<Submission>, StoreError>;

    // Grades.
    fn grade_for(&self, enrollment_id: EnrollmentId) -> Result<Option<Grade>, StoreError>;
    /// Atomically CAS the enrollment and upsert its grade (keyed by enrollment).
    ///
    /// Either both rows are written or neither is.
    fn commit_final_grade(
        &self,
        enrollment: &Enrollment,
        expected: ExpectedVersion,
        grade: &Grade,
    ) -> Result<(), StoreError>;

    // Certificates.
    fn certificate_for(
        &self,
        enrollment_id: EnrollmentId,
    ) -> Result<Option<Certificate>, StoreError>;
    /// Returns the stored certificate: the given one, or the one a concurrent
    /// issuer already stored for the same enrollment. A certificate id or
    /// verification code already used by another enrollment is a `UniqueViolation`.
    fn insert_certificate(&self, certificate: &Certificate) -> Result<Certificate, StoreError>;
    /// Keep the rendered document and flag the certificate as having one.
    fn attach_certificate_artifact(
        &self,
        certificate_id: &str,
        artifact: Vec<u8>,
    ) -> Result<Certificate, StoreError>;
    fn certificate_artifact(&self, certificate_id: &str) -> Result<Option<Vec<u8>>, StoreError>;
    /// Lookup by certificate id or verification code.
    fn find_certificate(&self, identifier_or_code: &str)
    -> Result<Option<Certificate>, StoreError>;

    // Career.
    /// Upsert keyed by `(student, skill key)`, folding via [`SkillRecord::merge`].
    fn upsert_skill(&self, record: SkillRecord) -> Result<(SkillRecord, SkillChange), StoreError>;
    fn skills_for(&self, student_id: UserId) -> Result<Vec<SkillRecord>, StoreError>;
    fn put_job_listing(&self, listing: JobListing) -> Result<(), StoreError>;
    fn job_listings(&self) -> Result<Vec<JobListing>, StoreError>;
    fn recommendations_for(&self, student_id: UserId)
    -> Result<Vec<JobRecommendation>, StoreError>;
    /// Upsert the given rows and delete every other row of the student, atomically.
    fn replace_recommendations(
        &self,
        student_id: UserId,
        recommendations: &[JobRecommendation],
    ) -> Result<(), StoreError>;

    // Ratings.
    /// Upsert keyed by `(student, teacher, course)`; returns the stored rating
    /// and whether it was newly created.
    fn upsert_rating(&self, rating: TeacherRating) -> Result<(TeacherRating, bool), StoreError>;
    fn ratings_for_teacher(&self, teacher_id: UserId) -> Result<Vec<TeacherRating>, StoreError>;
    fn save_teacher_summary(&self, summary: &TeacherRatingSummary) -> Result<(), StoreError>;
    fn teacher_summary(&self, teacher_id: UserId)
    -> Result<Option<TeacherRatingSummary>, StoreError>;

    // Activity log.
    fn append_activity(&self, entry: ActivityEntry) -> Result<ActivityRecord, StoreError>;
    fn activity_for(&self, stream_id: Uuid) -> Result<Vec<ActivityRecord>, StoreError>;
}

impl std::fmt::Debug for dyn AcademicStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AcademicStore")
    }
}
