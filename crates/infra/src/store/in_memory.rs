//! Test and development backend.
//!
//! All tables sit behind a single `RwLock`, so writes for *different*
//! enrollments serialize on it: graders working on unrelated enrollments wait
//! for each other here. Correctness does not depend on the lock; concurrent
//! writers to the *same* enrollment are still resolved by the version
//! compare-and-swap. A production backend is expected to lock per row, so
//! unrelated enrollments do not contend.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use uuid::Uuid;

use lyceum_career::{JobListing, JobRecommendation, SkillChange, SkillRecord};
use lyceum_core::{
    AggregateRoot, AssignmentId, CourseId, EnrollmentId, ExpectedVersion, JobListingId,
    SubmissionId, UserId,
};
use lyceum_coursework::{Assignment, Course, Grade, Submission};
use lyceum_credentials::Certificate;
use lyceum_enrollment::{Enrollment, TeacherRating, TeacherRatingSummary};
use lyceum_events::EventEnvelope;

use super::{AcademicStore, ActivityEntry, ActivityRecord, StoreError};

#[derive(Debug, Default)]
struct Tables {
    courses: HashMap<CourseId, Course>,
    assignments: HashMap<AssignmentId, Assignment>,

    enrollments: HashMap<EnrollmentId, Enrollment>,
    enrollment_by_pair: HashMap<(UserId, CourseId), EnrollmentId>,

    submissions: HashMap<SubmissionId, Submission>,
    submission_by_pair: HashMap<(AssignmentId, UserId), SubmissionId>,

    grades: HashMap<EnrollmentId, Grade>,

    certificates: HashMap<String, Certificate>,
    certificate_by_enrollment: HashMap<EnrollmentId, String>,
    certificate_by_code: HashMap<String, String>,
    artifacts: HashMap<String, Vec<u8>>,

    skills: HashMap<(UserId, String), SkillRecord>,
    job_listings: HashMap<JobListingId, JobListing>,
    recommendations: HashMap<UserId, HashMap<JobListingId, JobRecommendation>>,

    ratings: HashMap<(UserId, UserId, CourseId), TeacherRating>,
    teacher_summaries: HashMap<UserId, TeacherRatingSummary>,

    activity: HashMap<Uuid, Vec<ActivityRecord>>,
}

/// In-memory academic store.
///
/// Every operation takes one lock over all tables, so multi-row writes are
/// atomic. Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryAcademicStore {
    tables: RwLock<Tables>,
    #[cfg(test)]
    activity_offline: std::sync::atomic::AtomicBool,
}

impl InMemoryAcademicStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `append_activity` fail until switched back.
    #[cfg(test)]
    pub(crate) fn set_activity_offline(&self, offline: bool) {
        self.activity_offline
            .store(offline, std::sync::atomic::Ordering::SeqCst);
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }
}

fn check_enrollment_version(
    tables: &Tables,
    enrollment: &Enrollment,
    expected: ExpectedVersion,
) -> Result<(), StoreError> {
    let stored = tables
        .enrollments
        .get(&enrollment.id_typed())
        .ok_or_else(|| StoreError::NotFound(format!("enrollment {}", enrollment.id_typed())))?;

    if !expected.matches(stored.version()) {
        return Err(StoreError::Concurrency(format!(
            "enrollment {}: expected {expected:?}, found {}",
            enrollment.id_typed(),
            stored.version()
        )));
    }
    Ok(())
}

fn code_key(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

impl AcademicStore for InMemoryAcademicStore {
    fn put_course(&self, course: Course) -> Result<(), StoreError> {
        self.write()?.courses.insert(course.id, course);
        Ok(())
    }

    fn course(&self, id: CourseId) -> Result<Option<Course>, StoreError> {
        Ok(self.read()?.courses.get(&id).cloned())
    }

    fn put_assignment(&self, assignment: Assignment) -> Result<(), StoreError> {
        self.write()?.assignments.insert(assignment.id, assignment);
        Ok(())
    }

    fn assignment(&self, id: AssignmentId) -> Result<Option<Assignment>, StoreError> {
        Ok(self.read()?.assignments.get(&id).cloned())
    }

    fn assignments_for_course(&self, course_id: CourseId) -> Result<Vec<Assignment>, StoreError> {
        let tables = self.read()?;
        let mut out: Vec<Assignment> = tables
            .assignments
            .values()
            .filter(|a| a.course_id == course_id)
            .cloned()
            .collect();
        out.sort_by_key(|a| a.id);
        Ok(out)
    }

    fn insert_enrollment(&self, enrollment: &Enrollment) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let pair = (enrollment.student_id(), enrollment.course_id());

        if tables.enrollment_by_pair.contains_key(&pair) {
            return Err(StoreError::UniqueViolation(format!(
                "student {} is already enrolled in course {}",
                pair.0, pair.1
            )));
        }
        if tables.enrollments.contains_key(&enrollment.id_typed()) {
            return Err(StoreError::UniqueViolation(format!(
                "enrollment {} already exists",
                enrollment.id_typed()
            )));
        }

        tables.enrollment_by_pair.insert(pair, enrollment.id_typed());
        tables
            .enrollments
            .insert(enrollment.id_typed(), enrollment.clone());
        Ok(())
    }

    fn enrollment(&self, id: EnrollmentId) -> Result<Option<Enrollment>, StoreError> {
        Ok(self.read()?.enrollments.get(&id).cloned())
    }

    fn find_enrollment(
        &self,
        student_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<Enrollment>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .enrollment_by_pair
            .get(&(student_id, course_id))
            .and_then(|id| tables.enrollments.get(id))
            .cloned())
    }

    fn save_enrollment(
        &self,
        enrollment: &Enrollment,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        check_enrollment_version(&tables, enrollment, expected)?;
        tables
            .enrollments
            .insert(enrollment.id_typed(), enrollment.clone());
        Ok(())
    }

    fn insert_submission(&self, submission: &Submission) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let pair = (submission.assignment_id, submission.student_id);

        if tables.submission_by_pair.contains_key(&pair) {
            return Err(StoreError::UniqueViolation(format!(
                "student {} already submitted assignment {}",
                pair.1, pair.0
            )));
        }

        tables.submission_by_pair.insert(pair, submission.id);
        tables.submissions.insert(submission.id, submission.clone());
        Ok(())
    }

    fn submission(&self, id: SubmissionId) -> Result<Option<Submission>, StoreError> {
        Ok(self.read()?.submissions.get(&id).cloned())
    }

    fn save_submission(&self, submission: &Submission) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        match tables.submissions.get_mut(&submission.id) {
            Some(stored) => {
                *stored = submission.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("submission {}", submission.id))),
        }
    }

    fn submissions_for(
        &self,
        course_id: CourseId,
        student_id: UserId,
    ) -> Result<Vec<Submission>, StoreError> {
        let tables = self.read()?;
        let mut out: Vec<Submission> = tables
            .submissions
            .values()
            .filter(|s| s.course_id == course_id && s.student_id == student_id)
            .cloned()
            .collect();
        out.sort_by_key(|s| s.submitted_at);
        Ok(out)
    }

    fn grade_for(&self, enrollment_id: EnrollmentId) -> Result<Option<Grade>, StoreError> {
        Ok(self.read()?.grades.get(&enrollment_id).cloned())
    }

    fn commit_final_grade(
        &self,
        enrollment: &Enrollment,
        expected: ExpectedVersion,
        grade: &Grade,
    ) -> Result<(), StoreError> {
        if grade.enrollment_id != enrollment.id_typed() {
            return Err(StoreError::Concurrency(
                "grade belongs to a different enrollment".to_string(),
            ));
        }

        let mut tables = self.write()?;
        check_enrollment_version(&tables, enrollment, expected)?;

        let mut grade = grade.clone();
        if let Some(existing) = tables.grades.get(&enrollment.id_typed()) {
            grade.id = existing.id;
        }
        tables.grades.insert(enrollment.id_typed(), grade);
        tables
            .enrollments
            .insert(enrollment.id_typed(), enrollment.clone());
        Ok(())
    }

    fn certificate_for(
        &self,
        enrollment_id: EnrollmentId,
    ) -> Result<Option<Certificate>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .certificate_by_enrollment
            .get(&enrollment_id)
            .and_then(|id| tables.certificates.get(id))
            .cloned())
    }

    fn insert_certificate(&self, certificate: &Certificate) -> Result<Certificate, StoreError> {
        let mut tables = self.write()?;

        if let Some(existing) = tables
            .certificate_by_enrollment
            .get(&certificate.enrollment_id)
            .and_then(|id| tables.certificates.get(id))
        {
            return Ok(existing.clone());
        }

        let code = code_key(&certificate.verification_code);
        if tables.certificates.contains_key(&certificate.certificate_id)
            || tables.certificate_by_code.contains_key(&code)
        {
            return Err(StoreError::UniqueViolation(format!(
                "certificate identifier {} or its verification code is already in use",
                certificate.certificate_id
            )));
        }

        tables
            .certificate_by_enrollment
            .insert(certificate.enrollment_id, certificate.certificate_id.clone());
        tables
            .certificate_by_code
            .insert(code, certificate.certificate_id.clone());
        tables
            .certificates
            .insert(certificate.certificate_id.clone(), certificate.clone());
        Ok(certificate.clone())
    }

    fn attach_certificate_artifact(
        &self,
        certificate_id: &str,
        artifact: Vec<u8>,
    ) -> Result<Certificate, StoreError> {
        let mut tables = self.write()?;
        let certificate = tables
            .certificates
            .get_mut(certificate_id)
            .ok_or_else(|| StoreError::NotFound(format!("certificate {certificate_id}")))?;
        certificate.artifact_available = true;
        let updated = certificate.clone();
        tables.artifacts.insert(certificate_id.to_string(), artifact);
        Ok(updated)
    }

    fn certificate_artifact(&self, certificate_id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.read()?.artifacts.get(certificate_id).cloned())
    }

    fn find_certificate(
        &self,
        identifier_or_code: &str,
    ) -> Result<Option<Certificate>, StoreError> {
        let tables = self.read()?;
        let needle = identifier_or_code.trim();
        if let Some(cert) = tables.certificates.get(needle) {
            return Ok(Some(cert.clone()));
        }
        Ok(tables
            .certificate_by_code
            .get(&code_key(needle))
            .and_then(|id| tables.certificates.get(id))
            .cloned())
    }

    fn upsert_skill(&self, record: SkillRecord) -> Result<(SkillRecord, SkillChange), StoreError> {
        let mut tables = self.write()?;
        let key = (record.student_id, record.key.clone());

        match tables.skills.get_mut(&key) {
            Some(existing) => {
                let change = existing.merge(record);
                Ok((existing.clone(), change))
            }
            None => {
                tables.skills.insert(key, record.clone());
                Ok((record, SkillChange::Created))
            }
        }
    }

    fn skills_for(&self, student_id: UserId) -> Result<Vec<SkillRecord>, StoreError> {
        let tables = self.read()?;
        let mut out: Vec<SkillRecord> = tables
            .skills
            .values()
            .filter(|s| s.student_id == student_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(out)
    }

    fn put_job_listing(&self, listing: JobListing) -> Result<(), StoreError> {
        self.write()?.job_listings.insert(listing.id, listing);
        Ok(())
    }

    fn job_listings(&self) -> Result<Vec<JobListing>, StoreError> {
        let tables = self.read()?;
        let mut out: Vec<JobListing> = tables.job_listings.values().cloned().collect();
        out.sort_by_key(|l| l.id);
        Ok(out)
    }

    fn recommendations_for(
        &self,
        student_id: UserId,
    ) -> Result<Vec<JobRecommendation>, StoreError> {
        let tables = self.read()?;
        let mut out: Vec<JobRecommendation> = tables
            .recommendations
            .get(&student_id)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default();
        out.sort_by(|a, b| {
            b.match_percentage
                .value()
                .total_cmp(&a.match_percentage.value())
        });
        Ok(out)
    }

    fn replace_recommendations(
        &self,
        student_id: UserId,
        recommendations: &[JobRecommendation],
    ) -> Result<(), StoreError> {
        let rows: HashMap<JobListingId, JobRecommendation> = recommendations
            .iter()
            .filter(|r| r.student_id == student_id)
            .map(|r| (r.job_id, r.clone()))
            .collect();

        let mut tables = self.write()?;
        if rows.is_empty() {
            tables.recommendations.remove(&student_id);
        } else {
            tables.recommendations.insert(student_id, rows);
        }
        Ok(())
    }

    fn upsert_rating(&self, rating: TeacherRating) -> Result<(TeacherRating, bool), StoreError> {
        let mut tables = self.write()?;
        match tables.ratings.get_mut(&rating.key()) {
            Some(existing) => {
                existing.stars = rating.stars;
                existing.feedback = rating.feedback;
                existing.updated_at = rating.updated_at;
                Ok((existing.clone(), false))
            }
            None => {
                tables.ratings.insert(rating.key(), rating.clone());
                Ok((rating, true))
            }
        }
    }

    fn ratings_for_teacher(&self, teacher_id: UserId) -> Result<Vec<TeacherRating>, StoreError> {
        Ok(self
            .read()?
            .ratings
            .values()
            .filter(|r| r.teacher_id == teacher_id)
            .cloned()
            .collect())
    }

    fn save_teacher_summary(&self, summary: &TeacherRatingSummary) -> Result<(), StoreError> {
        self.write()?
            .teacher_summaries
            .insert(summary.teacher_id, summary.clone());
        Ok(())
    }

    fn teacher_summary(
        &self,
        teacher_id: UserId,
    ) -> Result<Option<TeacherRatingSummary>, StoreError> {
        Ok(self.read()?.teacher_summaries.get(&teacher_id).cloned())
    }

    fn append_activity(&self, entry: ActivityEntry) -> Result<ActivityRecord, StoreError> {
        #[cfg(test)]
        if self.activity_offline.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(StoreError::Unavailable("activity log offline".to_string()));
        }
        let mut tables = self.write()?;
        let stream = tables.activity.entry(entry.stream_id).or_default();
        let next = stream.last().map(|r| r.sequence_number()).unwrap_or(0) + 1;

        let mut record = EventEnvelope::new(
            entry.stream_id,
            entry.stream_type,
            next,
            entry.event_type,
            entry.occurred_at,
            entry.payload,
        );
        if let Some(actor) = entry.actor {
            record = record.with_actor(actor);
        }

        stream.push(record.clone());
        Ok(record)
    }

    fn activity_for(&self, stream_id: Uuid) -> Result<Vec<ActivityRecord>, StoreError> {
        Ok(self
            .read()?
            .activity
            .get(&stream_id)
            .cloned()
            .unwrap_or_default())
    }
}
