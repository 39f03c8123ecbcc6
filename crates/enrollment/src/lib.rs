//! Enrollment domain module.
//!
//! The `Enrollment` aggregate owns the participation lifecycle of one student
//! in one course: approval, activity, completion and the AI-feature gate.
//! Ratings are gated on a completed enrollment.

pub mod enrollment;
pub mod rating;

pub use enrollment::{
    ActivateEnrollment, ApproveEnrollment, CompleteEnrollment, DropEnrollment, Enrollment,
    EnrollmentCommand, EnrollmentEvent, EnrollmentStatus, RecordProgress, RejectEnrollment,
    ReinstateEnrollment, RequestEnrollment, ReviseFinalGrade, SuspendEnrollment,
    ai_features_enabled,
};
pub use rating::{TeacherRating, TeacherRatingSummary};
