//! `lyceum-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the domain error model, aggregate traits and the two-decimal
//! percentage value object shared by grading, progress and job matching.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{
    AssignmentId, CourseId, EnrollmentId, JobListingId, RecordId, SubmissionId, UserId,
};
pub use value_object::{Percentage, ValueObject, round2};
