//! `lyceum-ai`
//!
//! **Responsibility:** Optional feedback-generation boundary.
//!
//! This crate is intentionally **not** part of the domain model:
//! - It must not depend on enrollment or grading aggregates.
//! - It must not mutate domain state.
//! - It returns **feedback reports**, not domain events.
//!
//! A generative backend is injected by the caller through [`FeedbackGenerator`];
//! [`RuleBasedFeedback`] is the deterministic fallback used whenever that
//! backend is absent, fails, or times out.

pub mod feedback;
pub mod result;

pub use feedback::{FeedbackGenerator, FeedbackRequest, RuleBasedFeedback};
pub use result::{AiError, FeedbackReport, FeedbackSource, RiskLevel};
