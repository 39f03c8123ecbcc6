//! Credentials domain module.
//!
//! The completion certificate record: issuance preconditions, the snapshot it
//! freezes, verification results and the generation of its two independent
//! identifiers.

pub mod certificate;
pub mod codes;

pub use certificate::{Certificate, CertificateSnapshot, Verification};
pub use codes::{CertificateCodes, RandomCodes};
