//! Optional certificate rendering collaborator.

use thiserror::Error;

use lyceum_credentials::CertificateSnapshot;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("renderer unavailable: {0}")]
    Unavailable(String),

    #[error("render failed: {0}")]
    Failed(String),
}

/// Produces the binary certificate document from its frozen snapshot.
///
/// Absence or failure never blocks the certificate record; only the artifact is
/// skipped.
pub trait CertificateRenderer: Send + Sync {
    fn render(&self, snapshot: &CertificateSnapshot) -> Result<Vec<u8>, RenderError>;
}
