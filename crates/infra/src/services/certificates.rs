//! Certificate issuance and verification. Documents are rendered by the
//! delivery worker after the certificate row is stored.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use lyceum_core::{DomainError, EnrollmentId};
use lyceum_credentials::{Certificate, CertificateCodes, Verification};

use crate::activity::{ActivityEvent, CERTIFICATE_STREAM};
use crate::error::{CascadeWarning, EngineError, EngineResult};
use crate::services::EngineContext;
use crate::store::StoreError;

/// Fresh identifier pairs drawn before giving up on a collision streak.
pub const MAX_IDENTIFIER_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct IssuedCertificate {
    pub certificate: Certificate,
    /// False when an existing certificate was returned unchanged.
    pub created: bool,
    pub warnings: Vec<CascadeWarning>,
}

#[derive(Clone)]
pub struct CertificateIssuer {
    ctx: Arc<EngineContext>,
    codes: Arc<dyn CertificateCodes>,
}

impl std::fmt::Debug for CertificateIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateIssuer")
            .field("deliveries", &self.ctx.deliveries)
            .finish_non_exhaustive()
    }
}

impl CertificateIssuer {
    pub fn new(ctx: Arc<EngineContext>, codes: Arc<dyn CertificateCodes>) -> Self {
        Self { ctx, codes }
    }

    /// Idempotent: an enrollment that already has a certificate gets it back
    /// unchanged (only a missing artifact is queued again).
    pub fn issue(&self, enrollment_id: EnrollmentId) -> EngineResult<IssuedCertificate> {
        if let Some(existing) = self.ctx.store.certificate_for(enrollment_id)? {
            return Ok(self.finish(existing, false));
        }

        let enrollment = self.ctx.load_enrollment(enrollment_id)?;
        let grade = self.ctx.store.grade_for(enrollment_id)?.ok_or_else(|| {
            DomainError::invalid_state(format!("enrollment {enrollment_id} has no published grade"))
        })?;
        let course = self.ctx.load_course(enrollment.course_id())?;

        for attempt in 1..=MAX_IDENTIFIER_ATTEMPTS {
            let candidate = Certificate::issue(
                &enrollment,
                &grade,
                &course,
                self.codes.certificate_id(),
                self.codes.verification_code(),
                Utc::now(),
            )?;

            match self.ctx.store.insert_certificate(&candidate) {
                Ok(stored) => {
                    let created = stored.certificate_id == candidate.certificate_id;
                    if created {
                        info!(
                            %enrollment_id,
                            certificate_id = %stored.certificate_id,
                            "certificate issued"
                        );
                    }
                    return Ok(self.finish(stored, created));
                }
                Err(StoreError::UniqueViolation(msg)) => {
                    warn!(%enrollment_id, attempt, error = %msg, "certificate identifier collision");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(EngineError::Persistence(StoreError::UniqueViolation(format!(
            "no unique certificate identifier after {MAX_IDENTIFIER_ATTEMPTS} attempts"
        ))))
    }

    /// Lookup by certificate id or verification code; unknown values are not errors.
    pub fn verify(&self, identifier_or_code: &str) -> EngineResult<Verification> {
        Ok(self
            .ctx
            .store
            .find_certificate(identifier_or_code)?
            .map(|c| Verification::of(&c))
            .unwrap_or_else(Verification::invalid))
    }

    pub fn artifact(&self, certificate_id: &str) -> EngineResult<Option<Vec<u8>>> {
        Ok(self.ctx.store.certificate_artifact(certificate_id)?)
    }

    fn finish(&self, certificate: Certificate, created: bool) -> IssuedCertificate {
        let mut warnings = Vec::new();

        if created {
            let event = ActivityEvent::CertificateIssued {
                certificate_id: certificate.certificate_id.clone(),
                enrollment_id: certificate.enrollment_id,
                occurred_at: certificate.snapshot.issued_at,
            };
            if let Err(w) = self.ctx.activity.record(
                *certificate.enrollment_id.as_uuid(),
                CERTIFICATE_STREAM,
                None,
                &[event],
            ) {
                warnings.push(w);
            }
        }

        if !certificate.artifact_available {
            if let Some(w) = self.ctx.deliveries.render(certificate.clone()) {
                warnings.push(w);
            }
        }

        IssuedCertificate {
            certificate,
            created,
            warnings,
        }
    }
}
