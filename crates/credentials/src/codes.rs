use rand::Rng;
use uuid::Uuid;

/// Alphabet for verification codes (no 0/O/1/I to keep them readable).
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const VERIFICATION_CODE_LEN: usize = 16;

/// Source of certificate identifiers and verification codes.
///
/// The two values must be drawn independently: a verification code is never
/// derivable from the certificate identifier.
pub trait CertificateCodes: Send + Sync {
    fn certificate_id(&self) -> String;
    fn verification_code(&self) -> String;
}

/// UUIDv4 certificate ids plus an independent random verification code.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCodes;

impl CertificateCodes for RandomCodes {
    fn certificate_id(&self) -> String {
        format!("CERT-{}", Uuid::new_v4().simple()).to_uppercase()
    }

    fn verification_code(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..VERIFICATION_CODE_LEN)
            .map(|_| {
                let idx = rng.gen_range(0..CODE_ALPHABET.len());
                CODE_ALPHABET[idx] as char
            })
            .collect()
    }
}
