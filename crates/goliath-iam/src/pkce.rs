//! PKCE (Proof Key for Code Exchange, RFC 7636), S256 only
//!
//! Optional pipeline stage. When enabled, `/authorize` must carry a
//! `code_challenge` with `code_challenge_method=S256`, and `/token` must carry
//! the matching `code_verifier`. The `plain` method is not accepted.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

use crate::constants::CODE_CHALLENGE_METHOD_S256;
use crate::error::{RedemptionError, ValidationError};

/// Compute the S256 code challenge from a verifier.
///
/// `challenge = BASE64URL(SHA256(verifier))`
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Authorize-side stage: require a challenge and the S256 method.
///
/// Returns the challenge to store alongside the issued code.
pub fn validate_challenge(
    challenge: Option<&str>,
    method: Option<&str>,
) -> Result<String, ValidationError> {
    let challenge = match challenge {
        Some(c) if !c.is_empty() => c,
        _ => return Err(ValidationError::MissingCodeChallenge),
    };
    match method {
        Some(CODE_CHALLENGE_METHOD_S256) => Ok(challenge.to_string()),
        other => Err(ValidationError::UnsupportedChallengeMethod(
            other.unwrap_or_default().to_string(),
        )),
    }
}

/// Token-side stage: the verifier must hash to the stored challenge.
pub fn verify(challenge: &str, verifier: Option<&str>) -> Result<(), RedemptionError> {
    let verifier = match verifier {
        Some(v) if !v.is_empty() => v,
        _ => return Err(RedemptionError::MissingCodeVerifier),
    };
    if compute_challenge(verifier) == challenge {
        Ok(())
    } else {
        Err(RedemptionError::CodeVerifierMismatch)
    }
}
