//! Error taxonomy for the authorization core
//!
//! Three families, kept apart so the transport can map each to its own status:
//! - [`ValidationError`]: the authorize request does not conform (400)
//! - [`RedemptionError`]: the token request cannot redeem the code (400)
//! - [`SigningError`]: the server could not sign tokens (500, operator fault)

/// A non-conforming authorize request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("only response_type=code is supported, got: {0:?}")]
    UnsupportedResponseType(String),

    #[error("unknown client_id: {0:?}")]
    UnknownClient(String),

    #[error("redirect_uri is not allowed: {0:?}")]
    DisallowedRedirectUri(String),

    #[error("scopes lack: openid")]
    MissingRequiredScope,

    #[error("nonce is required")]
    MissingNonce,

    #[error("redirect_uri is not a valid absolute URL: {0}")]
    MalformedRedirectUri(String),

    #[error("code_challenge is required")]
    MissingCodeChallenge,

    #[error("unsupported code_challenge_method: {0:?}, only S256 is supported")]
    UnsupportedChallengeMethod(String),
}

/// A token request that cannot redeem its code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RedemptionError {
    #[error("unknown, expired or already used code")]
    UnknownOrUsedCode,

    #[error("only grant_type=authorization_code is supported, got: {0:?}")]
    UnsupportedGrantType(String),

    #[error("code_verifier is required")]
    MissingCodeVerifier,

    #[error("code_verifier does not match code_challenge")]
    CodeVerifierMismatch,
}

/// Token signing failed. Never caused by client input.
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("signing key is empty")]
    EmptyKey,

    #[error("failed to encode token: {0}")]
    Encode(String),
}

impl From<jsonwebtoken::errors::Error> for SigningError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Encode(err.to_string())
    }
}

/// Any failure the authorization core can report.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Redemption(#[from] RedemptionError),

    #[error(transparent)]
    Signing(#[from] SigningError),
}

impl Error {
    /// Returns `true` when the client caused the failure and must fix its request.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Signing(_))
    }

    /// OAuth 2.0 error code (RFC 6749 sections 4.1.2.1 and 5.2).
    #[must_use]
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::Validation(e) => match e {
                ValidationError::UnsupportedResponseType(_) => "unsupported_response_type",
                ValidationError::UnknownClient(_) => "unauthorized_client",
                ValidationError::MissingRequiredScope => "invalid_scope",
                ValidationError::DisallowedRedirectUri(_)
                | ValidationError::MissingNonce
                | ValidationError::MalformedRedirectUri(_)
                | ValidationError::MissingCodeChallenge
                | ValidationError::UnsupportedChallengeMethod(_) => "invalid_request",
            },
            Self::Redemption(e) => match e {
                RedemptionError::UnsupportedGrantType(_) => "unsupported_grant_type",
                RedemptionError::MissingCodeVerifier => "invalid_request",
                RedemptionError::UnknownOrUsedCode | RedemptionError::CodeVerifierMismatch => {
                    "invalid_grant"
                }
            },
            Self::Signing(_) => "server_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signing_faults_are_not_client_errors() {
        assert!(!Error::from(SigningError::EmptyKey).is_client_error());
        assert!(Error::from(ValidationError::MissingRequiredScope).is_client_error());
        assert!(Error::from(RedemptionError::UnknownOrUsedCode).is_client_error());
    }

    #[test]
    fn oauth_error_codes() {
        let cases: Vec<(Error, &str)> = vec![
            (
                ValidationError::UnsupportedResponseType("token".into()).into(),
                "unsupported_response_type",
            ),
            (
                ValidationError::UnknownClient("x".into()).into(),
                "unauthorized_client",
            ),
            (
                ValidationError::DisallowedRedirectUri("https://evil".into()).into(),
                "invalid_request",
            ),
            (ValidationError::MissingRequiredScope.into(), "invalid_scope"),
            (ValidationError::MissingNonce.into(), "invalid_request"),
            (RedemptionError::UnknownOrUsedCode.into(), "invalid_grant"),
            (
                RedemptionError::UnsupportedGrantType("password".into()).into(),
                "unsupported_grant_type",
            ),
            (RedemptionError::CodeVerifierMismatch.into(), "invalid_grant"),
            (SigningError::EmptyKey.into(), "server_error"),
        ];
        for (err, code) in cases {
            assert_eq!(err.oauth_error_code(), code, "for {err:?}");
        }
    }

    #[test]
    fn display_is_transparent() {
        let err: Error = ValidationError::MissingRequiredScope.into();
        assert_eq!(err.to_string(), "scopes lack: openid");
        let err: Error = RedemptionError::UnknownOrUsedCode.into();
        assert_eq!(err.to_string(), "unknown, expired or already used code");
    }
}
