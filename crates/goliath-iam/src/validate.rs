//! Authorization request validation
//!
//! One pure function per rule, per OpenID Connect Core 1.0 section 3.1.2.2.
//! [`validate_request`] runs them in a fixed order and stops at the first
//! failure:
//!
//! 1. `response_type` is exactly `code`
//! 2. `client_id` is the configured client
//! 3. `redirect_uri` is in the allow-list (exact string match)
//! 4. `scope` contains `openid`
//! 5. `nonce` is present, since every code is bound to one
//! 6. PKCE challenge, only when the policy enables it

use std::collections::HashSet;

use crate::constants::{RESPONSE_TYPE_CODE, SCOPE_OPENID};
use crate::error::ValidationError;
use crate::flow::AuthorizeRequest;
use crate::pkce;

/// The single relying party this server knows about.
#[derive(Debug, Clone)]
pub struct ClientPolicy {
    pub client_id: String,
    pub allowed_redirect_uris: Vec<String>,
    /// Require a PKCE challenge at `/authorize` and a verifier at `/token`.
    pub pkce: bool,
}

pub fn validate_response_type(response_type: &str) -> Result<(), ValidationError> {
    if response_type == RESPONSE_TYPE_CODE {
        Ok(())
    } else {
        Err(ValidationError::UnsupportedResponseType(
            response_type.to_string(),
        ))
    }
}

pub fn validate_client_id(client_id: &str, policy: &ClientPolicy) -> Result<(), ValidationError> {
    if client_id == policy.client_id {
        Ok(())
    } else {
        Err(ValidationError::UnknownClient(client_id.to_string()))
    }
}

/// Exact match, no normalization: `https://a/cb` and `https://a/cb/` differ.
pub fn validate_redirect_uri(
    redirect_uri: &str,
    policy: &ClientPolicy,
) -> Result<(), ValidationError> {
    if policy
        .allowed_redirect_uris
        .iter()
        .any(|allowed| allowed == redirect_uri)
    {
        Ok(())
    } else {
        Err(ValidationError::DisallowedRedirectUri(
            redirect_uri.to_string(),
        ))
    }
}

/// Split a `scope` parameter on whitespace into a set of scope tokens.
pub fn parse_scope(scope: &str) -> HashSet<&str> {
    scope.split_whitespace().collect()
}

pub fn validate_scopes<S: AsRef<str>>(scopes: &[S]) -> Result<(), ValidationError> {
    if scopes.iter().any(|s| s.as_ref() == SCOPE_OPENID) {
        Ok(())
    } else {
        Err(ValidationError::MissingRequiredScope)
    }
}

pub fn validate_nonce(nonce: &str) -> Result<(), ValidationError> {
    if nonce.is_empty() {
        Err(ValidationError::MissingNonce)
    } else {
        Ok(())
    }
}

/// Run the whole pipeline. Returns the PKCE challenge when the stage is enabled.
pub fn validate_request(
    request: &AuthorizeRequest,
    policy: &ClientPolicy,
) -> Result<Option<String>, ValidationError> {
    validate_response_type(&request.response_type)?;
    validate_client_id(&request.client_id, policy)?;
    validate_redirect_uri(&request.redirect_uri, policy)?;
    let scopes: Vec<&str> = parse_scope(&request.scope).into_iter().collect();
    validate_scopes(&scopes)?;
    validate_nonce(&request.nonce)?;

    if policy.pkce {
        let challenge = pkce::validate_challenge(
            request.code_challenge.as_deref(),
            request.code_challenge_method.as_deref(),
        )?;
        return Ok(Some(challenge));
    }
    Ok(None)
}
