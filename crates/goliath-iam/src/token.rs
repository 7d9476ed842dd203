//! Token minting
//!
//! Produces the identity, access and refresh tokens returned from the token
//! endpoint. All three are HS256 JWS compact tokens signed with the configured
//! symmetric key. Each token type has its own lifetime; `expires_in` always
//! reports the access token's remaining lifetime in whole seconds.
//!
//! Expiry arithmetic is done in unix milliseconds and converted to seconds for
//! the `iat`/`exp` claims:
//!
//! ```text
//! expires    = now_ms + access_ttl_ms
//! expires_in = (expires - now_ms) / 1000
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use common::Secret;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::SigningError;

/// Lifetimes and key material for minted tokens.
#[derive(Debug, Clone)]
pub struct TokenPolicy {
    pub signing_key: Secret<String>,
    pub id_token_ttl: Duration,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
}

/// Which of the three tokens a claim set belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Id,
    Access,
    Refresh,
}

impl TokenPolicy {
    pub fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Id => self.id_token_ttl,
            TokenKind::Access => self.access_token_ttl,
            TokenKind::Refresh => self.refresh_token_ttl,
        }
    }

    /// Expiry instant in unix milliseconds: `now + configured offset`.
    pub fn expires_at_millis(&self, kind: TokenKind, now_millis: u64) -> u64 {
        now_millis.saturating_add(self.ttl(kind).as_millis() as u64)
    }
}

/// Claims of the identity token (OpenID Connect Core 1.0 section 2).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdTokenClaims {
    pub iss: String,
    pub aud: String,
    pub nonce: String,
    pub iat: u64,
    pub exp: u64,
    pub jti: String,
}

/// Claims shared by access and refresh tokens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GrantTokenClaims {
    pub iss: String,
    pub aud: String,
    pub iat: u64,
    pub exp: u64,
    pub jti: String,
    /// `"access"` or `"refresh"`
    pub token_use: String,
}

/// The three signed tokens plus the access token lifetime.
#[derive(Debug, Clone)]
pub struct MintedTokens {
    pub id_token: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
}

/// Mint the token triple using the current wall clock.
pub fn mint_tokens(
    issuer: &str,
    audience: &str,
    nonce: &str,
    policy: &TokenPolicy,
) -> Result<MintedTokens, SigningError> {
    mint_tokens_at(issuer, audience, nonce, policy, now_millis())
}

/// Mint the token triple as of `now_millis` (unix milliseconds).
pub fn mint_tokens_at(
    issuer: &str,
    audience: &str,
    nonce: &str,
    policy: &TokenPolicy,
    now_millis: u64,
) -> Result<MintedTokens, SigningError> {
    let key = encoding_key(policy)?;
    let iat = now_millis / 1000;

    let id_claims = IdTokenClaims {
        iss: issuer.to_string(),
        aud: audience.to_string(),
        nonce: nonce.to_string(),
        iat,
        exp: policy.expires_at_millis(TokenKind::Id, now_millis) / 1000,
        jti: new_jti(),
    };

    let access_expires = policy.expires_at_millis(TokenKind::Access, now_millis);
    let access_claims = grant_claims(issuer, audience, iat, access_expires, "access");
    let refresh_claims = grant_claims(
        issuer,
        audience,
        iat,
        policy.expires_at_millis(TokenKind::Refresh, now_millis),
        "refresh",
    );

    Ok(MintedTokens {
        id_token: sign(&id_claims, &key)?,
        access_token: sign(&access_claims, &key)?,
        refresh_token: sign(&refresh_claims, &key)?,
        expires_in: access_expires.saturating_sub(now_millis) / 1000,
    })
}

/// Decode a minted token and verify its HS256 signature and expiry.
pub fn verify_token<T: DeserializeOwned>(
    token: &str,
    policy: &TokenPolicy,
) -> Result<T, jsonwebtoken::errors::Error> {
    let key = DecodingKey::from_secret(policy.signing_key.expose().as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_aud = false;
    validation.set_required_spec_claims(&["exp", "iss"]);
    jsonwebtoken::decode::<T>(token, &key, &validation).map(|data| data.claims)
}

fn grant_claims(
    issuer: &str,
    audience: &str,
    iat: u64,
    expires_millis: u64,
    token_use: &str,
) -> GrantTokenClaims {
    GrantTokenClaims {
        iss: issuer.to_string(),
        aud: audience.to_string(),
        iat,
        exp: expires_millis / 1000,
        jti: new_jti(),
        token_use: token_use.to_string(),
    }
}

fn encoding_key(policy: &TokenPolicy) -> Result<EncodingKey, SigningError> {
    if policy.signing_key.is_blank() {
        return Err(SigningError::EmptyKey);
    }
    Ok(EncodingKey::from_secret(
        policy.signing_key.expose().as_bytes(),
    ))
}

fn sign<T: Serialize>(claims: &T, key: &EncodingKey) -> Result<String, SigningError> {
    Ok(jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        claims,
        key,
    )?)
}

fn new_jti() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
