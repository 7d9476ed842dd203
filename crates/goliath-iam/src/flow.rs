//! Authorization and token exchange controllers
//!
//! [`AuthorizationFlow`] runs the validation pipeline, opens a session and
//! builds the redirect back to the client. [`TokenExchange`] redeems a code
//! exactly once and mints the token triple. Neither knows about HTTP; the
//! service maps their results onto status codes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::constants::{
    AUTHORIZE_STATUS_MESSAGE, GRANT_TYPE_AUTHORIZATION_CODE, PARAM_CODE, PARAM_STATE,
    TOKEN_TYPE_BEARER,
};
use crate::error::{RedemptionError, Result, ValidationError};
use crate::session::{NewSession, SessionStore};
use crate::token::{TokenPolicy, mint_tokens};
use crate::validate::{ClientPolicy, validate_request};

/// Query parameters of `GET /authorize`. Missing parameters deserialize as
/// empty strings and fail validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorizeRequest {
    #[serde(default)]
    pub response_type: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub redirect_uri: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub nonce: String,
    #[serde(default)]
    pub code_challenge: Option<String>,
    #[serde(default)]
    pub code_challenge_method: Option<String>,
}

/// Where to send the browser after a successful authorize request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizeRedirect {
    /// The client's redirect URI with `state` and `code` appended.
    pub location: String,
    pub message: &'static str,
}

/// Form fields of `POST /token`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub grant_type: Option<String>,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub code_verifier: Option<String>,
}

/// Successful token response body (OpenID Connect Core 1.0 section 3.1.3.3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenResponse {
    pub access_token: String,
    pub id_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    pub token_type: String,
}

/// Validator -> session store -> code generator.
pub struct AuthorizationFlow {
    store: Arc<SessionStore>,
    client: ClientPolicy,
}

impl AuthorizationFlow {
    pub fn new(store: Arc<SessionStore>, client: ClientPolicy) -> Self {
        Self { store, client }
    }

    /// Validate the request, open a session and build the redirect target.
    pub async fn authorize(&self, request: &AuthorizeRequest) -> Result<AuthorizeRedirect> {
        let code_challenge = validate_request(request, &self.client).inspect_err(|e| {
            warn!(
                client_id = request.client_id,
                state = request.state,
                redirect_uri = request.redirect_uri,
                error = %e,
                "authorize request rejected"
            );
        })?;

        // Parse before issuing a code so a bad allow-list entry leaves no session behind
        let mut location = Url::parse(&request.redirect_uri).map_err(|e| {
            warn!(redirect_uri = request.redirect_uri, error = %e, "allow-listed redirect_uri does not parse");
            ValidationError::MalformedRedirectUri(e.to_string())
        })?;

        let code = self
            .store
            .create_session(NewSession {
                state: request.state.clone(),
                nonce: request.nonce.clone(),
                redirect_uri: request.redirect_uri.clone(),
                client_id: request.client_id.clone(),
                code_challenge,
            })
            .await;

        location
            .query_pairs_mut()
            .append_pair(PARAM_STATE, &request.state)
            .append_pair(PARAM_CODE, &code);

        info!(
            client_id = request.client_id,
            state = request.state,
            "authorization code issued"
        );

        Ok(AuthorizeRedirect {
            location: location.into(),
            message: AUTHORIZE_STATUS_MESSAGE,
        })
    }
}

/// Session store -> token minter.
pub struct TokenExchange {
    store: Arc<SessionStore>,
    policy: TokenPolicy,
}

impl TokenExchange {
    pub fn new(store: Arc<SessionStore>, policy: TokenPolicy) -> Self {
        Self { store, policy }
    }

    /// Redeem the code and mint tokens for `issuer`.
    ///
    /// The code is consumed even if signing fails afterwards; the client
    /// has to restart the flow.
    pub async fn exchange(&self, issuer: &str, request: &TokenRequest) -> Result<TokenResponse> {
        if let Some(grant_type) = request.grant_type.as_deref()
            && grant_type != GRANT_TYPE_AUTHORIZATION_CODE
        {
            warn!(grant_type, "unsupported grant_type");
            return Err(RedemptionError::UnsupportedGrantType(grant_type.to_string()).into());
        }

        let redemption = self
            .store
            .redeem_code(&request.code, request.code_verifier.as_deref())
            .await
            .inspect_err(|e| warn!(code = request.code, error = %e, "code redemption failed"))?;
        debug!(state = redemption.state, "code redeemed");

        let minted = mint_tokens(issuer, &redemption.client_id, &redemption.nonce, &self.policy)
            .inspect_err(|e| {
                error!(
                    client_id = redemption.client_id,
                    state = redemption.state,
                    error = %e,
                    "token signing failed"
                );
            })?;

        info!(
            client_id = redemption.client_id,
            state = redemption.state,
            issuer,
            "tokens issued"
        );

        Ok(TokenResponse {
            access_token: minted.access_token,
            id_token: minted.id_token,
            refresh_token: minted.refresh_token,
            expires_in: minted.expires_in,
            token_type: TOKEN_TYPE_BEARER.to_string(),
        })
    }
}
