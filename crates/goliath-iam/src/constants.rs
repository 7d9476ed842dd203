//! OpenID Connect protocol literals
//!
//! Parameter names and values from OpenID Connect Core 1.0 section 3.1.2.1
//! (authentication request) and 3.1.3.1 (token request).

/// The only `response_type` this server issues.
pub const RESPONSE_TYPE_CODE: &str = "code";

/// Scope that marks a request as an OpenID Connect request.
pub const SCOPE_OPENID: &str = "openid";

/// Scope clients add to ask for a refresh token.
pub const SCOPE_OFFLINE_ACCESS: &str = "offline_access";

/// The only `grant_type` accepted at the token endpoint.
pub const GRANT_TYPE_AUTHORIZATION_CODE: &str = "authorization_code";

/// The only PKCE challenge method accepted.
pub const CODE_CHALLENGE_METHOD_S256: &str = "S256";

/// `token_type` reported in every token response.
pub const TOKEN_TYPE_BEARER: &str = "Bearer";

/// Human-readable body returned with the authorize redirect.
pub const AUTHORIZE_STATUS_MESSAGE: &str = "Starting code flow";

// Query parameters appended to the client's redirect URI
pub const PARAM_STATE: &str = "state";
pub const PARAM_CODE: &str = "code";
