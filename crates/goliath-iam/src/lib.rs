//! OpenID Connect authorization code flow core
//!
//! Issues short-lived single-use codes bound to a client session and
//! exchanges each code once for a signed identity/access/refresh token triple.
//! This crate has no HTTP dependency; the `goliath` service binds it to axum.
//!
//! Flow:
//! 1. `AuthorizationFlow::authorize()` validates the request
//!    (`validate::validate_request`), opens a session and returns the redirect
//! 2. `SessionStore::create_session()` issues a code from a `CodeGenerator`
//! 3. `TokenExchange::exchange()` redeems the code via
//!    `SessionStore::redeem_code()` (atomic check-and-clear)
//! 4. `token::mint_tokens()` signs the triple with the configured key
//! 5. `reaper::spawn_reaper()` evicts codes that were never redeemed

pub mod code;
pub mod constants;
pub mod error;
pub mod flow;
pub mod pkce;
pub mod reaper;
pub mod session;
pub mod token;
pub mod validate;

pub use code::{CodeGenerator, RandomCodeGenerator};
pub use error::{Error, RedemptionError, Result, SigningError, ValidationError};
pub use flow::{
    AuthorizationFlow, AuthorizeRedirect, AuthorizeRequest, TokenExchange, TokenRequest,
    TokenResponse,
};
pub use reaper::spawn_reaper;
pub use session::{AuthorizationSession, NewSession, Redemption, SessionStore};
pub use token::{MintedTokens, TokenKind, TokenPolicy, mint_tokens, verify_token};
pub use validate::ClientPolicy;
