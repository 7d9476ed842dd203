//! In-flight authorization sessions and single-use code bindings
//!
//! The store owns two maps behind one tokio Mutex:
//! - sessions keyed by the client's `state`
//! - code bindings keyed by the issued code (the "still redeemable" marker)
//!
//! Both operations that touch them, [`SessionStore::create_session`] and
//! [`SessionStore::redeem_code`], run entirely under the lock. Redemption
//! removes the binding in the same critical section that reads it, so of N
//! concurrent attempts on one code exactly one can succeed.
//!
//! Code lifecycle: `Issued -> Redeemed` or `Issued -> Expired`. Both end states
//! are represented by the binding being gone; nothing moves a code back to
//! `Issued`. Expired bindings are dropped lazily on lookup and in bulk by the
//! reaper (see [`crate::reaper`]).

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::code::{CodeGenerator, RandomCodeGenerator};
use crate::error::RedemptionError;
use crate::pkce;

/// Default lifetime of an unredeemed code.
pub const DEFAULT_CODE_TTL: Duration = Duration::from_secs(600);

/// Longest lifetime a code may be given. Larger values are clamped.
pub const MAX_CODE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// One authorize-to-token transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationSession {
    pub state: String,
    pub nonce: String,
    pub redirect_uri: String,
    pub code: String,
    pub client_id: String,
    pub expires_at: Instant,
}

/// Input to [`SessionStore::create_session`], already validated.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub state: String,
    pub nonce: String,
    pub redirect_uri: String,
    pub client_id: String,
    /// S256 challenge, present only when the PKCE stage is enabled.
    pub code_challenge: Option<String>,
}

/// What a successful redemption hands to the token minter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redemption {
    pub nonce: String,
    pub client_id: String,
    pub state: String,
}

struct CodeBinding {
    nonce: String,
    client_id: String,
    state: String,
    code_challenge: Option<String>,
    expires_at: Instant,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, AuthorizationSession>,
    bindings: HashMap<String, CodeBinding>,
}

impl Inner {
    /// Drop the session stored under `state` if it still belongs to `code`.
    fn forget_session(&mut self, state: &str, code: &str) {
        if self.sessions.get(state).is_some_and(|s| s.code == code) {
            self.sessions.remove(state);
        }
    }
}

/// Thread-safe session and code store.
pub struct SessionStore {
    generator: Box<dyn CodeGenerator>,
    code_ttl: Duration,
    inner: Mutex<Inner>,
}

impl SessionStore {
    pub fn new(code_ttl: Duration) -> Self {
        Self::with_generator(code_ttl, RandomCodeGenerator)
    }

    /// Store with a custom code source (tests inject deterministic generators).
    pub fn with_generator(code_ttl: Duration, generator: impl CodeGenerator + 'static) -> Self {
        if code_ttl > MAX_CODE_TTL {
            warn!(
                code_ttl_secs = code_ttl.as_secs(),
                max_secs = MAX_CODE_TTL.as_secs(),
                "code ttl clamped"
            );
        }
        let code_ttl = code_ttl.min(MAX_CODE_TTL);
        Self {
            generator: Box::new(generator),
            code_ttl,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn code_ttl(&self) -> Duration {
        self.code_ttl
    }

    /// Issue a code for a validated request and remember the session.
    ///
    /// The code is regenerated until it differs from every outstanding code.
    /// A session already stored under the same `state` is replaced; its code
    /// stays redeemable until it expires.
    pub async fn create_session(&self, new: NewSession) -> String {
        let mut inner = self.inner.lock().await;

        let code = loop {
            let candidate = self.generator.generate();
            if !inner.bindings.contains_key(&candidate) {
                break candidate;
            }
            warn!("generated code collides with an outstanding code, regenerating");
        };

        let now = Instant::now();
        let expires_at = now
            .checked_add(self.code_ttl)
            .unwrap_or_else(|| now + MAX_CODE_TTL);
        inner.bindings.insert(
            code.clone(),
            CodeBinding {
                nonce: new.nonce.clone(),
                client_id: new.client_id.clone(),
                state: new.state.clone(),
                code_challenge: new.code_challenge,
                expires_at,
            },
        );

        let session = AuthorizationSession {
            state: new.state,
            nonce: new.nonce,
            redirect_uri: new.redirect_uri,
            code: code.clone(),
            client_id: new.client_id,
            expires_at,
        };
        if let Some(previous) = inner.sessions.insert(session.state.clone(), session) {
            debug!(state = previous.state, "replaced session with the same state");
        }

        code
    }

    /// Atomically check and clear the binding for `code`.
    ///
    /// Unknown, already redeemed and expired codes all yield
    /// [`RedemptionError::UnknownOrUsedCode`]. When the binding carries a PKCE
    /// challenge the verifier is checked here too; a failed check still
    /// consumes the code.
    pub async fn redeem_code(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<Redemption, RedemptionError> {
        let mut inner = self.inner.lock().await;

        let binding = inner
            .bindings
            .remove(code)
            .ok_or(RedemptionError::UnknownOrUsedCode)?;
        inner.forget_session(&binding.state, code);

        if binding.expires_at <= Instant::now() {
            debug!(state = binding.state, "code expired before redemption");
            return Err(RedemptionError::UnknownOrUsedCode);
        }

        // A code is redeemable only while bound to a non-empty nonce
        if binding.nonce.is_empty() {
            warn!(state = binding.state, "code has no nonce binding");
            return Err(RedemptionError::UnknownOrUsedCode);
        }

        if let Some(challenge) = &binding.code_challenge {
            pkce::verify(challenge, code_verifier)?;
        }

        Ok(Redemption {
            nonce: binding.nonce,
            client_id: binding.client_id,
            state: binding.state,
        })
    }

    /// Snapshot of the session stored under `state`.
    pub async fn session(&self, state: &str) -> Option<AuthorizationSession> {
        let inner = self.inner.lock().await;
        inner.sessions.get(state).cloned()
    }

    /// Number of codes that are issued, unexpired and unredeemed.
    pub async fn outstanding(&self) -> usize {
        let now = Instant::now();
        let inner = self.inner.lock().await;
        inner.bindings.values().filter(|b| b.expires_at > now).count()
    }

    /// Evict expired sessions and bindings. Returns the number of codes evicted.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        let before = inner.bindings.len();
        inner.bindings.retain(|_, b| b.expires_at > now);
        inner.sessions.retain(|_, s| s.expires_at > now);
        before - inner.bindings.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn new_session(state: &str, nonce: &str) -> NewSession {
        NewSession {
            state: state.into(),
            nonce: nonce.into(),
            redirect_uri: "https://client.example/cb".into(),
            client_id: "known".into(),
            code_challenge: None,
        }
    }

    /// Yields codes from a fixed list, then `fallback-N`.
    struct ScriptedGenerator {
        script: Vec<&'static str>,
        next: AtomicUsize,
    }

    impl CodeGenerator for ScriptedGenerator {
        fn generate(&self) -> String {
            let i = self.next.fetch_add(1, Ordering::SeqCst);
            self.script
                .get(i)
                .map(|s| s.to_string())
                .unwrap_or_else(|| format!("fallback-{i}"))
        }
    }

    #[tokio::test]
    async fn create_then_redeem_returns_nonce() {
        let store = SessionStore::new(DEFAULT_CODE_TTL);
        let code = store.create_session(new_session("S1", "N1")).await;

        let session = store.session("S1").await.unwrap();
        assert_eq!(session.code, code);
        assert_eq!(session.nonce, "N1");
        assert_eq!(session.redirect_uri, "https://client.example/cb");

        let redemption = store.redeem_code(&code, None).await.unwrap();
        assert_eq!(redemption.nonce, "N1");
        assert_eq!(redemption.client_id, "known");
        assert_eq!(redemption.state, "S1");
    }

    #[tokio::test]
    async fn second_redemption_fails() {
        let store = SessionStore::new(DEFAULT_CODE_TTL);
        let code = store.create_session(new_session("S1", "N1")).await;

        assert!(store.redeem_code(&code, None).await.is_ok());
        assert_eq!(
            store.redeem_code(&code, None).await,
            Err(RedemptionError::UnknownOrUsedCode)
        );
        assert!(store.session("S1").await.is_none());
    }

    #[tokio::test]
    async fn unknown_and_empty_codes_fail() {
        let store = SessionStore::new(DEFAULT_CODE_TTL);
        store.create_session(new_session("S1", "N1")).await;

        for code in ["", "not-a-code"] {
            assert_eq!(
                store.redeem_code(code, None).await,
                Err(RedemptionError::UnknownOrUsedCode)
            );
        }
        assert_eq!(store.outstanding().await, 1);
    }

    #[tokio::test]
    async fn oversized_ttl_is_clamped() {
        let store = SessionStore::new(Duration::from_secs(u64::MAX));
        assert_eq!(store.code_ttl(), MAX_CODE_TTL);

        let code = store.create_session(new_session("S1", "N1")).await;
        let session = store.session("S1").await.unwrap();
        assert!(session.expires_at <= Instant::now() + MAX_CODE_TTL);
        assert_eq!(store.redeem_code(&code, None).await.unwrap().nonce, "N1");
    }

    #[tokio::test]
    async fn code_without_nonce_is_never_redeemable() {
        let store = SessionStore::new(DEFAULT_CODE_TTL);
        let code = store.create_session(new_session("S1", "")).await;

        assert_eq!(
            store.redeem_code(&code, None).await,
            Err(RedemptionError::UnknownOrUsedCode)
        );
        assert_eq!(
            store.redeem_code(&code, None).await,
            Err(RedemptionError::UnknownOrUsedCode)
        );
        assert_eq!(store.outstanding().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_redemption_has_single_winner() {
        let store = Arc::new(SessionStore::new(DEFAULT_CODE_TTL));
        let code = store.create_session(new_session("S1", "N1")).await;

        let mut handles = vec![];
        for _ in 0..64 {
            let store = store.clone();
            let code = code.clone();
            handles.push(tokio::spawn(async move {
                store.redeem_code(&code, None).await
            }));
        }

        let mut wins = 0;
        let mut losses = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(r) => {
                    assert_eq!(r.nonce, "N1");
                    wins += 1;
                }
                Err(RedemptionError::UnknownOrUsedCode) => losses += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(losses, 63);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_creates_lose_no_writes() {
        let store = Arc::new(SessionStore::new(DEFAULT_CODE_TTL));

        let mut handles = vec![];
        for i in 0..100 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .create_session(new_session(&format!("S{i}"), &format!("N{i}")))
                    .await
            }));
        }
        let mut codes = vec![];
        for h in handles {
            codes.push(h.await.unwrap());
        }

        assert_eq!(store.outstanding().await, 100);
        for i in 0..100 {
            assert!(store.session(&format!("S{i}")).await.is_some());
        }
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), 100, "codes must be unique");
    }

    #[tokio::test]
    async fn colliding_codes_are_regenerated() {
        let store = SessionStore::with_generator(
            DEFAULT_CODE_TTL,
            ScriptedGenerator {
                script: vec!["dup", "dup", "dup", "fresh"],
                next: AtomicUsize::new(0),
            },
        );

        let first = store.create_session(new_session("S1", "N1")).await;
        let second = store.create_session(new_session("S2", "N2")).await;
        assert_eq!(first, "dup");
        assert_eq!(second, "fresh");

        assert_eq!(store.redeem_code("dup", None).await.unwrap().nonce, "N1");
        assert_eq!(store.redeem_code("fresh", None).await.unwrap().nonce, "N2");
    }

    #[tokio::test]
    async fn redeemed_code_can_be_reissued_later() {
        // Uniqueness only has to hold among outstanding codes
        let store = SessionStore::with_generator(
            DEFAULT_CODE_TTL,
            ScriptedGenerator {
                script: vec!["same", "same"],
                next: AtomicUsize::new(0),
            },
        );
        let code = store.create_session(new_session("S1", "N1")).await;
        store.redeem_code(&code, None).await.unwrap();

        let again = store.create_session(new_session("S2", "N2")).await;
        assert_eq!(again, "same");
        assert_eq!(store.redeem_code("same", None).await.unwrap().nonce, "N2");
    }

    #[tokio::test]
    async fn same_state_replaces_session_but_keeps_old_code() {
        let store = SessionStore::new(DEFAULT_CODE_TTL);
        let first = store.create_session(new_session("S1", "N1")).await;
        let second = store.create_session(new_session("S1", "N2")).await;

        assert_eq!(store.session("S1").await.unwrap().code, second);

        // Redeeming the stale code must not evict the newer session
        assert_eq!(store.redeem_code(&first, None).await.unwrap().nonce, "N1");
        assert_eq!(store.session("S1").await.unwrap().code, second);
        assert_eq!(store.redeem_code(&second, None).await.unwrap().nonce, "N2");
    }

    #[tokio::test(start_paused = true)]
    async fn expired_code_cannot_be_redeemed() {
        let store = SessionStore::new(Duration::from_secs(60));
        let code = store.create_session(new_session("S1", "N1")).await;

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(store.outstanding().await, 0);
        assert_eq!(
            store.redeem_code(&code, None).await,
            Err(RedemptionError::UnknownOrUsedCode)
        );
        assert!(store.session("S1").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_evicts_only_expired_entries() {
        let store = SessionStore::new(Duration::from_secs(60));
        let old = store.create_session(new_session("old", "N1")).await;
        tokio::time::advance(Duration::from_secs(45)).await;
        let fresh = store.create_session(new_session("fresh", "N2")).await;
        tokio::time::advance(Duration::from_secs(30)).await;

        assert_eq!(store.purge_expired().await, 1);
        assert!(store.session("old").await.is_none());
        assert!(store.session("fresh").await.is_some());
        assert!(store.redeem_code(&old, None).await.is_err());
        assert!(store.redeem_code(&fresh, None).await.is_ok());
    }

    #[tokio::test]
    async fn pkce_binding_requires_matching_verifier() {
        let store = SessionStore::new(DEFAULT_CODE_TTL);
        let mut new = new_session("S1", "N1");
        new.code_challenge = Some(pkce::compute_challenge("the-verifier"));
        let code = store.create_session(new).await;

        assert!(store.redeem_code(&code, Some("the-verifier")).await.is_ok());
    }

    #[tokio::test]
    async fn pkce_mismatch_consumes_code() {
        let store = SessionStore::new(DEFAULT_CODE_TTL);
        let mut new = new_session("S1", "N1");
        new.code_challenge = Some(pkce::compute_challenge("the-verifier"));
        let code = store.create_session(new).await;

        assert_eq!(
            store.redeem_code(&code, Some("guess")).await,
            Err(RedemptionError::CodeVerifierMismatch)
        );
        assert_eq!(
            store.redeem_code(&code, Some("the-verifier")).await,
            Err(RedemptionError::UnknownOrUsedCode)
        );
    }
}
