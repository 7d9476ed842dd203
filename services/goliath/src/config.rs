//! Configuration types and loading
//!
//! Config precedence: CLI flags > env vars > config file > defaults.
//! The signing key resolves from GOLIATH_SIGNING_KEY, then
//! `token.signing_key_file`, then inline `token.signing_key`.

use common::Secret;
use goliath_iam::session::MAX_CODE_TTL;
use goliath_iam::{ClientPolicy, TokenPolicy};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Env var that overrides any configured signing key
pub const SIGNING_KEY_ENV: &str = "GOLIATH_SIGNING_KEY";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub app: AppConfig,
    #[serde(default)]
    pub token: TokenConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: IpAddr,
    /// Fixed `iss` claim. When unset the issuer is derived from each request.
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// The relying party this server authorizes
#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub client_id: String,
    pub allowed_redirect_uris: Vec<String>,
    #[serde(default)]
    pub pkce: bool,
}

/// Token signing and lifetimes
#[derive(Debug, Deserialize)]
pub struct TokenConfig {
    #[serde(default)]
    pub signing_key: Option<Secret<String>>,
    #[serde(default)]
    pub signing_key_file: Option<PathBuf>,
    #[serde(default = "default_access_token_exp_ms")]
    pub access_token_exp_ms: u64,
    #[serde(default = "default_refresh_token_exp_ms")]
    pub refresh_token_exp_ms: u64,
    /// Defaults to `access_token_exp_ms`
    #[serde(default)]
    pub id_token_exp_ms: Option<u64>,
}

/// Code lifetime and eviction
#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_code_ttl")]
    pub code_ttl_secs: u64,
    #[serde(default = "default_reap_interval")]
    pub reap_interval_secs: u64,
}

fn default_port() -> u16 {
    8000
}

fn default_bind() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_max_connections() -> usize {
    1000
}

fn default_access_token_exp_ms() -> u64 {
    3_600_000
}

fn default_refresh_token_exp_ms() -> u64 {
    7_200_000
}

fn default_code_ttl() -> u64 {
    600
}

fn default_reap_interval() -> u64 {
    60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            issuer: None,
            max_connections: default_max_connections(),
        }
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            signing_key: None,
            signing_key_file: None,
            access_token_exp_ms: default_access_token_exp_ms(),
            refresh_token_exp_ms: default_refresh_token_exp_ms(),
            id_token_exp_ms: None,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            code_ttl_secs: default_code_ttl(),
            reap_interval_secs: default_reap_interval(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// An empty signing key is not rejected here: minting with it fails with a
    /// signing fault per request, which keeps `/authorize` and `/ping` usable.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.validate()?;

        if let Ok(key) = std::env::var(SIGNING_KEY_ENV) {
            config.token.signing_key = Some(Secret::new(key));
        } else if let Some(ref key_file) = config.token.signing_key_file {
            let key = std::fs::read_to_string(key_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read signing_key_file {}: {e}",
                    key_file.display()
                ))
            })?;
            config.token.signing_key = Some(Secret::new(key.trim().to_owned()));
        }

        if config
            .token
            .signing_key
            .as_ref()
            .is_none_or(|k| k.is_blank())
        {
            warn!("no signing key configured, token requests will fail until one is provided");
        }

        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if self.app.client_id.trim().is_empty() {
            return Err(common::Error::Config(
                "app.client_id must not be empty".into(),
            ));
        }

        if self.app.allowed_redirect_uris.is_empty() {
            return Err(common::Error::Config(
                "app.allowed_redirect_uris must list at least one URI".into(),
            ));
        }

        // Redirect targets are built with url::Url, so every entry must parse
        for uri in &self.app.allowed_redirect_uris {
            url::Url::parse(uri).map_err(|e| {
                common::Error::Config(format!(
                    "app.allowed_redirect_uris entry {uri:?} is not an absolute URL: {e}"
                ))
            })?;
        }

        let durations = [
            ("token.access_token_exp_ms", self.token.access_token_exp_ms),
            ("token.refresh_token_exp_ms", self.token.refresh_token_exp_ms),
            (
                "token.id_token_exp_ms",
                self.token.id_token_exp_ms.unwrap_or(1),
            ),
            ("session.code_ttl_secs", self.session.code_ttl_secs),
            ("session.reap_interval_secs", self.session.reap_interval_secs),
        ];
        for (key, value) in durations {
            if value == 0 {
                return Err(common::Error::Config(format!(
                    "{key} must be greater than 0"
                )));
            }
        }

        let max_secs = MAX_CODE_TTL.as_secs();
        for (key, value) in [
            ("session.code_ttl_secs", self.session.code_ttl_secs),
            ("session.reap_interval_secs", self.session.reap_interval_secs),
        ] {
            if value > max_secs {
                return Err(common::Error::Config(format!(
                    "{key} must be at most {max_secs}"
                )));
            }
        }

        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "server.max_connections must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("goliath.toml")
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.bind, self.server.port)
    }

    pub fn client_policy(&self) -> ClientPolicy {
        ClientPolicy {
            client_id: self.app.client_id.clone(),
            allowed_redirect_uris: self.app.allowed_redirect_uris.clone(),
            pkce: self.app.pkce,
        }
    }

    pub fn token_policy(&self) -> TokenPolicy {
        let access = self.token.access_token_exp_ms;
        TokenPolicy {
            signing_key: self
                .token
                .signing_key
                .clone()
                .unwrap_or_else(|| Secret::new(String::new())),
            id_token_ttl: Duration::from_millis(self.token.id_token_exp_ms.unwrap_or(access)),
            access_token_ttl: Duration::from_millis(access),
            refresh_token_ttl: Duration::from_millis(self.token.refresh_token_exp_ms),
        }
    }

    pub fn code_ttl(&self) -> Duration {
        Duration::from_secs(self.session.code_ttl_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.session.reap_interval_secs)
    }
}
