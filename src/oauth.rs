//! OAuth code exchange for the git hosting providers.
//!
//! `begin` issues the `state` value embedded in the authorization URL and
//! records it in `oauth-state.json`; the provider later redirects to
//! `reqdesk://oauth/{provider}/authenticate`, possibly into a different
//! process, and the deep-link handler calls `exchange_code`. Tokens are kept
//! in `git-credentials.json`. Both files are mode 0600 and keyed by provider.

use crate::config::{self, OAuthProviderConfig};
use crate::deeplink::GitProvider;
use crate::host::CodeExchange;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const CREDENTIALS_FILE: &str = "git-credentials.json";
pub const PENDING_STATE_FILE: &str = "oauth-state.json";

/// Seconds an issued state stays redeemable.
pub const STATE_TTL_SECS: i64 = 600;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    /// Unix seconds.
    pub obtained_at: i64,
}

pub type Credentials = BTreeMap<String, StoredToken>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PendingState {
    state: String,
    /// Unix seconds.
    issued_at: i64,
}

type PendingStates = BTreeMap<String, PendingState>;

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    #[serde(default)]
    token_type: String,
    error: Option<String>,
    error_description: Option<String>,
}

/// Where the provider sends the browser back to.
pub fn redirect_uri(link_scheme: &str, provider: GitProvider) -> String {
    format!("{link_scheme}://oauth/{}/authenticate", provider.key())
}

fn read_json_file<T: DeserializeOwned + Default>(path: &Path) -> T {
    let Ok(data) = std::fs::read_to_string(path) else {
        return T::default();
    };
    serde_json::from_str(&data).unwrap_or_else(|e| {
        tracing::warn!("[oauth] Corrupt {}: {e}", path.display());
        T::default()
    })
}

pub struct HttpCodeExchange {
    provider: GitProvider,
    config: OAuthProviderConfig,
    http: reqwest::Client,
    dir: PathBuf,
    /// Serializes read-modify-write of the files in `dir` within this process.
    file_lock: Mutex<()>,
}

impl HttpCodeExchange {
    pub fn new(provider: GitProvider, config: OAuthProviderConfig) -> Self {
        Self::in_dir(provider, config, config::config_dir())
    }

    /// Keep pending state and credentials under `dir` instead of the config directory.
    pub fn in_dir(provider: GitProvider, config: OAuthProviderConfig, dir: impl Into<PathBuf>) -> Self {
        Self {
            provider,
            config,
            http: reqwest::Client::new(),
            dir: dir.into(),
            file_lock: Mutex::new(()),
        }
    }

    pub fn provider(&self) -> GitProvider {
        self.provider
    }

    /// Start a sign-in. Returns the `state` to send with the authorization request.
    /// A later `begin` replaces any sign-in for this provider still in progress.
    pub fn begin(&self) -> Result<String, String> {
        let state = uuid::Uuid::new_v4().simple().to_string();
        let path = self.dir.join(PENDING_STATE_FILE);

        let _guard = self.file_lock.lock();
        let mut pending: PendingStates = read_json_file(&path);
        pending.insert(
            self.provider.key().to_string(),
            PendingState {
                state: state.clone(),
                issued_at: chrono::Utc::now().timestamp(),
            },
        );
        config::write_json_atomic(&path, &pending)?;
        tracing::info!("[oauth] Started {} sign-in", self.provider.key());
        Ok(state)
    }

    /// Provider URL the user opens to approve access.
    pub fn authorization_url(&self, state: &str, redirect_uri: &str) -> Result<String, String> {
        url::Url::parse_with_params(
            &self.config.authorize_url,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("state", state),
            ],
        )
        .map(|url| url.to_string())
        .map_err(|e| format!("Invalid {} authorize_url: {e}", self.provider.key()))
    }

    /// Remove and return this provider's pending state. A state is good for one attempt.
    fn take_pending(&self) -> Result<Option<PendingState>, String> {
        let path = self.dir.join(PENDING_STATE_FILE);

        let _guard = self.file_lock.lock();
        let mut pending: PendingStates = read_json_file(&path);
        let taken = pending.remove(self.provider.key());
        if taken.is_some() {
            config::write_json_atomic(&path, &pending)?;
        }
        Ok(taken)
    }

    pub fn stored_token(&self) -> Option<StoredToken> {
        let mut credentials: Credentials = read_json_file(&self.dir.join(CREDENTIALS_FILE));
        credentials.remove(self.provider.key())
    }

    fn persist(&self, token: StoredToken) -> Result<(), String> {
        let path = self.dir.join(CREDENTIALS_FILE);

        let _guard = self.file_lock.lock();
        let mut credentials: Credentials = read_json_file(&path);
        credentials.insert(self.provider.key().to_string(), token);
        config::write_json_atomic(&path, &credentials)
    }
}

#[async_trait]
impl CodeExchange for HttpCodeExchange {
    async fn exchange_code(&self, code: &str, state: &str) -> Result<(), String> {
        let provider = self.provider.key();

        let Some(expected) = self.take_pending()? else {
            return Err(format!("No {provider} sign-in is in progress"));
        };
        if expected.state != state {
            tracing::warn!("[oauth] {provider} state mismatch");
            return Err("Authorization state did not match; please try signing in again".into());
        }
        if chrono::Utc::now().timestamp() - expected.issued_at > STATE_TTL_SECS {
            return Err(format!("The {provider} sign-in expired; please try again"));
        }
        if code.is_empty() {
            return Err("Authorization code is missing".into());
        }

        let response = self
            .http
            .post(&self.config.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("code", code),
                ("state", state),
            ])
            .send()
            .await
            .map_err(|e| format!("Failed to reach {provider} token endpoint: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("{provider} token endpoint returned HTTP {status}"));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| format!("Invalid {provider} token response: {e}"))?;

        if let Some(error) = body.error {
            return Err(body.error_description.unwrap_or(error));
        }
        let access_token = body
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| format!("{provider} token response had no access_token"))?;

        self.persist(StoredToken {
            access_token,
            token_type: body.token_type,
            obtained_at: chrono::Utc::now().timestamp(),
        })?;
        tracing::info!("[oauth] Stored {provider} token");
        Ok(())
    }
}
