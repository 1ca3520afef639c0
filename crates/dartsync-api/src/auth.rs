// OpenID-Connect session against the Autodarts identity provider.
//
// A `Session` logs in once with the resource-owner password grant and
// keeps the resulting token pair behind a mutex. Every API call asks for
// a bearer token; expired access tokens are renewed with the refresh
// token, and a rejected refresh falls back to a full login.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// Renew tokens this long before they actually expire.
const EXPIRY_MARGIN_SECS: i64 = 30;

// ── Configuration ────────────────────────────────────────────────────

/// Account credentials for the password grant.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: SecretString,
}

/// Everything needed to reach the cloud on behalf of one account.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// REST base, e.g. `https://api.autodarts.io`.
    pub api_url: Url,
    /// Identity provider base, e.g. `https://login.autodarts.io`.
    pub auth_url: Url,
    /// Push channel endpoint.
    pub ws_url: Url,
    pub realm: String,
    pub client_id: String,
    pub client_secret: Option<SecretString>,
    pub credentials: Credentials,
    pub transport: TransportConfig,
}

impl SessionConfig {
    pub fn token_url(&self) -> Result<Url, Error> {
        let full = format!(
            "{}/realms/{}/protocol/openid-connect/token",
            self.auth_url.as_str().trim_end_matches('/'),
            self.realm
        );
        Ok(Url::parse(&full)?)
    }
}

// ── Token bookkeeping ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    refresh_expires_in: Option<i64>,
}

#[derive(Debug)]
struct TokenSet {
    access: SecretString,
    expires_at: DateTime<Utc>,
    refresh: Option<(SecretString, DateTime<Utc>)>,
}

impl TokenSet {
    fn from_response(resp: TokenResponse, now: DateTime<Utc>) -> Self {
        let refresh = resp.refresh_token.map(|token| {
            // Keycloak omits refresh_expires_in for offline tokens.
            let ttl = resp.refresh_expires_in.unwrap_or(i64::from(u16::MAX));
            (SecretString::from(token), now + ChronoDuration::seconds(ttl))
        });
        Self {
            access: SecretString::from(resp.access_token),
            expires_at: now + ChronoDuration::seconds(resp.expires_in),
            refresh,
        }
    }

    fn access_valid(&self, now: DateTime<Utc>) -> bool {
        now + ChronoDuration::seconds(EXPIRY_MARGIN_SECS) < self.expires_at
    }

    fn usable_refresh(&self, now: DateTime<Utc>) -> Option<&SecretString> {
        self.refresh
            .as_ref()
            .filter(|(_, expires_at)| now + ChronoDuration::seconds(EXPIRY_MARGIN_SECS) < *expires_at)
            .map(|(token, _)| token)
    }
}

// ── Session ──────────────────────────────────────────────────────────

/// Authenticated handle to the cloud.
///
/// Cheaply cloneable; every board and match fetched through it shares the
/// same HTTP client and token pair.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: SessionConfig,
    http: reqwest::Client,
    tokens: Mutex<Option<TokenSet>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("api_url", &self.inner.config.api_url.as_str())
            .field("email", &self.inner.config.credentials.email)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Build the HTTP client and log in.
    ///
    /// Bad credentials surface as [`Error::InvalidCredentials`].
    pub async fn connect(config: SessionConfig) -> Result<Self, Error> {
        let http = config.transport.build_client()?;
        let session = Self {
            inner: Arc::new(SessionInner {
                config,
                http,
                tokens: Mutex::new(None),
            }),
        };

        let tokens = session.login().await?;
        *session.inner.tokens.lock().await = Some(tokens);
        info!(email = %session.inner.config.credentials.email, "authenticated");
        Ok(session)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    /// A currently valid access token, renewing it if needed.
    pub async fn bearer(&self) -> Result<String, Error> {
        let mut guard = self.inner.tokens.lock().await;
        let now = Utc::now();

        if let Some(tokens) = guard.as_ref() {
            if tokens.access_valid(now) {
                return Ok(tokens.access.expose_secret().to_owned());
            }
        }

        let refreshed = match guard.as_ref().and_then(|t| t.usable_refresh(now)) {
            Some(refresh) => match self.refresh(refresh).await {
                Ok(tokens) => tokens,
                Err(e) if e.is_auth_expired() => {
                    debug!(error = %e, "refresh token rejected, logging in again");
                    self.login().await?
                }
                Err(e) => return Err(e),
            },
            None => self.login().await?,
        };

        let access = refreshed.access.expose_secret().to_owned();
        *guard = Some(refreshed);
        Ok(access)
    }

    /// Forget the current tokens so the next call logs in again.
    pub async fn invalidate(&self) {
        *self.inner.tokens.lock().await = None;
    }

    async fn login(&self) -> Result<TokenSet, Error> {
        let config = &self.inner.config;
        debug!(email = %config.credentials.email, "requesting password grant");

        let mut form = vec![
            ("grant_type", "password".to_owned()),
            ("client_id", config.client_id.clone()),
            ("username", config.credentials.email.clone()),
            (
                "password",
                config.credentials.password.expose_secret().to_owned(),
            ),
            ("scope", "openid".to_owned()),
        ];
        if let Some(secret) = &config.client_secret {
            form.push(("client_secret", secret.expose_secret().to_owned()));
        }

        let resp = self
            .inner
            .http
            .post(config.token_url()?)
            .form(&form)
            .send()
            .await
            .map_err(Error::Transport)?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::BAD_REQUEST
        {
            return Err(Error::InvalidCredentials {
                email: config.credentials.email.clone(),
            });
        }
        Self::token_set(resp).await
    }

    async fn refresh(&self, refresh: &SecretString) -> Result<TokenSet, Error> {
        let config = &self.inner.config;
        debug!("refreshing access token");

        let mut form = vec![
            ("grant_type", "refresh_token".to_owned()),
            ("client_id", config.client_id.clone()),
            ("refresh_token", refresh.expose_secret().to_owned()),
        ];
        if let Some(secret) = &config.client_secret {
            form.push(("client_secret", secret.expose_secret().to_owned()));
        }

        let resp = self
            .inner
            .http
            .post(config.token_url()?)
            .form(&form)
            .send()
            .await
            .map_err(Error::Transport)?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::BAD_REQUEST
        {
            return Err(Error::SessionExpired);
        }
        Self::token_set(resp).await
    }

    async fn token_set(resp: reqwest::Response) -> Result<TokenSet, Error> {
        let status = resp.status();
        let body = resp.text().await.map_err(Error::Transport)?;

        if !status.is_success() {
            return Err(Error::Authentication {
                message: format!("token endpoint returned HTTP {status}: {body}"),
            });
        }

        let parsed: TokenResponse =
            serde_json::from_str(&body).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: String::new(),
            })?;
        Ok(TokenSet::from_response(parsed, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(expires_in: i64, refresh: Option<i64>) -> TokenResponse {
        TokenResponse {
            access_token: "a".into(),
            expires_in,
            refresh_token: refresh.map(|_| "r".into()),
            refresh_expires_in: refresh,
        }
    }

    #[test]
    fn access_token_expires_early() {
        let now = Utc::now();
        let tokens = TokenSet::from_response(response(20, None), now);
        assert!(!tokens.access_valid(now));

        let tokens = TokenSet::from_response(response(300, None), now);
        assert!(tokens.access_valid(now));
        assert!(tokens.usable_refresh(now).is_none());
    }

    #[test]
    fn refresh_token_respects_its_own_expiry() {
        let now = Utc::now();
        let tokens = TokenSet::from_response(response(300, Some(1800)), now);
        assert!(tokens.usable_refresh(now).is_some());
        assert!(
            tokens
                .usable_refresh(now + ChronoDuration::seconds(1790))
                .is_none()
        );
    }
}
