// REST endpoints for boards and matches.
//
// Implemented as inherent methods on `Session` so the HTTP client and
// bearer token handling stay in one place. Snapshots decode into the
// models in `crate::models`; commands return nothing on success.

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;
use url::Url;

use crate::auth::Session;
use crate::error::Error;
use crate::models::{BoardState, MatchState, Segment};

/// Board lifecycle commands understood by `/bs/v0/boards/{id}/{cmd}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum BoardCommand {
    Start,
    Stop,
    Reset,
}

impl Session {
    // ── URL builders ─────────────────────────────────────────────────

    /// Build a full URL for an API path: `{api_url}/{path}`.
    pub(crate) fn api_url(&self, path: &str) -> Result<Url, Error> {
        let full = format!(
            "{}/{}",
            self.config().api_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Ok(Url::parse(&full)?)
    }

    fn board_url(&self, id: &str, suffix: &str) -> Result<Url, Error> {
        self.api_url(&format!("bs/v0/boards/{id}{suffix}"))
    }

    fn match_url(&self, id: &str, suffix: &str) -> Result<Url, Error> {
        self.api_url(&format!("gs/v0/matches/{id}{suffix}"))
    }

    // ── Snapshots ────────────────────────────────────────────────────

    /// `GET /bs/v0/boards/{id}`
    pub async fn fetch_board(&self, id: &str) -> Result<BoardState, Error> {
        let url = self.board_url(id, "")?;
        self.get_json(url, "board", id).await
    }

    /// `GET /gs/v0/matches/{id}`
    pub async fn fetch_match(&self, id: &str) -> Result<MatchState, Error> {
        let url = self.match_url(id, "")?;
        self.get_json(url, "match", id).await
    }

    // ── Board commands ───────────────────────────────────────────────

    /// `POST /bs/v0/boards/{id}/{start|stop|reset}`
    pub async fn board_command(&self, id: &str, command: BoardCommand) -> Result<(), Error> {
        let url = self.board_url(id, &format!("/{}", command.as_ref()))?;
        self.send(Method::POST, url, None::<&()>).await
    }

    // ── Match commands ───────────────────────────────────────────────

    /// `POST /gs/v0/matches/{id}/players/next`
    pub async fn next_player(&self, id: &str) -> Result<(), Error> {
        let url = self.match_url(id, "/players/next")?;
        self.send(Method::POST, url, None::<&()>).await
    }

    /// `POST /gs/v0/matches/{id}/games/next`
    pub async fn next_leg(&self, id: &str) -> Result<(), Error> {
        let url = self.match_url(id, "/games/next")?;
        self.send(Method::POST, url, None::<&()>).await
    }

    /// `POST /gs/v0/matches/{id}/undo`
    pub async fn undo(&self, id: &str) -> Result<(), Error> {
        let url = self.match_url(id, "/undo")?;
        self.send(Method::POST, url, None::<&()>).await
    }

    /// Submit the next dart (`POST .../throws`) or revise dart `index`
    /// of the current turn (`PATCH .../throws`).
    pub async fn throw(&self, id: &str, segment: &Segment, index: Option<usize>) -> Result<(), Error> {
        let url = self.match_url(id, "/throws")?;
        match index {
            None => {
                let body = json!({ "segment": segment });
                self.send(Method::POST, url, Some(&body)).await
            }
            Some(index) => {
                let body = json!({ "segment": segment, "index": index });
                self.send(Method::PATCH, url, Some(&body)).await
            }
        }
    }

    /// `DELETE /gs/v0/matches/{id}`
    pub async fn abort(&self, id: &str) -> Result<(), Error> {
        let url = self.match_url(id, "")?;
        self.send(Method::DELETE, url, None::<&()>).await
    }

    /// `POST /gs/v0/matches/{id}/finish`
    pub async fn finish(&self, id: &str) -> Result<(), Error> {
        let url = self.match_url(id, "/finish")?;
        self.send(Method::POST, url, None::<&()>).await
    }

    // ── Request helpers ──────────────────────────────────────────────

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        kind: &'static str,
        id: &str,
    ) -> Result<T, Error> {
        debug!("GET {}", url);

        let resp = self.request(Method::GET, url, None::<&()>).await?;
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound {
                kind,
                id: id.to_owned(),
            });
        }

        let body = resp.text().await.map_err(|e| self.map_transport(e))?;
        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<(), Error> {
        debug!("{} {}", method, url);

        let resp = self.request(method, url, body).await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let message = resp.text().await.unwrap_or_default();
        Err(Error::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// Attach the bearer token and send. A 401 drops the cached tokens so
    /// the next call starts from a fresh login.
    async fn request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<reqwest::Response, Error> {
        let token = self.bearer().await?;
        let mut builder = self.http().request(method, url).bearer_auth(token);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let resp = builder.send().await.map_err(|e| self.map_transport(e))?;
        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            self.invalidate().await;
            return Err(Error::SessionExpired);
        }
        Ok(resp)
    }

    fn map_transport(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Timeout {
                timeout_secs: self.config().transport.timeout.as_secs(),
            }
        } else {
            Error::Transport(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn board_commands_render_lowercase() {
        assert_eq!(BoardCommand::Start.as_ref(), "start");
        assert_eq!(BoardCommand::Reset.to_string(), "reset");
    }
}
