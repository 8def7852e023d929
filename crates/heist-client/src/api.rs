// HTTP command channel. Every state change the player asks for goes out
// here; the resulting state comes back over the push channel.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use heist_core::snapshot::{GameSnapshot, MissionChoice, PublicGameSummary, Vote};
use heist_core::PlayerId;

use crate::error::ClientError;

/// Shown when a failed response carries no usable `detail`.
pub const UNKNOWN_ERROR: &str = "An unknown error occurred";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Body of a successful join.
#[derive(Debug, Clone, Deserialize)]
pub struct JoinResponse {
    pub new_player_id: PlayerId,
    pub game_state: GameSnapshot,
}

/// An in-game command, already stamped with the identity it is sent under.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start { player_id: PlayerId },
    Reset { player_id: PlayerId },
    Ready { player_id: PlayerId },
    Leave { player_id: PlayerId },
    ProposeTeam { player_id: PlayerId, team: Vec<PlayerId> },
    SubmitVote { player_id: PlayerId, vote: Vote },
    PlayMissionCard { player_id: PlayerId, choice: MissionChoice },
    Kick { host_id: PlayerId, target: PlayerId },
    Chat { player_id: PlayerId, message: String },
}

impl Command {
    /// Path segment after `/games/{id}/`.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Command::Start { .. } => "start",
            Command::Reset { .. } => "reset",
            Command::Ready { .. } => "ready",
            Command::Leave { .. } => "leave",
            Command::ProposeTeam { .. } => "propose-team",
            Command::SubmitVote { .. } => "submit-vote",
            Command::PlayMissionCard { .. } => "play-mission-card",
            Command::Kick { .. } => "kick",
            Command::Chat { .. } => "chat",
        }
    }

    pub fn body(&self) -> Value {
        match self {
            Command::Start { player_id }
            | Command::Reset { player_id }
            | Command::Ready { player_id }
            | Command::Leave { player_id } => json!({ "player_id": player_id }),
            Command::ProposeTeam { player_id, team } => {
                json!({ "player_id": player_id, "team": team })
            }
            Command::SubmitVote { player_id, vote } => {
                json!({ "player_id": player_id, "vote": vote })
            }
            Command::PlayMissionCard { player_id, choice } => {
                json!({ "player_id": player_id, "choice": choice })
            }
            Command::Kick { host_id, target } => {
                json!({ "host_id": host_id, "player_to_kick_id": target })
            }
            Command::Chat { player_id, message } => {
                json!({ "player_id": player_id, "message": message })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// CommandApi
// ---------------------------------------------------------------------------

/// The server's command endpoints.
#[async_trait]
pub trait CommandApi: Send + Sync {
    async fn list_public_games(&self) -> Result<Vec<PublicGameSummary>, ClientError>;

    async fn get_game(&self, game_id: &str) -> Result<GameSnapshot, ClientError>;

    async fn create_game(
        &self,
        host_display_name: &str,
        is_public: bool,
    ) -> Result<GameSnapshot, ClientError>;

    async fn join_game(
        &self,
        game_id: &str,
        display_name: &str,
    ) -> Result<JoinResponse, ClientError>;

    /// Send an in-game command. The response body is ignored; the new
    /// state arrives as a push.
    async fn send(&self, game_id: &str, command: &Command) -> Result<(), ClientError>;
}

/// [`CommandApi`] over reqwest.
pub struct HttpCommandApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpCommandApi {
    /// `base_url` includes the API prefix, e.g. `http://localhost:8000/api/v1`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl CommandApi for HttpCommandApi {
    async fn list_public_games(&self) -> Result<Vec<PublicGameSummary>, ClientError> {
        let resp = self.http.get(self.url("/games")).send().await?;
        Ok(check(resp).await?.json().await?)
    }

    async fn get_game(&self, game_id: &str) -> Result<GameSnapshot, ClientError> {
        let resp = self
            .http
            .get(self.url(&format!("/games/{game_id}")))
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    async fn create_game(
        &self,
        host_display_name: &str,
        is_public: bool,
    ) -> Result<GameSnapshot, ClientError> {
        let is_public = if is_public { "true" } else { "false" };
        let resp = self
            .http
            .post(self.url("/games/"))
            .query(&[("host_display_name", host_display_name), ("is_public", is_public)])
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    async fn join_game(
        &self,
        game_id: &str,
        display_name: &str,
    ) -> Result<JoinResponse, ClientError> {
        let resp = self
            .http
            .post(self.url(&format!("/games/{game_id}/join")))
            .query(&[("display_name", display_name)])
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    async fn send(&self, game_id: &str, command: &Command) -> Result<(), ClientError> {
        let endpoint = command.endpoint();
        debug!(game_id = %game_id, endpoint, "sending command");
        let resp = self
            .http
            .post(self.url(&format!("/games/{game_id}/{endpoint}")))
            .json(&command.body())
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Pass successful responses through; turn everything else into
/// [`ClientError::ServerRejected`] carrying the server's `detail`.
async fn check(resp: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ClientError::ServerRejected {
        status: status.as_u16(),
        message: detail_message(&body),
    })
}

/// Extract `{"detail": "..."}` from an error body.
pub fn detail_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(Value::as_str).map(str::to_string))
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN_ERROR.to_string())
}
