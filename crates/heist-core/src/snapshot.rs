// Game snapshot: the full, server-authoritative state of one game as pushed
// over the WebSocket and returned by the command endpoints.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Opaque player identifier assigned by the server.
pub type PlayerId = String;

/// Opaque game identifier (the join code).
pub type GameId = String;

/// Coarse lifecycle of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameStatus {
    Lobby,
    InProgress,
    Finished,
}

/// Sub-state of an in-progress game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    AgentReveal,
    TeamSelection,
    TeamVote,
    VoteReveal,
    Mission,
    /// The server spells this `REVEAL`.
    #[serde(alias = "REVEAL")]
    MissionReveal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Thief,
    Agent,
}

impl Role {
    /// The side this role plays for.
    pub fn side(self) -> Winner {
        match self {
            Role::Thief => Winner::Thieves,
            Role::Agent => Winner::Agents,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Winner {
    Thieves,
    Agents,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Vote {
    Approve,
    Reject,
}

impl From<bool> for Vote {
    fn from(approve: bool) -> Self {
        if approve {
            Vote::Approve
        } else {
            Vote::Reject
        }
    }
}

/// A card played by a mission team member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissionChoice {
    Success,
    Fail,
}

/// Outcome of a completed mission. The server reuses its card enum here and
/// sends `FAIL`; `FAILURE` is accepted as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissionResult {
    Success,
    #[serde(alias = "FAIL")]
    Failure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub uid: PlayerId,
    pub display_name: String,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub character: Option<String>,
    #[serde(default = "default_true")]
    pub is_online: bool,
    #[serde(default)]
    pub is_ready: bool,
    #[serde(default)]
    pub mission_choice: Option<MissionChoice>,
    #[serde(default)]
    pub chat_color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissionRecord {
    pub mission_number: u32,
    #[serde(default)]
    pub team: Vec<PlayerId>,
    #[serde(default)]
    pub result: Option<MissionResult>,
    #[serde(default)]
    pub fail_votes: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
    pub sender_id: PlayerId,
    pub sender_name: String,
    pub message: String,
    #[serde(default)]
    pub sender_color: Option<String>,
}

/// Full state of one game. Received whole and replaced whole; nothing on
/// the client patches individual fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub game_id: GameId,
    pub status: GameStatus,
    #[serde(default = "default_phase")]
    pub phase: Phase,
    pub host_id: PlayerId,
    #[serde(default)]
    pub mastermind_id: Option<PlayerId>,
    pub players: HashMap<PlayerId, Player>,
    #[serde(default)]
    pub player_order: Vec<PlayerId>,
    #[serde(default = "default_counter")]
    pub mission_number: u32,
    #[serde(default = "default_counter")]
    pub round_number: u32,
    #[serde(default)]
    pub proposed_team: Option<Vec<PlayerId>>,
    #[serde(default)]
    pub votes: HashMap<PlayerId, Vote>,
    #[serde(default)]
    pub mission_history: Vec<MissionRecord>,
    #[serde(default)]
    pub winner: Option<Winner>,
    #[serde(default)]
    pub game_log: Vec<LogEntry>,
    #[serde(default)]
    pub chat_history: Vec<ChatMessage>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

fn default_phase() -> Phase {
    Phase::TeamSelection
}

fn default_counter() -> u32 {
    1
}

/// Accept RFC 3339 timestamps as well as the naive UTC form the server
/// emits (`2025-03-01T12:00:00.123456`).
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Some(naive.and_utc()))
        .map_err(serde::de::Error::custom)
}

impl GameSnapshot {
    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.get(id)
    }

    pub fn contains_player(&self, id: &str) -> bool {
        self.players.contains_key(id)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn online_count(&self) -> usize {
        self.players.values().filter(|p| p.is_online).count()
    }

    pub fn is_mastermind(&self, id: &str) -> bool {
        self.mastermind_id.as_deref() == Some(id)
    }

    pub fn is_on_proposed_team(&self, id: &str) -> bool {
        self.proposed_team
            .as_ref()
            .is_some_and(|team| team.iter().any(|p| p == id))
    }

    /// Tally of the current `votes` against the whole table. Players who
    /// did not vote count as rejections, matching the server's own tally.
    pub fn vote_tally(&self) -> VoteTally {
        let approvals = self
            .votes
            .values()
            .filter(|v| **v == Vote::Approve)
            .count();
        VoteTally {
            approvals,
            rejections: self.player_count().saturating_sub(approvals),
        }
    }

    /// Players in display order. Ids in `playerOrder` that are not in
    /// `players` are skipped; players missing from `playerOrder` follow in
    /// id order.
    pub fn ordered_players(&self) -> Vec<&Player> {
        let mut ordered: Vec<&Player> = self
            .player_order
            .iter()
            .filter_map(|id| self.players.get(id))
            .collect();
        let mut rest: Vec<&Player> = self
            .players
            .values()
            .filter(|p| !self.player_order.contains(&p.uid))
            .collect();
        rest.sort_by(|a, b| a.uid.cmp(&b.uid));
        ordered.extend(rest);
        ordered
    }

    /// Check this snapshot against the invariants the server is expected to
    /// keep, comparing with the previous snapshot of the same game when
    /// there is one.
    pub fn anomalies(&self, previous: Option<&GameSnapshot>) -> Vec<SnapshotAnomaly> {
        let mut found = Vec::new();

        if self.status == GameStatus::Lobby {
            if self.winner.is_some() {
                found.push(SnapshotAnomaly::LobbyWithWinner);
            }
            if !self.mission_history.is_empty() {
                found.push(SnapshotAnomaly::LobbyWithHistory);
            }
        }

        let Some(prev) = previous.filter(|p| p.game_id == self.game_id) else {
            return found;
        };
        // A reset sends the game back to the lobby with fresh counters.
        if self.status == GameStatus::Lobby {
            return found;
        }
        if self.mission_history.len() < prev.mission_history.len() {
            found.push(SnapshotAnomaly::HistoryShrank {
                previous: prev.mission_history.len(),
                current: self.mission_history.len(),
            });
        }
        if self.mission_number < prev.mission_number {
            found.push(SnapshotAnomaly::MissionNumberDecreased {
                previous: prev.mission_number,
                current: self.mission_number,
            });
        }
        if self.round_number < prev.round_number && self.mission_number == prev.mission_number {
            found.push(SnapshotAnomaly::RoundNumberDecreased {
                previous: prev.round_number,
                current: self.round_number,
            });
        }
        found
    }
}

/// Approve/reject counts for a voting round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteTally {
    pub approvals: usize,
    pub rejections: usize,
}

impl VoteTally {
    /// Strict majority of approvals.
    pub fn passed(&self) -> bool {
        self.approvals > self.rejections
    }
}

/// An invariant the server should keep but a snapshot breaks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotAnomaly {
    LobbyWithWinner,
    LobbyWithHistory,
    HistoryShrank { previous: usize, current: usize },
    MissionNumberDecreased { previous: u32, current: u32 },
    RoundNumberDecreased { previous: u32, current: u32 },
}

impl std::fmt::Display for SnapshotAnomaly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotAnomaly::LobbyWithWinner => write!(f, "lobby snapshot carries a winner"),
            SnapshotAnomaly::LobbyWithHistory => {
                write!(f, "lobby snapshot carries mission history")
            }
            SnapshotAnomaly::HistoryShrank { previous, current } => {
                write!(f, "mission history shrank from {previous} to {current}")
            }
            SnapshotAnomaly::MissionNumberDecreased { previous, current } => {
                write!(f, "mission number went from {previous} to {current}")
            }
            SnapshotAnomaly::RoundNumberDecreased { previous, current } => {
                write!(f, "round number went from {previous} to {current}")
            }
        }
    }
}

/// One entry of the public lobby browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicGameSummary {
    pub game_id: GameId,
    pub host_name: String,
    pub player_count: usize,
}
