// Synchronization engine: the single owner of "which game, if any, this
// client is part of". Holds the current snapshot and identity, reconciles
// them against push events and command outcomes, and exposes the action
// submission contract.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use heist_core::snapshot::{MissionChoice, PublicGameSummary, Vote};
use heist_core::{
    resolve_action, resolve_page, ActionView, Cue, CueTracker, GameId, GameSnapshot, Page,
    PlayerId,
};

use crate::api::{Command, CommandApi};
use crate::connection::{ConnectionEvent, ConnectionManager, ConnectionState};
use crate::error::ClientError;
use crate::store::SessionStore;

/// Longest chat message the server accepts.
pub const MAX_CHAT_LEN: usize = 200;

const EVENT_CHANNEL_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The `(game, player)` pair a command was issued under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub game_id: GameId,
    pub player_id: PlayerId,
}

/// A player action, before identity is attached.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    StartGame,
    ProposeTeam(Vec<PlayerId>),
    SubmitVote(Vote),
    PlayMissionCard(MissionChoice),
    ResetGame,
    Leave,
    Kick(PlayerId),
    SetReady,
    SendChat(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    StartGame,
    ProposeTeam,
    SubmitVote,
    PlayMissionCard,
    ResetGame,
    Leave,
    Kick,
    SetReady,
    SendChat,
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::StartGame => ActionKind::StartGame,
            Action::ProposeTeam(_) => ActionKind::ProposeTeam,
            Action::SubmitVote(_) => ActionKind::SubmitVote,
            Action::PlayMissionCard(_) => ActionKind::PlayMissionCard,
            Action::ResetGame => ActionKind::ResetGame,
            Action::Leave => ActionKind::Leave,
            Action::Kick(_) => ActionKind::Kick,
            Action::SetReady => ActionKind::SetReady,
            Action::SendChat(_) => ActionKind::SendChat,
        }
    }

    fn into_command(self, player_id: PlayerId) -> Command {
        match self {
            Action::StartGame => Command::Start { player_id },
            Action::ProposeTeam(team) => Command::ProposeTeam { player_id, team },
            Action::SubmitVote(vote) => Command::SubmitVote { player_id, vote },
            Action::PlayMissionCard(choice) => Command::PlayMissionCard { player_id, choice },
            Action::ResetGame => Command::Reset { player_id },
            Action::Leave => Command::Leave { player_id },
            Action::Kick(target) => Command::Kick {
                host_id: player_id,
                target,
            },
            Action::SetReady => Command::Ready { player_id },
            Action::SendChat(message) => Command::Chat { player_id, message },
        }
    }
}

/// Result of a spawned command, returned to the event loop.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub identity: Identity,
    pub kind: ActionKind,
    pub result: Result<(), ClientError>,
}

/// How startup resumption went. Never shown to the player.
#[derive(Debug, Clone, PartialEq)]
pub enum ResumeOutcome {
    Resumed,
    NothingStored,
    Discarded(ClientError),
}

/// Awaitable result of a vote submission.
pub type VoteHandle = oneshot::Receiver<Result<(), ClientError>>;

/// Error text on display, with the moment it was raised.
#[derive(Debug, Clone)]
struct TransientError {
    message: String,
    raised_at: Instant,
}

/// Receivers the event loop drains into the engine.
pub struct EngineEvents {
    pub connection: mpsc::Receiver<ConnectionEvent>,
    pub outcomes: mpsc::Receiver<CommandOutcome>,
}

// ---------------------------------------------------------------------------
// SyncEngine
// ---------------------------------------------------------------------------

pub struct SyncEngine {
    api: Arc<dyn CommandApi>,
    store: SessionStore,
    connection: ConnectionManager,
    connection_tx: mpsc::Sender<ConnectionEvent>,
    outcome_tx: mpsc::Sender<CommandOutcome>,

    snapshot: Option<GameSnapshot>,
    player_id: Option<PlayerId>,
    player_name: String,
    vote_pending: bool,
    error: Option<TransientError>,
    error_display: Duration,
    cues: CueTracker,
}

impl SyncEngine {
    pub fn new(
        api: Arc<dyn CommandApi>,
        store: SessionStore,
        connection: ConnectionManager,
        error_display: Duration,
    ) -> (Self, EngineEvents) {
        let (connection_tx, connection_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (outcome_tx, outcome_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let player_name = store.player_name().unwrap_or_else(|e| {
            warn!("could not read stored display name: {e:#}");
            None
        });

        let engine = Self {
            api,
            store,
            connection,
            connection_tx,
            outcome_tx,
            snapshot: None,
            player_id: None,
            player_name: player_name.unwrap_or_default(),
            vote_pending: false,
            error: None,
            error_display,
            cues: CueTracker::new(),
        };
        let events = EngineEvents {
            connection: connection_rx,
            outcomes: outcome_rx,
        };
        (engine, events)
    }

    // ------------------------------------------------------------------
    // Read side
    // ------------------------------------------------------------------

    pub fn snapshot(&self) -> Option<&GameSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn player_id(&self) -> Option<&str> {
        self.player_id.as_deref()
    }

    pub fn player_name(&self) -> &str {
        &self.player_name
    }

    /// Identity of the active session: a snapshot and a bound player id.
    pub fn identity(&self) -> Option<Identity> {
        match (&self.snapshot, &self.player_id) {
            (Some(snapshot), Some(player_id)) => Some(Identity {
                game_id: snapshot.game_id.clone(),
                player_id: player_id.clone(),
            }),
            _ => None,
        }
    }

    pub fn vote_pending(&self) -> bool {
        self.vote_pending
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn page(&self) -> Page {
        resolve_page(self.snapshot.as_ref())
    }

    /// What the game page should show for the local player. `None` outside
    /// the game page.
    pub fn action_view(&self) -> Option<ActionView> {
        if self.page() != Page::Game {
            return None;
        }
        let snapshot = self.snapshot.as_ref()?;
        let player_id = self.player_id.as_deref().unwrap_or_default();
        Some(resolve_action(snapshot, player_id, self.vote_pending))
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }

    pub fn volume(&self) -> f64 {
        self.store.volume().unwrap_or_else(|e| {
            warn!("could not read volume preference: {e:#}");
            crate::store::DEFAULT_VOLUME
        })
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    /// Create a game hosted by `display_name` and join it.
    pub async fn create_session(
        &mut self,
        display_name: &str,
        is_public: bool,
    ) -> Result<(), ClientError> {
        let result = self.try_create(display_name, is_public).await;
        if let Err(err) = &result {
            self.raise(err.clone());
        }
        result
    }

    async fn try_create(
        &mut self,
        display_name: &str,
        is_public: bool,
    ) -> Result<(), ClientError> {
        let name = validate_display_name(display_name)?;
        let snapshot = self.api.create_game(&name, is_public).await?;
        let player_id = snapshot.host_id.clone();
        info!(game_id = %snapshot.game_id, %player_id, "created game");
        self.remember_name(&name);
        self.adopt(snapshot, player_id);
        Ok(())
    }

    /// Join the game with code `game_id` as `display_name`.
    pub async fn join_session(
        &mut self,
        game_id: &str,
        display_name: &str,
    ) -> Result<(), ClientError> {
        let result = self.try_join(game_id, display_name).await;
        if let Err(err) = &result {
            self.raise(err.clone());
        }
        result
    }

    async fn try_join(
        &mut self,
        game_id: &str,
        display_name: &str,
    ) -> Result<(), ClientError> {
        let name = validate_display_name(display_name)?;
        let game_id = game_id.trim();
        if game_id.is_empty() {
            return Err(ClientError::validation("Please enter a game code."));
        }
        let joined = self.api.join_game(game_id, &name).await?;
        info!(game_id = %joined.game_state.game_id, player_id = %joined.new_player_id, "joined game");
        self.remember_name(&name);
        self.adopt(joined.game_state, joined.new_player_id);
        Ok(())
    }

    /// Pick up the session stored by a previous run, if it is still valid.
    /// Failures only clear the stored identity; nothing is shown.
    pub async fn resume_session(&mut self) -> ResumeOutcome {
        let (game_id, player_id) = match self.store.load_identity() {
            Ok(Some(pair)) => pair,
            Ok(None) => return ResumeOutcome::NothingStored,
            Err(e) => {
                warn!("could not read stored session: {e:#}");
                self.forget_session();
                return ResumeOutcome::Discarded(e.into());
            }
        };

        let outcome = match self.api.get_game(&game_id).await {
            Ok(snapshot) if snapshot.contains_player(&player_id) => {
                info!(%game_id, %player_id, "resuming stored session");
                self.adopt(snapshot, player_id);
                return ResumeOutcome::Resumed;
            }
            Ok(_) => ClientError::StaleIdentity { game_id },
            Err(err) => err,
        };

        info!("stored session not resumable: {outcome}");
        self.forget_session();
        ResumeOutcome::Discarded(outcome)
    }

    /// Bind to `snapshot` as `player_id` and open the push connection.
    fn adopt(&mut self, snapshot: GameSnapshot, player_id: PlayerId) {
        // A previous connection, if any, belongs to another session.
        self.connection.disconnect();

        if let Err(e) = self.store.save_identity(&snapshot.game_id, &player_id) {
            warn!("could not persist session identity: {e:#}");
        }

        self.cues.reset();
        self.cues.observe(Some(&snapshot), &player_id);
        self.vote_pending = false;
        self.error = None;

        self.connection
            .connect(&snapshot.game_id, &player_id, self.connection_tx.clone());
        self.player_id = Some(player_id);
        self.snapshot = Some(snapshot);
    }

    // ------------------------------------------------------------------
    // Inbound events
    // ------------------------------------------------------------------

    /// Route a connection event. Events from a replaced or released
    /// connection are dropped.
    pub fn apply_connection_event(&mut self, event: ConnectionEvent) -> Vec<Cue> {
        match event {
            ConnectionEvent::Snapshot {
                connection_id,
                snapshot,
            } => {
                if !self.connection.accepts(connection_id) {
                    debug!(connection_id, "dropping snapshot from a replaced connection");
                    return Vec::new();
                }
                self.apply_inbound_snapshot(*snapshot)
            }
            ConnectionEvent::Closed { connection_id } => {
                if !self.connection.accepts(connection_id) {
                    debug!(connection_id, "ignoring close of a replaced connection");
                } else {
                    self.apply_disconnect();
                }
                Vec::new()
            }
        }
    }

    /// Replace the stored snapshot with `snapshot` and return the cues the
    /// change produces. The last snapshot received always wins.
    pub fn apply_inbound_snapshot(&mut self, snapshot: GameSnapshot) -> Vec<Cue> {
        for anomaly in snapshot.anomalies(self.snapshot.as_ref()) {
            warn!(game_id = %snapshot.game_id, "server snapshot anomaly: {anomaly}");
        }
        if let Err(e) = self.store.save_game_id(&snapshot.game_id) {
            warn!("could not persist game id: {e:#}");
        }
        self.vote_pending = false;

        let local_player = self.player_id.as_deref().unwrap_or_default();
        let cues = self.cues.observe(Some(&snapshot), local_player);
        if !cues.is_empty() {
            debug!(?cues, "snapshot transition cues");
        }
        self.snapshot = Some(snapshot);
        cues
    }

    /// Tear the session down: connection, snapshot, identity and stored
    /// session. Every way out of a game ends here.
    pub fn apply_disconnect(&mut self) {
        if self.snapshot.is_some() || self.player_id.is_some() {
            info!("session ended, returning home");
        }
        self.connection.disconnect();
        self.snapshot = None;
        self.player_id = None;
        self.vote_pending = false;
        self.cues.reset();
        self.forget_session();
    }

    fn forget_session(&mut self) {
        if let Err(e) = self.store.clear_session() {
            warn!("could not clear stored session: {e:#}");
        }
    }

    /// Fold a command outcome back in. Outcomes issued under another
    /// identity are discarded.
    pub fn apply_command_outcome(&mut self, outcome: CommandOutcome) {
        if self.identity().as_ref() != Some(&outcome.identity) {
            debug!(
                kind = ?outcome.kind,
                game_id = %outcome.identity.game_id,
                "discarding outcome from a previous session"
            );
            return;
        }
        match outcome.result {
            Ok(()) => {
                debug!(kind = ?outcome.kind, "command accepted");
                if outcome.kind == ActionKind::Leave {
                    self.apply_disconnect();
                }
            }
            Err(err) => {
                if outcome.kind == ActionKind::SubmitVote {
                    self.vote_pending = false;
                }
                self.raise(err);
            }
        }
    }

    // ------------------------------------------------------------------
    // Action submission
    // ------------------------------------------------------------------

    /// Send `action` to the server in the background. Returns whether a
    /// command was dispatched.
    pub fn submit(&mut self, action: Action) -> bool {
        match action {
            Action::SubmitVote(vote) => self.submit_vote(vote).is_some(),
            other => self.dispatch(other, None),
        }
    }

    /// Send a vote and mark it pending until the next snapshot. The
    /// returned handle resolves with the command's result.
    pub fn submit_vote(&mut self, vote: Vote) -> Option<VoteHandle> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if !self.dispatch(Action::SubmitVote(vote), Some(reply_tx)) {
            return None;
        }
        self.vote_pending = true;
        Some(reply_rx)
    }

    fn dispatch(
        &mut self,
        action: Action,
        reply: Option<oneshot::Sender<Result<(), ClientError>>>,
    ) -> bool {
        let kind = action.kind();
        let Some(identity) = self.identity() else {
            debug!(?kind, "no active session, action ignored");
            return false;
        };
        let action = match validate_action(action) {
            Ok(action) => action,
            Err(err) => {
                self.raise(err);
                return false;
            }
        };

        let command = action.into_command(identity.player_id.clone());
        let api = Arc::clone(&self.api);
        let outcome_tx = self.outcome_tx.clone();
        tokio::spawn(async move {
            let result = api.send(&identity.game_id, &command).await;
            if let Some(reply) = reply {
                let _ = reply.send(result.clone());
            }
            let _ = outcome_tx
                .send(CommandOutcome {
                    identity,
                    kind,
                    result,
                })
                .await;
        });
        true
    }

    // ------------------------------------------------------------------
    // Lobby browser and preferences
    // ------------------------------------------------------------------

    pub async fn fetch_public_games(&mut self) -> Result<Vec<PublicGameSummary>, ClientError> {
        let result = self.api.list_public_games().await;
        if let Err(err) = &result {
            self.raise(err.clone());
        }
        result
    }

    pub fn set_player_name(&mut self, name: &str) {
        self.remember_name(name.trim());
    }

    fn remember_name(&mut self, name: &str) {
        self.player_name = name.to_string();
        if let Err(e) = self.store.set_player_name(name) {
            warn!("could not persist display name: {e:#}");
        }
    }

    /// Store a new volume; returns the clamped value.
    pub fn set_volume(&mut self, volume: f64) -> f64 {
        match self.store.set_volume(volume) {
            Ok(stored) => stored,
            Err(e) => {
                warn!("could not persist volume: {e:#}");
                volume.clamp(0.0, 1.0)
            }
        }
    }

    // ------------------------------------------------------------------
    // Errors
    // ------------------------------------------------------------------

    fn raise(&mut self, err: ClientError) {
        warn!("{err}");
        self.error = Some(TransientError {
            message: err.to_string(),
            raised_at: Instant::now(),
        });
    }

    /// Drop the error once it has been visible long enough. Returns whether
    /// it was cleared.
    pub fn clear_expired_error(&mut self, now: Instant) -> bool {
        match &self.error {
            Some(err) if now.duration_since(err.raised_at) >= self.error_display => {
                self.error = None;
                true
            }
            _ => false,
        }
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }
}

// ---------------------------------------------------------------------------
// Advisory validation
// ---------------------------------------------------------------------------

fn validate_display_name(name: &str) -> Result<String, ClientError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ClientError::validation("Please enter a display name."));
    }
    Ok(name.to_string())
}

/// Catch obviously malformed input before it reaches the server. Game rules
/// stay with the server.
fn validate_action(action: Action) -> Result<Action, ClientError> {
    match action {
        Action::SendChat(message) => {
            let message = message.trim();
            if message.is_empty() {
                return Err(ClientError::validation("Message cannot be empty."));
            }
            if message.chars().count() > MAX_CHAT_LEN {
                return Err(ClientError::validation(format!(
                    "Message is too long (max {MAX_CHAT_LEN} characters)."
                )));
            }
            Ok(Action::SendChat(message.to_string()))
        }
        Action::ProposeTeam(team) => {
            if team.is_empty() {
                return Err(ClientError::validation("Select at least one team member."));
            }
            let mut seen = std::collections::HashSet::new();
            if !team.iter().all(|id| seen.insert(id)) {
                return Err(ClientError::validation("A player can only be picked once."));
            }
            Ok(Action::ProposeTeam(team))
        }
        other => Ok(other),
    }
}
