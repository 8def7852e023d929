// Integration tests for the heist client.
//
// These drive the public API end to end with an in-memory command API and
// a channel-backed push connection: session creation and resumption,
// snapshot ingestion, transition cues, the vote race guard, and teardown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use heist_client::api::{Command, CommandApi, JoinResponse};
use heist_client::connection::{
    ConnectionEvent, ConnectionManager, ConnectionState, Connector, FrameStream,
};
use heist_client::engine::{Action, EngineEvents, ResumeOutcome, SyncEngine};
use heist_client::store::SessionStore;
use heist_client::ClientError;
use heist_core::snapshot::{GameStatus, Phase, PublicGameSummary, Vote, Winner};
use heist_core::{resolve_page, Cue, GameSnapshot, Page};

// ===========================================================================
// Test doubles
// ===========================================================================

/// Command API over a shared map of games.
#[derive(Default)]
struct FakeServer {
    games: Mutex<HashMap<String, GameSnapshot>>,
    sent: Mutex<Vec<Command>>,
    unreachable: Mutex<bool>,
}

impl FakeServer {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn put(&self, snapshot: GameSnapshot) {
        self.games
            .lock()
            .unwrap()
            .insert(snapshot.game_id.clone(), snapshot);
    }

    fn go_offline(&self) {
        *self.unreachable.lock().unwrap() = true;
    }

    fn reachable(&self) -> Result<(), ClientError> {
        if *self.unreachable.lock().unwrap() {
            return Err(ClientError::Network("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl CommandApi for FakeServer {
    async fn list_public_games(&self) -> Result<Vec<PublicGameSummary>, ClientError> {
        self.reachable()?;
        Ok(Vec::new())
    }

    async fn get_game(&self, game_id: &str) -> Result<GameSnapshot, ClientError> {
        self.reachable()?;
        self.games
            .lock()
            .unwrap()
            .get(game_id)
            .cloned()
            .ok_or(ClientError::ServerRejected {
                status: 404,
                message: "Game not found".into(),
            })
    }

    async fn create_game(
        &self,
        host_display_name: &str,
        is_public: bool,
    ) -> Result<GameSnapshot, ClientError> {
        self.reachable()?;
        let snapshot = snapshot_from(json!({
            "gameId": "HEIST",
            "status": "LOBBY",
            "hostId": "h1",
            "isPublic": is_public,
            "players": {"h1": {"uid": "h1", "displayName": host_display_name}},
            "playerOrder": ["h1"],
        }));
        self.put(snapshot.clone());
        Ok(snapshot)
    }

    async fn join_game(
        &self,
        game_id: &str,
        display_name: &str,
    ) -> Result<JoinResponse, ClientError> {
        self.reachable()?;
        let mut snapshot = self.get_game(game_id).await?;
        let new_player_id = format!("j{}", snapshot.player_count() + 1);
        let player = serde_json::from_value(json!({"uid": new_player_id, "displayName": display_name}))
            .unwrap();
        snapshot.players.insert(new_player_id.clone(), player);
        snapshot.player_order.push(new_player_id.clone());
        self.put(snapshot.clone());
        Ok(JoinResponse {
            new_player_id,
            game_state: snapshot,
        })
    }

    async fn send(&self, _game_id: &str, command: &Command) -> Result<(), ClientError> {
        self.reachable()?;
        self.sent.lock().unwrap().push(command.clone());
        Ok(())
    }
}

type FrameSender = mpsc::UnboundedSender<Result<Message, WsError>>;

/// Each connect takes the next queued socket; the test keeps the sending
/// half and plays the server.
#[derive(Default)]
struct ChannelConnector {
    sockets: Mutex<Vec<mpsc::UnboundedReceiver<Result<Message, WsError>>>>,
    connects: AtomicUsize,
}

impl ChannelConnector {
    fn socket(&self) -> FrameSender {
        let (tx, rx) = mpsc::unbounded_channel();
        self.sockets.lock().unwrap().push(rx);
        tx
    }
}

#[async_trait]
impl Connector for ChannelConnector {
    async fn connect(&self, _url: &str) -> Result<FrameStream, WsError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let next = {
            let mut sockets = self.sockets.lock().unwrap();
            (!sockets.is_empty()).then(|| sockets.remove(0))
        };
        match next {
            Some(rx) => Ok(Box::pin(stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|frame| (frame, rx))
            }))),
            None => Err(WsError::ConnectionClosed),
        }
    }
}

// ===========================================================================
// Helpers
// ===========================================================================

fn snapshot_from(value: serde_json::Value) -> GameSnapshot {
    serde_json::from_value(value).expect("fixture snapshot should decode")
}

/// Five players in TEAM_SELECTION; `h1` hosts and leads. `h1` and `j2` are
/// agents.
fn five_player_game() -> GameSnapshot {
    let roles = [("h1", "AGENT"), ("j2", "AGENT"), ("j3", "THIEF"), ("j4", "THIEF"), ("j5", "THIEF")];
    let players: serde_json::Map<String, serde_json::Value> = roles
        .iter()
        .map(|(id, role)| {
            (
                id.to_string(),
                json!({"uid": id, "displayName": id.to_uppercase(), "role": role, "isOnline": true}),
            )
        })
        .collect();
    snapshot_from(json!({
        "gameId": "HEIST",
        "status": "IN_PROGRESS",
        "phase": "TEAM_SELECTION",
        "hostId": "h1",
        "mastermindId": "h1",
        "players": players,
        "playerOrder": ["h1", "j2", "j3", "j4", "j5"],
        "missionNumber": 1,
        "roundNumber": 1,
    }))
}

fn frame(snapshot: &GameSnapshot) -> Result<Message, WsError> {
    Ok(Message::Text(serde_json::to_string(snapshot).unwrap().into()))
}

fn engine_with(
    server: Arc<FakeServer>,
    connector: Arc<ChannelConnector>,
    store: SessionStore,
) -> (SyncEngine, EngineEvents) {
    let connection = ConnectionManager::new(connector, "ws://localhost:8000");
    SyncEngine::new(server, store, connection, Duration::from_secs(4))
}

fn memory_store() -> SessionStore {
    SessionStore::open(":memory:", "it").unwrap()
}

/// Wait for the next connection event and feed it to the engine.
async fn pump(engine: &mut SyncEngine, events: &mut EngineEvents) -> Vec<Cue> {
    let event = tokio::time::timeout(Duration::from_secs(2), events.connection.recv())
        .await
        .expect("timed out waiting for a push event")
        .expect("connection channel closed");
    engine.apply_connection_event(event)
}

// ===========================================================================
// Snapshot ingestion
// ===========================================================================

#[tokio::test]
async fn stored_snapshot_is_the_last_one_pushed() {
    let server = FakeServer::new();
    let connector = Arc::new(ChannelConnector::default());
    let socket = connector.socket();
    let (mut engine, mut events) = engine_with(server, connector, memory_store());
    engine.create_session("Hana", false).await.unwrap();

    let mut last = five_player_game();
    for round in 1..=4 {
        last.round_number = round;
        socket.send(frame(&last)).unwrap();
    }
    // An undecodable frame in between is skipped.
    socket.send(Ok(Message::Text("{broken".into()))).unwrap();
    last.round_number = 5;
    socket.send(frame(&last)).unwrap();

    for _ in 0..5 {
        pump(&mut engine, &mut events).await;
    }
    assert_eq!(engine.snapshot(), Some(&last));
    assert_eq!(engine.page(), Page::Game);
}

#[tokio::test]
async fn vote_reveal_with_majority_emits_vote_passed_only() {
    let server = FakeServer::new();
    let connector = Arc::new(ChannelConnector::default());
    let socket = connector.socket();
    let (mut engine, mut events) = engine_with(server, connector, memory_store());
    engine.create_session("Hana", false).await.unwrap();

    let mut voting = five_player_game();
    voting.phase = Phase::TeamVote;
    voting.proposed_team = Some(vec!["h1".into(), "j3".into()]);
    socket.send(frame(&voting)).unwrap();

    let mut revealed = voting.clone();
    revealed.phase = Phase::VoteReveal;
    revealed.votes = [
        ("h1", Vote::Approve),
        ("j2", Vote::Approve),
        ("j3", Vote::Approve),
        ("j4", Vote::Reject),
        ("j5", Vote::Reject),
    ]
    .into_iter()
    .map(|(id, vote)| (id.to_string(), vote))
    .collect();
    socket.send(frame(&revealed)).unwrap();

    // LOBBY -> IN_PROGRESS also fires for the first push after create.
    let first = pump(&mut engine, &mut events).await;
    assert!(first.contains(&Cue::GameStarted));
    assert_eq!(pump(&mut engine, &mut events).await, vec![Cue::VotePassed]);
}

#[tokio::test]
async fn game_over_emits_exactly_one_of_win_or_lose() {
    let server = FakeServer::new();
    let connector = Arc::new(ChannelConnector::default());
    let socket = connector.socket();
    let (mut engine, mut events) = engine_with(server, connector, memory_store());
    engine.create_session("Hana", false).await.unwrap();

    let mut before = five_player_game();
    before.mission_number = 2;
    before.mission_history = vec![serde_json::from_value(
        json!({"missionNumber": 1, "team": ["h1", "j2"], "result": "FAIL", "failVotes": 1}),
    )
    .unwrap()];
    socket.send(frame(&before)).unwrap();

    let mut after = before.clone();
    after.status = GameStatus::Finished;
    after.winner = Some(Winner::Agents);
    after.mission_history.push(
        serde_json::from_value(
            json!({"missionNumber": 2, "team": ["h1", "j3"], "result": "FAIL", "failVotes": 1}),
        )
        .unwrap(),
    );
    socket.send(frame(&after)).unwrap();

    pump(&mut engine, &mut events).await;
    let cues = pump(&mut engine, &mut events).await;

    // h1 is an agent.
    assert_eq!(cues, vec![Cue::Win]);
    assert_eq!(engine.page(), Page::GameOver);
}

// ===========================================================================
// Vote race guard
// ===========================================================================

#[tokio::test]
async fn any_snapshot_clears_the_pending_vote() {
    let server = FakeServer::new();
    let connector = Arc::new(ChannelConnector::default());
    let socket = connector.socket();
    let (mut engine, mut events) = engine_with(server.clone(), connector, memory_store());
    engine.create_session("Hana", false).await.unwrap();

    let mut voting = five_player_game();
    voting.phase = Phase::TeamVote;
    voting.proposed_team = Some(vec!["h1".into(), "j3".into()]);
    socket.send(frame(&voting)).unwrap();
    pump(&mut engine, &mut events).await;

    let handle = engine.submit_vote(Vote::Approve).expect("vote should dispatch");
    assert!(engine.vote_pending());
    assert!(!matches!(
        engine.action_view(),
        Some(heist_core::ActionView::VotePrompt { .. })
    ));
    handle.await.unwrap().unwrap();

    // An unrelated snapshot (someone else's vote) still clears the flag.
    let mut other_vote = voting.clone();
    other_vote.votes.insert("j4".into(), Vote::Reject);
    socket.send(frame(&other_vote)).unwrap();
    pump(&mut engine, &mut events).await;

    assert!(!engine.vote_pending());
    assert!(matches!(
        server.sent.lock().unwrap().last(),
        Some(Command::SubmitVote { vote: Vote::Approve, .. })
    ));
}

// ===========================================================================
// Connection slot
// ===========================================================================

#[tokio::test]
async fn two_connects_before_close_yield_one_connection() {
    let connector = Arc::new(ChannelConnector::default());
    let _socket = connector.socket();
    let mut manager = ConnectionManager::new(connector.clone(), "ws://localhost:8000");
    let (tx, _rx) = mpsc::channel(8);

    assert!(manager.connect("HEIST", "h1", tx.clone()));
    assert!(!manager.connect("HEIST", "h1", tx));
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    assert_eq!(manager.state(), ConnectionState::Open);
}

#[tokio::test]
async fn server_close_returns_home_and_forgets_session() {
    let server = FakeServer::new();
    let connector = Arc::new(ChannelConnector::default());
    let socket = connector.socket();
    let (mut engine, mut events) = engine_with(server, connector, memory_store());
    engine.create_session("Hana", false).await.unwrap();

    // Kicked: the server closes the socket.
    socket.send(Ok(Message::Close(None))).unwrap();
    let event = events.connection.recv().await.unwrap();
    assert!(matches!(event, ConnectionEvent::Closed { .. }));
    engine.apply_connection_event(event);

    assert_eq!(engine.page(), Page::Home);
    assert!(engine.identity().is_none());
    assert!(engine.error_message().is_none());
    assert_eq!(engine.resume_session().await, ResumeOutcome::NothingStored);
}

#[tokio::test]
async fn final_snapshot_before_server_close_is_applied() {
    let server = FakeServer::new();
    let connector = Arc::new(ChannelConnector::default());
    let socket = connector.socket();
    let (mut engine, mut events) = engine_with(server, connector, memory_store());
    engine.create_session("Hana", false).await.unwrap();

    let running = five_player_game();
    socket.send(frame(&running)).unwrap();
    pump(&mut engine, &mut events).await;

    // A player drops: the server ends the game, broadcasts it, then closes.
    let mut aborted = running.clone();
    aborted.status = GameStatus::Finished;
    if let Some(p) = aborted.players.get_mut("j3") {
        p.is_online = false;
    }
    socket.send(frame(&aborted)).unwrap();
    socket.send(Ok(Message::Close(None))).unwrap();
    // Let the connection task see the close before the engine catches up.
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(pump(&mut engine, &mut events).await, vec![Cue::PlayerLeft]);
    assert_eq!(engine.snapshot().map(|s| s.status), Some(GameStatus::Finished));
    assert_eq!(engine.page(), Page::GameOver);

    pump(&mut engine, &mut events).await;
    assert_eq!(engine.page(), Page::Home);
}

#[tokio::test]
async fn snapshot_queued_before_leave_is_dropped() {
    let server = FakeServer::new();
    let connector = Arc::new(ChannelConnector::default());
    let socket = connector.socket();
    let (mut engine, mut events) = engine_with(server, connector, memory_store());
    engine.create_session("Hana", false).await.unwrap();

    socket.send(frame(&five_player_game())).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(engine.submit(Action::Leave));
    let outcome = events.outcomes.recv().await.unwrap();
    engine.apply_command_outcome(outcome);
    assert_eq!(engine.page(), Page::Home);

    // The snapshot pushed before the leave arrives afterwards.
    pump(&mut engine, &mut events).await;
    assert_eq!(engine.page(), Page::Home);
    assert!(engine.snapshot().is_none());
}

#[tokio::test]
async fn leave_then_create_ignores_the_old_close() {
    let server = FakeServer::new();
    let connector = Arc::new(ChannelConnector::default());
    let _first = connector.socket();
    let _second = connector.socket();
    let (mut engine, mut events) = engine_with(server, connector, memory_store());
    engine.create_session("Hana", false).await.unwrap();

    assert!(engine.submit(Action::Leave));
    let outcome = events.outcomes.recv().await.unwrap();
    engine.apply_command_outcome(outcome);
    assert_eq!(engine.page(), Page::Home);

    engine.create_session("Hana", true).await.unwrap();
    // The first connection's close arrives after the new session started.
    loop {
        let event = events.connection.recv().await.unwrap();
        if let ConnectionEvent::Closed { connection_id: 1 } = event {
            engine.apply_connection_event(event);
            break;
        }
    }
    assert_eq!(engine.page(), Page::Lobby);
    assert!(engine.identity().is_some());
}

// ===========================================================================
// Resume
// ===========================================================================

#[tokio::test]
async fn resume_with_foreign_identity_clears_storage_silently() {
    let server = FakeServer::new();
    server.put(five_player_game());
    let store = memory_store();
    store.save_identity("HEIST", "ghost").unwrap();

    let (mut engine, _events) =
        engine_with(server, Arc::new(ChannelConnector::default()), store);
    let outcome = engine.resume_session().await;

    assert_eq!(
        outcome,
        ResumeOutcome::Discarded(ClientError::StaleIdentity {
            game_id: "HEIST".into()
        })
    );
    assert_eq!(engine.page(), Page::Home);
    assert!(engine.error_message().is_none());
    assert_eq!(engine.resume_session().await, ResumeOutcome::NothingStored);
}

#[tokio::test]
async fn resume_with_unreachable_server_is_not_resumable() {
    let server = FakeServer::new();
    server.go_offline();
    let store = memory_store();
    store.save_identity("HEIST", "h1").unwrap();

    let (mut engine, _events) =
        engine_with(server, Arc::new(ChannelConnector::default()), store);

    assert!(matches!(
        engine.resume_session().await,
        ResumeOutcome::Discarded(ClientError::Network(_))
    ));
    assert!(engine.error_message().is_none());
    assert_eq!(engine.page(), Page::Home);
}

#[tokio::test]
async fn create_then_resume_on_fresh_engine_rebuilds_the_page() {
    let path = std::env::temp_dir().join("heist_it_create_resume.db");
    let _ = std::fs::remove_file(&path);
    let server = FakeServer::new();
    let connector = Arc::new(ChannelConnector::default());
    let _first = connector.socket();
    let _second = connector.socket();

    {
        let store = SessionStore::open_file(&path, "shell").unwrap();
        let (mut engine, _events) = engine_with(server.clone(), connector.clone(), store);
        engine.join_session("NOPE", "Hana").await.unwrap_err();
        engine.create_session("Hana", false).await.unwrap();
    }

    let store = SessionStore::open_file(&path, "shell").unwrap();
    let (mut engine, _events) = engine_with(server.clone(), connector, store);
    assert_eq!(engine.resume_session().await, ResumeOutcome::Resumed);

    let fetched = server.get_game("HEIST").await.unwrap();
    assert_eq!(engine.page(), resolve_page(Some(&fetched)));
    assert_eq!(engine.player_id(), Some("h1"));
    assert_eq!(engine.player_name(), "Hana");
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn join_binds_the_server_assigned_id() {
    let server = FakeServer::new();
    server.put(snapshot_from(json!({
        "gameId": "HEIST",
        "status": "LOBBY",
        "hostId": "h1",
        "players": {"h1": {"uid": "h1", "displayName": "Hana"}},
        "playerOrder": ["h1"],
    })));
    let (mut engine, _events) =
        engine_with(server.clone(), Arc::new(ChannelConnector::default()), memory_store());

    engine.join_session(" HEIST ", "Ivo").await.unwrap();

    assert_eq!(engine.player_id(), Some("j2"));
    assert_eq!(engine.page(), Page::Lobby);
    assert!(engine.submit(Action::SetReady));
}
