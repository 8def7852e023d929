// In-memory doubles shared by the unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;
use tokio_tungstenite::tungstenite::Error as WsError;

use heist_core::snapshot::{GameStatus, Phase, Player, PublicGameSummary};
use heist_core::{GameId, GameSnapshot};

use crate::api::{Command, CommandApi, JoinResponse};
use crate::connection::{ConnectionManager, Connector, FrameStream};
use crate::engine::{EngineEvents, SyncEngine};
use crate::error::ClientError;
use crate::store::SessionStore;

pub fn player(uid: &str) -> Player {
    Player {
        uid: uid.to_string(),
        display_name: format!("Player {uid}"),
        role: None,
        character: None,
        is_online: true,
        is_ready: false,
        mission_choice: None,
        chat_color: None,
    }
}

/// A lobby snapshot hosted by the first id in `players`.
pub fn game_snapshot(game_id: &str, players: &[&str]) -> GameSnapshot {
    GameSnapshot {
        game_id: game_id.to_string(),
        status: GameStatus::Lobby,
        phase: Phase::TeamSelection,
        host_id: players.first().copied().unwrap_or("host").to_string(),
        mastermind_id: None,
        players: players
            .iter()
            .map(|id| (id.to_string(), player(id)))
            .collect(),
        player_order: players.iter().map(|id| id.to_string()).collect(),
        mission_number: 1,
        round_number: 1,
        proposed_team: None,
        votes: HashMap::new(),
        mission_history: Vec::new(),
        winner: None,
        game_log: Vec::new(),
        chat_history: Vec::new(),
        is_public: false,
        created_at: None,
    }
}

/// Command API backed by a map of games. Creating a game yields code
/// `GAME{n}` hosted by `host`; unknown games answer 404.
#[derive(Default)]
pub struct MockApi {
    games: Mutex<HashMap<GameId, GameSnapshot>>,
    sent: Mutex<Vec<(GameId, Command)>>,
    fail_next: Mutex<Option<ClientError>>,
    calls: Mutex<usize>,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert_game(&self, snapshot: GameSnapshot) {
        self.games
            .lock()
            .unwrap()
            .insert(snapshot.game_id.clone(), snapshot);
    }

    pub fn fail_next(&self, err: ClientError) {
        *self.fail_next.lock().unwrap() = Some(err);
    }

    pub fn sent(&self) -> Vec<(GameId, Command)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }

    fn begin(&self) -> Result<(), ClientError> {
        *self.calls.lock().unwrap() += 1;
        match self.fail_next.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn not_found() -> ClientError {
        ClientError::ServerRejected {
            status: 404,
            message: "Game not found".into(),
        }
    }
}

#[async_trait]
impl CommandApi for MockApi {
    async fn list_public_games(&self) -> Result<Vec<PublicGameSummary>, ClientError> {
        self.begin()?;
        let games = self.games.lock().unwrap();
        Ok(games
            .values()
            .filter(|g| g.is_public && g.status == GameStatus::Lobby)
            .map(|g| PublicGameSummary {
                game_id: g.game_id.clone(),
                host_name: g
                    .player(&g.host_id)
                    .map(|p| p.display_name.clone())
                    .unwrap_or_default(),
                player_count: g.player_count(),
            })
            .collect())
    }

    async fn get_game(&self, game_id: &str) -> Result<GameSnapshot, ClientError> {
        self.begin()?;
        self.games
            .lock()
            .unwrap()
            .get(game_id)
            .cloned()
            .ok_or_else(Self::not_found)
    }

    async fn create_game(
        &self,
        host_display_name: &str,
        is_public: bool,
    ) -> Result<GameSnapshot, ClientError> {
        self.begin()?;
        let mut games = self.games.lock().unwrap();
        let mut snapshot = game_snapshot(&format!("GAME{}", games.len() + 1), &["host"]);
        snapshot.is_public = is_public;
        if let Some(host) = snapshot.players.get_mut("host") {
            host.display_name = host_display_name.to_string();
        }
        games.insert(snapshot.game_id.clone(), snapshot.clone());
        Ok(snapshot)
    }

    async fn join_game(
        &self,
        game_id: &str,
        display_name: &str,
    ) -> Result<JoinResponse, ClientError> {
        self.begin()?;
        let mut games = self.games.lock().unwrap();
        let game = games.get_mut(game_id).ok_or_else(Self::not_found)?;
        let new_player_id = format!("p{}", game.player_count() + 1);
        let mut joined = player(&new_player_id);
        joined.display_name = display_name.to_string();
        game.players.insert(new_player_id.clone(), joined);
        game.player_order.push(new_player_id.clone());
        Ok(JoinResponse {
            new_player_id,
            game_state: game.clone(),
        })
    }

    async fn send(&self, game_id: &str, command: &Command) -> Result<(), ClientError> {
        self.begin()?;
        self.sent
            .lock()
            .unwrap()
            .push((game_id.to_string(), command.clone()));
        Ok(())
    }
}

/// Connector whose streams never yield.
pub struct IdleConnector;

#[async_trait]
impl Connector for IdleConnector {
    async fn connect(&self, _url: &str) -> Result<FrameStream, WsError> {
        Ok(Box::pin(stream::pending()))
    }
}

/// Engine over `api`, an in-memory store and an idle connection.
pub fn test_engine(api: Arc<MockApi>) -> (SyncEngine, EngineEvents) {
    let store = SessionStore::open(":memory:", "test").expect("in-memory store should open");
    let connection = ConnectionManager::new(Arc::new(IdleConnector), "ws://localhost:8000");
    SyncEngine::new(api, store, connection, Duration::from_secs(4))
}
