// Messages between the presentation layer and the event loop.

use heist_core::snapshot::PublicGameSummary;
use heist_core::{ActionView, Cue, GameSnapshot, Page, PlayerId};

use crate::connection::ConnectionState;
use crate::engine::{Action, SyncEngine};

/// Input from the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum UserCommand {
    CreateGame { name: String, is_public: bool },
    JoinGame { game_id: String, name: String },
    BrowseGames,
    SetName(String),
    SetVolume(f64),
    Act(Action),
    DismissError,
    Quit,
}

/// Output to the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum UiUpdate {
    View(Box<ViewState>),
    Cue { cue: Cue, volume: f64 },
    PublicGames(Vec<PublicGameSummary>),
    /// A create, join or resume request is in flight.
    Loading(bool),
}

/// Everything needed to draw one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub page: Page,
    pub snapshot: Option<GameSnapshot>,
    pub player_id: Option<PlayerId>,
    pub player_name: String,
    pub action: Option<ActionView>,
    pub error: Option<String>,
    pub connection: ConnectionState,
}

impl ViewState {
    pub fn capture(engine: &SyncEngine) -> Self {
        Self {
            page: engine.page(),
            snapshot: engine.snapshot().cloned(),
            player_id: engine.player_id().map(str::to_string),
            player_name: engine.player_name().to_string(),
            action: engine.action_view(),
            error: engine.error_message().map(str::to_string),
            connection: engine.connection_state(),
        }
    }
}
