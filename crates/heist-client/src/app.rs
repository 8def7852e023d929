// Event loop: the one place the engine is mutated. Connection events,
// command outcomes and user commands are handled in arrival order.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info};

use heist_core::Cue;

use crate::engine::{Action, EngineEvents, ResumeOutcome, SyncEngine};
use crate::protocol::{UiUpdate, UserCommand, ViewState};

/// How often the error display is checked for expiry.
const ERROR_CHECK_INTERVAL: Duration = Duration::from_millis(250);

/// Run until the presentation layer quits or drops its command sender.
///
/// Starts by trying to resume a stored session, then loops over:
/// - connection events (snapshots and closes),
/// - command outcomes from spawned tasks,
/// - user commands,
/// - a periodic tick that expires the error display.
pub async fn run(
    mut engine: SyncEngine,
    mut events: EngineEvents,
    mut cmd_rx: mpsc::Receiver<UserCommand>,
    ui_tx: mpsc::Sender<UiUpdate>,
) -> anyhow::Result<()> {
    info!("client event loop started");

    let _ = ui_tx.send(UiUpdate::Loading(true)).await;
    match engine.resume_session().await {
        ResumeOutcome::Resumed => info!("resumed previous session"),
        ResumeOutcome::NothingStored => debug!("no stored session"),
        ResumeOutcome::Discarded(reason) => info!("discarded stored session: {reason}"),
    }
    let _ = ui_tx.send(UiUpdate::Loading(false)).await;
    send_view(&engine, &ui_tx).await;

    let mut error_tick = tokio::time::interval(ERROR_CHECK_INTERVAL);
    error_tick.tick().await;

    loop {
        tokio::select! {
            // --- Push channel ---
            Some(event) = events.connection.recv() => {
                let cues = engine.apply_connection_event(event);
                send_cues(&engine, cues, &ui_tx).await;
                send_view(&engine, &ui_tx).await;
            }

            // --- Command outcomes ---
            Some(outcome) = events.outcomes.recv() => {
                engine.apply_command_outcome(outcome);
                send_view(&engine, &ui_tx).await;
            }

            // --- User commands ---
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UserCommand::Quit) | None => {
                        info!("quit requested, shutting down");
                        break;
                    }
                    Some(cmd) => handle_user_command(&mut engine, cmd, &ui_tx).await,
                }
            }

            // --- Error expiry ---
            _ = error_tick.tick() => {
                if engine.clear_expired_error(Instant::now()) {
                    send_view(&engine, &ui_tx).await;
                }
            }
        }
    }

    Ok(())
}

async fn handle_user_command(
    engine: &mut SyncEngine,
    cmd: UserCommand,
    ui_tx: &mpsc::Sender<UiUpdate>,
) {
    match cmd {
        UserCommand::CreateGame { name, is_public } => {
            let _ = ui_tx.send(UiUpdate::Loading(true)).await;
            let _ = engine.create_session(&name, is_public).await;
            let _ = ui_tx.send(UiUpdate::Loading(false)).await;
        }
        UserCommand::JoinGame { game_id, name } => {
            let _ = ui_tx.send(UiUpdate::Loading(true)).await;
            let _ = engine.join_session(&game_id, &name).await;
            let _ = ui_tx.send(UiUpdate::Loading(false)).await;
        }
        UserCommand::BrowseGames => {
            if let Ok(games) = engine.fetch_public_games().await {
                let _ = ui_tx.send(UiUpdate::PublicGames(games)).await;
            }
        }
        UserCommand::SetName(name) => engine.set_player_name(&name),
        UserCommand::SetVolume(volume) => {
            engine.set_volume(volume);
        }
        UserCommand::Act(Action::SubmitVote(vote)) => {
            if engine.submit_vote(vote).is_some() {
                send_cues(engine, vec![Cue::VoteCast], ui_tx).await;
            }
        }
        UserCommand::Act(action @ Action::PlayMissionCard(_)) => {
            if engine.submit(action) {
                send_cues(engine, vec![Cue::CardPlayed], ui_tx).await;
            }
        }
        UserCommand::Act(action) => {
            engine.submit(action);
        }
        UserCommand::DismissError => engine.dismiss_error(),
        UserCommand::Quit => {}
    }
    send_view(engine, ui_tx).await;
}

async fn send_view(engine: &SyncEngine, ui_tx: &mpsc::Sender<UiUpdate>) {
    let view = ViewState::capture(engine);
    let _ = ui_tx.send(UiUpdate::View(Box::new(view))).await;
}

async fn send_cues(engine: &SyncEngine, cues: Vec<Cue>, ui_tx: &mpsc::Sender<UiUpdate>) {
    if cues.is_empty() {
        return;
    }
    let volume = engine.volume();
    for cue in cues {
        let _ = ui_tx.send(UiUpdate::Cue { cue, volume }).await;
    }
}
