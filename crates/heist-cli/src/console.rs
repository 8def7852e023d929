// Line-oriented console: prints UI updates and forwards typed commands.
//
// The console keeps the last `ViewState` it drew so player references in
// typed commands resolve against what the player is looking at, and so only
// new chat lines are printed on each redraw.

use std::io::Write;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::debug;

use heist_client::protocol::{UiUpdate, UserCommand, ViewState};

use crate::input::{parse_line, Input, HELP};
use crate::render::{render_cue, render_public_games, render_view};

/// Run on stdin and stdout until the player quits or the event loop exits.
pub async fn run(
    ui_rx: mpsc::Receiver<UiUpdate>,
    cmd_tx: mpsc::Sender<UserCommand>,
) -> anyhow::Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    drive(ui_rx, cmd_tx, stdin, &mut stdout).await
}

pub async fn drive<R, W>(
    mut ui_rx: mpsc::Receiver<UiUpdate>,
    cmd_tx: mpsc::Sender<UserCommand>,
    reader: R,
    out: &mut W,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = reader.lines();
    let mut last_view: Option<ViewState> = None;

    loop {
        tokio::select! {
            biased;

            update = ui_rx.recv() => {
                let Some(update) = update else {
                    debug!("ui channel closed");
                    break;
                };
                match update {
                    UiUpdate::View(view) => {
                        if last_view.as_ref() != Some(&*view) {
                            write!(out, "{}", render_view(&view, last_view.as_ref()))?;
                            last_view = Some(*view);
                        }
                    }
                    UiUpdate::Cue { cue, volume } => writeln!(out, "{}", render_cue(cue, volume))?,
                    UiUpdate::PublicGames(games) => write!(out, "{}", render_public_games(&games))?,
                    UiUpdate::Loading(true) => writeln!(out, "...")?,
                    UiUpdate::Loading(false) => {}
                }
                out.flush()?;
            }

            line = lines.next_line() => {
                let Some(line) = line? else {
                    let _ = cmd_tx.send(UserCommand::Quit).await;
                    break;
                };
                match parse_line(&line, last_view.as_ref()) {
                    Ok(Input::Nothing) => {}
                    Ok(Input::Help) => writeln!(out, "{HELP}")?,
                    Ok(Input::Command(UserCommand::Quit)) => {
                        let _ = cmd_tx.send(UserCommand::Quit).await;
                        break;
                    }
                    Ok(Input::Command(cmd)) => {
                        if cmd_tx.send(cmd).await.is_err() {
                            break;
                        }
                    }
                    Err(message) => writeln!(out, "? {message}")?,
                }
                out.flush()?;
            }
        }
    }
    Ok(())
}
