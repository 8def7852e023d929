// Line parser: turns one line typed at the prompt into a user command.

use heist_client::engine::Action;
use heist_client::protocol::{UserCommand, ViewState};
use heist_core::snapshot::{MissionChoice, Vote};
use heist_core::{GameSnapshot, PlayerId};

pub const HELP: &str = "\
commands:
  create [name] [public]   host a new game
  join <code> [name]       join a game by code
  games                    list public lobbies
  name <name>              set your display name
  volume <0-100>           set cue volume
  ready | start | reset | leave
  team <player> ...        propose a team (roster number or id)
  approve | reject         vote on the proposed team
  success | fail           play a mission card
  kick <player>            remove a player from the lobby
  say <message>            chat
  dismiss                  hide the current error
  help | quit";

/// Result of parsing one input line.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Command(UserCommand),
    Help,
    Nothing,
}

/// Parse `line` against the last view drawn. Player references resolve
/// through that view's roster.
pub fn parse_line(line: &str, view: Option<&ViewState>) -> Result<Input, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let args: Vec<&str> = rest.split_whitespace().collect();
    let stored_name = view.map(|v| v.player_name.clone()).unwrap_or_default();

    let command = match word.to_ascii_lowercase().as_str() {
        "" => return Ok(Input::Nothing),
        "help" | "?" => return Ok(Input::Help),
        "quit" | "exit" => UserCommand::Quit,
        "create" => {
            let (is_public, name_parts) = match args.split_last() {
                Some((&"public", head)) => (true, head),
                _ => (false, args.as_slice()),
            };
            let name = if name_parts.is_empty() {
                stored_name
            } else {
                name_parts.join(" ")
            };
            UserCommand::CreateGame { name, is_public }
        }
        "join" => {
            let Some((code, name_parts)) = args.split_first() else {
                return Err("usage: join <code> [name]".into());
            };
            let name = if name_parts.is_empty() {
                stored_name
            } else {
                name_parts.join(" ")
            };
            UserCommand::JoinGame {
                game_id: code.to_ascii_uppercase(),
                name,
            }
        }
        "games" => UserCommand::BrowseGames,
        "name" => {
            if rest.is_empty() {
                return Err("usage: name <name>".into());
            }
            UserCommand::SetName(rest.to_string())
        }
        "volume" => {
            let percent: f64 = rest
                .parse()
                .map_err(|_| "usage: volume <0-100>".to_string())?;
            UserCommand::SetVolume(percent / 100.0)
        }
        "ready" => UserCommand::Act(Action::SetReady),
        "start" => UserCommand::Act(Action::StartGame),
        "reset" => UserCommand::Act(Action::ResetGame),
        "leave" => UserCommand::Act(Action::Leave),
        "approve" | "yes" => UserCommand::Act(Action::SubmitVote(Vote::Approve)),
        "reject" | "no" => UserCommand::Act(Action::SubmitVote(Vote::Reject)),
        "success" => UserCommand::Act(Action::PlayMissionCard(MissionChoice::Success)),
        "fail" => UserCommand::Act(Action::PlayMissionCard(MissionChoice::Fail)),
        "team" => {
            let snapshot = view.and_then(|v| v.snapshot.as_ref());
            let team = args
                .iter()
                .map(|arg| resolve_player(arg, snapshot))
                .collect::<Result<Vec<_>, _>>()?;
            UserCommand::Act(Action::ProposeTeam(team))
        }
        "kick" => {
            let [target] = args.as_slice() else {
                return Err("usage: kick <player>".into());
            };
            let snapshot = view.and_then(|v| v.snapshot.as_ref());
            UserCommand::Act(Action::Kick(resolve_player(target, snapshot)?))
        }
        "say" => UserCommand::Act(Action::SendChat(rest.to_string())),
        "dismiss" => UserCommand::DismissError,
        other => return Err(format!("unknown command `{other}`, type `help`")),
    };
    Ok(Input::Command(command))
}

/// A roster number (1-based, display order) or a player id.
fn resolve_player(arg: &str, snapshot: Option<&GameSnapshot>) -> Result<PlayerId, String> {
    let Some(snapshot) = snapshot else {
        return Err("not in a game".into());
    };
    if let Ok(index) = arg.parse::<usize>() {
        return snapshot
            .ordered_players()
            .get(index.wrapping_sub(1))
            .map(|p| p.uid.clone())
            .ok_or_else(|| format!("no player #{index}"));
    }
    if snapshot.contains_player(arg) {
        return Ok(arg.to_string());
    }
    snapshot
        .ordered_players()
        .into_iter()
        .find(|p| p.display_name.eq_ignore_ascii_case(arg))
        .map(|p| p.uid.clone())
        .ok_or_else(|| format!("no player `{arg}`"))
}
