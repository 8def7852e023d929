// Plain-text rendering of views, cues and the lobby browser.

use std::fmt::Write;

use heist_client::protocol::ViewState;
use heist_core::board::{mission_track, vote_track, MissionSlotStatus};
use heist_core::page::{ActionView, Page};
use heist_core::snapshot::{
    GameSnapshot, GameStatus, MissionResult, PublicGameSummary, Role, Winner,
};
use heist_core::Cue;

/// Chat lines shown when a game view is first drawn.
const CHAT_BACKLOG: usize = 5;

pub fn render_view(view: &ViewState, previous: Option<&ViewState>) -> String {
    let mut out = String::new();
    let same_game = match (
        previous.and_then(|p| p.snapshot.as_ref()),
        view.snapshot.as_ref(),
    ) {
        (Some(a), Some(b)) => a.game_id == b.game_id,
        _ => false,
    };

    match (&view.page, view.snapshot.as_ref()) {
        (Page::Home, _) | (_, None) => {
            let _ = writeln!(out, "== HOME ==");
            if view.player_name.is_empty() {
                let _ = writeln!(
                    out,
                    "Set a name with `name <name>`, then `create` or `join <code>`."
                );
            } else {
                let _ = writeln!(
                    out,
                    "Playing as {}. `create` or `join <code>`.",
                    view.player_name
                );
            }
        }
        (Page::Lobby, Some(snapshot)) => render_lobby(&mut out, snapshot, view),
        (Page::Game, Some(snapshot)) => render_game(&mut out, snapshot, view),
        (Page::GameOver, Some(snapshot)) => render_game_over(&mut out, snapshot, view),
    }

    if let Some(snapshot) = view.snapshot.as_ref() {
        let seen = if same_game {
            previous
                .and_then(|p| p.snapshot.as_ref())
                .map_or(0, |p| p.chat_history.len())
        } else {
            snapshot.chat_history.len().saturating_sub(CHAT_BACKLOG)
        };
        for msg in snapshot.chat_history.iter().skip(seen) {
            let time = msg
                .timestamp
                .map(|t| t.format("%H:%M").to_string())
                .unwrap_or_default();
            let _ = writeln!(out, "[{time}] {}: {}", msg.sender_name, msg.message);
        }
    }

    if let Some(error) = &view.error {
        let _ = writeln!(out, "! {error}");
    }
    out
}

fn render_lobby(out: &mut String, snapshot: &GameSnapshot, view: &ViewState) {
    let visibility = if snapshot.is_public { "public" } else { "private" };
    let _ = writeln!(out, "== LOBBY {} ({visibility}) ==", snapshot.game_id);
    render_roster(out, snapshot, view);
    let is_host = view.player_id.as_deref() == Some(snapshot.host_id.as_str());
    if is_host {
        let _ = writeln!(out, "You are the host: `start` when everyone is ready.");
    } else {
        let _ = writeln!(out, "`ready` when you are set.");
    }
}

fn render_game(out: &mut String, snapshot: &GameSnapshot, view: &ViewState) {
    let _ = writeln!(
        out,
        "== GAME {}  mission {}  {:?} ==",
        snapshot.game_id, snapshot.mission_number, snapshot.phase
    );

    let track: Vec<String> = mission_track(snapshot)
        .iter()
        .map(|slot| {
            let mark = match slot.status {
                MissionSlotStatus::Pending => "..".to_string(),
                MissionSlotStatus::Succeeded => "OK".to_string(),
                MissionSlotStatus::Failed { fail_votes } => format!("X{fail_votes}"),
            };
            let fails = if slot.fails_required > 1 { "*" } else { "" };
            format!("M{}[{}{}] {}", slot.mission_number, slot.team_size, fails, mark)
        })
        .collect();
    let votes = vote_track(snapshot);
    let _ = writeln!(
        out,
        "{}   rejected proposals {}/{}",
        track.join("  "),
        votes.rejected,
        votes.limit
    );

    render_roster(out, snapshot, view);

    if let Some(action) = &view.action {
        let _ = writeln!(out, "> {}", describe_action(action));
    }
}

fn render_game_over(out: &mut String, snapshot: &GameSnapshot, view: &ViewState) {
    let winner = match snapshot.winner {
        Some(Winner::Thieves) => "The thieves win.",
        Some(Winner::Agents) => "The agents win.",
        None => "Game over.",
    };
    let _ = writeln!(out, "== GAME OVER {} ==", snapshot.game_id);
    let _ = writeln!(out, "{winner}");
    for player in snapshot.ordered_players() {
        let role = match player.role {
            Some(Role::Agent) => "agent",
            Some(Role::Thief) => "thief",
            None => "?",
        };
        let _ = writeln!(out, "  {} ({role})", player.display_name);
    }
    if view.player_id.as_deref() == Some(snapshot.host_id.as_str()) {
        let _ = writeln!(out, "`reset` to play again, `leave` to go home.");
    }
}

fn render_roster(out: &mut String, snapshot: &GameSnapshot, view: &ViewState) {
    let on_team = snapshot.proposed_team.as_deref().unwrap_or_default();
    for (index, player) in snapshot.ordered_players().into_iter().enumerate() {
        let mut tags = Vec::new();
        if player.uid == snapshot.host_id {
            tags.push("host");
        }
        if snapshot.mastermind_id.as_deref() == Some(player.uid.as_str()) {
            tags.push("mastermind");
        }
        if on_team.contains(&player.uid) {
            tags.push("team");
        }
        if snapshot.status == GameStatus::Lobby && player.is_ready {
            tags.push("ready");
        }
        if !player.is_online {
            tags.push("offline");
        }
        if view.player_id.as_deref() == Some(player.uid.as_str()) {
            tags.push("you");
        }
        let tags = if tags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", tags.join(", "))
        };
        let _ = writeln!(out, "  {}. {}{tags}", index + 1, player.display_name);
    }
}

pub fn describe_action(action: &ActionView) -> String {
    match action {
        ActionView::RoleReveal {
            role,
            fellow_agents,
        } => match role {
            Some(Role::Agent) if fellow_agents.is_empty() => "You are an AGENT.".to_string(),
            Some(Role::Agent) => format!(
                "You are an AGENT. Fellow agents: {}.",
                fellow_agents.join(", ")
            ),
            Some(Role::Thief) => "You are a THIEF.".to_string(),
            None => "Roles are being dealt.".to_string(),
        },
        ActionView::SelectTeam { team_size, .. } => match team_size {
            Some(size) => format!("Pick {size} players: `team <player> ...`"),
            None => "Pick a team: `team <player> ...`".to_string(),
        },
        ActionView::VotePrompt { team } => {
            format!("Vote on team {}: `approve` or `reject`", team.join(", "))
        }
        ActionView::VoteResult {
            tally,
            approved_by,
            rejected_by,
        } => {
            let verdict = if tally.passed() { "approved" } else { "rejected" };
            format!(
                "Team {verdict} {}-{}. Approve: {}. Reject: {}.",
                tally.approvals,
                tally.rejections,
                approved_by.join(", "),
                rejected_by.join(", ")
            )
        }
        ActionView::MissionPrompt { can_fail } => {
            if *can_fail {
                "Play a card: `success` or `fail`".to_string()
            } else {
                "Play your card: `success`".to_string()
            }
        }
        ActionView::MissionResult { record } => match record
            .as_ref()
            .and_then(|r| r.result.map(|result| (r, result)))
        {
            Some((record, MissionResult::Success)) => {
                format!("Mission {} succeeded.", record.mission_number)
            }
            Some((record, MissionResult::Failure)) => format!(
                "Mission {} failed with {} fail card(s).",
                record.mission_number, record.fail_votes
            ),
            None => "Revealing the mission...".to_string(),
        },
        ActionView::Waiting(banner) => banner.to_string(),
    }
}

pub fn render_cue(cue: Cue, volume: f64) -> String {
    format!("(sound {} at {:.0}%)", cue.sound_file(), volume * 100.0)
}

pub fn render_public_games(games: &[PublicGameSummary]) -> String {
    if games.is_empty() {
        return "No public games right now.".to_string();
    }
    let mut out = String::from("Public games:\n");
    for game in games {
        let _ = writeln!(
            out,
            "  {}  hosted by {}  ({} players)",
            game.game_id, game.host_name, game.player_count
        );
    }
    out
}
