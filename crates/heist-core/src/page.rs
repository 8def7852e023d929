// Phase resolver: maps a snapshot to the page the client shows, and within
// the game page to the action (if any) the local player is asked for.

use crate::rules;
use crate::snapshot::{
    GameSnapshot, GameStatus, MissionRecord, Phase, Player, Role, Vote, VoteTally,
};

/// Top-level page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Page {
    Home,
    Lobby,
    Game,
    GameOver,
}

/// Resolve the top-level page. Total and pure: the same snapshot always
/// yields the same page.
pub fn resolve_page(snapshot: Option<&GameSnapshot>) -> Page {
    match snapshot.map(|s| s.status) {
        None => Page::Home,
        Some(GameStatus::Lobby) => Page::Lobby,
        Some(GameStatus::InProgress) => Page::Game,
        Some(GameStatus::Finished) => Page::GameOver,
    }
}

/// What the game page shows the local player.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionView {
    RoleReveal {
        role: Option<Role>,
        /// Other agents, populated for agents only.
        fellow_agents: Vec<String>,
    },
    SelectTeam {
        /// `None` when the player count is outside the rule table.
        team_size: Option<u32>,
        candidates: Vec<Candidate>,
    },
    VotePrompt {
        team: Vec<String>,
    },
    VoteResult {
        tally: VoteTally,
        approved_by: Vec<String>,
        rejected_by: Vec<String>,
    },
    MissionPrompt {
        /// Only agents may play a fail card.
        can_fail: bool,
    },
    MissionResult {
        record: Option<MissionRecord>,
    },
    Waiting(WaitingBanner),
}

/// A player the mastermind may pick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub uid: String,
    pub display_name: String,
    /// Offline players are shown but not selectable.
    pub selectable: bool,
}

/// Stateless banner shown when the local player has nothing to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitingBanner {
    AwaitingTeam { mastermind: Option<String> },
    SubmittingVote,
    VoteRecorded,
    AwaitingVotes,
    MissionInProgress,
    RevealingResults,
    AwaitingPlayers,
}

impl std::fmt::Display for WaitingBanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WaitingBanner::AwaitingTeam { mastermind: Some(name) } => {
                write!(f, "Waiting for {name} to select a team.")
            }
            WaitingBanner::AwaitingTeam { mastermind: None } => {
                write!(f, "Waiting for the mastermind to select a team.")
            }
            WaitingBanner::SubmittingVote => write!(f, "Submitting vote..."),
            WaitingBanner::VoteRecorded => write!(f, "You have voted. Waiting for others..."),
            WaitingBanner::AwaitingVotes => write!(f, "Waiting for votes..."),
            WaitingBanner::MissionInProgress => write!(f, "Mission in progress..."),
            WaitingBanner::RevealingResults => write!(f, "Revealing results..."),
            WaitingBanner::AwaitingPlayers => write!(f, "Waiting for other players..."),
        }
    }
}

/// Which rule of the precedence table matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    RoleReveal = 0,
    OwnAction = 1,
    PhaseDisplay = 2,
    Waiting = 3,
}

impl ActionView {
    pub fn precedence(&self) -> Precedence {
        match self {
            ActionView::RoleReveal { .. } => Precedence::RoleReveal,
            ActionView::SelectTeam { .. }
            | ActionView::VotePrompt { .. }
            | ActionView::MissionPrompt { .. } => Precedence::OwnAction,
            ActionView::VoteResult { .. } | ActionView::MissionResult { .. } => {
                Precedence::PhaseDisplay
            }
            ActionView::Waiting(_) => Precedence::Waiting,
        }
    }
}

/// Resolve what the local player sees inside the game page.
///
/// Every candidate view whose condition holds is collected and the one with
/// the highest [`Precedence`] wins. `vote_pending` is the local "vote
/// submitted, not yet confirmed" flag.
pub fn resolve_action(snapshot: &GameSnapshot, local_player: &str, vote_pending: bool) -> ActionView {
    let Some(me) = snapshot.player(local_player) else {
        return ActionView::Waiting(WaitingBanner::AwaitingPlayers);
    };

    let mut candidates: Vec<ActionView> = vec![ActionView::Waiting(banner_for(
        snapshot,
        local_player,
        vote_pending,
    ))];

    match snapshot.phase {
        Phase::AgentReveal => candidates.push(role_reveal(snapshot, me)),
        Phase::TeamSelection if snapshot.is_mastermind(local_player) => {
            candidates.push(ActionView::SelectTeam {
                team_size: rules::team_size(snapshot.player_count(), snapshot.mission_number),
                candidates: snapshot
                    .ordered_players()
                    .into_iter()
                    .map(|p| Candidate {
                        uid: p.uid.clone(),
                        display_name: p.display_name.clone(),
                        selectable: p.is_online,
                    })
                    .collect(),
            });
        }
        Phase::TeamVote if !vote_pending && !snapshot.votes.contains_key(local_player) => {
            candidates.push(ActionView::VotePrompt {
                team: team_names(snapshot),
            });
        }
        Phase::VoteReveal => candidates.push(vote_result(snapshot)),
        Phase::Mission
            if snapshot.is_on_proposed_team(local_player) && me.mission_choice.is_none() =>
        {
            candidates.push(ActionView::MissionPrompt {
                can_fail: me.role == Some(Role::Agent),
            });
        }
        Phase::MissionReveal => candidates.push(ActionView::MissionResult {
            record: snapshot.mission_history.last().cloned(),
        }),
        _ => {}
    }

    candidates
        .into_iter()
        .min_by_key(ActionView::precedence)
        .unwrap_or(ActionView::Waiting(WaitingBanner::AwaitingPlayers))
}

fn role_reveal(snapshot: &GameSnapshot, me: &Player) -> ActionView {
    let fellow_agents = if me.role == Some(Role::Agent) {
        snapshot
            .ordered_players()
            .into_iter()
            .filter(|p| p.role == Some(Role::Agent) && p.uid != me.uid)
            .map(|p| p.display_name.clone())
            .collect()
    } else {
        Vec::new()
    };
    ActionView::RoleReveal {
        role: me.role,
        fellow_agents,
    }
}

fn vote_result(snapshot: &GameSnapshot) -> ActionView {
    let voters = |vote: Vote| -> Vec<String> {
        snapshot
            .ordered_players()
            .into_iter()
            .filter(|p| snapshot.votes.get(&p.uid) == Some(&vote))
            .map(|p| p.display_name.clone())
            .collect()
    };
    ActionView::VoteResult {
        tally: snapshot.vote_tally(),
        approved_by: voters(Vote::Approve),
        rejected_by: voters(Vote::Reject),
    }
}

fn team_names(snapshot: &GameSnapshot) -> Vec<String> {
    snapshot
        .proposed_team
        .iter()
        .flatten()
        .filter_map(|id| snapshot.player(id))
        .map(|p| p.display_name.clone())
        .collect()
}

fn banner_for(snapshot: &GameSnapshot, local_player: &str, vote_pending: bool) -> WaitingBanner {
    match snapshot.phase {
        Phase::TeamSelection => WaitingBanner::AwaitingTeam {
            mastermind: snapshot
                .mastermind_id
                .as_deref()
                .and_then(|id| snapshot.player(id))
                .map(|p| p.display_name.clone()),
        },
        Phase::TeamVote if vote_pending => WaitingBanner::SubmittingVote,
        Phase::TeamVote if snapshot.votes.contains_key(local_player) => {
            WaitingBanner::VoteRecorded
        }
        Phase::TeamVote => WaitingBanner::AwaitingVotes,
        Phase::Mission => WaitingBanner::MissionInProgress,
        Phase::VoteReveal | Phase::MissionReveal => WaitingBanner::RevealingResults,
        Phase::AgentReveal => WaitingBanner::AwaitingPlayers,
    }
}
