// Transition-effect engine: diffs consecutive snapshots into one-shot audio
// cues. Cues come from transitions, never from state alone.

use crate::snapshot::{GameSnapshot, GameStatus, MissionResult, Phase};

/// A one-shot audio cue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cue {
    PlayerJoined,
    PlayerLeft,
    GameStarted,
    NewMastermind,
    TeamProposed,
    VotePassed,
    VoteFailed,
    MissionSuccess,
    MissionFailure,
    Win,
    Lose,
    /// Local action: the player clicked approve or reject.
    VoteCast,
    /// Local action: the player played a mission card.
    CardPlayed,
}

impl Cue {
    /// Asset name the playback collaborator loads for this cue.
    pub fn sound_file(self) -> &'static str {
        match self {
            Cue::PlayerJoined => "playerjoin1.mp3",
            Cue::PlayerLeft => "playerleave1.mp3",
            Cue::GameStarted => "gamestart2.mp3",
            Cue::NewMastermind => "mastermind1.mp3",
            Cue::TeamProposed => "teamproposed.mp3",
            Cue::VotePassed => "votepassed1.mp3",
            Cue::VoteFailed => "votefailed1.mp3",
            Cue::MissionSuccess => "missionsuccess1.mp3",
            Cue::MissionFailure => "missionfail1.mp3",
            Cue::Win => "gamewin1.mp3",
            Cue::Lose => "gamelose1.mp3",
            Cue::VoteCast => "vote1.mp3",
            Cue::CardPlayed => "cardselected1.mp3",
        }
    }
}

/// Compute the cues for the transition `previous -> current`.
///
/// Rules are evaluated in a fixed order, so the output order is stable. The
/// game-over edge and the mission-result rule are exclusive: when a mission
/// ends the game only the win/lose cue fires.
pub fn diff_cues(previous: &GameSnapshot, current: &GameSnapshot, local_player: &str) -> Vec<Cue> {
    let mut cues = Vec::new();

    if current.player_count() > previous.player_count() {
        cues.push(Cue::PlayerJoined);
    }
    if current.online_count() < previous.online_count() {
        cues.push(Cue::PlayerLeft);
    }
    if previous.status == GameStatus::Lobby && current.status == GameStatus::InProgress {
        cues.push(Cue::GameStarted);
    }
    if current.mastermind_id != previous.mastermind_id {
        cues.push(Cue::NewMastermind);
    }
    if previous.phase == Phase::TeamSelection && current.phase == Phase::TeamVote {
        cues.push(Cue::TeamProposed);
    }
    if previous.phase == Phase::TeamVote && current.phase == Phase::VoteReveal {
        cues.push(if current.vote_tally().passed() {
            Cue::VotePassed
        } else {
            Cue::VoteFailed
        });
    }

    let finished_edge = current.status == GameStatus::Finished
        && previous.status != GameStatus::Finished;
    match current.winner {
        Some(winner) if finished_edge => {
            // Matched by side, not by name prefix: "THIEF" is no prefix of
            // "THIEVES", so a prefix check would never let a thief win.
            let won = current
                .player(local_player)
                .and_then(|me| me.role)
                .is_some_and(|role| role.side() == winner);
            cues.push(if won { Cue::Win } else { Cue::Lose });
        }
        _ if current.mission_history.len() > previous.mission_history.len() => {
            let failed = current
                .mission_history
                .last()
                .and_then(|m| m.result)
                .is_some_and(|r| r == MissionResult::Failure);
            cues.push(if failed {
                Cue::MissionFailure
            } else {
                Cue::MissionSuccess
            });
        }
        _ => {}
    }

    cues
}

/// Fold state over the snapshot stream: remembers the last snapshot seen
/// and diffs each new one against it.
#[derive(Debug, Default)]
pub struct CueTracker {
    previous: Option<GameSnapshot>,
}

impl CueTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the fold by one step. The first snapshot, a snapshot after
    /// an absence, and a snapshot from a different game produce no cues.
    pub fn observe(&mut self, current: Option<&GameSnapshot>, local_player: &str) -> Vec<Cue> {
        let cues = match (self.previous.as_ref(), current) {
            (Some(prev), Some(curr)) if prev.game_id == curr.game_id => {
                diff_cues(prev, curr, local_player)
            }
            _ => Vec::new(),
        };
        self.previous = current.cloned();
        cues
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }

    pub fn previous(&self) -> Option<&GameSnapshot> {
        self.previous.as_ref()
    }
}
