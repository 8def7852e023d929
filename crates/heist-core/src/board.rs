// Read-models for the mission and vote track panels.

use crate::rules;
use crate::snapshot::{GameSnapshot, MissionResult};

/// State of one mission on the track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissionSlotStatus {
    Pending,
    Succeeded,
    Failed { fail_votes: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissionSlot {
    pub mission_number: u32,
    pub team_size: u32,
    pub fails_required: u32,
    pub status: MissionSlotStatus,
}

/// One slot per mission for the current player count. Empty when the
/// player count is outside the rule table.
pub fn mission_track(snapshot: &GameSnapshot) -> Vec<MissionSlot> {
    let player_count = snapshot.player_count();
    rules::team_sizes(player_count)
        .iter()
        .zip(1u32..)
        .map(|(&team_size, mission_number)| {
            let record = snapshot
                .mission_history
                .iter()
                .find(|m| m.mission_number == mission_number);
            let status = match record.and_then(|m| m.result.map(|r| (r, m.fail_votes))) {
                None => MissionSlotStatus::Pending,
                Some((MissionResult::Success, _)) => MissionSlotStatus::Succeeded,
                Some((MissionResult::Failure, fail_votes)) => {
                    MissionSlotStatus::Failed { fail_votes }
                }
            };
            MissionSlot {
                mission_number,
                team_size,
                fails_required: rules::fails_required(player_count, mission_number),
                status,
            }
        })
        .collect()
}

/// Rejected proposals so far in the current mission, out of
/// [`rules::MAX_REJECTED_PROPOSALS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteTrack {
    pub rejected: u32,
    pub limit: u32,
}

pub fn vote_track(snapshot: &GameSnapshot) -> VoteTrack {
    VoteTrack {
        rejected: snapshot
            .round_number
            .saturating_sub(1)
            .min(rules::MAX_REJECTED_PROPOSALS),
        limit: rules::MAX_REJECTED_PROPOSALS,
    }
}
