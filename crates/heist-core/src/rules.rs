// Static game-rule table: mission team sizes by player count and the
// thresholds the board views need. Read-only; the server enforces all rules.

/// Fewest players a game can start with.
pub const MIN_PLAYERS: usize = 5;

/// Most players a lobby accepts.
pub const MAX_PLAYERS: usize = 8;

/// Number of missions in a full game.
pub const MISSION_COUNT: usize = 5;

/// Missions a side must win to win the game.
pub const MISSIONS_TO_WIN: usize = 3;

/// Consecutive rejected proposals that hand the game to the agents.
pub const MAX_REJECTED_PROPOSALS: u32 = 5;

/// Fail cards needed to sabotage mission 4 in games of
/// [`MISSION_4_MIN_PLAYERS`] or more.
pub const MISSION_4_FAILS_REQUIRED: u32 = 2;

/// Player count from which mission 4 needs two fail cards.
pub const MISSION_4_MIN_PLAYERS: usize = 7;

const TEAM_SIZES: [(usize, [u32; MISSION_COUNT]); 4] = [
    (5, [2, 3, 2, 3, 3]),
    (6, [2, 3, 4, 3, 4]),
    (7, [2, 3, 3, 4, 4]),
    (8, [3, 4, 4, 5, 5]),
];

/// Team sizes for missions 1..=5 at the given player count.
///
/// Player counts outside the supported range yield an empty slice rather
/// than an error, so callers can render an empty track.
pub fn team_sizes(player_count: usize) -> &'static [u32] {
    TEAM_SIZES
        .iter()
        .find(|(count, _)| *count == player_count)
        .map(|(_, sizes)| sizes.as_slice())
        .unwrap_or(&[])
}

/// Team size for a single (1-based) mission, if the lookup is defined.
pub fn team_size(player_count: usize, mission_number: u32) -> Option<u32> {
    let idx = (mission_number as usize).checked_sub(1)?;
    team_sizes(player_count).get(idx).copied()
}

/// Fail cards needed to sabotage the given mission.
pub fn fails_required(player_count: usize, mission_number: u32) -> u32 {
    if mission_number == 4 && player_count >= MISSION_4_MIN_PLAYERS {
        MISSION_4_FAILS_REQUIRED
    } else {
        1
    }
}
