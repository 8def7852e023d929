// Pure game-side logic for the heist client: the snapshot data model, the
// rule table, and the resolvers that turn snapshots into pages and cues.

pub mod board;
pub mod cues;
pub mod page;
pub mod rules;
pub mod snapshot;

pub use cues::{diff_cues, Cue, CueTracker};
pub use page::{resolve_action, resolve_page, ActionView, Page, WaitingBanner};
pub use snapshot::{GameId, GameSnapshot, PlayerId};
