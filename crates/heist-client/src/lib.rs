// Library root: the synchronization engine and its collaborators (config,
// session store, command API, push connection, event loop).

pub mod api;
pub mod app;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod store;

#[cfg(test)]
mod testing;

pub use engine::{Action, ResumeOutcome, SyncEngine};
pub use error::ClientError;
