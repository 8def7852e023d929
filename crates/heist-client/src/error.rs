// Error kinds surfaced by the client. None of them are fatal: the worst case
// is returning to the logged-out home page.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Input rejected locally; never sent to the server.
    #[error("{0}")]
    Validation(String),

    /// The server could not be reached.
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-success status. `message` is the
    /// server's own explanation and is what the user sees.
    #[error("{message}")]
    ServerRejected { status: u16, message: String },

    /// A stored session no longer contains this player.
    #[error("session {game_id} no longer contains this player")]
    StaleIdentity { game_id: String },

    /// A response body did not match the expected shape.
    #[error("unexpected response from server: {0}")]
    Decode(String),

    /// The local session store failed.
    #[error("session storage error: {0}")]
    Storage(String),
}

impl ClientError {
    pub fn validation(message: impl Into<String>) -> Self {
        ClientError::Validation(message.into())
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else {
            ClientError::Network(err.to_string())
        }
    }
}

impl From<anyhow::Error> for ClientError {
    fn from(err: anyhow::Error) -> Self {
        ClientError::Storage(format!("{err:#}"))
    }
}
