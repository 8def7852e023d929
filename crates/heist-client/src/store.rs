// SQLite persistence for the client identity: durable preferences and the
// session-scoped game/player pair used to resume after a restart.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

/// Environment variable that pins the session scope key.
pub const SESSION_SCOPE_ENV: &str = "HEIST_SESSION_SCOPE";

/// Volume used until the player picks one.
pub const DEFAULT_VOLUME: f64 = 0.5;

const PLAYER_NAME_KEY: &str = "player_name";
const VOLUME_KEY: &str = "volume";
const GAME_ID_KEY: &str = "game_id";
const PLAYER_ID_KEY: &str = "player_id";

/// Two key/value scopes in one database.
///
/// `preferences` outlives every session. `session_identity` rows are tagged
/// with a scope key; opening the store with a different key purges them, so
/// only a restart within the same scope can resume.
pub struct SessionStore {
    conn: Mutex<Connection>,
    scope: String,
}

impl SessionStore {
    /// Open (or create) the store at `path`. Pass `":memory:"` for an
    /// ephemeral store.
    pub fn open(path: &str, scope: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open session store at {path}"))?;

        conn.execute_batch("PRAGMA busy_timeout = 5000;")
            .context("failed to set session store pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS preferences (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS session_identity (
                scope TEXT NOT NULL,
                key   TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (scope, key)
            );
            ",
        )
        .context("failed to create session store schema")?;

        let purged = conn
            .execute(
                "DELETE FROM session_identity WHERE scope <> ?1",
                params![scope],
            )
            .context("failed to purge foreign session scopes")?;
        if purged > 0 {
            tracing::debug!(purged, scope, "dropped session identity from another scope");
        }

        Ok(Self {
            conn: Mutex::new(conn),
            scope: scope.to_string(),
        })
    }

    /// Open the store at a filesystem path, creating parent directories.
    pub fn open_file(path: &Path, scope: &str) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create store directory {}", parent.display())
                })?;
            }
        }
        Self::open(&path.to_string_lossy(), scope)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("session store mutex poisoned")
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    // ------------------------------------------------------------------
    // Durable preferences
    // ------------------------------------------------------------------

    fn save_preference(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        let json_str =
            serde_json::to_string(value).context("failed to serialize preference")?;
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO preferences (key, value) VALUES (?1, ?2)",
                params![key, json_str],
            )
            .context("failed to save preference")?;
        Ok(())
    }

    fn load_preference(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let raw: Option<String> = self
            .conn()
            .query_row(
                "SELECT value FROM preferences WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .context("failed to query preference")?;
        raw.map(|s| serde_json::from_str(&s).context("failed to deserialize preference"))
            .transpose()
    }

    /// Last display name the player used, if any.
    pub fn player_name(&self) -> Result<Option<String>> {
        Ok(self
            .load_preference(PLAYER_NAME_KEY)?
            .and_then(|v| v.as_str().map(str::to_string)))
    }

    pub fn set_player_name(&self, name: &str) -> Result<()> {
        self.save_preference(PLAYER_NAME_KEY, &serde_json::Value::from(name))
    }

    /// Output volume in `0.0..=1.0`; [`DEFAULT_VOLUME`] when unset.
    pub fn volume(&self) -> Result<f64> {
        Ok(self
            .load_preference(VOLUME_KEY)?
            .and_then(|v| v.as_f64())
            .unwrap_or(DEFAULT_VOLUME))
    }

    /// Persist the volume, clamped into `0.0..=1.0`. Returns the stored value.
    pub fn set_volume(&self, volume: f64) -> Result<f64> {
        let volume = if volume.is_finite() {
            volume.clamp(0.0, 1.0)
        } else {
            DEFAULT_VOLUME
        };
        self.save_preference(VOLUME_KEY, &serde_json::Value::from(volume))?;
        Ok(volume)
    }

    // ------------------------------------------------------------------
    // Session identity
    // ------------------------------------------------------------------

    fn save_identity_value(&self, key: &str, value: &str) -> Result<()> {
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO session_identity (scope, key, value) VALUES (?1, ?2, ?3)",
                params![self.scope, key, value],
            )
            .with_context(|| format!("failed to save session {key}"))?;
        Ok(())
    }

    fn load_identity_value(&self, key: &str) -> Result<Option<String>> {
        self.conn()
            .query_row(
                "SELECT value FROM session_identity WHERE scope = ?1 AND key = ?2",
                params![self.scope, key],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("failed to load session {key}"))
    }

    pub fn save_game_id(&self, game_id: &str) -> Result<()> {
        self.save_identity_value(GAME_ID_KEY, game_id)
    }

    pub fn save_player_id(&self, player_id: &str) -> Result<()> {
        self.save_identity_value(PLAYER_ID_KEY, player_id)
    }

    /// Store both halves of the identity in one transaction.
    pub fn save_identity(&self, game_id: &str, player_id: &str) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin transaction")?;
        for (key, value) in [(GAME_ID_KEY, game_id), (PLAYER_ID_KEY, player_id)] {
            tx.execute(
                "INSERT OR REPLACE INTO session_identity (scope, key, value) VALUES (?1, ?2, ?3)",
                params![self.scope, key, value],
            )
            .with_context(|| format!("failed to save session {key}"))?;
        }
        tx.commit().context("failed to commit session identity")?;
        Ok(())
    }

    /// The stored `(game_id, player_id)` pair. A half-written pair counts
    /// as nothing stored.
    pub fn load_identity(&self) -> Result<Option<(String, String)>> {
        let game_id = self.load_identity_value(GAME_ID_KEY)?;
        let player_id = self.load_identity_value(PLAYER_ID_KEY)?;
        Ok(game_id.zip(player_id))
    }

    /// Forget the session identity. Preferences are kept.
    pub fn clear_session(&self) -> Result<()> {
        self.conn()
            .execute(
                "DELETE FROM session_identity WHERE scope = ?1",
                params![self.scope],
            )
            .context("failed to clear session identity")?;
        Ok(())
    }
}

/// Scope key for this run: [`SESSION_SCOPE_ENV`] if set, else the parent
/// process id (the launching shell), else `"default"`.
pub fn session_scope() -> String {
    if let Ok(scope) = std::env::var(SESSION_SCOPE_ENV) {
        if !scope.trim().is_empty() {
            return scope.trim().to_string();
        }
    }
    parent_scope().unwrap_or_else(|| "default".to_string())
}

#[cfg(unix)]
fn parent_scope() -> Option<String> {
    Some(format!("ppid-{}", std::os::unix::process::parent_id()))
}

#[cfg(not(unix))]
fn parent_scope() -> Option<String> {
    None
}
