//! SQLite storage for rooms, entries, poll options and votes.
//!
//! Invariants the rest of the crate relies on live here, in the schema:
//! - `UNIQUE (poll_option_id, voter_hash)` on votes
//! - cascading deletes from rooms to entries/options and from options to votes
//! - status-guarded writes (`... WHERE status = ?`) so a phase check and the
//!   write it protects are a single statement or transaction

mod entries;
mod polls;
mod rooms;
mod votes;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

pub use polls::OpenVotingOutcome;
pub use votes::VoteComment;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS rooms (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL CHECK (length(trim(title)) > 0),
        status TEXT NOT NULL DEFAULT 'collecting'
            CHECK (status IN ('collecting', 'voting', 'closed')),
        admin_token TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS entries (
        id TEXT PRIMARY KEY,
        room_id TEXT NOT NULL REFERENCES rooms (id) ON DELETE CASCADE,
        content TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_entries_room ON entries (room_id)",
    r#"
    CREATE TABLE IF NOT EXISTS poll_options (
        id TEXT PRIMARY KEY,
        room_id TEXT NOT NULL REFERENCES rooms (id) ON DELETE CASCADE,
        option_text TEXT NOT NULL,
        explanation TEXT,
        related_opinions TEXT NOT NULL DEFAULT '[]',
        created_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_poll_options_room ON poll_options (room_id)",
    r#"
    CREATE TABLE IF NOT EXISTS votes (
        id TEXT PRIMARY KEY,
        poll_option_id TEXT NOT NULL REFERENCES poll_options (id) ON DELETE CASCADE,
        voter_hash TEXT NOT NULL,
        nickname TEXT,
        comment TEXT,
        created_at TEXT NOT NULL,
        UNIQUE (poll_option_id, voter_hash)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_votes_voter ON votes (voter_hash)",
];

/// Handle to the durable store. Cheap to clone (wraps a pool).
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

fn is_in_memory(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

impl Database {
    /// Connect and create the schema if needed
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        tracing::info!("Connecting to database: {}", database_url);

        let in_memory = is_in_memory(database_url);
        let mut options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // Every connection to `:memory:` is its own database, so keep exactly one alive
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };

        let pool = pool_options.connect_with(options).await.inspect_err(|e| {
            tracing::error!("Failed to create database pool for {}: {}", database_url, e);
        })?;

        let db = Database { pool };
        db.init_tables().await?;
        tracing::info!("Database ready");

        Ok(db)
    }

    /// Fresh private in-memory database (tests, demos)
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        Self::connect("sqlite::memory:", 1).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init_tables(&self) -> Result<(), sqlx::Error> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

/// Whether a store error is a UNIQUE constraint violation
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}
