// SPDX-FileCopyrightText: 2026 Mnemon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and migrations.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread. Do NOT create additional Connection instances for writes.

use mnemon_core::MnemonError;
use tokio_rusqlite::Connection;
use tracing::debug;

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Owned handle to the engine's SQLite database.
#[derive(Clone)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens (or creates) the database at `path`, applies PRAGMAs and runs
    /// all pending migrations.
    pub async fn open(path: &str) -> Result<Self, MnemonError> {
        let conn = Connection::open(path).await.map_err(map_tr_err)?;
        Self::initialize(conn, path).await
    }

    /// Opens an in-memory database with the full schema, for tests.
    pub async fn open_in_memory() -> Result<Self, MnemonError> {
        let conn = Connection::open_in_memory().await.map_err(map_tr_err)?;
        Self::initialize(conn, ":memory:").await
    }

    async fn initialize(conn: Connection, path: &str) -> Result<Self, MnemonError> {
        conn.call(|conn| {
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            conn.busy_timeout(std::time::Duration::from_millis(5000))?;
            embedded::migrations::runner()
                .run(conn)
                .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        debug!(path, "database opened and migrated");
        Ok(Self { conn })
    }

    /// The underlying serialized connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Closes the connection, flushing pending writes.
    pub async fn close(self) -> Result<(), MnemonError> {
        self.conn
            .close()
            .await
            .map_err(|e| match e {
                tokio_rusqlite::Error::Close((_, e)) => map_rusqlite_err(e),
                other => map_tr_err(other),
            })
    }
}

/// Map a tokio-rusqlite error into the engine taxonomy.
///
/// Busy/locked conditions are retryable; everything else coming out of the
/// storage layer is an integrity or schema problem.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error) -> MnemonError {
    match e {
        tokio_rusqlite::Error::Rusqlite(e) => map_rusqlite_err(e),
        tokio_rusqlite::Error::ConnectionClosed => {
            MnemonError::transient("storage connection closed")
        }
        other => MnemonError::Fatal {
            message: "storage failure".to_string(),
            source: Some(Box::new(other)),
        },
    }
}

pub(crate) fn map_rusqlite_err(e: rusqlite::Error) -> MnemonError {
    let busy = matches!(
        &e,
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::DatabaseBusy
                || f.code == rusqlite::ErrorCode::DatabaseLocked
    );
    if busy {
        MnemonError::Transient {
            message: "database busy".to_string(),
            source: Some(Box::new(e)),
        }
    } else {
        MnemonError::Fatal {
            message: "storage failure".to_string(),
            source: Some(Box::new(e)),
        }
    }
}
