//! SQLite-backed checkpoint store.
//!
//! # Storage layout
//!
//! A single table `checkpoints` is created (if it does not already exist):
//!
//! | column     | type    | description                                |
//! |------------|---------|--------------------------------------------|
//! | thread_id  | TEXT    | logical session key                        |
//! | step_index | INTEGER | monotonic node-boundary counter            |
//! | node       | TEXT    | the node that completed before the save    |
//! | created_at | TEXT    | RFC-3339 timestamp (UTC)                   |
//! | state      | BLOB    | full serialized state                      |
//!
//! Primary key `(thread_id, step_index)`; a re-save of the same step
//! replaces the row, which makes replays idempotent at the storage level.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::checkpoint::{Checkpoint, CheckpointError, Checkpointer, NodeId};

/// SQLite-backed [`Checkpointer`].
pub struct SqliteCheckpointer {
    conn: Connection,
}

impl SqliteCheckpointer {
    /// Open (or create) a persistent store at `path`.
    pub fn open(path: &str) -> Result<Self, CheckpointError> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Open a temporary in-memory store (useful for testing).
    pub fn open_in_memory() -> Result<Self, CheckpointError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), CheckpointError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                thread_id  TEXT    NOT NULL,
                step_index INTEGER NOT NULL,
                node       TEXT    NOT NULL,
                created_at TEXT    NOT NULL,
                state      BLOB    NOT NULL,
                PRIMARY KEY (thread_id, step_index)
            );",
        )?;
        Ok(())
    }

    fn row_to_checkpoint(row: &rusqlite::Row<'_>) -> rusqlite::Result<Checkpoint> {
        let thread_id: String = row.get(0)?;
        let step_index: i64 = row.get(1)?;
        let node_str: String = row.get(2)?;
        let created_at_str: String = row.get(3)?;
        let state: Vec<u8> = row.get(4)?;

        let node = NodeId::from_str(&node_str).ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(2, node_str, rusqlite::types::Type::Text)
        })?;
        let created_at = created_at_str
            .parse::<DateTime<Utc>>()
            .map_err(|_| {
                rusqlite::Error::InvalidColumnType(
                    3,
                    created_at_str.clone(),
                    rusqlite::types::Type::Text,
                )
            })?;

        Ok(Checkpoint {
            thread_id,
            step_index: step_index as u64,
            node,
            created_at,
            state,
        })
    }
}

impl Checkpointer for SqliteCheckpointer {
    fn save(&mut self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO checkpoints (thread_id, step_index, node, created_at, state)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                checkpoint.thread_id,
                checkpoint.step_index as i64,
                checkpoint.node.as_str(),
                checkpoint.created_at.to_rfc3339(),
                checkpoint.state,
            ],
        )?;
        Ok(())
    }

    fn latest(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let mut stmt = self.conn.prepare(
            "SELECT thread_id, step_index, node, created_at, state
             FROM checkpoints WHERE thread_id = ?1
             ORDER BY step_index DESC LIMIT 1",
        )?;
        let mut rows = stmt.query_map(params![thread_id], Self::row_to_checkpoint)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    fn load(
        &self,
        thread_id: &str,
        step_index: u64,
    ) -> Result<Option<Checkpoint>, CheckpointError> {
        let mut stmt = self.conn.prepare(
            "SELECT thread_id, step_index, node, created_at, state
             FROM checkpoints WHERE thread_id = ?1 AND step_index = ?2",
        )?;
        let mut rows =
            stmt.query_map(params![thread_id, step_index as i64], Self::row_to_checkpoint)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    fn list(&self, thread_id: &str) -> Result<Vec<u64>, CheckpointError> {
        let mut stmt = self.conn.prepare(
            "SELECT step_index FROM checkpoints WHERE thread_id = ?1 ORDER BY step_index ASC",
        )?;
        let rows = stmt.query_map(params![thread_id], |row| {
            let step: i64 = row.get(0)?;
            Ok(step as u64)
        })?;
        let mut steps = Vec::new();
        for row in rows {
            steps.push(row?);
        }
        Ok(steps)
    }

    fn delete_thread(&mut self, thread_id: &str) -> Result<(), CheckpointError> {
        self.conn.execute(
            "DELETE FROM checkpoints WHERE thread_id = ?1",
            params![thread_id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brainstem_types::BrainState;

    fn sample(thread_id: &str, step: u64, node: NodeId) -> Checkpoint {
        let mut state = BrainState::new();
        state.react.epoch = step;
        Checkpoint::capture(thread_id, step, node, &state).unwrap()
    }

    #[test]
    fn save_and_load_roundtrip() {
        let mut store = SqliteCheckpointer::open_in_memory().unwrap();
        store.save(&sample("thread_a", 4, NodeId::Decide)).unwrap();
        let loaded = store.load("thread_a", 4).unwrap().unwrap();
        assert_eq!(loaded.node, NodeId::Decide);
        assert_eq!(loaded.restore().unwrap().react.epoch, 4);
    }

    #[test]
    fn latest_picks_highest_step() {
        let mut store = SqliteCheckpointer::open_in_memory().unwrap();
        store.save(&sample("thread_a", 0, NodeId::HciIngress)).unwrap();
        store.save(&sample("thread_a", 9, NodeId::ObserveResult)).unwrap();
        store.save(&sample("thread_a", 5, NodeId::CompileOps)).unwrap();
        let latest = store.latest("thread_a").unwrap().unwrap();
        assert_eq!(latest.step_index, 9);
    }

    #[test]
    fn resave_replaces_row() {
        let mut store = SqliteCheckpointer::open_in_memory().unwrap();
        store.save(&sample("thread_a", 2, NodeId::Decide)).unwrap();
        store.save(&sample("thread_a", 2, NodeId::CompileOps)).unwrap();
        let loaded = store.load("thread_a", 2).unwrap().unwrap();
        assert_eq!(loaded.node, NodeId::CompileOps);
        assert_eq!(store.list("thread_a").unwrap(), vec![2]);
    }

    #[test]
    fn threads_are_isolated() {
        let mut store = SqliteCheckpointer::open_in_memory().unwrap();
        store.save(&sample("thread_a", 0, NodeId::HciIngress)).unwrap();
        assert!(store.latest("thread_b").unwrap().is_none());
    }

    #[test]
    fn delete_thread_clears_rows() {
        let mut store = SqliteCheckpointer::open_in_memory().unwrap();
        store.save(&sample("thread_a", 0, NodeId::HciIngress)).unwrap();
        store.save(&sample("thread_a", 1, NodeId::TelemetrySync)).unwrap();
        store.delete_thread("thread_a").unwrap();
        assert!(store.list("thread_a").unwrap().is_empty());
    }

    #[test]
    fn persists_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoints.db");
        let path = path.to_str().unwrap();
        {
            let mut store = SqliteCheckpointer::open(path).unwrap();
            store
                .save(&sample("thread_a", 3, NodeId::DispatchSkills))
                .unwrap();
        }
        let store = SqliteCheckpointer::open(path).unwrap();
        let latest = store.latest("thread_a").unwrap().unwrap();
        assert_eq!(latest.step_index, 3);
        assert_eq!(latest.node, NodeId::DispatchSkills);
    }
}
