//! SQLite run ledger.
//!
//! RULE: Only store.rs talks to the database.
//! The engine calls store methods; it never executes SQL directly.
//! The ledger records run metadata and counts, never result rows.

use crate::{
    classifier::ClassificationSummary,
    error::PipelineResult,
    event::EventLogEntry,
};
use rusqlite::{params, Connection, OptionalExtension};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running   => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed    => "failed",
        }
    }
}

pub struct RunStore {
    conn: Connection,
}

impl RunStore {
    /// Open (or create) the ledger at `path`. Accepts SQLite URIs.
    pub fn open(path: &str) -> PipelineResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (:memory: ignores it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory ledger (used in tests).
    pub fn in_memory() -> PipelineResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> PipelineResult<()> {
        self.conn
            .execute_batch(include_str!("../../migrations/001_runs.sql"))?;
        Ok(())
    }

    // ── Run ────────────────────────────────────────────────────

    pub fn insert_run(&self, run_id: &str, version: &str, started_at: &str) -> PipelineResult<()> {
        self.conn.execute(
            "INSERT INTO run (run_id, version, started_at, status) VALUES (?1, ?2, ?3, ?4)",
            params![run_id, version, started_at, RunStatus::Running.as_str()],
        )?;
        Ok(())
    }

    pub fn finish_run(
        &self,
        run_id: &str,
        status: RunStatus,
        completed_at: &str,
    ) -> PipelineResult<()> {
        self.conn.execute(
            "UPDATE run SET status = ?1, completed_at = ?2 WHERE run_id = ?3",
            params![status.as_str(), completed_at, run_id],
        )?;
        Ok(())
    }

    pub fn run_status(&self, run_id: &str) -> PipelineResult<Option<String>> {
        let status = self
            .conn
            .query_row(
                "SELECT status FROM run WHERE run_id = ?1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(status)
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(&self, entry: &EventLogEntry, created_at: &str) -> PipelineResult<()> {
        self.conn.execute(
            "INSERT INTO event_log (run_id, stage, event_type, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.run_id,
                entry.stage,
                entry.event_type,
                entry.payload,
                created_at,
            ],
        )?;
        Ok(())
    }

    pub fn events_for_run(&self, run_id: &str) -> PipelineResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_id, stage, event_type, payload
             FROM event_log WHERE run_id = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![run_id], |row| {
                Ok(EventLogEntry {
                    id:         Some(row.get(0)?),
                    run_id:     row.get(1)?,
                    stage:      row.get(2)?,
                    event_type: row.get(3)?,
                    payload:    row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    // ── Summary ────────────────────────────────────────────────

    pub fn save_summary(&self, run_id: &str, summary: &ClassificationSummary) -> PipelineResult<()> {
        let by_reason = serde_json::to_string(&summary.invalid_by_reason)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO run_summary
                (run_id, total_rows, valid_rows, reward_eligible_rows, invalid_by_reason)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                run_id,
                summary.total as i64,
                summary.valid as i64,
                summary.reward_eligible as i64,
                by_reason,
            ],
        )?;
        Ok(())
    }

    pub fn summary_for_run(&self, run_id: &str) -> PipelineResult<Option<ClassificationSummary>> {
        let row = self
            .conn
            .query_row(
                "SELECT total_rows, valid_rows, reward_eligible_rows, invalid_by_reason
                 FROM run_summary WHERE run_id = ?1",
                params![run_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((total, valid, eligible, by_reason)) => Ok(Some(ClassificationSummary {
                total:             total as usize,
                valid:             valid as usize,
                reward_eligible:   eligible as usize,
                invalid_by_reason: serde_json::from_str(&by_reason)?,
            })),
        }
    }
}
