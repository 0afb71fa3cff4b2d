//! Run events: what the ledger records about each stage.
//!
//! RULE: every stage boundary emits exactly one event.
//! Variants are append-only; the JSON payloads are read back by tooling.

use crate::{
    classifier::ClassificationSummary,
    joiner::JoinStats,
    types::RunId,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    RunStarted {
        run_id: RunId,
    },
    SourceLoaded {
        table: String,
        rows: usize,
    },
    JoinCompleted {
        stats: JoinStats,
    },
    JoinedTableWritten {
        path: String,
        rows: usize,
    },
    ClassificationCompleted {
        summary: ClassificationSummary,
    },
    FinalTableWritten {
        path: String,
        rows: usize,
    },
    RunFailed {
        error: String,
    },
}

impl PipelineEvent {
    /// Stable name for the event_type column.
    pub fn type_name(&self) -> &'static str {
        match self {
            PipelineEvent::RunStarted { .. }              => "run_started",
            PipelineEvent::SourceLoaded { .. }            => "source_loaded",
            PipelineEvent::JoinCompleted { .. }           => "join_completed",
            PipelineEvent::JoinedTableWritten { .. }      => "joined_table_written",
            PipelineEvent::ClassificationCompleted { .. } => "classification_completed",
            PipelineEvent::FinalTableWritten { .. }       => "final_table_written",
            PipelineEvent::RunFailed { .. }               => "run_failed",
        }
    }
}

/// A persisted event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id:         Option<i64>,
    pub run_id:     RunId,
    pub stage:      String,
    pub event_type: String,
    pub payload:    String,
}

impl EventLogEntry {
    pub fn decode(&self) -> serde_json::Result<PipelineEvent> {
        serde_json::from_str(&self.payload)
    }
}
