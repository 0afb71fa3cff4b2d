//! The pipeline engine: one full run, start to finish.
//!
//! EXECUTION ORDER (fixed, documented, never reordered):
//!   1. Load      all seven source tables (fatal on any failure)
//!   2. Join      sources → one row per referral
//!   3. Write     joined table (the Classifier's input contract)
//!   4. Classify  rows read back from the joined table
//!   5. Write     final table
//!   6. Record    summary counts in the run ledger
//!
//! RULES:
//!   - Each stage consumes the previous stage's output and returns a new
//!     value. No stage mutates another stage's data.
//!   - The Classifier reads the joined FILE, not the in-memory rows, so the
//!     file contract is exercised on every run.
//!   - Every stage boundary is recorded in the ledger event log.

use crate::{
    classifier::{classify, ClassificationSummary},
    config::PipelineConfig,
    error::PipelineResult,
    event::{EventLogEntry, PipelineEvent},
    joiner::{JoinStats, Joiner},
    output::{read_joined, write_classified, write_joined},
    source::{SourceTable, SourceTables},
    store::{RunStatus, RunStore},
    types::RunId,
};
use std::path::PathBuf;

/// What a completed run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: RunId,
    pub join_stats: JoinStats,
    pub summary: ClassificationSummary,
    pub joined_path: PathBuf,
    pub final_path: PathBuf,
}

pub struct PipelineEngine {
    pub run_id: RunId,
    config: PipelineConfig,
    store: RunStore,
}

impl PipelineEngine {
    pub fn new(run_id: RunId, config: PipelineConfig, store: RunStore) -> Self {
        Self {
            run_id,
            config,
            store,
        }
    }

    /// Validate the config, mint a run id, and register the run.
    /// The store must already be migrated.
    pub fn build(config: PipelineConfig, store: RunStore) -> PipelineResult<Self> {
        config.validate()?;
        let run_id = format!("run-{}", uuid::Uuid::new_v4());
        store.insert_run(&run_id, env!("CARGO_PKG_VERSION"), &now())?;
        Ok(Self::new(run_id, config, store))
    }

    /// Engine over a fresh in-memory ledger.
    pub fn build_test(config: PipelineConfig) -> PipelineResult<Self> {
        let store = RunStore::in_memory()?;
        store.migrate()?;
        Self::build(config, store)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &RunStore {
        &self.store
    }

    /// Execute every stage. On failure the run is marked failed in the
    /// ledger and the error is returned unchanged.
    pub fn run(&self) -> PipelineResult<RunReport> {
        self.record(
            "engine",
            &PipelineEvent::RunStarted {
                run_id: self.run_id.clone(),
            },
        )?;

        match self.execute() {
            Ok(report) => {
                self.store
                    .finish_run(&self.run_id, RunStatus::Completed, &now())?;
                log::info!("run {} completed", self.run_id);
                Ok(report)
            }
            Err(e) => {
                log::error!("run {} failed: {e}", self.run_id);
                // Ledger errors are dropped here; the stage error is returned.
                let _ = self.record(
                    "engine",
                    &PipelineEvent::RunFailed {
                        error: e.to_string(),
                    },
                );
                let _ = self.store.finish_run(&self.run_id, RunStatus::Failed, &now());
                Err(e)
            }
        }
    }

    fn execute(&self) -> PipelineResult<RunReport> {
        let delimiter = self.config.delimiter_byte();

        // 1. Load
        let sources = SourceTables::load(&self.config)?;
        for table in SourceTable::ALL {
            self.record(
                "load",
                &PipelineEvent::SourceLoaded {
                    table: table.name().to_string(),
                    rows: sources.row_count(table),
                },
            )?;
        }

        // 2. Join
        let outcome = Joiner::from_config(&self.config).join(&sources);
        self.record(
            "join",
            &PipelineEvent::JoinCompleted {
                stats: outcome.stats.clone(),
            },
        )?;

        // 3. Write joined
        let joined_path = self.config.joined_path();
        write_joined(&joined_path, delimiter, &outcome.rows)?;
        self.record(
            "join",
            &PipelineEvent::JoinedTableWritten {
                path: joined_path.display().to_string(),
                rows: outcome.rows.len(),
            },
        )?;

        // 4. Classify
        let joined = read_joined(&joined_path, delimiter)?;
        let classified = classify(joined);
        let summary = ClassificationSummary::from_rows(&classified);
        log::info!(
            "classification complete: total={} valid={} reward_eligible={}",
            summary.total,
            summary.valid,
            summary.reward_eligible
        );
        self.record(
            "classify",
            &PipelineEvent::ClassificationCompleted {
                summary: summary.clone(),
            },
        )?;

        // 5. Write final
        let final_path = self.config.final_path();
        write_classified(&final_path, delimiter, &classified)?;
        self.record(
            "classify",
            &PipelineEvent::FinalTableWritten {
                path: final_path.display().to_string(),
                rows: classified.len(),
            },
        )?;

        // 6. Record
        self.store.save_summary(&self.run_id, &summary)?;

        Ok(RunReport {
            run_id: self.run_id.clone(),
            join_stats: outcome.stats,
            summary,
            joined_path,
            final_path,
        })
    }

    fn record(&self, stage: &str, event: &PipelineEvent) -> PipelineResult<()> {
        let entry = EventLogEntry {
            id:         None,
            run_id:     self.run_id.clone(),
            stage:      stage.to_string(),
            event_type: event.type_name().to_string(),
            payload:    serde_json::to_string(event)?,
        };
        self.store.append_event(&entry, &now())?;
        log::debug!("{stage}: {}", entry.event_type);
        Ok(())
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}
