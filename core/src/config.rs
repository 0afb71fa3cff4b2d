use crate::{
    error::{PipelineError, PipelineResult},
    source::SourceTable,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which timezone `referral_at_local` is computed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimezoneScope {
    /// Each row uses its own referrer's timezone.
    #[default]
    PerReferrer,
    /// Every row uses the first referrer timezone found in the joined table.
    FirstReferrer,
}

/// How a referral time without a UTC offset is read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NaiveTimePolicy {
    /// The value is a UTC instant.
    #[default]
    AssumeUtc,
    /// The value is wall-clock time in the referrer's zone. DST gaps and
    /// overlaps produce a null local time.
    ReferrerWallClock,
}

/// File names of the seven source tables, relative to `data_dir`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceFiles {
    pub referrals: String,
    pub statuses: String,
    pub rewards: String,
    pub transactions: String,
    pub user_logs: String,
    pub referral_logs: String,
    pub lead_logs: String,
}

impl Default for SourceFiles {
    fn default() -> Self {
        Self {
            referrals: "user_referrals.csv".into(),
            statuses: "user_referral_statuses.csv".into(),
            rewards: "referral_rewards.csv".into(),
            transactions: "paid_transactions.csv".into(),
            user_logs: "user_logs.csv".into(),
            referral_logs: "user_referral_logs.csv".into(),
            lead_logs: "lead_log.csv".into(),
        }
    }
}

impl SourceFiles {
    pub fn file_name(&self, table: SourceTable) -> &str {
        match table {
            SourceTable::Referrals => &self.referrals,
            SourceTable::Statuses => &self.statuses,
            SourceTable::Rewards => &self.rewards,
            SourceTable::Transactions => &self.transactions,
            SourceTable::UserLogs => &self.user_logs,
            SourceTable::ReferralLogs => &self.referral_logs,
            SourceTable::LeadLogs => &self.lead_logs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub sources: SourceFiles,
    /// Joiner output, the Classifier's only input.
    pub joined_file: String,
    pub final_file: String,
    pub delimiter: char,
    pub timezone_scope: TimezoneScope,
    pub naive_time: NaiveTimePolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::for_dirs("./data", "./output")
    }
}

impl PipelineConfig {
    /// Default file layout under the given directories.
    pub fn for_dirs(data_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            output_dir: output_dir.into(),
            sources: SourceFiles::default(),
            joined_file: "preprocessed_referrals.csv".into(),
            final_file: "final_referral_results.csv".into(),
            delimiter: ',',
            timezone_scope: TimezoneScope::default(),
            naive_time: NaiveTimePolicy::default(),
        }
    }

    /// Load from a JSON file. Absent keys take their defaults.
    pub fn load(path: &Path) -> PipelineResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {}: {e}", path.display()))?;
        let config: PipelineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if !self.delimiter.is_ascii() {
            return Err(PipelineError::Config(format!(
                "delimiter must be a single ASCII character, got {:?}",
                self.delimiter
            )));
        }
        if self.joined_file == self.final_file {
            return Err(PipelineError::Config(
                "joined_file and final_file must differ".into(),
            ));
        }
        Ok(())
    }

    pub fn delimiter_byte(&self) -> u8 {
        self.delimiter as u8
    }

    pub fn source_path(&self, table: SourceTable) -> PathBuf {
        self.data_dir.join(self.sources.file_name(table))
    }

    pub fn joined_path(&self) -> PathBuf {
        self.output_dir.join(&self.joined_file)
    }

    pub fn final_path(&self) -> PathBuf {
        self.output_dir.join(&self.final_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{ "data_dir": "/srv/in", "timezone_scope": "first_referrer",
                 "sources": { "lead_logs": "leads.csv" } }"#,
        )
        .unwrap();
        assert_eq!(config.timezone_scope, TimezoneScope::FirstReferrer);
        assert_eq!(config.naive_time, NaiveTimePolicy::AssumeUtc);
        assert_eq!(config.source_path(SourceTable::LeadLogs), PathBuf::from("/srv/in/leads.csv"));
        assert_eq!(
            config.source_path(SourceTable::Referrals),
            PathBuf::from("/srv/in/user_referrals.csv")
        );
        assert_eq!(config.final_path(), PathBuf::from("./output/final_referral_results.csv"));
    }

    #[test]
    fn rejects_non_ascii_delimiter() {
        let config = PipelineConfig {
            delimiter: '§',
            ..PipelineConfig::default()
        };
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }
}
