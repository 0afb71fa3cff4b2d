//! Source tables: typed rows and the delimited-file loader.
//!
//! RULE: loading is all-or-nothing per run. A missing file, a missing key
//! column, or a structurally broken file aborts the run. Individual bad
//! fields decode to `None` (see field.rs).

use crate::{
    config::PipelineConfig,
    error::{PipelineError, PipelineResult},
    field,
    output::write_rows,
    timestamp::Timestamp,
    types::EntityId,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::Path;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceTable {
    Referrals,
    Statuses,
    Rewards,
    Transactions,
    UserLogs,
    ReferralLogs,
    LeadLogs,
}

impl SourceTable {
    pub const ALL: [SourceTable; 7] = [
        SourceTable::Referrals,
        SourceTable::Statuses,
        SourceTable::Rewards,
        SourceTable::Transactions,
        SourceTable::UserLogs,
        SourceTable::ReferralLogs,
        SourceTable::LeadLogs,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Referrals => "user_referrals",
            Self::Statuses => "user_referral_statuses",
            Self::Rewards => "referral_rewards",
            Self::Transactions => "paid_transactions",
            Self::UserLogs => "user_logs",
            Self::ReferralLogs => "user_referral_logs",
            Self::LeadLogs => "lead_logs",
        }
    }

    /// Header of the file, in the field order of its row type.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Self::Referrals => &[
                "referral_id",
                "referral_source",
                "referral_at",
                "referrer_id",
                "referee_id",
                "referee_name",
                "referee_phone",
                "referral_reward_id",
                "transaction_id",
                "updated_at",
                "user_referral_status_id",
            ],
            Self::Statuses => &["id", "description", "created_at"],
            Self::Rewards => &["id", "reward_value", "reward_type", "created_at"],
            Self::Transactions => &[
                "transaction_id",
                "transaction_status",
                "transaction_at",
                "transaction_location",
                "transaction_type",
            ],
            Self::UserLogs => &[
                "user_id",
                "name",
                "phone_number",
                "homeclub",
                "timezone_homeclub",
                "membership_expired_date",
                "is_deleted",
            ],
            Self::ReferralLogs => &[
                "id",
                "user_referral_id",
                "source_transaction_id",
                "created_at",
                "is_reward_granted",
            ],
            Self::LeadLogs => &[
                "lead_id",
                "source_category",
                "preferred_location",
                "timezone_location",
                "current_status",
                "created_at",
            ],
        }
    }

    /// The column a file must have for its rows to be joinable.
    pub fn key_column(&self) -> &'static str {
        match self {
            Self::Referrals => "referral_id",
            Self::Statuses | Self::Rewards | Self::ReferralLogs => "id",
            Self::Transactions => "transaction_id",
            Self::UserLogs => "user_id",
            Self::LeadLogs => "lead_id",
        }
    }
}

// ── Row types ─────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferralRecord {
    #[serde(deserialize_with = "field::required_key")]
    pub referral_id: EntityId,
    #[serde(deserialize_with = "field::text")]
    pub referral_source: Option<String>,
    #[serde(deserialize_with = "field::timestamp")]
    pub referral_at: Option<Timestamp>,
    #[serde(deserialize_with = "field::key")]
    pub referrer_id: Option<EntityId>,
    #[serde(deserialize_with = "field::key")]
    pub referee_id: Option<EntityId>,
    #[serde(deserialize_with = "field::text")]
    pub referee_name: Option<String>,
    #[serde(deserialize_with = "field::text")]
    pub referee_phone: Option<String>,
    #[serde(deserialize_with = "field::key")]
    pub referral_reward_id: Option<EntityId>,
    #[serde(deserialize_with = "field::key")]
    pub transaction_id: Option<EntityId>,
    #[serde(deserialize_with = "field::timestamp")]
    pub updated_at: Option<Timestamp>,
    #[serde(deserialize_with = "field::key")]
    pub user_referral_status_id: Option<EntityId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferralStatusRecord {
    #[serde(deserialize_with = "field::key")]
    pub id: Option<EntityId>,
    #[serde(deserialize_with = "field::text")]
    pub description: Option<String>,
    #[serde(deserialize_with = "field::timestamp")]
    pub created_at: Option<Timestamp>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardRecord {
    #[serde(deserialize_with = "field::key")]
    pub id: Option<EntityId>,
    #[serde(deserialize_with = "field::number")]
    pub reward_value: Option<f64>,
    #[serde(deserialize_with = "field::text")]
    pub reward_type: Option<String>,
    #[serde(deserialize_with = "field::timestamp")]
    pub created_at: Option<Timestamp>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionRecord {
    #[serde(deserialize_with = "field::key")]
    pub transaction_id: Option<EntityId>,
    #[serde(deserialize_with = "field::text")]
    pub transaction_status: Option<String>,
    #[serde(deserialize_with = "field::timestamp")]
    pub transaction_at: Option<Timestamp>,
    #[serde(deserialize_with = "field::text")]
    pub transaction_location: Option<String>,
    #[serde(deserialize_with = "field::text")]
    pub transaction_type: Option<String>,
}

/// One snapshot of a user's profile. A user id may appear many times.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserLogRecord {
    #[serde(deserialize_with = "field::key")]
    pub user_id: Option<EntityId>,
    #[serde(deserialize_with = "field::text")]
    pub name: Option<String>,
    #[serde(deserialize_with = "field::text")]
    pub phone_number: Option<String>,
    #[serde(deserialize_with = "field::text")]
    pub homeclub: Option<String>,
    #[serde(deserialize_with = "field::text")]
    pub timezone_homeclub: Option<String>,
    #[serde(deserialize_with = "field::timestamp")]
    pub membership_expired_date: Option<Timestamp>,
    #[serde(deserialize_with = "field::flag")]
    pub is_deleted: Option<bool>,
}

/// Referral status change log. Loaded with the rest, not joined.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferralLogRecord {
    #[serde(deserialize_with = "field::key")]
    pub id: Option<EntityId>,
    #[serde(deserialize_with = "field::key")]
    pub user_referral_id: Option<EntityId>,
    #[serde(deserialize_with = "field::key")]
    pub source_transaction_id: Option<EntityId>,
    #[serde(deserialize_with = "field::timestamp")]
    pub created_at: Option<Timestamp>,
    #[serde(deserialize_with = "field::flag")]
    pub is_reward_granted: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeadLogRecord {
    #[serde(deserialize_with = "field::key")]
    pub lead_id: Option<EntityId>,
    #[serde(deserialize_with = "field::text")]
    pub source_category: Option<String>,
    #[serde(deserialize_with = "field::text")]
    pub preferred_location: Option<String>,
    #[serde(deserialize_with = "field::text")]
    pub timezone_location: Option<String>,
    #[serde(deserialize_with = "field::text")]
    pub current_status: Option<String>,
    #[serde(deserialize_with = "field::timestamp")]
    pub created_at: Option<Timestamp>,
}

/// Every source table for one run, in input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceTables {
    pub referrals: Vec<ReferralRecord>,
    pub statuses: Vec<ReferralStatusRecord>,
    pub rewards: Vec<RewardRecord>,
    pub transactions: Vec<TransactionRecord>,
    pub user_logs: Vec<UserLogRecord>,
    pub referral_logs: Vec<ReferralLogRecord>,
    pub lead_logs: Vec<LeadLogRecord>,
}

impl SourceTables {
    /// Load all seven tables. Fails on the first table that cannot be read.
    pub fn load(config: &PipelineConfig) -> PipelineResult<Self> {
        Ok(Self {
            referrals: load_table(config, SourceTable::Referrals)?,
            statuses: load_table(config, SourceTable::Statuses)?,
            rewards: load_table(config, SourceTable::Rewards)?,
            transactions: load_table(config, SourceTable::Transactions)?,
            user_logs: load_table(config, SourceTable::UserLogs)?,
            referral_logs: load_table(config, SourceTable::ReferralLogs)?,
            lead_logs: load_table(config, SourceTable::LeadLogs)?,
        })
    }

    pub fn row_count(&self, table: SourceTable) -> usize {
        match table {
            SourceTable::Referrals => self.referrals.len(),
            SourceTable::Statuses => self.statuses.len(),
            SourceTable::Rewards => self.rewards.len(),
            SourceTable::Transactions => self.transactions.len(),
            SourceTable::UserLogs => self.user_logs.len(),
            SourceTable::ReferralLogs => self.referral_logs.len(),
            SourceTable::LeadLogs => self.lead_logs.len(),
        }
    }

    /// Write every table under `config.data_dir` using the configured names.
    /// Used to materialize synthetic fixtures.
    pub fn write_all(&self, config: &PipelineConfig) -> PipelineResult<()> {
        std::fs::create_dir_all(&config.data_dir)?;
        store_table(config, SourceTable::Referrals, &self.referrals)?;
        store_table(config, SourceTable::Statuses, &self.statuses)?;
        store_table(config, SourceTable::Rewards, &self.rewards)?;
        store_table(config, SourceTable::Transactions, &self.transactions)?;
        store_table(config, SourceTable::UserLogs, &self.user_logs)?;
        store_table(config, SourceTable::ReferralLogs, &self.referral_logs)?;
        store_table(config, SourceTable::LeadLogs, &self.lead_logs)?;
        Ok(())
    }
}

fn load_table<T: DeserializeOwned>(
    config: &PipelineConfig,
    table: SourceTable,
) -> PipelineResult<Vec<T>> {
    read_table(table, &config.source_path(table), config.delimiter_byte())
}

fn store_table<T: Serialize>(
    config: &PipelineConfig,
    table: SourceTable,
    rows: &[T],
) -> PipelineResult<()> {
    write_table(table, &config.source_path(table), config.delimiter_byte(), rows)
}

/// Read one delimited file into typed rows.
pub fn read_table<T: DeserializeOwned>(
    table: SourceTable,
    path: &Path,
    delimiter: u8,
) -> PipelineResult<Vec<T>> {
    if !path.is_file() {
        return Err(PipelineError::MissingSource {
            table: table.name(),
            path: path.to_path_buf(),
        });
    }
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(PipelineError::csv(table.name()))?;

    let headers = reader.headers().map_err(PipelineError::csv(table.name()))?;
    if !headers.iter().any(|h| h == table.key_column()) {
        return Err(PipelineError::MissingColumn {
            table: table.name(),
            column: table.key_column(),
        });
    }

    let rows = reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(PipelineError::csv(table.name()))?;
    log::info!("{} loaded, rows = {}", table.name(), rows.len());
    Ok(rows)
}

fn write_table<T: Serialize>(
    table: SourceTable,
    path: &Path,
    delimiter: u8,
    rows: &[T],
) -> PipelineResult<()> {
    write_rows(path, delimiter, table.name(), table.columns(), rows)?;
    Ok(())
}
