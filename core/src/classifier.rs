//! Classifier: validity and reward eligibility per joined referral.
//!
//! RULE CHAIN (fixed order, first failure wins):
//!   1. no_transaction               gated: only rows still valid
//!   2. transaction_not_paid         gated
//!   3. referrer_deleted             gated
//!   4. transaction_before_referral  UNGATED: checked on every row and
//!                                   overrides any reason set by 1-3
//!
//! The chain lives in `VALIDITY_RULES` as data. Reordering or re-gating a
//! rule is a one-line change there.
//!
//! A row is reward eligible iff it is valid after all rules AND has a
//! reward value.

use crate::{joiner::JoinedReferral, types::PAID_STATUS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    NoTransaction,
    TransactionNotPaid,
    ReferrerDeleted,
    TransactionBeforeReferral,
}

impl InvalidReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoTransaction => "no_transaction",
            Self::TransactionNotPaid => "transaction_not_paid",
            Self::ReferrerDeleted => "referrer_deleted",
            Self::TransactionBeforeReferral => "transaction_before_referral",
        }
    }
}

/// When a rule is allowed to fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleGate {
    /// Only on rows no earlier rule has invalidated.
    WhileValid,
    /// On every row, replacing any earlier reason.
    Always,
}

pub struct ValidityRule {
    pub reason: InvalidReason,
    pub gate: RuleGate,
    /// Returns true when the row breaks this rule.
    pub violated: fn(&JoinedReferral) -> bool,
}

pub const VALIDITY_RULES: [ValidityRule; 4] = [
    ValidityRule {
        reason: InvalidReason::NoTransaction,
        gate: RuleGate::WhileValid,
        violated: has_no_transaction,
    },
    ValidityRule {
        reason: InvalidReason::TransactionNotPaid,
        gate: RuleGate::WhileValid,
        violated: transaction_not_paid,
    },
    ValidityRule {
        reason: InvalidReason::ReferrerDeleted,
        gate: RuleGate::WhileValid,
        violated: referrer_deleted,
    },
    ValidityRule {
        reason: InvalidReason::TransactionBeforeReferral,
        gate: RuleGate::Always,
        violated: transaction_before_referral,
    },
];

fn has_no_transaction(row: &JoinedReferral) -> bool {
    row.transaction_id.is_none()
}

// A null status is not "PAID".
fn transaction_not_paid(row: &JoinedReferral) -> bool {
    row.transaction_status.as_deref() != Some(PAID_STATUS)
}

fn referrer_deleted(row: &JoinedReferral) -> bool {
    row.referrer_is_deleted == Some(true)
}

fn transaction_before_referral(row: &JoinedReferral) -> bool {
    match (row.transaction_at, row.referral_at) {
        (Some(txn), Some(referral)) => txn.instant() < referral.instant(),
        _ => false,
    }
}

/// Header names of the three output columns.
pub const CLASSIFICATION_COLUMNS: [&str; 3] =
    ["is_valid_referral", "invalid_reason", "is_reward_eligible"];

/// The three output columns, in file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub is_valid_referral: bool,
    /// Written as an empty field when the row is valid.
    pub invalid_reason: Option<InvalidReason>,
    pub is_reward_eligible: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedReferral {
    pub referral: JoinedReferral,
    pub outcome: Classification,
}

/// Run the rule chain over one row.
pub fn classify_row(row: &JoinedReferral) -> Classification {
    let mut reason: Option<InvalidReason> = None;
    for rule in &VALIDITY_RULES {
        let eligible = match rule.gate {
            RuleGate::WhileValid => reason.is_none(),
            RuleGate::Always => true,
        };
        if eligible && (rule.violated)(row) {
            reason = Some(rule.reason);
        }
    }
    let is_valid_referral = reason.is_none();
    Classification {
        is_valid_referral,
        invalid_reason: reason,
        is_reward_eligible: is_valid_referral && row.reward_value.is_some(),
    }
}

/// Classify every row. Never drops a row.
pub fn classify(rows: Vec<JoinedReferral>) -> Vec<ClassifiedReferral> {
    rows.into_iter()
        .map(|referral| {
            let outcome = classify_row(&referral);
            ClassifiedReferral { referral, outcome }
        })
        .collect()
}

/// End-of-run counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationSummary {
    pub total: usize,
    pub valid: usize,
    pub reward_eligible: usize,
    pub invalid_by_reason: BTreeMap<InvalidReason, usize>,
}

impl ClassificationSummary {
    pub fn from_rows(rows: &[ClassifiedReferral]) -> Self {
        let mut summary = Self {
            total: rows.len(),
            ..Self::default()
        };
        for row in rows {
            let outcome = &row.outcome;
            if outcome.is_valid_referral {
                summary.valid += 1;
            }
            if outcome.is_reward_eligible {
                summary.reward_eligible += 1;
            }
            if let Some(reason) = outcome.invalid_reason {
                *summary.invalid_by_reason.entry(reason).or_default() += 1;
            }
        }
        summary
    }

    pub fn invalid(&self) -> usize {
        self.total - self.valid
    }

    pub fn count_for(&self, reason: InvalidReason) -> usize {
        self.invalid_by_reason.get(&reason).copied().unwrap_or(0)
    }
}
