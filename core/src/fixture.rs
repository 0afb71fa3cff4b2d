//! Synthetic source tables.
//!
//! Generates a complete, deterministic `SourceTables` set from a seed.
//! The mix is chosen to hit every rule and join edge case: repeated user
//! snapshots, repeated leads, missing and dangling transaction ids, unpaid
//! and null statuses, deleted referrers, transactions dated before their
//! referral, rewards without a value, and timezone names that do not exist.
//!
//! RULE: each generated table draws from its own `Pcg64Mcg` stream, keyed by
//! its `FixtureTable` slot. Adding a table never changes the rows generated
//! for the existing ones.

use crate::{
    joiner::{OFFLINE_SOURCE, ONLINE_SOURCE},
    source::{
        LeadLogRecord, ReferralLogRecord, ReferralRecord, ReferralStatusRecord, RewardRecord,
        SourceTables, TransactionRecord, UserLogRecord,
    },
    timestamp::Timestamp,
    types::PAID_STATUS,
};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use rand::{seq::SliceRandom, Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;

const TIMEZONES: &[&str] = &[
    "Asia/Jakarta",
    "Asia/Makassar",
    "America/New_York",
    "Europe/London",
    "Nowhere/Unknown",
];
const HOMECLUBS: &[&str] = &["Kemang", "Senayan", "Brooklyn", "Soho", "Pantai Indah"];
const REFERRAL_SOURCES: &[&str] = &[ONLINE_SOURCE, OFFLINE_SOURCE, "Lead"];
const LEAD_CATEGORIES: &[&str] = &["Online", "Offline"];
const LEAD_STATUSES: &[&str] = &["New", "Contacted", "Converted"];
const TXN_TYPES: &[&str] = &["NEW", "RENEWAL"];
const REWARD_TYPES: &[&str] = &["cash", "voucher"];
const STATUSES: &[(&str, &str)] = &[("1", "Successful"), ("2", "Pending"), ("3", "Failed")];
const REWARDS: &[(&str, Option<f64>)] = &[
    ("1", Some(10.0)),
    ("2", Some(20.0)),
    ("3", Some(50.0)),
    ("4", Some(100.0)),
    ("5", None),
];

const MINUTES_PER_DAY: i64 = 24 * 60;

/// Stable per-table stream slots.
/// NEVER reorder or remove entries. Append only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
enum FixtureTable {
    Users = 0,
    Leads = 1,
    Referrals = 2,
    Transactions = 3,
    Rewards = 4,
    ReferralLogs = 5,
}

impl FixtureTable {
    /// The slot sits in the top byte so it never collides with small seeds.
    fn rng(self, seed: u64) -> Pcg64Mcg {
        Pcg64Mcg::seed_from_u64(seed ^ ((self as u64) << 56))
    }
}

fn base_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

fn at(base: NaiveDateTime, minutes: i64) -> Timestamp {
    Timestamp::Naive(base + Duration::minutes(minutes))
}

fn choose(rng: &mut Pcg64Mcg, items: &[&str]) -> Option<String> {
    items.choose(rng).map(|s| s.to_string())
}

/// Build a synthetic source set with `referral_count` referrals.
pub fn generate(seed: u64, referral_count: usize) -> SourceTables {
    let base = base_time();
    let user_count = (referral_count / 2).max(4);
    let lead_count = (user_count / 2).max(2);

    let user_logs = generate_users(&mut FixtureTable::Users.rng(seed), user_count, base);
    let lead_logs = generate_leads(&mut FixtureTable::Leads.rng(seed), lead_count, base);

    let statuses = STATUSES
        .iter()
        .map(|(id, description)| ReferralStatusRecord {
            id: Some(id.to_string()),
            description: Some(description.to_string()),
            created_at: Some(Timestamp::Naive(base)),
        })
        .collect();

    let mut reward_rng = FixtureTable::Rewards.rng(seed);
    let rewards = REWARDS
        .iter()
        .map(|(id, value)| RewardRecord {
            id: Some(id.to_string()),
            reward_value: *value,
            reward_type: choose(&mut reward_rng, REWARD_TYPES),
            created_at: Some(Timestamp::Naive(base)),
        })
        .collect();

    let mut referral_rng = FixtureTable::Referrals.rng(seed);
    let mut txn_rng = FixtureTable::Transactions.rng(seed);
    let mut log_rng = FixtureTable::ReferralLogs.rng(seed);

    let mut referrals = Vec::with_capacity(referral_count);
    let mut transactions = Vec::new();
    let mut referral_logs = Vec::with_capacity(referral_count);

    for i in 0..referral_count {
        let referral_id = format!("R{i:05}");
        let referral_minute = referral_rng.gen_range(0..=90 * MINUTES_PER_DAY);
        let referral_at = (!referral_rng.gen_bool(0.03)).then(|| at(base, referral_minute));

        let referrer_id = format!("U{:04}", referral_rng.gen_range(0..user_count));
        // Lead ids run two past the generated leads so some never match.
        let referee_id = if referral_rng.gen_bool(0.5) {
            format!("L{:04}", referral_rng.gen_range(0..lead_count + 2))
        } else {
            format!("U{:04}", referral_rng.gen_range(0..user_count))
        };

        let referral_reward_id = match referral_rng.gen::<f64>() {
            r if r < 0.80 => REWARDS.choose(&mut referral_rng).map(|(id, _)| id.to_string()),
            r if r < 0.85 => Some("99".to_string()),
            _ => None,
        };

        let transaction_id = generate_transaction(
            &mut txn_rng,
            i,
            base,
            referral_minute,
            &mut transactions,
        );

        referrals.push(ReferralRecord {
            referral_id: referral_id.clone(),
            referral_source: choose(&mut referral_rng, REFERRAL_SOURCES),
            referral_at,
            referrer_id: Some(referrer_id),
            referee_id: Some(referee_id),
            referee_name: Some(format!("Guest {i}")),
            referee_phone: Some(format!("+62-812{i:07}")),
            referral_reward_id,
            transaction_id,
            updated_at: Some(at(base, referral_minute + MINUTES_PER_DAY)),
            user_referral_status_id: STATUSES
                .choose(&mut referral_rng)
                .map(|(id, _)| id.to_string()),
        });

        referral_logs.push(ReferralLogRecord {
            id: Some(format!("{i}")),
            user_referral_id: Some(referral_id),
            source_transaction_id: None,
            created_at: Some(at(base, referral_minute + 5)),
            is_reward_granted: Some(log_rng.gen_bool(0.4)),
        });
    }

    SourceTables {
        referrals,
        statuses,
        rewards,
        transactions,
        user_logs,
        referral_logs,
        lead_logs,
    }
}

/// Returns the transaction id the referral points at, pushing the
/// transaction row when one exists.
fn generate_transaction(
    rng: &mut Pcg64Mcg,
    index: usize,
    base: NaiveDateTime,
    referral_minute: i64,
    transactions: &mut Vec<TransactionRecord>,
) -> Option<String> {
    let roll: f64 = rng.gen();
    if roll < 0.15 {
        return None;
    }
    let transaction_id = format!("T{index:05}");
    if roll < 0.20 {
        // dangling: referenced but never recorded
        return Some(transaction_id);
    }
    let offset = rng.gen_range(-3 * MINUTES_PER_DAY..=10 * MINUTES_PER_DAY);
    let transaction_status = match rng.gen_range(0..5) {
        0 => Some("FAILED".to_string()),
        1 => None,
        _ => Some(PAID_STATUS.to_string()),
    };
    transactions.push(TransactionRecord {
        transaction_id: Some(transaction_id.clone()),
        transaction_status,
        transaction_at: Some(at(base, referral_minute + offset)),
        transaction_location: choose(rng, HOMECLUBS),
        transaction_type: choose(rng, TXN_TYPES),
    });
    Some(transaction_id)
}

/// One snapshot per user, then a second, later snapshot for about a third
/// of them so that last-wins deduplication has something to decide.
fn generate_users(rng: &mut Pcg64Mcg, count: usize, base: NaiveDateTime) -> Vec<UserLogRecord> {
    let mut logs: Vec<UserLogRecord> = (0..count)
        .map(|i| UserLogRecord {
            user_id: Some(format!("U{i:04}")),
            name: Some(format!("Member {i}")),
            phone_number: Some(format!("+62-811{i:07}")),
            homeclub: choose(rng, HOMECLUBS),
            timezone_homeclub: choose(rng, TIMEZONES),
            membership_expired_date: Some(at(base, rng.gen_range(30..=720) * MINUTES_PER_DAY)),
            is_deleted: Some(rng.gen_bool(0.1)),
        })
        .collect();

    let mut resnapshots = Vec::new();
    for first in &logs {
        if !rng.gen_bool(0.3) {
            continue;
        }
        resnapshots.push(UserLogRecord {
            name: first.name.as_ref().map(|n| format!("{n} (updated)")),
            homeclub: choose(rng, HOMECLUBS),
            is_deleted: Some(rng.gen_bool(0.3)),
            ..first.clone()
        });
    }
    logs.extend(resnapshots);
    logs
}

fn generate_leads(rng: &mut Pcg64Mcg, count: usize, base: NaiveDateTime) -> Vec<LeadLogRecord> {
    let mut leads = Vec::new();
    for i in 0..count {
        let snapshots = rng.gen_range(1..=3);
        for _ in 0..snapshots {
            leads.push(LeadLogRecord {
                lead_id: Some(format!("L{i:04}")),
                source_category: choose(rng, LEAD_CATEGORIES),
                preferred_location: choose(rng, HOMECLUBS),
                timezone_location: choose(rng, TIMEZONES),
                current_status: choose(rng, LEAD_STATUSES),
                created_at: Some(at(base, rng.gen_range(0..=60 * MINUTES_PER_DAY))),
            });
        }
    }
    leads
}
