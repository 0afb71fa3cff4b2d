//! Joiner: denormalizes the source tables into one row per referral.
//!
//! JOIN ORDER (fixed, every join is a left join on the referral row):
//!   1. statuses      on user_referral_status_id
//!   2. rewards       on referral_reward_id
//!   3. transactions  on transaction_id
//!   4. user logs     on referrer_id (referrer_*) and referee_id (referee_*_user)
//!   5. lead logs     on referee_id = lead_id
//!   6. derived:      referral_at_local, referral_source_category
//!
//! RULES:
//!   - Output has exactly one row per input referral row, in input order.
//!   - One-to-many sources are collapsed before joining:
//!     user logs keep the LAST row per user id (input order),
//!     lead logs keep the row with the LATEST created_at, where a null
//!     created_at sorts after every date.
//!   - A key miss leaves the joined fields null. It is never an error.

use crate::{
    config::{NaiveTimePolicy, PipelineConfig, TimezoneScope},
    field,
    source::{LeadLogRecord, SourceTables},
    timestamp::{parse_timezone, Timestamp},
    types::EntityId,
};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Raw referral source that maps to the "Online" category.
pub const ONLINE_SOURCE: &str = "User Sign Up";
/// Raw referral source that maps to the "Offline" category.
pub const OFFLINE_SOURCE: &str = "Draft Transaction";

/// Category for online sign-up referrals.
pub const ONLINE_CATEGORY: &str = "Online";
/// Category for referrals made at a draft transaction.
pub const OFFLINE_CATEGORY: &str = "Offline";

/// Column order of the joined file. Written as the header even when the
/// table has no rows.
pub const JOINED_COLUMNS: [&str; 35] = [
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
    "referral_status",
    "reward_value",
    "reward_type",
    "reward_created_at",
    "transaction_status",
    "transaction_at",
    "transaction_location",
    "transaction_type",
    "referrer_name",
    "referrer_phone_number",
    "referrer_homeclub",
    "referrer_timezone",
    "referrer_membership_expired_date",
    "referrer_is_deleted",
    "referee_name_user",
    "referee_phone_user",
    "lead_id",
    "source_category",
    "preferred_location",
    "timezone_location",
    "current_status",
    "lead_created_at",
    "referral_at_local",
    "referral_source_category",
];

/// One referral with everything the Classifier reads.
///
/// Field order is the column order of the joined file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinedReferral {
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

    // status
    #[serde(deserialize_with = "field::text")]
    pub referral_status: Option<String>,

    // reward
    #[serde(deserialize_with = "field::number")]
    pub reward_value: Option<f64>,
    #[serde(deserialize_with = "field::text")]
    pub reward_type: Option<String>,
    #[serde(deserialize_with = "field::timestamp")]
    pub reward_created_at: Option<Timestamp>,

    // transaction
    #[serde(deserialize_with = "field::text")]
    pub transaction_status: Option<String>,
    #[serde(deserialize_with = "field::timestamp")]
    pub transaction_at: Option<Timestamp>,
    #[serde(deserialize_with = "field::text")]
    pub transaction_location: Option<String>,
    #[serde(deserialize_with = "field::text")]
    pub transaction_type: Option<String>,

    // referrer snapshot
    #[serde(deserialize_with = "field::text")]
    pub referrer_name: Option<String>,
    #[serde(deserialize_with = "field::text")]
    pub referrer_phone_number: Option<String>,
    #[serde(deserialize_with = "field::text")]
    pub referrer_homeclub: Option<String>,
    #[serde(deserialize_with = "field::text")]
    pub referrer_timezone: Option<String>,
    #[serde(deserialize_with = "field::timestamp")]
    pub referrer_membership_expired_date: Option<Timestamp>,
    #[serde(deserialize_with = "field::flag")]
    pub referrer_is_deleted: Option<bool>,

    // referee snapshot
    #[serde(deserialize_with = "field::text")]
    pub referee_name_user: Option<String>,
    #[serde(deserialize_with = "field::text")]
    pub referee_phone_user: Option<String>,

    // lead
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
    pub lead_created_at: Option<Timestamp>,

    // derived
    #[serde(deserialize_with = "field::timestamp")]
    pub referral_at_local: Option<Timestamp>,
    #[serde(deserialize_with = "field::text")]
    pub referral_source_category: Option<String>,
}

/// Counters reported alongside the joined rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinStats {
    pub rows: usize,
    pub duplicate_referral_ids: usize,
    /// Non-null keys that found no match.
    pub status_misses: usize,
    pub reward_misses: usize,
    pub transaction_misses: usize,
    pub referrer_misses: usize,
    pub referee_misses: usize,
    pub lead_misses: usize,
    /// Rows dropped by deduplication before the join.
    pub user_snapshots_collapsed: usize,
    pub lead_snapshots_collapsed: usize,
    pub local_time_nulls: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinOutcome {
    pub rows: Vec<JoinedReferral>,
    pub stats: JoinStats,
}

pub struct Joiner {
    timezone_scope: TimezoneScope,
    naive_time: NaiveTimePolicy,
}

impl Joiner {
    pub fn new(timezone_scope: TimezoneScope, naive_time: NaiveTimePolicy) -> Self {
        Self {
            timezone_scope,
            naive_time,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.timezone_scope, config.naive_time)
    }

    pub fn join(&self, sources: &SourceTables) -> JoinOutcome {
        let mut stats = JoinStats::default();

        let statuses = index_last_wins(&sources.statuses, |s| s.id.as_deref());
        let rewards = index_last_wins(&sources.rewards, |r| r.id.as_deref());
        let transactions =
            index_last_wins(&sources.transactions, |t| t.transaction_id.as_deref());

        let users = index_last_wins(&sources.user_logs, |u| u.user_id.as_deref());
        stats.user_snapshots_collapsed = keyed_count(&sources.user_logs, |u| u.user_id.is_some())
            .saturating_sub(users.len());

        let leads = latest_leads(&sources.lead_logs);
        stats.lead_snapshots_collapsed = keyed_count(&sources.lead_logs, |l| l.lead_id.is_some())
            .saturating_sub(leads.len());

        log::debug!(
            "dedup: {} user snapshots and {} lead snapshots collapsed",
            stats.user_snapshots_collapsed,
            stats.lead_snapshots_collapsed
        );

        let mut seen_ids: HashSet<&str> = HashSet::with_capacity(sources.referrals.len());
        let mut joined = Vec::with_capacity(sources.referrals.len());

        for r in &sources.referrals {
            if !seen_ids.insert(r.referral_id.as_str()) {
                stats.duplicate_referral_ids += 1;
            }

            let status = lookup(
                &statuses,
                r.user_referral_status_id.as_deref(),
                &mut stats.status_misses,
            );
            let reward = lookup(&rewards, r.referral_reward_id.as_deref(), &mut stats.reward_misses);
            let txn = lookup(
                &transactions,
                r.transaction_id.as_deref(),
                &mut stats.transaction_misses,
            );
            let referrer = lookup(&users, r.referrer_id.as_deref(), &mut stats.referrer_misses);
            let referee = lookup(&users, r.referee_id.as_deref(), &mut stats.referee_misses);
            let lead = lookup(&leads, r.referee_id.as_deref(), &mut stats.lead_misses);

            let source_category = lead.and_then(|l| l.source_category.clone());
            let referral_source_category =
                categorize_source(r.referral_source.as_deref(), source_category.as_deref());

            joined.push(JoinedReferral {
                referral_id: r.referral_id.clone(),
                referral_source: r.referral_source.clone(),
                referral_at: r.referral_at,
                referrer_id: r.referrer_id.clone(),
                referee_id: r.referee_id.clone(),
                referee_name: r.referee_name.clone(),
                referee_phone: r.referee_phone.clone(),
                referral_reward_id: r.referral_reward_id.clone(),
                transaction_id: r.transaction_id.clone(),
                updated_at: r.updated_at,
                user_referral_status_id: r.user_referral_status_id.clone(),

                referral_status: status.and_then(|s| s.description.clone()),

                reward_value: reward.and_then(|w| w.reward_value),
                reward_type: reward.and_then(|w| w.reward_type.clone()),
                reward_created_at: reward.and_then(|w| w.created_at),

                transaction_status: txn.and_then(|t| t.transaction_status.clone()),
                transaction_at: txn.and_then(|t| t.transaction_at),
                transaction_location: txn.and_then(|t| t.transaction_location.clone()),
                transaction_type: txn.and_then(|t| t.transaction_type.clone()),

                referrer_name: referrer.and_then(|u| u.name.clone()),
                referrer_phone_number: referrer.and_then(|u| u.phone_number.clone()),
                referrer_homeclub: referrer.and_then(|u| u.homeclub.clone()),
                referrer_timezone: referrer.and_then(|u| u.timezone_homeclub.clone()),
                referrer_membership_expired_date: referrer
                    .and_then(|u| u.membership_expired_date),
                referrer_is_deleted: referrer.and_then(|u| u.is_deleted),

                referee_name_user: referee.and_then(|u| u.name.clone()),
                referee_phone_user: referee.and_then(|u| u.phone_number.clone()),

                lead_id: lead.and_then(|l| l.lead_id.clone()),
                source_category,
                preferred_location: lead.and_then(|l| l.preferred_location.clone()),
                timezone_location: lead.and_then(|l| l.timezone_location.clone()),
                current_status: lead.and_then(|l| l.current_status.clone()),
                lead_created_at: lead.and_then(|l| l.created_at),

                referral_at_local: None,
                referral_source_category,
            });
        }

        if stats.duplicate_referral_ids > 0 {
            log::warn!(
                "{} referral ids appear more than once; every row is kept",
                stats.duplicate_referral_ids
            );
        }
        log_status_counts(&joined);

        let rows = self.localize(joined);
        stats.rows = rows.len();
        stats.local_time_nulls = rows.iter().filter(|r| r.referral_at_local.is_none()).count();

        log::info!(
            "join complete: rows={} status_misses={} txn_misses={} referrer_misses={} lead_misses={} local_time_nulls={}",
            stats.rows,
            stats.status_misses,
            stats.transaction_misses,
            stats.referrer_misses,
            stats.lead_misses,
            stats.local_time_nulls
        );

        JoinOutcome { rows, stats }
    }

    /// Fill `referral_at_local` according to the configured scope and policy.
    fn localize(&self, rows: Vec<JoinedReferral>) -> Vec<JoinedReferral> {
        let mut resolver = TimezoneResolver::default();
        let global = match self.timezone_scope {
            TimezoneScope::FirstReferrer => {
                let first = rows.iter().find_map(|r| r.referrer_timezone.as_deref());
                log::debug!("first_referrer timezone scope resolved to {first:?}");
                first.and_then(|name| resolver.resolve(name))
            }
            TimezoneScope::PerReferrer => None,
        };

        rows.into_iter()
            .map(|row| {
                let tz = match self.timezone_scope {
                    TimezoneScope::FirstReferrer => global,
                    TimezoneScope::PerReferrer => row
                        .referrer_timezone
                        .as_deref()
                        .and_then(|name| resolver.resolve(name)),
                };
                let referral_at_local = match (row.referral_at, tz) {
                    (Some(at), Some(tz)) => at.in_timezone(tz, self.naive_time),
                    _ => None,
                };
                JoinedReferral {
                    referral_at_local,
                    ..row
                }
            })
            .collect()
    }
}

/// Map the raw referral source onto its category, falling back to the
/// lead's own category for anything else.
pub fn categorize_source(raw: Option<&str>, fallback: Option<&str>) -> Option<String> {
    match raw {
        Some(ONLINE_SOURCE) => Some(ONLINE_CATEGORY.to_string()),
        Some(OFFLINE_SOURCE) => Some(OFFLINE_CATEGORY.to_string()),
        _ => fallback.map(str::to_string),
    }
}

/// Index rows by key; a later row replaces an earlier one with the same key.
fn index_last_wins<'a, T, I, F>(rows: I, key: F) -> HashMap<&'a str, &'a T>
where
    I: IntoIterator<Item = &'a T>,
    F: Fn(&'a T) -> Option<&'a str>,
    T: 'a,
{
    let mut index = HashMap::new();
    for row in rows {
        if let Some(k) = key(row) {
            index.insert(k, row);
        }
    }
    index
}

/// One lead per lead id: sort ascending by created_at (stable, nulls last)
/// and keep the last row for each id. An undated row therefore beats a
/// dated one for the same lead.
fn latest_leads(leads: &[LeadLogRecord]) -> HashMap<&str, &LeadLogRecord> {
    let mut ordered: Vec<&LeadLogRecord> = leads.iter().collect();
    ordered.sort_by_key(|l| (l.created_at.is_none(), l.created_at.map(|t| t.instant())));
    index_last_wins(ordered, |l| l.lead_id.as_deref())
}

fn keyed_count<T>(rows: &[T], has_key: impl Fn(&T) -> bool) -> usize {
    rows.iter().filter(|r| has_key(r)).count()
}

fn lookup<'a, T>(
    index: &HashMap<&str, &'a T>,
    key: Option<&str>,
    misses: &mut usize,
) -> Option<&'a T> {
    let key = key?;
    let hit = index.get(key).copied();
    if hit.is_none() {
        *misses += 1;
    }
    hit
}

fn log_status_counts(rows: &[JoinedReferral]) {
    if !log::log_enabled!(log::Level::Debug) {
        return;
    }
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for row in rows {
        *counts
            .entry(row.referral_status.as_deref().unwrap_or("<none>"))
            .or_default() += 1;
    }
    for (status, count) in counts {
        log::debug!("referral_status {status}: {count}");
    }
}

/// Caches timezone lookups and warns once per unknown name.
#[derive(Default)]
struct TimezoneResolver {
    known: HashMap<String, Option<Tz>>,
    unknown: BTreeSet<String>,
}

impl TimezoneResolver {
    fn resolve(&mut self, name: &str) -> Option<Tz> {
        if let Some(tz) = self.known.get(name) {
            return *tz;
        }
        let tz = parse_timezone(name);
        if tz.is_none() && self.unknown.insert(name.to_string()) {
            log::warn!("unknown referrer timezone {name:?}; local time left empty");
        }
        self.known.insert(name.to_string(), tz);
        tz
    }
}
