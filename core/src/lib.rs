//! Referral classification pipeline.
//!
//! Joins the referral program's source tables into one row per referral
//! (`joiner`) and classifies each row for validity and reward eligibility
//! (`classifier`). `engine` runs both stages against files on disk and
//! records the run in a SQLite ledger (`store`).

pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod field;
pub mod fixture;
pub mod joiner;
pub mod output;
pub mod source;
pub mod store;
pub mod timestamp;
pub mod types;
