//! Shared primitive types used across the pipeline.

/// An opaque key from a source table (referral, user, reward, ...).
/// Keys are compared as normalized text, never as numbers.
pub type EntityId = String;

/// The canonical run identifier.
pub type RunId = String;

/// Status value a paid transaction must carry.
pub const PAID_STATUS: &str = "PAID";
