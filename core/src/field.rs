//! Lenient field decoders used as serde `deserialize_with` hooks.
//!
//! RULE: a malformed field is never an error. It decodes to `None`
//! and the row survives. Only structural problems (wrong column count,
//! unreadable file) fail a load.

use crate::{timestamp::Timestamp, types::EntityId};
use serde::{Deserialize, Deserializer};

/// Normalize an opaque key. Blank is null; `"7.0"` becomes `"7"` so ids that
/// were exported through a float column still match their integer form.
pub fn normalize_key(raw: &str) -> Option<EntityId> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some(int_part) = trimmed.strip_suffix(".0") {
        let digits = int_part.strip_prefix('-').unwrap_or(int_part);
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            return Some(int_part.to_string());
        }
    }
    Some(trimmed.to_string())
}

pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" => Some(true),
        "false" | "f" | "0" | "no" | "n" => Some(false),
        _ => None,
    }
}

pub fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| !v.is_nan())
}

fn raw<'de, D: Deserializer<'de>>(de: D) -> Result<Option<String>, D::Error> {
    Option::<String>::deserialize(de)
}

pub fn key<'de, D: Deserializer<'de>>(de: D) -> Result<Option<EntityId>, D::Error> {
    Ok(raw(de)?.as_deref().and_then(normalize_key))
}

/// Like `key`, for the one column every row must carry. Blank stays blank.
pub fn required_key<'de, D: Deserializer<'de>>(de: D) -> Result<EntityId, D::Error> {
    Ok(key(de)?.unwrap_or_default())
}

pub fn text<'de, D: Deserializer<'de>>(de: D) -> Result<Option<String>, D::Error> {
    Ok(raw(de)?
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty()))
}

pub fn flag<'de, D: Deserializer<'de>>(de: D) -> Result<Option<bool>, D::Error> {
    Ok(raw(de)?.as_deref().and_then(parse_flag))
}

pub fn number<'de, D: Deserializer<'de>>(de: D) -> Result<Option<f64>, D::Error> {
    Ok(raw(de)?.as_deref().and_then(parse_number))
}

pub fn timestamp<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Timestamp>, D::Error> {
    Ok(raw(de)?.as_deref().and_then(Timestamp::parse))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_exported_ids_match_integer_ids() {
        assert_eq!(normalize_key("7.0").as_deref(), Some("7"));
        assert_eq!(normalize_key(" 42 ").as_deref(), Some("42"));
        assert_eq!(normalize_key("-3.0").as_deref(), Some("-3"));
        assert_eq!(normalize_key("7.5").as_deref(), Some("7.5"));
        assert_eq!(normalize_key("abc.0").as_deref(), Some("abc.0"));
        assert_eq!(normalize_key("  "), None);
    }

    #[test]
    fn flags_accept_pandas_and_sql_spellings() {
        assert_eq!(parse_flag("True"), Some(true));
        assert_eq!(parse_flag("FALSE"), Some(false));
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag("maybe"), None);
        assert_eq!(parse_flag(""), None);
    }

    #[test]
    fn nan_is_not_a_number() {
        assert_eq!(parse_number("50"), Some(50.0));
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number("fifty"), None);
    }
}
