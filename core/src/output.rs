//! Delimited output files.
//!
//! RULE: an output file is either complete or absent. Rows are written to
//! a sibling `.tmp` file which is renamed over the target only after the
//! final flush. A failed write removes the temporary file.
//!
//! The header is written from an explicit column list, so a table with no
//! rows still carries its columns.

use crate::{
    classifier::{ClassifiedReferral, CLASSIFICATION_COLUMNS},
    error::{PipelineError, PipelineResult},
    joiner::{JoinedReferral, JOINED_COLUMNS},
};
use serde::Serialize;
use std::path::{Path, PathBuf};

const JOINED_TABLE: &str = "joined";
const FINAL_TABLE: &str = "final";

/// Joined columns followed by the classification columns.
pub fn final_columns() -> Vec<&'static str> {
    JOINED_COLUMNS
        .iter()
        .chain(CLASSIFICATION_COLUMNS.iter())
        .copied()
        .collect()
}

/// Write the Joiner's rows. This file is the Classifier's input contract.
pub fn write_joined(path: &Path, delimiter: u8, rows: &[JoinedReferral]) -> PipelineResult<()> {
    write_atomically(path, delimiter, JOINED_TABLE, &JOINED_COLUMNS, rows.iter())
}

/// Read the joined file back into typed rows.
pub fn read_joined(path: &Path, delimiter: u8) -> PipelineResult<Vec<JoinedReferral>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .from_path(path)
        .map_err(PipelineError::csv(JOINED_TABLE))?;
    reader
        .deserialize()
        .collect::<Result<Vec<JoinedReferral>, _>>()
        .map_err(PipelineError::csv(JOINED_TABLE))
}

/// Write joined columns followed by the three classification columns.
pub fn write_classified(
    path: &Path,
    delimiter: u8,
    rows: &[ClassifiedReferral],
) -> PipelineResult<()> {
    write_atomically(
        path,
        delimiter,
        FINAL_TABLE,
        &final_columns(),
        rows.iter().map(|row| (&row.referral, &row.outcome)),
    )
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_atomically<I, T>(
    path: &Path,
    delimiter: u8,
    table: &'static str,
    columns: &[&str],
    rows: I,
) -> PipelineResult<()>
where
    I: IntoIterator<Item = T>,
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let tmp = temp_path(path);
    match write_rows(&tmp, delimiter, table, columns, rows) {
        Ok(count) => {
            std::fs::rename(&tmp, path)?;
            log::info!("wrote {count} rows to {}", path.display());
            Ok(())
        }
        Err(e) => {
            let _ = std::fs::remove_file(&tmp);
            Err(e)
        }
    }
}

/// Header record from `columns`, then one record per row.
pub(crate) fn write_rows<I, T>(
    path: &Path,
    delimiter: u8,
    table: &'static str,
    columns: &[&str],
    rows: I,
) -> PipelineResult<usize>
where
    I: IntoIterator<Item = T>,
    T: Serialize,
{
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .from_path(path)
        .map_err(PipelineError::csv(table))?;
    writer
        .write_record(columns)
        .map_err(PipelineError::csv(table))?;
    let mut count = 0usize;
    for row in rows {
        writer.serialize(row).map_err(PipelineError::csv(table))?;
        count += 1;
    }
    writer.flush()?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Classification;

    /// Header csv would derive from the row type itself.
    fn derived_header<T: Serialize>(row: T) -> String {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.serialize(row).unwrap();
        let bytes = writer.into_inner().unwrap();
        String::from_utf8(bytes).unwrap().lines().next().unwrap().to_string()
    }

    #[test]
    fn column_lists_match_serialized_field_order() {
        let joined = JoinedReferral::default();
        assert_eq!(derived_header(&joined), JOINED_COLUMNS.join(","));

        let outcome = Classification {
            is_valid_referral: true,
            invalid_reason: None,
            is_reward_eligible: false,
        };
        assert_eq!(derived_header(&outcome), CLASSIFICATION_COLUMNS.join(","));
        assert_eq!(derived_header((&joined, &outcome)), final_columns().join(","));
    }

    #[test]
    fn empty_tables_keep_their_header() {
        let dir = tempfile::tempdir().unwrap();
        let joined = dir.path().join("joined.csv");
        let classified = dir.path().join("final.csv");

        write_joined(&joined, b',', &[]).unwrap();
        write_classified(&classified, b',', &[]).unwrap();

        let text = std::fs::read_to_string(&classified).unwrap();
        assert_eq!(text.trim_end(), final_columns().join(","));
        assert!(read_joined(&joined, b',').unwrap().is_empty());
    }
}
