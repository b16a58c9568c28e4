//! File adapters: roster and form loaders plus the workbook writer.

pub mod excel_write;
pub mod form_read;
pub mod roster_read;

use std::path::Path;

use crate::error::Result;
use crate::model::{Diagnostic, Period};

/// Records parsed from one source together with the rows that were skipped.
#[derive(Debug, Clone)]
pub struct Loaded<T> {
    pub records: Vec<T>,
    pub diagnostics: Vec<Diagnostic>,
}

impl<T> Default for Loaded<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            diagnostics: Vec::new(),
        }
    }
}

/// Reads every row of a delimited file as text cells.
///
/// Rows may have different lengths; invalid UTF-8 is replaced rather than
/// rejected since gradebook exports are not always clean.
pub fn read_csv_rows(path: &Path) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut rows = Vec::new();
    for record in reader.byte_records() {
        let record = record?;
        rows.push(
            record
                .iter()
                .map(|field| String::from_utf8_lossy(field).trim().to_string())
                .collect(),
        );
    }
    Ok(rows)
}

/// Short display name for diagnostics.
pub fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Finds a "Period 3" / "Period: 3" / "period_3" mention in free text, such
/// as a gradebook header cell or a file name.
pub fn period_in_text(text: &str) -> Option<Period> {
    let lowered = text.to_lowercase();
    lowered.match_indices("period").find_map(|(start, word)| {
        let digits: String = lowered[start + word.len()..]
            .trim_start_matches([':', ' ', '_', '-', '#'])
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        digits.parse::<u32>().ok().map(Period::Number)
    })
}

/// Period named in a file name such as `Week_1_Period_3_Writing.csv`.
pub fn period_from_file_name(path: &Path) -> Option<Period> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .and_then(period_in_text)
}

pub(crate) fn find_column(header: &[String], name: &str) -> Option<usize> {
    header
        .iter()
        .position(|cell| cell.trim().eq_ignore_ascii_case(name.trim()))
}

pub(crate) fn cell(row: &[String], column: usize) -> &str {
    row.get(column).map(|value| value.trim()).unwrap_or_default()
}

pub(crate) fn is_blank(row: &[String]) -> bool {
    row.iter().all(|value| value.trim().is_empty())
}
