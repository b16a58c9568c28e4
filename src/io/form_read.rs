use std::path::Path;

use chrono::NaiveDateTime;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{Result, ToolError};
use crate::io::{Loaded, cell, find_column, is_blank, read_csv_rows, source_name};
use crate::model::{Diagnostic, Identifier, Period, Submission};

/// Google Forms export layouts seen in the wild, tried in order.
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y/%m/%d %I:%M:%S %p",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %I:%M:%S %p",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Column layout of a form response export.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FormLayout {
    /// Candidate identifier headers; the first one present is used.
    pub identifier_headers: Vec<String>,
    /// Response column header. `None` selects the third column.
    pub response_header: Option<String>,
    pub timestamp_header: Option<String>,
}

impl Default for FormLayout {
    fn default() -> Self {
        Self {
            identifier_headers: vec![
                "Username".to_string(),
                "Email Address".to_string(),
                "Name".to_string(),
            ],
            response_header: None,
            timestamp_header: Some("Timestamp".to_string()),
        }
    }
}

/// Reads a form response export (CSV) collected for `period`.
pub fn read_form_export(
    path: &Path,
    period: Option<Period>,
    layout: &FormLayout,
) -> Result<Loaded<Submission>> {
    let rows = read_csv_rows(path)?;
    let loaded = parse_form_rows(&rows, period, layout, &source_name(path))?;
    info!(
        source = %path.display(),
        submissions = loaded.records.len(),
        skipped = loaded.diagnostics.len(),
        "read form responses"
    );
    Ok(loaded)
}

/// Parses form rows; the first non-blank row is the header.
pub fn parse_form_rows(
    rows: &[Vec<String>],
    period: Option<Period>,
    layout: &FormLayout,
    source: &str,
) -> Result<Loaded<Submission>> {
    let missing = |column: &str| ToolError::MissingColumn {
        source_name: source.to_string(),
        column: column.to_string(),
    };

    let header_idx = rows
        .iter()
        .position(|row| !is_blank(row))
        .ok_or_else(|| missing(&layout.identifier_headers.join(" / ")))?;
    let header = &rows[header_idx];

    let identifier_col = layout
        .identifier_headers
        .iter()
        .find_map(|name| find_column(header, name))
        .ok_or_else(|| missing(&layout.identifier_headers.join(" / ")))?;
    let response_col = match &layout.response_header {
        Some(name) => find_column(header, name).ok_or_else(|| missing(name))?,
        None if header.len() > 2 => 2,
        None => return Err(missing("response (third column)")),
    };
    let timestamp_col = layout
        .timestamp_header
        .as_deref()
        .and_then(|name| find_column(header, name));

    let mut loaded = Loaded::default();
    for (idx, row) in rows.iter().enumerate().skip(header_idx + 1) {
        if is_blank(row) {
            continue;
        }
        let row_number = idx + 1;
        let raw_identifier = cell(row, identifier_col);
        if raw_identifier.is_empty() {
            warn!(source, row = row_number, "skipping form row without identifier");
            loaded.diagnostics.push(Diagnostic::MalformedRecord {
                source: source.to_string(),
                row: row_number,
                reason: "missing submitter identifier".to_string(),
            });
            continue;
        }

        let mut submission = Submission::new(Identifier::parse(raw_identifier), row_number);
        if let Some(period) = &period {
            submission = submission.with_period(period.clone());
        }
        let response = cell(row, response_col);
        if !response.is_empty() {
            submission = submission.with_response(response);
        }
        if let Some(raw) = timestamp_col.map(|col| cell(row, col)).filter(|raw| !raw.is_empty()) {
            match parse_timestamp(raw) {
                Some(timestamp) => submission = submission.with_timestamp(timestamp),
                None => warn!(source, row = row_number, raw, "unrecognised timestamp"),
            }
        }
        loaded.records.push(submission);
    }

    Ok(loaded)
}

/// Parses a form timestamp, ignoring a trailing zone abbreviation such as
/// `MDT`.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    let without_zone = match trimmed.rsplit_once(' ') {
        Some((rest, zone))
            if zone.chars().all(|ch| ch.is_ascii_alphabetic())
                && !zone.eq_ignore_ascii_case("am")
                && !zone.eq_ignore_ascii_case("pm") =>
        {
            rest.trim_end()
        }
        _ => trimmed,
    };

    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(without_zone, format).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn google_forms_timestamps_parse_with_zone() {
        let expected = chrono::NaiveDate::from_ymd_opt(2024, 9, 18)
            .and_then(|date| date.and_hms_opt(14, 5, 9))
            .expect("valid date");
        assert_eq!(parse_timestamp("2024/09/18 2:05:09 PM MDT"), Some(expected));
        assert_eq!(parse_timestamp("9/18/2024 14:05:09"), Some(expected));
        assert_eq!(parse_timestamp("last tuesday"), None);
    }
}
