use std::path::Path;

use calamine::{DataType, Reader, Xlsx, open_workbook};
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{Result, ToolError};
use crate::io::{Loaded, cell, find_column, is_blank, period_in_text, read_csv_rows, source_name};
use crate::model::{Diagnostic, Period, Person};
use crate::normalize::normalize;
use crate::report::{MASTER_COLUMNS, MASTER_SHEET};

/// Where the student table sits inside a gradebook roster export.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RosterLayout {
    /// Header cell that marks the header row and the name column.
    pub name_header: String,
    pub grade_header: String,
    pub id_header: String,
    /// Rows between the header row and the first student row.
    pub skip_after_header: usize,
}

impl Default for RosterLayout {
    fn default() -> Self {
        Self {
            name_header: "Student Name".to_string(),
            grade_header: "Grade".to_string(),
            id_header: "Student Number".to_string(),
            skip_after_header: 2,
        }
    }
}

/// Reads one period's gradebook roster export (CSV).
///
/// When `period` is `None` it is taken from a "Period: N" cell above the
/// header row.
pub fn read_gradebook_export(
    path: &Path,
    period: Option<Period>,
    course: &str,
    layout: &RosterLayout,
) -> Result<Loaded<Person>> {
    let rows = read_csv_rows(path)?;
    let loaded = parse_gradebook_rows(&rows, period, course, layout, &source_name(path))?;
    info!(
        source = %path.display(),
        students = loaded.records.len(),
        skipped = loaded.diagnostics.len(),
        "read gradebook roster"
    );
    Ok(loaded)
}

/// Parses gradebook export rows already split into cells.
pub fn parse_gradebook_rows(
    rows: &[Vec<String>],
    period: Option<Period>,
    course: &str,
    layout: &RosterLayout,
    source: &str,
) -> Result<Loaded<Person>> {
    let header_idx = rows
        .iter()
        .position(|row| find_column(row, &layout.name_header).is_some())
        .ok_or_else(|| missing_column(source, &layout.name_header))?;
    let header = &rows[header_idx];
    let name_col = find_column(header, &layout.name_header)
        .ok_or_else(|| missing_column(source, &layout.name_header))?;
    let id_col = find_column(header, &layout.id_header)
        .ok_or_else(|| missing_column(source, &layout.id_header))?;
    let grade_col = find_column(header, &layout.grade_header);

    let period = period
        .or_else(|| {
            rows[..header_idx]
                .iter()
                .flatten()
                .find_map(|value| period_in_text(value))
        })
        .ok_or_else(|| {
            ToolError::Configuration(format!(
                "no period configured for {source} and none found in its header"
            ))
        })?;

    let mut loaded = Loaded::default();
    for (idx, row) in rows
        .iter()
        .enumerate()
        .skip(header_idx + 1 + layout.skip_after_header)
    {
        if is_blank(row) {
            continue;
        }
        let row_number = idx + 1;
        let name = cell(row, name_col);
        let student_id = cell(row, id_col);

        let reason = if name.is_empty() {
            Some("missing student name".to_string())
        } else if normalize(name).is_empty() {
            Some(format!("student name '{name}' has no letters"))
        } else if student_id.is_empty() {
            Some(format!("missing student number for '{name}'"))
        } else {
            None
        };
        if let Some(reason) = reason {
            warn!(source, row = row_number, %reason, "skipping roster row");
            loaded.diagnostics.push(Diagnostic::MalformedRecord {
                source: source.to_string(),
                row: row_number,
                reason,
            });
            continue;
        }

        let mut person = Person::new(name, period.clone(), course).with_student_id(student_id);
        if let Some(grade) = grade_col.map(|col| cell(row, col)).filter(|g| !g.is_empty()) {
            person = person.with_grade(grade);
        }
        loaded.records.push(person);
    }

    Ok(loaded)
}

/// Reads a master roster previously written by the merge workflow, or any
/// XLSX/CSV file with the same column headers in any order.
pub fn read_master_roster(path: &Path) -> Result<Loaded<Person>> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let rows = match extension.as_str() {
        "xlsx" | "xlsm" => read_xlsx_rows(path)?,
        _ => read_csv_rows(path)?,
    };
    let loaded = parse_master_rows(&rows, &source_name(path))?;
    info!(
        source = %path.display(),
        students = loaded.records.len(),
        skipped = loaded.diagnostics.len(),
        "read master roster"
    );
    Ok(loaded)
}

/// Parses master roster rows; the first non-blank row is the header.
pub fn parse_master_rows(rows: &[Vec<String>], source: &str) -> Result<Loaded<Person>> {
    let [name_header, grade_header, id_header, period_header, course_header] = MASTER_COLUMNS;
    let Some(header_idx) = rows.iter().position(|row| !is_blank(row)) else {
        return Err(missing_column(source, name_header));
    };
    let header = &rows[header_idx];
    let name_col =
        find_column(header, name_header).ok_or_else(|| missing_column(source, name_header))?;
    let period_col =
        find_column(header, period_header).ok_or_else(|| missing_column(source, period_header))?;
    let grade_col = find_column(header, grade_header);
    let id_col = find_column(header, id_header);
    let course_col = find_column(header, course_header);

    let mut loaded = Loaded::default();
    for (idx, row) in rows.iter().enumerate().skip(header_idx + 1) {
        if is_blank(row) {
            continue;
        }
        let row_number = idx + 1;
        let name = cell(row, name_col);
        let period = match Period::parse(cell(row, period_col)) {
            Some(period) if !normalize(name).is_empty() => period,
            _ => {
                let reason = if normalize(name).is_empty() {
                    "missing student name".to_string()
                } else {
                    format!("missing period for '{name}'")
                };
                warn!(source, row = row_number, %reason, "skipping roster row");
                loaded.diagnostics.push(Diagnostic::MalformedRecord {
                    source: source.to_string(),
                    row: row_number,
                    reason,
                });
                continue;
            }
        };

        let course = course_col.map(|col| cell(row, col)).unwrap_or_default();
        let mut person = Person::new(name, period, course);
        if let Some(id) = id_col.map(|col| cell(row, col)).filter(|id| !id.is_empty()) {
            person = person.with_student_id(id);
        }
        if let Some(grade) = grade_col.map(|col| cell(row, col)).filter(|g| !g.is_empty()) {
            person = person.with_grade(grade);
        }
        loaded.records.push(person);
    }

    Ok(loaded)
}

fn read_xlsx_rows(path: &Path) -> Result<Vec<Vec<String>>> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let sheet_names = workbook.sheet_names().to_owned();
    let sheet = sheet_names
        .iter()
        .find(|name| name.as_str() == MASTER_SHEET)
        .or_else(|| sheet_names.first())
        .ok_or_else(|| ToolError::InvalidWorkbook(format!("{} has no sheets", path.display())))?;

    let range = read_required_sheet(&mut workbook, sheet)?;
    Ok(range
        .rows()
        .map(|row| row.iter().map(|value| cell_to_string(Some(value))).collect())
        .collect())
}

fn read_required_sheet<R: std::io::Read + std::io::Seek>(
    workbook: &mut Xlsx<R>,
    name: &str,
) -> Result<calamine::Range<DataType>> {
    let range_result = workbook
        .worksheet_range(name)
        .ok_or_else(|| ToolError::InvalidWorkbook(format!("missing sheet '{name}'")))?;
    let range = range_result.map_err(ToolError::from)?;
    Ok(range)
}

fn cell_to_string(cell: Option<&DataType>) -> String {
    match cell {
        Some(DataType::String(value)) => value.trim().to_string(),
        Some(DataType::Float(value)) => value.to_string(),
        Some(DataType::Int(value)) => value.to_string(),
        Some(DataType::Bool(value)) => value.to_string(),
        Some(DataType::Empty) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn missing_column(source: &str, column: &str) -> ToolError {
    ToolError::MissingColumn {
        source_name: source.to_string(),
        column: column.to_string(),
    }
}
