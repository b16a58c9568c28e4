//! Flattens rosters, reconciliations and diagnostics into sheet tables.
//!
//! Tables are plain data; [`crate::io::excel_write`] turns them into a
//! workbook. Keeping the two apart lets tests inspect exactly what a sheet
//! will contain without opening a file.

use std::collections::{BTreeSet, HashSet};

use crate::model::{Diagnostic, Identifier, Period, Person, ReconciledRow, Roster, SubmissionStatus};
use crate::reconcile::Reconciliation;

/// Sheet holding the merged roster.
pub const MASTER_SHEET: &str = "Master Roster";
pub const GRADES_SHEET: &str = "Writing Grades";
pub const DIAGNOSTICS_SHEET: &str = "Diagnostics";
/// Master roster headers, in output order.
pub const MASTER_COLUMNS: [&str; 5] = ["Student Name", "Grade", "Student ID", "Period", "Course"];
/// Characters of a response shown in the grade sheet.
pub const PREVIEW_CHARS: usize = 100;
pub const NO_SUBMISSION: &str = "NO SUBMISSION";
/// Email cell of a student with no submission.
pub const NOT_SUBMITTED: &str = "Not submitted";

const MAX_SHEET_NAME: usize = 31;

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Empty,
}

/// Fill colour applied to a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Highlight {
    Good,
    Caution,
    Poor,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub value: CellValue,
    pub highlight: Option<Highlight>,
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            value: CellValue::Text(value.into()),
            highlight: None,
        }
    }

    pub fn number(value: impl Into<f64>) -> Self {
        Self {
            value: CellValue::Number(value.into()),
            highlight: None,
        }
    }

    pub fn empty() -> Self {
        Self {
            value: CellValue::Empty,
            highlight: None,
        }
    }

    /// Text, or an empty cell when `value` is `None`.
    pub fn optional(value: Option<&str>) -> Self {
        value.map_or_else(Self::empty, Self::text)
    }

    pub fn period(period: &Period) -> Self {
        match period {
            Period::Number(number) => Self::number(*number),
            Period::Label(label) => Self::text(label.as_str()),
        }
    }

    pub fn highlighted(mut self, highlight: Highlight) -> Self {
        self.highlight = Some(highlight);
        self
    }

    /// Cell content as display text.
    pub fn display(&self) -> String {
        match &self.value {
            CellValue::Text(text) => text.clone(),
            CellValue::Number(number) => number.to_string(),
            CellValue::Empty => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub header: String,
    /// Width in Excel character units.
    pub width: f64,
}

impl Column {
    pub fn new(header: impl Into<String>, width: f64) -> Self {
        Self {
            header: header.into(),
            width,
        }
    }
}

/// A table that will be materialised as an Excel sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetTable {
    pub sheet_name: String,
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Cell>>,
}

impl SheetTable {
    /// Index of the column with the given header.
    pub fn column(&self, header: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.header == header)
    }
}

/// All tables of one output workbook, with unique sheet names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkbookData {
    pub tables: Vec<SheetTable>,
}

impl WorkbookData {
    pub fn new(tables: impl IntoIterator<Item = SheetTable>) -> Self {
        let mut workbook = Self::default();
        for table in tables {
            workbook.push(table);
        }
        workbook
    }

    /// Adds a table, renaming its sheet if the name is invalid or taken.
    pub fn push(&mut self, mut table: SheetTable) {
        let used: HashSet<&str> = self
            .tables
            .iter()
            .map(|table| table.sheet_name.as_str())
            .collect();
        table.sheet_name = unique_sheet_name(&table.sheet_name, &used);
        self.tables.push(table);
    }

    pub fn table(&self, sheet_name: &str) -> Option<&SheetTable> {
        self.tables
            .iter()
            .find(|table| table.sheet_name == sheet_name)
    }
}

/// The merged roster, one row per person in roster order.
pub fn master_roster_table(roster: &Roster) -> SheetTable {
    SheetTable {
        sheet_name: MASTER_SHEET.to_string(),
        columns: master_columns(),
        rows: roster.people().iter().map(person_cells).collect(),
    }
}

fn master_columns() -> Vec<Column> {
    let widths = [30.0, 8.0, 14.0, 8.0, 20.0];
    MASTER_COLUMNS
        .iter()
        .zip(widths)
        .map(|(header, width)| Column::new(*header, width))
        .collect()
}

fn person_cells(person: &Person) -> Vec<Cell> {
    vec![
        Cell::text(person.full_name()),
        Cell::optional(person.grade.as_deref()),
        Cell::optional(person.student_id.as_deref()),
        Cell::period(&person.period),
        Cell::text(person.course.as_str()),
    ]
}

/// Completion status per person under an assignment `title` column.
///
/// People in periods without a form file show `No Form` instead of `No`.
pub fn completion_table(
    title: &str,
    reconciliation: &Reconciliation,
    periods_with_forms: &BTreeSet<Period>,
) -> SheetTable {
    let mut columns = master_columns();
    columns.push(Column::new(title, (title.chars().count() as f64 + 4.0).max(12.0)));

    let rows = reconciliation
        .rows
        .iter()
        .map(|row| {
            let status = if !periods_with_forms.contains(&row.person.period) {
                Cell::text("No Form").highlighted(Highlight::Caution)
            } else if row.status == SubmissionStatus::Submitted {
                Cell::text("Yes").highlighted(Highlight::Good)
            } else {
                Cell::text("No").highlighted(Highlight::Poor)
            };
            let mut cells = person_cells(&row.person);
            cells.push(status);
            cells
        })
        .collect();

    SheetTable {
        sheet_name: sanitize_sheet_name(title),
        columns,
        rows,
    }
}

/// ACE scores per person with a coloured total and a response preview.
pub fn grades_table(reconciliation: &Reconciliation) -> SheetTable {
    let columns = vec![
        Column::new("Period", 8.0),
        Column::new("Student Name", 30.0),
        Column::new("Email", 32.0),
        Column::new("Answer (0-2)", 12.0),
        Column::new("Cite (0-2)", 12.0),
        Column::new("Explain (0-2)", 13.0),
        Column::new("Total Score (0-6)", 16.0),
        Column::new("Response Preview", 80.0),
    ];
    SheetTable {
        sheet_name: GRADES_SHEET.to_string(),
        columns,
        rows: reconciliation.rows.iter().map(grade_cells).collect(),
    }
}

fn grade_cells(row: &ReconciledRow) -> Vec<Cell> {
    let email = match &row.submission {
        None => Some(NOT_SUBMITTED),
        Some(submission) => match &submission.identifier {
            Identifier::Email(raw) => Some(raw.as_str()),
            Identifier::Name(_) => None,
        },
    };
    let preview = match row.status {
        SubmissionStatus::NotSubmitted => Some(NO_SUBMISSION.to_string()),
        SubmissionStatus::Submitted => row.response_preview(PREVIEW_CHARS),
    };

    let mut cells = vec![
        Cell::period(&row.person.period),
        Cell::text(row.person.full_name()),
        Cell::optional(email),
    ];
    match row.score {
        Some(score) => cells.extend([
            Cell::number(score.answer),
            Cell::number(score.cite),
            Cell::number(score.explain),
            Cell::number(score.total).highlighted(total_highlight(score.total)),
        ]),
        None => cells.extend(std::iter::repeat_with(Cell::empty).take(4)),
    }
    cells.push(Cell::optional(preview.as_deref()));
    cells
}

/// Colour band for a rubric total out of six.
pub fn total_highlight(total: u8) -> Highlight {
    match total {
        5.. => Highlight::Good,
        3..=4 => Highlight::Caution,
        _ => Highlight::Poor,
    }
}

/// Every diagnostic of the run, in the order collected.
pub fn diagnostics_table(diagnostics: &[Diagnostic]) -> SheetTable {
    SheetTable {
        sheet_name: DIAGNOSTICS_SHEET.to_string(),
        columns: vec![
            Column::new("Kind", 22.0),
            Column::new("Period", 8.0),
            Column::new("Row", 6.0),
            Column::new("Identifier", 32.0),
            Column::new("Detail", 90.0),
        ],
        rows: diagnostics
            .iter()
            .map(|diagnostic| {
                vec![
                    Cell::text(diagnostic.kind()),
                    diagnostic.period().map_or_else(Cell::empty, Cell::period),
                    diagnostic
                        .row()
                        .map_or_else(Cell::empty, |row| Cell::number(row as u32)),
                    Cell::optional(diagnostic.identifier()),
                    Cell::text(diagnostic.to_string()),
                ]
            })
            .collect(),
    }
}

fn unique_sheet_name(raw: &str, used: &HashSet<&str>) -> String {
    let base = sanitize_sheet_name(raw);
    if !used.contains(base.as_str()) {
        return base;
    }

    let mut counter = 1;
    loop {
        let suffix = format!("_{counter}");
        let prefix: String = base
            .chars()
            .take(MAX_SHEET_NAME - suffix.len())
            .collect();
        let candidate = format!("{prefix}{suffix}");
        if !used.contains(candidate.as_str()) {
            return candidate;
        }
        counter += 1;
    }
}

/// Replaces characters Excel rejects in sheet names and caps the length.
pub fn sanitize_sheet_name(raw: &str) -> String {
    let invalid = [':', '\\', '/', '?', '*', '[', ']', '\'', '"'];
    let sanitized: String = raw
        .chars()
        .map(|ch| {
            if invalid.contains(&ch) || ch.is_control() {
                '_'
            } else {
                ch
            }
        })
        .collect();

    let sanitized = sanitized.trim();
    if sanitized.is_empty() {
        return "Sheet".to_string();
    }
    sanitized.chars().take(MAX_SHEET_NAME).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RubricScore;

    #[test]
    fn sheet_names_are_cleaned_and_deduplicated() {
        assert_eq!(sanitize_sheet_name("Week 1: Volcanoes?"), "Week 1_ Volcanoes_");
        assert_eq!(sanitize_sheet_name("   "), "Sheet");
        assert_eq!(sanitize_sheet_name(&"x".repeat(40)).len(), 31);

        let workbook = WorkbookData::new([
            SheetTable {
                sheet_name: "Diagnostics".to_string(),
                columns: Vec::new(),
                rows: Vec::new(),
            },
            diagnostics_table(&[]),
        ]);
        assert_eq!(workbook.tables[1].sheet_name, "Diagnostics_1");
    }

    #[test]
    fn completion_statuses_follow_form_periods() {
        let row = |name: &str, period: u32, status| ReconciledRow {
            person: Person::new(name, Period::Number(period), "Biology"),
            status,
            submission: None,
            tier: None,
            score: None,
        };
        let reconciliation = Reconciliation {
            rows: vec![
                row("Ana Lopez", 1, SubmissionStatus::Submitted),
                row("Dana Kim", 1, SubmissionStatus::NotSubmitted),
                row("Eli Park", 2, SubmissionStatus::NotSubmitted),
            ],
            diagnostics: Vec::new(),
        };
        let workbook = WorkbookData::new([completion_table(
            "Week 2: Cells",
            &reconciliation,
            &BTreeSet::from([Period::Number(1)]),
        )]);

        let table = workbook.table("Week 2_ Cells").expect("sheet renamed");
        let status = table.column("Week 2: Cells").expect("title column");
        let cells: Vec<(String, Option<Highlight>)> = table
            .rows
            .iter()
            .map(|row| (row[status].display(), row[status].highlight))
            .collect();
        assert_eq!(
            cells,
            [
                ("Yes".to_string(), Some(Highlight::Good)),
                ("No".to_string(), Some(Highlight::Poor)),
                ("No Form".to_string(), Some(Highlight::Caution)),
            ]
        );
        assert_eq!(table.rows[2][3].display(), "2");
    }

    #[test]
    fn non_submitters_are_named_in_the_email_column() {
        let reconciliation = Reconciliation {
            rows: vec![ReconciledRow {
                person: Person::new("Dana Kim", Period::Number(1), "Biology"),
                status: SubmissionStatus::NotSubmitted,
                submission: None,
                tier: None,
                score: Some(RubricScore::zero()),
            }],
            diagnostics: Vec::new(),
        };
        let table = grades_table(&reconciliation);
        let email = table.column("Email").expect("email column");
        let preview = table.column("Response Preview").expect("preview column");
        assert_eq!(table.rows[0][email].display(), NOT_SUBMITTED);
        assert_eq!(table.rows[0][preview].display(), NO_SUBMISSION);
    }

    #[test]
    fn totals_are_banded() {
        assert_eq!(total_highlight(6), Highlight::Good);
        assert_eq!(total_highlight(5), Highlight::Good);
        assert_eq!(total_highlight(4), Highlight::Caution);
        assert_eq!(total_highlight(3), Highlight::Caution);
        assert_eq!(total_highlight(2), Highlight::Poor);
        assert_eq!(total_highlight(0), Highlight::Poor);
    }
}
