use std::fs;
use std::path::Path;

use rust_xlsxwriter::{Color, Format, FormatAlign, Workbook, Worksheet};
use tracing::debug;

use crate::error::Result;
use crate::report::{Cell, CellValue, Highlight, SheetTable, WorkbookData};

const HEADER_FILL: u32 = 0x4472C4;
const GOOD_FILL: u32 = 0xC6EFCE;
const CAUTION_FILL: u32 = 0xFFEB9C;
const POOR_FILL: u32 = 0xFFC7CE;

/// Shared cell formats for one workbook.
struct Styles {
    header: Format,
    good: Format,
    caution: Format,
    poor: Format,
}

impl Styles {
    fn new() -> Self {
        Self {
            header: Format::new()
                .set_bold()
                .set_font_color(Color::White)
                .set_background_color(Color::RGB(HEADER_FILL))
                .set_align(FormatAlign::Center),
            good: Format::new().set_background_color(Color::RGB(GOOD_FILL)),
            caution: Format::new().set_background_color(Color::RGB(CAUTION_FILL)),
            poor: Format::new().set_background_color(Color::RGB(POOR_FILL)),
        }
    }

    fn highlight(&self, highlight: Highlight) -> &Format {
        match highlight {
            Highlight::Good => &self.good,
            Highlight::Caution => &self.caution,
            Highlight::Poor => &self.poor,
        }
    }
}

/// Writes the provided workbook data to the given path.
///
/// The workbook is rendered in memory first so a failure never leaves a
/// partial file behind.
pub fn write_workbook(path: &Path, workbook: &WorkbookData) -> Result<()> {
    let bytes = render_workbook(workbook)?;
    fs::write(path, bytes)?;
    debug!(path = %path.display(), sheets = workbook.tables.len(), "workbook written");
    Ok(())
}

/// Renders the workbook to XLSX bytes.
pub fn render_workbook(workbook: &WorkbookData) -> Result<Vec<u8>> {
    let styles = Styles::new();
    let mut workbook_writer = Workbook::new();

    for table in &workbook.tables {
        let worksheet = workbook_writer.add_worksheet();
        write_table(worksheet, table, &styles)?;
    }

    Ok(workbook_writer.save_to_buffer()?)
}

fn write_table(worksheet: &mut Worksheet, table: &SheetTable, styles: &Styles) -> Result<()> {
    worksheet.set_name(&table.sheet_name)?;

    for (col_idx, column) in table.columns.iter().enumerate() {
        let col = col_idx as u16;
        worksheet.write_string_with_format(0, col, &column.header, &styles.header)?;
        worksheet.set_column_width(col, column.width)?;
    }

    for (row_idx, row) in table.rows.iter().enumerate() {
        for (col_idx, cell) in row.iter().enumerate() {
            write_cell(worksheet, (row_idx + 1) as u32, col_idx as u16, cell, styles)?;
        }
    }

    if !table.columns.is_empty() {
        let col_end = (table.columns.len() as u16).saturating_sub(1);
        worksheet.set_freeze_panes(1, 0)?;
        worksheet.autofilter(0, 0, table.rows.len() as u32, col_end)?;
    }
    Ok(())
}

fn write_cell(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    cell: &Cell,
    styles: &Styles,
) -> Result<()> {
    let format = cell.highlight.map(|highlight| styles.highlight(highlight));
    match (&cell.value, format) {
        (CellValue::Text(text), Some(format)) => {
            worksheet.write_string_with_format(row, col, text, format)?;
        }
        (CellValue::Text(text), None) => {
            worksheet.write_string(row, col, text)?;
        }
        (CellValue::Number(number), Some(format)) => {
            worksheet.write_number_with_format(row, col, *number, format)?;
        }
        (CellValue::Number(number), None) => {
            worksheet.write_number(row, col, *number)?;
        }
        (CellValue::Empty, Some(format)) => {
            worksheet.write_blank(row, col, format)?;
        }
        (CellValue::Empty, None) => {}
    }
    Ok(())
}
