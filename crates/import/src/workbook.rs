use calamine::{open_workbook_auto_from_rs, Data, Reader};
use rust_xlsxwriter::{Format, Workbook};
use salesdesk_core::{CellGrid, CellValue, CleanTable};
use std::io::{Cursor, Read};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkbookError {
    #[error("Unreadable workbook: {0}")]
    Calamine(#[from] calamine::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Workbook write failed: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
    #[error("Sheet '{sheet}' not found (available: {available:?})")]
    SheetNotFound { sheet: String, available: Vec<String> },
    #[error("Workbook has no sheets")]
    NoSheets,
}

/// Reads one sheet of an xlsx/xls/xlsb/ods workbook into a grid.
///
/// `sheet = None` selects the first sheet. The first `header_offset` physical rows are
/// skipped, so row 0 of the returned grid is the caller's header row.
pub fn read_grid(
    data: &[u8],
    sheet: Option<&str>,
    header_offset: usize,
) -> Result<CellGrid, WorkbookError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(data))?;
    let names = workbook.sheet_names();

    let name = match sheet {
        Some(wanted) => names
            .iter()
            .find(|n| n.trim().eq_ignore_ascii_case(wanted.trim()))
            .cloned()
            .ok_or_else(|| WorkbookError::SheetNotFound {
                sheet: wanted.to_string(),
                available: names.clone(),
            })?,
        None => names.first().cloned().ok_or(WorkbookError::NoSheets)?,
    };

    let range = workbook.worksheet_range(&name)?;

    // calamine ranges start at the first used cell; pad back to A1 so offsets stay physical.
    let (row0, col0) = range
        .start()
        .map(|(r, c)| (r as usize, c as usize))
        .unwrap_or((0, 0));

    let mut rows: Vec<Vec<CellValue>> = vec![Vec::new(); row0];
    for row in range.rows() {
        let mut cells = vec![CellValue::Empty; col0];
        cells.extend(row.iter().map(cell_value));
        rows.push(cells);
    }

    tracing::debug!(sheet = %name, rows = rows.len(), header_offset, "read worksheet");
    Ok(CellGrid::new(rows.into_iter().skip(header_offset).collect()))
}

/// Reads a CSV export into a grid. Numeric-looking fields become numbers.
pub fn read_csv_grid<R: Read>(data: R, header_offset: usize) -> Result<CellGrid, WorkbookError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(data);

    let mut rows = Vec::new();
    for result in reader.records().skip(header_offset) {
        let record = result?;
        rows.push(record.iter().map(csv_cell).collect());
    }
    Ok(CellGrid::new(rows))
}

/// Dispatches on file extension: `.csv` goes through the CSV reader, everything else
/// through calamine.
pub fn read_any(
    file_name: &str,
    data: &[u8],
    sheet: Option<&str>,
    header_offset: usize,
) -> Result<CellGrid, WorkbookError> {
    if file_name.to_lowercase().ends_with(".csv") {
        read_csv_grid(data, header_offset)
    } else {
        read_grid(data, sheet, header_offset)
    }
}

/// Writes each table to its own worksheet with a bold header row.
pub fn write_workbook(sheets: &[(&str, &CleanTable)]) -> Result<Vec<u8>, WorkbookError> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();

    for (name, table) in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(*name)?;

        worksheet.write_string_with_format(0, 0, &table.label_header, &bold)?;
        for (c, header) in table.headers.iter().enumerate() {
            worksheet.write_string_with_format(0, (c + 1) as u16, header, &bold)?;
        }

        for (r, row) in table.rows.iter().enumerate() {
            let r = (r + 1) as u32;
            worksheet.write_string(r, 0, &row.label)?;
            for (c, value) in row.values.iter().enumerate() {
                let c = (c + 1) as u16;
                match value {
                    CellValue::Number(n) => worksheet.write_number(r, c, *n)?,
                    CellValue::Text(s) => worksheet.write_string(r, c, s)?,
                    CellValue::Bool(b) => worksheet.write_boolean(r, c, *b)?,
                    CellValue::Empty => continue,
                };
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}

fn cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => {
            tracing::trace!(error = ?e, "cell error read as empty");
            CellValue::Empty
        }
    }
}

fn csv_cell(field: &str) -> CellValue {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        return CellValue::Empty;
    }
    match trimmed.parse::<f64>() {
        Ok(n) if n.is_finite() => CellValue::Number(n),
        _ => CellValue::Text(field.to_string()),
    }
}
