use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::grid::{CellGrid, CellValue};
use crate::locate::{LayoutLocator, LayoutNotFound, TableRegion};
use crate::normalize::LabelNormalizer;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    pub label: String,
    pub values: Vec<CellValue>,
}

/// A located sub-table with normalized headers and row labels.
///
/// `values` of every row line up with `headers`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleanTable {
    pub label_header: String,
    pub headers: Vec<String>,
    pub rows: Vec<TableRow>,
}

impl CleanTable {
    pub fn new(label_header: impl Into<String>, headers: Vec<String>) -> Self {
        Self {
            label_header: label_header.into(),
            headers,
            rows: Vec::new(),
        }
    }

    pub fn column(&self, header: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == header)
    }

    pub fn row(&self, label: &str) -> Option<&TableRow> {
        self.rows.iter().find(|r| r.label == label)
    }

    pub fn value(&self, label: &str, header: &str) -> Option<&CellValue> {
        let col = self.column(header)?;
        self.row(label)?.values.get(col)
    }

    /// One JSON object per row, keyed by header.
    pub fn to_records(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                let mut record = Map::new();
                record.insert(self.label_header.clone(), Value::String(row.label.clone()));
                for (header, value) in self.headers.iter().zip(&row.values) {
                    record.insert(header.clone(), cell_to_json(value));
                }
                record
            })
            .collect()
    }
}

fn cell_to_json(value: &CellValue) -> Value {
    match value {
        CellValue::Empty => Value::Null,
        CellValue::Bool(b) => Value::Bool(*b),
        CellValue::Number(n) => serde_json::Number::from_f64(*n).map_or(Value::Null, Value::Number),
        CellValue::Text(s) => Value::String(s.clone()),
    }
}

/// Locates the sub-table in `grid` and rebuilds it with normalized headers and labels.
pub fn extract_table<S: AsRef<str>>(
    grid: &CellGrid,
    header_candidates: &[S],
    normalizer: &LabelNormalizer,
) -> Result<CleanTable, LayoutNotFound> {
    extract_table_with(&LayoutLocator::default(), grid, header_candidates, normalizer)
}

pub fn extract_table_with<S: AsRef<str>>(
    locator: &LayoutLocator,
    grid: &CellGrid,
    header_candidates: &[S],
    normalizer: &LabelNormalizer,
) -> Result<CleanTable, LayoutNotFound> {
    let region = locator.locate(grid, header_candidates)?;
    Ok(rebuild(grid, region, normalizer, RowLabels::Normalized))
}

/// Like [`extract_table`], but row labels are kept as trimmed text instead of being
/// normalized. For tables keyed by identifiers such as executive codes.
pub fn extract_keyed_table<S: AsRef<str>>(
    grid: &CellGrid,
    header_candidates: &[S],
    normalizer: &LabelNormalizer,
) -> Result<CleanTable, LayoutNotFound> {
    let region = LayoutLocator::default().locate(grid, header_candidates)?;
    Ok(rebuild(grid, region, normalizer, RowLabels::Raw))
}

#[derive(Clone, Copy)]
enum RowLabels {
    Normalized,
    Raw,
}

fn row_label(normalizer: &LabelNormalizer, mode: RowLabels, row: usize, raw: &str) -> Option<String> {
    match mode {
        RowLabels::Raw => Some(raw.trim().to_string()).filter(|l| !l.is_empty()),
        RowLabels::Normalized => {
            let resolution = normalizer.resolve(raw);
            if resolution.is_fallback() {
                tracing::warn!(row, label = %raw, "unrecognized label kept as-is");
            }
            resolution.into_label()
        }
    }
}

fn rebuild(
    grid: &CellGrid,
    region: TableRegion,
    normalizer: &LabelNormalizer,
    labels: RowLabels,
) -> CleanTable {
    let TableRegion {
        header_row,
        data_start_row: anchor_row,
    } = region;

    let label_header = normalizer.normalize_header(&grid.cell(anchor_row, 0).to_string());

    // Titles come from the header row; the anchor row fills the gaps.
    let mut columns: Vec<(usize, String)> = Vec::new();
    for col in 1..grid.width() {
        let title = [grid.cell(header_row, col), grid.cell(anchor_row, col)]
            .into_iter()
            .find(|c| !c.is_blank())
            .map(|c| normalizer.normalize_header(&c.to_string()));
        if let Some(title) = title {
            let title = dedupe(&columns, title);
            columns.push((col, title));
        }
    }

    let mut table = CleanTable::new(
        label_header,
        columns.iter().map(|(_, t)| t.clone()).collect(),
    );

    for r in (anchor_row + 1..grid.len()).take_while(|&r| !grid.is_blank_row(r)) {
        let raw = grid.cell(r, 0).to_string();
        let Some(label) = row_label(normalizer, labels, r, &raw) else {
            tracing::debug!(row = r, label = %raw, "dropping row");
            continue;
        };
        // Sheet subtotals are recomputed downstream.
        if label.to_uppercase().contains("TOTAL") {
            continue;
        }
        table.rows.push(TableRow {
            label,
            values: columns.iter().map(|(c, _)| grid.cell(r, *c).clone()).collect(),
        });
    }

    table
}

fn dedupe(columns: &[(usize, String)], title: String) -> String {
    let taken = |candidate: &str| columns.iter().any(|(_, t)| t == candidate);
    if !taken(&title) {
        return title;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{title} ({n})");
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(v: f64) -> CellValue {
        CellValue::Number(v)
    }

    fn sales_grid() -> CellGrid {
        CellGrid::new(vec![
            vec!["Zone wise sales - April".into()],
            vec![CellValue::Empty],
            vec![CellValue::Empty, "Actual".into(), "Budget".into(), "Achievement %".into()],
            vec!["BRANCH".into()],
            vec!["Pondy".into(), n(120.0), n(100.0), n(120.0)],
            vec!["aaaa - PUDUCHERRY".into(), n(30.0), n(50.0), n(60.0)],
            vec!["HO".into(), n(999.0), n(999.0), n(100.0)],
            vec!["br-Hosur".into(), n(10.0), CellValue::Empty, CellValue::Empty],
            vec!["Total".into(), n(160.0), n(150.0), n(106.0)],
            vec![CellValue::Empty],
            vec!["Notes: figures in lakhs".into()],
        ])
    }

    #[test]
    fn extracts_normalized_headers_and_labels() {
        let table = extract_table(&sales_grid(), &["actual"], &LabelNormalizer::default()).unwrap();
        assert_eq!(table.label_header, "BRANCH");
        assert_eq!(table.headers, vec!["Act", "Bgt", "Ach %"]);
        let labels: Vec<&str> = table.rows.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["PUDUCHERRY", "PUDUCHERRY", "HOSUR"]);
        assert_eq!(table.rows[2].values[1], CellValue::Empty);
    }

    #[test]
    fn stops_at_first_blank_row() {
        let table = extract_table(&sales_grid(), &["actual"], &LabelNormalizer::default()).unwrap();
        assert!(table.row("NOTES: FIGURES IN LAKHS").is_none());
    }

    #[test]
    fn anchor_row_fills_missing_titles() {
        let grid = CellGrid::from_text_rows(&[
            &["", "Actual", ""],
            &["REGIONS", "", "Remarks"],
            &["Salem", "5", "ok"],
        ]);
        let table = extract_table(&grid, &["actual"], &LabelNormalizer::default()).unwrap();
        assert_eq!(table.label_header, "REGIONS");
        assert_eq!(table.headers, vec!["Act", "REMARKS"]);
        assert_eq!(table.value("SALEM", "REMARKS"), Some(&CellValue::text("ok")));
    }

    #[test]
    fn duplicate_headers_are_suffixed() {
        let grid = CellGrid::from_text_rows(&[
            &["", "Actual", "Actual"],
            &["BRANCH"],
            &["Salem", "1", "2"],
        ]);
        let table = extract_table(&grid, &["actual"], &LabelNormalizer::default()).unwrap();
        assert_eq!(table.headers, vec!["Act", "Act (2)"]);
    }

    #[test]
    fn layout_failure_propagates() {
        let grid = CellGrid::from_text_rows(&[&["nothing here"]]);
        let err = extract_table(&grid, &["Actual"], &LabelNormalizer::default()).unwrap_err();
        assert_eq!(err.candidates, vec!["Actual"]);
    }

    #[test]
    fn keyed_table_keeps_identifiers_verbatim() {
        let grid = CellGrid::from_text_rows(&[
            &["", "Actual"],
            &["BRANCH"],
            &[" EX-101 ", "4"],
            &["MDU01", "6"],
            &["Z-HO", "1"],
            &["Total", "11"],
        ]);
        let table = extract_keyed_table(&grid, &["actual"], &LabelNormalizer::default()).unwrap();
        let labels: Vec<&str> = table.rows.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["EX-101", "MDU01", "Z-HO"]);
        assert_eq!(table.headers, vec!["Act"]);
    }

    #[test]
    fn records_are_keyed_by_header() {
        let table = extract_table(&sales_grid(), &["actual"], &LabelNormalizer::default()).unwrap();
        let records = table.to_records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0]["BRANCH"], Value::String("PUDUCHERRY".into()));
        assert_eq!(records[0]["Act"], serde_json::json!(120.0));
        assert_eq!(records[2]["Bgt"], Value::Null);
    }
}
