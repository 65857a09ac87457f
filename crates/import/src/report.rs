use salesdesk_core::{
    extract_keyed_table, extract_table, Amount, CellGrid, CellValue, CleanTable, LabelNormalizer, LayoutNotFound,
    TableRow,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::executive::ExecutiveDirectory;

pub const UNMAPPED_REGION: &str = "UNMAPPED";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Sales,
    Budget,
    Outstanding,
}

impl ReportKind {
    /// Header phrases tried, in order, when locating this report's table.
    pub fn header_candidates(self) -> &'static [&'static str] {
        match self {
            ReportKind::Sales => &["Actual", "Sales"],
            ReportKind::Budget => &["Budget", "Target"],
            ReportKind::Outstanding => &["Outstanding", "O/S", "Balance"],
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportKind::Sales => write!(f, "sales"),
            ReportKind::Budget => write!(f, "budget"),
            ReportKind::Outstanding => write!(f, "outstanding"),
        }
    }
}

impl std::str::FromStr for ReportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sales" => Ok(ReportKind::Sales),
            "budget" => Ok(ReportKind::Budget),
            "outstanding" | "os" => Ok(ReportKind::Outstanding),
            other => Err(format!("Unknown report kind: '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessedReport {
    pub kind: ReportKind,
    /// Rows as located in the sheet, after label normalization.
    pub extracted: CleanTable,
    /// One row per canonical branch.
    pub branches: CleanTable,
    /// Branch totals rolled up by region.
    pub regions: CleanTable,
}

/// Extracts a report's table and aggregates it by branch and region.
pub fn process_report(
    kind: ReportKind,
    grid: &CellGrid,
    normalizer: &LabelNormalizer,
) -> Result<ProcessedReport, LayoutNotFound> {
    let extracted = extract_table(grid, kind.header_candidates(), normalizer)?;
    let branches = aggregate(&extracted);
    let regions = roll_up_regions(&branches, normalizer);
    tracing::info!(
        %kind,
        rows = extracted.rows.len(),
        branches = branches.rows.len(),
        regions = regions.rows.len(),
        "processed report"
    );
    Ok(ProcessedReport {
        kind,
        extracted,
        branches,
        regions,
    })
}

/// Processes a report whose first column holds executive codes.
///
/// Codes are matched against the directory verbatim; each row then counts towards the
/// branch the directory assigns. Rows with unknown codes stay in `extracted` but are left
/// out of the branch and region totals.
pub fn process_executive_report(
    kind: ReportKind,
    grid: &CellGrid,
    normalizer: &LabelNormalizer,
    directory: &ExecutiveDirectory,
) -> Result<ProcessedReport, LayoutNotFound> {
    let extracted = extract_keyed_table(grid, kind.header_candidates(), normalizer)?;
    let unknown = extracted
        .rows
        .iter()
        .filter(|r| directory.resolve(&r.label).is_none())
        .count();
    if unknown > 0 {
        tracing::warn!(unknown, "rows with unknown executive codes left out of branch totals");
    }

    let branches = aggregate(&directory.relabel_by_branch(&extracted));
    let regions = roll_up_regions(&branches, normalizer);
    tracing::info!(
        %kind,
        rows = extracted.rows.len(),
        branches = branches.rows.len(),
        "processed executive report"
    );
    Ok(ProcessedReport {
        kind,
        extracted,
        branches,
        regions,
    })
}

/// A column can be summed when its header is not a percentage and it holds at least one
/// number.
pub fn is_additive(table: &CleanTable, col: usize) -> bool {
    !table.headers[col].contains('%')
        && table
            .rows
            .iter()
            .any(|r| r.values.get(col).and_then(CellValue::as_number).is_some())
}

/// Sums additive columns over rows that share a label, keeping first-seen label order.
pub fn aggregate(table: &CleanTable) -> CleanTable {
    sum_by(table, table.label_header.clone(), |row| row.label.clone())
}

/// Sums branch rows into their configured regions.
pub fn roll_up_regions(branches: &CleanTable, normalizer: &LabelNormalizer) -> CleanTable {
    sum_by(branches, "REGION".to_string(), |row| {
        normalizer
            .region_of(&row.label)
            .unwrap_or(UNMAPPED_REGION)
            .to_string()
    })
}

/// Appends a `TOTAL` row summing every column of an aggregated table.
pub fn with_total(mut table: CleanTable) -> CleanTable {
    let mut totals: Vec<Option<Amount>> = vec![None; table.headers.len()];
    for row in &table.rows {
        accumulate(&mut totals, &row.values, Some);
    }
    table.rows.push(TableRow {
        label: "TOTAL".to_string(),
        values: totals.into_iter().map(to_cell).collect(),
    });
    table
}

fn sum_by<F>(table: &CleanTable, label_header: String, key: F) -> CleanTable
where
    F: Fn(&TableRow) -> String,
{
    let columns: Vec<usize> = (0..table.headers.len())
        .filter(|&c| is_additive(table, c))
        .collect();

    let mut order: Vec<String> = Vec::new();
    let mut sums: HashMap<String, Vec<Option<Amount>>> = HashMap::new();

    for row in &table.rows {
        let k = key(row);
        let acc = sums.entry(k.clone()).or_insert_with(|| {
            order.push(k);
            vec![None; columns.len()]
        });
        accumulate(acc, &row.values, |i| columns.get(i).copied());
    }

    let mut out = CleanTable::new(
        label_header,
        columns.iter().map(|&c| table.headers[c].clone()).collect(),
    );
    for label in order {
        let values = sums.remove(&label).unwrap_or_default();
        out.rows.push(TableRow {
            label,
            values: values.into_iter().map(to_cell).collect(),
        });
    }
    out
}

/// Adds `values[source(i)]` into `acc[i]` for every accumulator slot.
fn accumulate<F>(acc: &mut [Option<Amount>], values: &[CellValue], source: F)
where
    F: Fn(usize) -> Option<usize>,
{
    for (i, slot) in acc.iter_mut().enumerate() {
        let amount = source(i)
            .and_then(|c| values.get(c))
            .and_then(CellValue::as_number)
            .and_then(Amount::from_f64);
        if let Some(amount) = amount {
            *slot = Some(slot.unwrap_or_default() + amount);
        }
    }
}

fn to_cell(sum: Option<Amount>) -> CellValue {
    sum.map_or(CellValue::Empty, |a| CellValue::Number(a.round_dp(2).to_f64()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(v: f64) -> CellValue {
        CellValue::Number(v)
    }

    fn sales_grid() -> CellGrid {
        CellGrid::new(vec![
            vec!["Performance review".into()],
            vec![CellValue::Empty, "Actual".into(), "Budget".into(), "Ach %".into(), "Remarks".into()],
            vec!["BRANCH".into()],
            vec!["Pondy".into(), n(10.1), n(12.0), n(84.0), "slow".into()],
            vec!["PUDUCHERRY".into(), n(5.2), n(3.0), n(173.0), CellValue::Empty],
            vec!["Salem".into(), n(7.0), CellValue::Empty, CellValue::Empty, CellValue::Empty],
            vec!["Hosur".into(), "1,000".into(), n(900.0), n(111.0), CellValue::Empty],
            vec!["WEST-HO".into(), n(50.0), n(50.0), n(100.0), CellValue::Empty],
            vec!["Grand Total".into(), n(1072.3), n(965.0), n(111.0), CellValue::Empty],
        ])
    }

    #[test]
    fn kind_parsing() {
        assert_eq!("Sales".parse::<ReportKind>().unwrap(), ReportKind::Sales);
        assert_eq!("OS".parse::<ReportKind>().unwrap(), ReportKind::Outstanding);
        assert!("payroll".parse::<ReportKind>().is_err());
        assert_eq!(ReportKind::Budget.to_string(), "budget");
    }

    #[test]
    fn branches_are_summed_by_canonical_label() {
        let report = process_report(ReportKind::Sales, &sales_grid(), &LabelNormalizer::default()).unwrap();
        let b = &report.branches;
        assert_eq!(b.headers, vec!["Act", "Bgt"]);
        let labels: Vec<&str> = b.rows.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["PUDUCHERRY", "SALEM", "HOSUR"]);
        assert_eq!(b.value("PUDUCHERRY", "Act"), Some(&n(15.3)));
        assert_eq!(b.value("PUDUCHERRY", "Bgt"), Some(&n(15.0)));
        assert_eq!(b.value("SALEM", "Bgt"), Some(&CellValue::Empty));
        assert_eq!(b.value("HOSUR", "Act"), Some(&n(1000.0)));
    }

    #[test]
    fn regions_roll_up_with_unmapped_bucket() {
        let report = process_report(ReportKind::Sales, &sales_grid(), &LabelNormalizer::default()).unwrap();
        let r = &report.regions;
        assert_eq!(r.label_header, "REGION");
        assert_eq!(r.value("NORTH", "Act"), Some(&n(15.3)));
        assert_eq!(r.value("WEST", "Act"), Some(&n(7.0)));
        assert_eq!(r.value(UNMAPPED_REGION, "Act"), Some(&n(1000.0)));
    }

    #[test]
    fn wrong_kind_fails_to_locate() {
        let err = process_report(ReportKind::Outstanding, &sales_grid(), &LabelNormalizer::default())
            .unwrap_err();
        assert_eq!(err.candidates, vec!["Outstanding", "O/S", "Balance"]);
    }

    #[test]
    fn executive_codes_are_resolved_before_normalization() {
        let normalizer = LabelNormalizer::default();
        let directory = ExecutiveDirectory::from_csv(
            "code,name,branch,region\nEX-101,Anitha R,Pondy,\nMDU01,Karthik S,Salem,\nZ-HO,Meena V,br-Hosur,West\n"
                .as_bytes(),
            &normalizer,
        )
        .unwrap();
        let grid = CellGrid::from_text_rows(&[
            &["", "Actual", "Budget"],
            &["BRANCH"],
            &["EX-101", "10", "12"],
            &["MDU01", "4", "5"],
            &["Z-HO", "3", "2"],
            &["EX-999", "7", "7"],
        ]);

        let report =
            process_executive_report(ReportKind::Sales, &grid, &normalizer, &directory).unwrap();

        let labels: Vec<&str> = report.extracted.rows.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["EX-101", "MDU01", "Z-HO", "EX-999"]);

        let branches: Vec<&str> = report.branches.rows.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(branches, vec!["PUDUCHERRY", "SALEM", "HOSUR"]);
        assert_eq!(report.branches.value("SALEM", "Act"), Some(&n(4.0)));
        assert_eq!(report.regions.value("WEST", "Act"), Some(&n(4.0)));
        assert_eq!(report.regions.value(UNMAPPED_REGION, "Act"), Some(&n(3.0)));
    }

    #[test]
    fn total_row_sums_columns() {
        let report = process_report(ReportKind::Sales, &sales_grid(), &LabelNormalizer::default()).unwrap();
        let totals = with_total(report.branches);
        assert_eq!(totals.value("TOTAL", "Act"), Some(&n(1022.3)));
        assert_eq!(totals.value("TOTAL", "Bgt"), Some(&n(915.0)));
    }
}
