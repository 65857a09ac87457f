pub mod executive;
pub mod merge;
pub mod report;
pub mod workbook;

pub use executive::{DirectoryError, Executive, ExecutiveDirectory, EXEC_CODE_HEADER};
pub use merge::{merge_monthly, month_wise, MergeError};
pub use report::{
    aggregate, process_executive_report, process_report, roll_up_regions, with_total, ProcessedReport, ReportKind,
    UNMAPPED_REGION,
};
pub use workbook::{read_any, read_csv_grid, read_grid, write_workbook, WorkbookError};

pub mod import {
    use crate::*;
    use salesdesk_core::{CleanTable, LabelNormalizer};

    /// Reads, locates and aggregates one uploaded report.
    ///
    /// With a directory, the first column is read as executive codes and totals are
    /// grouped by each executive's branch.
    pub fn import_report(
        file_name: &str,
        data: &[u8],
        sheet: Option<&str>,
        header_offset: usize,
        kind: ReportKind,
        normalizer: &LabelNormalizer,
        executives: Option<&ExecutiveDirectory>,
    ) -> Result<ProcessedReport, ImportError> {
        let grid = read_any(file_name, data, sheet, header_offset)?;
        let report = match executives {
            Some(directory) => process_executive_report(kind, &grid, normalizer, directory)?,
            None => process_report(kind, &grid, normalizer)?,
        };
        Ok(report)
    }

    /// The workbook written back for a processed report: extracted rows, branch totals
    /// with a grand total, and the region roll-up. With a directory, an `Executives`
    /// sheet lists each code with its name, branch and region.
    pub fn report_workbook(
        report: &ProcessedReport,
        executives: Option<&ExecutiveDirectory>,
    ) -> Result<Vec<u8>, WorkbookError> {
        let branches = with_total(report.branches.clone());
        let regions = with_total(report.regions.clone());
        let mut sheets = vec![
            ("Extracted", report.extracted.clone()),
            ("Branches", branches),
            ("Regions", regions),
        ];
        if let Some(directory) = executives {
            sheets.push(("Executives", directory.annotate(&report.extracted)));
        }
        let named: Vec<(&str, &CleanTable)> = sheets.iter().map(|(n, t)| (*n, t)).collect();
        write_workbook(&named)
    }

    #[derive(thiserror::Error, Debug)]
    pub enum ImportError {
        #[error(transparent)]
        Workbook(#[from] WorkbookError),
        #[error(transparent)]
        Layout(#[from] salesdesk_core::LayoutNotFound),
    }

}
