use salesdesk_core::{CellValue, CleanTable, LabelNormalizer, TableRow};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Duplicate executive code: {0}")]
    DuplicateCode(String),
    #[error("Executive code is empty on line {0}")]
    EmptyCode(u64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Executive {
    pub code: String,
    pub name: String,
    pub branch: String,
    #[serde(default)]
    pub region: Option<String>,
}

pub const EXEC_CODE_HEADER: &str = "EXEC CODE";

/// Executive code → name, branch and region, loaded from a `code,name,branch,region` CSV.
#[derive(Debug, Clone, Default)]
pub struct ExecutiveDirectory {
    by_code: HashMap<String, Executive>,
}

fn code_key(code: &str) -> String {
    code.split_whitespace().collect::<String>().to_uppercase()
}

impl ExecutiveDirectory {
    /// Branches are normalized on load; a missing region is taken from the normalizer's
    /// region map.
    pub fn from_csv<R: Read>(data: R, normalizer: &LabelNormalizer) -> Result<Self, DirectoryError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(data);

        let mut by_code = HashMap::new();
        for (i, result) in reader.deserialize::<Executive>().enumerate() {
            let mut exec = result?;
            let key = code_key(&exec.code);
            if key.is_empty() {
                // Line 1 is the header.
                return Err(DirectoryError::EmptyCode(i as u64 + 2));
            }

            if let Some(branch) = normalizer.normalize(&exec.branch) {
                exec.branch = branch;
            }
            exec.region = exec
                .region
                .filter(|r| !r.trim().is_empty())
                .map(|r| r.trim().to_uppercase())
                .or_else(|| normalizer.region_of(&exec.branch).map(str::to_string));

            if by_code.insert(key.clone(), exec).is_some() {
                return Err(DirectoryError::DuplicateCode(key));
            }
        }

        tracing::info!(executives = by_code.len(), "loaded executive directory");
        Ok(Self { by_code })
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }

    /// Lookup ignores case and embedded whitespace.
    pub fn resolve(&self, code: &str) -> Option<&Executive> {
        self.by_code.get(&code_key(code))
    }

    /// Appends EXECUTIVE, BRANCH and REGION columns to a table whose rows are keyed by
    /// executive code. The label column becomes `EXEC CODE`. Unknown codes get empty cells.
    pub fn annotate(&self, table: &CleanTable) -> CleanTable {
        let mut out = table.clone();
        out.label_header = EXEC_CODE_HEADER.to_string();
        out.headers.extend(["EXECUTIVE", "BRANCH", "REGION"].map(String::from));
        for row in &mut out.rows {
            let extra = match self.resolve(&row.label) {
                Some(e) => [
                    CellValue::text(e.name.clone()),
                    CellValue::text(e.branch.clone()),
                    e.region.clone().map_or(CellValue::Empty, CellValue::Text),
                ],
                None => {
                    tracing::warn!(code = %row.label, "unknown executive code");
                    [CellValue::Empty, CellValue::Empty, CellValue::Empty]
                }
            };
            row.values.extend(extra);
        }
        out
    }

    /// Replaces executive-code labels with their branch so the table can be aggregated
    /// per branch. Rows with unknown codes are dropped.
    pub fn relabel_by_branch(&self, table: &CleanTable) -> CleanTable {
        let mut out = CleanTable::new("BRANCH", table.headers.clone());
        out.rows = table
            .rows
            .iter()
            .filter_map(|row| {
                let exec = self.resolve(&row.label)?;
                Some(TableRow {
                    label: exec.branch.clone(),
                    values: row.values.clone(),
                })
            })
            .collect();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::aggregate;

    const CSV: &str = "code,name,branch,region\n\
                       e101,Anitha R,Pondy,\n\
                       E 102,Karthik S,br-Hosur,West\n\
                       E103,Meena V,Salem,\n";

    fn directory() -> ExecutiveDirectory {
        ExecutiveDirectory::from_csv(CSV.as_bytes(), &LabelNormalizer::default()).unwrap()
    }

    fn exec_table() -> CleanTable {
        CleanTable {
            label_header: "EXEC CODE".to_string(),
            headers: vec!["Act".to_string()],
            rows: vec![
                TableRow { label: "E101".into(), values: vec![CellValue::Number(4.0)] },
                TableRow { label: "E102".into(), values: vec![CellValue::Number(6.0)] },
                TableRow { label: "E103".into(), values: vec![CellValue::Number(1.0)] },
                TableRow { label: "E999".into(), values: vec![CellValue::Number(9.0)] },
            ],
        }
    }

    #[test]
    fn loads_and_normalizes_branches() {
        let dir = directory();
        assert_eq!(dir.len(), 3);
        let e = dir.resolve(" E101 ").unwrap();
        assert_eq!(e.name, "Anitha R");
        assert_eq!(e.branch, "PUDUCHERRY");
        assert_eq!(e.region.as_deref(), Some("NORTH"));

        let e = dir.resolve("e102").unwrap();
        assert_eq!(e.branch, "HOSUR");
        assert_eq!(e.region.as_deref(), Some("WEST"));
    }

    #[test]
    fn duplicate_codes_are_rejected() {
        let csv = "code,name,branch,region\nE1,A,Salem,\ne1,B,Erode,\n";
        let result = ExecutiveDirectory::from_csv(csv.as_bytes(), &LabelNormalizer::default());
        assert!(matches!(result, Err(DirectoryError::DuplicateCode(code)) if code == "E1"));
    }

    #[test]
    fn empty_codes_are_rejected() {
        let csv = "code,name,branch,region\n ,A,Salem,\n";
        let result = ExecutiveDirectory::from_csv(csv.as_bytes(), &LabelNormalizer::default());
        assert!(matches!(result, Err(DirectoryError::EmptyCode(_))));
    }

    #[test]
    fn annotate_appends_columns() {
        let table = directory().annotate(&exec_table());
        assert_eq!(table.headers, vec!["Act", "EXECUTIVE", "BRANCH", "REGION"]);
        assert_eq!(table.value("E101", "EXECUTIVE"), Some(&CellValue::text("Anitha R")));
        assert_eq!(table.value("E103", "REGION"), Some(&CellValue::text("WEST")));
        assert_eq!(table.value("E999", "BRANCH"), Some(&CellValue::Empty));
    }

    #[test]
    fn annotated_records_keep_the_code() {
        let mut source = exec_table();
        source.label_header = "BRANCH".to_string();
        let table = directory().annotate(&source);
        assert_eq!(table.label_header, EXEC_CODE_HEADER);

        let records = table.to_records();
        assert_eq!(records[0][EXEC_CODE_HEADER], "E101");
        assert_eq!(records[0]["BRANCH"], "PUDUCHERRY");
        assert_eq!(records[0].len(), 5);
    }

    #[test]
    fn relabelled_rows_aggregate_per_branch() {
        let branches = aggregate(&directory().relabel_by_branch(&exec_table()));
        let labels: Vec<&str> = branches.rows.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["PUDUCHERRY", "HOSUR", "SALEM"]);
        assert_eq!(branches.value("HOSUR", "Act"), Some(&CellValue::Number(6.0)));
    }
}
