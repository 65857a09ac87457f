use salesdesk_core::{CellValue, CleanTable, FiscalMonth, TableRow};
use thiserror::Error;

use crate::report::{aggregate, is_additive};

#[derive(Error, Debug, PartialEq)]
pub enum MergeError {
    #[error("Nothing to merge")]
    Empty,
    #[error("At most 12 monthly files can be merged, got {0}")]
    TooManyMonths(usize),
    #[error("More than one file for {0}")]
    DuplicateMonth(FiscalMonth),
}

fn sorted_months(
    mut inputs: Vec<(FiscalMonth, CleanTable)>,
) -> Result<Vec<(FiscalMonth, CleanTable)>, MergeError> {
    if inputs.is_empty() {
        return Err(MergeError::Empty);
    }
    if inputs.len() > 12 {
        return Err(MergeError::TooManyMonths(inputs.len()));
    }
    inputs.sort_by_key(|(m, _)| *m);
    if let Some(pair) = inputs.windows(2).find(|w| w[0].0 == w[1].0) {
        return Err(MergeError::DuplicateMonth(pair[0].0));
    }
    Ok(inputs)
}

/// Merges up to twelve monthly tables into one cumulative table.
///
/// Months are folded in fiscal order (April first), so labels appear in the order they are
/// first seen. Additive columns are unioned by header and summed.
pub fn merge_monthly(inputs: Vec<(FiscalMonth, CleanTable)>) -> Result<CleanTable, MergeError> {
    let inputs = sorted_months(inputs)?;

    let mut headers: Vec<String> = Vec::new();
    for (_, table) in &inputs {
        for (c, h) in table.headers.iter().enumerate() {
            if is_additive(table, c) && !headers.contains(h) {
                headers.push(h.clone());
            }
        }
    }

    let mut combined = CleanTable::new(inputs[0].1.label_header.clone(), headers.clone());
    for (month, table) in &inputs {
        tracing::debug!(%month, rows = table.rows.len(), "folding month");
        for row in &table.rows {
            let values = headers
                .iter()
                .map(|h| {
                    table
                        .column(h)
                        .and_then(|c| row.values.get(c))
                        .cloned()
                        .unwrap_or_default()
                })
                .collect();
            combined.rows.push(TableRow {
                label: row.label.clone(),
                values,
            });
        }
    }

    Ok(aggregate(&combined))
}

/// One column per month for a single header, e.g. monthly `Act` per branch.
pub fn month_wise(
    inputs: Vec<(FiscalMonth, CleanTable)>,
    header: &str,
) -> Result<CleanTable, MergeError> {
    let inputs = sorted_months(inputs)?;
    let months: Vec<String> = inputs.iter().map(|(m, _)| m.to_string()).collect();

    let mut out = CleanTable::new(inputs[0].1.label_header.clone(), months);
    let width = inputs.len();
    for (i, (_, table)) in inputs.iter().enumerate() {
        let monthly = aggregate(table);
        let Some(col) = monthly.column(header) else {
            continue;
        };
        for row in &monthly.rows {
            let idx = match out.rows.iter().position(|r| r.label == row.label) {
                Some(idx) => idx,
                None => {
                    out.rows.push(TableRow {
                        label: row.label.clone(),
                        values: vec![CellValue::Empty; width],
                    });
                    out.rows.len() - 1
                }
            };
            out.rows[idx].values[i] = row.values[col].clone();
        }
    }
    Ok(out)
}
