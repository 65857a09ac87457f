use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::grid::{CellGrid, CellValue};

pub const DEFAULT_ANCHOR_MARKERS: &[&str] = &["REGIONS", "BRANCH", "PRODUCT"];
pub const DEFAULT_LOOKAHEAD: usize = 4;

/// Row indices delimiting a sub-table found inside a sheet.
///
/// `data_start_row` is the anchor row; data follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRegion {
    pub header_row: usize,
    pub data_start_row: usize,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("No header row matching {candidates:?} followed by an anchor row")]
pub struct LayoutNotFound {
    pub candidates: Vec<String>,
}

/// Finds an embedded table by header phrase plus anchor keyword.
#[derive(Debug, Clone)]
pub struct LayoutLocator {
    anchor_markers: Vec<String>,
    lookahead: usize,
}

impl Default for LayoutLocator {
    fn default() -> Self {
        Self::new(DEFAULT_ANCHOR_MARKERS.iter().copied(), DEFAULT_LOOKAHEAD)
    }
}

impl LayoutLocator {
    pub fn new<I, S>(anchor_markers: I, lookahead: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            anchor_markers: anchor_markers
                .into_iter()
                .map(|m| m.as_ref().trim().to_uppercase())
                .collect(),
            lookahead,
        }
    }

    /// Returns the first header row (top to bottom) that matches a candidate and has an
    /// anchor row within the lookahead window.
    ///
    /// Candidates are tried in the given order; the first one contained in the row wins.
    /// A header match without an anchor does not stop the scan.
    pub fn locate<S: AsRef<str>>(
        &self,
        grid: &CellGrid,
        header_candidates: &[S],
    ) -> Result<TableRegion, LayoutNotFound> {
        let candidates: Vec<String> = header_candidates
            .iter()
            .map(|c| c.as_ref().to_lowercase())
            .collect();

        for (i, row) in grid.rows().iter().enumerate() {
            let text = row_text(row);
            if !candidates.iter().any(|c| text.contains(c.as_str())) {
                continue;
            }

            let window_end = (i + self.lookahead).min(grid.len().saturating_sub(1));
            if let Some(j) = (i + 1..=window_end).find(|&j| self.is_anchor(grid, j)) {
                tracing::debug!(header_row = i, data_start_row = j, "located table region");
                return Ok(TableRegion {
                    header_row: i,
                    data_start_row: j,
                });
            }
        }

        Err(LayoutNotFound {
            candidates: header_candidates
                .iter()
                .map(|c| c.as_ref().to_string())
                .collect(),
        })
    }

    fn is_anchor(&self, grid: &CellGrid, row: usize) -> bool {
        let first = grid.cell(row, 0).to_string().trim().to_uppercase();
        !first.is_empty() && self.anchor_markers.iter().any(|m| first.contains(m.as_str()))
    }
}

/// Locates a table with the default anchor markers and lookahead.
pub fn locate<S: AsRef<str>>(
    grid: &CellGrid,
    header_candidates: &[S],
) -> Result<TableRegion, LayoutNotFound> {
    LayoutLocator::default().locate(grid, header_candidates)
}

fn row_text(row: &[CellValue]) -> String {
    row.iter()
        .filter(|c| !c.is_blank())
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
