pub mod grid;
pub mod locate;
pub mod money;
pub mod normalize;
pub mod period;
pub mod similarity;
pub mod table;

pub use grid::{CellGrid, CellValue};
pub use locate::{locate, LayoutLocator, LayoutNotFound, TableRegion};
pub use money::Amount;
pub use normalize::{
    AliasEntry, ConfigError, HeaderReplacement, LabelNormalizer, NormalizerConfig, Resolution,
};
pub use period::FiscalMonth;
pub use similarity::{LevenshteinRatio, Similarity};
pub use table::{extract_keyed_table, extract_table, extract_table_with, CleanTable, TableRow};
