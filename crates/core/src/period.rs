use chrono::Month;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A calendar month positioned within the April-to-March fiscal year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FiscalMonth(Month);

impl FiscalMonth {
    pub fn new(month: Month) -> Self {
        FiscalMonth(month)
    }

    pub fn month(self) -> Month {
        self.0
    }

    /// 0 for April through 11 for March.
    pub fn index(self) -> u8 {
        ((self.0.number_from_month() + 8) % 12) as u8
    }

    pub fn all() -> impl Iterator<Item = FiscalMonth> {
        let mut m = Month::April;
        (0..12).map(move |_| {
            let current = m;
            m = m.succ();
            FiscalMonth(current)
        })
    }

    /// Finds a month name or three-letter abbreviation among the words of a file name,
    /// e.g. `"Sales_Apr_2024.xlsx"` or `"june sales.xlsx"`.
    pub fn from_file_name(name: &str) -> Option<Self> {
        name.split(|c: char| !c.is_ascii_alphabetic())
            .filter(|w| w.len() >= 3)
            .find_map(|w| {
                let w = if w.eq_ignore_ascii_case("sept") { "sep" } else { w };
                w.parse::<Month>().ok()
            })
            .map(FiscalMonth)
    }
}

impl PartialOrd for FiscalMonth {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FiscalMonth {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.index().cmp(&other.index())
    }
}

impl fmt::Display for FiscalMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.0.name();
        write!(f, "{}", &name[..3])
    }
}
