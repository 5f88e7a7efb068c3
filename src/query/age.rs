//! Age categories and the birthdate windows they stand for.
//!
//! Category boundaries are expressed as engine date math relative to "now",
//! rounded to the day. Filter windows are inclusive at both ends, so adjacent
//! categories share their boundary day.

use crate::error::{CanvassError, Result};

use super::dsl::DateExpr;

/// Code of the "unknown age" sentinel in filters and KPI blocks.
pub const UNKNOWN_AGE_CODE: &str = "0";

/// Oldest boundary used to close the last KPI date range.
const OLDEST_YEARS: u32 = 150;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AgeCategory {
    Under18,
    From18To25,
    From25To35,
    From35To50,
    From50To65,
    Over65,
}

impl AgeCategory {
    pub const ALL: [AgeCategory; 6] = [
        AgeCategory::Under18,
        AgeCategory::From18To25,
        AgeCategory::From25To35,
        AgeCategory::From35To50,
        AgeCategory::From50To65,
        AgeCategory::Over65,
    ];

    pub fn from_code(code: &str) -> Result<Self> {
        match code {
            "1" => Ok(AgeCategory::Under18),
            "2" => Ok(AgeCategory::From18To25),
            "3" => Ok(AgeCategory::From25To35),
            "4" => Ok(AgeCategory::From35To50),
            "5" => Ok(AgeCategory::From50To65),
            "6" => Ok(AgeCategory::Over65),
            other => Err(CanvassError::UnsupportedValue(format!(
                "age category '{}' (expected 0 to 6)",
                other
            ))),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            AgeCategory::Under18 => 1,
            AgeCategory::From18To25 => 2,
            AgeCategory::From25To35 => 3,
            AgeCategory::From35To50 => 4,
            AgeCategory::From50To65 => 5,
            AgeCategory::Over65 => 6,
        }
    }

    /// (younger edge, older edge) in years; `None` is unbounded.
    fn years(self) -> (Option<u32>, Option<u32>) {
        match self {
            AgeCategory::Under18 => (None, Some(18)),
            AgeCategory::From18To25 => (Some(18), Some(25)),
            AgeCategory::From25To35 => (Some(25), Some(35)),
            AgeCategory::From35To50 => (Some(35), Some(50)),
            AgeCategory::From50To65 => (Some(50), Some(65)),
            AgeCategory::Over65 => (Some(65), None),
        }
    }

    /// Birthdate bounds `(gte, lte)` for the filter clause of this category.
    pub fn birthdate_bounds(self) -> (Option<DateExpr>, Option<DateExpr>) {
        let (younger, older) = self.years();
        (
            older.map(DateExpr::YearsAgo),
            younger.map(DateExpr::YearsAgo),
        )
    }

    /// Birthdate window `(from, to)` for the KPI date-range aggregation.
    /// Both ends are always bounded: today for the youngest category and
    /// 150 years ago for the oldest.
    pub fn kpi_window(self) -> (DateExpr, DateExpr) {
        let (younger, older) = self.years();
        let from = DateExpr::YearsAgo(older.unwrap_or(OLDEST_YEARS));
        let to = younger.map(DateExpr::YearsAgo).unwrap_or(DateExpr::Today);
        (from, to)
    }
}
