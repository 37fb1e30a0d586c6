//! Calendar quarters used to partition the cache.

use chrono::{Datelike, NaiveDate};
use std::fmt;

/// A `(year, quarter)` pair. Orders chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QuarterKey {
    pub year: i32,
    /// 1 to 4.
    pub quarter: u8,
}

impl QuarterKey {
    pub fn new(year: i32, quarter: u8) -> Option<Self> {
        (1..=4).contains(&quarter).then_some(Self { year, quarter })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            quarter: (date.month0() / 3 + 1) as u8,
        }
    }

    /// The quarter before this one, wrapping into the previous year.
    pub fn previous(self) -> Self {
        if self.quarter == 1 {
            Self {
                year: self.year - 1,
                quarter: 4,
            }
        } else {
            Self {
                year: self.year,
                quarter: self.quarter - 1,
            }
        }
    }

    /// Oldest quarter kept in the active store on `today`.
    ///
    /// Partitions strictly older than this are archived.
    pub fn retention_threshold(today: NaiveDate) -> Self {
        Self::from_date(today).previous()
    }

    /// Archive bucket file name, e.g. `news_archive_Q4_2024.bin`.
    pub fn archive_file_name(self) -> String {
        format!("news_archive_Q{}_{}.bin", self.quarter, self.year)
    }
}

impl fmt::Display for QuarterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-Q{}", self.year, self.quarter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_from_date_boundaries() {
        assert_eq!(QuarterKey::from_date(date(2025, 1, 1)), QuarterKey::new(2025, 1).unwrap());
        assert_eq!(QuarterKey::from_date(date(2025, 3, 31)), QuarterKey::new(2025, 1).unwrap());
        assert_eq!(QuarterKey::from_date(date(2025, 4, 1)), QuarterKey::new(2025, 2).unwrap());
        assert_eq!(QuarterKey::from_date(date(2025, 9, 30)), QuarterKey::new(2025, 3).unwrap());
        assert_eq!(QuarterKey::from_date(date(2025, 12, 31)), QuarterKey::new(2025, 4).unwrap());
    }

    #[test]
    fn test_threshold_in_first_quarter_wraps_year() {
        for month in 1..=3 {
            let t = QuarterKey::retention_threshold(date(2025, month, 15));
            assert_eq!(t, QuarterKey { year: 2024, quarter: 4 });
        }
    }

    #[test]
    fn test_threshold_in_later_quarters() {
        for (month, expected) in [(4, 1), (6, 1), (7, 2), (9, 2), (10, 3), (12, 3)] {
            let t = QuarterKey::retention_threshold(date(2025, month, 1));
            assert_eq!(t, QuarterKey { year: 2025, quarter: expected });
        }
    }

    #[test]
    fn test_ordering_is_chronological() {
        let q4_2024 = QuarterKey::new(2024, 4).unwrap();
        let q1_2025 = QuarterKey::new(2025, 1).unwrap();
        let q2_2025 = QuarterKey::new(2025, 2).unwrap();
        assert!(q4_2024 < q1_2025);
        assert!(q1_2025 < q2_2025);
        assert_eq!(q1_2025.previous(), q4_2024);
    }

    #[test]
    fn test_invalid_quarter_rejected() {
        assert!(QuarterKey::new(2025, 0).is_none());
        assert!(QuarterKey::new(2025, 5).is_none());
    }

    #[test]
    fn test_archive_file_name_and_display() {
        let key = QuarterKey::new(2024, 4).unwrap();
        assert_eq!(key.archive_file_name(), "news_archive_Q4_2024.bin");
        assert_eq!(key.to_string(), "2024-Q4");
    }
}
