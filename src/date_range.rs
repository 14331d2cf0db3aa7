use crate::error::Error;
use chrono::{Datelike, Days, Months, NaiveDate};

/// Inclusive calendar date interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, Error> {
        if start > end {
            return Err(Error::InvalidRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }

        Ok(DateRange { start, end })
    }

    /// Splits the range into calendar-month sub-ranges, the first and last
    /// clipped to the overall bounds. Sub-ranges are contiguous,
    /// non-overlapping, and their union reconstructs the full range.
    pub fn month_partitions(&self) -> Vec<DateRange> {
        let mut ranges = Vec::new();
        let mut current = self.start;

        while current <= self.end {
            let month_start = first_of_month(current);
            let next_month = month_start + Months::new(1);
            let month_end = next_month - Days::new(1);

            ranges.push(DateRange {
                start: month_start.max(self.start),
                end: month_end.min(self.end),
            });

            current = next_month;
        }

        ranges
    }

    /// First day of the month the range starts in. Monthly tables use this
    /// as the partition value.
    pub fn month_key(&self) -> NaiveDate {
        first_of_month(self.start)
    }
}

pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
        .expect("first day of a month is always a valid date")
}

/// The single-day range covering the day before `today`.
pub fn yesterday(today: NaiveDate) -> DateRange {
    let day = today - Days::new(1);
    DateRange {
        start: day,
        end: day,
    }
}

/// The full calendar month before the one containing `today`.
pub fn previous_month(today: NaiveDate) -> DateRange {
    let end = first_of_month(today) - Days::new(1);
    DateRange {
        start: first_of_month(end),
        end,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Days;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_new_rejects_inverted_range() {
        let result = DateRange::new(date("2025-02-01"), date("2025-01-01"));
        assert!(matches!(result.unwrap_err(), Error::InvalidRange { .. }));
    }

    #[test]
    fn test_month_partitions_spans_calendar_months() {
        let range = DateRange::new(date("2023-01-15"), date("2023-04-10")).unwrap();
        let parts = range.month_partitions();

        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0].start, date("2023-01-15"));
        assert_eq!(parts[0].end, date("2023-01-31"));
        assert_eq!(parts[1].start, date("2023-02-01"));
        assert_eq!(parts[1].end, date("2023-02-28"));
        assert_eq!(parts[3].start, date("2023-04-01"));
        assert_eq!(parts[3].end, date("2023-04-10"));
    }

    #[test]
    fn test_month_partitions_union_has_no_gaps_or_overlaps() {
        let range = DateRange::new(date("2024-02-20"), date("2025-03-05")).unwrap();
        let parts = range.month_partitions();

        assert_eq!(parts.first().unwrap().start, range.start);
        assert_eq!(parts.last().unwrap().end, range.end);
        for pair in parts.windows(2) {
            assert_eq!(pair[0].end + Days::new(1), pair[1].start);
        }
        // 2024-02 through 2025-03 inclusive.
        assert_eq!(parts.len(), 14);
    }

    #[test]
    fn test_month_partitions_degenerate_range() {
        let range = DateRange::new(date("2025-06-15"), date("2025-06-15")).unwrap();
        let parts = range.month_partitions();

        assert_eq!(parts, vec![range]);
    }

    #[test]
    fn test_month_partitions_single_full_month() {
        let range = DateRange::new(date("2025-02-01"), date("2025-02-28")).unwrap();
        let parts = range.month_partitions();

        assert_eq!(parts, vec![range]);
    }

    #[test]
    fn test_yesterday() {
        let range = yesterday(date("2025-03-01"));
        assert_eq!(range.start, date("2025-02-28"));
        assert_eq!(range.end, date("2025-02-28"));
    }

    #[test]
    fn test_previous_month() {
        let range = previous_month(date("2025-01-15"));
        assert_eq!(range.start, date("2024-12-01"));
        assert_eq!(range.end, date("2024-12-31"));
    }

    #[test]
    fn test_month_key() {
        let range = DateRange::new(date("2025-11-05"), date("2025-11-20")).unwrap();
        assert_eq!(range.month_key(), date("2025-11-01"));
    }
}
