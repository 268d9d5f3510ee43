//! Discrete time buckets and inclusive date ranges.
//!
//! Buckets are integer indices counted from the Unix epoch so that two runs
//! with the same bucket size always agree on bucket boundaries. Weekly
//! buckets start on Monday 00:00 UTC.

use crate::error::TypesError;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

const SECS_PER_HOUR: i64 = 3_600;
const SECS_PER_DAY: i64 = 86_400;
/// 1970-01-05 was the first Monday after the epoch.
const WEEK_ORIGIN_SECS: i64 = 4 * SECS_PER_DAY;

/// Width of a time bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeBucketSize {
    Hour,
    #[default]
    Day,
    Week,
}

impl TimeBucketSize {
    pub fn seconds(self) -> i64 {
        match self {
            TimeBucketSize::Hour => SECS_PER_HOUR,
            TimeBucketSize::Day => SECS_PER_DAY,
            TimeBucketSize::Week => 7 * SECS_PER_DAY,
        }
    }

    fn origin(self) -> i64 {
        match self {
            TimeBucketSize::Week => WEEK_ORIGIN_SECS,
            _ => 0,
        }
    }

    /// Bucket containing the instant `at`.
    pub fn bucket_of(self, at: DateTime<Utc>) -> TimeBucket {
        TimeBucket((at.timestamp() - self.origin()).div_euclid(self.seconds()))
    }

    /// Inclusive start of `bucket`.
    pub fn start_of(self, bucket: TimeBucket) -> DateTime<Utc> {
        let secs = bucket
            .0
            .saturating_mul(self.seconds())
            .saturating_add(self.origin());
        DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Exclusive end of `bucket`.
    pub fn end_of(self, bucket: TimeBucket) -> DateTime<Utc> {
        self.start_of(bucket.next())
    }

    /// All buckets overlapping the inclusive date range, in ascending order.
    pub fn buckets_in(self, range: &DateRange) -> Vec<TimeBucket> {
        let first = self.bucket_of(range.start_instant());
        let last = self.bucket_of(range.end_instant() - chrono::Duration::seconds(1));
        (first.0..=last.0).map(TimeBucket).collect()
    }
}

impl fmt::Display for TimeBucketSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TimeBucketSize::Hour => "hour",
            TimeBucketSize::Day => "day",
            TimeBucketSize::Week => "week",
        };
        f.write_str(s)
    }
}

/// Index of a time bucket for a given [`TimeBucketSize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeBucket(pub i64);

impl TimeBucket {
    pub fn next(self) -> Self {
        TimeBucket(self.0.saturating_add(1))
    }
}

impl fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inclusive range of calendar dates (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, TypesError> {
        if start > end {
            return Err(TypesError::InvalidDateRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// Midnight UTC at the start of `start`.
    pub fn start_instant(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.start.and_time(NaiveTime::MIN))
    }

    /// Midnight UTC after `end` (exclusive bound).
    pub fn end_instant(&self) -> DateTime<Utc> {
        let next = self.end.succ_opt().unwrap_or(self.end);
        Utc.from_utc_datetime(&next.and_time(NaiveTime::MIN))
    }

    /// True when the half-open interval `[start, end)` overlaps this range.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start < self.end_instant() && end > self.start_instant()
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start_instant() && at < self.end_instant()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn day_buckets_are_epoch_aligned() {
        let size = TimeBucketSize::Day;
        let b = size.bucket_of(at("2024-03-10T13:45:00Z"));
        assert_eq!(size.start_of(b), at("2024-03-10T00:00:00Z"));
        assert_eq!(size.end_of(b), at("2024-03-11T00:00:00Z"));
    }

    #[test]
    fn week_buckets_start_on_monday() {
        let size = TimeBucketSize::Week;
        // 2024-03-10 is a Sunday, its week began Monday 2024-03-04
        let b = size.bucket_of(at("2024-03-10T23:59:59Z"));
        assert_eq!(size.start_of(b), at("2024-03-04T00:00:00Z"));
        let next = size.bucket_of(at("2024-03-11T00:00:00Z"));
        assert_eq!(next, b.next());
    }

    #[test]
    fn pre_epoch_instants_floor_correctly() {
        let size = TimeBucketSize::Day;
        let b = size.bucket_of(at("1969-12-31T23:00:00Z"));
        assert_eq!(b, TimeBucket(-1));
    }

    #[test]
    fn buckets_in_range_are_inclusive() {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
        )
        .unwrap();
        let buckets = TimeBucketSize::Day.buckets_in(&range);
        assert_eq!(buckets.len(), 3);
        assert!(buckets.windows(2).all(|w| w[1] == w[0].next()));
        assert_eq!(TimeBucketSize::Hour.buckets_in(&range).len(), 72);
    }

    #[test]
    fn inverted_range_is_rejected() {
        let err = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        );
        assert!(err.is_err());
    }
}
