//! Time bucketing: normalising timestamps to a granularity and locating the
//! chunk period a bucket lives in.
//!
//! All arithmetic is in UTC.

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// The bucket width of a chunk's data points.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  strum::Display,
  strum::AsRefStr,
  strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Granularity {
  Daily,
  Monthly,
  Yearly,
}

impl Granularity {
  /// Truncate `at` to the start of its bucket.
  pub fn normalize(self, at: DateTime<Utc>) -> DateTime<Utc> {
    let date = at.date_naive();
    let start = match self {
      Self::Daily => date,
      Self::Monthly => date.with_day(1).unwrap_or(date),
      Self::Yearly => date.with_day(1).and_then(|d| d.with_month(1)).unwrap_or(date),
    };
    midnight(start)
  }

  /// Start of the chunk period holding the bucket of `at`.
  ///
  /// Daily buckets are chunked per month, monthly buckets per year, and all
  /// yearly buckets share a single chunk anchored at the epoch.
  pub fn chunk_anchor(self, at: DateTime<Utc>) -> DateTime<Utc> {
    match self {
      Self::Daily => Self::Monthly.normalize(at),
      Self::Monthly => Self::Yearly.normalize(at),
      Self::Yearly => DateTime::<Utc>::UNIX_EPOCH,
    }
  }

  /// Start of the chunk period following the one anchored at `anchor`.
  /// `None` for the unbounded yearly chunk.
  pub fn next_chunk_anchor(self, anchor: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match self {
      Self::Daily => anchor.checked_add_months(Months::new(1)),
      Self::Monthly => anchor.checked_add_months(Months::new(12)),
      Self::Yearly => None,
    }
  }

  /// [`Self::normalize`] over unix seconds.
  pub fn normalize_ts(self, ts: i64) -> Result<i64> {
    Ok(self.normalize(to_datetime(ts)?).timestamp())
  }

  /// [`Self::chunk_anchor`] over unix seconds.
  pub fn chunk_anchor_ts(self, ts: i64) -> Result<i64> {
    Ok(self.chunk_anchor(to_datetime(ts)?).timestamp())
  }
}

/// Today's date at 00:00 UTC; the target date of a collection run.
pub fn start_of_day(at: DateTime<Utc>) -> DateTime<Utc> {
  Granularity::Daily.normalize(at)
}

/// The next day boundary after `day`.
pub fn next_day(day: DateTime<Utc>) -> Result<DateTime<Utc>> {
  day
    .checked_add_days(Days::new(1))
    .ok_or(Error::InvalidTimestamp(day.timestamp()))
}

pub fn to_datetime(ts: i64) -> Result<DateTime<Utc>> {
  DateTime::from_timestamp(ts, 0).ok_or(Error::InvalidTimestamp(ts))
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
  Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}
