use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Internal fixed-point timestamp: `<seconds>.<6-digit-fraction>_<8-digit-offset>`.
///
/// The offset disambiguates writes that land in the same microsecond, and is
/// bumped by [`Timestamp::tick`] so a delete can be made to durably win over a
/// concurrent write carrying the same base timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub seconds: i64,
    pub frac_micros: u32,
    pub offset: u32,
}

impl Timestamp {
    pub fn new(seconds: i64, frac_micros: u32, offset: u32) -> Self {
        debug_assert!(frac_micros <= 999_999);
        debug_assert!(offset <= 99_999_999);
        Self {
            seconds,
            frac_micros,
            offset,
        }
    }

    pub fn from_epoch_seconds(seconds: i64) -> Self {
        Self::new(seconds, 0, 0)
    }

    pub fn from_epoch_float(secs: f64) -> Self {
        let seconds = secs.floor() as i64;
        let frac = secs - seconds as f64;
        let frac_micros = (frac * 1_000_000.0).round() as u32;
        Self::new(seconds, frac_micros.min(999_999), 0)
    }

    /// Returns a copy with the offset incremented by one, used to make a
    /// delete win over a write bearing the same timestamp.
    pub fn tick(&self) -> Self {
        Self::new(self.seconds, self.frac_micros, self.offset + 1)
    }

    pub fn as_epoch_seconds_f64(&self) -> f64 {
        self.seconds as f64 + (self.frac_micros as f64 / 1_000_000.0)
    }

    /// True if `self` and `other` are within one second of each other,
    /// ignoring the offset tie-breaker.
    pub fn within_one_second(&self, other: &Timestamp) -> bool {
        (self.as_epoch_seconds_f64() - other.as_epoch_seconds_f64()).abs() < 1.0
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.seconds, self.frac_micros, self.offset).cmp(&(
            other.seconds,
            other.frac_micros,
            other.offset,
        ))
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:010}.{:06}_{:08}",
            self.seconds, self.frac_micros, self.offset
        )
    }
}

impl FromStr for Timestamp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (main, offset) = s
            .split_once('_')
            .ok_or_else(|| Error::Generic(format!("malformed timestamp: {s}")))?;
        let (secs, frac) = main
            .split_once('.')
            .ok_or_else(|| Error::Generic(format!("malformed timestamp: {s}")))?;

        let seconds: i64 = secs
            .parse()
            .map_err(|_| Error::Generic(format!("malformed timestamp seconds: {s}")))?;
        let frac_micros: u32 = frac
            .parse()
            .map_err(|_| Error::Generic(format!("malformed timestamp fraction: {s}")))?;
        let offset: u32 = offset
            .parse()
            .map_err(|_| Error::Generic(format!("malformed timestamp offset: {s}")))?;

        Ok(Self::new(seconds, frac_micros, offset))
    }
}

/// Parse an RFC3339 `last_modified` listing timestamp into epoch seconds.
pub fn parse_last_modified(s: &str) -> Result<f64> {
    let dt = chrono::DateTime::parse_from_rfc3339(s)
        .map_err(|e| Error::Generic(format!("invalid last_modified '{s}': {e}")))?;
    Ok(dt.timestamp() as f64 + dt.timestamp_subsec_micros() as f64 / 1_000_000.0)
}

/// Resolve the timestamp to write an object with, given the remote listing's
/// `last_modified` and the (possibly more precise) timestamp observed on a
/// HEAD/GET of the object itself. Prefers the listing timestamp when the two
/// agree on sub-second resolution within one second of each other.
pub fn resolve_write_timestamp(listing_epoch: f64, head_epoch: Option<f64>) -> Timestamp {
    let listing_ts = Timestamp::from_epoch_float(listing_epoch);
    match head_epoch {
        Some(head) => {
            let head_ts = Timestamp::from_epoch_float(head);
            if listing_ts.frac_micros != 0 && listing_ts.within_one_second(&head_ts) {
                listing_ts
            } else {
                head_ts
            }
        }
        None => listing_ts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_display_and_parse() {
        let ts = Timestamp::new(1_700_000_000, 123_456, 0);
        let s = ts.to_string();
        let parsed: Timestamp = s.parse().unwrap();
        assert_eq!(ts, parsed);
    }

    #[test]
    fn tick_increments_offset_only() {
        let ts = Timestamp::new(100, 0, 0);
        let ticked = ts.tick();
        assert_eq!(ticked.offset, 1);
        assert_eq!(ticked.seconds, ts.seconds);
        assert!(ticked > ts);
    }

    #[test]
    fn orders_by_seconds_then_frac_then_offset() {
        let a = Timestamp::new(100, 500, 0);
        let b = Timestamp::new(100, 500, 1);
        let c = Timestamp::new(101, 0, 0);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn prefers_listing_timestamp_within_one_second_skew() {
        let resolved = resolve_write_timestamp(1000.25, Some(1000.9));
        assert_eq!(resolved.seconds, 1000);
        assert_eq!(resolved.frac_micros, 250_000);
    }

    #[test]
    fn falls_back_to_head_timestamp_beyond_one_second_skew() {
        let resolved = resolve_write_timestamp(1000.0, Some(1005.0));
        assert_eq!(resolved.seconds, 1005);
    }
}
