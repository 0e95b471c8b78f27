use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

use chrono::{DateTime, SecondsFormat, Utc};

use crate::firestore::error::{malformed_wire_value, unsupported_type, FirestoreResult};

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Point in time with nanosecond precision, independent of any time zone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: i32,
}

impl Timestamp {
    pub fn new(seconds: i64, nanos: i32) -> Self {
        let total = i64::from(nanos);
        Self {
            seconds: seconds + total.div_euclid(NANOS_PER_SECOND),
            nanos: total.rem_euclid(NANOS_PER_SECOND) as i32,
        }
    }

    pub fn now() -> Self {
        Self::from(Utc::now())
    }

    pub fn from_millis(millis: i64) -> Self {
        Self::new(millis.div_euclid(1_000), (millis.rem_euclid(1_000) * 1_000_000) as i32)
    }

    pub fn to_date_time(&self) -> FirestoreResult<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp(self.seconds, self.nanos as u32).ok_or_else(|| {
            unsupported_type(format!(
                "Timestamp {}s {}ns is outside the representable range",
                self.seconds, self.nanos
            ))
        })
    }

    /// RFC 3339 UTC text with the shortest of milli, micro or nano precision that loses nothing.
    pub fn to_rfc3339(&self) -> FirestoreResult<String> {
        let format = if self.nanos % 1_000_000 == 0 {
            SecondsFormat::Millis
        } else if self.nanos % 1_000 == 0 {
            SecondsFormat::Micros
        } else {
            SecondsFormat::Nanos
        };
        Ok(self.to_date_time()?.to_rfc3339_opts(format, true))
    }

    pub fn parse_rfc3339(value: &str) -> FirestoreResult<Self> {
        let parsed = DateTime::parse_from_rfc3339(value)
            .map_err(|err| malformed_wire_value(format!("Invalid timestamp '{value}': {err}")))?;
        Ok(Self::from(parsed.with_timezone(&Utc)))
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self {
            seconds: value.timestamp(),
            nanos: value.timestamp_subsec_nanos() as i32,
        }
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.seconds.cmp(&other.seconds) {
            Ordering::Equal => self.nanos.cmp(&other.nanos),
            ordering => ordering,
        }
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.to_rfc3339() {
            Ok(text) => f.write_str(&text),
            Err(_) => write!(f, "Timestamp({}s, {}ns)", self.seconds, self.nanos),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_nanoseconds() {
        let timestamp = Timestamp::new(1, 1_500_000_000);
        assert_eq!(timestamp.seconds, 2);
        assert_eq!(timestamp.nanos, 500_000_000);

        let negative = Timestamp::new(0, -1);
        assert_eq!(negative.seconds, -1);
        assert_eq!(negative.nanos, 999_999_999);
    }

    #[test]
    fn ordering() {
        let earlier = Timestamp::new(1, 0);
        let later = Timestamp::new(2, 0);
        assert!(earlier < later);
    }

    #[test]
    fn rfc3339_precision_widens_only_when_needed() {
        assert_eq!(
            Timestamp::new(0, 0).to_rfc3339().unwrap(),
            "1970-01-01T00:00:00.000Z"
        );
        assert_eq!(
            Timestamp::new(1, 123_000_000).to_rfc3339().unwrap(),
            "1970-01-01T00:00:01.123Z"
        );
        assert_eq!(
            Timestamp::new(1, 123_456_000).to_rfc3339().unwrap(),
            "1970-01-01T00:00:01.123456Z"
        );
        assert_eq!(
            Timestamp::new(1, 123_456_789).to_rfc3339().unwrap(),
            "1970-01-01T00:00:01.123456789Z"
        );
    }

    #[test]
    fn parses_offsets_and_fractions() {
        let parsed = Timestamp::parse_rfc3339("2024-03-01T12:00:00.5+01:00").unwrap();
        assert_eq!(parsed, Timestamp::parse_rfc3339("2024-03-01T11:00:00.500Z").unwrap());
        assert_eq!(parsed.nanos, 500_000_000);

        let err = Timestamp::parse_rfc3339("yesterday").unwrap_err();
        assert_eq!(err.code_str(), "firestore/malformed-wire-value");
    }

    #[test]
    fn from_millis_handles_negative_values() {
        let ts = Timestamp::from_millis(-1);
        assert_eq!(ts.seconds, -1);
        assert_eq!(ts.nanos, 999_000_000);
    }
}
