//! TimeBase - shared acquisition clock
//!
//! A wall-clock anchor captured at reset plus a monotonic offset measured
//! from the same moment. Every reading, fix and tick of a session is stamped
//! from one `TimeBase`, so instants coming from different devices can be
//! compared directly and never go backwards when the system clock is adjusted.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, NaiveDateTime, SubsecRound, TimeDelta, TimeZone, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// 100ns ticks between 0001-01-01T00:00:00 and the Unix epoch
const TICKS_AT_UNIX_EPOCH: i64 = 621_355_968_000_000_000;

const ISO_MICROS: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Wall-clock instant with microsecond precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Local>);

impl Timestamp {
    /// Wrap a local datetime, truncating to microseconds
    pub fn from_datetime(datetime: DateTime<Local>) -> Self {
        Self(datetime.trunc_subsecs(6))
    }

    /// Current system time, bypassing any `TimeBase`
    pub fn system_now() -> Self {
        Self::from_datetime(Local::now())
    }

    /// Underlying local datetime
    pub fn datetime(&self) -> DateTime<Local> {
        self.0
    }

    /// `YYYY-MM-DDTHH:MM:SS.ffffff`
    pub fn to_iso_micros(&self) -> String {
        self.0.format(ISO_MICROS).to_string()
    }

    /// `YYYY-MM-DDTHH:MM:SS.fff`
    pub fn to_iso_millis(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
    }

    /// `YYYY-MM-DDTHH:MM:SS`
    pub fn to_iso_seconds(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%S").to_string()
    }

    /// UTC form used by GPX: `YYYY-MM-DDTHH:MM:SSZ`
    pub fn to_rfc3339_utc(&self) -> String {
        self.0
            .with_timezone(&Utc)
            .format("%Y-%m-%dT%H:%M:%SZ")
            .to_string()
    }

    /// `YYYY-MM-DD`
    pub fn date_string(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }

    /// `HH:MM:SS`
    pub fn time_string(&self) -> String {
        self.0.format("%H:%M:%S").to_string()
    }

    /// `YYYYMMDD_HHMMSS`, used for session file names
    pub fn file_stamp(&self) -> String {
        self.0.format("%Y%m%d_%H%M%S").to_string()
    }

    /// Milliseconds since the Unix epoch
    pub fn unix_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    /// Microseconds since the Unix epoch
    pub fn unix_micros(&self) -> i64 {
        self.0.timestamp_micros()
    }

    /// Local wall time as 100ns ticks since 0001-01-01.
    ///
    /// This is the clock unit the sensor firmware echoes back in its
    /// `GET,<sequence>,<ticks>` handshake.
    pub fn ticks(&self) -> i64 {
        self.0.naive_local().and_utc().timestamp_micros() * 10 + TICKS_AT_UNIX_EPOCH
    }

    /// Signed duration from `earlier` to `self`
    pub fn signed_duration_since(&self, earlier: &Timestamp) -> TimeDelta {
        self.0.signed_duration_since(earlier.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_iso_micros())
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_iso_micros())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let naive = NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map_err(de::Error::custom)?;
        Local
            .from_local_datetime(&naive)
            .earliest()
            .map(Self::from_datetime)
            .ok_or_else(|| de::Error::custom(format!("nonexistent local time: {raw}")))
    }
}

#[derive(Debug, Clone, Copy)]
struct Anchor {
    wall: DateTime<Local>,
    origin: Instant,
}

impl Anchor {
    fn capture() -> Self {
        Self {
            wall: Local::now(),
            origin: Instant::now(),
        }
    }
}

/// Shared session clock
///
/// Cloning is cheap; all clones observe the same anchor, so a `reset()`
/// issued by the session recorder is seen by every link and by the sync loop.
#[derive(Debug, Clone)]
pub struct TimeBase {
    anchor: Arc<RwLock<Anchor>>,
}

impl TimeBase {
    /// Create a time base anchored at the current instant
    pub fn new() -> Self {
        Self {
            anchor: Arc::new(RwLock::new(Anchor::capture())),
        }
    }

    /// Current instant: anchor wall time plus monotonic elapsed time
    pub fn now(&self) -> Timestamp {
        let anchor = *self.anchor.read().unwrap_or_else(PoisonError::into_inner);
        let elapsed = anchor.origin.elapsed();
        let offset = TimeDelta::microseconds(elapsed.as_micros() as i64);
        Timestamp::from_datetime(anchor.wall + offset)
    }

    /// Monotonic time elapsed since the last reset
    pub fn elapsed(&self) -> Duration {
        self.anchor
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .origin
            .elapsed()
    }

    /// Re-anchor to the current wall-clock time
    pub fn reset(&self) {
        *self.anchor.write().unwrap_or_else(PoisonError::into_inner) = Anchor::capture();
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::new()
    }
}
