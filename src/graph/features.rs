//! Time-of-day features for observations
//!
//! Used by downstream models that want the local clock time of a visit
//! without caring about the date.

use super::types::SpatialObservation;
use chrono::{TimeZone, Timelike};
use std::f64::consts::TAU;

const SECONDS_PER_DAY: u32 = 86_400;
const BUCKET_SECONDS: u32 = 300;

impl SpatialObservation {
    /// Seconds since local midnight in `tz` (0..=86399)
    pub fn seconds_since_midnight<Tz: TimeZone>(&self, tz: &Tz) -> u32 {
        // Leap seconds report second 60; keep the result inside the day
        self.captured_at
            .with_timezone(tz)
            .num_seconds_from_midnight()
            .min(SECONDS_PER_DAY - 1)
    }

    /// Time of day on the unit circle as `(sin, cos)`, so 23:59 sits next to 00:00
    pub fn cyclic_time_of_day<Tz: TimeZone>(&self, tz: &Tz) -> (f64, f64) {
        let angle = TAU * f64::from(self.seconds_since_midnight(tz)) / f64::from(SECONDS_PER_DAY);
        angle.sin_cos()
    }

    /// Five-minute slot of the local day (0..=287)
    pub fn five_minute_bucket<Tz: TimeZone>(&self, tz: &Tz) -> u32 {
        self.seconds_since_midnight(tz) / BUCKET_SECONDS
    }
}
