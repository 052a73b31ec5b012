use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

/// Abstracts the wall clock so scheduling and polling can be driven
/// deterministically in tests.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Block the calling thread for `duration`.
    fn sleep(&self, duration: std::time::Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: std::time::Duration) {
        std::thread::sleep(duration);
    }
}

/// Manually driven clock. `sleep` advances the shared time instead of
/// blocking, so poll loops run instantly.
#[derive(Debug, Clone)]
pub struct FakeTimeSource {
    t: Arc<Mutex<DateTime<Utc>>>,
}

impl FakeTimeSource {
    pub fn new(t: DateTime<Utc>) -> Self {
        Self { t: Arc::new(Mutex::new(t)) }
    }

    pub fn set(&self, t: DateTime<Utc>) {
        *self.t.lock().unwrap_or_else(|e| e.into_inner()) = t;
    }

    pub fn advance(&self, d: Duration) {
        let mut t = self.t.lock().unwrap_or_else(|e| e.into_inner());
        *t += d;
    }
}

impl TimeSource for FakeTimeSource {
    fn now(&self) -> DateTime<Utc> {
        *self.t.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn sleep(&self, duration: std::time::Duration) {
        let d = Duration::from_std(duration).unwrap_or(Duration::MAX);
        self.advance(d);
        std::thread::yield_now();
    }
}

/// Convert fractional seconds into a `chrono::Duration` with nanosecond
/// precision (rounded).
pub fn duration_from_secs_f64(secs: f64) -> Duration {
    Duration::nanoseconds((secs * 1e9).round() as i64)
}

pub fn duration_as_secs_f64(d: Duration) -> f64 {
    match d.num_nanoseconds() {
        Some(n) => n as f64 / 1e9,
        None => d.num_milliseconds() as f64 / 1e3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fake_clock_sleep_advances_time() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let clock = FakeTimeSource::new(start);
        clock.sleep(std::time::Duration::from_secs(5));
        assert_eq!(clock.now(), start + Duration::seconds(5));

        clock.advance(Duration::minutes(1));
        assert_eq!(clock.now(), start + Duration::seconds(65));

        clock.set(start);
        assert_eq!(clock.now(), start);
    }

    #[test]
    fn fake_clock_clones_share_time() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let clock = FakeTimeSource::new(start);
        let other = clock.clone();
        other.advance(Duration::seconds(3));
        assert_eq!(clock.now(), start + Duration::seconds(3));
    }

    #[test]
    fn fractional_seconds_convert_exactly() {
        assert_eq!(duration_from_secs_f64(4.0 * 1.1), Duration::milliseconds(4400));
        assert_eq!(duration_from_secs_f64(0.5), Duration::milliseconds(500));
        assert_eq!(duration_as_secs_f64(Duration::milliseconds(1500)), 1.5);
    }
}
