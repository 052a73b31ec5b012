use chrono::{DateTime, Duration, Utc};

/// Resolution of day-ahead forecasts.
pub fn quarter_hour() -> Duration {
    Duration::minutes(15)
}

/// How far ahead day-ahead data is published.
pub fn forecast_horizon() -> Duration {
    Duration::days(2)
}

/// Round `t` up to the next multiple of `step` since the Unix epoch.
/// Values already on the grid are returned unchanged.
pub fn ceil_to(t: DateTime<Utc>, step: Duration) -> DateTime<Utc> {
    let (Some(ts), Some(step_ns)) = (t.timestamp_nanos_opt(), step.num_nanoseconds()) else {
        return t;
    };
    if step_ns <= 0 {
        return t;
    }
    match ts.rem_euclid(step_ns) {
        0 => t,
        rem => t + Duration::nanoseconds(step_ns - rem),
    }
}

/// `[next quarter hour from start, ceil15(now + 2 days)]`.
pub fn forecast_window(start: DateTime<Utc>, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    (
        ceil_to(start, quarter_hour()),
        ceil_to(now + forecast_horizon(), quarter_hour()),
    )
}
