use chrono::{NaiveDate, NaiveTime};

use crate::error::{Error, Result};
use crate::store::TimeWindow;

/// Rounds to two decimal places, half away from zero.
pub(crate) fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// UTC window covering one calendar day: `[00:00, next day 00:00)`.
pub(crate) fn day_window(date: NaiveDate) -> Result<TimeWindow> {
    date_range_window(date, date)
}

/// UTC window covering `[start, end]` as whole days.
pub(crate) fn date_range_window(start: NaiveDate, end: NaiveDate) -> Result<TimeWindow> {
    let end_next = end
        .succ_opt()
        .ok_or_else(|| Error::Validation(format!("date out of range: {end}")))?;
    Ok(TimeWindow::new(
        start.and_time(NaiveTime::MIN).and_utc(),
        end_next.and_time(NaiveTime::MIN).and_utc(),
    ))
}

/// Worker pool size for a query invocation.
pub(crate) fn pool_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
