use chrono::{Datelike, NaiveDate, NaiveTime};

/// Supplies the actual market close time (ET) for a given civil date, so
/// `check_eod_flatten` can reproject its configured offset onto early-close
/// days instead of assuming every day closes at 16:00. Exchange holiday
/// calendars are out of scope for this crate; callers that need a real
/// calendar can supply their own `MarketCalendar` impl. The default here
/// only knows the regular close and a short table of well-known early
/// closes, enough to exercise the reprojection logic correctly.
pub trait MarketCalendar: Send + Sync {
    fn actual_close(&self, date: NaiveDate) -> NaiveTime;
}

const REGULAR_CLOSE: NaiveTime = NaiveTime::from_hms_opt(16, 0, 0).unwrap();
const EARLY_CLOSE: NaiveTime = NaiveTime::from_hms_opt(13, 0, 0).unwrap();

/// A handful of well-known NYSE early-close dates (day before/after a
/// holiday). Not a complete calendar — enough to exercise early-close
/// handling deterministically in tests and as a sane out-of-the-box default.
pub struct StandardNyseCalendar;

impl MarketCalendar for StandardNyseCalendar {
    fn actual_close(&self, date: NaiveDate) -> NaiveTime {
        const EARLY_CLOSE_DATES: &[(i32, u32, u32)] = &[
            (2023, 7, 3),
            (2023, 11, 24),
            (2023, 12, 24),
            (2024, 7, 3),
            (2024, 11, 29),
            (2024, 12, 24),
            (2025, 7, 3),
            (2025, 11, 28),
            (2025, 12, 24),
            (2026, 11, 27),
            (2026, 12, 24),
        ];
        let (y, m, d) = (date.year(), date.month(), date.day());
        if EARLY_CLOSE_DATES.contains(&(y, m, d)) {
            EARLY_CLOSE
        } else {
            REGULAR_CLOSE
        }
    }
}
