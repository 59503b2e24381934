//! Selection of the calendar date a route should be queried for.

use chrono::{Datelike, Days, NaiveDate, Weekday};

/// Returns the first date strictly after `from` that falls on `weekday`.
///
/// The result is always between one and seven days ahead.
pub fn next_weekday(from: NaiveDate, weekday: Weekday) -> NaiveDate {
    let today = i64::from(from.weekday().num_days_from_monday());
    let target = i64::from(weekday.num_days_from_monday());
    let mut days_ahead = target - today;
    if days_ahead <= 0 {
        days_ahead += 7;
    }
    // Only fails in the last week of chrono's date range.
    from.checked_add_days(Days::new(days_ahead as u64))
        .unwrap_or(from)
}

/// Returns the next date on or after `today` whose weekday is in `allowed`.
///
/// Today wins whenever it is allowed. Otherwise the list is scanned in its
/// configured order for the first weekday later in the current week; if
/// there is none, the first listed weekday of the following week is used.
/// An empty list yields `today`.
pub fn next_departure_date(today: NaiveDate, allowed: &[Weekday]) -> NaiveDate {
    let today_weekday = today.weekday();
    if allowed.contains(&today_weekday) {
        return today;
    }

    let today_index = today_weekday.num_days_from_monday();
    if let Some(day) = allowed
        .iter()
        .find(|day| day.num_days_from_monday() > today_index)
    {
        return next_weekday(today, *day);
    }

    match allowed.first() {
        Some(first) => next_weekday(today, *first),
        None => today,
    }
}
