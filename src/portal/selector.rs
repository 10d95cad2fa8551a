//! Slot selection policy, kept pure so it can be tested in isolation.

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("subject has no date boundaries configured")]
    MissingBounds,
}

/// Pick the first candidate date inside the inclusive [min, max] window.
///
/// Input order is preserved (the portal reports earliest-first; we do
/// not re-sort). Both bounds absent is a configuration error, not an
/// invitation to pick arbitrarily; a single absent bound leaves that
/// side unbounded.
pub fn select_date(
    candidates: &[NaiveDate],
    min_date: Option<NaiveDate>,
    max_date: Option<NaiveDate>,
) -> Result<Option<NaiveDate>, SelectionError> {
    if min_date.is_none() && max_date.is_none() {
        return Err(SelectionError::MissingBounds);
    }

    Ok(candidates
        .iter()
        .copied()
        .find(|date| {
            min_date.map_or(true, |min| *date >= min) && max_date.map_or(true, |max| *date <= max)
        }))
}

/// Pick the latest slot of the day. Deliberate policy: the earliest
/// slots are the most contested, so taking the last one dodges the
/// congestion.
pub fn select_time(times: &[String]) -> Option<&str> {
    times.last().map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn picks_first_date_in_window() {
        let candidates = [date(2024, 2, 20), date(2024, 3, 5), date(2024, 3, 15)];
        let chosen = select_date(
            &candidates,
            Some(date(2024, 3, 1)),
            Some(date(2024, 3, 10)),
        )
        .unwrap();
        assert_eq!(chosen, Some(date(2024, 3, 5)));
    }

    #[test]
    fn bounds_are_inclusive() {
        let candidates = [date(2024, 3, 1)];
        let chosen = select_date(
            &candidates,
            Some(date(2024, 3, 1)),
            Some(date(2024, 3, 1)),
        )
        .unwrap();
        assert_eq!(chosen, Some(date(2024, 3, 1)));
    }

    #[test]
    fn no_match_in_window() {
        let candidates = [date(2024, 2, 20), date(2024, 4, 15)];
        let chosen = select_date(
            &candidates,
            Some(date(2024, 3, 1)),
            Some(date(2024, 3, 10)),
        )
        .unwrap();
        assert_eq!(chosen, None);
    }

    #[test]
    fn both_bounds_missing_is_an_error() {
        let candidates = [date(2024, 3, 5)];
        assert_eq!(
            select_date(&candidates, None, None),
            Err(SelectionError::MissingBounds)
        );
    }

    #[test]
    fn single_bound_leaves_other_side_open() {
        let candidates = [date(2024, 2, 20), date(2024, 3, 5)];
        assert_eq!(
            select_date(&candidates, Some(date(2024, 3, 1)), None).unwrap(),
            Some(date(2024, 3, 5))
        );
        assert_eq!(
            select_date(&candidates, None, Some(date(2024, 2, 28))).unwrap(),
            Some(date(2024, 2, 20))
        );
    }

    #[test]
    fn input_order_is_preserved() {
        // deliberately out of order; the selector must not sort
        let candidates = [date(2024, 3, 9), date(2024, 3, 2)];
        let chosen = select_date(
            &candidates,
            Some(date(2024, 3, 1)),
            Some(date(2024, 3, 10)),
        )
        .unwrap();
        assert_eq!(chosen, Some(date(2024, 3, 9)));
    }

    #[test]
    fn latest_time_slot_wins() {
        let times = vec!["09:00".to_string(), "11:30".to_string(), "14:00".to_string()];
        assert_eq!(select_time(&times), Some("14:00"));
        assert_eq!(select_time(&[]), None);
    }
}
