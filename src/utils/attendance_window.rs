//! Attendance window resolution.
//!
//! Decides whether an employee is checked in, checked out, or still inside a
//! night shift that started yesterday. Everything here is a pure function of
//! the reference instant, the shift table and the candidate rows, so handlers
//! load rows for `today` and `yesterday` and hand them over.

use std::collections::HashMap;

use chrono::{Days, NaiveDate, NaiveDateTime};
use serde::Serialize;
use utoipa::ToSchema;

use crate::model::attendance::{CompletedAttendance, OpenAttendance};
use crate::model::shift::Shift;

#[derive(Debug, Default, Clone)]
pub struct ShiftTable {
    shifts: HashMap<u64, Shift>,
}

impl ShiftTable {
    pub fn new(shifts: impl IntoIterator<Item = Shift>) -> Self {
        Self {
            shifts: shifts.into_iter().map(|s| (s.id, s)).collect(),
        }
    }

    pub fn get(&self, id: u64) -> Option<&Shift> {
        self.shifts.get(&id)
    }

    /// Unknown shift ids are treated as day shifts.
    pub fn crosses_midnight(&self, id: u64) -> bool {
        self.get(id).is_some_and(Shift::crosses_midnight)
    }

    /// All shifts, earliest start first.
    pub fn into_shifts(self) -> Vec<Shift> {
        let mut shifts: Vec<Shift> = self.shifts.into_values().collect();
        shifts.sort_by_key(|s| (s.start_time, s.id));
        shifts
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceStatus {
    pub has_checked_in: bool,
    pub has_checked_out: bool,
    pub is_completed: bool,
    /// Open session inside the current window, if any.
    pub active: Option<OpenAttendance>,
    /// Session opened and closed today.
    pub completed: Option<CompletedAttendance>,
}

fn yesterday_of(today: NaiveDate) -> Option<NaiveDate> {
    today.checked_sub_days(Days::new(1))
}

/// Scheduled end of `shift` for a session that started on `start_date`.
pub fn scheduled_end(shift: &Shift, start_date: NaiveDate) -> NaiveDateTime {
    let end_date = if shift.crosses_midnight() {
        start_date.succ_opt().unwrap_or(start_date)
    } else {
        start_date
    };
    end_date.and_time(shift.end_time)
}

/// Date the shift containing `check_in` started. An early-morning check-in
/// on a night shift belongs to the shift begun the evening before.
pub fn shift_start_date(shift: &Shift, check_in: NaiveDateTime) -> NaiveDate {
    let date = check_in.date();
    if shift.crosses_midnight() && check_in.time() < shift.end_time {
        date.pred_opt().unwrap_or(date)
    } else {
        date
    }
}

/// End instant of a night shift begun on `start_date`, if it is still ahead of `now`.
///
/// Two readings exist for that end: `start_date + end_time` and
/// `start_date + 1 day + end_time`. The first one lying in the future wins.
pub fn open_shift_end(shift: &Shift, start_date: NaiveDate, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let same_day = start_date.and_time(shift.end_time);
    if same_day > now {
        return Some(same_day);
    }

    let next_day = start_date.succ_opt()?.and_time(shift.end_time);
    if next_day > now {
        tracing::debug!(
            shift = %shift.code,
            %start_date,
            end = %next_day,
            "Night shift end taken from the next-day reading"
        );
        return Some(next_day);
    }
    None
}

/// Open session for the employee inside the current window; most recent check-in wins.
pub fn resolve_active<'a>(
    employee_id: u64,
    now: NaiveDateTime,
    shifts: &ShiftTable,
    open: &'a [OpenAttendance],
) -> Option<&'a OpenAttendance> {
    let today = now.date();
    let yesterday = yesterday_of(today);

    open.iter()
        .filter(|r| r.employee_id == employee_id)
        .filter(|r| {
            let day = r.check_in.date();
            if day == today {
                return true;
            }
            Some(day) == yesterday
                && r.check_out.is_none()
                && shifts
                    .get(r.shift_id)
                    .filter(|s| s.crosses_midnight())
                    .and_then(|s| open_shift_end(s, day, now))
                    .is_some()
        })
        .max_by_key(|r| (r.check_in, r.id))
}

/// Open session a check-out may close. Besides the active window this accepts
/// a night shift begun yesterday whose scheduled end has already passed.
pub fn resolve_check_out<'a>(
    employee_id: u64,
    now: NaiveDateTime,
    shifts: &ShiftTable,
    open: &'a [OpenAttendance],
) -> Option<&'a OpenAttendance> {
    if let Some(active) = resolve_active(employee_id, now, shifts, open) {
        return Some(active);
    }

    let yesterday = yesterday_of(now.date());
    open.iter()
        .filter(|r| r.employee_id == employee_id && r.check_out.is_none())
        .filter(|r| Some(r.check_in.date()) == yesterday && shifts.crosses_midnight(r.shift_id))
        .max_by_key(|r| (r.check_in, r.id))
}

/// Session checked in and out today. A night shift begun yesterday and
/// closed today does not count as today's session.
pub fn resolve_completed_today<'a>(
    employee_id: u64,
    now: NaiveDateTime,
    completed: &'a [CompletedAttendance],
) -> Option<&'a CompletedAttendance> {
    let today = now.date();

    completed
        .iter()
        .filter(|r| r.employee_id == employee_id)
        .filter(|r| r.check_in.date() == today && r.check_out.date() == today)
        .max_by_key(|r| (r.check_in, r.id))
}

/// Completed session for the current window, including a night shift that
/// began yesterday.
pub fn resolve_completed<'a>(
    employee_id: u64,
    now: NaiveDateTime,
    shifts: &ShiftTable,
    completed: &'a [CompletedAttendance],
) -> Option<&'a CompletedAttendance> {
    let today = now.date();
    let yesterday = yesterday_of(today);

    completed
        .iter()
        .filter(|r| r.employee_id == employee_id)
        .filter(|r| {
            let day = r.check_in.date();
            (day == today && r.check_out.date() == today)
                || (Some(day) == yesterday && shifts.crosses_midnight(r.shift_id))
        })
        .max_by_key(|r| (r.check_in, r.id))
}

pub fn resolve_status(
    employee_id: u64,
    now: NaiveDateTime,
    shifts: &ShiftTable,
    open: &[OpenAttendance],
    completed: &[CompletedAttendance],
) -> AttendanceStatus {
    let active = resolve_active(employee_id, now, shifts, open).cloned();
    let done = resolve_completed_today(employee_id, now, completed).cloned();

    AttendanceStatus {
        has_checked_in: active.is_some(),
        has_checked_out: done.is_some(),
        is_completed: done.is_some(),
        active,
        completed: done,
    }
}

#[cfg(test)]
pub mod fixtures {
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

    use crate::model::attendance::{CompletedAttendance, OpenAttendance};
    use crate::model::shift::Shift;

    pub const PAGI: u64 = 1;
    pub const MALAM: u64 = 3;

    pub fn shift(id: u64, code: &str, start: (u32, u32), end: (u32, u32)) -> Shift {
        Shift {
            id,
            code: code.to_string(),
            name: format!("Shift {code}"),
            start_time: NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
        }
    }

    pub fn standard_shifts() -> Vec<Shift> {
        vec![
            shift(PAGI, "PAGI", (7, 0), (15, 0)),
            shift(2, "SIANG", (15, 0), (23, 0)),
            shift(MALAM, "MALAM", (22, 0), (6, 0)),
        ]
    }

    pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    pub fn open(id: u64, employee_id: u64, shift_id: u64, check_in: NaiveDateTime) -> OpenAttendance {
        OpenAttendance {
            id,
            employee_id,
            shift_id,
            check_in,
            check_out: None,
            note: None,
        }
    }

    pub fn closed(
        id: u64,
        employee_id: u64,
        shift_id: u64,
        check_in: NaiveDateTime,
        check_out: NaiveDateTime,
    ) -> CompletedAttendance {
        CompletedAttendance {
            id,
            employee_id,
            shift_id,
            check_in,
            check_out,
            worked_minutes: (check_out - check_in).num_minutes() as u32,
            note: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    const EMP: u64 = 42;

    fn table() -> ShiftTable {
        ShiftTable::new(standard_shifts())
    }

    #[test]
    fn no_rows_means_nothing_recorded() {
        let status = resolve_status(EMP, at(2024, 5, 15, 9, 0), &table(), &[], &[]);
        assert!(!status.has_checked_in);
        assert!(!status.has_checked_out);
        assert!(!status.is_completed);
        assert_eq!(status, AttendanceStatus::default());
    }

    #[test]
    fn open_row_today_is_checked_in_not_out() {
        let rows = [open(1, EMP, PAGI, at(2024, 5, 15, 7, 2))];
        let status = resolve_status(EMP, at(2024, 5, 15, 10, 0), &table(), &rows, &[]);
        assert!(status.has_checked_in);
        assert!(!status.has_checked_out);
        assert_eq!(status.active.map(|r| r.id), Some(1));
    }

    #[test]
    fn other_employees_rows_are_ignored() {
        let rows = [open(1, EMP + 1, PAGI, at(2024, 5, 15, 7, 2))];
        let status = resolve_status(EMP, at(2024, 5, 15, 10, 0), &table(), &rows, &[]);
        assert!(!status.has_checked_in);
    }

    #[test]
    fn night_shift_from_yesterday_is_still_active_after_midnight() {
        let rows = [open(1, EMP, MALAM, at(2024, 5, 14, 22, 0))];
        let status = resolve_status(EMP, at(2024, 5, 15, 2, 0), &table(), &rows, &[]);
        assert!(status.has_checked_in);
        assert!(!status.has_checked_out);
    }

    #[test]
    fn night_shift_from_yesterday_expires_at_shift_end() {
        let rows = [open(1, EMP, MALAM, at(2024, 5, 14, 22, 0))];
        let status = resolve_status(EMP, at(2024, 5, 15, 6, 0), &table(), &rows, &[]);
        assert!(!status.has_checked_in);
    }

    #[test]
    fn day_shift_from_yesterday_is_not_carried_over() {
        let rows = [open(1, EMP, PAGI, at(2024, 5, 14, 7, 0))];
        let status = resolve_status(EMP, at(2024, 5, 15, 2, 0), &table(), &rows, &[]);
        assert!(!status.has_checked_in);
    }

    #[test]
    fn night_shift_closed_today_leaves_the_active_window() {
        let recap = [closed(9, EMP, MALAM, at(2024, 5, 14, 22, 0), at(2024, 5, 15, 6, 3))];
        let now = at(2024, 5, 15, 7, 0);

        let status = resolve_status(EMP, now, &table(), &[], &recap);
        assert!(!status.has_checked_in);
        assert!(!status.is_completed, "yesterday's night shift is not today's session");

        let found = resolve_completed(EMP, now, &table(), &recap);
        assert_eq!(found.map(|r| r.id), Some(9));
    }

    #[test]
    fn same_day_session_is_completed() {
        let recap = [closed(5, EMP, PAGI, at(2024, 5, 15, 7, 0), at(2024, 5, 15, 15, 1))];
        let status = resolve_status(EMP, at(2024, 5, 15, 16, 0), &table(), &[], &recap);
        assert!(!status.has_checked_in);
        assert!(status.has_checked_out);
        assert!(status.is_completed);
        assert_eq!(status.completed.map(|r| r.id), Some(5));
    }

    #[test]
    fn day_shift_closed_yesterday_is_not_found_by_completed_lookup() {
        let recap = [closed(5, EMP, PAGI, at(2024, 5, 14, 7, 0), at(2024, 5, 14, 15, 0))];
        assert!(resolve_completed(EMP, at(2024, 5, 15, 9, 0), &table(), &recap).is_none());
    }

    #[test]
    fn most_recent_check_in_wins() {
        let rows = [
            open(1, EMP, PAGI, at(2024, 5, 15, 7, 0)),
            open(2, EMP, 2, at(2024, 5, 15, 15, 0)),
            open(3, EMP, MALAM, at(2024, 5, 14, 22, 0)),
        ];
        let active = resolve_active(EMP, at(2024, 5, 15, 16, 0), &table(), &rows);
        assert_eq!(active.map(|r| r.id), Some(2));
    }

    #[test]
    fn completed_lookup_prefers_today_over_last_night() {
        let recap = [
            closed(1, EMP, MALAM, at(2024, 5, 14, 22, 0), at(2024, 5, 15, 6, 0)),
            closed(2, EMP, PAGI, at(2024, 5, 15, 7, 0), at(2024, 5, 15, 15, 0)),
        ];
        let found = resolve_completed(EMP, at(2024, 5, 15, 16, 0), &table(), &recap);
        assert_eq!(found.map(|r| r.id), Some(2));
    }

    #[test]
    fn open_shift_end_uses_next_day_reading_after_midnight() {
        let malam = shift(MALAM, "MALAM", (22, 0), (6, 0));
        let start = at(2024, 5, 14, 0, 0).date();

        assert_eq!(
            open_shift_end(&malam, start, at(2024, 5, 15, 2, 0)),
            Some(at(2024, 5, 15, 6, 0))
        );
        assert_eq!(open_shift_end(&malam, start, at(2024, 5, 15, 6, 30)), None);
    }

    #[test]
    fn scheduled_end_rolls_over_for_night_shift() {
        let day = at(2024, 12, 31, 0, 0).date();
        let malam = shift(MALAM, "MALAM", (22, 0), (6, 0));
        let pagi = shift(PAGI, "PAGI", (7, 0), (15, 0));

        assert_eq!(scheduled_end(&malam, day), at(2025, 1, 1, 6, 0));
        assert_eq!(scheduled_end(&pagi, day), at(2024, 12, 31, 15, 0));
    }

    #[test]
    fn night_shift_can_check_out_after_scheduled_end() {
        let rows = [open(1, EMP, MALAM, at(2024, 5, 14, 22, 0))];
        let now = at(2024, 5, 15, 6, 3);

        assert!(resolve_active(EMP, now, &table(), &rows).is_none());
        assert_eq!(resolve_check_out(EMP, now, &table(), &rows).map(|r| r.id), Some(1));
    }

    #[test]
    fn check_out_does_not_reach_older_or_day_shift_rows() {
        let rows = [
            open(1, EMP, PAGI, at(2024, 5, 14, 7, 0)),
            open(2, EMP, MALAM, at(2024, 5, 13, 22, 0)),
        ];
        assert!(resolve_check_out(EMP, at(2024, 5, 15, 6, 3), &table(), &rows).is_none());
    }

    #[test]
    fn late_night_check_in_belongs_to_previous_evening() {
        let malam = shift(MALAM, "MALAM", (22, 0), (6, 0));
        let pagi = shift(PAGI, "PAGI", (7, 0), (15, 0));

        assert_eq!(shift_start_date(&malam, at(2024, 5, 15, 0, 30)), at(2024, 5, 14, 0, 0).date());
        assert_eq!(shift_start_date(&malam, at(2024, 5, 14, 21, 58)), at(2024, 5, 14, 0, 0).date());
        assert_eq!(shift_start_date(&pagi, at(2024, 5, 15, 6, 50)), at(2024, 5, 15, 0, 0).date());
    }

    #[test]
    fn unknown_shift_is_treated_as_day_shift() {
        let rows = [open(1, EMP, 99, at(2024, 5, 14, 22, 0))];
        let status = resolve_status(EMP, at(2024, 5, 15, 2, 0), &table(), &rows, &[]);
        assert!(!status.has_checked_in);
    }
}
