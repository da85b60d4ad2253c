use std::collections::BTreeSet;

use chrono::Duration;
use serde::Serialize;
use utoipa::ToSchema;

use crate::model::attendance::CompletedAttendance;
use crate::utils::attendance_window::{ShiftTable, scheduled_end, shift_start_date};

#[derive(Debug, Default, Clone, PartialEq, Serialize, ToSchema)]
pub struct AttendanceStats {
    #[schema(example = 20)]
    pub days_present: u32,
    #[schema(example = 2)]
    pub late_count: u32,
    #[schema(example = 1)]
    pub early_leave_count: u32,
    #[schema(example = 9600)]
    pub total_worked_minutes: u64,
    #[schema(example = 480.0)]
    pub average_worked_minutes: f64,
}

/// Monthly summary over recap rows. A check-in is late once it passes the
/// shift start plus `grace_minutes`; a check-out is early when it precedes
/// the scheduled end.
pub fn summarize(
    records: &[CompletedAttendance],
    shifts: &ShiftTable,
    grace_minutes: i64,
) -> AttendanceStats {
    if records.is_empty() {
        return AttendanceStats::default();
    }

    let grace = Duration::minutes(grace_minutes.max(0));
    let mut days = BTreeSet::new();
    let mut stats = AttendanceStats::default();

    for record in records {
        stats.total_worked_minutes += u64::from(record.worked_minutes);

        let Some(shift) = shifts.get(record.shift_id) else {
            days.insert(record.check_in.date());
            continue;
        };
        let start_date = shift_start_date(shift, record.check_in);
        days.insert(start_date);

        if record.check_in > start_date.and_time(shift.start_time) + grace {
            stats.late_count += 1;
        }
        if record.check_out < scheduled_end(shift, start_date) {
            stats.early_leave_count += 1;
        }
    }

    stats.days_present = days.len() as u32;
    stats.average_worked_minutes = stats.total_worked_minutes as f64 / records.len() as f64;
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::attendance_window::fixtures::*;

    #[test]
    fn empty_month_is_all_zero() {
        let stats = summarize(&[], &ShiftTable::new(standard_shifts()), 5);
        assert_eq!(stats, AttendanceStats::default());
    }

    #[test]
    fn counts_late_and_early_with_grace() {
        let shifts = ShiftTable::new(standard_shifts());
        let records = [
            // on time within grace, full shift
            closed(1, 7, PAGI, at(2024, 5, 1, 7, 4), at(2024, 5, 1, 15, 0)),
            // late, left early
            closed(2, 7, PAGI, at(2024, 5, 2, 7, 30), at(2024, 5, 2, 14, 0)),
            // night shift ending next morning, on time
            closed(3, 7, MALAM, at(2024, 5, 3, 21, 58), at(2024, 5, 4, 6, 1)),
        ];

        let stats = summarize(&records, &shifts, 5);
        assert_eq!(stats.days_present, 3);
        assert_eq!(stats.late_count, 1);
        assert_eq!(stats.early_leave_count, 1);
        assert_eq!(stats.total_worked_minutes, 476 + 390 + 483);
    }

    #[test]
    fn two_sessions_on_one_day_count_as_one_day_present() {
        let shifts = ShiftTable::new(standard_shifts());
        let records = [
            closed(1, 7, PAGI, at(2024, 5, 1, 7, 0), at(2024, 5, 1, 11, 0)),
            closed(2, 7, PAGI, at(2024, 5, 1, 12, 0), at(2024, 5, 1, 15, 0)),
        ];

        let stats = summarize(&records, &shifts, 0);
        assert_eq!(stats.days_present, 1);
        assert_eq!(stats.average_worked_minutes, 210.0);
    }

    #[test]
    fn night_check_in_after_midnight_is_late_not_early() {
        let shifts = ShiftTable::new(standard_shifts());
        let records = [closed(1, 7, MALAM, at(2024, 5, 4, 0, 30), at(2024, 5, 4, 6, 5))];

        let stats = summarize(&records, &shifts, 5);
        assert_eq!(stats.late_count, 1);
        assert_eq!(stats.early_leave_count, 0);
        assert_eq!(stats.days_present, 1);
    }
}
