use actix_web::{HttpResponse, web};
use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::{debug, info, instrument, warn};
use utoipa::{IntoParams, ToSchema};

use crate::api::response::{Paginated, created, success};
use crate::auth::auth::AuthUser;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::model::attendance::{CompletedAttendance, OpenAttendance};
use crate::model::shift::{Shift, ShiftResponse};
use crate::utils::attendance_stats::{AttendanceStats, summarize};
use crate::utils::attendance_window::{
    AttendanceStatus, ShiftTable, resolve_active, resolve_check_out, resolve_completed, resolve_status,
    scheduled_end,
};
use crate::utils::db_utils::paginate;
use crate::utils::period::Period;

const OPEN_COLUMNS: &str = "id, employee_id, shift_id, check_in, check_out, note";
const RECAP_COLUMNS: &str = "id, employee_id, shift_id, check_in, check_out, worked_minutes, note";
const AUTO_CLOSE_NOTE: &str = "auto-closed: no check-out recorded";

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckInRequest {
    #[schema(example = "WFO gedung B")]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct HistoryQuery {
    #[schema(example = 5)]
    pub month: Option<u32>,
    #[schema(example = 2024)]
    pub year: Option<u32>,
    #[schema(example = 1)]
    pub page: Option<u32>,
    #[schema(example = 31)]
    pub per_page: Option<u32>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceFlags {
    pub has_checked_in: bool,
    pub has_checked_out: bool,
    pub is_completed: bool,
}

impl From<&AttendanceStatus> for AttendanceFlags {
    fn from(s: &AttendanceStatus) -> Self {
        Self {
            has_checked_in: s.has_checked_in,
            has_checked_out: s.has_checked_out,
            is_completed: s.is_completed,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TodayResponse {
    #[schema(example = "2024-05-15", value_type = String, format = "date")]
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    /// Shift planned for today, from the schedule or the employee default.
    pub shift: Option<ShiftResponse>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    pub period: Period,
    pub stats: AttendanceStats,
}

// -------------------- Loaders --------------------

pub async fn load_shift_table(pool: &MySqlPool) -> AppResult<ShiftTable> {
    let shifts = sqlx::query_as::<_, Shift>(
        "SELECT id, code, name, start_time, end_time FROM shifts ORDER BY start_time",
    )
    .fetch_all(pool)
    .await?;
    Ok(ShiftTable::new(shifts))
}

/// Open and recap rows whose check-in falls on yesterday or today.
async fn load_window(
    pool: &MySqlPool,
    employee_id: u64,
    today: NaiveDate,
) -> AppResult<(Vec<OpenAttendance>, Vec<CompletedAttendance>)> {
    let from = today
        .checked_sub_days(Days::new(1))
        .unwrap_or(today)
        .and_time(NaiveTime::MIN);
    let to = today
        .checked_add_days(Days::new(1))
        .unwrap_or(today)
        .and_time(NaiveTime::MIN);

    let open = sqlx::query_as::<_, OpenAttendance>(&format!(
        "SELECT {OPEN_COLUMNS} FROM attendance
         WHERE employee_id = ? AND check_in >= ? AND check_in < ?
         ORDER BY check_in DESC"
    ))
    .bind(employee_id)
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await?;

    let completed = sqlx::query_as::<_, CompletedAttendance>(&format!(
        "SELECT {RECAP_COLUMNS} FROM attendance_recap
         WHERE employee_id = ? AND check_in >= ? AND check_in < ?
         ORDER BY check_in DESC"
    ))
    .bind(employee_id)
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await?;

    debug!(employee_id, open = open.len(), completed = completed.len(), "Loaded attendance window");
    Ok((open, completed))
}

/// A racing check-in surfaces as a duplicate key or, when both sides hold gap
/// locks, as a deadlock; both mean the other request won.
fn already_checked_in(err: AppError) -> AppError {
    match err {
        AppError::Conflict(_) => AppError::conflict("Already checked in"),
        other => other,
    }
}

/// Shift for `date`: schedule entry first, then the employee's default shift.
async fn planned_shift_id(pool: &MySqlPool, employee_id: u64, date: NaiveDate) -> AppResult<Option<u64>> {
    let scheduled = sqlx::query_scalar::<_, u64>(
        "SELECT shift_id FROM schedules WHERE employee_id = ? AND work_date = ?",
    )
    .bind(employee_id)
    .bind(date)
    .fetch_optional(pool)
    .await?;

    if scheduled.is_some() {
        return Ok(scheduled);
    }

    let default_shift = sqlx::query_scalar::<_, Option<u64>>(
        "SELECT default_shift_id FROM employees WHERE id = ?",
    )
    .bind(employee_id)
    .fetch_optional(pool)
    .await?
    .flatten();

    Ok(default_shift)
}

async fn current_status(
    pool: &MySqlPool,
    employee_id: u64,
    now: NaiveDateTime,
) -> AppResult<(ShiftTable, AttendanceStatus, Vec<CompletedAttendance>)> {
    let shifts = load_shift_table(pool).await?;
    let (open, completed) = load_window(pool, employee_id, now.date()).await?;
    let status = resolve_status(employee_id, now, &shifts, &open, &completed);
    Ok((shifts, status, completed))
}

fn worked_minutes(check_in: NaiveDateTime, check_out: NaiveDateTime) -> u32 {
    (check_out - check_in).num_minutes().clamp(0, i64::from(u32::MAX)) as u32
}

// -------------------- Handlers --------------------

/// Current check-in/check-out flags
#[utoipa::path(
    get,
    path = "/api/attendance/status",
    responses(
        (status = 200, description = "Attendance flags for the current window", body = AttendanceFlags),
        (status = 401, description = "Unauthenticated"),
        (status = 500, description = "Internal server error")
    ),
    security(("session_cookie" = [])),
    tag = "Attendance"
)]
#[instrument(name = "attendance_status", skip_all, fields(employee_id = auth.employee_id))]
pub async fn status(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    let now = config.local_now();
    let (_, status, _) = current_status(pool.get_ref(), auth.employee_id, now).await?;

    Ok(success("Attendance status", AttendanceFlags::from(&status)))
}

/// Today's attendance with active session and planned shift
#[utoipa::path(
    get,
    path = "/api/attendance/today",
    responses(
        (status = 200, description = "Today's attendance", body = TodayResponse),
        (status = 401, description = "Unauthenticated")
    ),
    security(("session_cookie" = [])),
    tag = "Attendance"
)]
#[instrument(name = "attendance_today", skip_all, fields(employee_id = auth.employee_id))]
pub async fn today(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    let now = config.local_now();
    let (shifts, status, _) = current_status(pool.get_ref(), auth.employee_id, now).await?;

    let shift = planned_shift_id(pool.get_ref(), auth.employee_id, now.date())
        .await?
        .and_then(|id| shifts.get(id).cloned())
        .map(ShiftResponse::from);

    Ok(success(
        "Today's attendance",
        TodayResponse {
            date: now.date(),
            status,
            shift,
        },
    ))
}

/// Completed session for the current window (including last night's shift)
#[utoipa::path(
    get,
    path = "/api/attendance/completed",
    responses(
        (status = 200, description = "Completed record, or null", body = CompletedAttendance),
        (status = 401, description = "Unauthenticated")
    ),
    security(("session_cookie" = [])),
    tag = "Attendance"
)]
#[instrument(name = "attendance_completed", skip_all, fields(employee_id = auth.employee_id))]
pub async fn completed(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    let now = config.local_now();
    let (shifts, _, recap) = current_status(pool.get_ref(), auth.employee_id, now).await?;

    let found = resolve_completed(auth.employee_id, now, &shifts, &recap).cloned();
    let message = if found.is_some() {
        "Completed attendance found"
    } else {
        "No completed attendance"
    };
    Ok(success(message, found))
}

/// Check-in endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/check-in",
    request_body = CheckInRequest,
    responses(
        (status = 201, description = "Checked in successfully", body = OpenAttendance),
        (status = 400, description = "No shift assigned for today"),
        (status = 401, description = "Unauthenticated"),
        (status = 409, description = "Already checked in or already completed today"),
        (status = 500, description = "Internal server error")
    ),
    security(("session_cookie" = [])),
    tag = "Attendance"
)]
#[instrument(name = "attendance_check_in", skip_all, fields(employee_id = auth.employee_id))]
pub async fn check_in(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    payload: Option<web::Json<CheckInRequest>>,
) -> AppResult<HttpResponse> {
    let employee_id = auth.employee_id;
    let now = config.local_now();
    let pool = pool.get_ref();

    let shifts = load_shift_table(pool).await?;
    let (open, recap) = load_window(pool, employee_id, now.date()).await?;
    let status = resolve_status(employee_id, now, &shifts, &open, &recap);

    if status.has_checked_in {
        return Err(AppError::conflict("Already checked in"));
    }
    if status.is_completed {
        return Err(AppError::conflict("Attendance for today is already completed"));
    }

    let shift_id = planned_shift_id(pool, employee_id, now.date())
        .await?
        .ok_or_else(|| AppError::validation("No shift assigned for today"))?;
    if shifts.get(shift_id).is_none() {
        return Err(AppError::validation(format!("Unknown shift {shift_id}")));
    }

    let note = payload.and_then(|p| p.into_inner().note);

    let mut tx = pool.begin().await?;

    // A session left open from an earlier window would block the one-open-row key.
    let stale = sqlx::query_as::<_, OpenAttendance>(&format!(
        "SELECT {OPEN_COLUMNS} FROM attendance WHERE employee_id = ? FOR UPDATE"
    ))
    .bind(employee_id)
    .fetch_all(&mut *tx)
    .await?;

    // a concurrent check-in may have landed since the status read
    if resolve_active(employee_id, now, &shifts, &stale).is_some() {
        tx.rollback().await?;
        return Err(AppError::conflict("Already checked in"));
    }

    for row in &stale {
        let check_out = shifts
            .get(row.shift_id)
            .map(|s| scheduled_end(s, row.check_in.date()))
            .unwrap_or(row.check_in)
            .max(row.check_in);

        warn!(employee_id, attendance_id = row.id, %check_out, "Auto-closing stale open attendance");

        sqlx::query(
            "INSERT INTO attendance_recap
                (employee_id, shift_id, check_in, check_out, worked_minutes, note)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(row.employee_id)
        .bind(row.shift_id)
        .bind(row.check_in)
        .bind(check_out)
        .bind(worked_minutes(row.check_in, check_out))
        .bind(AUTO_CLOSE_NOTE)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM attendance WHERE id = ?")
            .bind(row.id)
            .execute(&mut *tx)
            .await?;
    }

    let result = sqlx::query(
        "INSERT INTO attendance (employee_id, shift_id, check_in, note) VALUES (?, ?, ?, ?)",
    )
    .bind(employee_id)
    .bind(shift_id)
    .bind(now)
    .bind(&note)
    .execute(&mut *tx)
    .await
    .map_err(|e| already_checked_in(e.into()))?;

    tx.commit().await?;

    info!(employee_id, shift_id, check_in = %now, "Checked in");

    Ok(created(
        "Checked in successfully",
        OpenAttendance {
            id: result.last_insert_id(),
            employee_id,
            shift_id,
            check_in: now,
            check_out: None,
            note,
        },
    ))
}

/// Check-out endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/check-out",
    responses(
        (status = 200, description = "Checked out successfully", body = CompletedAttendance),
        (status = 401, description = "Unauthenticated"),
        (status = 404, description = "No active check-in found"),
        (status = 409, description = "Session was closed concurrently"),
        (status = 500, description = "Internal server error")
    ),
    security(("session_cookie" = [])),
    tag = "Attendance"
)]
#[instrument(name = "attendance_check_out", skip_all, fields(employee_id = auth.employee_id))]
pub async fn check_out(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    let employee_id = auth.employee_id;
    let now = config.local_now();
    let pool = pool.get_ref();

    let shifts = load_shift_table(pool).await?;
    let (open, _) = load_window(pool, employee_id, now.date()).await?;

    let active = resolve_check_out(employee_id, now, &shifts, &open)
        .cloned()
        .ok_or_else(|| AppError::not_found("No active check-in found"))?;

    let minutes = worked_minutes(active.check_in, now);

    let mut tx = pool.begin().await?;

    let deleted = sqlx::query("DELETE FROM attendance WHERE id = ?")
        .bind(active.id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    if deleted == 0 {
        tx.rollback().await?;
        return Err(AppError::conflict("Attendance was already checked out"));
    }

    let result = sqlx::query(
        "INSERT INTO attendance_recap
            (employee_id, shift_id, check_in, check_out, worked_minutes, note)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(employee_id)
    .bind(active.shift_id)
    .bind(active.check_in)
    .bind(now)
    .bind(minutes)
    .bind(&active.note)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(employee_id, attendance_id = active.id, worked_minutes = minutes, "Checked out");

    Ok(success(
        "Checked out successfully",
        CompletedAttendance {
            id: result.last_insert_id(),
            employee_id,
            shift_id: active.shift_id,
            check_in: active.check_in,
            check_out: now,
            worked_minutes: minutes,
            note: active.note,
        },
    ))
}

/// Completed attendance history for a month
#[utoipa::path(
    get,
    path = "/api/attendance/history",
    params(HistoryQuery),
    responses(
        (status = 200, description = "Paginated recap rows", body = Object),
        (status = 400, description = "Invalid month or year"),
        (status = 401, description = "Unauthenticated")
    ),
    security(("session_cookie" = [])),
    tag = "Attendance"
)]
#[instrument(name = "attendance_history", skip_all, fields(employee_id = auth.employee_id))]
pub async fn history(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    query: web::Query<HistoryQuery>,
) -> AppResult<HttpResponse> {
    let period = Period::or_current(query.month, query.year, config.local_now().date())?;
    let (from, to) = period.bounds();
    let (page, per_page, offset) = paginate(query.page, query.per_page, 31);

    let total = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM attendance_recap
         WHERE employee_id = ? AND check_in >= ? AND check_in < ?",
    )
    .bind(auth.employee_id)
    .bind(from)
    .bind(to)
    .fetch_one(pool.get_ref())
    .await?;

    let items = sqlx::query_as::<_, CompletedAttendance>(&format!(
        "SELECT {RECAP_COLUMNS} FROM attendance_recap
         WHERE employee_id = ? AND check_in >= ? AND check_in < ?
         ORDER BY check_in DESC
         LIMIT ? OFFSET ?"
    ))
    .bind(auth.employee_id)
    .bind(from)
    .bind(to)
    .bind(per_page)
    .bind(offset)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(success(
        "Attendance history",
        Paginated {
            items,
            page,
            per_page,
            total,
        },
    ))
}

/// Monthly attendance statistics
#[utoipa::path(
    get,
    path = "/api/attendance/stats",
    params(HistoryQuery),
    responses(
        (status = 200, description = "Monthly summary", body = StatsResponse),
        (status = 400, description = "Invalid month or year"),
        (status = 401, description = "Unauthenticated")
    ),
    security(("session_cookie" = [])),
    tag = "Attendance"
)]
#[instrument(name = "attendance_stats", skip_all, fields(employee_id = auth.employee_id))]
pub async fn stats(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    query: web::Query<HistoryQuery>,
) -> AppResult<HttpResponse> {
    let period = Period::or_current(query.month, query.year, config.local_now().date())?;
    let (from, to) = period.bounds();

    let shifts = load_shift_table(pool.get_ref()).await?;
    let records = sqlx::query_as::<_, CompletedAttendance>(&format!(
        "SELECT {RECAP_COLUMNS} FROM attendance_recap
         WHERE employee_id = ? AND check_in >= ? AND check_in < ?"
    ))
    .bind(auth.employee_id)
    .bind(from)
    .bind(to)
    .fetch_all(pool.get_ref())
    .await?;

    let stats = summarize(&records, &shifts, config.late_grace_minutes);
    Ok(success("Attendance statistics", StatsResponse { period, stats }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::attendance_window::fixtures::at;

    #[test]
    fn worked_minutes_never_negative() {
        assert_eq!(worked_minutes(at(2024, 5, 15, 8, 0), at(2024, 5, 15, 7, 0)), 0);
        assert_eq!(worked_minutes(at(2024, 5, 14, 22, 0), at(2024, 5, 15, 6, 30)), 510);
    }

    #[test]
    fn flags_mirror_status() {
        let status = AttendanceStatus {
            has_checked_in: true,
            ..Default::default()
        };
        let flags = AttendanceFlags::from(&status);
        let json = serde_json::to_value(&flags).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"hasCheckedIn": true, "hasCheckedOut": false, "isCompleted": false})
        );
    }

    #[test]
    fn losing_a_check_in_race_reports_already_checked_in() {
        let from_deadlock = already_checked_in(AppError::conflict("Concurrent update, please retry"));
        assert!(matches!(from_deadlock, AppError::Conflict(ref m) if m == "Already checked in"));

        let unrelated = already_checked_in(AppError::Persistence("gone".into()));
        assert!(matches!(unrelated, AppError::Persistence(_)));
    }
}
