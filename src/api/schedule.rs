use std::collections::BTreeSet;

use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};

use crate::api::attendance::load_shift_table;
use crate::api::response::success;
use crate::auth::auth::AuthUser;
use crate::auth::policy::Capability;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::model::schedule::ScheduleEntry;
use crate::model::shift::ShiftResponse;
use crate::utils::attendance_window::ShiftTable;
use crate::utils::db_utils::build_upsert_sql;
use crate::utils::period::Period;

/// Longest batch accepted in one PUT, a little over a month.
const MAX_ENTRIES: usize = 62;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ScheduleQuery {
    pub month: Option<u32>,
    pub year: Option<u32>,
    /// Ignored unless the caller belongs to HR.
    pub employee_id: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ScheduleDay {
    #[schema(example = "2024-05-15", value_type = String, format = "date")]
    pub work_date: NaiveDate,
    #[schema(example = 3)]
    pub shift_id: u64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetSchedule {
    #[schema(example = 1042)]
    pub employee_id: u64,
    pub entries: Vec<ScheduleDay>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ScheduleMonth {
    pub employee_id: u64,
    pub period: Period,
    pub entries: Vec<ScheduleEntry>,
}

/// Rejects empty batches, repeated dates and unknown shifts before anything
/// touches the database.
pub fn validate_entries(entries: &[ScheduleDay], shifts: &ShiftTable) -> AppResult<()> {
    if entries.is_empty() {
        return Err(AppError::validation("entries must not be empty"));
    }
    if entries.len() > MAX_ENTRIES {
        return Err(AppError::validation(format!(
            "at most {MAX_ENTRIES} entries per request"
        )));
    }

    let mut dates = BTreeSet::new();
    for entry in entries {
        if !dates.insert(entry.work_date) {
            return Err(AppError::validation(format!(
                "{} appears more than once",
                entry.work_date
            )));
        }
        if shifts.get(entry.shift_id).is_none() {
            return Err(AppError::validation(format!(
                "Unknown shift id {}",
                entry.shift_id
            )));
        }
    }
    Ok(())
}

/// Monthly schedule
#[utoipa::path(
    get,
    path = "/api/schedule",
    params(ScheduleQuery),
    responses(
        (status = 200, description = "Schedule entries for the month", body = ScheduleMonth),
        (status = 400, description = "Invalid period"),
        (status = 401, description = "Unauthenticated")
    ),
    security(("session_cookie" = [])),
    tag = "Schedule"
)]
#[instrument(name = "schedule_get", skip_all, fields(employee_id = auth.employee_id))]
pub async fn get_schedule(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    query: web::Query<ScheduleQuery>,
) -> AppResult<HttpResponse> {
    let period = Period::or_current(query.month, query.year, config.local_now().date())?;
    let employee_id = auth
        .scoped_employee(Capability::ViewAllSchedules, query.employee_id)
        .unwrap_or(auth.employee_id);
    let (start, end) = period.bounds();

    let entries = sqlx::query_as::<_, ScheduleEntry>(
        "SELECT s.id, s.employee_id, s.work_date, s.shift_id, sh.code AS shift_code,
                sh.start_time, sh.end_time
         FROM schedules s
         JOIN shifts sh ON sh.id = s.shift_id
         WHERE s.employee_id = ? AND s.work_date >= ? AND s.work_date < ?
         ORDER BY s.work_date",
    )
    .bind(employee_id)
    .bind(start.date())
    .bind(end.date())
    .fetch_all(pool.get_ref())
    .await?;

    Ok(success(
        "Schedule",
        ScheduleMonth {
            employee_id,
            period,
            entries,
        },
    ))
}

/// Set schedule entries for one employee (HR only)
#[utoipa::path(
    put,
    path = "/api/schedule",
    request_body = SetSchedule,
    responses(
        (status = 200, description = "Entries saved"),
        (status = 400, description = "Empty entries, repeated dates or unknown shift"),
        (status = 401, description = "Unauthenticated"),
        (status = 403, description = "HR department only"),
        (status = 404, description = "Employee not found")
    ),
    security(("session_cookie" = [])),
    tag = "Schedule"
)]
#[instrument(name = "schedule_set", skip_all, fields(employee_id = auth.employee_id))]
pub async fn set_schedule(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<SetSchedule>,
) -> AppResult<HttpResponse> {
    auth.require(Capability::ManageSchedules)?;

    let shifts = load_shift_table(pool.get_ref()).await?;
    validate_entries(&payload.entries, &shifts)?;

    let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM employees WHERE id = ?")
        .bind(payload.employee_id)
        .fetch_one(pool.get_ref())
        .await?;
    if exists == 0 {
        return Err(AppError::not_found("Employee not found"));
    }

    let sql = build_upsert_sql(
        "schedules",
        &["employee_id", "work_date", "shift_id"],
        &["shift_id"],
    );

    let mut tx = pool.begin().await?;
    for entry in &payload.entries {
        sqlx::query(&sql)
            .bind(payload.employee_id)
            .bind(entry.work_date)
            .bind(entry.shift_id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    info!(
        target_employee = payload.employee_id,
        entries = payload.entries.len(),
        "Schedule saved"
    );

    Ok(success(
        "Schedule saved",
        serde_json::json!({ "saved": payload.entries.len() }),
    ))
}

/// Shift catalogue
#[utoipa::path(
    get,
    path = "/api/shifts",
    responses(
        (status = 200, description = "Shift definitions", body = [ShiftResponse]),
        (status = 401, description = "Unauthenticated")
    ),
    security(("session_cookie" = [])),
    tag = "Schedule"
)]
pub async fn list_shifts(_auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    let shifts = load_shift_table(pool.get_ref()).await?;
    let items = shifts
        .into_shifts()
        .into_iter()
        .map(ShiftResponse::from)
        .collect::<Vec<_>>();
    Ok(success("Shift list", items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::attendance_window::fixtures::*;

    fn day(d: u32, shift_id: u64) -> ScheduleDay {
        ScheduleDay {
            work_date: NaiveDate::from_ymd_opt(2024, 5, d).unwrap(),
            shift_id,
        }
    }

    #[test]
    fn empty_batch_is_rejected() {
        let shifts = ShiftTable::new(standard_shifts());
        assert!(matches!(
            validate_entries(&[], &shifts),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn unknown_shift_is_rejected() {
        let shifts = ShiftTable::new(standard_shifts());
        let err = validate_entries(&[day(1, PAGI), day(2, 42)], &shifts).unwrap_err();
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn repeated_date_is_rejected() {
        let shifts = ShiftTable::new(standard_shifts());
        assert!(validate_entries(&[day(3, PAGI), day(3, MALAM)], &shifts).is_err());
    }

    #[test]
    fn valid_batch_passes() {
        let shifts = ShiftTable::new(standard_shifts());
        assert!(validate_entries(&[day(1, PAGI), day(2, MALAM)], &shifts).is_ok());
    }
}
