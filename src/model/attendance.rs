use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Row of the open store: checked in, check-out still pending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct OpenAttendance {
    pub id: u64,
    pub employee_id: u64,
    pub shift_id: u64,
    #[schema(example = "2024-05-14T22:01:13", value_type = String, format = "date-time")]
    pub check_in: NaiveDateTime,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub check_out: Option<NaiveDateTime>,
    pub note: Option<String>,
}

/// Row of the rekap store. `check_out` is always set here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct CompletedAttendance {
    pub id: u64,
    pub employee_id: u64,
    pub shift_id: u64,
    #[schema(example = "2024-05-14T22:01:13", value_type = String, format = "date-time")]
    pub check_in: NaiveDateTime,
    #[schema(example = "2024-05-15T06:02:40", value_type = String, format = "date-time")]
    pub check_out: NaiveDateTime,
    #[schema(example = 481)]
    pub worked_minutes: u32,
    pub note: Option<String>,
}
