use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct ScheduleEntry {
    pub id: u64,
    pub employee_id: u64,
    #[schema(example = "2024-05-14", value_type = String, format = "date")]
    pub work_date: NaiveDate,
    pub shift_id: u64,
    #[schema(example = "PAGI")]
    pub shift_code: String,
    #[schema(example = "07:00:00", value_type = String, format = "time")]
    pub start_time: NaiveTime,
    #[schema(example = "15:00:00", value_type = String, format = "time")]
    pub end_time: NaiveTime,
}
