use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Shift {
    #[schema(example = 3)]
    pub id: u64,
    #[schema(example = "MALAM")]
    pub code: String,
    #[schema(example = "Shift Malam")]
    pub name: String,
    #[schema(example = "22:00:00", value_type = String, format = "time")]
    pub start_time: NaiveTime,
    #[schema(example = "06:00:00", value_type = String, format = "time")]
    pub end_time: NaiveTime,
}

impl Shift {
    /// A shift whose end time-of-day is earlier than its start runs past midnight.
    pub fn crosses_midnight(&self) -> bool {
        self.end_time < self.start_time
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ShiftResponse {
    pub id: u64,
    pub code: String,
    pub name: String,
    #[schema(value_type = String, format = "time")]
    pub start_time: NaiveTime,
    #[schema(value_type = String, format = "time")]
    pub end_time: NaiveTime,
    pub crosses_midnight: bool,
}

impl From<Shift> for ShiftResponse {
    fn from(shift: Shift) -> Self {
        Self {
            crosses_midnight: shift.crosses_midnight(),
            id: shift.id,
            code: shift.code,
            name: shift.name,
            start_time: shift.start_time,
            end_time: shift.end_time,
        }
    }
}
