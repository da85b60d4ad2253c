use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumIter, EnumString, Serialize, Deserialize, ToSchema,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PayrollType {
    /// Gapok.
    BaseSalary,
    Allowance,
    Bonus,
    Deduction,
}

impl PayrollType {
    /// Sign applied when totalling a slip.
    pub fn sign(self) -> f64 {
        match self {
            PayrollType::Deduction => -1.0,
            _ => 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Payroll {
    #[schema(example = 77)]
    pub id: u64,
    #[schema(example = 1042)]
    pub employee_id: u64,
    #[schema(example = 5)]
    pub month: u8,
    #[schema(example = 2024)]
    pub year: u16,
    #[schema(example = "base_salary")]
    pub payroll_type: String,
    #[schema(example = 5500000.0)]
    pub amount: f64,
    #[schema(example = "sari.keu")]
    pub uploaded_by: String,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: NaiveDateTime,
}
