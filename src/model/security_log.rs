use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString, Serialize, Deserialize, ToSchema)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SecurityEvent {
    LoginSuccess,
    LoginFailed,
    Logout,
    AccessDenied,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct SecurityLog {
    pub id: u64,
    pub employee_id: Option<u64>,
    #[schema(example = "budi.santoso")]
    pub username: String,
    #[schema(example = "login_failed")]
    pub event: String,
    #[schema(example = "10.0.0.12")]
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
}
