use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString, Serialize, Deserialize, ToSchema)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EmploymentStatus {
    Active,
    Inactive,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 1042,
        "username": "budi.santoso",
        "full_name": "Budi Santoso",
        "department_code": "KEU",
        "status": "active",
        "email": "budi.santoso@company.co.id",
        "phone": "+6281234567890",
        "photo": "photos/1042.jpg",
        "default_shift_id": 1
    })
)]
pub struct Employee {
    #[schema(example = 1042)]
    pub id: u64,

    #[schema(example = "budi.santoso")]
    pub username: String,

    #[schema(example = "Budi Santoso")]
    pub full_name: String,

    #[schema(example = "KEU")]
    pub department_code: String,

    #[schema(example = "active")]
    pub status: String,

    #[schema(example = "budi.santoso@company.co.id", nullable = true)]
    pub email: Option<String>,

    #[schema(example = "+6281234567890", nullable = true)]
    pub phone: Option<String>,

    /// Storage reference of the profile photo; served elsewhere.
    #[schema(example = "photos/1042.jpg", nullable = true)]
    pub photo: Option<String>,

    #[schema(example = 1, nullable = true)]
    pub default_shift_id: Option<u64>,
}

/// Login lookup row; never serialized.
#[derive(sqlx::FromRow)]
pub struct EmployeeCredentials {
    pub id: u64,
    pub username: String,
    pub password_hash: String,
    pub department_code: String,
    pub status: String,
}

/// Active employee with the salary figure payroll generation reads.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SalaryBasis {
    pub id: u64,
    pub base_salary: f64,
}
