use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Department {
    #[schema(example = "KEU")]
    pub code: String,
    #[schema(example = "Keuangan")]
    pub name: String,
    /// Active employees in the department.
    #[schema(example = 12)]
    pub active_employees: i64,
}
