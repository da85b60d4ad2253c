use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::MySqlPool;
use std::str::FromStr;
use tracing::{debug, info, instrument};
use utoipa::{IntoParams, ToSchema};

use crate::api::response::{Paginated, success};
use crate::auth::auth::AuthUser;
use crate::auth::policy::Capability;
use crate::error::{AppError, AppResult};
use crate::model::department::Department;
use crate::model::employee::{Employee, EmploymentStatus};
use crate::utils::db_utils::{BindValues, WhereBuilder, build_update_sql, execute_update, paginate};

const EMPLOYEE_COLUMNS: &str =
    "id, username, full_name, department_code, status, email, phone, photo, default_shift_id";

/// Columns an employee may change on their own profile.
pub const PROFILE_COLUMNS: [&str; 2] = ["email", "phone"];

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EmployeeQuery {
    /// Department code, e.g. `KEU`.
    pub department: Option<String>,
    /// `active` or `inactive`.
    pub status: Option<String>,
    /// Matches full name, username or email.
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, sqlx::FromRow)]
struct DirectoryRow {
    #[sqlx(flatten)]
    employee: Employee,
    base_salary: f64,
}

/// Directory entry. The salary is only filled in for finance.
#[derive(Debug, Serialize)]
pub struct DirectoryEntry {
    #[serde(flatten)]
    pub employee: Employee,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_salary: Option<f64>,
}

impl DirectoryEntry {
    fn from_row(row: DirectoryRow, show_salary: bool) -> Self {
        Self {
            employee: row.employee,
            base_salary: show_salary.then_some(row.base_salary),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateProfile {
    #[schema(example = "budi.santoso@company.co.id")]
    pub email: Option<String>,
    #[schema(example = "+6281234567890")]
    pub phone: Option<String>,
}

fn directory_filter(query: &EmployeeQuery) -> AppResult<WhereBuilder> {
    let status = query
        .status
        .as_deref()
        .map(EmploymentStatus::from_str)
        .transpose()
        .map_err(|_| AppError::validation("status must be active or inactive"))?;

    Ok(WhereBuilder::new()
        .eq_opt(
            "department_code",
            query
                .department
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_uppercase),
        )
        .eq_opt("status", status.map(|s| s.as_ref().to_string()))
        .search(&["full_name", "username", "email"], query.search.as_deref()))
}

/// Trims profile fields; blanks become NULL. Unknown keys are left for the
/// update builder to reject.
pub fn normalize_profile(payload: Value) -> AppResult<Value> {
    let Value::Object(mut fields) = payload else {
        return Err(AppError::validation("Payload must be a JSON object"));
    };

    for (key, value) in fields.iter_mut() {
        if let Value::String(s) = value {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                *value = Value::Null;
            } else if key == "email" && !trimmed.contains('@') {
                return Err(AppError::validation("email is not valid"));
            } else {
                *value = Value::String(trimmed.to_string());
            }
        }
    }
    Ok(Value::Object(fields))
}

async fn fetch_employee(pool: &MySqlPool, employee_id: u64) -> AppResult<Employee> {
    sqlx::query_as::<_, Employee>(&format!(
        "SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE id = ?"
    ))
    .bind(employee_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("Employee not found"))
}

/// Employee directory
#[utoipa::path(
    get,
    path = "/api/employees",
    params(EmployeeQuery),
    responses(
        (status = 200, description = "Paginated employee directory", body = Object),
        (status = 400, description = "Invalid filter"),
        (status = 401, description = "Unauthenticated")
    ),
    security(("session_cookie" = [])),
    tag = "Directory"
)]
#[instrument(name = "employee_list", skip_all, fields(employee_id = auth.employee_id))]
pub async fn list_employees(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<EmployeeQuery>,
) -> AppResult<HttpResponse> {
    let (page, per_page, offset) = paginate(query.page, query.per_page, 20);
    let filter = directory_filter(&query)?;

    let count_sql = format!("SELECT COUNT(*) FROM employees{}", filter.clause());
    debug!(sql = %count_sql, "Counting employees");
    let total = sqlx::query_scalar::<_, i64>(&count_sql)
        .bind_values(filter.values())
        .fetch_one(pool.get_ref())
        .await?;

    let data_sql = format!(
        "SELECT {EMPLOYEE_COLUMNS}, base_salary FROM employees{} ORDER BY full_name LIMIT ? OFFSET ?",
        filter.clause()
    );
    let rows = sqlx::query_as::<_, DirectoryRow>(&data_sql)
        .bind_values(filter.values())
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool.get_ref())
        .await?;

    let show_salary = auth.can(Capability::ViewAllPayroll);
    let items = rows
        .into_iter()
        .map(|row| DirectoryEntry::from_row(row, show_salary))
        .collect::<Vec<_>>();

    Ok(success(
        "Employee list",
        Paginated {
            items,
            page,
            per_page,
            total,
        },
    ))
}

/// Get employee by id
#[utoipa::path(
    get,
    path = "/api/employees/{employee_id}",
    params(("employee_id", Path, description = "Employee ID")),
    responses(
        (status = 200, description = "Employee found", body = Employee),
        (status = 401, description = "Unauthenticated"),
        (status = 404, description = "Employee not found")
    ),
    security(("session_cookie" = [])),
    tag = "Directory"
)]
#[instrument(name = "employee_get", skip_all, fields(employee_id = auth.employee_id))]
pub async fn get_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let employee_id = path.into_inner();

    let row = sqlx::query_as::<_, DirectoryRow>(&format!(
        "SELECT {EMPLOYEE_COLUMNS}, base_salary FROM employees WHERE id = ?"
    ))
    .bind(employee_id)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(|| AppError::not_found("Employee not found"))?;

    Ok(success(
        "Employee found",
        DirectoryEntry::from_row(row, auth.can(Capability::ViewAllPayroll)),
    ))
}

/// Departments with their active head-count
#[utoipa::path(
    get,
    path = "/api/departments",
    responses(
        (status = 200, description = "Department list", body = [Department]),
        (status = 401, description = "Unauthenticated")
    ),
    security(("session_cookie" = [])),
    tag = "Directory"
)]
pub async fn list_departments(_auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    let departments = sqlx::query_as::<_, Department>(
        "SELECT d.code, d.name, COUNT(e.id) AS active_employees
         FROM departments d
         LEFT JOIN employees e ON e.department_code = d.code AND e.status = 'active'
         GROUP BY d.code, d.name
         ORDER BY d.code",
    )
    .fetch_all(pool.get_ref())
    .await?;

    Ok(success("Department list", departments))
}

/// The caller's own profile
#[utoipa::path(
    get,
    path = "/api/profile",
    responses(
        (status = 200, description = "Profile", body = Employee),
        (status = 401, description = "Unauthenticated")
    ),
    security(("session_cookie" = [])),
    tag = "Profile"
)]
#[instrument(name = "profile_get", skip_all, fields(employee_id = auth.employee_id))]
pub async fn get_profile(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    let employee = fetch_employee(pool.get_ref(), auth.employee_id).await?;
    Ok(success("Profile", employee))
}

/// Update contact details on the caller's profile
#[utoipa::path(
    put,
    path = "/api/profile",
    request_body = UpdateProfile,
    responses(
        (status = 200, description = "Profile updated", body = Employee),
        (status = 400, description = "Unknown or invalid field"),
        (status = 401, description = "Unauthenticated"),
        (status = 409, description = "Email already in use")
    ),
    security(("session_cookie" = [])),
    tag = "Profile"
)]
#[instrument(name = "profile_update", skip_all, fields(employee_id = auth.employee_id))]
pub async fn update_profile(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    body: web::Json<Value>,
) -> AppResult<HttpResponse> {
    let payload = normalize_profile(body.into_inner())?;
    let update = build_update_sql("employees", &payload, &PROFILE_COLUMNS, "id", auth.employee_id)?;

    execute_update(pool.get_ref(), update).await?;
    info!("Profile updated");

    let employee = fetch_employee(pool.get_ref(), auth.employee_id).await?;
    Ok(success("Profile updated", employee))
}
