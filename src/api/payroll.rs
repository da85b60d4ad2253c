use std::collections::HashMap;
use std::str::FromStr;

use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use sqlx::{MySqlConnection, MySqlPool};
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};

use crate::api::response::{Paginated, success};
use crate::auth::auth::AuthUser;
use crate::auth::policy::Capability;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::model::employee::SalaryBasis;
use crate::model::payroll::{Payroll, PayrollType};
use crate::utils::db_utils::{BindValues, SqlValue, WhereBuilder, build_upsert_sql, paginate};
use crate::utils::period::Period;

const PAYROLL_COLUMNS: &str =
    "id, employee_id, month, year, payroll_type, amount, uploaded_by, created_at, updated_at";
const UPSERT_COLUMNS: [&str; 6] = ["employee_id", "month", "year", "payroll_type", "amount", "uploaded_by"];
const UPSERT_UPDATES: [&str; 2] = ["amount", "uploaded_by"];

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct PayrollQuery {
    /// Ignored unless the caller belongs to finance.
    #[schema(example = 1042)]
    pub employee_id: Option<u64>,
    #[schema(example = 5)]
    pub month: Option<u32>,
    #[schema(example = 2024)]
    pub year: Option<u32>,
    #[schema(example = "base_salary")]
    pub payroll_type: Option<String>,
    #[schema(example = 1)]
    pub page: Option<u32>,
    #[schema(example = 20)]
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpsertPayroll {
    #[schema(example = 1042)]
    pub employee_id: u64,
    #[schema(example = 5)]
    pub month: u32,
    #[schema(example = 2024)]
    pub year: u32,
    pub payroll_type: PayrollType,
    #[schema(example = 750000.0)]
    pub amount: f64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GeneratePayroll {
    #[schema(example = 5)]
    pub month: u32,
    #[schema(example = 2024)]
    pub year: u32,
}

#[derive(Debug, Default, PartialEq, Serialize, ToSchema)]
pub struct GenerateSummary {
    pub employees: usize,
    pub inserted: u64,
    pub updated: u64,
    pub unchanged: u64,
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct SlipQuery {
    #[schema(example = 5)]
    pub month: Option<u32>,
    #[schema(example = 2024)]
    pub year: Option<u32>,
    /// Ignored unless the caller belongs to finance.
    pub employee_id: Option<u64>,
}

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct SlipEmployee {
    pub id: u64,
    pub full_name: String,
    pub department_code: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PayrollSlip {
    pub employee: SlipEmployee,
    pub period: Period,
    pub items: Vec<Payroll>,
    pub gross: f64,
    pub deductions: f64,
    pub net: f64,
}

/// One upsert keyed by (employee, month, year, type).
#[derive(Debug, Clone, PartialEq)]
pub struct PayrollUpsert {
    pub employee_id: u64,
    pub period: Period,
    pub payroll_type: PayrollType,
    pub amount: f64,
    pub uploaded_by: String,
}

impl PayrollUpsert {
    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.employee_id.into(),
            self.period.month.into(),
            self.period.year.into(),
            self.payroll_type.as_ref().into(),
            self.amount.into(),
            self.uploaded_by.as_str().into(),
        ]
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// Stored values of a payroll row that may be overwritten.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct StoredEntry {
    pub employee_id: u64,
    pub amount: f64,
    pub uploaded_by: String,
}

/// Classifies an upsert against the row already holding its key, if any.
pub fn upsert_outcome(row: &PayrollUpsert, stored: Option<&StoredEntry>) -> UpsertOutcome {
    match stored {
        None => UpsertOutcome::Inserted,
        Some(s) if s.amount == row.amount && s.uploaded_by == row.uploaded_by => UpsertOutcome::Unchanged,
        Some(_) => UpsertOutcome::Updated,
    }
}

/// Base-salary rows for every active employee in `period`.
pub fn plan_generation(employees: &[SalaryBasis], period: Period, uploader: &str) -> Vec<PayrollUpsert> {
    employees
        .iter()
        .map(|e| PayrollUpsert {
            employee_id: e.id,
            period,
            payroll_type: PayrollType::BaseSalary,
            amount: e.base_salary,
            uploaded_by: uploader.to_string(),
        })
        .collect()
}

/// `(gross, deductions, net)` for a slip.
pub fn slip_totals(items: &[Payroll]) -> (f64, f64, f64) {
    let mut gross = 0.0;
    let mut deductions = 0.0;
    let mut net = 0.0;
    for item in items {
        let kind = PayrollType::from_str(&item.payroll_type).unwrap_or(PayrollType::Allowance);
        if kind == PayrollType::Deduction {
            deductions += item.amount;
        } else {
            gross += item.amount;
        }
        net += kind.sign() * item.amount;
    }
    (gross, deductions, net)
}

fn validate_amount(amount: f64) -> AppResult<()> {
    if amount.is_finite() && amount >= 0.0 {
        Ok(())
    } else {
        Err(AppError::validation("amount must be a non-negative number"))
    }
}

async fn upsert(conn: &mut MySqlConnection, row: &PayrollUpsert) -> AppResult<()> {
    let sql = build_upsert_sql("payroll", &UPSERT_COLUMNS, &UPSERT_UPDATES);
    sqlx::query(&sql).bind_values(row.values()).execute(conn).await?;
    Ok(())
}

/// Locks and returns the rows of one type in a period, keyed by employee.
async fn lock_stored(
    conn: &mut MySqlConnection,
    period: Period,
    payroll_type: PayrollType,
    employee_id: Option<u64>,
) -> AppResult<HashMap<u64, StoredEntry>> {
    let payroll_type: &str = payroll_type.as_ref();
    let filter = WhereBuilder::new()
        .eq_opt("month", Some(period.month))
        .eq_opt("year", Some(period.year))
        .eq_opt("payroll_type", Some(payroll_type))
        .eq_opt("employee_id", employee_id);

    let rows = sqlx::query_as::<_, StoredEntry>(&format!(
        "SELECT employee_id, amount, uploaded_by FROM payroll{} FOR UPDATE",
        filter.clause()
    ))
    .bind_values(filter.values())
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().map(|r| (r.employee_id, r)).collect())
}

/// List payroll rows
#[utoipa::path(
    get,
    path = "/api/payroll",
    params(PayrollQuery),
    responses(
        (status = 200, description = "Paginated payroll rows; non-finance callers only see their own", body = Object),
        (status = 400, description = "Invalid filter"),
        (status = 401, description = "Unauthenticated")
    ),
    security(("session_cookie" = [])),
    tag = "Payroll"
)]
#[instrument(name = "payroll_list", skip_all, fields(employee_id = auth.employee_id))]
pub async fn list_payrolls(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<PayrollQuery>,
) -> AppResult<HttpResponse> {
    let (page, per_page, offset) = paginate(query.page, query.per_page, 20);

    let payroll_type = query
        .payroll_type
        .as_deref()
        .map(PayrollType::from_str)
        .transpose()
        .map_err(|_| AppError::validation("Unknown payroll_type"))?;

    let filter = WhereBuilder::new()
        .eq_opt(
            "employee_id",
            auth.scoped_employee(Capability::ViewAllPayroll, query.employee_id),
        )
        .eq_opt("month", query.month)
        .eq_opt("year", query.year)
        .eq_opt("payroll_type", payroll_type.map(|t| t.as_ref().to_string()));

    let count_sql = format!("SELECT COUNT(*) FROM payroll{}", filter.clause());
    let total = sqlx::query_scalar::<_, i64>(&count_sql)
        .bind_values(filter.values())
        .fetch_one(pool.get_ref())
        .await?;

    let data_sql = format!(
        "SELECT {PAYROLL_COLUMNS} FROM payroll{} ORDER BY year DESC, month DESC, employee_id LIMIT ? OFFSET ?",
        filter.clause()
    );
    let items = sqlx::query_as::<_, Payroll>(&data_sql)
        .bind_values(filter.values())
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool.get_ref())
        .await?;

    Ok(success(
        "Payroll list",
        Paginated {
            items,
            page,
            per_page,
            total,
        },
    ))
}

/// Payroll slip for one employee and month
#[utoipa::path(
    get,
    path = "/api/payroll/slip",
    params(SlipQuery),
    responses(
        (status = 200, description = "Slip with totals", body = PayrollSlip),
        (status = 401, description = "Unauthenticated"),
        (status = 404, description = "Employee not found")
    ),
    security(("session_cookie" = [])),
    tag = "Payroll"
)]
#[instrument(name = "payroll_slip", skip_all, fields(employee_id = auth.employee_id))]
pub async fn payroll_slip(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    query: web::Query<SlipQuery>,
) -> AppResult<HttpResponse> {
    let period = Period::or_current(query.month, query.year, config.local_now().date())?;
    let employee_id = auth
        .scoped_employee(Capability::ViewAllPayroll, query.employee_id)
        .unwrap_or(auth.employee_id);

    let employee = sqlx::query_as::<_, SlipEmployee>(
        "SELECT id, full_name, department_code FROM employees WHERE id = ?",
    )
    .bind(employee_id)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(|| AppError::not_found("Employee not found"))?;

    let items = sqlx::query_as::<_, Payroll>(&format!(
        "SELECT {PAYROLL_COLUMNS} FROM payroll
         WHERE employee_id = ? AND month = ? AND year = ?
         ORDER BY payroll_type"
    ))
    .bind(employee_id)
    .bind(period.month)
    .bind(period.year)
    .fetch_all(pool.get_ref())
    .await?;

    let (gross, deductions, net) = slip_totals(&items);

    Ok(success(
        "Payroll slip",
        PayrollSlip {
            employee,
            period,
            items,
            gross,
            deductions,
            net,
        },
    ))
}

/// Create or replace a single payroll entry (finance only)
#[utoipa::path(
    post,
    path = "/api/payroll",
    request_body = UpsertPayroll,
    responses(
        (status = 200, description = "Payroll entry saved"),
        (status = 400, description = "Invalid period or amount"),
        (status = 401, description = "Unauthenticated"),
        (status = 403, description = "Finance department only"),
        (status = 404, description = "Employee not found")
    ),
    security(("session_cookie" = [])),
    tag = "Payroll"
)]
#[instrument(name = "payroll_upsert", skip_all, fields(employee_id = auth.employee_id))]
pub async fn upsert_payroll(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<UpsertPayroll>,
) -> AppResult<HttpResponse> {
    auth.require(Capability::ManagePayroll)?;

    let period = Period::new(payload.month, payload.year)?;
    validate_amount(payload.amount)?;

    let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM employees WHERE id = ?")
        .bind(payload.employee_id)
        .fetch_one(pool.get_ref())
        .await?;
    if exists == 0 {
        return Err(AppError::not_found("Employee not found"));
    }

    let row = PayrollUpsert {
        employee_id: payload.employee_id,
        period,
        payroll_type: payload.payroll_type,
        amount: payload.amount,
        uploaded_by: auth.username.clone(),
    };

    let mut tx = pool.begin().await?;
    let stored = lock_stored(&mut tx, period, row.payroll_type, Some(row.employee_id)).await?;
    let outcome = upsert_outcome(&row, stored.get(&row.employee_id));
    if outcome != UpsertOutcome::Unchanged {
        upsert(&mut tx, &row).await?;
    }
    tx.commit().await?;

    info!(target_employee = row.employee_id, ?outcome, "Payroll entry saved");

    Ok(success(
        "Payroll entry saved",
        serde_json::json!({
            "inserted": outcome == UpsertOutcome::Inserted,
            "updated": outcome == UpsertOutcome::Updated,
        }),
    ))
}

/// Generate base-salary payroll for every active employee (finance only)
#[utoipa::path(
    post,
    path = "/api/payroll/generate",
    request_body = GeneratePayroll,
    responses(
        (status = 200, description = "Rows inserted or updated", body = GenerateSummary),
        (status = 400, description = "Invalid period"),
        (status = 401, description = "Unauthenticated"),
        (status = 403, description = "Finance department only")
    ),
    security(("session_cookie" = [])),
    tag = "Payroll"
)]
#[instrument(name = "payroll_generate", skip_all, fields(employee_id = auth.employee_id))]
pub async fn generate_payroll(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<GeneratePayroll>,
) -> AppResult<HttpResponse> {
    auth.require(Capability::ManagePayroll)?;
    let period = Period::new(payload.month, payload.year)?;

    let employees = sqlx::query_as::<_, SalaryBasis>(
        "SELECT id, base_salary FROM employees WHERE status = 'active' ORDER BY id",
    )
    .fetch_all(pool.get_ref())
    .await?;

    let plan = plan_generation(&employees, period, &auth.username);
    let mut summary = GenerateSummary {
        employees: plan.len(),
        ..Default::default()
    };

    let mut tx = pool.begin().await?;
    let stored = lock_stored(&mut tx, period, PayrollType::BaseSalary, None).await?;
    for row in &plan {
        match upsert_outcome(row, stored.get(&row.employee_id)) {
            UpsertOutcome::Inserted => summary.inserted += 1,
            UpsertOutcome::Updated => summary.updated += 1,
            UpsertOutcome::Unchanged => {
                summary.unchanged += 1;
                continue;
            }
        }
        upsert(&mut tx, row).await?;
    }
    tx.commit().await?;

    info!(
        month = period.month,
        year = period.year,
        employees = summary.employees,
        inserted = summary.inserted,
        updated = summary.updated,
        "Payroll generated"
    );

    Ok(success("Payroll generated", summary))
}
