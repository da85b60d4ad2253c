use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value;
use sqlx::MySql;
use sqlx::mysql::MySqlArguments;
use sqlx::query::{Query, QueryAs, QueryScalar};

use crate::error::AppError;

/// ===============================
/// SQL bindable value enum
/// ===============================
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    String(String),
    U64(u64),
    I64(i64),
    F64(f64),
    Bool(bool),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    Null,
}

macro_rules! sql_value_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(impl From<$t> for SqlValue {
            fn from(v: $t) -> Self {
                SqlValue::$variant(v.into())
            }
        })*
    };
}

sql_value_from! {
    String => String,
    &str => String,
    u64 => U64,
    u32 => U64,
    u16 => U64,
    u8 => U64,
    i64 => I64,
    f64 => F64,
    bool => Bool,
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => DateTime,
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// Binds a list of [`SqlValue`]s onto any sqlx query shape.
pub trait BindValues: Sized {
    fn bind_value(self, value: SqlValue) -> Self;

    fn bind_values(self, values: impl IntoIterator<Item = SqlValue>) -> Self {
        values.into_iter().fold(self, |q, v| q.bind_value(v))
    }
}

macro_rules! impl_bind_values {
    ($([$($gen:tt)*] $ty:ty),* $(,)?) => {
        $(impl<$($gen)*> BindValues for $ty {
            fn bind_value(self, value: SqlValue) -> Self {
                match value {
                    SqlValue::String(v) => self.bind(v),
                    SqlValue::U64(v) => self.bind(v),
                    SqlValue::I64(v) => self.bind(v),
                    SqlValue::F64(v) => self.bind(v),
                    SqlValue::Bool(v) => self.bind(v),
                    SqlValue::Date(v) => self.bind(v),
                    SqlValue::Time(v) => self.bind(v),
                    SqlValue::DateTime(v) => self.bind(v),
                    SqlValue::Null => self.bind(None::<String>),
                }
            }
        })*
    };
}

impl_bind_values!(
    [] Query<'_, MySql, MySqlArguments>,
    [O] QueryAs<'_, MySql, O, MySqlArguments>,
    [O] QueryScalar<'_, MySql, O, MySqlArguments>,
);

/// ===============================
/// WHERE clause builder
/// ===============================
#[derive(Debug, Default)]
pub struct WhereBuilder {
    conditions: Vec<String>,
    values: Vec<SqlValue>,
}

impl WhereBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `column = ?`
    pub fn eq(mut self, column: &str, value: impl Into<SqlValue>) -> Self {
        self.conditions.push(format!("{column} = ?"));
        self.values.push(value.into());
        self
    }

    /// `column = ?` only when a value is present.
    pub fn eq_opt<T: Into<SqlValue>>(self, column: &str, value: Option<T>) -> Self {
        match value {
            Some(v) => self.eq(column, v),
            None => self,
        }
    }

    /// `(a LIKE ? OR b LIKE ? ...)` for a non-blank search term.
    pub fn search(mut self, columns: &[&str], term: Option<&str>) -> Self {
        let Some(term) = term.map(str::trim).filter(|t| !t.is_empty()) else {
            return self;
        };
        let like = format!("%{}%", term.replace('%', "\\%").replace('_', "\\_"));
        let ors = columns
            .iter()
            .map(|c| format!("{c} LIKE ?"))
            .collect::<Vec<_>>()
            .join(" OR ");
        self.conditions.push(format!("({ors})"));
        self.values
            .extend(columns.iter().map(|_| SqlValue::String(like.clone())));
        self
    }

    /// `" WHERE a = ? AND b = ?"`, or an empty string.
    pub fn clause(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.conditions.join(" AND "))
        }
    }

    pub fn values(&self) -> Vec<SqlValue> {
        self.values.clone()
    }
}

/// ===============================
/// INSERT / upsert
/// ===============================
pub fn build_insert_sql(table: &str, columns: &[&str]) -> String {
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.join(", "),
        placeholders
    )
}

/// INSERT that overwrites `update_columns` when a unique key already matches.
pub fn build_upsert_sql(table: &str, columns: &[&str], update_columns: &[&str]) -> String {
    let updates = update_columns
        .iter()
        .map(|c| format!("{c} = VALUES({c})"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "{} ON DUPLICATE KEY UPDATE {}",
        build_insert_sql(table, columns),
        updates
    )
}

/// ===============================
/// SQL update container
/// ===============================
#[derive(Debug)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

/// ===============================
/// Build dynamic UPDATE SQL
/// ===============================
///
/// Only keys listed in `allowed_columns` may be updated; anything else is a
/// validation error, so request bodies can never name arbitrary columns.
pub fn build_update_sql(
    table: &str,
    payload: &Value,
    allowed_columns: &[&str],
    id_column: &str,
    id_value: u64,
) -> Result<SqlUpdate, AppError> {
    let obj = payload
        .as_object()
        .ok_or_else(|| AppError::validation("Payload must be a JSON object"))?;

    if obj.is_empty() {
        return Err(AppError::validation("No fields provided for update"));
    }

    if let Some(bad) = obj.keys().find(|k| !allowed_columns.contains(&k.as_str())) {
        return Err(AppError::validation(format!("Field '{bad}' cannot be updated")));
    }

    // Build SET clause
    let set_clause = obj
        .keys()
        .map(|k| format!("{} = ?", k))
        .collect::<Vec<_>>()
        .join(", ");

    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ?",
        table, set_clause, id_column
    );

    let mut values = Vec::with_capacity(obj.len() + 1);

    // Convert JSON values → SqlValue
    for value in obj.values() {
        match value {
            Value::String(s) => {
                if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                    values.push(SqlValue::Date(d));
                } else if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
                    values.push(SqlValue::DateTime(dt));
                } else {
                    values.push(SqlValue::String(s.clone()));
                }
            }
            Value::Number(n) => {
                if let Some(u) = n.as_u64() {
                    values.push(SqlValue::U64(u));
                } else if let Some(i) = n.as_i64() {
                    values.push(SqlValue::I64(i));
                } else if let Some(f) = n.as_f64() {
                    values.push(SqlValue::F64(f));
                }
            }
            Value::Bool(b) => values.push(SqlValue::Bool(*b)),
            Value::Null => values.push(SqlValue::Null),
            _ => return Err(AppError::validation("Unsupported JSON value type")),
        }
    }

    // WHERE id = ?
    values.push(SqlValue::U64(id_value));

    Ok(SqlUpdate { sql, values })
}

/// ===============================
/// Execute raw parameterized SQL
/// ===============================
pub async fn execute<'e, E>(executor: E, sql: &str, values: Vec<SqlValue>) -> Result<u64, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = MySql>,
{
    let result = sqlx::query(sql).bind_values(values).execute(executor).await?;
    Ok(result.rows_affected())
}

pub async fn execute_update<'e, E>(executor: E, update: SqlUpdate) -> Result<u64, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = MySql>,
{
    execute(executor, &update.sql, update.values).await
}

/// Page/per-page normalisation shared by list endpoints.
pub fn paginate(page: Option<u32>, per_page: Option<u32>, default_per_page: u32) -> (u32, u32, u64) {
    let page = page.unwrap_or(1).max(1);
    let per_page = per_page.unwrap_or(default_per_page).clamp(1, 100);
    let offset = u64::from(page - 1) * u64::from(per_page);
    (page, per_page, offset)
}
