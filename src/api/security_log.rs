use std::str::FromStr;

use actix_web::{HttpRequest, HttpResponse, web};
use serde::Deserialize;
use sqlx::MySqlPool;
use tracing::{instrument, warn};
use utoipa::IntoParams;

use crate::api::response::{Paginated, success};
use crate::auth::auth::AuthUser;
use crate::auth::policy::Capability;
use crate::error::{AppError, AppResult};
use crate::model::security_log::{SecurityEvent, SecurityLog};
use crate::utils::db_utils::{BindValues, SqlValue, WhereBuilder, build_insert_sql, execute, paginate};

const USER_AGENT_MAX: usize = 255;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SecurityLogQuery {
    /// `login_success`, `login_failed`, `logout` or `access_denied`.
    pub event: Option<String>,
    pub username: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Who did what, from where.
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityRecord {
    pub employee_id: Option<u64>,
    pub username: String,
    pub event: SecurityEvent,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl SecurityRecord {
    pub fn from_request(
        req: &HttpRequest,
        event: SecurityEvent,
        employee_id: Option<u64>,
        username: &str,
    ) -> Self {
        let ip_address = req
            .connection_info()
            .realip_remote_addr()
            .map(str::to_string);
        let user_agent = req
            .headers()
            .get("User-Agent")
            .and_then(|h| h.to_str().ok())
            .map(|ua| ua.chars().take(USER_AGENT_MAX).collect());

        Self {
            employee_id,
            username: username.to_string(),
            event,
            ip_address,
            user_agent,
        }
    }
}

/// Appends to the security log. A failed write is logged and swallowed so it
/// never changes the outcome of the request that triggered it.
pub async fn record_event(pool: &MySqlPool, record: SecurityRecord) {
    let sql = build_insert_sql(
        "security_logs",
        &["employee_id", "username", "event", "ip_address", "user_agent"],
    );
    let values: Vec<SqlValue> = vec![
        record.employee_id.into(),
        record.username.as_str().into(),
        record.event.as_ref().into(),
        record.ip_address.clone().into(),
        record.user_agent.clone().into(),
    ];

    if let Err(e) = execute(pool, &sql, values).await {
        warn!(error = %e, event = %record.event, username = %record.username, "Failed to write security log");
    }
}

fn log_filter(query: &SecurityLogQuery) -> AppResult<WhereBuilder> {
    let event = query
        .event
        .as_deref()
        .map(SecurityEvent::from_str)
        .transpose()
        .map_err(|_| AppError::validation("Unknown event"))?;

    Ok(WhereBuilder::new()
        .eq_opt("event", event.map(|e| e.as_ref().to_string()))
        .eq_opt(
            "username",
            query
                .username
                .as_deref()
                .map(str::trim)
                .filter(|u| !u.is_empty()),
        ))
}

/// Security log (IT only)
#[utoipa::path(
    get,
    path = "/api/security-logs",
    params(SecurityLogQuery),
    responses(
        (status = 200, description = "Paginated security events, newest first", body = Object),
        (status = 400, description = "Unknown event"),
        (status = 401, description = "Unauthenticated"),
        (status = 403, description = "IT department only")
    ),
    security(("session_cookie" = [])),
    tag = "Security"
)]
#[instrument(name = "security_log_list", skip_all, fields(employee_id = auth.employee_id))]
pub async fn list_security_logs(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<SecurityLogQuery>,
) -> AppResult<HttpResponse> {
    auth.require(Capability::ViewSecurityLogs)?;

    let (page, per_page, offset) = paginate(query.page, query.per_page, 50);
    let filter = log_filter(&query)?;

    let total = sqlx::query_scalar::<_, i64>(&format!(
        "SELECT COUNT(*) FROM security_logs{}",
        filter.clause()
    ))
    .bind_values(filter.values())
    .fetch_one(pool.get_ref())
    .await?;

    let items = sqlx::query_as::<_, SecurityLog>(&format!(
        "SELECT id, employee_id, username, event, ip_address, user_agent, created_at
         FROM security_logs{} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        filter.clause()
    ))
    .bind_values(filter.values())
    .bind(per_page)
    .bind(offset)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(success(
        "Security log",
        Paginated {
            items,
            page,
            per_page,
            total,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn record_captures_peer_and_truncates_user_agent() {
        let long_agent = "x".repeat(400);
        let req = TestRequest::default()
            .peer_addr("10.1.2.3:5555".parse().unwrap())
            .insert_header(("User-Agent", long_agent.as_str()))
            .to_http_request();

        let record = SecurityRecord::from_request(&req, SecurityEvent::LoginFailed, None, "budi");
        assert_eq!(record.ip_address.as_deref(), Some("10.1.2.3"));
        assert_eq!(record.user_agent.map(|ua| ua.len()), Some(USER_AGENT_MAX));
        assert_eq!(record.event.as_ref(), "login_failed");
    }

    #[test]
    fn filter_accepts_known_events_only() {
        let query = SecurityLogQuery {
            event: Some("access_denied".into()),
            username: Some("  ".into()),
            page: None,
            per_page: None,
        };
        let filter = log_filter(&query).unwrap();
        assert_eq!(filter.clause(), " WHERE event = ?");
        assert_eq!(filter.values(), vec![SqlValue::String("access_denied".into())]);

        let bad = SecurityLogQuery {
            event: Some("sudo".into()),
            username: None,
            page: None,
            per_page: None,
        };
        assert!(log_filter(&bad).is_err());
    }
}
