use actix_web::cookie::{Cookie, SameSite, time::Duration};
use actix_web::{HttpRequest, HttpResponse, web};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::{debug, info, instrument};
use utoipa::ToSchema;

use crate::api::response::ApiResponse;
use crate::api::security_log::{SecurityRecord, record_event};
use crate::auth::middleware::session_token;
use crate::auth::password::verify_password;
use crate::auth::session::{issue_session, verify_session};
use crate::config::{Config, SessionConfig};
use crate::error::{AppError, AppResult};
use crate::model::employee::{EmployeeCredentials, EmploymentStatus};
use crate::model::security_log::SecurityEvent;

const INVALID_CREDENTIALS: &str = "Invalid username or password";

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "budi.santoso")]
    pub username: String,
    #[schema(example = "rahasia-123")]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    #[schema(example = 1042)]
    pub employee_id: u64,
    #[schema(example = "budi.santoso")]
    pub username: String,
    #[schema(example = "KEU")]
    pub department: String,
}

/// HTTP-only session cookie living as long as the token inside it.
pub fn session_cookie(config: &SessionConfig, token: String) -> Cookie<'static> {
    Cookie::build(config.cookie_name.clone(), token)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.secure_cookie)
        .max_age(Duration::seconds(config.ttl_secs))
        .finish()
}

/// Expired, empty cookie that makes the browser drop the session.
pub fn removal_cookie(config: &SessionConfig) -> Cookie<'static> {
    let mut cookie = session_cookie(config, String::new());
    cookie.make_removal();
    cookie
}

fn is_active(credentials: &EmployeeCredentials) -> bool {
    credentials
        .status
        .parse::<EmploymentStatus>()
        .is_ok_and(|s| s == EmploymentStatus::Active)
}

/// Log in and receive the session cookie
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in; the session cookie is set", body = LoginResponse),
        (status = 400, description = "Username or password missing"),
        (status = 401, description = "Invalid username or password"),
        (status = 429, description = "Too many attempts")
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_login", skip_all, fields(username = %payload.username))]
pub async fn login(
    req: HttpRequest,
    payload: web::Json<LoginRequest>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    let username = payload.username.trim();
    if username.is_empty() || payload.password.is_empty() {
        return Err(AppError::validation("Username and password are required"));
    }

    debug!("Fetching credentials");
    let credentials = sqlx::query_as::<_, EmployeeCredentials>(
        "SELECT id, username, password_hash, department_code, status
         FROM employees
         WHERE username = ?",
    )
    .bind(username)
    .fetch_optional(pool.get_ref())
    .await?;

    let verified = match &credentials {
        Some(c) if is_active(c) => verify_password(&payload.password, &c.password_hash)?,
        _ => false,
    };

    let Some(employee) = credentials.filter(|_| verified) else {
        info!("Login rejected");
        record_event(
            pool.get_ref(),
            SecurityRecord::from_request(&req, SecurityEvent::LoginFailed, None, username),
        )
        .await;
        return Err(AppError::unauthenticated(INVALID_CREDENTIALS));
    };

    let token = issue_session(
        employee.id,
        &employee.username,
        &employee.department_code,
        &config.session,
    )?;

    record_event(
        pool.get_ref(),
        SecurityRecord::from_request(&req, SecurityEvent::LoginSuccess, Some(employee.id), &employee.username),
    )
    .await;
    info!(employee_id = employee.id, "Login successful");

    Ok(HttpResponse::Ok()
        .cookie(session_cookie(&config.session, token))
        .json(ApiResponse {
            status: "success",
            message: "Login successful".to_string(),
            data: LoginResponse {
                employee_id: employee.id,
                username: employee.username,
                department: employee.department_code,
            },
        }))
}

/// Log out; always succeeds and clears the session cookie
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logged out; the session cookie is removed")
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_logout", skip_all)]
pub async fn logout(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> HttpResponse {
    let claims = session_token(&req, &config.session.cookie_name)
        .and_then(|token| verify_session(&token, &config.session).ok());

    if let Some(claims) = claims {
        record_event(
            pool.get_ref(),
            SecurityRecord::from_request(&req, SecurityEvent::Logout, Some(claims.employee_id), &claims.sub),
        )
        .await;
        info!(employee_id = claims.employee_id, "Logged out");
    }

    HttpResponse::Ok()
        .cookie(removal_cookie(&config.session))
        .json(ApiResponse {
            status: "success",
            message: "Logged out".to_string(),
            data: (),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support::test_config;
    use actix_web::{App, http::StatusCode, test as actix_test};
    use sqlx::mysql::MySqlPoolOptions;

    #[test]
    fn session_cookie_is_http_only_and_lax() {
        let config = test_config();
        let cookie = session_cookie(&config.session, "token".into());

        assert_eq!(cookie.name(), "hr_session");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(Duration::seconds(3600)));
    }

    #[test]
    fn secure_flag_follows_config() {
        let mut config = test_config();
        config.session.secure_cookie = true;
        assert_eq!(session_cookie(&config.session, "t".into()).secure(), Some(true));
    }

    #[test]
    fn removal_cookie_is_empty_and_expired() {
        let config = test_config();
        let cookie = removal_cookie(&config.session);
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(Duration::ZERO));
    }

    #[actix_web::test]
    async fn logout_without_session_still_clears_cookie() {
        let config = test_config();
        let pool = MySqlPoolOptions::new()
            .connect_lazy(&config.database_url)
            .unwrap();
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(pool))
                .app_data(web::Data::new(config))
                .route("/auth/logout", web::post().to(logout)),
        )
        .await;

        let res = actix_test::call_service(&app, actix_test::TestRequest::post().uri("/auth/logout").to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);

        let cleared = res
            .response()
            .cookies()
            .find(|c| c.name() == "hr_session")
            .map(|c| c.value().to_string());
        assert_eq!(cleared.as_deref(), Some(""));
    }

    #[actix_web::test]
    async fn blank_login_is_a_validation_error() {
        let config = test_config();
        let pool = MySqlPoolOptions::new()
            .connect_lazy(&config.database_url)
            .unwrap();
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(pool))
                .app_data(web::Data::new(config))
                .route("/auth/login", web::post().to(login)),
        )
        .await;

        let req = actix_test::TestRequest::post()
            .uri("/auth/login")
            .set_json(serde_json::json!({"username": "  ", "password": ""}))
            .to_request();
        let res = actix_test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
