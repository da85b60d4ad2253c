use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage, HttpRequest, ResponseError,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    web::Data,
};

use crate::auth::auth::AuthUser;
use crate::auth::session::verify_session;
use crate::config::Config;
use crate::error::AppError;

/// Session cookie first, `Authorization: Bearer` as a fallback for API clients.
pub fn session_token(req: &HttpRequest, cookie_name: &str) -> Option<String> {
    if let Some(cookie) = req.cookie(cookie_name) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }

    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn authenticate(req: &ServiceRequest) -> Result<AuthUser, AppError> {
    let config = req
        .app_data::<Data<Config>>()
        .ok_or_else(|| AppError::Internal("App config missing".into()))?;

    let token = session_token(req.request(), &config.session.cookie_name)
        .ok_or_else(|| AppError::unauthenticated("Missing session"))?;

    verify_session(&token, &config.session).map(AuthUser::from)
}

pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let auth_user = match authenticate(&req) {
        Ok(user) => user,
        Err(err) => {
            tracing::debug!(path = %req.path(), error = %err, "Unauthenticated request");
            let resp = err.error_response();
            return Ok(req.into_response(resp));
        }
    };

    tracing::trace!(employee_id = auth_user.employee_id, path = %req.path(), "Authenticated");
    req.extensions_mut().insert(auth_user);

    next.call(req).await
}
