use actix_web::{
    HttpResponse, ResponseError,
    body::BoxBody,
    dev::ServiceResponse,
    http::StatusCode,
    middleware::ErrorHandlerResponse,
};
use derive_more::Display;
use serde_json::json;
use sqlx::error::ErrorKind;

pub const EXPIRED_MESSAGE: &str = "Session expired, please log in again";
const GENERIC_MESSAGE: &str = "Something went wrong, contact the system admin";

/// InnoDB deadlock (error 1213); the losing transaction has been rolled back.
const MYSQL_DEADLOCK_STATE: &str = "40001";

/// Error taxonomy shared by every handler.
#[derive(Debug, Display)]
pub enum AppError {
    #[display(fmt = "Unauthenticated: {}", _0)]
    Unauthenticated(String),

    #[display(fmt = "Session expired")]
    Expired,

    #[display(fmt = "Forbidden: {}", _0)]
    Forbidden(String),

    #[display(fmt = "Not found: {}", _0)]
    NotFound(String),

    #[display(fmt = "Validation failed: {}", _0)]
    Validation(String),

    #[display(fmt = "Conflict: {}", _0)]
    Conflict(String),

    #[display(fmt = "Persistence error: {}", _0)]
    Persistence(String),

    #[display(fmt = "Internal error: {}", _0)]
    Internal(String),
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn unauthenticated(msg: impl Into<String>) -> Self {
        AppError::Unauthenticated(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        AppError::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        AppError::Conflict(msg.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthenticated(_) => "UNAUTHENTICATED",
            AppError::Expired => "SESSION_EXPIRED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Persistence(_) | AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show to any client.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Unauthenticated(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Validation(msg)
            | AppError::Conflict(msg) => msg.clone(),
            AppError::Expired => EXPIRED_MESSAGE.to_string(),
            AppError::Persistence(_) | AppError::Internal(_) => GENERIC_MESSAGE.to_string(),
        }
    }

    /// Underlying detail of a 500-class error.
    pub fn detail(&self) -> Option<&str> {
        match self {
            AppError::Persistence(d) | AppError::Internal(d) => Some(d),
            _ => None,
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated(_) | AppError::Expired => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Persistence(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse<BoxBody> {
        if let Some(detail) = self.detail() {
            tracing::error!(error = %detail, code = self.code(), "Request failed");
        }

        HttpResponse::build(self.status_code()).json(json!({
            "status": "error",
            "error": self.code(),
            "message": self.public_message(),
        }))
    }
}

/// Maps a database-reported failure by constraint kind and SQLSTATE.
fn database_error(kind: ErrorKind, code: Option<&str>, message: &str) -> AppError {
    match kind {
        ErrorKind::UniqueViolation => AppError::Conflict("Record already exists".to_string()),
        ErrorKind::ForeignKeyViolation => {
            AppError::Validation("Referenced record does not exist".to_string())
        }
        ErrorKind::NotNullViolation | ErrorKind::CheckViolation => {
            AppError::Validation("Missing or out-of-range value".to_string())
        }
        _ if code == Some(MYSQL_DEADLOCK_STATE) => {
            AppError::Conflict("Concurrent update, please retry".to_string())
        }
        _ => AppError::Persistence(message.to_string()),
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db_err) => {
                database_error(db_err.kind(), db_err.code().as_deref(), &e.to_string())
            }
            _ => AppError::Persistence(e.to_string()),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        AppError::Internal(format!("token signing failed: {e}"))
    }
}

/// Maps extractor failures (bad JSON, query or path) onto the taxonomy.
pub fn extractor_error(err: impl std::fmt::Display) -> actix_web::Error {
    AppError::Validation(err.to_string()).into()
}

/// Development-only handler that puts the suppressed detail back into 500 bodies.
pub fn expose_error_detail<B>(
    res: ServiceResponse<B>,
) -> actix_web::Result<ErrorHandlerResponse<B>> {
    let detail = res
        .response()
        .error()
        .and_then(|e| e.as_error::<AppError>())
        .and_then(|e| e.detail().map(str::to_owned));

    let Some(detail) = detail else {
        return Ok(ErrorHandlerResponse::Response(res.map_into_left_body()));
    };

    let (req, _) = res.into_parts();
    let body = HttpResponse::InternalServerError().json(json!({
        "status": "error",
        "error": "INTERNAL_ERROR",
        "message": GENERIC_MESSAGE,
        "detail": detail,
    }));

    Ok(ErrorHandlerResponse::Response(
        ServiceResponse::new(req, body).map_into_right_body(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_http_status() {
        let cases = [
            (AppError::unauthenticated("x"), StatusCode::UNAUTHORIZED),
            (AppError::Expired, StatusCode::UNAUTHORIZED),
            (AppError::forbidden("x"), StatusCode::FORBIDDEN),
            (AppError::not_found("x"), StatusCode::NOT_FOUND),
            (AppError::validation("x"), StatusCode::BAD_REQUEST),
            (AppError::conflict("x"), StatusCode::CONFLICT),
            (AppError::Persistence("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.status_code(), status, "{err}");
        }
    }

    #[test]
    fn persistence_detail_is_not_public() {
        let err = AppError::Persistence("table attendance doesn't exist".into());
        assert_eq!(err.public_message(), GENERIC_MESSAGE);
        assert_eq!(err.detail(), Some("table attendance doesn't exist"));
    }

    #[test]
    fn expired_has_renew_message() {
        assert_eq!(AppError::Expired.public_message(), EXPIRED_MESSAGE);
        assert_eq!(AppError::Expired.code(), "SESSION_EXPIRED");
    }

    #[test]
    fn row_not_found_is_persistence() {
        let err: AppError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, AppError::Persistence(_)));
    }

    #[test]
    fn only_duplicate_keys_are_conflicts() {
        let dup = database_error(ErrorKind::UniqueViolation, Some("23000"), "Duplicate entry");
        assert!(matches!(dup, AppError::Conflict(_)));

        let fk = database_error(ErrorKind::ForeignKeyViolation, Some("23000"), "fk");
        assert_eq!(fk.status_code(), StatusCode::BAD_REQUEST);

        let not_null = database_error(ErrorKind::NotNullViolation, Some("23000"), "null");
        assert_eq!(not_null.status_code(), StatusCode::BAD_REQUEST);

        let other = database_error(ErrorKind::Other, Some("23000"), "constraint");
        assert!(matches!(other, AppError::Persistence(_)));
    }

    #[test]
    fn deadlock_is_a_conflict() {
        let err = database_error(ErrorKind::Other, Some(MYSQL_DEADLOCK_STATE), "Deadlock found");
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }
}
