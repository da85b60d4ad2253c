use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload};
use futures::future::{Ready, ready};

use crate::auth::policy::{self, Capability};
use crate::auth::session::SessionClaims;
use crate::error::{AppError, AppResult};

/// Identity of the caller, placed in request extensions by the session middleware.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub employee_id: u64,
    pub username: String,
    pub department: String,
}

impl From<SessionClaims> for AuthUser {
    fn from(claims: SessionClaims) -> Self {
        Self {
            employee_id: claims.employee_id,
            username: claims.sub,
            department: claims.department,
        }
    }
}

impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthUser>()
                .cloned()
                .ok_or_else(|| AppError::unauthenticated("Not logged in")),
        )
    }
}

impl AuthUser {
    pub fn can(&self, capability: Capability) -> bool {
        policy::allows(&self.department, capability)
    }

    pub fn require(&self, capability: Capability) -> AppResult<()> {
        if self.can(capability) {
            Ok(())
        } else {
            tracing::info!(
                employee_id = self.employee_id,
                department = %self.department,
                capability = %capability,
                "Access denied"
            );
            Err(AppError::forbidden("You are not allowed to access this resource"))
        }
    }

    /// Employee id a query may target: privileged callers get what they asked
    /// for, everyone else is pinned to their own id.
    pub fn scoped_employee(&self, capability: Capability, requested: Option<u64>) -> Option<u64> {
        if self.can(capability) {
            requested
        } else {
            Some(self.employee_id)
        }
    }
}
