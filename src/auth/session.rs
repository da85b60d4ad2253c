use chrono::Utc;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::error::{AppError, AppResult};

/// Only HMAC-SHA256 tokens are accepted.
const SESSION_ALGORITHM: Algorithm = Algorithm::HS256;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionClaims {
    /// Username.
    pub sub: String,
    pub employee_id: u64,
    /// Department code, e.g. `KEU`.
    pub department: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

pub fn issue_session(
    employee_id: u64,
    username: &str,
    department: &str,
    config: &SessionConfig,
) -> AppResult<String> {
    let now = Utc::now().timestamp();
    let claims = SessionClaims {
        sub: username.to_string(),
        employee_id,
        department: department.to_string(),
        iat: now,
        exp: now + config.ttl_secs,
        jti: Uuid::new_v4().to_string(),
    };

    Ok(encode(
        &Header::new(SESSION_ALGORITHM),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )?)
}

/// Verifies signature, algorithm and expiry of a session token.
pub fn verify_session(token: &str, config: &SessionConfig) -> AppResult<SessionClaims> {
    let mut validation = Validation::new(SESSION_ALGORITHM);
    validation.leeway = 0;

    decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AppError::Expired,
        _ => {
            tracing::debug!(error = %e, "Rejected session token");
            AppError::unauthenticated("Invalid session")
        }
    })
}

#[cfg(test)]
pub mod test_tokens {
    use super::*;

    /// Signs arbitrary claims; lets tests forge expired or foreign tokens.
    pub fn sign(claims: &SessionClaims, alg: Algorithm, secret: &str) -> String {
        encode(
            &Header::new(alg),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .expect("signing test token")
    }

    pub fn claims_for(employee_id: u64, username: &str, department: &str, exp: i64) -> SessionClaims {
        SessionClaims {
            sub: username.to_string(),
            employee_id,
            department: department.to_string(),
            iat: exp - 3600,
            exp,
            jti: Uuid::new_v4().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_tokens::*;
    use super::*;
    use crate::config::test_support::{TEST_SECRET, test_config};

    #[test]
    fn issued_session_verifies() {
        let config = test_config().session;
        let token = issue_session(7, "rina", "IT", &config).unwrap();

        let claims = verify_session(&token, &config).unwrap();
        assert_eq!(claims.employee_id, 7);
        assert_eq!(claims.sub, "rina");
        assert_eq!(claims.department, "IT");
        assert_eq!(claims.exp - claims.iat, config.ttl_secs);
    }

    #[test]
    fn expired_session_is_reported_as_expired() {
        let config = test_config().session;
        let claims = claims_for(7, "rina", "IT", Utc::now().timestamp() - 120);
        let token = sign(&claims, Algorithm::HS256, TEST_SECRET);

        assert!(matches!(verify_session(&token, &config), Err(AppError::Expired)));
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let config = test_config().session;
        let token = issue_session(7, "rina", "IT", &config).unwrap();
        let (signed, signature) = token.rsplit_once('.').unwrap();
        let first = signature.chars().next().unwrap();
        let flipped = if first == 'A' { 'B' } else { 'A' };
        let tampered = format!("{signed}.{flipped}{}", &signature[1..]);

        assert!(matches!(
            verify_session(&tampered, &config),
            Err(AppError::Unauthenticated(_))
        ));
    }

    #[test]
    fn forged_payload_with_other_department_is_rejected() {
        let config = test_config().session;
        let token = issue_session(7, "rina", "IT", &config).unwrap();
        let parts: Vec<&str> = token.split('.').collect();

        let forged_claims = claims_for(7, "rina", "KEU", Utc::now().timestamp() + 600);
        let forged = sign(&forged_claims, Algorithm::HS256, "some-other-secret-entirely-0000000");
        let forged_payload = forged.split('.').nth(1).unwrap();
        let spliced = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

        assert!(matches!(
            verify_session(&spliced, &config),
            Err(AppError::Unauthenticated(_))
        ));
    }

    #[test]
    fn other_algorithms_are_rejected() {
        let config = test_config().session;
        let claims = claims_for(7, "rina", "IT", Utc::now().timestamp() + 600);
        let token = sign(&claims, Algorithm::HS512, TEST_SECRET);

        assert!(matches!(
            verify_session(&token, &config),
            Err(AppError::Unauthenticated(_))
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        let config = test_config().session;
        assert!(matches!(
            verify_session("not-a-token", &config),
            Err(AppError::Unauthenticated(_))
        ));
    }
}
