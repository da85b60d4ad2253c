use crate::{
    api::{attendance, employee, payroll, schedule, security_log, ticket},
    auth::{handlers, middleware::auth_middleware},
    config::Config,
    error::extractor_error,
};
use actix_governor::{
    Governor, GovernorConfig, GovernorConfigBuilder, PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

/// One request slot comes back every this many milliseconds.
fn replenish_interval_ms(requests_per_min: u32) -> u64 {
    (60_000 / u64::from(requests_per_min.max(1))).max(1)
}

/// Per-peer limiter allowing `requests_per_min` with the same burst.
fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let requests_per_min = requests_per_min.max(1);
    let cfg = GovernorConfigBuilder::default()
        .milliseconds_per_request(replenish_interval_ms(requests_per_min))
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .unwrap_or_else(GovernorConfig::default);
    Governor::new(&cfg)
}

/// Extractor failures become `VALIDATION_ERROR` responses.
pub fn extractor_configs(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _| extractor_error(err)))
        .app_data(web::QueryConfig::default().error_handler(|err, _| extractor_error(err)))
        .app_data(web::PathConfig::default().error_handler(|err, _| extractor_error(err)));
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config) {
    let login_limiter = Arc::new(build_limiter(config.rate_login_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    extractor_configs(cfg);

    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/logout")
                    .wrap(login_limiter)
                    .route(web::post().to(handlers::logout)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(protected_limiter) // rate limiting
            .service(
                web::resource("/profile")
                    .route(web::get().to(employee::get_profile))
                    .route(web::put().to(employee::update_profile)),
            )
            .service(
                web::scope("/attendance")
                    .route("/status", web::get().to(attendance::status))
                    .route("/today", web::get().to(attendance::today))
                    .route("/completed", web::get().to(attendance::completed))
                    .route("/history", web::get().to(attendance::history))
                    .route("/stats", web::get().to(attendance::stats))
                    .route("/check-in", web::post().to(attendance::check_in))
                    .route("/check-out", web::post().to(attendance::check_out)),
            )
            .service(
                web::scope("/payroll")
                    // /payroll
                    .service(
                        web::resource("")
                            .route(web::get().to(payroll::list_payrolls))
                            .route(web::post().to(payroll::upsert_payroll)),
                    )
                    .route("/slip", web::get().to(payroll::payroll_slip))
                    .route("/generate", web::post().to(payroll::generate_payroll)),
            )
            .service(
                web::scope("/tickets")
                    // /tickets
                    .service(
                        web::resource("")
                            .route(web::get().to(ticket::list_tickets))
                            .route(web::post().to(ticket::create_ticket)),
                    )
                    // /tickets/{id}
                    .route("/{id}", web::get().to(ticket::get_ticket))
                    .route("/{id}/status", web::put().to(ticket::update_ticket_status))
                    .route("/{id}/assign", web::put().to(ticket::assign_ticket))
                    .service(
                        web::resource("/{id}/notes")
                            .route(web::get().to(ticket::list_ticket_notes))
                            .route(web::post().to(ticket::add_ticket_note)),
                    )
                    .route("/{id}/status-history", web::get().to(ticket::ticket_status_history)),
            )
            .service(
                web::resource("/schedule")
                    .route(web::get().to(schedule::get_schedule))
                    .route(web::put().to(schedule::set_schedule)),
            )
            .route("/shifts", web::get().to(schedule::list_shifts))
            .route("/employees", web::get().to(employee::list_employees))
            .route("/employees/{id}", web::get().to(employee::get_employee))
            .route("/departments", web::get().to(employee::list_departments))
            .route("/security-logs", web::get().to(security_log::list_security_logs)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::session::test_tokens::{claims_for, sign};
    use crate::auth::session::issue_session;
    use crate::config::test_support::{TEST_SECRET, test_config};
    use crate::error::EXPIRED_MESSAGE;
    use actix_web::{App, http::StatusCode, test as actix_test};
    use chrono::Utc;
    use jsonwebtoken::Algorithm;
    use serde_json::Value;
    use sqlx::mysql::MySqlPoolOptions;

    #[test]
    fn limiter_interval_spreads_the_minute() {
        assert_eq!(replenish_interval_ms(60), 1_000);
        assert_eq!(replenish_interval_ms(0), 60_000);
        assert_eq!(replenish_interval_ms(120_000), 1);
    }

    macro_rules! test_app {
        () => {{
            let config = test_config();
            let pool = MySqlPoolOptions::new()
                .connect_lazy(&config.database_url)
                .unwrap();
            actix_test::init_service(
                App::new()
                    .app_data(web::Data::new(pool))
                    .app_data(web::Data::new(config.clone()))
                    .configure(|cfg| configure(cfg, &config)),
            )
            .await
        }};
    }

    fn peer() -> std::net::SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    #[actix_web::test]
    async fn missing_cookie_is_unauthenticated() {
        let app = test_app!();
        let req = actix_test::TestRequest::get()
            .uri("/api/attendance/status")
            .peer_addr(peer())
            .to_request();

        let res = actix_test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let body: Value = actix_test::read_body_json(res).await;
        assert_eq!(body["error"], "UNAUTHENTICATED");
    }

    #[actix_web::test]
    async fn expired_session_reports_expiry() {
        let app = test_app!();
        let expired = claims_for(7, "budi", "KEU", Utc::now().timestamp() - 60);
        let token = sign(&expired, Algorithm::HS256, TEST_SECRET);

        let req = actix_test::TestRequest::get()
            .uri("/api/payroll")
            .cookie(actix_web::cookie::Cookie::new("hr_session", token))
            .peer_addr(peer())
            .to_request();

        let res = actix_test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let body: Value = actix_test::read_body_json(res).await;
        assert_eq!(body["error"], "SESSION_EXPIRED");
        assert_eq!(body["message"], EXPIRED_MESSAGE);
    }

    #[actix_web::test]
    async fn non_finance_cannot_generate_payroll() {
        let app = test_app!();
        let config = test_config();
        let token = issue_session(8, "andi", "IT", &config.session).unwrap();

        let req = actix_test::TestRequest::post()
            .uri("/api/payroll/generate")
            .cookie(actix_web::cookie::Cookie::new("hr_session", token))
            .peer_addr(peer())
            .set_json(serde_json::json!({"month": 5, "year": 2024}))
            .to_request();

        let res = actix_test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        let body: Value = actix_test::read_body_json(res).await;
        assert_eq!(body["error"], "FORBIDDEN");
    }

    #[actix_web::test]
    async fn bearer_header_is_accepted_as_fallback() {
        let app = test_app!();
        let config = test_config();
        let token = issue_session(9, "rina", "KEU", &config.session).unwrap();

        // HRD-only endpoint, so a valid non-HR session stops at the policy check
        let req = actix_test::TestRequest::put()
            .uri("/api/schedule")
            .insert_header(("Authorization", format!("Bearer {token}")))
            .peer_addr(peer())
            .set_json(serde_json::json!({"employee_id": 1, "entries": []}))
            .to_request();

        let res = actix_test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn malformed_json_is_a_validation_error() {
        let app = test_app!();
        let config = test_config();
        let token = issue_session(1, "sari", "KEU", &config.session).unwrap();

        let req = actix_test::TestRequest::post()
            .uri("/api/payroll/generate")
            .cookie(actix_web::cookie::Cookie::new("hr_session", token))
            .peer_addr(peer())
            .insert_header(("Content-Type", "application/json"))
            .set_payload("{\"month\": \"five\"}")
            .to_request();

        let res = actix_test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: Value = actix_test::read_body_json(res).await;
        assert_eq!(body["error"], "VALIDATION_ERROR");
    }

    #[actix_web::test]
    async fn forged_signature_is_rejected() {
        let app = test_app!();
        let claims = claims_for(7, "budi", "KEU", Utc::now().timestamp() + 600);
        let token = sign(&claims, Algorithm::HS256, "another-secret-that-is-long-enough-000000");

        let req = actix_test::TestRequest::get()
            .uri("/api/payroll")
            .cookie(actix_web::cookie::Cookie::new("hr_session", token))
            .peer_addr(peer())
            .to_request();

        let res = actix_test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}
