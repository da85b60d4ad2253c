use crate::api::attendance::{AttendanceFlags, CheckInRequest, StatsResponse, TodayResponse};
use crate::api::employee::UpdateProfile;
use crate::api::payroll::{GeneratePayroll, GenerateSummary, PayrollSlip, SlipEmployee, UpsertPayroll};
use crate::api::schedule::{ScheduleDay, ScheduleMonth, SetSchedule};
use crate::api::ticket::{AssignTicket, CreateNote, CreateTicket, UpdateTicketStatus};
use crate::auth::handlers::{LoginRequest, LoginResponse};
use crate::model::attendance::{CompletedAttendance, OpenAttendance};
use crate::model::department::Department;
use crate::model::employee::{Employee, EmploymentStatus};
use crate::model::payroll::{Payroll, PayrollType};
use crate::model::schedule::ScheduleEntry;
use crate::model::security_log::{SecurityEvent, SecurityLog};
use crate::model::shift::ShiftResponse;
use crate::model::ticket::{
    NoteCategory, Ticket, TicketNote, TicketPriority, TicketStatus, TicketStatusHistory,
};
use crate::utils::attendance_stats::AttendanceStats;
use crate::utils::attendance_window::AttendanceStatus;
use crate::utils::period::Period;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

/// Registers the session cookie as the security scheme every protected path refers to.
pub struct SessionCookieAddon;

impl Modify for SessionCookieAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "session_cookie",
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::with_description(
                    "hr_session",
                    "Signed session token set by POST /auth/login",
                ))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "HR Presensi API",
        version = "1.0.0",
        description = r#"
## HR attendance, payroll and ticketing

- **Attendance (presensi)**: check-in/check-out against the assigned shift, including night shifts that end after midnight
- **Payroll**: finance uploads and monthly generation; everyone else sees only their own slip
- **Tickets**: IT help desk with an append-only status history and categorized notes
- **Schedules**: monthly shift planning by HR
- **Directory**: employees, departments and the caller's own profile

### Security
Log in through `POST /auth/login`; the session travels in an HTTP-only cookie.
Department-based capabilities gate finance, IT and HR operations.

### Response format
`{ "status": "success", "message", "data" }` on success and
`{ "status": "error", "error", "message" }` on failure.
"#,
    ),
    paths(
        crate::auth::handlers::login,
        crate::auth::handlers::logout,

        crate::api::attendance::status,
        crate::api::attendance::today,
        crate::api::attendance::completed,
        crate::api::attendance::check_in,
        crate::api::attendance::check_out,
        crate::api::attendance::history,
        crate::api::attendance::stats,

        crate::api::payroll::list_payrolls,
        crate::api::payroll::payroll_slip,
        crate::api::payroll::upsert_payroll,
        crate::api::payroll::generate_payroll,

        crate::api::ticket::create_ticket,
        crate::api::ticket::list_tickets,
        crate::api::ticket::get_ticket,
        crate::api::ticket::update_ticket_status,
        crate::api::ticket::assign_ticket,
        crate::api::ticket::list_ticket_notes,
        crate::api::ticket::add_ticket_note,
        crate::api::ticket::ticket_status_history,

        crate::api::schedule::get_schedule,
        crate::api::schedule::set_schedule,
        crate::api::schedule::list_shifts,

        crate::api::employee::list_employees,
        crate::api::employee::get_employee,
        crate::api::employee::list_departments,
        crate::api::employee::get_profile,
        crate::api::employee::update_profile,

        crate::api::security_log::list_security_logs
    ),
    components(
        schemas(
            LoginRequest,
            LoginResponse,
            AttendanceStatus,
            AttendanceFlags,
            AttendanceStats,
            CheckInRequest,
            TodayResponse,
            StatsResponse,
            OpenAttendance,
            CompletedAttendance,
            Period,
            Payroll,
            PayrollType,
            UpsertPayroll,
            GeneratePayroll,
            GenerateSummary,
            PayrollSlip,
            SlipEmployee,
            Ticket,
            TicketStatus,
            TicketPriority,
            TicketNote,
            NoteCategory,
            TicketStatusHistory,
            CreateTicket,
            UpdateTicketStatus,
            AssignTicket,
            CreateNote,
            ScheduleEntry,
            ScheduleDay,
            ScheduleMonth,
            SetSchedule,
            ShiftResponse,
            Employee,
            EmploymentStatus,
            UpdateProfile,
            Department,
            SecurityLog,
            SecurityEvent
        )
    ),
    modifiers(&SessionCookieAddon),
    tags(
        (name = "Auth", description = "Login and logout"),
        (name = "Attendance", description = "Check-in, check-out and attendance history"),
        (name = "Payroll", description = "Payroll rows, slips and monthly generation"),
        (name = "Tickets", description = "IT help desk"),
        (name = "Schedule", description = "Shift catalogue and monthly schedules"),
        (name = "Directory", description = "Employees and departments"),
        (name = "Profile", description = "The caller's own employee record"),
        (name = "Security", description = "Login and access audit trail"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_protected_paths_and_cookie_scheme() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/attendance/check-in"));
        assert!(doc.paths.paths.contains_key("/api/payroll/generate"));
        assert!(doc.paths.paths.contains_key("/api/tickets/{ticket_id}/notes"));

        let schemes = doc.components.map(|c| c.security_schemes).unwrap_or_default();
        assert!(schemes.contains_key("session_cookie"));
    }
}
