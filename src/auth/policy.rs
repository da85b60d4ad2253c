//! Department → capability table.
//!
//! Every entitlement check goes through [`allows`]; handlers never compare
//! department codes themselves.

use serde::Serialize;
use strum_macros::{AsRefStr, Display};
use utoipa::ToSchema;

pub const DEPT_FINANCE: &str = "KEU";
pub const DEPT_IT: &str = "IT";
pub const DEPT_HR: &str = "HRD";

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, Serialize, ToSchema)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ViewAllPayroll,
    ManagePayroll,
    ManageTickets,
    ReadAllTicketNotes,
    ViewSecurityLogs,
    ManageSchedules,
    ViewAllSchedules,
}

use Capability::*;

static POLICY: &[(&str, &[Capability])] = &[
    (DEPT_FINANCE, &[ViewAllPayroll, ManagePayroll]),
    (DEPT_IT, &[ManageTickets, ReadAllTicketNotes, ViewSecurityLogs]),
    (DEPT_HR, &[ManageSchedules, ViewAllSchedules]),
];

/// Capabilities granted to a department; empty for anything not listed.
pub fn capabilities(department: &str) -> &'static [Capability] {
    POLICY
        .iter()
        .find(|(code, _)| code.eq_ignore_ascii_case(department.trim()))
        .map(|(_, caps)| *caps)
        .unwrap_or(&[])
}

pub fn allows(department: &str, capability: Capability) -> bool {
    capabilities(department).contains(&capability)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finance_sees_all_payroll() {
        assert!(allows("KEU", ViewAllPayroll));
        assert!(allows("KEU", ManagePayroll));
        assert!(!allows("KEU", ReadAllTicketNotes));
    }

    #[test]
    fn it_reads_notes_and_security_logs_but_not_payroll() {
        assert!(allows("IT", ReadAllTicketNotes));
        assert!(allows("IT", ViewSecurityLogs));
        assert!(!allows("IT", ViewAllPayroll));
    }

    #[test]
    fn department_codes_are_case_insensitive() {
        assert!(allows("keu", ViewAllPayroll));
        assert!(allows(" hrd ", ManageSchedules));
    }

    #[test]
    fn unknown_department_has_nothing() {
        assert!(capabilities("PRODUKSI").is_empty());
        assert!(capabilities("").is_empty());
    }
}
