pub mod attendance;
pub mod employee;
pub mod payroll;
pub mod response;
pub mod schedule;
pub mod security_log;
pub mod ticket;
