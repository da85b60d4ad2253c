pub mod attendance;
pub mod department;
pub mod employee;
pub mod payroll;
pub mod schedule;
pub mod security_log;
pub mod shift;
pub mod ticket;
