pub mod attendance_stats;
pub mod attendance_window;
pub mod db_utils;
pub mod period;
