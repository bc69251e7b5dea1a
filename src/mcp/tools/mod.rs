//! Tool handlers.

pub mod files;
pub mod python_exec;
pub mod report_issue;
pub mod save_code;
pub mod todo_write;
pub mod util;
