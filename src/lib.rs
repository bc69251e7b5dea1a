#![forbid(unsafe_code)]

pub mod audit;
pub mod config;
pub mod errors;
pub mod kernel;
pub mod mcp;
pub mod workspace;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
