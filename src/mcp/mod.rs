//! Model Context Protocol server layer.

pub mod context;
pub mod handler;
pub mod tools;
pub mod transport;
