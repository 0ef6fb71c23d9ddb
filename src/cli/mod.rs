//! CLI command implementations

pub mod check;
mod http;
pub mod serve;
pub mod status;
