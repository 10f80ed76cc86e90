//! PM Board server: HTTP API, MCP server and configuration on top of
//! `pmboard-core`.

pub mod api;
pub mod config;
pub mod mcp;
pub mod uploads;

pub use pmboard_core::{db, models};
