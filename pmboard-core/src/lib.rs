//! Core library for PM Board.
//!
//! This crate provides the domain models, database operations, changelog
//! handling and markdown rendering for PM Board, independent of any
//! transport layer (HTTP, MCP, etc.).
//!
//! # Usage
//!
//! ```no_run
//! use pmboard_core::board::Board;
//! use pmboard_core::db::Database;
//! use pmboard_core::models::*;
//!
//! let db = Database::open_default()?;
//! db.migrate()?;
//!
//! let project = db.create_project(CreateProjectInput {
//!     name: "Website".into(),
//!     ..Default::default()
//! })?;
//! let (feature, _) = Board::human(&db).create_feature(project.id, CreateFeatureInput {
//!     title: "Login page".into(),
//!     ..Default::default()
//! })?;
//! Board::human(&db).move_feature(feature.id, FeatureStatus::Todo, 0)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod board;
pub mod context;
pub mod db;
pub mod dedupe;
pub mod export;
pub mod models;
pub mod ordering;

// Re-export commonly used types at crate root
pub use board::{Board, BoardError};
pub use db::Database;
