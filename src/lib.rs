//! tsgraph: a line-pattern index of TypeScript/JavaScript projects.
//!
//! An [`indexer::Indexer`] discovers files, extracts symbols, HTTP routes and
//! import edges, caches the resulting snapshot, and answers queries through
//! [`query::QueryEngine`]. The [`mcp`] module exposes the same operations as
//! MCP tools over stdio.

pub mod cli;
pub mod config;
pub mod error;
pub mod index;
pub mod indexer;
pub mod mcp;
pub mod query;

pub use error::{IndexError, Result};
pub use indexer::{AnalysisSummary, AnalyzeOptions, Indexer};
