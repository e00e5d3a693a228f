// Queries over an analyzed index

pub mod engine;

pub use engine::{DependencyDirection, DependencyGraph, QueryEngine, SearchOutcome, SearchType, UsageQuery, UsageRecord};
