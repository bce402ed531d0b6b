//! Ogma MemGraph - In-memory reference backend
//!
//! A complete, deterministic `GraphAdapter` over a petgraph-backed
//! property graph, plus a catalog-style schema writer. Primarily the
//! backend the mapping test-suites run against, and a template for
//! writing real adapters.

pub mod store;
pub mod writer;

// Re-exports for convenience
pub use store::MemGraph;
pub use writer::{IndexDef, MemSchemaWriter};
