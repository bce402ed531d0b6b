//! Ogma Core - Object-graph mapping for property graph databases
//!
//! This crate provides the storage-agnostic mapping engine:
//! - Schema model with inheritance and most-specific resolution
//! - Cascading save/load materialization with cycle guards
//! - Lazy entity references with one-time, race-safe initialization
//! - Repository façade over a pluggable storage adapter
//!
//! Physical backends live in sibling crates (`ogma-memgraph`,
//! `ogma-sqlite`) and implement [`GraphAdapter`].

pub mod adapter;
pub mod element;
pub mod entity;
pub mod error;
pub mod ident;
pub mod repository;
pub mod schema;
pub mod value;

// Re-exports for convenience
pub use adapter::{GraphAdapter, StoreError};
pub use element::{Direction, ElementKind, ElementRef};
pub use entity::{AnyRef, Ref, RefRead, RefWrite};
pub use error::{MappingError, SchemaError};
pub use ident::{Base64IdCodec, CodecError, IdCodec};
pub use repository::{PageRequest, Repository, SaveOutcome, Sort, SortOrder};
pub use schema::mapping::{PostCommitHook, PostCommitHooks};
pub use schema::{
    AccessError, Cardinality, IdAccessor, IndexKind, Property, PropertyKind, Schema,
    SchemaBuilder, SchemaLink, SchemaRegistry, SchemaSource, SchemaWriter,
};
pub use value::{PropertyValue, Scalar, ValueKind};
