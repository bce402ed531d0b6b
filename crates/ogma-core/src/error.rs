//! Error taxonomy.
//!
//! Two layers: [`SchemaError`] for configuration problems (fatal, raised at
//! registration or first use, never degraded), and [`MappingError`] for
//! operation-time failures on the save/load path. Backend errors pass
//! through [`MappingError::Store`] unchanged; per-property failures inside
//! a cascade never surface here at all: they are logged and skipped so one
//! bad field cannot abort the enclosing save or load.

use thiserror::Error;

use crate::adapter::StoreError;
use crate::element::{Direction, ElementKind};
use crate::ident::CodecError;
use crate::schema::property::AccessError;

/// Configuration errors in the schema model.
///
/// All of these indicate a mis-built registry and should abort startup.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// A schema for the same type is already registered
    #[error("a schema for type '{type_name}' is already registered")]
    DuplicateSchema { type_name: &'static str },

    /// A schema with the same label is already registered
    #[error("a schema with label '{label}' is already registered")]
    DuplicateLabel { label: String },

    /// Two properties in one schema's own set share a name
    #[error("duplicate property '{name}' on schema for type '{type_name}'")]
    DuplicateProperty {
        type_name: &'static str,
        name: String,
    },

    /// An edge schema declared two adjacent properties with the same direction
    #[error("schema for type '{type_name}' already has an {direction}-direction adjacent property")]
    AdjacentDirectionTaken {
        type_name: &'static str,
        direction: Direction,
    },

    /// Adjacent properties only make sense on edge schemas
    #[error("vertex schema for type '{type_name}' cannot declare adjacent properties")]
    AdjacentOnVertex { type_name: &'static str },

    /// No schema registered for a type (and no registered ancestor)
    #[error("no schema registered for type '{type_name}'")]
    MissingSchema { type_name: &'static str },

    /// A relational property points at a type that never got registered
    #[error("schema '{from}' links to unregistered type '{to}'")]
    UnresolvedLink { from: String, to: &'static str },

    /// Neither the schema nor any super-schema declares an id accessor
    #[error("no id accessor on schema for type '{type_name}' or any super-schema")]
    MissingIdAccessor { type_name: &'static str },

    /// The `extends_via` projection does not target the super-schema's type
    #[error("projection for '{type_name}' does not target super-schema type '{expected}'")]
    ProjectionMismatch {
        type_name: &'static str,
        expected: &'static str,
    },

    /// Schema kind inconsistent with how it is being used
    #[error("schema '{label}' is a {actual} schema where a {expected} schema is required")]
    KindMismatch {
        label: String,
        expected: ElementKind,
        actual: ElementKind,
    },

    /// Element label resolved to an abstract schema
    #[error("cannot materialize abstract schema '{label}'")]
    AbstractSchema { label: String },

    /// Registration attempted after the registry was frozen
    #[error("schema registry is frozen; all registration must happen at startup")]
    RegistryFrozen,

    /// Save/load traffic attempted before the registry was frozen
    #[error("schema registry is not frozen yet; call freeze() before using repositories")]
    RegistryNotFrozen,
}

/// Operation-time errors on the save/load path.
#[derive(Debug, Error)]
pub enum MappingError {
    /// Configuration problem discovered at use time
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Backend failure, propagated unchanged
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Identifier decoding failed
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A structural accessor (id, endpoint) failed
    #[error(transparent)]
    Access(#[from] AccessError),

    /// Update or delete requested for an id that resolves to nothing
    #[error("{kind} '{id}' does not exist")]
    NotFound { kind: ElementKind, id: String },

    /// The entity carries no graph identifier
    #[error("entity has no graph identifier")]
    MissingIdentifier,

    /// Whole-graph scans, sorting and paging are not supported
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// A loaded instance is not of the requested type
    #[error("loaded entity is a '{actual}', not a '{expected}' (use the dyn lookup for subtypes)")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// An edge-mapped entity is missing one of its endpoint objects
    #[error("edge '{label}' has no {direction}-direction endpoint object")]
    MissingEndpoint { label: String, direction: Direction },
}

impl MappingError {
    /// Create a NotFound error.
    pub fn not_found(kind: ElementKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SchemaError::MissingSchema { type_name: "demo::Person" };
        assert!(err.to_string().contains("demo::Person"));

        let err = MappingError::not_found(ElementKind::Vertex, "v9");
        assert!(err.to_string().contains("v9"));
        assert!(err.to_string().contains("vertex"));
    }

    #[test]
    fn test_store_error_passthrough() {
        let err = MappingError::from(StoreError::backend("connection reset"));
        assert_eq!(err.to_string(), "backend error: connection reset");
    }
}
