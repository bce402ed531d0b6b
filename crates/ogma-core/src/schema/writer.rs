//! Schema writer collaborator.
//!
//! Pushing schema metadata into a concrete database's DDL (label
//! creation, property indexes) is backend-specific; the core only fixes
//! the contract.

use crate::adapter::StoreError;
use crate::schema::Schema;

/// Per-backend schema DDL writer.
///
/// Implementations ensure the backend's label, property and index
/// definitions for a schema exist. `write` must be idempotent (calling
/// it repeatedly for the same schema is safe) and must roll back partial
/// DDL when it fails midway.
pub trait SchemaWriter {
    fn write(&self, schema: &Schema) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn _assert_object_safe(_: &dyn SchemaWriter) {}
}
