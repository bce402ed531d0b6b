//! Schema writer for the in-memory backend.
//!
//! There is no DDL to speak of in a memory store; the writer keeps a
//! catalog of known labels and requested indexes so callers can verify
//! what a real backend would have been asked to create. Idempotent by
//! construction: rewriting a schema replaces its catalog entry.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::debug;

use ogma_core::adapter::StoreError;
use ogma_core::element::ElementKind;
use ogma_core::schema::{Schema, SchemaWriter};
use ogma_core::value::ValueKind;
use ogma_core::IndexKind;

/// One requested property index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    pub property: String,
    pub kind: IndexKind,
    pub value_kind: ValueKind,
}

#[derive(Debug, Clone, Default)]
struct LabelEntry {
    kind: Option<ElementKind>,
    indexes: Vec<IndexDef>,
}

/// Catalog-backed schema writer.
#[derive(Debug, Default)]
pub struct MemSchemaWriter {
    catalog: Mutex<HashMap<String, LabelEntry>>,
}

impl MemSchemaWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Labels the writer has ensured so far.
    pub fn labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self.catalog.lock().keys().cloned().collect();
        labels.sort();
        labels
    }

    /// Index definitions recorded for a label.
    pub fn indexes_for(&self, label: &str) -> Vec<IndexDef> {
        self.catalog
            .lock()
            .get(label)
            .map(|entry| entry.indexes.clone())
            .unwrap_or_default()
    }

    /// The element kind recorded for a label.
    pub fn kind_of(&self, label: &str) -> Option<ElementKind> {
        self.catalog.lock().get(label).and_then(|entry| entry.kind)
    }
}

impl SchemaWriter for MemSchemaWriter {
    fn write(&self, schema: &Schema) -> Result<(), StoreError> {
        let mut indexes = Vec::new();
        for property in schema.properties() {
            let Some(value_kind) = property.value_kind() else {
                continue;
            };
            if property.index() == IndexKind::None {
                continue;
            }
            indexes.push(IndexDef {
                property: property.name().to_string(),
                kind: property.index(),
                value_kind,
            });
        }
        debug!(
            label = schema.label(),
            indexes = indexes.len(),
            "ensured label in catalog"
        );
        self.catalog.lock().insert(
            schema.label().to_string(),
            LabelEntry {
                kind: Some(schema.kind()),
                indexes,
            },
        );
        Ok(())
    }
}
