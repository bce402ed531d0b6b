//! Schema writer for the SQLite backend.
//!
//! Maintains the `ogm_labels`/`ogm_indexes` catalog tables for a schema.
//! Safe to call repeatedly; runs under a savepoint so a mid-way failure
//! rolls the partial DDL back.

use std::sync::Arc;

use rusqlite::params;
use tracing::debug;

use ogma_core::adapter::StoreError;
use ogma_core::schema::{Schema, SchemaWriter};
use ogma_core::IndexKind;

use crate::store::SqliteGraph;

/// Catalog writer over a [`SqliteGraph`].
pub struct SqliteSchemaWriter {
    store: Arc<SqliteGraph>,
}

impl SqliteSchemaWriter {
    pub fn new(store: Arc<SqliteGraph>) -> Self {
        Self { store }
    }

    /// Recorded index property names for a label, in catalog order.
    pub fn indexed_properties(&self, label: &str) -> Result<Vec<String>, StoreError> {
        self.store.with_conn(|conn| {
            let mut statement = conn
                .prepare("SELECT property FROM ogm_indexes WHERE label = ?1 ORDER BY property")?;
            let rows = statement
                .query_map(params![label], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

impl SchemaWriter for SqliteSchemaWriter {
    fn write(&self, schema: &Schema) -> Result<(), StoreError> {
        let result = self.store.with_conn(|conn| {
            conn.execute_batch("SAVEPOINT ogm_ddl")?;
            let outcome = (|| -> rusqlite::Result<()> {
                conn.execute(
                    "INSERT OR REPLACE INTO ogm_labels (label, kind) VALUES (?1, ?2)",
                    params![schema.label(), schema.kind().as_str()],
                )?;
                for property in schema.properties() {
                    let Some(value_kind) = property.value_kind() else {
                        continue;
                    };
                    if property.index() == IndexKind::None {
                        continue;
                    }
                    conn.execute(
                        "INSERT OR REPLACE INTO ogm_indexes (label, property, kind, value_kind) \
                         VALUES (?1, ?2, ?3, ?4)",
                        params![
                            schema.label(),
                            property.name(),
                            property.index().as_str(),
                            value_kind.as_str()
                        ],
                    )?;
                }
                Ok(())
            })();
            match outcome {
                Ok(()) => {
                    conn.execute_batch("RELEASE ogm_ddl")?;
                    Ok(())
                }
                Err(err) => {
                    // partial DDL must not survive
                    conn.execute_batch("ROLLBACK TO ogm_ddl; RELEASE ogm_ddl")?;
                    Err(err)
                }
            }
        });
        if result.is_ok() {
            debug!(label = schema.label(), "ensured schema catalog entry");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ogma_core::schema::SchemaBuilder;

    #[derive(Debug, Default)]
    struct Place {
        id: Option<String>,
        name: Option<String>,
    }

    fn place_schema() -> Schema {
        SchemaBuilder::<Place>::vertex("place")
            .id(|p: &Place| p.id.clone(), |p, id| p.id = id)
            .indexed_property(
                "name",
                IndexKind::Unique,
                |p: &Place| p.name.clone(),
                |p, v| p.name = Some(v),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_writer_records_catalog_entries() {
        let store = Arc::new(SqliteGraph::in_memory().unwrap());
        let writer = SqliteSchemaWriter::new(store);
        writer.write(&place_schema()).unwrap();
        assert_eq!(writer.indexed_properties("place").unwrap(), vec!["name"]);
    }

    #[test]
    fn test_writer_is_idempotent() {
        let store = Arc::new(SqliteGraph::in_memory().unwrap());
        let writer = SqliteSchemaWriter::new(store);
        let schema = place_schema();
        writer.write(&schema).unwrap();
        writer.write(&schema).unwrap();
        assert_eq!(writer.indexed_properties("place").unwrap().len(), 1);
    }
}
