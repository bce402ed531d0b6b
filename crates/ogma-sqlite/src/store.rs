//! SQLite graph store.
//!
//! One database holds the whole graph; see [`crate::schema`] for the
//! table layout. Element properties travel as JSON blobs, ids are
//! `v<rowid>`/`e<rowid>` strings, and transactions map onto SQLite's
//! `BEGIN`/`COMMIT`/`ROLLBACK` (begun implicitly on the first mutation).

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, trace};

use ogma_core::adapter::{GraphAdapter, StoreError};
use ogma_core::element::{Direction, ElementKind, ElementRef};
use ogma_core::value::PropertyValue;

use crate::config::SqliteConfig;
use crate::schema::{
    GRAPH_SCHEMA_VERSION, SCHEMA_CREATE_CATALOG, SCHEMA_CREATE_EDGES, SCHEMA_CREATE_INDEXES,
    SCHEMA_CREATE_METADATA, SCHEMA_CREATE_VERTICES,
};

struct Inner {
    conn: Connection,
    in_tx: bool,
}

/// SQLite-backed `GraphAdapter`.
pub struct SqliteGraph {
    inner: Mutex<Inner>,
}

impl SqliteGraph {
    /// Open (or create) a graph database per the configuration.
    pub fn open(config: &SqliteConfig) -> Result<Self, StoreError> {
        let conn = match &config.path {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                Connection::open(path).map_err(sql_err)?
            }
            None => Connection::open_in_memory().map_err(sql_err)?,
        };

        if config.path.is_some() && config.wal {
            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(sql_err)?;
        }
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(sql_err)?;
        conn.pragma_update(None, "cache_size", -config.cache_kib)
            .map_err(sql_err)?;

        conn.execute(SCHEMA_CREATE_VERTICES, []).map_err(sql_err)?;
        conn.execute(SCHEMA_CREATE_EDGES, []).map_err(sql_err)?;
        conn.execute(SCHEMA_CREATE_METADATA, []).map_err(sql_err)?;
        conn.execute_batch(SCHEMA_CREATE_CATALOG).map_err(sql_err)?;
        conn.execute_batch(SCHEMA_CREATE_INDEXES).map_err(sql_err)?;
        conn.execute(
            "INSERT OR IGNORE INTO graph_metadata (key, value) VALUES ('schema_version', ?1)",
            params![GRAPH_SCHEMA_VERSION],
        )
        .map_err(sql_err)?;

        debug!(path = ?config.path, "opened sqlite graph");
        Ok(Self {
            inner: Mutex::new(Inner { conn, in_tx: false }),
        })
    }

    /// In-memory database, mostly for tests.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::open(&SqliteConfig::in_memory())
    }

    /// Run `f` against the underlying connection (schema writer support).
    pub(crate) fn with_conn<R>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<R>,
    ) -> Result<R, StoreError> {
        let inner = self.inner.lock();
        f(&inner.conn).map_err(sql_err)
    }

    /// Number of stored vertices.
    pub fn vertex_count(&self) -> Result<i64, StoreError> {
        self.with_conn(|conn| conn.query_row("SELECT COUNT(*) FROM vertices", [], |row| row.get(0)))
    }

    /// Number of stored edges.
    pub fn edge_count(&self) -> Result<i64, StoreError> {
        self.with_conn(|conn| conn.query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0)))
    }

    fn exists(conn: &Connection, element: &ElementRef) -> Result<Option<i64>, StoreError> {
        let (sql, prefix) = match element.kind {
            ElementKind::Vertex => ("SELECT id FROM vertices WHERE id = ?1", 'v'),
            ElementKind::Edge => ("SELECT id FROM edges WHERE id = ?1", 'e'),
        };
        let Some(rowid) = parse_rowid(&element.id, prefix) else {
            return Err(StoreError::InvalidId(element.id.clone()));
        };
        conn.query_row(sql, params![rowid], |row| row.get::<_, i64>(0))
            .optional()
            .map_err(sql_err)
    }

    fn require(conn: &Connection, element: &ElementRef) -> Result<i64, StoreError> {
        Self::exists(conn, element)?.ok_or_else(|| StoreError::not_found(element))
    }

    fn load_properties(
        conn: &Connection,
        element: &ElementRef,
        rowid: i64,
    ) -> Result<serde_json::Map<String, serde_json::Value>, StoreError> {
        let sql = match element.kind {
            ElementKind::Vertex => "SELECT properties_json FROM vertices WHERE id = ?1",
            ElementKind::Edge => "SELECT properties_json FROM edges WHERE id = ?1",
        };
        let json: String = conn
            .query_row(sql, params![rowid], |row| row.get(0))
            .optional()
            .map_err(sql_err)?
            .ok_or_else(|| StoreError::not_found(element))?;
        serde_json::from_str(&json).map_err(|e| StoreError::corrupted(e.to_string()))
    }

    fn store_properties(
        conn: &Connection,
        element: &ElementRef,
        rowid: i64,
        properties: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), StoreError> {
        let sql = match element.kind {
            ElementKind::Vertex => "UPDATE vertices SET properties_json = ?1 WHERE id = ?2",
            ElementKind::Edge => "UPDATE edges SET properties_json = ?1 WHERE id = ?2",
        };
        let json = serde_json::to_string(properties)
            .map_err(|e| StoreError::corrupted(e.to_string()))?;
        conn.execute(sql, params![json, rowid]).map_err(sql_err)?;
        Ok(())
    }
}

fn sql_err(err: rusqlite::Error) -> StoreError {
    StoreError::backend(err.to_string())
}

fn parse_rowid(id: &str, prefix: char) -> Option<i64> {
    id.strip_prefix(prefix)?.parse().ok()
}

fn begin_if_needed(inner: &mut Inner) -> Result<(), StoreError> {
    if !inner.in_tx {
        inner.conn.execute_batch("BEGIN").map_err(sql_err)?;
        inner.in_tx = true;
    }
    Ok(())
}

impl GraphAdapter for SqliteGraph {
    fn create_vertex(&self, label: &str) -> Result<ElementRef, StoreError> {
        let mut inner = self.inner.lock();
        begin_if_needed(&mut inner)?;
        inner
            .conn
            .execute("INSERT INTO vertices (label) VALUES (?1)", params![label])
            .map_err(sql_err)?;
        let rowid = inner.conn.last_insert_rowid();
        trace!(label, rowid, "created vertex");
        Ok(ElementRef::vertex(format!("v{rowid}")))
    }

    fn create_edge(
        &self,
        out_vertex: &ElementRef,
        in_vertex: &ElementRef,
        label: &str,
    ) -> Result<ElementRef, StoreError> {
        let mut inner = self.inner.lock();
        let out_id = Self::require(&inner.conn, out_vertex)?;
        let in_id = Self::require(&inner.conn, in_vertex)?;
        begin_if_needed(&mut inner)?;
        inner
            .conn
            .execute(
                "INSERT INTO edges (label, out_vertex, in_vertex) VALUES (?1, ?2, ?3)",
                params![label, out_id, in_id],
            )
            .map_err(sql_err)?;
        let rowid = inner.conn.last_insert_rowid();
        trace!(label, rowid, "created edge");
        Ok(ElementRef::edge(format!("e{rowid}")))
    }

    fn find_or_create_vertex(
        &self,
        id: Option<&str>,
        label: &str,
    ) -> Result<ElementRef, StoreError> {
        if let Some(id) = id {
            if let Some(existing) = self.vertex_by_id(id)? {
                return Ok(existing);
            }
        }
        self.create_vertex(label)
    }

    fn vertex_by_id(&self, id: &str) -> Result<Option<ElementRef>, StoreError> {
        if parse_rowid(id, 'v').is_none() {
            return Ok(None);
        }
        let element = ElementRef::vertex(id);
        let inner = self.inner.lock();
        Ok(Self::exists(&inner.conn, &element)?.map(|_| element.clone()))
    }

    fn edge_by_id(&self, id: &str) -> Result<Option<ElementRef>, StoreError> {
        if parse_rowid(id, 'e').is_none() {
            return Ok(None);
        }
        let element = ElementRef::edge(id);
        let inner = self.inner.lock();
        Ok(Self::exists(&inner.conn, &element)?.map(|_| element.clone()))
    }

    fn is_valid_id(&self, id: &str) -> bool {
        parse_rowid(id, 'v').is_some() || parse_rowid(id, 'e').is_some()
    }

    fn label(&self, element: &ElementRef) -> Result<String, StoreError> {
        let sql = match element.kind {
            ElementKind::Vertex => "SELECT label FROM vertices WHERE id = ?1",
            ElementKind::Edge => "SELECT label FROM edges WHERE id = ?1",
        };
        let inner = self.inner.lock();
        let rowid = Self::require(&inner.conn, element)?;
        inner
            .conn
            .query_row(sql, params![rowid], |row| row.get(0))
            .map_err(sql_err)
    }

    fn property(
        &self,
        element: &ElementRef,
        key: &str,
    ) -> Result<Option<PropertyValue>, StoreError> {
        let inner = self.inner.lock();
        let rowid = Self::require(&inner.conn, element)?;
        let properties = Self::load_properties(&inner.conn, element, rowid)?;
        match properties.get(key) {
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| StoreError::corrupted(e.to_string())),
            None => Ok(None),
        }
    }

    fn set_property(
        &self,
        element: &ElementRef,
        key: &str,
        value: PropertyValue,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let rowid = Self::require(&inner.conn, element)?;
        begin_if_needed(&mut inner)?;
        let mut properties = Self::load_properties(&inner.conn, element, rowid)?;
        let json_value =
            serde_json::to_value(value).map_err(|e| StoreError::corrupted(e.to_string()))?;
        properties.insert(key.to_string(), json_value);
        Self::store_properties(&inner.conn, element, rowid, &properties)
    }

    fn remove(&self, element: &ElementRef) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let rowid = Self::require(&inner.conn, element)?;
        begin_if_needed(&mut inner)?;
        match element.kind {
            ElementKind::Vertex => {
                // incident edges go with the vertex
                inner
                    .conn
                    .execute(
                        "DELETE FROM edges WHERE out_vertex = ?1 OR in_vertex = ?1",
                        params![rowid],
                    )
                    .map_err(sql_err)?;
                inner
                    .conn
                    .execute("DELETE FROM vertices WHERE id = ?1", params![rowid])
                    .map_err(sql_err)?;
            }
            ElementKind::Edge => {
                inner
                    .conn
                    .execute("DELETE FROM edges WHERE id = ?1", params![rowid])
                    .map_err(sql_err)?;
            }
        }
        Ok(())
    }

    fn adjacent_edges(
        &self,
        vertex: &ElementRef,
        direction: Direction,
        label: &str,
    ) -> Result<Vec<ElementRef>, StoreError> {
        let sql = match direction {
            Direction::Out => "SELECT id FROM edges WHERE out_vertex = ?1 AND label = ?2 ORDER BY id",
            Direction::In => "SELECT id FROM edges WHERE in_vertex = ?1 AND label = ?2 ORDER BY id",
        };
        let inner = self.inner.lock();
        let rowid = Self::require(&inner.conn, vertex)?;
        let mut statement = inner.conn.prepare(sql).map_err(sql_err)?;
        let rows = statement
            .query_map(params![rowid, label], |row| row.get::<_, i64>(0))
            .map_err(sql_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(sql_err)?;
        Ok(rows
            .into_iter()
            .map(|id| ElementRef::edge(format!("e{id}")))
            .collect())
    }

    fn edge_endpoint(
        &self,
        edge: &ElementRef,
        direction: Direction,
    ) -> Result<ElementRef, StoreError> {
        let inner = self.inner.lock();
        let rowid = Self::require(&inner.conn, edge)?;
        let (out_id, in_id): (i64, i64) = inner
            .conn
            .query_row(
                "SELECT out_vertex, in_vertex FROM edges WHERE id = ?1",
                params![rowid],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(sql_err)?;
        let vertex = match direction {
            Direction::Out => out_id,
            Direction::In => in_id,
        };
        Ok(ElementRef::vertex(format!("v{vertex}")))
    }

    fn element_id(&self, element: &ElementRef) -> Result<String, StoreError> {
        let inner = self.inner.lock();
        Self::require(&inner.conn, element)?;
        // rowids are final at insert time
        Ok(element.id.clone())
    }

    fn commit(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.in_tx {
            inner.conn.execute_batch("COMMIT").map_err(sql_err)?;
            inner.in_tx = false;
        }
        Ok(())
    }

    fn rollback(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.in_tx {
            inner.conn.execute_batch("ROLLBACK").map_err(sql_err)?;
            inner.in_tx = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_lifecycle() {
        let graph = SqliteGraph::in_memory().unwrap();
        let v = graph.create_vertex("person").unwrap();
        assert_eq!(graph.label(&v).unwrap(), "person");

        graph
            .set_property(&v, "name", PropertyValue::from("Graham"))
            .unwrap();
        assert_eq!(
            graph.property(&v, "name").unwrap(),
            Some(PropertyValue::from("Graham"))
        );
        assert_eq!(graph.property(&v, "missing").unwrap(), None);

        graph.remove(&v).unwrap();
        assert_eq!(graph.vertex_by_id(&v.id).unwrap(), None);
    }

    #[test]
    fn test_edge_traversal() {
        let graph = SqliteGraph::in_memory().unwrap();
        let a = graph.create_vertex("person").unwrap();
        let b = graph.create_vertex("address").unwrap();
        let e = graph.create_edge(&a, &b, "lives_at").unwrap();

        assert_eq!(
            graph.adjacent_edges(&a, Direction::Out, "lives_at").unwrap(),
            vec![e.clone()]
        );
        assert_eq!(
            graph.adjacent_edges(&b, Direction::In, "lives_at").unwrap(),
            vec![e.clone()]
        );
        assert_eq!(graph.edge_endpoint(&e, Direction::Out).unwrap(), a);
        assert_eq!(graph.edge_endpoint(&e, Direction::In).unwrap(), b);
    }

    #[test]
    fn test_rollback_discards_uncommitted_work() {
        let graph = SqliteGraph::in_memory().unwrap();
        let v = graph.create_vertex("person").unwrap();
        graph.commit().unwrap();

        graph.create_vertex("person").unwrap();
        graph
            .set_property(&v, "name", PropertyValue::from("temp"))
            .unwrap();
        graph.rollback().unwrap();

        assert_eq!(graph.property(&v, "name").unwrap(), None);
        let count: i64 = graph
            .with_conn(|conn| {
                conn.query_row("SELECT COUNT(*) FROM vertices", [], |row| row.get(0))
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_property_values_survive_json_blob() {
        let graph = SqliteGraph::in_memory().unwrap();
        let v = graph.create_vertex("sample").unwrap();
        for (key, value) in [
            ("b", PropertyValue::Bool(true)),
            ("i", PropertyValue::Int(-42)),
            ("f", PropertyValue::Float(1.25)),
            ("s", PropertyValue::String("text".into())),
            ("y", PropertyValue::Bytes(vec![0, 255, 7])),
        ] {
            graph.set_property(&v, key, value.clone()).unwrap();
            assert_eq!(graph.property(&v, key).unwrap(), Some(value));
        }
    }
}
