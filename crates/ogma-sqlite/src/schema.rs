//! SQLite schema definitions for graph storage.
//!
//! One database holds the whole graph: a vertex table, an edge table with
//! endpoint references, and catalog tables the schema writer maintains.
//! Element properties are stored as a JSON blob per row.

/// Schema version for graph databases
pub const GRAPH_SCHEMA_VERSION: &str = "1.0";

/// SQL to create the vertices table
pub const SCHEMA_CREATE_VERTICES: &str = r#"
CREATE TABLE IF NOT EXISTS vertices (
    -- Backend-native id; exposed as "v<id>"
    id INTEGER PRIMARY KEY AUTOINCREMENT,

    -- Graph label (schema class name)
    label TEXT NOT NULL,

    -- Element properties (JSON blob for flexibility)
    properties_json TEXT NOT NULL DEFAULT '{}'
)
"#;

/// SQL to create the edges table
pub const SCHEMA_CREATE_EDGES: &str = r#"
CREATE TABLE IF NOT EXISTS edges (
    -- Backend-native id; exposed as "e<id>"
    id INTEGER PRIMARY KEY AUTOINCREMENT,

    -- Graph label (relationship type)
    label TEXT NOT NULL,

    -- Endpoint vertex ids
    out_vertex INTEGER NOT NULL,
    in_vertex INTEGER NOT NULL,

    -- Element properties (JSON blob for flexibility)
    properties_json TEXT NOT NULL DEFAULT '{}'
)
"#;

/// SQL to create indexes for efficient traversal
pub const SCHEMA_CREATE_INDEXES: &str = r#"
-- Label filtering
CREATE INDEX IF NOT EXISTS idx_vertices_label ON vertices(label);
CREATE INDEX IF NOT EXISTS idx_edges_label ON edges(label);

-- Outgoing and incoming adjacency
CREATE INDEX IF NOT EXISTS idx_edges_out ON edges(out_vertex, label);
CREATE INDEX IF NOT EXISTS idx_edges_in ON edges(in_vertex, label);
"#;

/// SQL to create the metadata table
pub const SCHEMA_CREATE_METADATA: &str = r#"
CREATE TABLE IF NOT EXISTS graph_metadata (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
)
"#;

/// SQL to create the schema-writer catalog tables
///
/// `ogm_labels` and `ogm_indexes` record what the mapped schemas asked
/// for; the writer keeps them idempotently in sync.
pub const SCHEMA_CREATE_CATALOG: &str = r#"
CREATE TABLE IF NOT EXISTS ogm_labels (
    label TEXT PRIMARY KEY NOT NULL,
    kind TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS ogm_indexes (
    label TEXT NOT NULL,
    property TEXT NOT NULL,
    kind TEXT NOT NULL,
    value_kind TEXT NOT NULL,
    PRIMARY KEY (label, property)
);
"#;
