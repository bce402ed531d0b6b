//! Storage adapter trait.
//!
//! Defines the narrow interface the materializer needs from a physical
//! graph store. The core is agnostic to the implementation: backends are
//! thin adapters over whatever the store's native API looks like.

use thiserror::Error;

use crate::element::{Direction, ElementKind, ElementRef};
use crate::value::PropertyValue;

/// Errors surfaced by a storage adapter.
///
/// The materializer never retries or reinterprets these; they propagate
/// unchanged to the caller of the repository façade.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An element referenced by id does not exist
    #[error("{kind} '{id}' not found in store")]
    ElementNotFound { kind: ElementKind, id: String },

    /// An id string is not in the backend's id format
    #[error("invalid element id '{0}'")]
    InvalidId(String),

    /// The stored data could not be interpreted
    #[error("corrupted store data: {0}")]
    Corrupted(String),

    /// Any other backend failure (connectivity, commit, constraint)
    #[error("backend error: {0}")]
    Backend(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Create an ElementNotFound error.
    pub fn not_found(element: &ElementRef) -> Self {
        Self::ElementNotFound {
            kind: element.kind,
            id: element.id.clone(),
        }
    }

    /// Create a Backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Create a Corrupted error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }
}

/// Backend for graph element storage.
///
/// This trait defines the unified interface implemented by every storage
/// backend. Elements are addressed by [`ElementRef`] tokens; ids are
/// backend-native strings (pre-encoding).
///
/// Implementations must be safe to share across threads; the core calls
/// into the adapter from whichever thread triggers a save or a lazy load.
pub trait GraphAdapter: Send + Sync {
    /// Create a new vertex with the given label.
    fn create_vertex(&self, label: &str) -> Result<ElementRef, StoreError>;

    /// Create a new edge from `out_vertex` to `in_vertex` with the given label.
    fn create_edge(
        &self,
        out_vertex: &ElementRef,
        in_vertex: &ElementRef,
        label: &str,
    ) -> Result<ElementRef, StoreError>;

    /// Fetch the vertex with the given id, creating a fresh one with the
    /// given label when the id is absent or unknown.
    fn find_or_create_vertex(
        &self,
        id: Option<&str>,
        label: &str,
    ) -> Result<ElementRef, StoreError>;

    /// Look up a vertex by id.
    fn vertex_by_id(&self, id: &str) -> Result<Option<ElementRef>, StoreError>;

    /// Look up an edge by id.
    fn edge_by_id(&self, id: &str) -> Result<Option<ElementRef>, StoreError>;

    /// Whether the id string is in this backend's id format.
    ///
    /// Used to decide between the create and update paths on save; it does
    /// not imply the element currently exists.
    fn is_valid_id(&self, id: &str) -> bool;

    /// The label of an element.
    fn label(&self, element: &ElementRef) -> Result<String, StoreError>;

    /// Read a property value off an element.
    fn property(
        &self,
        element: &ElementRef,
        key: &str,
    ) -> Result<Option<PropertyValue>, StoreError>;

    /// Write a property value onto an element.
    fn set_property(
        &self,
        element: &ElementRef,
        key: &str,
        value: PropertyValue,
    ) -> Result<(), StoreError>;

    /// Remove an element (and, for vertices, its incident edges).
    fn remove(&self, element: &ElementRef) -> Result<(), StoreError>;

    /// Edges incident to `vertex` whose endpoint in `direction` is `vertex`
    /// itself, filtered by label.
    ///
    /// `Direction::Out` returns edges leaving the vertex, `Direction::In`
    /// edges arriving at it.
    fn adjacent_edges(
        &self,
        vertex: &ElementRef,
        direction: Direction,
        label: &str,
    ) -> Result<Vec<ElementRef>, StoreError>;

    /// The vertex at the given end of an edge (`Out` = source, `In` = target).
    fn edge_endpoint(
        &self,
        edge: &ElementRef,
        direction: Direction,
    ) -> Result<ElementRef, StoreError>;

    /// The element's current id.
    ///
    /// Backends that only assign final ids at commit time return the final
    /// id here once the enclosing transaction has committed; the deferred
    /// id-assignment hooks rely on this.
    fn element_id(&self, element: &ElementRef) -> Result<String, StoreError>;

    /// Commit the current transaction.
    fn commit(&self) -> Result<(), StoreError>;

    /// Roll back the current transaction.
    fn rollback(&self) -> Result<(), StoreError>;
}
