//! In-memory property graph store.
//!
//! Backed by `petgraph::StableGraph` so element indices survive removals.
//! Ids are `v<n>`/`e<n>` strings over the stable indices and are assigned
//! at creation time. Transactions are snapshot-based: the first mutation
//! after a commit clones the graph state, rollback restores it.

use std::collections::BTreeMap;

use parking_lot::{Mutex, RwLock};
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableGraph};
use petgraph::visit::EdgeRef;
use petgraph::Directed;
use tracing::trace;

use ogma_core::adapter::{GraphAdapter, StoreError};
use ogma_core::element::{Direction, ElementKind, ElementRef};
use ogma_core::value::PropertyValue;

#[derive(Debug, Clone)]
struct VertexRecord {
    label: String,
    properties: BTreeMap<String, PropertyValue>,
}

#[derive(Debug, Clone)]
struct EdgeRecord {
    label: String,
    properties: BTreeMap<String, PropertyValue>,
}

type Graph = StableGraph<VertexRecord, EdgeRecord, Directed>;

/// In-memory graph backend.
///
/// The reference `GraphAdapter` implementation: complete, deterministic,
/// and cheap enough that the mapping test-suites run against it.
#[derive(Default)]
pub struct MemGraph {
    state: RwLock<Graph>,
    /// Pre-transaction snapshot; `None` outside a transaction
    snapshot: Mutex<Option<Graph>>,
}

impl MemGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live vertices.
    pub fn vertex_count(&self) -> usize {
        self.state.read().node_count()
    }

    /// Number of live edges.
    pub fn edge_count(&self) -> usize {
        self.state.read().edge_count()
    }

    /// Number of live vertices carrying a label.
    pub fn vertices_with_label(&self, label: &str) -> usize {
        let graph = self.state.read();
        graph
            .node_weights()
            .filter(|record| record.label == label)
            .count()
    }

    /// Number of live edges carrying a label.
    pub fn edges_with_label(&self, label: &str) -> usize {
        let graph = self.state.read();
        graph
            .edge_weights()
            .filter(|record| record.label == label)
            .count()
    }

    /// Snapshot the state on the first mutation of a transaction.
    fn begin_if_needed(&self) {
        let mut snapshot = self.snapshot.lock();
        if snapshot.is_none() {
            *snapshot = Some((*self.state.read()).clone());
        }
    }

    fn vertex_index(&self, element: &ElementRef) -> Result<NodeIndex, StoreError> {
        let index = parse_index(&element.id, 'v')
            .ok_or_else(|| StoreError::InvalidId(element.id.clone()))?;
        let index = NodeIndex::new(index);
        if self.state.read().node_weight(index).is_none() {
            return Err(StoreError::not_found(element));
        }
        Ok(index)
    }

    fn edge_index(&self, element: &ElementRef) -> Result<EdgeIndex, StoreError> {
        let index = parse_index(&element.id, 'e')
            .ok_or_else(|| StoreError::InvalidId(element.id.clone()))?;
        let index = EdgeIndex::new(index);
        if self.state.read().edge_weight(index).is_none() {
            return Err(StoreError::not_found(element));
        }
        Ok(index)
    }
}

fn parse_index(id: &str, prefix: char) -> Option<usize> {
    id.strip_prefix(prefix)?.parse().ok()
}

fn vertex_id(index: NodeIndex) -> ElementRef {
    ElementRef::vertex(format!("v{}", index.index()))
}

fn edge_id(index: EdgeIndex) -> ElementRef {
    ElementRef::edge(format!("e{}", index.index()))
}

impl GraphAdapter for MemGraph {
    fn create_vertex(&self, label: &str) -> Result<ElementRef, StoreError> {
        self.begin_if_needed();
        let index = self.state.write().add_node(VertexRecord {
            label: label.to_string(),
            properties: BTreeMap::new(),
        });
        trace!(label, id = index.index(), "created vertex");
        Ok(vertex_id(index))
    }

    fn create_edge(
        &self,
        out_vertex: &ElementRef,
        in_vertex: &ElementRef,
        label: &str,
    ) -> Result<ElementRef, StoreError> {
        let source = self.vertex_index(out_vertex)?;
        let target = self.vertex_index(in_vertex)?;
        self.begin_if_needed();
        let index = self.state.write().add_edge(
            source,
            target,
            EdgeRecord {
                label: label.to_string(),
                properties: BTreeMap::new(),
            },
        );
        trace!(label, id = index.index(), "created edge");
        Ok(edge_id(index))
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
        let Some(index) = parse_index(id, 'v') else {
            return Ok(None);
        };
        let index = NodeIndex::new(index);
        Ok(self
            .state
            .read()
            .node_weight(index)
            .map(|_| vertex_id(index)))
    }

    fn edge_by_id(&self, id: &str) -> Result<Option<ElementRef>, StoreError> {
        let Some(index) = parse_index(id, 'e') else {
            return Ok(None);
        };
        let index = EdgeIndex::new(index);
        Ok(self.state.read().edge_weight(index).map(|_| edge_id(index)))
    }

    fn is_valid_id(&self, id: &str) -> bool {
        parse_index(id, 'v').is_some() || parse_index(id, 'e').is_some()
    }

    fn label(&self, element: &ElementRef) -> Result<String, StoreError> {
        match element.kind {
            ElementKind::Vertex => {
                let index = self.vertex_index(element)?;
                Ok(self.state.read()[index].label.clone())
            }
            ElementKind::Edge => {
                let index = self.edge_index(element)?;
                Ok(self.state.read()[index].label.clone())
            }
        }
    }

    fn property(
        &self,
        element: &ElementRef,
        key: &str,
    ) -> Result<Option<PropertyValue>, StoreError> {
        match element.kind {
            ElementKind::Vertex => {
                let index = self.vertex_index(element)?;
                Ok(self.state.read()[index].properties.get(key).cloned())
            }
            ElementKind::Edge => {
                let index = self.edge_index(element)?;
                Ok(self.state.read()[index].properties.get(key).cloned())
            }
        }
    }

    fn set_property(
        &self,
        element: &ElementRef,
        key: &str,
        value: PropertyValue,
    ) -> Result<(), StoreError> {
        match element.kind {
            ElementKind::Vertex => {
                let index = self.vertex_index(element)?;
                self.begin_if_needed();
                self.state.write()[index]
                    .properties
                    .insert(key.to_string(), value);
            }
            ElementKind::Edge => {
                let index = self.edge_index(element)?;
                self.begin_if_needed();
                self.state.write()[index]
                    .properties
                    .insert(key.to_string(), value);
            }
        }
        Ok(())
    }

    fn remove(&self, element: &ElementRef) -> Result<(), StoreError> {
        match element.kind {
            ElementKind::Vertex => {
                let index = self.vertex_index(element)?;
                self.begin_if_needed();
                // incident edges go with the vertex
                self.state.write().remove_node(index);
            }
            ElementKind::Edge => {
                let index = self.edge_index(element)?;
                self.begin_if_needed();
                self.state.write().remove_edge(index);
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
        let index = self.vertex_index(vertex)?;
        let petgraph_direction = match direction {
            Direction::Out => petgraph::Direction::Outgoing,
            Direction::In => petgraph::Direction::Incoming,
        };
        let graph = self.state.read();
        Ok(graph
            .edges_directed(index, petgraph_direction)
            .filter(|edge| edge.weight().label == label)
            .map(|edge| edge_id(edge.id()))
            .collect())
    }

    fn edge_endpoint(
        &self,
        edge: &ElementRef,
        direction: Direction,
    ) -> Result<ElementRef, StoreError> {
        let index = self.edge_index(edge)?;
        let graph = self.state.read();
        let (source, target) = graph
            .edge_endpoints(index)
            .ok_or_else(|| StoreError::not_found(edge))?;
        Ok(match direction {
            Direction::Out => vertex_id(source),
            Direction::In => vertex_id(target),
        })
    }

    fn element_id(&self, element: &ElementRef) -> Result<String, StoreError> {
        // ids are final at creation time in this backend
        match element.kind {
            ElementKind::Vertex => self.vertex_index(element).map(|_| element.id.clone()),
            ElementKind::Edge => self.edge_index(element).map(|_| element.id.clone()),
        }
    }

    fn commit(&self) -> Result<(), StoreError> {
        self.snapshot.lock().take();
        Ok(())
    }

    fn rollback(&self) -> Result<(), StoreError> {
        if let Some(snapshot) = self.snapshot.lock().take() {
            *self.state.write() = snapshot;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_lifecycle() {
        let graph = MemGraph::new();
        let v = graph.create_vertex("person").unwrap();
        assert_eq!(graph.label(&v).unwrap(), "person");
        assert_eq!(graph.vertex_by_id(&v.id).unwrap(), Some(v.clone()));

        graph
            .set_property(&v, "name", PropertyValue::from("Graham"))
            .unwrap();
        assert_eq!(
            graph.property(&v, "name").unwrap(),
            Some(PropertyValue::from("Graham"))
        );

        graph.remove(&v).unwrap();
        assert_eq!(graph.vertex_by_id(&v.id).unwrap(), None);
    }

    #[test]
    fn test_edge_traversal() {
        let graph = MemGraph::new();
        let a = graph.create_vertex("person").unwrap();
        let b = graph.create_vertex("address").unwrap();
        let e = graph.create_edge(&a, &b, "lives_at").unwrap();

        assert_eq!(
            graph.adjacent_edges(&a, Direction::Out, "lives_at").unwrap(),
            vec![e.clone()]
        );
        assert!(graph
            .adjacent_edges(&a, Direction::Out, "other")
            .unwrap()
            .is_empty());
        assert_eq!(
            graph.adjacent_edges(&b, Direction::In, "lives_at").unwrap(),
            vec![e.clone()]
        );
        assert_eq!(graph.edge_endpoint(&e, Direction::Out).unwrap(), a);
        assert_eq!(graph.edge_endpoint(&e, Direction::In).unwrap(), b);
    }

    #[test]
    fn test_removing_vertex_removes_incident_edges() {
        let graph = MemGraph::new();
        let a = graph.create_vertex("person").unwrap();
        let b = graph.create_vertex("address").unwrap();
        graph.create_edge(&a, &b, "lives_at").unwrap();

        graph.remove(&b).unwrap();
        assert_eq!(graph.edge_count(), 0);
        assert!(graph
            .adjacent_edges(&a, Direction::Out, "lives_at")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_rollback_restores_pre_transaction_state() {
        let graph = MemGraph::new();
        let v = graph.create_vertex("person").unwrap();
        graph.commit().unwrap();

        graph.create_vertex("person").unwrap();
        graph
            .set_property(&v, "name", PropertyValue::from("temp"))
            .unwrap();
        graph.rollback().unwrap();

        assert_eq!(graph.vertex_count(), 1);
        assert_eq!(graph.property(&v, "name").unwrap(), None);
    }

    #[test]
    fn test_find_or_create_vertex() {
        let graph = MemGraph::new();
        let v = graph.create_vertex("person").unwrap();
        let found = graph.find_or_create_vertex(Some(&v.id), "person").unwrap();
        assert_eq!(found, v);

        let fresh = graph.find_or_create_vertex(None, "person").unwrap();
        assert_ne!(fresh, v);
        assert_eq!(graph.vertex_count(), 2);

        // unknown id falls through to creation
        let unknown = graph
            .find_or_create_vertex(Some("v999"), "person")
            .unwrap();
        assert_eq!(graph.vertex_count(), 3);
        assert_ne!(unknown, v);
    }

    #[test]
    fn test_is_valid_id() {
        let graph = MemGraph::new();
        assert!(graph.is_valid_id("v0"));
        assert!(graph.is_valid_id("e12"));
        assert!(!graph.is_valid_id("x1"));
        assert!(!graph.is_valid_id("vertex"));
        assert!(!graph.is_valid_id(""));
    }
}
