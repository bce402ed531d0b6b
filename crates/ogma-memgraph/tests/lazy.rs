//! Lazy-loading behavior tests.
//!
//! A loaded object is a placeholder until first real access: identity
//! operations must work without triggering population, population must
//! happen exactly once even with callers racing on the same placeholder,
//! and relations must resolve against the same visited-set as the load
//! that produced them.

mod common;

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ogma_core::adapter::{GraphAdapter, StoreError};
use ogma_core::element::{Direction, ElementRef};
use ogma_core::entity::Ref;
use ogma_core::repository::Repository;
use ogma_core::value::PropertyValue;
use ogma_memgraph::MemGraph;

use common::{domain, Address, Person};

/// Adapter decorator counting property reads and writes, so tests can
/// observe how often the materializer actually touched the store.
struct CountingAdapter {
    inner: Arc<MemGraph>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl CountingAdapter {
    fn new(inner: Arc<MemGraph>) -> Self {
        Self {
            inner,
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl GraphAdapter for CountingAdapter {
    fn create_vertex(&self, label: &str) -> Result<ElementRef, StoreError> {
        self.inner.create_vertex(label)
    }

    fn create_edge(
        &self,
        out_vertex: &ElementRef,
        in_vertex: &ElementRef,
        label: &str,
    ) -> Result<ElementRef, StoreError> {
        self.inner.create_edge(out_vertex, in_vertex, label)
    }

    fn find_or_create_vertex(
        &self,
        id: Option<&str>,
        label: &str,
    ) -> Result<ElementRef, StoreError> {
        self.inner.find_or_create_vertex(id, label)
    }

    fn vertex_by_id(&self, id: &str) -> Result<Option<ElementRef>, StoreError> {
        self.inner.vertex_by_id(id)
    }

    fn edge_by_id(&self, id: &str) -> Result<Option<ElementRef>, StoreError> {
        self.inner.edge_by_id(id)
    }

    fn is_valid_id(&self, id: &str) -> bool {
        self.inner.is_valid_id(id)
    }

    fn label(&self, element: &ElementRef) -> Result<String, StoreError> {
        self.inner.label(element)
    }

    fn property(
        &self,
        element: &ElementRef,
        key: &str,
    ) -> Result<Option<PropertyValue>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.property(element, key)
    }

    fn set_property(
        &self,
        element: &ElementRef,
        key: &str,
        value: PropertyValue,
    ) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.set_property(element, key, value)
    }

    fn remove(&self, element: &ElementRef) -> Result<(), StoreError> {
        self.inner.remove(element)
    }

    fn adjacent_edges(
        &self,
        vertex: &ElementRef,
        direction: Direction,
        label: &str,
    ) -> Result<Vec<ElementRef>, StoreError> {
        self.inner.adjacent_edges(vertex, direction, label)
    }

    fn edge_endpoint(
        &self,
        edge: &ElementRef,
        direction: Direction,
    ) -> Result<ElementRef, StoreError> {
        self.inner.edge_endpoint(edge, direction)
    }

    fn element_id(&self, element: &ElementRef) -> Result<String, StoreError> {
        self.inner.element_id(element)
    }

    fn commit(&self) -> Result<(), StoreError> {
        self.inner.commit()
    }

    fn rollback(&self) -> Result<(), StoreError> {
        self.inner.rollback()
    }
}

fn saved_person(
    adapter: Arc<CountingAdapter>,
    registry: &ogma_core::schema::SchemaRegistry,
) -> (Repository<Person>, String) {
    let people = Repository::<Person>::new(registry, adapter).expect("repo");
    let mut graham = Person::new("Graham", "Webber");
    graham.address = Some(Ref::new(Address::new("Sydney")));
    let graham = Ref::new(graham);
    people.save(&graham).expect("save");
    let id = graham.read().unwrap().id.clone().unwrap();
    (people, id)
}

#[test]
fn test_identity_operations_do_not_initialize() {
    let d = domain();
    let adapter = Arc::new(CountingAdapter::new(Arc::new(MemGraph::new())));
    let (people, id) = saved_person(adapter.clone(), &d.registry);

    let reads_before = adapter.reads();
    let loaded = people.find_by_id(&id).expect("find").expect("present");

    // graph id, equality and hashing work on the untouched placeholder
    assert_eq!(loaded.graph_id().as_deref(), Some(id.as_str()));
    let mut set = HashSet::new();
    set.insert(loaded.clone());
    set.insert(loaded.clone());
    assert_eq!(set.len(), 1);

    assert!(!loaded.is_initialized());
    assert_eq!(adapter.reads(), reads_before, "no property reads yet");

    // first field access flips it
    assert_eq!(loaded.read().unwrap().first_name.as_deref(), Some("Graham"));
    assert!(loaded.is_initialized());
    assert!(adapter.reads() > reads_before);
}

#[test]
fn test_two_loads_of_same_id_compare_equal() {
    let d = domain();
    let adapter = Arc::new(CountingAdapter::new(Arc::new(MemGraph::new())));
    let (people, id) = saved_person(adapter, &d.registry);

    let a = people.find_by_id(&id).unwrap().unwrap();
    let b = people.find_by_id(&id).unwrap().unwrap();
    assert_eq!(a, b, "same element id, equal placeholders");

    let mut set = HashSet::new();
    set.insert(a);
    set.insert(b);
    assert_eq!(set.len(), 1);
}

#[test]
fn test_concurrent_first_access_initializes_once() {
    let d = domain();
    let adapter = Arc::new(CountingAdapter::new(Arc::new(MemGraph::new())));
    let (people, id) = saved_person(adapter.clone(), &d.registry);

    let loaded = people.find_by_id(&id).expect("find").expect("present");
    let reads_before = adapter.reads();

    std::thread::scope(|scope| {
        for _ in 0..8 {
            let handle = loaded.clone();
            scope.spawn(move || {
                let person = handle.read().expect("read");
                assert_eq!(person.first_name.as_deref(), Some("Graham"));
            });
        }
    });

    // one population pass: scalar reads happened once, not once per thread
    let scalar_reads = adapter.reads() - reads_before;
    assert!(
        scalar_reads <= 4,
        "expected a single population pass, saw {scalar_reads} reads"
    );
    assert!(loaded.is_initialized());
}

#[test]
fn test_force_init_is_idempotent() {
    let d = domain();
    let adapter = Arc::new(CountingAdapter::new(Arc::new(MemGraph::new())));
    let (people, id) = saved_person(adapter.clone(), &d.registry);

    let loaded = people.find_by_id(&id).unwrap().unwrap();
    loaded.force_init().expect("first init");
    let reads_after_first = adapter.reads();
    loaded.force_init().expect("second init");
    assert_eq!(adapter.reads(), reads_after_first);
}

#[test]
fn test_relation_resolves_back_to_same_placeholder() {
    let d = domain();
    let graph = Arc::new(MemGraph::new());
    let people = Repository::<Person>::new(&d.registry, graph.clone()).expect("repo");

    // cyclic: graham lives at an address that lists him back
    let address = Ref::new(Address::new("Sydney"));
    let mut graham = Person::new("Graham", "Webber");
    graham.address = Some(address.clone());
    let graham = Ref::new(graham);
    address.write().unwrap().people.push(graham.clone());
    people.save(&graham).expect("save");
    let id = graham.read().unwrap().id.clone().unwrap();

    let loaded = people.find_by_id(&id).expect("find").expect("present");
    let loaded_address = loaded.read().unwrap().address.clone().expect("address");
    let back_references = loaded_address.read().unwrap().people.clone();

    // the cycle resolved to the very same placeholder, not a new load
    assert_eq!(back_references.len(), 1);
    assert_eq!(back_references[0], loaded);
}

#[test]
fn test_saving_untouched_placeholder_writes_nothing() {
    let d = domain();
    let adapter = Arc::new(CountingAdapter::new(Arc::new(MemGraph::new())));
    let (people, id) = saved_person(adapter.clone(), &d.registry);

    let loaded = people.find_by_id(&id).expect("find").expect("present");
    let writes_before = adapter.writes();
    people.save(&loaded).expect("save is a no-op");
    assert_eq!(adapter.writes(), writes_before);
    assert!(!loaded.is_initialized());
}

#[test]
fn test_saving_modified_placeholder_writes_back() {
    let d = domain();
    let adapter = Arc::new(CountingAdapter::new(Arc::new(MemGraph::new())));
    let (people, id) = saved_person(adapter.clone(), &d.registry);

    let loaded = people.find_by_id(&id).expect("find").expect("present");
    loaded.write().expect("write").first_name = Some("Graeme".to_string());
    people.save(&loaded).expect("save");

    let reloaded = people.find_by_id(&id).unwrap().unwrap();
    assert_eq!(reloaded.read().unwrap().first_name.as_deref(), Some("Graeme"));
}
