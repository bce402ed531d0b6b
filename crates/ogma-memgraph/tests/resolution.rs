//! Label-resolution edge cases.
//!
//! An unknown element label falls back to the schema that performed the
//! lookup (tolerating out-of-band data); a label that resolves to an
//! abstract schema is a configuration error.

use std::sync::Arc;

use ogma_core::adapter::GraphAdapter;
use ogma_core::entity::Ref;
use ogma_core::error::{MappingError, SchemaError};
use ogma_core::repository::Repository;
use ogma_core::schema::{SchemaBuilder, SchemaRegistry};
use ogma_core::value::PropertyValue;
use ogma_memgraph::MemGraph;

#[derive(Debug, Default)]
struct Animal {
    id: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Default)]
struct Dog {
    base: Animal,
    breed: Option<String>,
}

fn registry(abstract_base: bool) -> SchemaRegistry {
    let registry = SchemaRegistry::new();
    let mut base = SchemaBuilder::<Animal>::vertex("animal")
        .id(|a: &Animal| a.id.clone(), |a, id| a.id = id)
        .property("name", |a: &Animal| a.name.clone(), |a, v| a.name = Some(v));
    if abstract_base {
        base = base.abstract_schema();
    }
    let animal = registry
        .register(base.build().expect("animal schema"))
        .expect("register animal");
    registry
        .register(
            SchemaBuilder::<Dog>::vertex("dog")
                .extends_via(&animal, |d: &Dog| &d.base, |d: &mut Dog| &mut d.base)
                .property("breed", |d: &Dog| d.breed.clone(), |d, v| d.breed = Some(v))
                .build()
                .expect("dog schema"),
        )
        .expect("register dog");
    registry.freeze().expect("freeze");
    registry
}

#[test]
fn test_unknown_label_falls_back_to_lookup_schema() {
    let registry = registry(false);
    let graph = Arc::new(MemGraph::new());
    let animals = Repository::<Animal>::new(&registry, graph.clone()).expect("repo");

    // an element written out-of-band, with a label no schema claims
    let vertex = graph.create_vertex("animal_v2").expect("vertex");
    graph
        .set_property(&vertex, "name", PropertyValue::from("Rex"))
        .expect("property");
    graph.commit().expect("commit");

    // treated as exactly the lookup schema's type, not an error
    let loaded = animals
        .find_by_id(&vertex.id)
        .expect("find")
        .expect("present");
    assert_eq!(loaded.read().unwrap().name.as_deref(), Some("Rex"));
}

#[test]
fn test_abstract_schema_cannot_materialize() {
    let registry = registry(true);
    let graph = Arc::new(MemGraph::new());
    let animals = Repository::<Animal>::new(&registry, graph.clone()).expect("repo");

    let vertex = graph.create_vertex("animal").expect("vertex");
    graph.commit().expect("commit");

    let err = animals.find_by_id(&vertex.id).expect_err("abstract");
    assert!(matches!(
        err,
        MappingError::Schema(SchemaError::AbstractSchema { .. })
    ));
}

#[test]
fn test_abstract_base_still_resolves_concrete_children() {
    let registry = registry(true);
    let graph = Arc::new(MemGraph::new());
    let animals = Repository::<Animal>::new(&registry, graph).expect("repo");

    let rex = Ref::new(Dog {
        base: Animal {
            name: Some("Rex".to_string()),
            ..Animal::default()
        },
        breed: Some("kelpie".to_string()),
    });
    animals.save_dyn(&rex.erased()).expect("save");
    let id = rex.read().unwrap().base.id.clone().expect("id");

    let loaded = animals
        .find_by_id_dyn(&id)
        .expect("find")
        .expect("present")
        .downcast::<Dog>()
        .expect("dog");
    assert_eq!(loaded.read().unwrap().breed.as_deref(), Some("kelpie"));
    assert_eq!(loaded.read().unwrap().base.name.as_deref(), Some("Rex"));
}
