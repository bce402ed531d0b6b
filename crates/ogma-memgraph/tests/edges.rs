//! Edge-mapped entity tests.
//!
//! `Likes` maps a `likes` edge between two people: saving resolves the
//! endpoint vertices first, then creates the edge and copies properties
//! onto it; loading materializes the edge entity with lazily-loaded
//! endpoints.

mod common;

use std::sync::Arc;

use ogma_core::entity::Ref;
use ogma_core::error::MappingError;
use ogma_core::repository::Repository;
use ogma_memgraph::MemGraph;

use common::{domain, Likes, Person};

#[test]
fn test_edge_entity_saves_between_endpoint_vertices() {
    let d = domain();
    let graph = Arc::new(MemGraph::new());
    let likes = Repository::<Likes>::new(&d.registry, graph.clone()).expect("repo");

    let graham = Ref::new(Person::new("Graham", "Webber"));
    let sandra = Ref::new(Person::new("Sandra", "Ivancic"));
    let link = Ref::new(Likes {
        from: Some(graham.clone()),
        to: Some(sandra.clone()),
        since: Some(2015),
        ..Likes::default()
    });

    likes.save(&link).expect("save");

    assert_eq!(graph.vertices_with_label("person"), 2);
    assert_eq!(graph.edges_with_label("likes"), 1);
    // everyone got an id written back after commit
    assert!(link.read().unwrap().id.is_some());
    assert!(graham.read().unwrap().id.is_some());
    assert!(sandra.read().unwrap().id.is_some());
}

#[test]
fn test_edge_entity_round_trip_with_lazy_endpoints() {
    let d = domain();
    let graph = Arc::new(MemGraph::new());
    let likes = Repository::<Likes>::new(&d.registry, graph).expect("repo");

    let graham = Ref::new(Person::new("Graham", "Webber"));
    let sandra = Ref::new(Person::new("Sandra", "Ivancic"));
    let link = Ref::new(Likes {
        from: Some(graham),
        to: Some(sandra),
        since: Some(2015),
        ..Likes::default()
    });
    likes.save(&link).expect("save");
    let id = link.read().unwrap().id.clone().unwrap();

    let loaded = likes.find_by_id(&id).expect("find").expect("present");
    {
        let l = loaded.read().expect("read");
        assert_eq!(l.since, Some(2015));
    }
    let from = loaded.read().unwrap().from.clone().expect("out endpoint");
    let to = loaded.read().unwrap().to.clone().expect("in endpoint");
    assert!(!from.is_initialized(), "endpoints stay lazy until touched");
    assert_eq!(from.read().unwrap().first_name.as_deref(), Some("Graham"));
    assert_eq!(to.read().unwrap().first_name.as_deref(), Some("Sandra"));
}

#[test]
fn test_edge_entity_without_endpoint_fails() {
    let d = domain();
    let graph = Arc::new(MemGraph::new());
    let likes = Repository::<Likes>::new(&d.registry, graph).expect("repo");

    let dangling = Ref::new(Likes {
        from: Some(Ref::new(Person::new("Graham", "Webber"))),
        to: None,
        since: Some(2015),
        ..Likes::default()
    });
    let err = likes.save(&dangling).expect_err("missing endpoint");
    assert!(matches!(err, MappingError::MissingEndpoint { .. }));
}

#[test]
fn test_cascaded_edge_entities_from_vertex_save() {
    let d = domain();
    let graph = Arc::new(MemGraph::new());
    let people = Repository::<Person>::new(&d.registry, graph.clone()).expect("repo");

    let sandra = Ref::new(Person::new("Sandra", "Ivancic"));
    let graham = Ref::new(Person::new("Graham", "Webber"));
    let link = Ref::new(Likes {
        from: Some(graham.clone()),
        to: Some(sandra.clone()),
        since: Some(2015),
        ..Likes::default()
    });
    graham.write().unwrap().likes.push(link.clone());

    people.save(&graham).expect("save");

    // the cascade created both endpoint vertices and exactly one edge
    assert_eq!(graph.vertices_with_label("person"), 2);
    assert_eq!(graph.edges_with_label("likes"), 1);
    assert!(link.read().unwrap().id.is_some());

    // loading the person walks back over the edge entity
    let id = graham.read().unwrap().id.clone().unwrap();
    let loaded = people.find_by_id(&id).expect("find").expect("present");
    let loaded_likes = loaded.read().unwrap().likes.clone();
    assert_eq!(loaded_likes.len(), 1);
    assert_eq!(loaded_likes[0].read().unwrap().since, Some(2015));
}

#[test]
fn test_edge_delete() {
    let d = domain();
    let graph = Arc::new(MemGraph::new());
    let likes = Repository::<Likes>::new(&d.registry, graph.clone()).expect("repo");

    let link = Ref::new(Likes {
        from: Some(Ref::new(Person::new("Graham", "Webber"))),
        to: Some(Ref::new(Person::new("Sandra", "Ivancic"))),
        since: Some(2015),
        ..Likes::default()
    });
    likes.save(&link).expect("save");
    let id = link.read().unwrap().id.clone().unwrap();

    likes.delete_by_id(&id).expect("delete");
    assert_eq!(graph.edges_with_label("likes"), 0);
    // endpoint vertices survive the edge removal
    assert_eq!(graph.vertices_with_label("person"), 2);
}
