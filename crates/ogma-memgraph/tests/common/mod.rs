//! Common test fixtures for integration tests.
//!
//! A small domain mapped onto a property graph:
//!
//! ```text
//! Person --lives_at--> Address          (one-to-one / many-to-one back)
//! Person --likes--> Person              (edge-mapped entity `Likes`)
//! ExtendedPerson: Person + title        (schema inheritance via embedding)
//! ```

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Once;

use ogma_core::element::Direction;
use ogma_core::entity::Ref;
use ogma_core::schema::{Schema, SchemaBuilder, SchemaRegistry};
use ogma_core::IndexKind;

static TRACING: Once = Once::new();

/// Wire up test logging once; `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

#[derive(Debug, Default)]
pub struct Person {
    pub id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub active: Option<bool>,
    pub address: Option<Ref<Address>>,
    pub likes: Vec<Ref<Likes>>,
}

impl Person {
    pub fn new(first_name: &str, last_name: &str) -> Self {
        Self {
            first_name: Some(first_name.to_string()),
            last_name: Some(last_name.to_string()),
            active: Some(true),
            ..Self::default()
        }
    }
}

#[derive(Debug, Default)]
pub struct Address {
    pub id: Option<String>,
    pub city: Option<String>,
    pub people: Vec<Ref<Person>>,
}

impl Address {
    pub fn new(city: &str) -> Self {
        Self {
            city: Some(city.to_string()),
            ..Self::default()
        }
    }
}

/// Edge-mapped entity: a `likes` edge between two people.
#[derive(Debug, Default)]
pub struct Likes {
    pub id: Option<String>,
    pub from: Option<Ref<Person>>,
    pub to: Option<Ref<Person>>,
    pub since: Option<i64>,
}

/// Subtype of `Person`, embedding the base value.
#[derive(Debug, Default)]
pub struct ExtendedPerson {
    pub base: Person,
    pub title: Option<String>,
}

/// The registered domain schemas.
pub struct Domain {
    pub registry: SchemaRegistry,
    pub person: Arc<Schema>,
    pub address: Arc<Schema>,
    pub likes: Arc<Schema>,
    pub extended_person: Arc<Schema>,
}

/// Register the whole domain and freeze the registry.
pub fn domain() -> Domain {
    let registry = SchemaRegistry::new();

    let person = registry
        .register(
            SchemaBuilder::<Person>::vertex("person")
                .id(|p: &Person| p.id.clone(), |p, id| p.id = id)
                .indexed_property(
                    "first_name",
                    IndexKind::NonUnique,
                    |p: &Person| p.first_name.clone(),
                    |p, v| p.first_name = Some(v),
                )
                .property(
                    "last_name",
                    |p: &Person| p.last_name.clone(),
                    |p, v| p.last_name = Some(v),
                )
                .property("active", |p: &Person| p.active, |p, v| p.active = Some(v))
                .link_one::<Address>(
                    "lives_at",
                    Direction::Out,
                    |p: &Person| p.address.clone(),
                    |p, a| p.address = Some(a),
                )
                .link_many::<Likes>(
                    "likes",
                    Direction::Out,
                    |p: &Person| p.likes.clone(),
                    |p, likes| p.likes = likes,
                )
                .build()
                .expect("person schema"),
        )
        .expect("register person");

    let address = registry
        .register(
            SchemaBuilder::<Address>::vertex("address")
                .id(|a: &Address| a.id.clone(), |a, id| a.id = id)
                .property("city", |a: &Address| a.city.clone(), |a, v| a.city = Some(v))
                .link_many::<Person>(
                    "lives_at",
                    Direction::In,
                    |a: &Address| a.people.clone(),
                    |a, people| a.people = people,
                )
                .build()
                .expect("address schema"),
        )
        .expect("register address");

    let likes = registry
        .register(
            SchemaBuilder::<Likes>::edge("likes")
                .id(|l: &Likes| l.id.clone(), |l, id| l.id = id)
                .adjacent_out::<Person>(|l: &Likes| l.from.clone(), |l, p| l.from = Some(p))
                .adjacent_in::<Person>(|l: &Likes| l.to.clone(), |l, p| l.to = Some(p))
                .property("since", |l: &Likes| l.since, |l, v| l.since = Some(v))
                .build()
                .expect("likes schema"),
        )
        .expect("register likes");

    let extended_person = registry
        .register(
            SchemaBuilder::<ExtendedPerson>::vertex("extended_person")
                .extends_via(
                    &person,
                    |e: &ExtendedPerson| &e.base,
                    |e: &mut ExtendedPerson| &mut e.base,
                )
                .property(
                    "title",
                    |e: &ExtendedPerson| e.title.clone(),
                    |e, v| e.title = Some(v),
                )
                .build()
                .expect("extended person schema"),
        )
        .expect("register extended person");

    registry.freeze().expect("freeze registry");

    Domain {
        registry,
        person,
        address,
        likes,
        extended_person,
    }
}
