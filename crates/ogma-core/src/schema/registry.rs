//! Schema registry.
//!
//! Owns every [`Schema`] in the process. Registration happens at startup;
//! [`freeze`](SchemaRegistry::freeze) then resolves all relational links,
//! validates the configuration, and makes the registry immutable before
//! any save/load traffic begins. Missing configuration fails here, fast,
//! not at request time.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::element::ElementKind;
use crate::error::SchemaError;
use crate::schema::Schema;

/// Collaborator seam for schema generators.
///
/// An implementation derives `Schema` values from some external
/// description (derive-macro output, a declarative file, another
/// framework's annotations) for bulk registration.
pub trait SchemaSource {
    fn schemas(&self) -> Result<Vec<Schema>, SchemaError>;
}

/// Process-wide schema registry.
///
/// Read-mostly after startup: all mutation happens through
/// [`register`](SchemaRegistry::register) before
/// [`freeze`](SchemaRegistry::freeze); lookups after that take read locks
/// only.
#[derive(Default)]
pub struct SchemaRegistry {
    by_class: RwLock<HashMap<TypeId, Arc<Schema>>>,
    by_label: RwLock<HashMap<String, Arc<Schema>>>,
    /// (schema, own-property index) pairs whose links still need binding
    unresolved: Mutex<Vec<(Arc<Schema>, usize)>>,
    frozen: AtomicBool,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema under its type and label keys.
    ///
    /// Wires the schema into its super-schema's child indices and binds
    /// any relational links resolvable so far (links to types registered
    /// later are bound when those arrive, or rejected at freeze).
    pub fn register(&self, schema: Schema) -> Result<Arc<Schema>, SchemaError> {
        if self.is_frozen() {
            return Err(SchemaError::RegistryFrozen);
        }
        {
            let by_class = self.by_class.read();
            if by_class.contains_key(&schema.type_id) {
                return Err(SchemaError::DuplicateSchema {
                    type_name: schema.type_name,
                });
            }
        }
        {
            let by_label = self.by_label.read();
            if by_label.contains_key(&schema.label) {
                return Err(SchemaError::DuplicateLabel {
                    label: schema.label.clone(),
                });
            }
        }

        let schema = Arc::new(schema);
        if let Some(parent) = schema.super_schema() {
            parent.add_child(&schema);
        }
        self.by_class
            .write()
            .insert(schema.type_id, schema.clone());
        self.by_label
            .write()
            .insert(schema.label.clone(), schema.clone());
        debug!(label = %schema.label(), type_name = schema.type_name(), "registered schema");

        {
            let mut unresolved = self.unresolved.lock();
            for index in schema.unbound_links() {
                unresolved.push((schema.clone(), index));
            }
        }
        self.bind_pending();
        Ok(schema)
    }

    /// Register every schema produced by a [`SchemaSource`].
    pub fn register_source(
        &self,
        source: &dyn SchemaSource,
    ) -> Result<Vec<Arc<Schema>>, SchemaError> {
        source
            .schemas()?
            .into_iter()
            .map(|schema| self.register(schema))
            .collect()
    }

    /// Resolve remaining links, validate the configuration, and make the
    /// registry immutable.
    pub fn freeze(&self) -> Result<(), SchemaError> {
        self.bind_pending();
        {
            let unresolved = self.unresolved.lock();
            if let Some((schema, index)) = unresolved.first() {
                let target = schema.properties()[*index]
                    .link()
                    .map(|l| l.target_name())
                    .unwrap_or("?");
                return Err(SchemaError::UnresolvedLink {
                    from: schema.label().to_string(),
                    to: target,
                });
            }
        }

        // adjacent properties must land on vertex schemas
        let by_class = self.by_class.read();
        for schema in by_class.values() {
            for prop in schema.properties() {
                if !prop.is_adjacent() {
                    continue;
                }
                let Some(link) = prop.link() else { continue };
                let related = link.schema()?;
                if related.kind() != ElementKind::Vertex {
                    return Err(SchemaError::KindMismatch {
                        label: related.label().to_string(),
                        expected: ElementKind::Vertex,
                        actual: related.kind(),
                    });
                }
            }
        }
        drop(by_class);

        self.frozen.store(true, Ordering::Release);
        debug!("schema registry frozen");
        Ok(())
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    /// Look up the schema registered for `T`, if any.
    pub fn get<T: 'static>(&self) -> Option<Arc<Schema>> {
        self.by_class.read().get(&TypeId::of::<T>()).cloned()
    }

    /// The schema registered for `T`, required.
    ///
    /// Fails when the registry is not frozen yet (traffic before startup
    /// completed) or when no schema exists: both configuration errors.
    pub fn schema_of<T: 'static>(&self) -> Result<Arc<Schema>, SchemaError> {
        if !self.is_frozen() {
            return Err(SchemaError::RegistryNotFrozen);
        }
        self.get::<T>().ok_or(SchemaError::MissingSchema {
            type_name: std::any::type_name::<T>(),
        })
    }

    /// Look up a schema by graph label.
    pub fn by_label(&self, label: &str) -> Option<Arc<Schema>> {
        self.by_label.read().get(label).cloned()
    }

    /// Number of registered schemas.
    pub fn len(&self) -> usize {
        self.by_class.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_class.read().is_empty()
    }

    /// Bind every pending link whose target type is now registered.
    fn bind_pending(&self) {
        let by_class = self.by_class.read();
        let mut unresolved = self.unresolved.lock();
        unresolved.retain(|(schema, index)| {
            let link = match schema.properties()[*index].link() {
                Some(link) => link,
                None => return false,
            };
            match by_class.get(&link.target()) {
                Some(target) => {
                    link.bind(target);
                    false
                }
                None => true,
            }
        });
    }
}
