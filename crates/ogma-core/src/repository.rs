//! Repository façade.
//!
//! Object-in/object-out CRUD over one mapped type and a storage adapter.
//! Ids crossing this boundary are always caller-visible (post-encoding)
//! strings. Whole-graph enumeration (`find_all`, `count`, sorted or paged
//! scans) is deliberately unsupported: a graph has no implicit total
//! ordering, and a partial answer would be worse than an explicit error.

use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::debug;

use crate::adapter::GraphAdapter;
use crate::element::{ElementKind, ElementRef};
use crate::entity::{AnyRef, Ref};
use crate::error::{MappingError, SchemaError};
use crate::schema::mapping::{PostCommitHooks, SaveContext};
use crate::schema::{Schema, SchemaRegistry};

/// Sort specification. Accepted only to be rejected: graphs carry no
/// implicit ordering to sort a whole-type scan by.
#[derive(Debug, Clone, Default)]
pub struct Sort {
    pub orders: Vec<SortOrder>,
}

#[derive(Debug, Clone)]
pub struct SortOrder {
    pub property: String,
    pub descending: bool,
}

/// Page specification, likewise unsupported for whole-graph scans.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    pub offset: u64,
    pub limit: u64,
}

/// What a deferred save produced: the root element plus the post-commit
/// hooks the caller must run after its own transaction commits.
#[derive(Debug)]
pub struct SaveOutcome {
    pub element: ElementRef,
    pub hooks: PostCommitHooks,
}

/// Repository over one mapped type `T`.
///
/// Resolves the most-specific schema before every operation: saves honor
/// the entity's concrete runtime type, loads honor the stored element
/// label.
pub struct Repository<T> {
    schema: Arc<Schema>,
    adapter: Arc<dyn GraphAdapter>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> Repository<T> {
    /// Build a repository for `T` against a frozen registry.
    pub fn new(
        registry: &SchemaRegistry,
        adapter: Arc<dyn GraphAdapter>,
    ) -> Result<Self, SchemaError> {
        let schema = registry.schema_of::<T>()?;
        Ok(Self {
            schema,
            adapter,
            _marker: PhantomData,
        })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn adapter(&self) -> &Arc<dyn GraphAdapter> {
        &self.adapter
    }

    /// Save the entity (create or update per its identifier), commit, and
    /// run the deferred id write-backs.
    pub fn save(&self, entity: &Ref<T>) -> Result<(), MappingError> {
        self.save_excluding(entity, &[])
    }

    /// Save with a skip-cascade list: the given entities seed the visited
    /// set and are never re-saved transitively (they may still be linked
    /// to by id).
    pub fn save_excluding(&self, entity: &Ref<T>, skip: &[AnyRef]) -> Result<(), MappingError> {
        match self.save_deferred_erased(&entity.erased(), skip)? {
            Some(outcome) => {
                self.adapter.commit()?;
                outcome.hooks.run()
            }
            None => Ok(()),
        }
    }

    /// Save every entity, commit once, then run all deferred write-backs.
    pub fn save_all<'a>(
        &self,
        entities: impl IntoIterator<Item = &'a Ref<T>>,
    ) -> Result<(), MappingError> {
        let mut all_hooks = Vec::new();
        for entity in entities {
            if let Some(outcome) = self.save_deferred_erased(&entity.erased(), &[])? {
                all_hooks.push(outcome.hooks);
            }
        }
        self.adapter.commit()?;
        for hooks in all_hooks {
            hooks.run()?;
        }
        Ok(())
    }

    /// Save without committing. Returns `None` when the entity is a loaded
    /// placeholder that was never initialized: nothing was mutated, so
    /// there is nothing to write back.
    pub fn save_deferred(&self, entity: &Ref<T>) -> Result<Option<SaveOutcome>, MappingError> {
        self.save_deferred_erased(&entity.erased(), &[])
    }

    /// Type-erased save, for entities whose concrete type is a registered
    /// subtype of `T`.
    pub fn save_dyn(&self, entity: &AnyRef) -> Result<(), MappingError> {
        match self.save_deferred_erased(entity, &[])? {
            Some(outcome) => {
                self.adapter.commit()?;
                outcome.hooks.run()
            }
            None => Ok(()),
        }
    }

    fn save_deferred_erased(
        &self,
        entity: &AnyRef,
        skip: &[AnyRef],
    ) -> Result<Option<SaveOutcome>, MappingError> {
        let schema = self.schema.most_specific_for_class(entity.type_id());

        // an untouched placeholder has nothing to write back
        if entity.is_placeholder() && !entity.is_initialized() {
            debug!(schema = %schema.label(), "skipping save of uninitialized placeholder");
            return Ok(None);
        }

        let mut ctx = SaveContext::new(self.adapter.clone());
        for excluded in skip {
            ctx.skip(excluded);
        }
        let element = schema.create_or_update(&mut ctx, entity)?;
        Ok(Some(SaveOutcome {
            element,
            hooks: ctx.into_hooks(),
        }))
    }

    /// Fetch by caller-visible id, exact-typed.
    ///
    /// When the stored element resolves to a registered subtype of `T`,
    /// this is a [`MappingError::TypeMismatch`]; use
    /// [`find_by_id_dyn`](Repository::find_by_id_dyn) for polymorphic
    /// lookups.
    pub fn find_by_id(&self, id: &str) -> Result<Option<Ref<T>>, MappingError> {
        match self.find_by_id_dyn(id)? {
            None => Ok(None),
            Some(any) => any
                .downcast::<T>()
                .map(Some)
                .map_err(|any| MappingError::TypeMismatch {
                    expected: std::any::type_name::<T>(),
                    actual: any.type_name(),
                }),
        }
    }

    /// Fetch by caller-visible id, polymorphic: the handle wraps whatever
    /// most-specific type the element's label resolves to.
    pub fn find_by_id_dyn(&self, id: &str) -> Result<Option<AnyRef>, MappingError> {
        let raw = self.schema.decode_id(id)?;
        let element = match self.schema.kind() {
            ElementKind::Vertex => self.adapter.vertex_by_id(&raw)?,
            ElementKind::Edge => self.adapter.edge_by_id(&raw)?,
        };
        match element {
            Some(element) => self.schema.load_from_graph(&self.adapter, &element).map(Some),
            None => Ok(None),
        }
    }

    /// Whether `find_by_id` would succeed. Defined in terms of the lookup,
    /// not a separate count query.
    pub fn exists_by_id(&self, id: &str) -> Result<bool, MappingError> {
        Ok(self.find_by_id_dyn(id)?.is_some())
    }

    /// Fetch many ids; the result set dedups by load identity.
    pub fn find_all_by_id<I>(&self, ids: I) -> Result<HashSet<Ref<T>>, MappingError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut found = HashSet::new();
        for id in ids {
            if let Some(entity) = self.find_by_id(id.as_ref())? {
                found.insert(entity);
            }
        }
        Ok(found)
    }

    /// Delete by caller-visible id. Missing elements are a not-found
    /// error, not a silent success.
    pub fn delete_by_id(&self, id: &str) -> Result<(), MappingError> {
        let raw = self.schema.decode_id(id)?;
        let element = match self.schema.kind() {
            ElementKind::Vertex => self.adapter.vertex_by_id(&raw)?,
            ElementKind::Edge => self.adapter.edge_by_id(&raw)?,
        }
        .ok_or_else(|| MappingError::not_found(self.schema.kind(), raw))?;
        self.adapter.remove(&element)?;
        self.adapter.commit()?;
        Ok(())
    }

    /// Delete an entity by its identifier field.
    pub fn delete(&self, entity: &Ref<T>) -> Result<(), MappingError> {
        let erased = entity.erased();
        let schema = self.schema.most_specific_for_class(erased.type_id());
        let raw = schema
            .entity_graph_id(&erased)?
            .ok_or(MappingError::MissingIdentifier)?;
        let element = match schema.kind() {
            ElementKind::Vertex => self.adapter.vertex_by_id(&raw)?,
            ElementKind::Edge => self.adapter.edge_by_id(&raw)?,
        }
        .ok_or_else(|| MappingError::not_found(schema.kind(), raw))?;
        self.adapter.remove(&element)?;
        self.adapter.commit()?;
        Ok(())
    }

    /// Delete every entity in the iterator.
    pub fn delete_all<'a>(
        &self,
        entities: impl IntoIterator<Item = &'a Ref<T>>,
    ) -> Result<(), MappingError> {
        for entity in entities {
            self.delete(entity)?;
        }
        Ok(())
    }

    /// Unsupported: enumerating every element of a label has no sound
    /// meaning here.
    pub fn find_all(&self) -> Result<Vec<Ref<T>>, MappingError> {
        Err(MappingError::Unsupported(
            "finding all vertices of a graph is not implemented",
        ))
    }

    /// Unsupported, as `find_all`.
    pub fn count(&self) -> Result<u64, MappingError> {
        Err(MappingError::Unsupported(
            "counting all vertices of a graph is not implemented",
        ))
    }

    /// Unsupported, as `find_all`.
    pub fn find_all_sorted(&self, _sort: &Sort) -> Result<Vec<Ref<T>>, MappingError> {
        Err(MappingError::Unsupported(
            "sorting all vertices of a graph is not implemented",
        ))
    }

    /// Unsupported, as `find_all`.
    pub fn find_all_paged(&self, _page: &PageRequest) -> Result<Vec<Ref<T>>, MappingError> {
        Err(MappingError::Unsupported(
            "paging over all vertices of a graph is not implemented",
        ))
    }
}

impl<T> std::fmt::Debug for Repository<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("schema", &self.schema)
            .finish()
    }
}
