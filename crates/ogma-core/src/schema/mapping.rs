//! Cascading materialization.
//!
//! The save direction walks a schema's full property stream against a live
//! object and copies fields and relations into graph elements; the load
//! direction builds lazy placeholders from elements and populates them on
//! first access. Both directions carry a visited-set scoped to the one
//! call tree: it breaks cycles and guarantees at-most-one element per
//! object (and one object per element) within a single cascade.
//!
//! Ancestor properties are applied through the schema chain's upcast
//! projections, so a subtype instance serves its inherited fields from the
//! embedded base value.
//!
//! Per-property failures are recovered locally (logged and skipped), so
//! an object returned from save or load is internally consistent even when
//! an individual relation failed to materialize.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::adapter::GraphAdapter;
use crate::element::{Direction, ElementKind, ElementRef};
use crate::entity::{AnyRef, LoadOrigin, LoadTracker};
use crate::error::{MappingError, SchemaError};
use crate::schema::property::{
    AccessError, LinkGetter, LinkSetter, Property, PropertyKind, ValueGetter, ValueSetter,
};
use crate::schema::Schema;
use crate::value::PropertyValue;

/// Deferred action run after the surrounding transaction commits.
///
/// Used for id write-back: some backends only assign final element ids at
/// commit time, so the object's identifier field is set from the element
/// afterwards. Hooks must not depend on the transaction they follow.
pub type PostCommitHook = Box<dyn FnOnce() -> Result<(), MappingError> + Send>;

/// The post-commit hook list collected by one save.
///
/// [`Repository::save`](crate::repository::Repository::save) runs these
/// itself after committing; callers owning the transaction boundary get
/// them through `save_deferred` and invoke [`run`](PostCommitHooks::run)
/// after their own successful commit.
pub struct PostCommitHooks(Vec<PostCommitHook>);

impl PostCommitHooks {
    pub fn run(self) -> Result<(), MappingError> {
        for hook in self.0 {
            hook()?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for PostCommitHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PostCommitHooks").field(&self.0.len()).finish()
    }
}

/// Visited-set entry for one entity in a save cascade.
enum Visit {
    /// Cascaded onto this element (or cascading right now: the guard
    /// fires either way)
    Done(ElementRef),
    /// Element resolved (e.g. as an edge endpoint) but fields not yet
    /// cascaded
    Resolved(ElementRef),
    /// Skip-seeded by the caller: excluded from the cascade, may still be
    /// linked to by id
    Skip,
}

/// State for one save call tree.
pub(crate) struct SaveContext {
    pub(crate) adapter: Arc<dyn GraphAdapter>,
    visited: HashMap<usize, Visit>,
    pub(crate) hooks: Vec<PostCommitHook>,
}

impl SaveContext {
    pub(crate) fn new(adapter: Arc<dyn GraphAdapter>) -> Self {
        Self {
            adapter,
            visited: HashMap::new(),
            hooks: Vec::new(),
        }
    }

    /// Seed an entity into the visited set without an element, excluding
    /// it from the cascade.
    pub(crate) fn skip(&mut self, entity: &AnyRef) {
        self.visited.insert(entity.identity(), Visit::Skip);
    }

    pub(crate) fn into_hooks(self) -> PostCommitHooks {
        PostCommitHooks(self.hooks)
    }
}

impl Schema {
    /// Save an entity per the entity-creation policy: an empty or invalid
    /// identifier creates a new element, a present identifier updates the
    /// existing one. An id that resolves to nothing is a not-found
    /// error, never a silent create.
    ///
    /// `self` must already be the most-specific schema for the entity's
    /// runtime type.
    pub(crate) fn create_or_update(
        self: &Arc<Self>,
        ctx: &mut SaveContext,
        entity: &AnyRef,
    ) -> Result<ElementRef, MappingError> {
        if let Some(Visit::Done(element)) = ctx.visited.get(&entity.identity()) {
            return Ok(element.clone());
        }

        match self.entity_graph_id(entity)? {
            Some(raw) if ctx.adapter.is_valid_id(&raw) => {
                let element = match self.kind {
                    ElementKind::Vertex => ctx.adapter.vertex_by_id(&raw)?,
                    ElementKind::Edge => ctx.adapter.edge_by_id(&raw)?,
                }
                .ok_or_else(|| MappingError::not_found(self.kind, raw.clone()))?;
                self.cascade_copy(ctx, &element, entity)?;
                Ok(element)
            }
            _ => self.create(ctx, entity),
        }
    }

    fn create(
        self: &Arc<Self>,
        ctx: &mut SaveContext,
        entity: &AnyRef,
    ) -> Result<ElementRef, MappingError> {
        let element = match self.kind {
            ElementKind::Vertex => ctx.adapter.create_vertex(&self.label)?,
            ElementKind::Edge => {
                // endpoints first, then the edge between them
                let out_vertex = self.endpoint_vertex(ctx, entity, Direction::Out)?;
                let in_vertex = self.endpoint_vertex(ctx, entity, Direction::In)?;
                ctx.adapter
                    .create_edge(&out_vertex, &in_vertex, &self.label)?
            }
        };
        debug!(schema = %self.label, element = %element, "created element");
        self.cascade_copy(ctx, &element, entity)?;
        Ok(element)
    }

    fn endpoint_vertex(
        self: &Arc<Self>,
        ctx: &mut SaveContext,
        entity: &AnyRef,
        direction: Direction,
    ) -> Result<ElementRef, MappingError> {
        let missing = || MappingError::MissingEndpoint {
            label: self.label.clone(),
            direction,
        };
        let (owner, property) = self.adjacent_with_owner(direction).ok_or_else(missing)?;
        let PropertyKind::Adjacent { link, get, .. } = &property.kind else {
            return Err(missing());
        };
        let target = self
            .read_links(entity, owner, get)?
            .into_iter()
            .next()
            .ok_or_else(missing)?;
        let related = link.schema()?.most_specific_for_class(target.type_id());
        let vertex = self
            .target_vertex(ctx, &related, &target)?
            .ok_or_else(missing)?;
        // remember the resolved element so the adjacent-property cascade
        // reuses it instead of re-creating the endpoint
        ctx.visited
            .entry(target.identity())
            .or_insert_with(|| Visit::Resolved(vertex.clone()));
        Ok(vertex)
    }

    /// Resolve the vertex element for a cascade target: reuse the element
    /// already produced in this cascade, otherwise find-or-create by the
    /// target's own identifier. A skip-seeded target is only linked when
    /// it already has an id; `None` means "leave this relation alone".
    fn target_vertex(
        self: &Arc<Self>,
        ctx: &mut SaveContext,
        related: &Arc<Schema>,
        target: &AnyRef,
    ) -> Result<Option<ElementRef>, MappingError> {
        match ctx.visited.get(&target.identity()) {
            Some(Visit::Done(element)) | Some(Visit::Resolved(element)) => {
                Ok(Some(element.clone()))
            }
            Some(Visit::Skip) => match related.entity_graph_id(target)? {
                Some(raw) => Ok(Some(
                    ctx.adapter
                        .find_or_create_vertex(Some(&raw), related.label())?,
                )),
                None => Ok(None),
            },
            None => {
                let raw = related.entity_graph_id(target)?;
                Ok(Some(ctx.adapter.find_or_create_vertex(
                    raw.as_deref(),
                    related.label(),
                )?))
            }
        }
    }

    /// Copy every property in the full stream onto `element`, cascading
    /// into relations with the shared visited map.
    pub(crate) fn cascade_copy(
        self: &Arc<Self>,
        ctx: &mut SaveContext,
        element: &ElementRef,
        entity: &AnyRef,
    ) -> Result<(), MappingError> {
        let key = entity.identity();
        match ctx.visited.get(&key) {
            Some(Visit::Done(_)) | Some(Visit::Skip) => return Ok(()),
            _ => {}
        }
        ctx.visited.insert(key, Visit::Done(element.clone()));

        // a placeholder reached mid-cascade is fully loaded before its
        // fields are read back
        entity.force_init()?;

        for (owner, property) in self.stream_with_owners() {
            if let Err(err) = self.copy_property(ctx, element, entity, owner, property) {
                warn!(
                    property = property.name(),
                    schema = %self.label,
                    error = %err,
                    "could not save property, skipping"
                );
            }
        }

        if self.entity_graph_id(entity)?.is_none() {
            let adapter = ctx.adapter.clone();
            let element = element.clone();
            let entity = entity.clone();
            let schema = self.clone();
            ctx.hooks.push(Box::new(move || {
                let raw = adapter.element_id(&element)?;
                schema.set_entity_id(&entity, &raw)
            }));
        }
        Ok(())
    }

    fn copy_property(
        self: &Arc<Self>,
        ctx: &mut SaveContext,
        element: &ElementRef,
        entity: &AnyRef,
        owner: &Schema,
        property: &Property,
    ) -> Result<(), MappingError> {
        match &property.kind {
            PropertyKind::Value { get, .. } => {
                if let Some(value) = self.read_value(entity, owner, get)? {
                    trace!(property = property.name(), "copying scalar");
                    ctx.adapter.set_property(element, property.name(), value)?;
                }
            }
            PropertyKind::Related {
                direction,
                cardinality,
                link,
                get,
                ..
            } => {
                let mut targets = self.read_links(entity, owner, get)?;
                if cardinality.is_single() {
                    targets.truncate(1);
                }
                let related_base = link.schema()?;
                for target in targets {
                    let related = related_base.most_specific_for_class(target.type_id());
                    if related.is_edge() {
                        // edge-mapped relation: the related object is the
                        // edge entity itself, endpoints included
                        related.create_or_update(ctx, &target)?;
                    } else if let Some(target_vertex) =
                        self.target_vertex(ctx, &related, &target)?
                    {
                        ensure_link_edge(ctx, element, &target_vertex, *direction, property.name())?;
                        related.cascade_copy(ctx, &target_vertex, &target)?;
                    }
                }
            }
            PropertyKind::Adjacent { link, get, .. } => {
                // the edge between the endpoints already exists; cascade
                // the endpoint object's own fields onto its vertex
                if let Some(target) = self.read_links(entity, owner, get)?.into_iter().next() {
                    let related = link.schema()?.most_specific_for_class(target.type_id());
                    if let Some(target_vertex) = self.target_vertex(ctx, &related, &target)? {
                        related.cascade_copy(ctx, &target_vertex, &target)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Load an element as a lazy placeholder with a fresh visited-set.
    pub(crate) fn load_from_graph(
        self: &Arc<Self>,
        adapter: &Arc<dyn GraphAdapter>,
        element: &ElementRef,
    ) -> Result<AnyRef, MappingError> {
        self.cascade_load(adapter, element, &LoadTracker::default())
    }

    /// Load an element within an ongoing cascade.
    ///
    /// Returns the placeholder already produced for the element when the
    /// tracker has one; otherwise resolves the most-specific schema for
    /// the element's label, constructs a placeholder with only its
    /// identifier set, and registers it in the tracker before returning.
    /// Nothing else is read until first access.
    pub(crate) fn cascade_load(
        self: &Arc<Self>,
        adapter: &Arc<dyn GraphAdapter>,
        element: &ElementRef,
        tracker: &LoadTracker,
    ) -> Result<AnyRef, MappingError> {
        if let Some(existing) = tracker.get(element) {
            return Ok(existing);
        }

        let label = adapter.label(element)?;
        let schema = self.most_specific_for_label(&label);
        if schema.is_abstract {
            return Err(SchemaError::AbstractSchema {
                label: schema.label.clone(),
            }
            .into());
        }

        let mut instance = schema.construct_instance();
        // identifier must be readable before initialization
        let obj: &mut dyn std::any::Any = &mut *instance;
        schema.write_encoded_id(obj, schema.encode_id(&element.id))?;
        let entity = AnyRef::placeholder(
            instance,
            schema.type_id,
            schema.type_name,
            LoadOrigin {
                element: element.clone(),
                schema: schema.clone(),
                adapter: adapter.clone(),
                tracker: tracker.clone(),
            },
        );
        tracker.insert(element, &entity);
        trace!(schema = %schema.label, element = %element, "built lazy placeholder");
        Ok(entity)
    }

    /// Deferred population, called exactly once per placeholder by the
    /// lazy-init machinery. Relations recurse with the originating
    /// tracker; per-property failures leave the field at its default.
    pub(crate) fn populate(
        self: &Arc<Self>,
        entity: &AnyRef,
        origin: &LoadOrigin,
    ) -> Result<(), MappingError> {
        let encoded = self.encode_id(&origin.element.id);
        if let Err(err) = entity.with_value_mut(|obj| self.write_encoded_id(obj, encoded)) {
            warn!(schema = %self.label, error = %err, "could not set identifier field");
        }
        for (owner, property) in self.stream_with_owners() {
            if let Err(err) = self.load_property(entity, origin, owner, property) {
                warn!(
                    property = property.name(),
                    schema = %self.label,
                    error = %err,
                    "could not load property, skipping"
                );
            }
        }
        Ok(())
    }

    fn load_property(
        self: &Arc<Self>,
        entity: &AnyRef,
        origin: &LoadOrigin,
        owner: &Schema,
        property: &Property,
    ) -> Result<(), MappingError> {
        match &property.kind {
            PropertyKind::Value { set, .. } => {
                if let Some(value) = origin.adapter.property(&origin.element, property.name())? {
                    self.write_value(entity, owner, set, value)?;
                }
            }
            PropertyKind::Related {
                direction,
                cardinality,
                link,
                set,
                ..
            } => {
                let related_base = link.schema()?;
                let edges =
                    origin
                        .adapter
                        .adjacent_edges(&origin.element, *direction, property.name())?;
                let mut links = Vec::new();
                for edge in edges {
                    let target = if related_base.is_edge() {
                        related_base.cascade_load(&origin.adapter, &edge, &origin.tracker)?
                    } else {
                        let other = origin.adapter.edge_endpoint(&edge, direction.opposite())?;
                        related_base.cascade_load(&origin.adapter, &other, &origin.tracker)?
                    };
                    links.push(target);
                    if cardinality.is_single() {
                        break;
                    }
                }
                if !links.is_empty() {
                    self.write_links(entity, owner, set, links)?;
                }
            }
            PropertyKind::Adjacent {
                direction,
                link,
                set,
                ..
            } => {
                let other = origin.adapter.edge_endpoint(&origin.element, *direction)?;
                let related = link.schema()?;
                let target = related.cascade_load(&origin.adapter, &other, &origin.tracker)?;
                self.write_links(entity, owner, set, vec![target])?;
            }
        }
        Ok(())
    }

    fn read_value(
        &self,
        entity: &AnyRef,
        owner: &Schema,
        get: &ValueGetter,
    ) -> Result<Option<PropertyValue>, MappingError> {
        Ok(entity.with_value(|obj| match self.project_ref(owner, obj) {
            Some(projected) => get(projected),
            None => Err(AccessError::EntityMismatch {
                expected: owner.type_name(),
            }),
        })?)
    }

    fn read_links(
        &self,
        entity: &AnyRef,
        owner: &Schema,
        get: &LinkGetter,
    ) -> Result<Vec<AnyRef>, MappingError> {
        Ok(entity.with_value(|obj| match self.project_ref(owner, obj) {
            Some(projected) => get(projected),
            None => Err(AccessError::EntityMismatch {
                expected: owner.type_name(),
            }),
        })?)
    }

    fn write_value(
        &self,
        entity: &AnyRef,
        owner: &Schema,
        set: &ValueSetter,
        value: PropertyValue,
    ) -> Result<(), MappingError> {
        Ok(entity.with_value_mut(|obj| match self.project_mut(owner, obj) {
            Some(projected) => set(projected, value),
            None => Err(AccessError::EntityMismatch {
                expected: owner.type_name(),
            }),
        })?)
    }

    fn write_links(
        &self,
        entity: &AnyRef,
        owner: &Schema,
        set: &LinkSetter,
        links: Vec<AnyRef>,
    ) -> Result<(), MappingError> {
        Ok(entity.with_value_mut(|obj| match self.project_mut(owner, obj) {
            Some(projected) => set(projected, links),
            None => Err(AccessError::EntityMismatch {
                expected: owner.type_name(),
            }),
        })?)
    }
}

/// Make sure exactly one `label`-labeled edge runs between `element` and
/// `target` in the property's direction, creating it when absent.
/// Re-saving an unchanged relation is a no-op.
fn ensure_link_edge(
    ctx: &mut SaveContext,
    element: &ElementRef,
    target: &ElementRef,
    direction: Direction,
    label: &str,
) -> Result<(), MappingError> {
    for edge in ctx.adapter.adjacent_edges(element, direction, label)? {
        if ctx.adapter.edge_endpoint(&edge, direction.opposite())? == *target {
            return Ok(());
        }
    }
    match direction {
        Direction::Out => ctx.adapter.create_edge(element, target, label)?,
        Direction::In => ctx.adapter.create_edge(target, element, label)?,
    };
    Ok(())
}
