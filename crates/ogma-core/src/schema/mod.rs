//! Schema model.
//!
//! A [`Schema`] describes how one mapped type corresponds to a vertex or
//! edge label: its ordered property set, identity accessor and codec, its
//! place in an inheritance chain, and the polymorphic child indices used
//! for most-specific resolution.
//!
//! # Architecture
//!
//! ```text
//! SchemaRegistry (owns all schemas, frozen after startup)
//! ├── Schema (per mapped type)
//! │   ├── Property* (own, ordered; ancestors stream first)
//! │   ├── super-schema link + child indices (by label / by type)
//! │   └── id accessor + id codec (delegate up the super chain)
//! ├── mapping: cascading save/load against a GraphAdapter
//! └── SchemaWriter / SchemaSource collaborator seams
//! ```

pub mod build;
pub mod mapping;
pub mod property;
pub mod registry;
pub mod writer;

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::element::{Direction, ElementKind};
use crate::entity::AnyRef;
use crate::error::MappingError;
use crate::ident::{CodecError, IdCodec};
pub use build::SchemaBuilder;
pub use property::{
    AccessError, Cardinality, IdAccessor, IndexKind, Property, PropertyKind, SchemaLink,
};
pub use registry::{SchemaRegistry, SchemaSource};
pub use writer::SchemaWriter;

pub(crate) type Constructor = Arc<dyn Fn() -> Box<dyn Any + Send + Sync> + Send + Sync>;

/// Projection from a subtype instance to its embedded super-type instance.
///
/// Rust has no subtype assignment, so a schema that extends another with
/// inherited *accessors* declares how to reach the embedded base value
/// (`SchemaBuilder::extends_via`). The materializer composes these when it
/// applies an ancestor's properties to a concrete instance.
pub(crate) type UpcastRef = Arc<dyn for<'a> Fn(&'a dyn Any) -> &'a (dyn Any) + Send + Sync>;
pub(crate) type UpcastMut = Arc<dyn for<'a> Fn(&'a mut dyn Any) -> &'a mut (dyn Any) + Send + Sync>;

/// Metadata for one mapped type.
///
/// Built through [`SchemaBuilder`], owned by the [`SchemaRegistry`].
/// Immutable after registration apart from the child indices, which only
/// grow while the registry is still unfrozen.
pub struct Schema {
    pub(crate) type_id: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) kind: ElementKind,
    pub(crate) label: String,
    pub(crate) is_abstract: bool,
    pub(crate) super_schema: Option<Arc<Schema>>,
    pub(crate) upcast_ref: Option<UpcastRef>,
    pub(crate) upcast_mut: Option<UpcastMut>,
    pub(crate) id_accessor: Option<IdAccessor>,
    pub(crate) id_codec: Option<Arc<dyn IdCodec>>,
    pub(crate) construct: Constructor,
    pub(crate) properties: Vec<Property>,
    pub(crate) by_name: HashMap<String, usize>,
    pub(crate) out_property: Option<usize>,
    pub(crate) in_property: Option<usize>,
    pub(crate) children_by_label: RwLock<HashMap<String, Arc<Schema>>>,
    pub(crate) children_by_class: RwLock<HashMap<TypeId, Arc<Schema>>>,
}

impl Schema {
    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// The graph label this type maps to. Immutable after registration.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    pub fn is_vertex(&self) -> bool {
        self.kind == ElementKind::Vertex
    }

    pub fn is_edge(&self) -> bool {
        self.kind == ElementKind::Edge
    }

    pub fn super_schema(&self) -> Option<&Arc<Schema>> {
        self.super_schema.as_ref()
    }

    /// This schema's own properties, in declaration order.
    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    /// Look up a property by name, own set first, then up the super chain
    /// (so a shadowing redeclaration wins).
    pub fn property(&self, name: &str) -> Option<&Property> {
        match self.by_name.get(name) {
            Some(&i) => Some(&self.properties[i]),
            None => self
                .super_schema
                .as_ref()
                .and_then(|s| s.property(name)),
        }
    }

    /// The full property stream: ancestor properties first (root-most
    /// ancestor leading), own properties after. Name collisions are
    /// resolved most-specific-last, which is what makes shadowed writes
    /// land after (and therefore over) the inherited ones.
    pub fn property_stream(&self) -> Vec<&Property> {
        let mut stream = match &self.super_schema {
            Some(sup) => sup.property_stream(),
            None => Vec::new(),
        };
        stream.extend(self.properties.iter());
        stream
    }

    /// The property stream paired with each property's owning schema, so
    /// the materializer can project instances to the right level before
    /// applying an ancestor's accessors.
    pub(crate) fn stream_with_owners(&self) -> Vec<(&Schema, &Property)> {
        let mut stream = match &self.super_schema {
            Some(sup) => sup.stream_with_owners(),
            None => Vec::new(),
        };
        stream.extend(self.properties.iter().map(|p| (self, p)));
        stream
    }

    /// Project a concrete instance down the super chain to `owner`'s
    /// level. Identity when `owner` is this schema; `None` when `owner`
    /// is not in the chain. A level without an `extends_via` projection
    /// passes the instance through unchanged (valid for marker supertypes
    /// that own no accessors).
    pub(crate) fn project_ref<'a>(&self, owner: &Schema, obj: &'a dyn Any) -> Option<&'a dyn Any> {
        if std::ptr::eq(self as *const Schema, owner as *const Schema) {
            return Some(obj);
        }
        let projected = match &self.upcast_ref {
            Some(up) => up(obj),
            None => obj,
        };
        self.super_schema.as_ref()?.project_ref(owner, projected)
    }

    /// Mutable counterpart of [`project_ref`](Schema::project_ref).
    pub(crate) fn project_mut<'a>(
        &self,
        owner: &Schema,
        obj: &'a mut dyn Any,
    ) -> Option<&'a mut dyn Any> {
        if std::ptr::eq(self as *const Schema, owner as *const Schema) {
            return Some(obj);
        }
        let projected = match &self.upcast_mut {
            Some(up) => up(obj),
            None => obj,
        };
        self.super_schema.as_ref()?.project_mut(owner, projected)
    }

    /// The schema in the chain that locally owns the id accessor.
    pub(crate) fn id_owner(&self) -> Option<&Schema> {
        if self.id_accessor.is_some() {
            return Some(self);
        }
        self.super_schema.as_ref().and_then(|s| s.id_owner())
    }

    /// The OUT-direction adjacent property of an edge schema, delegating
    /// up the super chain when locally absent.
    pub fn out_property(&self) -> Option<&Property> {
        match self.out_property {
            Some(i) => Some(&self.properties[i]),
            None => self.super_schema.as_ref().and_then(|s| s.out_property()),
        }
    }

    /// The IN-direction adjacent property of an edge schema.
    pub fn in_property(&self) -> Option<&Property> {
        match self.in_property {
            Some(i) => Some(&self.properties[i]),
            None => self.super_schema.as_ref().and_then(|s| s.in_property()),
        }
    }

    /// The adjacent property for a direction.
    pub fn adjacent_property(&self, direction: Direction) -> Option<&Property> {
        match direction {
            Direction::Out => self.out_property(),
            Direction::In => self.in_property(),
        }
    }

    /// The adjacent property for a direction, with the schema that owns it.
    pub(crate) fn adjacent_with_owner(&self, direction: Direction) -> Option<(&Schema, &Property)> {
        let index = match direction {
            Direction::Out => self.out_property,
            Direction::In => self.in_property,
        };
        match index {
            Some(i) => Some((self, &self.properties[i])),
            None => self
                .super_schema
                .as_ref()
                .and_then(|s| s.adjacent_with_owner(direction)),
        }
    }

    /// The identity accessor, delegating up the super chain so a subclass
    /// need not redeclare identity mapping.
    pub fn id_accessor(&self) -> Option<&IdAccessor> {
        match &self.id_accessor {
            Some(acc) => Some(acc),
            None => self.super_schema.as_ref().and_then(|s| s.id_accessor()),
        }
    }

    /// The id codec, delegating up the super chain.
    pub fn id_codec(&self) -> Option<&Arc<dyn IdCodec>> {
        match &self.id_codec {
            Some(codec) => Some(codec),
            None => self.super_schema.as_ref().and_then(|s| s.id_codec()),
        }
    }

    /// Transform a backend-native id into its caller-visible form.
    /// Identity when no codec is configured.
    pub fn encode_id(&self, raw: &str) -> String {
        match self.id_codec() {
            Some(codec) => codec.encode(raw),
            None => raw.to_string(),
        }
    }

    /// Reverse [`encode_id`](Schema::encode_id).
    pub fn decode_id(&self, encoded: &str) -> Result<String, CodecError> {
        match self.id_codec() {
            Some(codec) => codec.decode(encoded),
            None => Ok(encoded.to_string()),
        }
    }

    /// Read the entity's backend-native (decoded) graph id, or `None` when
    /// the identity field is unset. Does not trigger initialization: the
    /// identifier of a placeholder is populated at construction.
    pub fn entity_graph_id(&self, entity: &AnyRef) -> Result<Option<String>, MappingError> {
        let owner = self
            .id_owner()
            .ok_or(crate::error::SchemaError::MissingIdAccessor {
                type_name: self.type_name,
            })?;
        let Some(accessor) = owner.id_accessor.as_ref() else {
            return Err(crate::error::SchemaError::MissingIdAccessor {
                type_name: self.type_name,
            }
            .into());
        };
        let encoded = entity.with_value(|obj| match self.project_ref(owner, obj) {
            Some(projected) => (accessor.get)(projected),
            None => Err(crate::schema::property::AccessError::EntityMismatch {
                expected: owner.type_name,
            }),
        })?;
        match encoded {
            Some(encoded) => Ok(Some(self.decode_id(&encoded)?)),
            None => Ok(None),
        }
    }

    /// Write the element's id onto the entity's identity field, encoded.
    pub fn set_entity_id(&self, entity: &AnyRef, raw_id: &str) -> Result<(), MappingError> {
        let encoded = self.encode_id(raw_id);
        entity.with_value_mut(|obj| self.write_encoded_id(obj, encoded))
    }

    /// Write an already-encoded id onto a bare instance, projecting down
    /// to the id accessor's owning level.
    pub(crate) fn write_encoded_id(
        &self,
        obj: &mut dyn Any,
        encoded: String,
    ) -> Result<(), MappingError> {
        let owner = self
            .id_owner()
            .ok_or(crate::error::SchemaError::MissingIdAccessor {
                type_name: self.type_name,
            })?;
        let Some(accessor) = owner.id_accessor.as_ref() else {
            return Err(crate::error::SchemaError::MissingIdAccessor {
                type_name: self.type_name,
            }
            .into());
        };
        let projected =
            self.project_mut(owner, obj)
                .ok_or(crate::schema::property::AccessError::EntityMismatch {
                    expected: owner.type_name,
                })?;
        (accessor.set)(projected, Some(encoded))?;
        Ok(())
    }

    /// Whether `type_id` names this schema's type or one registered below
    /// it in the inheritance tree.
    pub fn is_assignable_from(&self, type_id: TypeId) -> bool {
        if self.type_id == type_id {
            return true;
        }
        self.children_by_class
            .read()
            .values()
            .any(|child| child.is_assignable_from(type_id))
    }

    /// Resolve the deepest registered schema matching a runtime type.
    ///
    /// Used for saving, where the concrete type is fully known: descends
    /// through the child indices, at each level picking the child whose
    /// registered subtree contains `type_id`.
    pub fn most_specific_for_class(self: &Arc<Self>, type_id: TypeId) -> Arc<Schema> {
        let children = self.children_by_class.read();
        for child in children.values() {
            if child.is_assignable_from(type_id) {
                let child = child.clone();
                drop(children);
                return child.most_specific_for_class(type_id);
            }
        }
        self.clone()
    }

    /// Resolve the schema for an element label.
    ///
    /// Used for loading, where only the stored label is available. This is
    /// a non-recursive single-level lookup: element labels encode depth
    /// directly, unlike classes, which need the hierarchy walk above. An
    /// unknown label falls back to this schema (treated as exactly this
    /// type), which tolerates labels introduced by out-of-band data.
    pub fn most_specific_for_label(self: &Arc<Self>, label: &str) -> Arc<Schema> {
        self.children_by_label
            .read()
            .get(label)
            .cloned()
            .unwrap_or_else(|| self.clone())
    }

    /// Register a direct subclass schema into the polymorphic indices.
    pub(crate) fn add_child(&self, child: &Arc<Schema>) {
        self.children_by_label
            .write()
            .insert(child.label.clone(), child.clone());
        self.children_by_class
            .write()
            .insert(child.type_id, child.clone());
    }

    pub(crate) fn construct_instance(&self) -> Box<dyn Any + Send + Sync> {
        (self.construct)()
    }

    /// Indices of own relational properties whose links are not bound
    /// yet. Registry bookkeeping.
    pub(crate) fn unbound_links(&self) -> Vec<usize> {
        self.properties
            .iter()
            .enumerate()
            .filter_map(|(i, p)| match p.link() {
                Some(link) if !link.is_bound() => Some(i),
                _ => None,
            })
            .collect()
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for Schema {}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("label", &self.label)
            .field("type", &self.type_name)
            .field("kind", &self.kind)
            .field("abstract", &self.is_abstract)
            .field("properties", &self.properties.len())
            .finish()
    }
}
