//! Property metadata.
//!
//! A [`Property`] describes one mapped field: its name (which doubles as
//! the element property key, or the edge label for relational fields), an
//! optional index kind, and the accessor capability pair the materializer
//! calls at copy/load time. Accessors are closures built once at schema
//! construction (see the builder), so no runtime type introspection
//! happens on the hot path; closures also subsume embedded field paths.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::element::Direction;
use crate::error::SchemaError;
use crate::schema::Schema;
use crate::value::{PropertyValue, ValueKind};

/// Index requested for a property when a schema writer pushes the schema
/// into a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    None,
    Unique,
    NonUnique,
    SpatialLatitude,
    SpatialLongitude,
}

impl IndexKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::None => "none",
            IndexKind::Unique => "unique",
            IndexKind::NonUnique => "non_unique",
            IndexKind::SpatialLatitude => "spatial_latitude",
            IndexKind::SpatialLongitude => "spatial_longitude",
        }
    }
}

/// Cardinality of a relational property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    OneToOne,
    OneToMany,
    ManyToOne,
}

impl Cardinality {
    /// Whether at most one related object is carried.
    pub fn is_single(&self) -> bool {
        !matches!(self, Cardinality::OneToMany)
    }
}

/// Per-property accessor failures.
///
/// These are recoverable by design: the cascade logs them and skips the
/// property, so one bad field never aborts a whole save or load.
#[derive(Debug, Error)]
pub enum AccessError {
    /// The instance handed to the accessor is not the mapped type
    #[error("entity is not a '{expected}'")]
    EntityMismatch { expected: &'static str },

    /// A stored value does not convert to the field's type
    #[error("property '{property}' expects {expected:?}, got {actual:?}")]
    ValueMismatch {
        property: String,
        expected: ValueKind,
        actual: ValueKind,
    },

    /// A related handle does not wrap the expected type
    #[error("related object for '{property}' is not a '{expected}'")]
    LinkMismatch {
        property: String,
        expected: &'static str,
    },
}

pub(crate) type ValueGetter =
    Arc<dyn Fn(&dyn Any) -> Result<Option<PropertyValue>, AccessError> + Send + Sync>;
pub(crate) type ValueSetter =
    Arc<dyn Fn(&mut dyn Any, PropertyValue) -> Result<(), AccessError> + Send + Sync>;
pub(crate) type LinkGetter =
    Arc<dyn Fn(&dyn Any) -> Result<Vec<crate::entity::AnyRef>, AccessError> + Send + Sync>;
pub(crate) type LinkSetter =
    Arc<dyn Fn(&mut dyn Any, Vec<crate::entity::AnyRef>) -> Result<(), AccessError> + Send + Sync>;

/// Accessor pair for the identity field.
#[derive(Clone)]
pub struct IdAccessor {
    pub(crate) get: Arc<dyn Fn(&dyn Any) -> Result<Option<String>, AccessError> + Send + Sync>,
    pub(crate) set:
        Arc<dyn Fn(&mut dyn Any, Option<String>) -> Result<(), AccessError> + Send + Sync>,
}

impl fmt::Debug for IdAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IdAccessor")
    }
}

/// Late-bound back-reference to a related schema.
///
/// Relations are declared by target type; the registry binds the actual
/// schema once both sides are registered. The reference is weak: the
/// registry owns all schemas, a property must not.
pub struct SchemaLink {
    target: TypeId,
    target_name: &'static str,
    resolved: OnceLock<Weak<Schema>>,
}

impl SchemaLink {
    pub(crate) fn new<U: 'static>() -> Self {
        Self {
            target: TypeId::of::<U>(),
            target_name: std::any::type_name::<U>(),
            resolved: OnceLock::new(),
        }
    }

    pub fn target(&self) -> TypeId {
        self.target
    }

    pub fn target_name(&self) -> &'static str {
        self.target_name
    }

    pub fn is_bound(&self) -> bool {
        self.resolved.get().is_some()
    }

    pub(crate) fn bind(&self, schema: &Arc<Schema>) {
        let _ = self.resolved.set(Arc::downgrade(schema));
    }

    /// The related schema. Fails when the target type never got registered
    /// (a configuration error the registry reports at freeze time).
    pub fn schema(&self) -> Result<Arc<Schema>, SchemaError> {
        self.resolved
            .get()
            .and_then(Weak::upgrade)
            .ok_or(SchemaError::MissingSchema {
                type_name: self.target_name,
            })
    }
}

impl fmt::Debug for SchemaLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaLink")
            .field("target", &self.target_name)
            .field("bound", &self.is_bound())
            .finish()
    }
}

/// What kind of field a property maps.
pub enum PropertyKind {
    /// A scalar copied to/from a keyed element property
    Value {
        value_kind: ValueKind,
        get: ValueGetter,
        set: ValueSetter,
    },
    /// A relation to other mapped objects, materialized as adjacent
    /// edges/vertices (or adjacent edge-mapped entities)
    Related {
        direction: Direction,
        cardinality: Cardinality,
        link: SchemaLink,
        get: LinkGetter,
        set: LinkSetter,
    },
    /// One endpoint of an edge-mapped type
    Adjacent {
        direction: Direction,
        link: SchemaLink,
        get: LinkGetter,
        set: LinkSetter,
    },
}

/// One mapped field of a schema.
pub struct Property {
    pub(crate) name: String,
    pub(crate) index: IndexKind,
    pub(crate) kind: PropertyKind,
}

impl Property {
    /// The property name. For scalar properties this is the element
    /// property key; for relational properties it is the edge label.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> IndexKind {
        self.index
    }

    pub fn kind(&self) -> &PropertyKind {
        &self.kind
    }

    pub fn is_adjacent(&self) -> bool {
        matches!(self.kind, PropertyKind::Adjacent { .. })
    }

    pub fn is_relational(&self) -> bool {
        matches!(
            self.kind,
            PropertyKind::Related { .. } | PropertyKind::Adjacent { .. }
        )
    }

    /// The adjacency direction, for relational properties.
    pub fn direction(&self) -> Option<Direction> {
        match &self.kind {
            PropertyKind::Value { .. } => None,
            PropertyKind::Related { direction, .. } | PropertyKind::Adjacent { direction, .. } => {
                Some(*direction)
            }
        }
    }

    /// The related-schema link, for relational properties.
    pub fn link(&self) -> Option<&SchemaLink> {
        match &self.kind {
            PropertyKind::Value { .. } => None,
            PropertyKind::Related { link, .. } | PropertyKind::Adjacent { link, .. } => Some(link),
        }
    }

    /// The scalar type tag, for value properties.
    pub fn value_kind(&self) -> Option<ValueKind> {
        match &self.kind {
            PropertyKind::Value { value_kind, .. } => Some(*value_kind),
            _ => None,
        }
    }
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            PropertyKind::Value { value_kind, .. } => format!("value({})", value_kind.as_str()),
            PropertyKind::Related {
                direction,
                cardinality,
                link,
                ..
            } => format!("related({direction}, {cardinality:?}, {})", link.target_name()),
            PropertyKind::Adjacent { direction, link, .. } => {
                format!("adjacent({direction}, {})", link.target_name())
            }
        };
        f.debug_struct("Property")
            .field("name", &self.name)
            .field("index", &self.index)
            .field("kind", &kind)
            .finish()
    }
}
