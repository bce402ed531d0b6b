//! Schema construction.
//!
//! [`SchemaBuilder`] assembles a [`Schema`] for one mapped type. Field
//! access is captured as typed closures here, erased once, and never
//! reflected over again: the materializer only ever sees the capability
//! pairs built at this point.
//!
//! Naming rule: a scalar property's name is the element property key; a
//! relational property's name is the edge label. An edge-mapped relation
//! (`link_*` targeting an edge schema) must therefore use the related
//! schema's label as its property name.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::element::{Direction, ElementKind};
use crate::entity::Ref;
use crate::error::SchemaError;
use crate::ident::IdCodec;
use crate::schema::property::{
    AccessError, Cardinality, IdAccessor, IndexKind, LinkGetter, LinkSetter, Property,
    PropertyKind, SchemaLink,
};
use crate::schema::{Constructor, Schema, UpcastMut, UpcastRef};
use crate::value::Scalar;

/// Builder for the [`Schema`] of one mapped type `T`.
///
/// Collects properties in declaration order; `build` validates the
/// structural invariants (unique property names, at most one adjacent
/// property per direction, an id accessor somewhere in the super chain)
/// and produces the immutable schema.
pub struct SchemaBuilder<T> {
    kind: ElementKind,
    label: String,
    is_abstract: bool,
    super_schema: Option<Arc<Schema>>,
    upcast_ref: Option<UpcastRef>,
    upcast_mut: Option<UpcastMut>,
    id_accessor: Option<IdAccessor>,
    id_codec: Option<Arc<dyn IdCodec>>,
    construct: Constructor,
    properties: Vec<Property>,
    error: Option<SchemaError>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Default + Send + Sync + 'static> SchemaBuilder<T> {
    /// Start a vertex schema with the given graph label.
    pub fn vertex(label: impl Into<String>) -> Self {
        Self::new(ElementKind::Vertex, label.into())
    }

    /// Start an edge schema with the given graph label.
    pub fn edge(label: impl Into<String>) -> Self {
        Self::new(ElementKind::Edge, label.into())
    }

    fn new(kind: ElementKind, label: String) -> Self {
        Self {
            kind,
            label,
            is_abstract: false,
            super_schema: None,
            upcast_ref: None,
            upcast_mut: None,
            id_accessor: None,
            id_codec: None,
            construct: Arc::new(|| Box::new(T::default()) as Box<dyn Any + Send + Sync>),
            properties: Vec::new(),
            error: None,
            _marker: PhantomData,
        }
    }
}

impl<T: Send + Sync + 'static> SchemaBuilder<T> {
    /// Mark the schema abstract: it only exists as a supertype and can
    /// never be materialized from an element itself.
    pub fn abstract_schema(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Declare `parent` as the super-schema without a projection.
    ///
    /// Inherited properties stream before own ones; the id accessor and
    /// codec are inherited unless redeclared. Suitable when the parent is
    /// a marker supertype owning no accessors of its own: a parent whose
    /// accessors must run against this type needs
    /// [`extends_via`](SchemaBuilder::extends_via).
    pub fn extends(mut self, parent: &Arc<Schema>) -> Self {
        if parent.kind() != self.kind {
            self.fail(SchemaError::KindMismatch {
                label: parent.label().to_string(),
                expected: self.kind,
                actual: parent.kind(),
            });
            return self;
        }
        self.super_schema = Some(parent.clone());
        self
    }

    /// Declare `parent` as the super-schema, with the projection from this
    /// type to its embedded parent value.
    ///
    /// This is the Rust rendering of subclass field inheritance: the
    /// parent's accessors run against the embedded `P`, so the subclass
    /// inherits every mapped field (identity included) without
    /// redeclaring it.
    pub fn extends_via<P: Send + Sync + 'static>(
        mut self,
        parent: &Arc<Schema>,
        project: impl Fn(&T) -> &P + Send + Sync + 'static,
        project_mut: impl Fn(&mut T) -> &mut P + Send + Sync + 'static,
    ) -> Self {
        if parent.type_id() != TypeId::of::<P>() {
            self.fail(SchemaError::ProjectionMismatch {
                type_name: std::any::type_name::<T>(),
                expected: parent.type_name(),
            });
            return self;
        }
        if parent.kind() != self.kind {
            self.fail(SchemaError::KindMismatch {
                label: parent.label().to_string(),
                expected: self.kind,
                actual: parent.kind(),
            });
            return self;
        }
        self.upcast_ref = Some(erase_upcast::<T, P>(project));
        self.upcast_mut = Some(erase_upcast_mut::<T, P>(project_mut));
        self.super_schema = Some(parent.clone());
        self
    }

    /// Declare the identity field. The stored string is the caller-visible
    /// (encoded) id.
    pub fn id(
        mut self,
        get: impl Fn(&T) -> Option<String> + Send + Sync + 'static,
        set: impl Fn(&mut T, Option<String>) + Send + Sync + 'static,
    ) -> Self {
        self.id_accessor = Some(IdAccessor {
            get: Arc::new(move |obj| Ok(get(downcast::<T>(obj)?))),
            set: Arc::new(move |obj, id| {
                set(downcast_mut::<T>(obj)?, id);
                Ok(())
            }),
        });
        self
    }

    /// Attach an id codec to this schema (inherited by subclasses unless
    /// they declare their own).
    pub fn id_codec(mut self, codec: impl IdCodec + 'static) -> Self {
        self.id_codec = Some(Arc::new(codec));
        self
    }

    /// Declare an unindexed scalar property.
    pub fn property<V: Scalar>(
        self,
        name: impl Into<String>,
        get: impl Fn(&T) -> Option<V> + Send + Sync + 'static,
        set: impl Fn(&mut T, V) + Send + Sync + 'static,
    ) -> Self {
        self.indexed_property(name, IndexKind::None, get, set)
    }

    /// Declare a scalar property with an index request for schema writers.
    pub fn indexed_property<V: Scalar>(
        mut self,
        name: impl Into<String>,
        index: IndexKind,
        get: impl Fn(&T) -> Option<V> + Send + Sync + 'static,
        set: impl Fn(&mut T, V) + Send + Sync + 'static,
    ) -> Self {
        let name = name.into();
        let setter_name = name.clone();
        self.push(Property {
            name,
            index,
            kind: PropertyKind::Value {
                value_kind: V::KIND,
                get: Arc::new(move |obj| Ok(get(downcast::<T>(obj)?).map(Scalar::into_value))),
                set: Arc::new(move |obj, value| {
                    let entity = downcast_mut::<T>(obj)?;
                    let typed = V::from_value(value).map_err(|v| AccessError::ValueMismatch {
                        property: setter_name.clone(),
                        expected: V::KIND,
                        actual: v.kind(),
                    })?;
                    set(entity, typed);
                    Ok(())
                }),
            },
        });
        self
    }

    /// Declare a single-valued relation. `Out` gives one-to-one, `In`
    /// many-to-one. The name is the edge label.
    pub fn link_one<U: Send + Sync + 'static>(
        mut self,
        name: impl Into<String>,
        direction: Direction,
        get: impl Fn(&T) -> Option<Ref<U>> + Send + Sync + 'static,
        set: impl Fn(&mut T, Ref<U>) + Send + Sync + 'static,
    ) -> Self {
        let name = name.into();
        let cardinality = match direction {
            Direction::Out => Cardinality::OneToOne,
            Direction::In => Cardinality::ManyToOne,
        };
        let (getter, setter) = link_accessors::<T, U>(&name, get, set);
        self.push(Property {
            name,
            index: IndexKind::None,
            kind: PropertyKind::Related {
                direction,
                cardinality,
                link: SchemaLink::new::<U>(),
                get: getter,
                set: setter,
            },
        });
        self
    }

    /// Declare a multi-valued relation. The name is the edge label.
    pub fn link_many<U: Send + Sync + 'static>(
        mut self,
        name: impl Into<String>,
        direction: Direction,
        get: impl Fn(&T) -> Vec<Ref<U>> + Send + Sync + 'static,
        set: impl Fn(&mut T, Vec<Ref<U>>) + Send + Sync + 'static,
    ) -> Self {
        let name = name.into();
        let setter_name = name.clone();
        self.push(Property {
            name,
            index: IndexKind::None,
            kind: PropertyKind::Related {
                direction,
                cardinality: Cardinality::OneToMany,
                link: SchemaLink::new::<U>(),
                get: Arc::new(move |obj| {
                    Ok(get(downcast::<T>(obj)?)
                        .into_iter()
                        .map(Ref::into_erased)
                        .collect())
                }),
                set: Arc::new(move |obj, refs| {
                    let entity = downcast_mut::<T>(obj)?;
                    let mut typed = Vec::with_capacity(refs.len());
                    for r in refs {
                        typed.push(r.downcast::<U>().map_err(|_| AccessError::LinkMismatch {
                            property: setter_name.clone(),
                            expected: std::any::type_name::<U>(),
                        })?);
                    }
                    set(entity, typed);
                    Ok(())
                }),
            },
        });
        self
    }

    /// Declare the OUT endpoint of an edge schema.
    pub fn adjacent_out<U: Send + Sync + 'static>(
        self,
        get: impl Fn(&T) -> Option<Ref<U>> + Send + Sync + 'static,
        set: impl Fn(&mut T, Ref<U>) + Send + Sync + 'static,
    ) -> Self {
        self.adjacent::<U>(Direction::Out, get, set)
    }

    /// Declare the IN endpoint of an edge schema.
    pub fn adjacent_in<U: Send + Sync + 'static>(
        self,
        get: impl Fn(&T) -> Option<Ref<U>> + Send + Sync + 'static,
        set: impl Fn(&mut T, Ref<U>) + Send + Sync + 'static,
    ) -> Self {
        self.adjacent::<U>(Direction::In, get, set)
    }

    fn adjacent<U: Send + Sync + 'static>(
        mut self,
        direction: Direction,
        get: impl Fn(&T) -> Option<Ref<U>> + Send + Sync + 'static,
        set: impl Fn(&mut T, Ref<U>) + Send + Sync + 'static,
    ) -> Self {
        let name = direction.as_str().to_string();
        let (getter, setter) = link_accessors::<T, U>(&name, get, set);
        self.push(Property {
            name,
            index: IndexKind::None,
            kind: PropertyKind::Adjacent {
                direction,
                link: SchemaLink::new::<U>(),
                get: getter,
                set: setter,
            },
        });
        self
    }

    /// Validate invariants and produce the schema.
    pub fn build(self) -> Result<Schema, SchemaError> {
        if let Some(err) = self.error {
            return Err(err);
        }

        let type_name = std::any::type_name::<T>();
        let mut by_name = HashMap::new();
        let mut out_property = None;
        let mut in_property = None;
        for (i, prop) in self.properties.iter().enumerate() {
            if prop.is_adjacent() {
                if self.kind == ElementKind::Vertex {
                    return Err(SchemaError::AdjacentOnVertex { type_name });
                }
                let direction = prop.direction().unwrap_or(Direction::Out);
                let slot = match direction {
                    Direction::Out => &mut out_property,
                    Direction::In => &mut in_property,
                };
                if slot.replace(i).is_some() {
                    return Err(SchemaError::AdjacentDirectionTaken {
                        type_name,
                        direction,
                    });
                }
            }
            if by_name.insert(prop.name.clone(), i).is_some() {
                return Err(SchemaError::DuplicateProperty {
                    type_name,
                    name: prop.name.clone(),
                });
            }
        }

        // identity mapping must exist somewhere in the chain
        let inherited_id = self
            .super_schema
            .as_ref()
            .map(|s| s.id_accessor().is_some())
            .unwrap_or(false);
        if self.id_accessor.is_none() && !inherited_id {
            return Err(SchemaError::MissingIdAccessor { type_name });
        }

        Ok(Schema {
            type_id: TypeId::of::<T>(),
            type_name,
            kind: self.kind,
            label: self.label,
            is_abstract: self.is_abstract,
            super_schema: self.super_schema,
            upcast_ref: self.upcast_ref,
            upcast_mut: self.upcast_mut,
            id_accessor: self.id_accessor,
            id_codec: self.id_codec,
            construct: self.construct,
            properties: self.properties,
            by_name,
            out_property,
            in_property,
            children_by_label: Default::default(),
            children_by_class: Default::default(),
        })
    }

    fn push(&mut self, property: Property) {
        self.properties.push(property);
    }

    fn fail(&mut self, err: SchemaError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }
}

fn link_accessors<T, U>(
    name: &str,
    get: impl Fn(&T) -> Option<Ref<U>> + Send + Sync + 'static,
    set: impl Fn(&mut T, Ref<U>) + Send + Sync + 'static,
) -> (LinkGetter, LinkSetter)
where
    T: Send + Sync + 'static,
    U: Send + Sync + 'static,
{
    let setter_name = name.to_string();
    let getter: LinkGetter = Arc::new(move |obj| {
        Ok(get(downcast::<T>(obj)?)
            .into_iter()
            .map(Ref::into_erased)
            .collect())
    });
    let setter: LinkSetter = Arc::new(move |obj, refs| {
        let entity = downcast_mut::<T>(obj)?;
        if let Some(raw) = refs.into_iter().next() {
            let typed = raw.downcast::<U>().map_err(|_| AccessError::LinkMismatch {
                property: setter_name.clone(),
                expected: std::any::type_name::<U>(),
            })?;
            set(entity, typed);
        }
        Ok(())
    });
    (getter, setter)
}

fn erase_upcast<T, P>(project: impl Fn(&T) -> &P + Send + Sync + 'static) -> UpcastRef
where
    T: Send + Sync + 'static,
    P: Send + Sync + 'static,
{
    Arc::new(move |obj| match obj.downcast_ref::<T>() {
        Some(entity) => project(entity),
        // leave as-is; the downstream accessor reports the mismatch
        None => obj,
    })
}

fn erase_upcast_mut<T, P>(project: impl Fn(&mut T) -> &mut P + Send + Sync + 'static) -> UpcastMut
where
    T: Send + Sync + 'static,
    P: Send + Sync + 'static,
{
    Arc::new(move |obj| {
        if !obj.is::<T>() {
            return obj;
        }
        match obj.downcast_mut::<T>() {
            Some(entity) => project(entity),
            None => unreachable!("guarded by is::<T>"),
        }
    })
}

fn downcast<T: 'static>(obj: &dyn Any) -> Result<&T, AccessError> {
    obj.downcast_ref::<T>().ok_or(AccessError::EntityMismatch {
        expected: std::any::type_name::<T>(),
    })
}

fn downcast_mut<T: 'static>(obj: &mut dyn Any) -> Result<&mut T, AccessError> {
    obj.downcast_mut::<T>().ok_or(AccessError::EntityMismatch {
        expected: std::any::type_name::<T>(),
    })
}
