//! Entity handles and lazy initialization.
//!
//! Loaded objects are not returned bare: they come wrapped in a shared
//! handle that is either *realized* (constructed directly by the caller) or
//! a *lazy placeholder* produced by a load. A placeholder knows the graph
//! element it came from, the schema that produced it, and the visited-set
//! snapshot of the originating load, and populates its fields exactly once
//! on first real access.
//!
//! Two views exist over the same core:
//! - [`AnyRef`]: type-erased, what the materializer passes around;
//! - [`Ref<T>`]: typed, what domain code holds in relation fields.
//!
//! Identity operations (equality, hashing, the graph id) never trigger
//! initialization, so placeholders can sit in sets and maps without
//! cascading loads.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use crate::adapter::GraphAdapter;
use crate::element::{ElementKind, ElementRef};
use crate::error::MappingError;
use crate::schema::Schema;

const STATE_UNINITIALIZED: u8 = 0;
const STATE_INITIALIZING: u8 = 1;
const STATE_INITIALIZED: u8 = 2;

/// Where a lazy placeholder came from.
///
/// Carried so deferred population resolves relations against the same
/// visited-set as the load that produced the placeholder.
pub(crate) struct LoadOrigin {
    pub element: ElementRef,
    pub schema: Arc<Schema>,
    pub adapter: Arc<dyn GraphAdapter>,
    pub tracker: LoadTracker,
}

/// Visited-set for one load call tree.
///
/// Maps element identity to the placeholder already produced for it, so a
/// relation pointing back at an element resolves to the same handle
/// instead of recursing. Entries are weak: the tracker is kept alive by
/// the placeholders it produced, and must not keep them alive in turn.
#[derive(Clone, Default)]
pub(crate) struct LoadTracker {
    inner: Arc<Mutex<HashMap<(ElementKind, String), Weak<EntityCore>>>>,
}

impl LoadTracker {
    pub fn get(&self, element: &ElementRef) -> Option<AnyRef> {
        let mut map = self.inner.lock();
        let key = (element.kind, element.id.clone());
        match map.get(&key).and_then(Weak::upgrade) {
            Some(core) => Some(AnyRef { core }),
            None => {
                map.remove(&key);
                None
            }
        }
    }

    pub fn insert(&self, element: &ElementRef, entity: &AnyRef) {
        self.inner
            .lock()
            .insert((element.kind, element.id.clone()), Arc::downgrade(&entity.core));
    }
}

struct EntityCore {
    type_id: TypeId,
    type_name: &'static str,
    state: AtomicU8,
    init_lock: Mutex<()>,
    value: RwLock<Box<dyn Any + Send + Sync>>,
    origin: Option<LoadOrigin>,
}

/// Type-erased entity handle.
///
/// Cloning is cheap and shares the underlying instance. Equality and
/// hashing follow the identity policy: two handles are equal when they
/// share a core, or when both originate from the same graph element.
#[derive(Clone)]
pub struct AnyRef {
    core: Arc<EntityCore>,
}

impl AnyRef {
    /// Wrap a caller-constructed value. The handle starts initialized.
    pub fn realized<T: Send + Sync + 'static>(value: T) -> Self {
        Self {
            core: Arc::new(EntityCore {
                type_id: TypeId::of::<T>(),
                type_name: std::any::type_name::<T>(),
                state: AtomicU8::new(STATE_INITIALIZED),
                init_lock: Mutex::new(()),
                value: RwLock::new(Box::new(value)),
                origin: None,
            }),
        }
    }

    /// Wrap a schema-constructed placeholder instance. Only the identifier
    /// field is populated; everything else waits for first access.
    pub(crate) fn placeholder(
        instance: Box<dyn Any + Send + Sync>,
        type_id: TypeId,
        type_name: &'static str,
        origin: LoadOrigin,
    ) -> Self {
        Self {
            core: Arc::new(EntityCore {
                type_id,
                type_name,
                state: AtomicU8::new(STATE_UNINITIALIZED),
                init_lock: Mutex::new(()),
                value: RwLock::new(instance),
                origin: Some(origin),
            }),
        }
    }

    /// The `TypeId` of the wrapped instance.
    pub fn type_id(&self) -> TypeId {
        self.core.type_id
    }

    /// The type name of the wrapped instance (diagnostics only).
    pub fn type_name(&self) -> &'static str {
        self.core.type_name
    }

    /// Whether deferred population has completed (always true for
    /// realized handles). Never triggers initialization.
    pub fn is_initialized(&self) -> bool {
        self.core.state.load(Ordering::Acquire) == STATE_INITIALIZED
    }

    /// Whether this handle is a placeholder produced by a load.
    pub fn is_placeholder(&self) -> bool {
        self.core.origin.is_some()
    }

    /// The caller-visible (encoded) id of the originating element, if this
    /// handle came from a load. Never triggers initialization.
    pub fn graph_id(&self) -> Option<String> {
        self.core
            .origin
            .as_ref()
            .map(|o| o.schema.encode_id(&o.element.id))
    }

    /// Force one-time initialization.
    ///
    /// Double-checked: the common already-initialized path takes no lock.
    /// Concurrent callers block on the per-placeholder lock until the one
    /// population pass finishes. The state transition is terminal: a
    /// population failure does not rearm the placeholder.
    pub fn force_init(&self) -> Result<(), MappingError> {
        if self.core.state.load(Ordering::Acquire) == STATE_INITIALIZED {
            return Ok(());
        }
        let Some(origin) = &self.core.origin else {
            return Ok(());
        };
        let _guard = self.core.init_lock.lock();
        if self.core.state.load(Ordering::Acquire) == STATE_INITIALIZED {
            return Ok(());
        }
        self.core.state.store(STATE_INITIALIZING, Ordering::Release);
        debug!(
            schema = %origin.schema.label(),
            element = %origin.element,
            "initializing lazy placeholder"
        );
        let result = origin.schema.populate(self, origin);
        self.core.state.store(STATE_INITIALIZED, Ordering::Release);
        result
    }

    /// Recover the typed handle. Hands `self` back on a type mismatch.
    pub fn downcast<T: Send + Sync + 'static>(self) -> Result<Ref<T>, AnyRef> {
        if self.core.type_id == TypeId::of::<T>() {
            Ok(Ref {
                raw: self,
                _marker: PhantomData,
            })
        } else {
            Err(self)
        }
    }

    /// Identity key for save-side visited sets: stable for the lifetime of
    /// the handle, shared by clones.
    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.core) as *const () as usize
    }

    /// Run `f` against the instance without forcing initialization.
    pub(crate) fn with_value<R>(&self, f: impl FnOnce(&dyn Any) -> R) -> R {
        let guard = self.core.value.read();
        let obj: &dyn Any = &**guard;
        f(obj)
    }

    /// Run `f` against the instance mutably without forcing initialization.
    pub(crate) fn with_value_mut<R>(&self, f: impl FnOnce(&mut dyn Any) -> R) -> R {
        let mut guard = self.core.value.write();
        let obj: &mut dyn Any = &mut **guard;
        f(obj)
    }
}

impl PartialEq for AnyRef {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.core, &other.core) {
            return true;
        }
        match (&self.core.origin, &other.core.origin) {
            (Some(a), Some(b)) => a.element == b.element,
            _ => false,
        }
    }
}

impl Eq for AnyRef {}

impl Hash for AnyRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.core.origin {
            Some(origin) => origin.element.hash(state),
            None => self.identity().hash(state),
        }
    }
}

impl fmt::Debug for AnyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyRef")
            .field("type", &self.core.type_name)
            .field("initialized", &self.is_initialized())
            .field("graph_id", &self.graph_id())
            .finish()
    }
}

/// Read guard over the instance inside a [`Ref`].
pub type RefRead<'a, T> = parking_lot::MappedRwLockReadGuard<'a, T>;

/// Write guard over the instance inside a [`Ref`].
pub type RefWrite<'a, T> = parking_lot::MappedRwLockWriteGuard<'a, T>;

/// Typed entity handle.
///
/// Domain structs hold their relations as `Ref<T>` (or collections of
/// them); repositories accept and return `Ref<T>`. Access through
/// [`read`](Ref::read)/[`write`](Ref::write) forces one-time
/// initialization of lazy placeholders; identity operations do not.
pub struct Ref<T> {
    raw: AnyRef,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> Ref<T> {
    /// Wrap a caller-constructed value.
    pub fn new(value: T) -> Self {
        Self {
            raw: AnyRef::realized(value),
            _marker: PhantomData,
        }
    }

    /// Borrow the instance, initializing it first if this is an untouched
    /// placeholder.
    pub fn read(&self) -> Result<RefRead<'_, T>, MappingError> {
        self.raw.force_init()?;
        let guard: RwLockReadGuard<'_, Box<dyn Any + Send + Sync>> = self.raw.core.value.read();
        RwLockReadGuard::try_map(guard, |boxed| boxed.downcast_ref::<T>()).map_err(|_| {
            MappingError::TypeMismatch {
                expected: std::any::type_name::<T>(),
                actual: self.raw.type_name(),
            }
        })
    }

    /// Mutably borrow the instance, initializing it first if needed.
    pub fn write(&self) -> Result<RefWrite<'_, T>, MappingError> {
        self.raw.force_init()?;
        let guard: RwLockWriteGuard<'_, Box<dyn Any + Send + Sync>> = self.raw.core.value.write();
        RwLockWriteGuard::try_map(guard, |boxed| boxed.downcast_mut::<T>()).map_err(|_| {
            MappingError::TypeMismatch {
                expected: std::any::type_name::<T>(),
                actual: self.raw.type_name(),
            }
        })
    }

    /// See [`AnyRef::is_initialized`].
    pub fn is_initialized(&self) -> bool {
        self.raw.is_initialized()
    }

    /// See [`AnyRef::force_init`].
    pub fn force_init(&self) -> Result<(), MappingError> {
        self.raw.force_init()
    }

    /// See [`AnyRef::graph_id`].
    pub fn graph_id(&self) -> Option<String> {
        self.raw.graph_id()
    }

    /// The type-erased view of this handle.
    pub fn erased(&self) -> AnyRef {
        self.raw.clone()
    }

    /// Consume into the type-erased view.
    pub fn into_erased(self) -> AnyRef {
        self.raw
    }
}

impl<T> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> PartialEq for Ref<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T> Eq for Ref<T> {}

impl<T> Hash for Ref<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<T> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.raw, f)
    }
}
