//! Typed metadata keys
//!
//! A [`MetadataKey`] is an immutable identifier for one typed slot in a
//! [`MetadataContext`](super::MetadataContext). Keys are usually created
//! once and cached in a `static` (e.g. behind `LazyLock`); identity is a
//! process-unique id allocated when the key is built, so two keys never
//! collide even if they share a display name, and a key's value type is
//! fixed by its type parameter.

use crate::metadata::MetadataContext;
use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static NEXT_KEY_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a metadata key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyId(u64);

impl KeyId {
    fn next() -> Self {
        Self(NEXT_KEY_ID.fetch_add(1, Ordering::Relaxed))
    }
}

type Validator<T> = Arc<dyn Fn(&T) -> Result<(), String> + Send + Sync>;
type SetTransform<T> = Arc<dyn Fn(T) -> Arc<dyn Any + Send + Sync> + Send + Sync>;
type GetTransform<T> = Arc<dyn Fn(&(dyn Any + Send + Sync)) -> Option<T> + Send + Sync>;
type DefaultFn<T> = Arc<dyn Fn(&MetadataContext) -> T + Send + Sync>;

/// How a key produces a value when the context has none stored.
#[derive(Clone)]
pub(crate) enum DefaultPolicy<T> {
    /// No default; absent stays absent
    None,
    /// A fixed value, cloned per read
    Value(T),
    /// Computed on every read
    Compute(DefaultFn<T>),
    /// Computed once, then cached into the context so later reads agree
    ComputeCached(DefaultFn<T>),
}

/// An immutable, typed slot identifier.
///
/// Carries the key's default-value policy, an optional validator applied
/// on `set`, optional store/read transforms (e.g. downgrade to a weak
/// reference on write, upgrade on read), and a `serializable` marker for
/// outer layers that persist contexts.
pub struct MetadataKey<T> {
    id: KeyId,
    name: &'static str,
    pub(crate) default: DefaultPolicy<T>,
    pub(crate) validator: Option<Validator<T>>,
    pub(crate) set_transform: Option<SetTransform<T>>,
    pub(crate) get_transform: Option<GetTransform<T>>,
    serializable: bool,
}

impl<T> Clone for MetadataKey<T>
where
    T: Clone,
{
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: self.name,
            default: self.default.clone(),
            validator: self.validator.clone(),
            set_transform: self.set_transform.clone(),
            get_transform: self.get_transform.clone(),
            serializable: self.serializable,
        }
    }
}

impl<T> std::fmt::Debug for MetadataKey<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataKey")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("serializable", &self.serializable)
            .finish()
    }
}

impl<T> MetadataKey<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// A plain key with no default, validator, or transforms.
    pub fn new(name: &'static str) -> Self {
        Self::builder(name).build()
    }

    /// Start building a key with custom policies.
    pub fn builder(name: &'static str) -> MetadataKeyBuilder<T> {
        MetadataKeyBuilder {
            name,
            default: DefaultPolicy::None,
            validator: None,
            set_transform: None,
            get_transform: None,
            serializable: false,
        }
    }

    pub fn id(&self) -> KeyId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_serializable(&self) -> bool {
        self.serializable
    }

    /// Compute this key's default for the given context, if any.
    ///
    /// Does not consult stored values and does not cache; the context
    /// applies the caching policy itself on read.
    pub fn default_value(&self, context: &MetadataContext) -> Option<T> {
        match &self.default {
            DefaultPolicy::None => None,
            DefaultPolicy::Value(value) => Some(value.clone()),
            DefaultPolicy::Compute(compute) | DefaultPolicy::ComputeCached(compute) => {
                Some(compute(context))
            }
        }
    }
}

impl<U> MetadataKey<Arc<U>>
where
    U: Send + Sync + 'static,
{
    /// A key that stores its value behind a weak reference.
    ///
    /// `set` downgrades the `Arc`, reads upgrade it; once the last strong
    /// reference elsewhere is gone the slot reads as absent.
    pub fn weak(name: &'static str) -> Self {
        Self::builder(name)
            .transform_set(|value: Arc<U>| {
                Arc::new(Arc::downgrade(&value)) as Arc<dyn Any + Send + Sync>
            })
            .transform_get(|stored| stored.downcast_ref::<Weak<U>>().and_then(Weak::upgrade))
            .build()
    }
}

/// Builder for [`MetadataKey`].
pub struct MetadataKeyBuilder<T> {
    name: &'static str,
    default: DefaultPolicy<T>,
    validator: Option<Validator<T>>,
    set_transform: Option<SetTransform<T>>,
    get_transform: Option<GetTransform<T>>,
    serializable: bool,
}

impl<T> MetadataKeyBuilder<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Fixed default value, cloned for each absent read.
    pub fn default_value(mut self, value: T) -> Self {
        self.default = DefaultPolicy::Value(value);
        self
    }

    /// Default computed on every absent read.
    pub fn default_with(
        mut self,
        compute: impl Fn(&MetadataContext) -> T + Send + Sync + 'static,
    ) -> Self {
        self.default = DefaultPolicy::Compute(Arc::new(compute));
        self
    }

    /// Default computed once per context, then stored so subsequent
    /// reads return the same value (e.g. a generated id).
    pub fn default_cached(
        mut self,
        compute: impl Fn(&MetadataContext) -> T + Send + Sync + 'static,
    ) -> Self {
        self.default = DefaultPolicy::ComputeCached(Arc::new(compute));
        self
    }

    /// Validator applied before a value is stored; a rejection fails
    /// `set` with `CoreError::InvalidValue`.
    pub fn validator(
        mut self,
        validate: impl Fn(&T) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.validator = Some(Arc::new(validate));
        self
    }

    /// Transform applied when storing a value.
    pub fn transform_set(
        mut self,
        transform: impl Fn(T) -> Arc<dyn Any + Send + Sync> + Send + Sync + 'static,
    ) -> Self {
        self.set_transform = Some(Arc::new(transform));
        self
    }

    /// Transform applied when reading a stored value; returning `None`
    /// makes the slot read as absent.
    pub fn transform_get(
        mut self,
        transform: impl Fn(&(dyn Any + Send + Sync)) -> Option<T> + Send + Sync + 'static,
    ) -> Self {
        self.get_transform = Some(Arc::new(transform));
        self
    }

    /// Mark the key as serializable for outer persistence layers.
    pub fn serializable(mut self) -> Self {
        self.serializable = true;
        self
    }

    pub fn build(self) -> MetadataKey<T> {
        MetadataKey {
            id: KeyId::next(),
            name: self.name,
            default: self.default,
            validator: self.validator,
            set_transform: self.set_transform,
            get_transform: self.get_transform,
            serializable: self.serializable,
        }
    }
}
