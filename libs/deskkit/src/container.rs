//! Type-keyed service container with lifetime policies.
//!
//! Design goals:
//! - Registrations are collected once into a [`ContainerBuilder`] and frozen by [`ContainerBuilder::build`].
//! - Consumers resolve by *contract type* (concrete type or trait object) and get an `Arc<T>`.
//! - Singletons are built eagerly at build time, so a failing activator is a startup error.
//! - Scoped instances live in a [`ServiceScope`]; every container owns a root scope.
//! - A child container (see [`ContainerBuilder::with_parent`]) reuses the parent's singletons and
//!   falls back to the parent for contracts it does not register itself.
//!
//! Implementation details:
//! - Key = `type_name::<T>()`, which works for `T = dyn Trait`.
//! - Value = `Arc<T>` stored as `Arc<dyn Any + Send + Sync>` (downcast on read).
//! - No lock is held while an activator runs; activators may resolve their own dependencies.

use parking_lot::Mutex;
use std::{any::Any, cell::Cell, collections::HashMap, fmt, sync::Arc};

use crate::lifetime::Lifetime;

/// Activators recursing deeper than this are assumed to be a dependency cycle.
const MAX_RESOLUTION_DEPTH: usize = 64;

thread_local! {
    static RESOLUTION_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Stable type key for contracts, using fully-qualified `type_name::<T>()`.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct TypeKey(&'static str);

impl TypeKey {
    #[inline]
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        TypeKey(std::any::type_name::<T>())
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        self.0
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("service not registered: type={type_key:?}")]
    NotRegistered { type_key: TypeKey },

    #[error("type mismatch in container for type={type_key:?}")]
    TypeMismatch { type_key: TypeKey },

    #[error("duplicate registration for type={type_key:?}: {existing} is already registered, {replacement} rejected")]
    DuplicateRegistration {
        type_key: TypeKey,
        existing: &'static str,
        replacement: &'static str,
    },

    #[error("failed to activate {implementation} for type={type_key:?}")]
    Activation {
        type_key: TypeKey,
        implementation: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("resolution of type={type_key:?} nested too deeply; dependency cycle?")]
    DepthExceeded { type_key: TypeKey },
}

/// Type-erased instance. Always holds an `Arc<T>` for the registration's contract `T`.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Builds an instance for a registration from the scope it is being resolved in.
pub type Activator = Arc<dyn Fn(&ServiceScope) -> anyhow::Result<Instance> + Send + Sync>;

/// Wrap a closure as an [`Activator`].
pub fn activator<F>(f: F) -> Activator
where
    F: Fn(&ServiceScope) -> anyhow::Result<Instance> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Erase an `Arc<T>` into an [`Instance`].
#[must_use]
pub fn erase<T>(value: Arc<T>) -> Instance
where
    T: ?Sized + Send + Sync + 'static,
{
    Arc::new(value)
}

fn downcast<T>(type_key: TypeKey, instance: &Instance) -> Result<Arc<T>, ContainerError>
where
    T: ?Sized + Send + Sync + 'static,
{
    // Stored value is exactly `Arc<T>`; downcast is safe and cheap.
    instance
        .downcast_ref::<Arc<T>>()
        .cloned()
        .ok_or(ContainerError::TypeMismatch { type_key })
}

/// What to do when two registrations target the same contract.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// Last registration wins; the override is logged.
    #[default]
    Replace,
    /// A second registration for a contract is an error.
    Reject,
}

/// Binds a contract to an activator and a lifetime.
#[derive(Clone)]
pub struct ServiceRegistration {
    pub contract: TypeKey,
    pub implementation: &'static str,
    pub lifetime: Lifetime,
    activator: Activator,
}

impl ServiceRegistration {
    #[must_use]
    pub fn new(
        contract: TypeKey,
        implementation: &'static str,
        lifetime: Lifetime,
        activator: Activator,
    ) -> Self {
        Self {
            contract,
            implementation,
            lifetime,
            activator,
        }
    }
}

impl fmt::Debug for ServiceRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistration")
            .field("contract", &self.contract)
            .field("implementation", &self.implementation)
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

/// Mutable registration table; frozen into a [`ServiceContainer`] by [`ContainerBuilder::build`].
pub struct ContainerBuilder {
    registrations: HashMap<TypeKey, ServiceRegistration>,
    order: Vec<TypeKey>,
    parent: Option<Arc<ServiceContainer>>,
    policy: CollisionPolicy,
}

impl Default for ContainerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            registrations: HashMap::new(),
            order: Vec::new(),
            parent: None,
            policy: CollisionPolicy::default(),
        }
    }

    /// Builder for a child container whose singletons are shared with `parent`.
    #[must_use]
    pub fn with_parent(parent: Arc<ServiceContainer>) -> Self {
        Self {
            parent: Some(parent),
            ..Self::new()
        }
    }

    #[must_use]
    pub fn collision_policy(mut self, policy: CollisionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Add a registration.
    ///
    /// # Errors
    /// Returns [`ContainerError::DuplicateRegistration`] if the contract is already registered
    /// and the collision policy is [`CollisionPolicy::Reject`].
    pub fn add(&mut self, registration: ServiceRegistration) -> Result<(), ContainerError> {
        let key = registration.contract;
        match self.registrations.get(&key) {
            None => {
                self.order.push(key);
                self.registrations.insert(key, registration);
            }
            Some(existing) if self.policy == CollisionPolicy::Reject => {
                return Err(ContainerError::DuplicateRegistration {
                    type_key: key,
                    existing: existing.implementation,
                    replacement: registration.implementation,
                });
            }
            Some(existing) => {
                tracing::warn!(
                    contract = %key,
                    previous = existing.implementation,
                    replacement = registration.implementation,
                    "Contract registered twice; last registration wins"
                );
                self.registrations.insert(key, registration);
            }
        }
        Ok(())
    }

    /// Register an already built value as a singleton under `T`.
    ///
    /// # Errors
    /// Same as [`ContainerBuilder::add`].
    pub fn add_instance<T>(&mut self, value: Arc<T>) -> Result<(), ContainerError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let instance = erase(value);
        self.add(ServiceRegistration::new(
            TypeKey::of::<T>(),
            std::any::type_name::<T>(),
            Lifetime::Singleton,
            activator(move |_| Ok(Arc::clone(&instance))),
        ))
    }

    #[must_use]
    pub fn contains(&self, key: TypeKey) -> bool {
        self.registrations.contains_key(&key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Freeze the table and construct every singleton.
    ///
    /// Singletons the parent already owns are taken from the parent instead of being rebuilt.
    ///
    /// # Errors
    /// Returns the first activation error; no partially built container is returned.
    pub fn build(self) -> Result<Arc<ServiceContainer>, ContainerError> {
        let singletons: Vec<TypeKey> = self
            .order
            .iter()
            .copied()
            .filter(|k| {
                self.registrations
                    .get(k)
                    .is_some_and(|r| r.lifetime == Lifetime::Singleton)
            })
            .collect();

        let inner = Arc::new(ContainerInner {
            registrations: self.registrations,
            order: self.order,
            singletons: Mutex::new(HashMap::new()),
            root_cache: Arc::new(Mutex::new(HashMap::new())),
            parent: self.parent,
        });
        let container = Arc::new(ServiceContainer {
            root: ServiceScope::root(&inner),
            inner,
        });

        for key in singletons {
            let inherited = container
                .inner
                .parent
                .as_ref()
                .filter(|p| p.singleton_registered(key));
            let instance = match inherited {
                Some(parent) => parent.resolve_key(key)?,
                None => container.root.resolve_key(key)?,
            };
            container.inner.singletons.lock().insert(key, instance);
        }

        tracing::debug!(
            registrations = container.inner.order.len(),
            child = container.inner.parent.is_some(),
            "Service container built"
        );
        Ok(container)
    }
}

type InstanceMap = HashMap<TypeKey, Instance>;

struct ContainerInner {
    registrations: HashMap<TypeKey, ServiceRegistration>,
    order: Vec<TypeKey>,
    singletons: Mutex<InstanceMap>,
    root_cache: Arc<Mutex<InstanceMap>>,
    parent: Option<Arc<ServiceContainer>>,
}

/// Frozen registration table plus singleton cache. Safe to share across threads.
pub struct ServiceContainer {
    inner: Arc<ContainerInner>,
    root: ServiceScope,
}

impl ServiceContainer {
    /// Resolve `T` from the root scope.
    ///
    /// # Errors
    /// Returns [`ContainerError`] if `T` is not registered or its activation fails.
    pub fn resolve<T>(&self) -> Result<Arc<T>, ContainerError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.root.resolve::<T>()
    }

    /// Resolve by key without downcasting.
    ///
    /// # Errors
    /// Returns [`ContainerError`] if the key is not registered or its activation fails.
    pub fn resolve_key(&self, key: TypeKey) -> Result<Instance, ContainerError> {
        self.root.resolve_key(key)
    }

    /// Open a new unit of work with its own scoped instances.
    #[must_use]
    pub fn create_scope(&self) -> ServiceScope {
        ServiceScope {
            inner: Arc::clone(&self.inner),
            cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Whether `key` resolves here or through a parent.
    #[must_use]
    pub fn contains(&self, key: TypeKey) -> bool {
        self.inner.registrations.contains_key(&key)
            || self.inner.parent.as_ref().is_some_and(|p| p.contains(key))
    }

    fn singleton_registered(&self, key: TypeKey) -> bool {
        match self.inner.registrations.get(&key) {
            Some(r) => r.lifetime == Lifetime::Singleton,
            None => self
                .inner
                .parent
                .as_ref()
                .is_some_and(|p| p.singleton_registered(key)),
        }
    }

    /// Registrations in the order they were first added (own table only).
    pub fn registrations(&self) -> impl Iterator<Item = &ServiceRegistration> {
        self.inner
            .order
            .iter()
            .filter_map(|k| self.inner.registrations.get(k))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.registrations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.registrations.is_empty()
    }
}

impl fmt::Debug for ServiceContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceContainer")
            .field("registrations", &self.inner.order)
            .field("has_parent", &self.inner.parent.is_some())
            .finish_non_exhaustive()
    }
}

/// One logical unit of work. Scoped registrations resolve to one instance per scope.
pub struct ServiceScope {
    inner: Arc<ContainerInner>,
    cache: Arc<Mutex<InstanceMap>>,
}

impl ServiceScope {
    fn root(inner: &Arc<ContainerInner>) -> Self {
        Self {
            inner: Arc::clone(inner),
            cache: Arc::clone(&inner.root_cache),
        }
    }

    /// Resolve `T` honoring its lifetime.
    ///
    /// # Errors
    /// Returns [`ContainerError`] if `T` is not registered or its activation fails.
    pub fn resolve<T>(&self) -> Result<Arc<T>, ContainerError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let key = TypeKey::of::<T>();
        let instance = self.resolve_key(key)?;
        downcast::<T>(key, &instance)
    }

    /// Resolve `T` if it is registered; activation failures are still errors.
    ///
    /// # Errors
    /// Returns [`ContainerError`] if `T` is registered but cannot be activated.
    pub fn try_resolve<T>(&self) -> Result<Option<Arc<T>>, ContainerError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        match self.resolve::<T>() {
            Ok(v) => Ok(Some(v)),
            Err(ContainerError::NotRegistered { type_key }) if type_key == TypeKey::of::<T>() => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Resolve by key without downcasting.
    ///
    /// # Errors
    /// Returns [`ContainerError`] if the key is not registered or its activation fails.
    pub fn resolve_key(&self, key: TypeKey) -> Result<Instance, ContainerError> {
        let Some(registration) = self.inner.registrations.get(&key) else {
            return match &self.inner.parent {
                Some(parent) => parent.resolve_key(key),
                None => Err(ContainerError::NotRegistered { type_key: key }),
            };
        };

        match registration.lifetime {
            Lifetime::Singleton => {
                if let Some(found) = self.inner.singletons.lock().get(&key) {
                    return Ok(Arc::clone(found));
                }
                // Singletons never capture a request scope.
                let created = activate(registration, &ServiceScope::root(&self.inner))?;
                let mut cache = self.inner.singletons.lock();
                Ok(Arc::clone(cache.entry(key).or_insert(created)))
            }
            Lifetime::Scoped => {
                if let Some(found) = self.cache.lock().get(&key) {
                    return Ok(Arc::clone(found));
                }
                let created = activate(registration, self)?;
                let mut cache = self.cache.lock();
                Ok(Arc::clone(cache.entry(key).or_insert(created)))
            }
            Lifetime::Transient => activate(registration, self),
        }
    }
}

fn activate(
    registration: &ServiceRegistration,
    scope: &ServiceScope,
) -> Result<Instance, ContainerError> {
    let type_key = registration.contract;
    let depth = RESOLUTION_DEPTH.with(|d| {
        let next = d.get() + 1;
        d.set(next);
        next
    });
    let result = if depth > MAX_RESOLUTION_DEPTH {
        Err(ContainerError::DepthExceeded { type_key })
    } else {
        (registration.activator)(scope).map_err(|source| ContainerError::Activation {
            type_key,
            implementation: registration.implementation,
            source,
        })
    };
    RESOLUTION_DEPTH.with(|d| d.set(d.get() - 1));
    result
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English(usize);
    impl Greeter for English {
        fn greet(&self) -> String {
            format!("hello #{}", self.0)
        }
    }

    fn counting<T, F>(counter: &Arc<AtomicUsize>, make: F) -> Activator
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(usize) -> Arc<T> + Send + Sync + 'static,
    {
        let counter = Arc::clone(counter);
        activator(move |_| Ok(erase(make(counter.fetch_add(1, Ordering::SeqCst)))))
    }

    fn registration(lifetime: Lifetime, counter: &Arc<AtomicUsize>) -> ServiceRegistration {
        ServiceRegistration::new(
            TypeKey::of::<dyn Greeter>(),
            "English",
            lifetime,
            counting::<dyn Greeter, _>(counter, |n| Arc::new(English(n))),
        )
    }

    #[test]
    fn singleton_is_built_eagerly_and_shared() {
        let built = Arc::new(AtomicUsize::new(0));
        let mut builder = ContainerBuilder::new();
        builder
            .add(registration(Lifetime::Singleton, &built))
            .unwrap();
        let container = builder.build().unwrap();
        assert_eq!(built.load(Ordering::SeqCst), 1, "built during build()");

        let a = container.resolve::<dyn Greeter>().unwrap();
        let b = container.create_scope().resolve::<dyn Greeter>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn transient_yields_new_instance_per_resolution() {
        let built = Arc::new(AtomicUsize::new(0));
        let mut builder = ContainerBuilder::new();
        builder
            .add(registration(Lifetime::Transient, &built))
            .unwrap();
        let container = builder.build().unwrap();
        assert_eq!(built.load(Ordering::SeqCst), 0, "transient is lazy");

        let a = container.resolve::<dyn Greeter>().unwrap();
        let b = container.resolve::<dyn Greeter>().unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a.greet(), "hello #0");
        assert_eq!(b.greet(), "hello #1");
    }

    #[test]
    fn scoped_is_shared_within_scope_only() {
        let built = Arc::new(AtomicUsize::new(0));
        let mut builder = ContainerBuilder::new();
        builder.add(registration(Lifetime::Scoped, &built)).unwrap();
        let container = builder.build().unwrap();

        let scope1 = container.create_scope();
        let scope2 = container.create_scope();
        let a1 = scope1.resolve::<dyn Greeter>().unwrap();
        let a2 = scope1.resolve::<dyn Greeter>().unwrap();
        let b = scope2.resolve::<dyn Greeter>().unwrap();

        assert!(Arc::ptr_eq(&a1, &a2));
        assert!(!Arc::ptr_eq(&a1, &b));
    }

    #[test]
    fn root_container_acts_as_its_own_scope() {
        let built = Arc::new(AtomicUsize::new(0));
        let mut builder = ContainerBuilder::new();
        builder.add(registration(Lifetime::Scoped, &built)).unwrap();
        let container = builder.build().unwrap();

        let a = container.resolve::<dyn Greeter>().unwrap();
        let b = container.resolve::<dyn Greeter>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn resolve_returns_not_found_for_unregistered_type() {
        let container = ContainerBuilder::new().build().unwrap();
        match container.resolve::<dyn Greeter>() {
            Err(ContainerError::NotRegistered { type_key }) => {
                assert!(type_key.name().contains("Greeter"));
            }
            Err(other) => panic!("expected NotRegistered, got {other:?}"),
            Ok(_) => panic!("expected NotRegistered, got an instance"),
        }
        assert!(container
            .create_scope()
            .try_resolve::<dyn Greeter>()
            .unwrap()
            .is_none());
    }

    #[test]
    fn replace_policy_keeps_last_registration() {
        let first = Arc::new(AtomicUsize::new(100));
        let second = Arc::new(AtomicUsize::new(200));
        let mut builder = ContainerBuilder::new();
        builder
            .add(registration(Lifetime::Singleton, &first))
            .unwrap();
        builder
            .add(registration(Lifetime::Singleton, &second))
            .unwrap();
        assert_eq!(builder.len(), 1);

        let container = builder.build().unwrap();
        assert_eq!(container.resolve::<dyn Greeter>().unwrap().greet(), "hello #200");
        assert_eq!(first.load(Ordering::SeqCst), 100, "overridden activator never runs");
    }

    #[test]
    fn reject_policy_fails_on_duplicate_contract() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut builder = ContainerBuilder::new().collision_policy(CollisionPolicy::Reject);
        builder
            .add(registration(Lifetime::Singleton, &counter))
            .unwrap();
        let err = builder
            .add(registration(Lifetime::Transient, &counter))
            .unwrap_err();
        assert!(matches!(err, ContainerError::DuplicateRegistration { .. }));
    }

    #[test]
    fn failing_singleton_activator_fails_the_build() {
        let mut builder = ContainerBuilder::new();
        builder
            .add(ServiceRegistration::new(
                TypeKey::of::<dyn Greeter>(),
                "Broken",
                Lifetime::Singleton,
                activator(|_| Err(anyhow::anyhow!("boom"))),
            ))
            .unwrap();
        let err = builder.build().unwrap_err();
        match err {
            ContainerError::Activation {
                implementation,
                source,
                ..
            } => {
                assert_eq!(implementation, "Broken");
                assert_eq!(source.to_string(), "boom");
            }
            other => panic!("expected Activation, got {other:?}"),
        }
    }

    #[test]
    fn failing_transient_activator_surfaces_on_resolution() {
        let mut builder = ContainerBuilder::new();
        builder
            .add(ServiceRegistration::new(
                TypeKey::of::<dyn Greeter>(),
                "Broken",
                Lifetime::Transient,
                activator(|_| Err(anyhow::anyhow!("lazy boom"))),
            ))
            .unwrap();
        let container = builder.build().unwrap();
        assert!(matches!(
            container.resolve::<dyn Greeter>(),
            Err(ContainerError::Activation { .. })
        ));
    }

    #[test]
    fn activators_can_resolve_dependencies() {
        struct Config(&'static str);
        struct Service(Arc<Config>);

        let mut builder = ContainerBuilder::new();
        builder.add_instance(Arc::new(Config("db=memory"))).unwrap();
        builder
            .add(ServiceRegistration::new(
                TypeKey::of::<Service>(),
                "Service",
                Lifetime::Transient,
                activator(|scope| Ok(erase(Arc::new(Service(scope.resolve::<Config>()?))))),
            ))
            .unwrap();
        let container = builder.build().unwrap();

        let service = container.resolve::<Service>().unwrap();
        assert_eq!(service.0.0, "db=memory");
        assert!(Arc::ptr_eq(&service.0, &container.resolve::<Config>().unwrap()));
    }

    #[test]
    fn dependency_cycle_is_reported_instead_of_overflowing() {
        struct Loop;
        let mut builder = ContainerBuilder::new();
        builder
            .add(ServiceRegistration::new(
                TypeKey::of::<Loop>(),
                "Loop",
                Lifetime::Transient,
                activator(|scope| {
                    scope.resolve::<Loop>()?;
                    Ok(erase(Arc::new(Loop)))
                }),
            ))
            .unwrap();
        let container = builder.build().unwrap();

        let Err(err) = container.resolve::<Loop>() else {
            panic!("cyclic resolution must fail");
        };
        let mut cause: Option<&(dyn std::error::Error + 'static)> = Some(&err);
        let mut saw_depth = false;
        while let Some(e) = cause {
            if let Some(ContainerError::DepthExceeded { .. }) = e.downcast_ref::<ContainerError>() {
                saw_depth = true;
            }
            cause = e.source();
        }
        assert!(saw_depth, "expected DepthExceeded in chain: {err:?}");
    }

    #[test]
    fn child_container_reuses_parent_singletons_and_falls_back() {
        struct AppName(&'static str);

        let built = Arc::new(AtomicUsize::new(0));
        let mut parent = ContainerBuilder::new();
        parent
            .add(registration(Lifetime::Singleton, &built))
            .unwrap();
        parent.add_instance(Arc::new(AppName("desk"))).unwrap();
        let parent = parent.build().unwrap();

        let mut child = ContainerBuilder::with_parent(Arc::clone(&parent));
        child.add(registration(Lifetime::Singleton, &built)).unwrap();
        let child = child.build().unwrap();

        assert_eq!(built.load(Ordering::SeqCst), 1, "child did not rebuild the singleton");
        assert!(Arc::ptr_eq(
            &parent.resolve::<dyn Greeter>().unwrap(),
            &child.resolve::<dyn Greeter>().unwrap()
        ));
        assert_eq!(child.resolve::<AppName>().unwrap().0, "desk");
        assert!(child.contains(TypeKey::of::<AppName>()));
        assert_eq!(child.len(), 1);
    }

    #[test]
    fn container_is_thread_safe_under_concurrent_resolution() {
        let built = Arc::new(AtomicUsize::new(0));
        let mut builder = ContainerBuilder::new();
        builder
            .add(registration(Lifetime::Singleton, &built))
            .unwrap();
        let container = builder.build().unwrap();
        let expected = container.resolve::<dyn Greeter>().unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let c = Arc::clone(&container);
                std::thread::spawn(move || c.resolve::<dyn Greeter>().unwrap())
            })
            .collect();

        for h in handles {
            assert!(Arc::ptr_eq(&h.join().unwrap(), &expected));
        }
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }
}
