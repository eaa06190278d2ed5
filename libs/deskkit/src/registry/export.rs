//! Export metadata: what a module contributes to the service container.
//!
//! Each module crate submits one [`ExportModule`] through `inventory`. Its `exports` function
//! fills an [`ExportSet`] with descriptors for classes, factory methods, abstract contracts,
//! controllers and UI entries.

use std::{fmt, marker::PhantomData, sync::Arc};

use crate::{
    bootstrap::UiEntry,
    container::{Activator, ContainerError, ServiceContainer, ServiceScope, TypeKey, activator, erase},
    host::Controller,
    lifetime::Lifetime,
};

/// How a linked module becomes active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModuleKind {
    /// Always loaded.
    Builtin,
    /// Loaded only when an enabled plugin manifest names it.
    Plugin,
}

/// A linked module and its export function.
pub struct ExportModule {
    pub name: &'static str,
    pub kind: ModuleKind,
    pub exports: fn(&mut ExportSet),
}

impl ExportModule {
    #[must_use]
    pub const fn builtin(name: &'static str, exports: fn(&mut ExportSet)) -> Self {
        Self {
            name,
            kind: ModuleKind::Builtin,
            exports,
        }
    }

    #[must_use]
    pub const fn plugin(name: &'static str, exports: fn(&mut ExportSet)) -> Self {
        Self {
            name,
            kind: ModuleKind::Plugin,
            exports,
        }
    }

    /// Every module submitted by a linked crate, builtins first, then by name.
    #[must_use]
    pub fn linked() -> Vec<&'static ExportModule> {
        let mut modules: Vec<&'static ExportModule> =
            inventory::iter::<ExportModule>.into_iter().collect();
        modules.sort_by_key(|m| (m.kind, m.name));
        modules
    }
}

impl fmt::Debug for ExportModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportModule")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

inventory::collect!(ExportModule);

/// A type the container can construct on its own.
pub trait Injectable: Sized + Send + Sync + 'static {
    /// Build an instance, resolving dependencies from `scope`.
    ///
    /// # Errors
    /// Any error is reported as an activation failure of this type.
    fn inject(scope: &ServiceScope) -> anyhow::Result<Self>;
}

/// Where a descriptor came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportOrigin {
    /// A concrete class.
    Class,
    /// A contract tag without an implementation. Never registered.
    Abstract,
    /// A factory method on a tagged class.
    Method { owner: TypeKey, name: &'static str },
}

/// One tagged item. Immutable once produced by a scan.
#[derive(Clone)]
pub struct ExportDescriptor {
    pub module: &'static str,
    pub target: TypeKey,
    pub register_as: Option<TypeKey>,
    pub lifetime: Lifetime,
    pub origin: ExportOrigin,
    activator: Option<Activator>,
}

impl ExportDescriptor {
    /// Key the descriptor is registered under: the override if any, else the declared type.
    #[must_use]
    pub fn contract(&self) -> TypeKey {
        self.register_as.unwrap_or(self.target)
    }

    /// Name used in logs and collision reports.
    #[must_use]
    pub fn implementation(&self) -> &'static str {
        match self.origin {
            ExportOrigin::Method { name, .. } => name,
            ExportOrigin::Class | ExportOrigin::Abstract => self.target.name(),
        }
    }

    #[must_use]
    pub fn is_instantiable(&self) -> bool {
        self.activator.is_some()
    }

    pub(crate) fn activator(&self) -> Option<&Activator> {
        self.activator.as_ref()
    }
}

impl fmt::Debug for ExportDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportDescriptor")
            .field("module", &self.module)
            .field("target", &self.target)
            .field("register_as", &self.register_as)
            .field("lifetime", &self.lifetime)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

type ResolveController = fn(&ServiceContainer) -> Result<Arc<dyn Controller>, ContainerError>;
type ResolveEntry = fn(&ServiceContainer) -> Result<Arc<dyn UiEntry>, ContainerError>;

/// A class whose routes are mounted on every hosted endpoint.
#[derive(Clone, Copy)]
pub struct ControllerExport {
    pub module: &'static str,
    pub type_key: TypeKey,
    resolve: ResolveController,
}

impl ControllerExport {
    /// Resolve the controller from the endpoint's container.
    ///
    /// # Errors
    /// Returns [`ContainerError`] if the controller cannot be activated.
    pub fn resolve(&self, container: &ServiceContainer) -> Result<Arc<dyn Controller>, ContainerError> {
        (self.resolve)(container)
    }
}

impl fmt::Debug for ControllerExport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerExport")
            .field("module", &self.module)
            .field("type_key", &self.type_key)
            .finish_non_exhaustive()
    }
}

/// A UI entry that can be selected as the main loop by name.
#[derive(Clone, Copy)]
pub struct EntryExport {
    pub module: &'static str,
    pub name: &'static str,
    pub type_key: TypeKey,
    resolve: ResolveEntry,
}

impl EntryExport {
    /// Resolve the entry from the main container.
    ///
    /// # Errors
    /// Returns [`ContainerError`] if the entry cannot be activated.
    pub fn resolve(&self, container: &ServiceContainer) -> Result<Arc<dyn UiEntry>, ContainerError> {
        (self.resolve)(container)
    }
}

impl fmt::Debug for EntryExport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryExport")
            .field("module", &self.module)
            .field("name", &self.name)
            .field("type_key", &self.type_key)
            .finish_non_exhaustive()
    }
}

fn resolve_controller<C: Controller + Injectable>(
    container: &ServiceContainer,
) -> Result<Arc<dyn Controller>, ContainerError> {
    let controller: Arc<dyn Controller> = container.resolve::<C>()?;
    Ok(controller)
}

fn resolve_entry<E: UiEntry + Injectable>(
    container: &ServiceContainer,
) -> Result<Arc<dyn UiEntry>, ContainerError> {
    let entry: Arc<dyn UiEntry> = container.resolve::<E>()?;
    Ok(entry)
}

/// Collects the exports of one module.
pub struct ExportSet {
    module: &'static str,
    pub(crate) descriptors: Vec<ExportDescriptor>,
    pub(crate) controllers: Vec<ControllerExport>,
    pub(crate) entries: Vec<EntryExport>,
}

impl ExportSet {
    #[must_use]
    pub fn new(module: &'static str) -> Self {
        Self {
            module,
            descriptors: Vec::new(),
            controllers: Vec::new(),
            entries: Vec::new(),
        }
    }

    #[must_use]
    pub fn module(&self) -> &'static str {
        self.module
    }

    /// Tag a concrete class, registered under its own type unless
    /// [`ClassExport::register_as`] overrides the contract.
    pub fn class<T: Injectable>(&mut self, lifetime: Lifetime) -> ClassExport<'_, T> {
        let index = self.push(ExportDescriptor {
            module: self.module,
            target: TypeKey::of::<T>(),
            register_as: None,
            lifetime,
            origin: ExportOrigin::Class,
            activator: Some(activator(|scope| Ok(erase(Arc::new(T::inject(scope)?))))),
        });
        ClassExport {
            set: self,
            index,
            _class: PhantomData,
        }
    }

    /// Tag an abstract contract. Kept in the catalog for inspection, never registered.
    pub fn contract<C: ?Sized + 'static>(&mut self, lifetime: Lifetime) {
        self.push(ExportDescriptor {
            module: self.module,
            target: TypeKey::of::<C>(),
            register_as: None,
            lifetime,
            origin: ExportOrigin::Abstract,
            activator: None,
        });
    }

    /// Tag a controller. It is registered as a transient class and mounted on every endpoint.
    pub fn controller<C: Controller + Injectable>(&mut self) -> MethodExports<'_, C> {
        self.controllers.push(ControllerExport {
            module: self.module,
            type_key: TypeKey::of::<C>(),
            resolve: resolve_controller::<C>,
        });
        self.class::<C>(Lifetime::Transient).methods()
    }

    /// Tag a UI entry selectable by `name`. It is registered as a singleton class.
    pub fn entry<E: UiEntry + Injectable>(&mut self, name: &'static str) -> MethodExports<'_, E> {
        self.entries.push(EntryExport {
            module: self.module,
            name,
            type_key: TypeKey::of::<E>(),
            resolve: resolve_entry::<E>,
        });
        self.class::<E>(Lifetime::Singleton).methods()
    }

    fn push(&mut self, descriptor: ExportDescriptor) -> usize {
        self.descriptors.push(descriptor);
        self.descriptors.len() - 1
    }
}

impl fmt::Debug for ExportSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportSet")
            .field("module", &self.module)
            .field("descriptors", &self.descriptors)
            .field("controllers", &self.controllers)
            .field("entries", &self.entries)
            .finish()
    }
}

/// Builder returned by [`ExportSet::class`].
pub struct ClassExport<'a, T> {
    set: &'a mut ExportSet,
    index: usize,
    _class: PhantomData<fn() -> T>,
}

impl<'a, T: Injectable> ClassExport<'a, T> {
    /// Register the class under contract `C` instead of its own type.
    ///
    /// `cast` is the unsizing coercion, usually `|c| c`.
    pub fn register_as<C>(self, cast: fn(Arc<T>) -> Arc<C>)
    where
        C: ?Sized + Send + Sync + 'static,
    {
        let descriptor = &mut self.set.descriptors[self.index];
        descriptor.register_as = Some(TypeKey::of::<C>());
        descriptor.activator = Some(activator(move |scope| {
            Ok(erase(cast(Arc::new(T::inject(scope)?))))
        }));
    }

    /// Tag a factory method on this class. See [`MethodExports::method`].
    pub fn method<R>(
        self,
        name: &'static str,
        lifetime: Lifetime,
        factory: fn(&T) -> anyhow::Result<R>,
    ) -> MethodExports<'a, T>
    where
        R: Send + Sync + 'static,
    {
        self.methods().method(name, lifetime, factory)
    }

    fn methods(self) -> MethodExports<'a, T> {
        MethodExports {
            set: self.set,
            _owner: PhantomData,
        }
    }
}

/// Factory-method builder for a class registered under its own type.
pub struct MethodExports<'a, T> {
    set: &'a mut ExportSet,
    _owner: PhantomData<fn() -> T>,
}

impl<T: Injectable> MethodExports<'_, T> {
    /// Register `R` produced by `factory`, which is invoked on the owning instance.
    ///
    /// The owner is resolved from the container on every activation, honoring its own
    /// lifetime.
    pub fn method<R>(
        self,
        name: &'static str,
        lifetime: Lifetime,
        factory: fn(&T) -> anyhow::Result<R>,
    ) -> Self
    where
        R: Send + Sync + 'static,
    {
        self.set.push(ExportDescriptor {
            module: self.set.module,
            target: TypeKey::of::<R>(),
            register_as: None,
            lifetime,
            origin: ExportOrigin::Method {
                owner: TypeKey::of::<T>(),
                name,
            },
            activator: Some(activator(move |scope| {
                let owner = scope.resolve::<T>()?;
                Ok(erase(Arc::new(factory(&owner)?)))
            })),
        });
        self
    }
}
