//! Export registry: turns linked modules into container registrations.
//!
//! [`ExportRegistry::scan`] runs each module's export function once and returns an
//! [`ExportCatalog`]. [`ExportRegistry::register`] replays a catalog into a
//! [`ContainerBuilder`]; the host replays the same catalog for every endpoint it builds.

mod export;

pub use export::{
    ClassExport, ControllerExport, EntryExport, ExportDescriptor, ExportModule, ExportOrigin,
    ExportSet, Injectable, MethodExports, ModuleKind,
};

use crate::container::{ContainerBuilder, ContainerError, ServiceRegistration};

/// Everything the scanned modules export.
#[derive(Debug, Clone, Default)]
pub struct ExportCatalog {
    pub descriptors: Vec<ExportDescriptor>,
    pub controllers: Vec<ControllerExport>,
    pub entries: Vec<EntryExport>,
}

impl ExportCatalog {
    /// Look up a UI entry by its registered name. The last module exporting `name` wins.
    #[must_use]
    pub fn entry(&self, name: &str) -> Option<&EntryExport> {
        self.entries.iter().rev().find(|e| e.name == name)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty() && self.controllers.is_empty() && self.entries.is_empty()
    }
}

pub struct ExportRegistry;

impl ExportRegistry {
    /// Run the export function of every module, in the given order.
    #[must_use]
    pub fn scan<'a, I>(modules: I) -> ExportCatalog
    where
        I: IntoIterator<Item = &'a ExportModule>,
    {
        let mut catalog = ExportCatalog::default();
        for module in modules {
            let mut set = ExportSet::new(module.name);
            (module.exports)(&mut set);
            tracing::debug!(
                module = module.name,
                kind = ?module.kind,
                descriptors = set.descriptors.len(),
                controllers = set.controllers.len(),
                entries = set.entries.len(),
                "Module exports scanned"
            );
            catalog.descriptors.append(&mut set.descriptors);
            catalog.controllers.append(&mut set.controllers);
            catalog.entries.append(&mut set.entries);
        }
        catalog
    }

    /// Register every instantiable descriptor of `catalog` into `builder`.
    ///
    /// Abstract contracts are skipped. Returns the number of registrations added.
    ///
    /// # Errors
    /// Returns [`ContainerError::DuplicateRegistration`] when the builder rejects collisions.
    pub fn register(
        builder: &mut ContainerBuilder,
        catalog: &ExportCatalog,
    ) -> Result<usize, ContainerError> {
        let mut added = 0;
        for descriptor in &catalog.descriptors {
            let Some(activator) = descriptor.activator() else {
                tracing::warn!(
                    module = descriptor.module,
                    target = %descriptor.target,
                    "Skipping abstract export; it has no implementation"
                );
                continue;
            };
            builder.add(ServiceRegistration::new(
                descriptor.contract(),
                descriptor.implementation(),
                descriptor.lifetime,
                activator.clone(),
            ))?;
            added += 1;
        }
        tracing::debug!(registrations = added, "Exports registered");
        Ok(added)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::{
        container::{CollisionPolicy, ServiceContainer, ServiceScope, TypeKey},
        lifetime::Lifetime,
    };
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;
    impl Injectable for English {
        fn inject(_: &ServiceScope) -> anyhow::Result<Self> {
            Ok(English)
        }
    }
    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".to_owned()
        }
    }

    struct French;
    impl Injectable for French {
        fn inject(_: &ServiceScope) -> anyhow::Result<Self> {
            Ok(French)
        }
    }
    impl Greeter for French {
        fn greet(&self) -> String {
            "bonjour".to_owned()
        }
    }

    static TICKETS: AtomicUsize = AtomicUsize::new(0);

    struct TicketOffice;
    impl Injectable for TicketOffice {
        fn inject(_: &ServiceScope) -> anyhow::Result<Self> {
            Ok(TicketOffice)
        }
    }

    #[derive(Debug, PartialEq, Eq)]
    struct Ticket(usize);

    impl TicketOffice {
        #[allow(clippy::unnecessary_wraps)]
        fn issue(&self) -> anyhow::Result<Ticket> {
            Ok(Ticket(TICKETS.fetch_add(1, Ordering::SeqCst)))
        }
    }

    struct Broken;
    impl Injectable for Broken {
        fn inject(_: &ServiceScope) -> anyhow::Result<Self> {
            Ok(Broken)
        }
    }

    struct Nothing;

    impl Broken {
        fn fail(&self) -> anyhow::Result<Nothing> {
            anyhow::bail!("factory method failed")
        }
    }

    fn english(set: &mut ExportSet) {
        set.class::<English>(Lifetime::Singleton)
            .register_as::<dyn Greeter>(|c| c);
        set.contract::<dyn Greeter>(Lifetime::Singleton);
    }

    fn french(set: &mut ExportSet) {
        set.class::<French>(Lifetime::Singleton)
            .register_as::<dyn Greeter>(|c| c);
    }

    fn tickets(set: &mut ExportSet) {
        let _ = set
            .class::<TicketOffice>(Lifetime::Singleton)
            .method("issue", Lifetime::Transient, TicketOffice::issue);
    }

    fn broken(set: &mut ExportSet) {
        let _ = set
            .class::<Broken>(Lifetime::Transient)
            .method("fail", Lifetime::Singleton, Broken::fail);
    }

    struct Window;
    impl Injectable for Window {
        fn inject(_: &ServiceScope) -> anyhow::Result<Self> {
            Ok(Window)
        }
    }
    impl crate::bootstrap::UiEntry for Window {
        fn run(&self, _: &crate::bootstrap::UiContext) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn window(set: &mut ExportSet) {
        let _ = set.entry::<Window>("window");
    }

    static ENGLISH: ExportModule = ExportModule::builtin("english", english);
    static WINDOW: ExportModule = ExportModule::builtin("window", window);
    static FRENCH: ExportModule = ExportModule::plugin("french", french);
    static TICKET_OFFICE: ExportModule = ExportModule::builtin("tickets", tickets);
    static BROKEN: ExportModule = ExportModule::builtin("broken", broken);

    fn build(modules: &[&ExportModule]) -> Result<Arc<ServiceContainer>, ContainerError> {
        let catalog = ExportRegistry::scan(modules.iter().copied());
        let mut builder = ContainerBuilder::new();
        ExportRegistry::register(&mut builder, &catalog)?;
        builder.build()
    }

    #[test]
    fn scan_collects_descriptors_in_module_order() {
        let catalog = ExportRegistry::scan([&ENGLISH, &TICKET_OFFICE]);
        let targets: Vec<_> = catalog.descriptors.iter().map(|d| d.target).collect();
        assert_eq!(
            targets,
            vec![
                TypeKey::of::<English>(),
                TypeKey::of::<dyn Greeter>(),
                TypeKey::of::<TicketOffice>(),
                TypeKey::of::<Ticket>(),
            ]
        );
        assert_eq!(catalog.descriptors[0].contract(), TypeKey::of::<dyn Greeter>());
        assert_eq!(catalog.descriptors[0].module, "english");
        assert_eq!(
            catalog.descriptors[3].origin,
            ExportOrigin::Method {
                owner: TypeKey::of::<TicketOffice>(),
                name: "issue",
            }
        );
    }

    #[test]
    fn catalog_with_only_an_entry_is_not_empty() {
        assert!(ExportCatalog::default().is_empty());

        let scanned = ExportRegistry::scan([&WINDOW]);
        let entries_only = ExportCatalog {
            entries: scanned.entries,
            ..ExportCatalog::default()
        };
        assert!(!entries_only.is_empty());
        assert!(entries_only.entry("window").is_some());
    }

    #[test]
    fn abstract_contract_is_never_registered() {
        let catalog = ExportRegistry::scan([&ENGLISH]);
        let abstract_tag = &catalog.descriptors[1];
        assert_eq!(abstract_tag.origin, ExportOrigin::Abstract);
        assert!(!abstract_tag.is_instantiable());

        let mut builder = ContainerBuilder::new();
        let added = ExportRegistry::register(&mut builder, &catalog).unwrap();
        assert_eq!(added, 1);
        assert!(!builder.contains(TypeKey::of::<English>()));
        assert!(builder.contains(TypeKey::of::<dyn Greeter>()));
    }

    #[test]
    fn register_as_resolves_through_contract() {
        let container = build(&[&ENGLISH]).unwrap();
        let greeter = container.resolve::<dyn Greeter>().unwrap();
        assert_eq!(greeter.greet(), "hello");
        assert!(container.resolve::<English>().is_err());
    }

    #[test]
    fn singleton_class_and_transient_method() {
        let container = build(&[&TICKET_OFFICE]).unwrap();

        let a = container.resolve::<TicketOffice>().unwrap();
        let b = container.resolve::<TicketOffice>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let t1 = container.resolve::<Ticket>().unwrap();
        let t2 = container.resolve::<Ticket>().unwrap();
        assert!(!Arc::ptr_eq(&t1, &t2));
        assert_ne!(*t1, *t2);
    }

    #[test]
    fn colliding_contracts_last_wins_by_default() {
        let container = build(&[&ENGLISH, &FRENCH]).unwrap();
        assert_eq!(container.resolve::<dyn Greeter>().unwrap().greet(), "bonjour");
    }

    #[test]
    fn colliding_contracts_rejected_on_request() {
        let catalog = ExportRegistry::scan([&ENGLISH, &FRENCH]);
        let mut builder = ContainerBuilder::new().collision_policy(CollisionPolicy::Reject);
        let err = ExportRegistry::register(&mut builder, &catalog).unwrap_err();
        assert!(matches!(err, ContainerError::DuplicateRegistration { .. }));
    }

    #[test]
    fn failing_singleton_method_is_fatal_at_build() {
        let err = build(&[&BROKEN]).unwrap_err();
        match err {
            ContainerError::Activation {
                implementation,
                source,
                ..
            } => {
                assert_eq!(implementation, "fail");
                assert!(source.to_string().contains("factory method failed"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn linked_modules_sort_builtins_first() {
        let mut modules = [&FRENCH, &TICKET_OFFICE, &ENGLISH];
        modules.sort_by_key(|m| (m.kind, m.name));
        let names: Vec<_> = modules.iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["english", "tickets", "french"]);
    }
}
