use deskkit::{ExportModule, ExportSet, Lifetime};

use crate::{api::rest::routes::DiagnosticsController, domain::clock::SystemClock};

pub const MODULE_NAME: &str = "diagnostics";

/// Registrations contributed by this module.
pub fn exports(set: &mut ExportSet) {
    set.class::<SystemClock>(Lifetime::Singleton)
        .method("now", Lifetime::Transient, SystemClock::now);
    set.controller::<DiagnosticsController>();
}

inventory::submit! {
    ExportModule::plugin(MODULE_NAME, exports)
}
