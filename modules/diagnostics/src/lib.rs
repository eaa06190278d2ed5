//! Diagnostics plugin.
//!
//! Enabled by a `deskhost.diagnostics.plugin.yaml` manifest next to the executable. Mounts
//! `GET /Test/Test` and `GET /Diagnostics/Info` on every hosted endpoint.

pub mod api;
pub mod domain;
mod module;

pub use domain::clock::{ClockReading, SystemClock};
pub use module::{MODULE_NAME, exports};
