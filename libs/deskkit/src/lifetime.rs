//! Instance reuse policies for registered services.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Rule governing instance reuse for a registration.
///
/// - `Singleton`: one instance for the container's life, built eagerly when the container is built.
/// - `Scoped`: one instance per [`ServiceScope`](crate::container::ServiceScope); the root
///   container owns its own root scope.
/// - `Transient`: a new instance on every resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifetime {
    Singleton,
    Scoped,
    Transient,
}

impl Lifetime {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Lifetime::Singleton => "singleton",
            Lifetime::Scoped => "scoped",
            Lifetime::Transient => "transient",
        }
    }
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
