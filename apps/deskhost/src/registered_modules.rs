// Keeps plugin crates linked so their inventory submissions are visible.
// Whether a plugin is active is decided at runtime by its manifest file.
#![allow(unused_imports)]

use diagnostics as _;
