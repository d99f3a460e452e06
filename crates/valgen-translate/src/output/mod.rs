//! Output backends for code generation.
//!
//! Each backend takes a [`ResolvedSchema`](crate::resolve::ResolvedSchema)
//! and produces code. All backends implement the
//! [`Backend`](crate::traits::Backend) trait.

// Go
#[cfg(feature = "backend-go")]
pub mod go;
#[cfg(feature = "backend-go")]
mod go_runtime;

#[cfg(feature = "backend-go")]
pub use go::{GoBackend, GoOptions, generate_go_validators};
#[cfg(feature = "backend-go")]
pub use go_runtime::{emit_common, emit_common_tests};
#[cfg(feature = "backend-go")]
pub use go_tests::generate_go_tests;
