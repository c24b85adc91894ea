//! Shared building blocks for `rekon`: the immutable run [`config`], the
//! [`network`] target model, task [`tag`]s and structured [`finding`]s.

pub mod config;
pub mod finding;
pub mod macros;
pub mod network;
pub mod tag;
pub mod utils;

#[doc(hidden)]
pub use tracing;
