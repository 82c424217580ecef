//! Database models split into domain-specific modules.

pub mod common;
pub mod user;
pub mod visit;

pub use common::*;
pub use user::*;
pub use visit::*;
