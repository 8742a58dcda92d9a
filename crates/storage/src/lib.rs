#![forbid(unsafe_code)]

mod db;
mod engine;
pub mod expire;
mod registry;

pub use db::{ExpirationEntry, Rivet};
pub use expire::{Outcome, Ttl};
pub use registry::{Registry, RegistryConfig};
