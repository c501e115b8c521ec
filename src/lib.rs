pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;

/// Version reported by the CLI, derived from `git describe` at build time.
pub const VERSION: &str = env!("COURIER_VERSION");
