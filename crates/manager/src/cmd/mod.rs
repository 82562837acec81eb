//! Command layer - entry points for the manager's subcommands

pub mod create_domain;
pub mod serve;

pub use create_domain::run_create_domain;
pub use serve::run_serve;
