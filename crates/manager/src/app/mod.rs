//! Application module
//!
//! Wires the daemon together and owns its lifecycle: building the services,
//! running the background tasks and shutting down on a signal.

pub mod builder;
pub mod core;
pub mod services;
pub mod tasks;

pub use builder::ApplicationBuilder;
pub use self::core::Application;
pub use services::ApplicationServices;
