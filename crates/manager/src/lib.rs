pub mod api;
pub mod app;
pub mod cmd;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use domain::computation;
pub use domain::provisioner;
pub use domain::template;
pub use infrastructure::hypervisor;
pub use infrastructure::id_provider;
