pub mod computation;
pub mod errors;
pub mod provisioner;
pub mod service;
pub mod template;

pub use errors::ManagerError;
pub use service::Manager;
pub use service::ManagerService;
