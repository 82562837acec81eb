pub mod hypervisor;
pub mod id_provider;
pub mod logging;
