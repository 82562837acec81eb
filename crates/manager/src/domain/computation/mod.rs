//! Computation lifecycle: records, their store, the manager accepting them and
//! the executor running them

pub mod executor;
pub mod lifecycle;
pub mod store;
pub mod types;

pub use executor::ComputationExecutor;
pub use executor::ExecutorConfig;
pub use executor::COMPUTATION_ID_PLACEHOLDER;
pub use lifecycle::LifecycleManager;
pub use store::ComputationStore;
pub use types::Computation;
pub use types::ComputationSpec;
pub use types::MAX_TTL;
