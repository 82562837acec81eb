use std::sync::Arc;

use crate::domain::computation::ComputationExecutor;
use crate::domain::ManagerService;
use crate::infrastructure::hypervisor::VirshClient;

/// Application dependencies
pub struct ApplicationServices {
    pub manager: Arc<dyn ManagerService>,
    /// Absent when computations are only registered, not run
    pub executor: Option<ComputationExecutor<VirshClient>>,
}
