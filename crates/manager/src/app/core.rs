use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::app::services::ApplicationServices;
use crate::app::tasks::Tasks;
use crate::config::ServeArgs;

/// Application core structure with explicit dependencies
pub struct Application {
    services: ApplicationServices,
    serve_args: ServeArgs,
    cancellation_token: CancellationToken,
}

impl Application {
    pub fn new(
        services: ApplicationServices,
        serve_args: ServeArgs,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            services,
            serve_args,
            cancellation_token,
        }
    }

    pub fn services(&self) -> &ApplicationServices {
        &self.services
    }

    pub fn serve_args(&self) -> &ServeArgs {
        &self.serve_args
    }

    /// Run application, start all tasks and wait for completion
    pub async fn run(&self) -> Result<()> {
        tracing::info!("Starting all application tasks...");

        let mut tasks = Tasks::new(self.cancellation_token.clone());
        tasks.spawn_all_tasks(self);

        if let Err(e) = tasks.wait_for_completion().await {
            tracing::error!("Error during task execution: {}", e);
            return Err(e);
        }

        tracing::info!("Application run completed");
        Ok(())
    }

    /// Gracefully shutdown application, cancelling every running computation
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Shutting down application...");

        self.cancellation_token.cancel();
        if let Some(executor) = &self.services.executor {
            executor.shutdown().await;
        }

        tracing::info!("Application shutdown completed");
        Ok(())
    }
}
