use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::ApiServer;
use crate::app::core::Application;

/// Task manager, responsible for starting and managing all background tasks
pub struct Tasks {
    pub tasks: Vec<JoinHandle<Result<()>>>,
    cancellation_token: CancellationToken,
}

impl Tasks {
    pub fn new(cancellation_token: CancellationToken) -> Self {
        Self {
            tasks: Vec::new(),
            cancellation_token,
        }
    }

    /// Start all background tasks
    pub fn spawn_all_tasks(&mut self, app: &Application) {
        let api_server_task = self.spawn_api_server_task(app);
        self.tasks.push(api_server_task);
    }

    /// wait for tasks to complete or receive shutdown signal
    pub async fn wait_for_completion(&mut self) -> Result<()> {
        let signal_handler = {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = signal(SignalKind::terminate())?;
            let mut sigint = signal(SignalKind::interrupt())?;

            tokio::spawn(async move {
                tokio::select! {
                    _ = sigterm.recv() => {
                        tracing::info!("Received SIGTERM, initiating graceful shutdown");
                    }
                    _ = sigint.recv() => {
                        tracing::info!("Received SIGINT, initiating graceful shutdown");
                    }
                }
            })
        };

        tokio::select! {
            _ = signal_handler => {
                tracing::info!("Shutdown signal received, cancelling all tasks");
                self.cancellation_token.cancel();

                self.wait_for_tasks_with_timeout(Duration::from_secs(30)).await;
            }
            // Wait for any task to complete unexpectedly
            result = futures::future::select_all(&mut self.tasks) => {
                let (result, _index, _remaining) = result;
                match result {
                    Err(e) => {
                        tracing::error!("Task panicked or was aborted: {e}");
                        return Err(e.into());
                    }
                    Ok(Err(e)) => {
                        tracing::error!("Task completed with error: {e}");
                        return Err(e);
                    }
                    Ok(Ok(())) => tracing::warn!("Task completed unexpectedly"),
                }
            }
        }

        Ok(())
    }

    async fn wait_for_tasks_with_timeout(&mut self, timeout: Duration) {
        tokio::time::timeout(timeout, async {
            for task in &mut self.tasks {
                match task.await {
                    Err(e) => tracing::error!("Task failed during shutdown: {e}"),
                    Ok(Err(e)) => tracing::error!("Task failed during shutdown: {e}"),
                    Ok(Ok(())) => {}
                }
            }
        })
        .await
        .unwrap_or_else(|_| {
            tracing::warn!("Task shutdown timed out after {:?}", timeout);
        });
    }

    fn spawn_api_server_task(&self, app: &Application) -> JoinHandle<Result<()>> {
        let args = app.serve_args();
        let api_server = ApiServer::new(
            app.services().manager.clone(),
            args.listen_addr.clone(),
            args.secret.clone(),
        );
        let token = self.cancellation_token.clone();

        tokio::spawn(async move {
            api_server
                .run(token)
                .await
                .map_err(|report| anyhow::anyhow!("API server failed: {report:?}"))?;
            tracing::info!("API server completed");
            Ok(())
        })
    }
}
