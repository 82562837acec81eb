use std::sync::Arc;
use std::time::Duration;

use error_stack::Report;
use poem::get;
use poem::listener::TcpListener;
use poem::middleware::Tracing;
use poem::post;
use poem::Endpoint;
use poem::EndpointExt;
use poem::Route;
use poem::Server;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;

use super::auth::SecretAuthMiddleware;
use super::errors::ApiError;
use super::handlers::create_domain;
use super::handlers::get_computation;
use super::handlers::list_computations;
use super::handlers::run_computation;
use crate::domain::ManagerService;

/// In-flight requests get this long to finish once shutdown started
const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Builds the manager's routes.
pub fn routes(service: Arc<dyn ManagerService>, secret: Option<String>) -> impl Endpoint {
    Route::new()
        .at("/api/v1/domains", post(create_domain))
        .at(
            "/api/v1/computations",
            post(run_computation).get(list_computations),
        )
        .at("/api/v1/computations/:id", get(get_computation))
        .data(service)
        .with(SecretAuthMiddleware::new(secret))
        .with(Tracing)
}

/// HTTP API server of the computation manager
pub struct ApiServer {
    service: Arc<dyn ManagerService>,
    listen_addr: String,
    secret: Option<String>,
}

impl ApiServer {
    pub fn new(
        service: Arc<dyn ManagerService>,
        listen_addr: String,
        secret: Option<String>,
    ) -> Self {
        Self {
            service,
            listen_addr,
            secret,
        }
    }

    /// Serves until `cancellation` fires.
    ///
    /// # Errors
    ///
    /// - [`ApiError::ServerError`] if the server fails to start or bind to the address
    pub async fn run(self, cancellation: CancellationToken) -> Result<(), Report<ApiError>> {
        info!("Starting HTTP API server on {}", self.listen_addr);
        if self.secret.as_deref().is_some_and(|s| !s.is_empty()) {
            info!("Bearer secret authentication enabled");
        }

        let app = routes(self.service, self.secret);
        let listener = TcpListener::bind(&self.listen_addr);

        let result = Server::new(listener)
            .run_with_graceful_shutdown(
                app,
                cancellation.cancelled_owned(),
                Some(GRACEFUL_SHUTDOWN_TIMEOUT),
            )
            .await;

        match result {
            Ok(()) => {
                info!("API server stopped");
                Ok(())
            }
            Err(e) => {
                error!("API server failed: {e}");
                Err(Report::new(ApiError::ServerError {
                    message: format!("Server failed: {e}"),
                }))
            }
        }
    }
}
