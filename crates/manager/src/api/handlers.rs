use std::sync::Arc;

use api_types::ComputationInfo;
use api_types::CreateDomainRequest;
use api_types::CreateDomainResponse;
use api_types::RunRequest;
use api_types::RunResponse;
use poem::handler;
use poem::web::Data;
use poem::web::Json;
use poem::web::Path;
use tracing::info;

use super::errors::HttpError;
use crate::domain::computation::ComputationSpec;
use crate::domain::provisioner::DomainTemplates;
use crate::domain::ManagerService;

/// Provision a pool, a volume and a domain from the given templates
#[handler]
pub async fn create_domain(
    service: Data<&Arc<dyn ManagerService>>,
    Json(req): Json<CreateDomainRequest>,
) -> poem::Result<Json<CreateDomainResponse>> {
    let templates = DomainTemplates::from_sources(req.pool, req.volume, req.domain);
    let name = service
        .create_domain(templates)
        .await
        .map_err(HttpError::from)?;

    Ok(Json(CreateDomainResponse { name }))
}

/// Submit a computation
#[handler]
pub async fn run_computation(
    service: Data<&Arc<dyn ManagerService>>,
    Json(req): Json<RunRequest>,
) -> poem::Result<Json<RunResponse>> {
    info!(
        computation = %req.name,
        owner = %req.owner,
        datasets = req.datasets.len(),
        algorithms = req.algorithms.len(),
        ttl_secs = req.ttl,
        "Computation submitted"
    );
    let id = service
        .run(ComputationSpec::from(req))
        .map_err(HttpError::from)?;

    Ok(Json(RunResponse { id }))
}

#[handler]
pub async fn get_computation(
    service: Data<&Arc<dyn ManagerService>>,
    Path(id): Path<String>,
) -> poem::Result<Json<ComputationInfo>> {
    let computation = service.computation(&id).map_err(HttpError::from)?;
    Ok(Json(ComputationInfo::from(&computation)))
}

#[handler]
pub async fn list_computations(
    service: Data<&Arc<dyn ManagerService>>,
) -> Json<Vec<ComputationInfo>> {
    Json(
        service
            .computations()
            .iter()
            .map(ComputationInfo::from)
            .collect(),
    )
}
