//! Integration tests for the manager's HTTP API

use std::sync::Arc;
use std::time::Duration;

use api_types::ComputationInfo;
use api_types::ComputationStatus;
use api_types::CreateDomainResponse;
use api_types::ErrorResponse;
use api_types::RunResponse;
use error_stack::Report;
use manager::api::routes;
use manager::computation::ComputationExecutor;
use manager::computation::ComputationStore;
use manager::computation::ExecutorConfig;
use manager::computation::LifecycleManager;
use manager::domain::Manager;
use manager::domain::ManagerService;
use manager::hypervisor::DomainState;
use manager::hypervisor::MockHypervisor;
use manager::id_provider::IdError;
use manager::id_provider::IdProvider;
use manager::id_provider::UuidProvider;
use manager::provisioner::DomainProvisioner;
use manager::template::TemplateResolver;
use poem::http::StatusCode;
use poem::test::TestClient;
use poem::Endpoint;
use serde_json::json;
use similar_asserts::assert_eq;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const POOL_XML: &str = "<pool type='dir'>\n  <name>cocos-{{COMPUTATION_ID}}</name>\n  <target><path>./img</path></target>\n</pool>\n";
const VOL_XML: &str = "<volume>\n  <name>boot.img</name>\n</volume>\n";
const DOM_XML: &str = "<domain type='kvm'>\n  <name>cocos-{{COMPUTATION_ID}}</name>\n</domain>\n";

struct FailingProvider;

impl IdProvider for FailingProvider {
    fn id(&self) -> Result<String, Report<IdError>> {
        Err(Report::new(IdError::Exhausted {
            message: "no entropy".to_string(),
        }))
    }
}

struct TestHarness<E: Endpoint> {
    _dir: TempDir,
    hypervisor: MockHypervisor,
    executor: Option<ComputationExecutor<MockHypervisor>>,
    client: TestClient<E>,
}

fn template_dir() -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    let xml = dir.path().join("xml");
    std::fs::create_dir_all(&xml).expect("xml dir");
    std::fs::write(xml.join("pool.xml"), POOL_XML).expect("pool template");
    std::fs::write(xml.join("vol.xml"), VOL_XML).expect("volume template");
    std::fs::write(xml.join("dom.xml"), DOM_XML).expect("domain template");
    dir
}

struct Options {
    ids: Arc<dyn IdProvider>,
    run_computations: bool,
    secret: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            ids: Arc::new(UuidProvider),
            run_computations: false,
            secret: None,
        }
    }
}

fn harness(options: Options) -> TestHarness<impl Endpoint> {
    let dir = template_dir();
    let hypervisor = MockHypervisor::new();
    let provisioner = Arc::new(DomainProvisioner::new(
        TemplateResolver::new(dir.path()),
        Arc::new(hypervisor.clone()),
    ));
    let store = Arc::new(ComputationStore::new());

    let mut lifecycle = LifecycleManager::new(options.ids, Arc::clone(&store));
    let executor = options.run_computations.then(|| {
        ComputationExecutor::new(
            Arc::clone(&provisioner),
            Arc::clone(&store),
            ExecutorConfig {
                poll_interval: Duration::from_millis(10),
                ..Default::default()
            },
            CancellationToken::new(),
        )
    });
    if let Some(executor) = &executor {
        lifecycle = lifecycle.with_executor(executor.clone());
    }

    let service: Arc<dyn ManagerService> =
        Arc::new(Manager::new(provisioner, lifecycle, Duration::from_secs(5)));

    TestHarness {
        _dir: dir,
        hypervisor,
        executor,
        client: TestClient::new(routes(service, options.secret)),
    }
}

fn run_body() -> serde_json::Value {
    json!({
        "name": "census",
        "description": "average income per district",
        "owner": "alice",
        "datasets": ["dataset-1", "dataset-2"],
        "algorithms": ["algorithm-1"],
        "dataset_providers": ["bob"],
        "algorithm_providers": ["carol"],
        "result_consumers": ["dave"],
        "ttl": 60
    })
}

#[tokio::test]
async fn create_domain_with_default_templates() {
    let harness = harness(Options::default());

    let resp = harness
        .client
        .post("/api/v1/domains")
        .body_json(&json!({}))
        .send()
        .await;

    resp.assert_status_is_ok();
    let body: CreateDomainResponse = resp.json().await.value().deserialize();
    assert_eq!(body.name, "domain-3");
    assert_eq!(
        harness.hypervisor.operations(),
        vec!["create_storage_pool", "create_volume", "define_and_start_domain"]
    );
}

#[tokio::test]
async fn create_domain_with_missing_pool_template() {
    let harness = harness(Options::default());

    let resp = harness
        .client
        .post("/api/v1/domains")
        .body_json(&json!({ "pool": "xml/missing.xml" }))
        .send()
        .await;

    resp.assert_status(StatusCode::BAD_REQUEST);
    let body: ErrorResponse = resp.json().await.value().deserialize();
    assert_eq!(body.error, "malformed entity specification");
    assert!(harness.hypervisor.calls().is_empty());
}

#[tokio::test]
async fn hypervisor_failure_is_a_bad_request() {
    let harness = harness(Options::default());
    harness.hypervisor.fail_on("define_and_start_domain");

    let resp = harness
        .client
        .post("/api/v1/domains")
        .body_json(&json!({}))
        .send()
        .await;

    resp.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(
        harness.hypervisor.operations(),
        vec![
            "create_storage_pool",
            "create_volume",
            "define_and_start_domain",
            "delete_volume",
            "destroy_storage_pool"
        ]
    );
}

#[tokio::test]
async fn submitted_computation_is_created() {
    let harness = harness(Options::default());

    let resp = harness
        .client
        .post("/api/v1/computations")
        .body_json(&run_body())
        .send()
        .await;
    resp.assert_status_is_ok();
    let RunResponse { id } = resp.json().await.value().deserialize::<RunResponse>();
    assert!(!id.is_empty());

    let resp = harness
        .client
        .get(format!("/api/v1/computations/{id}"))
        .send()
        .await;
    resp.assert_status_is_ok();
    let info: ComputationInfo = resp.json().await.value().deserialize();
    assert_eq!(info.id, id);
    assert_eq!(info.status, ComputationStatus::Created);
    assert_eq!(info.datasets.len(), 2);
    assert_eq!(info.ttl, 60);
    assert!(info.start_time.is_none());
    assert!(info.end_time.is_none());

    let resp = harness.client.get("/api/v1/computations").send().await;
    resp.assert_status_is_ok();
    let all: Vec<ComputationInfo> = resp.json().await.value().deserialize();
    assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn computation_without_datasets_is_rejected() {
    let harness = harness(Options::default());
    let mut body = run_body();
    body["datasets"] = json!([]);

    let resp = harness
        .client
        .post("/api/v1/computations")
        .body_json(&body)
        .send()
        .await;

    resp.assert_status(StatusCode::BAD_REQUEST);
    let resp = harness.client.get("/api/v1/computations").send().await;
    let all: Vec<ComputationInfo> = resp.json().await.value().deserialize();
    assert!(all.is_empty());
}

#[tokio::test]
async fn computation_with_oversized_ttl_is_rejected() {
    let harness = harness(Options::default());
    let mut body = run_body();
    body["ttl"] = json!(u64::MAX);

    let resp = harness
        .client
        .post("/api/v1/computations")
        .body_json(&body)
        .send()
        .await;

    resp.assert_status(StatusCode::BAD_REQUEST);
    let body: ErrorResponse = resp.json().await.value().deserialize();
    assert_eq!(body.error, "malformed entity specification");
}

#[tokio::test]
async fn identifier_failure_is_an_internal_error() {
    let harness = harness(Options {
        ids: Arc::new(FailingProvider),
        ..Default::default()
    });

    let resp = harness
        .client
        .post("/api/v1/computations")
        .body_json(&run_body())
        .send()
        .await;

    resp.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: ErrorResponse = resp.json().await.value().deserialize();
    assert_eq!(body.error, "failed to assign an identifier to the computation");
}

#[tokio::test]
async fn unknown_computation_is_not_found() {
    let harness = harness(Options::default());

    let resp = harness
        .client
        .get("/api/v1/computations/does-not-exist")
        .send()
        .await;

    resp.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn secret_is_required_when_configured() {
    let harness = harness(Options {
        secret: Some("s3cret".to_string()),
        ..Default::default()
    });

    harness
        .client
        .get("/api/v1/computations")
        .send()
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
    harness
        .client
        .get("/api/v1/computations")
        .header("Authorization", "Bearer s3cret")
        .send()
        .await
        .assert_status_is_ok();
}

#[test_log::test(tokio::test)]
async fn submitted_computation_runs_to_completion() {
    let harness = harness(Options {
        run_computations: true,
        ..Default::default()
    });
    harness.hypervisor.script_domain_states(
        "domain-3",
        vec![DomainState::Running, DomainState::ShutOff],
    );

    let resp = harness
        .client
        .post("/api/v1/computations")
        .body_json(&run_body())
        .send()
        .await;
    resp.assert_status_is_ok();
    let RunResponse { id } = resp.json().await.value().deserialize::<RunResponse>();

    harness
        .executor
        .as_ref()
        .expect("executor attached")
        .wait_idle()
        .await;

    let resp = harness
        .client
        .get(format!("/api/v1/computations/{id}"))
        .send()
        .await;
    let info: ComputationInfo = resp.json().await.value().deserialize();
    assert_eq!(info.status, ComputationStatus::Completed);
    assert_eq!(info.domain.as_deref(), Some("domain-3"));
    assert!(info.start_time.is_some());
    assert!(info.end_time >= info.start_time);

    let ops = harness.hypervisor.operations();
    assert_eq!(
        &ops[ops.len() - 3..],
        &["destroy_domain", "delete_volume", "destroy_storage_pool"][..]
    );
}
