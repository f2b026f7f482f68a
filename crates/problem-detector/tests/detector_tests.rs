//! End-to-end runs of the built-in battery against the snapshot backends in
//! `tests/testdata`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use check_engine::{
    CancellationToken, CheckOutcome, Collaborators, FailureKind, FindingKind, InventoryError,
    OverallStatus, RunError, RunReport,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use problem_detector::checks::{datastore, hosts, infrastructure, nodes, permissions, pvs, storage};
use problem_detector::cluster_state::StaticClusterState;
use problem_detector::conditions::{to_conditions, AVAILABLE, DEGRADED};
use problem_detector::inventory::StaticInventory;
use problem_detector::{detect, exit_code, render, DetectorConfig, DetectorError};

fn testdata() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("testdata")
}

fn config() -> DetectorConfig {
    DetectorConfig::load(&testdata().join("config.yaml")).unwrap()
}

fn inventory() -> Arc<StaticInventory> {
    Arc::new(StaticInventory::load(&testdata().join("inventory.yaml")).unwrap())
}

fn cluster() -> Arc<StaticClusterState> {
    Arc::new(StaticClusterState::load(&testdata().join("cluster.yaml")).unwrap())
}

fn collaborators(config: &DetectorConfig, cluster: Arc<StaticClusterState>) -> Collaborators {
    let inventory = inventory();
    Collaborators::new(
        Arc::<StaticInventory>::clone(&inventory),
        inventory,
        cluster,
        config.username.clone(),
    )
}

async fn run(config: &DetectorConfig) -> RunReport {
    detect(config, collaborators(config, cluster()), CancellationToken::new())
        .await
        .unwrap()
}

fn finding_kind(report: &RunReport, check: &str) -> Option<FindingKind> {
    report.get(check).and_then(CheckOutcome::finding).map(|f| f.kind())
}

fn failure_kind(report: &RunReport, check: &str) -> Option<FailureKind> {
    report.get(check).and_then(CheckOutcome::failure).map(|f| f.kind)
}

#[tokio::test]
async fn test_healthy_snapshot_passes_every_check() {
    let report = run(&config()).await;

    assert_eq!(report.len(), problem_detector::checks::BUILTIN_CHECKS.len());
    for (name, entry) in report.iter() {
        assert!(entry.outcome.is_ok(), "{name}: {}", entry.outcome.message());
    }
    assert_eq!(report.summarize(), OverallStatus::Healthy);
    assert_eq!(exit_code(report.summarize()), 0);
}

#[tokio::test]
async fn test_outdated_standalone_host_degrades() {
    let mut config = config();
    config.thresholds.minimum_host_version = "7.0.3".into();
    let report = run(&config).await;

    let finding = report.get(hosts::NAME).unwrap().finding().unwrap();
    assert_eq!(finding.kind(), FindingKind::Warning);
    assert_eq!(finding.affected(), ["DC0_H0 (standalone): 7.0.2"]);
    assert_eq!(report.summarize(), OverallStatus::Degraded);
    assert_eq!(exit_code(report.summarize()), 1);
}

#[tokio::test]
async fn test_inaccessible_default_datastore_fails() {
    let mut config = config();
    config.workspace.default_datastore = "nfs-1".into();
    let report = run(&config).await;

    assert_eq!(finding_kind(&report, datastore::NAME), Some(FindingKind::Error));
    let permissions = report.get(permissions::NAME).unwrap().finding().unwrap();
    assert_eq!(permissions.kind(), FindingKind::Error);
    assert!(permissions
        .affected()
        .contains(&"nfs-1: Datastore.Browse".to_string()));
    assert_eq!(report.summarize(), OverallStatus::Failing);
}

#[tokio::test]
async fn test_missing_default_datastore_is_not_found() {
    let mut config = config();
    config.workspace.default_datastore = "LocalDS_9".into();
    let report = run(&config).await;

    for check in [datastore::NAME, permissions::NAME, hosts::NAME] {
        assert_eq!(failure_kind(&report, check), Some(FailureKind::NotFound), "{check}");
    }
    assert_eq!(finding_kind(&report, pvs::NAME), Some(FindingKind::Ok));
    assert_eq!(report.summarize(), OverallStatus::Degraded);
}

#[tokio::test]
async fn test_low_free_space_threshold() {
    let mut config = config();
    config.thresholds.min_free_space_percent = 50.0;
    let report = run(&config).await;

    let finding = report.get(datastore::NAME).unwrap().finding().unwrap();
    assert_eq!(finding.kind(), FindingKind::Warning);
    assert!(finding.message().contains("40.0% free"));
}

#[tokio::test]
async fn test_readonly_account_misses_privileges() {
    let mut config = config();
    config.username = "readonly@vsphere.local".into();
    let report = run(&config).await;

    let finding = report.get(permissions::NAME).unwrap().finding().unwrap();
    assert_eq!(finding.kind(), FindingKind::Error);
    assert!(finding.affected().contains(&"DC0: System.View".to_string()));
    assert!(!finding.affected().contains(&"DC0: System.Read".to_string()));
    assert_eq!(finding.affected().len(), 2 + 4);
}

#[tokio::test]
async fn test_cluster_state_problems() {
    let cluster = StaticClusterState::from_yaml(
        r#"
infrastructure:
  infrastructureName: my-cluster-id
  platform: AWS
nodes:
  - apiVersion: v1
    kind: Node
    metadata:
      name: worker-0
    spec:
      providerID: aws:///us-east-1a/i-0123456789
  - apiVersion: v1
    kind: Node
    metadata:
      name: worker-1
storageClasses:
  - apiVersion: storage.k8s.io/v1
    kind: StorageClass
    metadata:
      name: stale
    provisioner: csi.vsphere.vmware.com
    parameters:
      datastore: LocalDS_7
persistentVolumes:
  - apiVersion: v1
    kind: PersistentVolume
    metadata:
      name: pvc-broken
    spec:
      vsphereVolume:
        volumePath: "kubevols/pvc-broken.vmdk"
"#,
    )
    .unwrap();
    let config = config();
    let report = detect(
        &config,
        collaborators(&config, Arc::new(cluster)),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    let nodes = report.get(nodes::NAME).unwrap().finding().unwrap();
    assert_eq!(nodes.kind(), FindingKind::Error);
    assert_eq!(nodes.affected().len(), 2);

    let storage = report.get(storage::NAME).unwrap().finding().unwrap();
    assert_eq!(storage.kind(), FindingKind::Warning);
    assert_eq!(storage.affected(), ["stale (LocalDS_7)"]);

    assert_eq!(finding_kind(&report, pvs::NAME), Some(FindingKind::Warning));
    assert_eq!(finding_kind(&report, infrastructure::NAME), Some(FindingKind::Error));
    assert_eq!(report.summarize(), OverallStatus::Failing);
}

#[tokio::test]
async fn test_unreachable_inventory_aborts_run() {
    let config = config();
    let unreachable = Arc::new(StaticInventory::from_yaml("reachable: false\n").unwrap());
    let collaborators = Collaborators::new(
        Arc::<StaticInventory>::clone(&unreachable),
        unreachable,
        cluster(),
        config.username.clone(),
    );

    let result = detect(&config, collaborators, CancellationToken::new()).await;
    assert!(matches!(
        result,
        Err(DetectorError::Run(RunError::Unreachable(InventoryError::Unreachable(_))))
    ));
}

#[tokio::test]
async fn test_disabled_checks_are_not_run() {
    let mut config = config();
    config.checks.disabled = vec![infrastructure::NAME.into(), nodes::NAME.into()];
    let report = run(&config).await;

    assert!(report.get(infrastructure::NAME).is_none());
    assert!(report.get(nodes::NAME).is_none());
    assert_eq!(report.len(), problem_detector::checks::BUILTIN_CHECKS.len() - 2);
}

#[tokio::test]
async fn test_cancelled_run_reports_every_check_cancelled() {
    let config = config();
    let token = CancellationToken::new();
    token.cancel();
    let report = detect(&config, collaborators(&config, cluster()), token)
        .await
        .unwrap();

    for name in problem_detector::checks::BUILTIN_CHECKS {
        assert_eq!(failure_kind(&report, name), Some(FailureKind::Cancelled), "{name}");
    }
    assert_eq!(exit_code(report.summarize()), 2);
}

#[tokio::test]
async fn test_report_outputs() {
    let mut config = config();
    config.thresholds.minimum_host_version = "7.0.3".into();
    let report = run(&config).await;

    let json: serde_json::Value =
        serde_json::from_str(&render::render_json(&report).unwrap()).unwrap();
    assert_eq!(json["status"], "Degraded");
    assert_eq!(json["checks"][hosts::NAME]["kind"], "warning");

    let now = Time(chrono::Utc::now());
    let conditions = to_conditions(&report, &now, Some(1));
    let available = conditions.iter().find(|c| c.type_ == AVAILABLE).unwrap();
    let degraded = conditions.iter().find(|c| c.type_ == DEGRADED).unwrap();
    assert_eq!(available.status, "True");
    assert_eq!(degraded.status, "True");
    let hosts_failed = format!("{}Failed", hosts::NAME);
    assert!(conditions
        .iter()
        .any(|c| c.type_ == hosts_failed && c.status == "True"));
}

#[tokio::test]
async fn test_unparseable_host_version_is_reported_with_the_others() {
    let inventory = Arc::new(
        StaticInventory::from_yaml(
            r"
datacenters:
  - name: DC0
    hosts:
      - name: DC0_H0
        version: seven
      - name: DC0_H1
        version: 6.5.0
      - name: DC0_H2
        version: 8.0.2
    datastores:
      - name: LocalDS_0
        capacity: 100
        free_space: 50
        hosts: [DC0_H0, DC0_H1, DC0_H2]
",
        )
        .unwrap(),
    );
    let mut config = config();
    config.checks.disabled = problem_detector::checks::BUILTIN_CHECKS
        .iter()
        .filter(|name| **name != hosts::NAME)
        .map(|name| (*name).to_string())
        .collect();
    let collaborators = Collaborators::new(
        Arc::<StaticInventory>::clone(&inventory),
        inventory,
        cluster(),
        config.username.clone(),
    );
    let report = detect(&config, collaborators, CancellationToken::new())
        .await
        .unwrap();

    let finding = report.get(hosts::NAME).unwrap().finding().unwrap();
    assert_eq!(finding.kind(), FindingKind::Warning);
    assert_eq!(
        finding.affected(),
        [
            "DC0_H0 (standalone): unparseable version \"seven\"",
            "DC0_H1 (standalone): 6.5.0",
        ]
    );
}
