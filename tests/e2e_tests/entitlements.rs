//! Entitlement access stories
//!
//! RHEL entitlements land in the cluster as the `etc-pki-entitlement` secret in
//! `openshift-config-managed`. These tests check that workloads can consume
//! it: first a plain pod mounting the secret, then a Shipwright build reading
//! it through a SharedSecret and the Shared Resource CSI driver.

use builds_e2e::config::E2eConfig;
use builds_e2e::manifest::apply_file;
use builds_e2e::scenario::{Expectation, Scenario};
use builds_e2e::{Condition, PollSpec};
use tokio_util::sync::CancellationToken;

use super::helpers::setup;

/// Secret the cluster syncs the entitlement certificates into
const ENTITLEMENT_SECRET: &str = "etc-pki-entitlement";
/// Pod that installs entitled RHEL packages from the mounted secret
const TEST_POD: &str = "etc-pki-entitlement-test";
/// BuildRun that installs entitled RHEL packages through a shared secret
const ENTITLED_BUILD_RUN: &str = "entitled-br";

/// Fixtures for the shared-secret story, in apply order
const SHARED_SECRET_FIXTURES: &[&str] = &[
    "image-stream.yaml",
    "shared-secret.yaml",
    "shared-secret-cluster-role.yaml",
    "shared-secret-csi-role.yaml",
    "csi-driver-role-bind.yaml",
    "pipeline-builder-role-bind.yaml",
    "entitled-build.yaml",
];

fn secret_exists(config: &E2eConfig) -> builds_e2e::Result<Expectation> {
    Ok(Expectation::new(
        &config.entitlement_namespace,
        ENTITLEMENT_SECRET,
        Condition::SecretExistence,
        config.poll_spec(PollSpec::existence())?,
    ))
}

/// Story: a pod mounting the entitlement secret can install entitled content
///
/// Expected behavior:
/// - The entitlement secret becomes visible within the existence window
/// - The test pod runs to phase Succeeded
/// - A pod that ends in phase Failed fails the test immediately, it does not
///   wait out the timeout
#[tokio::test]
#[ignore = "requires an OpenShift cluster - run with: cargo test --test e2e -- --ignored"]
async fn story_pod_accesses_entitled_rhel_content() {
    let (config, client) = setup().await.expect("failed to set up e2e environment");
    let cancel = CancellationToken::new();
    let pod_manifest = config.data_path("entitlement-test-pod.yaml");

    let scenario = Scenario::new("pod-entitlement-access", client.clone())
        .cleanup_only(pod_manifest.clone());

    let (config, client, cancel, pod_manifest) = (&config, &client, &cancel, &pod_manifest);
    scenario
        .run(|| async move {
            secret_exists(config)?.eventually(client, cancel).await?;

            apply_file(client, pod_manifest).await?;

            let report = Expectation::new(
                &config.entitlement_namespace,
                TEST_POD,
                Condition::PodCompletion,
                config.poll_spec(PollSpec::resource_completion())?,
            )
            .eventually(client, cancel)
            .await?;

            tracing::info!(attempts = report.attempts, "entitled access in pod completed");
            Ok(())
        })
        .await
        .expect("pod entitlement scenario failed");
}

/// Story: a Shipwright build reads entitlements through a shared secret
///
/// The SharedSecret exposes `etc-pki-entitlement` cluster-wide; RBAC lets the
/// CSI driver read it and the pipeline service account use it. The build
/// mounts it with the Shared Resource CSI driver.
///
/// Expected behavior:
/// - All RBAC, shared secret and build fixtures apply cleanly
/// - The BuildRun completes successfully
/// - A failed BuildRun fails the test immediately with its failure reason and
///   message
#[tokio::test]
#[ignore = "requires an OpenShift cluster - run with: cargo test --test e2e -- --ignored"]
async fn story_build_accesses_entitled_content_via_shared_secret() {
    let (config, client) = setup().await.expect("failed to set up e2e environment");
    let cancel = CancellationToken::new();
    let build_run_manifest = config.data_path("entitled-buildrun.yaml");

    let scenario = SHARED_SECRET_FIXTURES.iter().fold(
        Scenario::new("shared-secret-entitlement-access", client.clone())
            .cleanup_only(build_run_manifest.clone()),
        |scenario, file| scenario.fixture(config.data_path(file)),
    );

    let (config, client, cancel, build_run_manifest) =
        (&config, &client, &cancel, &build_run_manifest);
    scenario
        .run(|| async move {
            secret_exists(config)?.eventually(client, cancel).await?;

            apply_file(client, build_run_manifest).await?;

            let report = Expectation::new(
                &config.builds_namespace,
                ENTITLED_BUILD_RUN,
                Condition::BuildRunCompletion,
                config.poll_spec(PollSpec::resource_completion())?,
            )
            .eventually(client, cancel)
            .await?;

            tracing::info!(attempts = report.attempts, "BuildRun completed successfully");
            Ok(())
        })
        .await
        .expect("shared secret entitlement scenario failed");
}

/// Every fixture the suite references ships with the crate
#[test]
fn fixtures_are_present_and_parse() {
    let config = E2eConfig::default();
    let files = SHARED_SECRET_FIXTURES
        .iter()
        .copied()
        .chain(["entitlement-test-pod.yaml", "entitled-buildrun.yaml"]);

    for file in files {
        let path = config.data_path(file);
        let content = std::fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("missing fixture {}: {}", path.display(), e));
        let manifests = builds_e2e::manifest::parse_manifests(&content)
            .unwrap_or_else(|e| panic!("invalid fixture {}: {}", path.display(), e));
        assert!(!manifests.is_empty(), "{} has no documents", file);
    }
}
