//! Deploy sequencer tests

use std::path::{Path, PathBuf};

use aotship::deploy::fsm::DeployState;
use aotship::deploy::request::DeployRequest;
use aotship::deploy::sequencer::Deployer;
use aotship::models::connection::{DeployTarget, RemoteLayout};
use aotship::models::outcome::{DeployStage, PipelinePhase};
use aotship::models::target::{Arch, BuildTarget, HostPlatform, OsFamily};
use aotship::storage::settings::ToolchainSettings;

use crate::support::{drain_phases, fixed_time, profile, publish_options, write_file, TestContext};

fn host() -> HostPlatform {
    HostPlatform {
        os: OsFamily::Linux,
        arch: Arch::X64,
    }
}

fn request(project_dir: &Path, output_dir: &Path, target: DeployTarget) -> DeployRequest {
    DeployRequest {
        target,
        publish: publish_options(project_dir, output_dir, BuildTarget::new(OsFamily::Linux, Arch::X64)),
        toolchain: ToolchainSettings::default(),
        connection: match target {
            DeployTarget::Local => None,
            DeployTarget::Server => Some(profile()),
        },
        layout: RemoteLayout::new("/srv", "App"),
        start_command: "sudo systemctl restart {app_name} && ls {app_path}".to_string(),
        incremental: true,
        clean_destination: false,
        webhook_url: None,
    }
}

#[tokio::test]
async fn test_local_deploy() {
    let mut t = TestContext::new(host()).await;
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("out");

    let deployer = Deployer::new(&t.ctx);
    let result = deployer
        .deploy(&request(tmp.path(), &out, DeployTarget::Local))
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.stage, DeployStage::Done);
    assert_eq!(result.output_path, Some(out));
    assert_eq!(deployer.state().await, DeployState::Done);
    t.remote.with(|s| assert_eq!(s.connects, 0));

    let phases = drain_phases(&mut t.events);
    assert_eq!(phases, vec![PipelinePhase::Compile]);
}

#[tokio::test]
async fn test_local_deploy_cleans_destination() {
    let t = TestContext::new(host()).await;
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("out");
    write_file(&out.join("stale.dll"), 10, fixed_time());

    let mut req = request(tmp.path(), &out, DeployTarget::Local);
    req.clean_destination = true;
    let result = Deployer::new(&t.ctx).deploy(&req).await;

    assert!(result.success);
    assert!(!out.join("stale.dll").exists());
}

#[tokio::test]
async fn test_server_deploy() {
    let mut t = TestContext::new(host()).await;
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("out");
    write_file(&out.join("App"), 4096, fixed_time());
    write_file(&out.join("appsettings.json"), 100, fixed_time());

    let deployer = Deployer::new(&t.ctx);
    let result = deployer
        .deploy(&request(tmp.path(), &out, DeployTarget::Server))
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.output_path, Some(PathBuf::from("/srv/App")));
    assert!(result.warnings.is_empty());
    assert_eq!(deployer.state().await, DeployState::Done);

    t.remote.with(|s| {
        assert_eq!(s.puts, vec!["/srv/App/App", "/srv/App/appsettings.json"]);
        assert_eq!(
            s.execs,
            vec!["sudo systemctl restart App && ls /srv/App/App".to_string()]
        );
        assert_eq!(s.connects, s.ends);
    });
    assert!(t.output.contents().contains("service restarted"));

    let phases = drain_phases(&mut t.events);
    assert_eq!(
        phases,
        vec![PipelinePhase::Publish, PipelinePhase::Upload, PipelinePhase::Start]
    );
}

#[tokio::test]
async fn test_publish_failure_stops_deploy() {
    let t = TestContext::new(host()).await;
    t.runner.set_exit("dotnet", 1);
    let tmp = tempfile::tempdir().unwrap();

    let deployer = Deployer::new(&t.ctx);
    let result = deployer
        .deploy(&request(tmp.path(), &tmp.path().join("out"), DeployTarget::Server))
        .await;

    assert!(!result.success);
    assert_eq!(result.stage, DeployStage::Publish);
    assert_eq!(result.error.as_deref(), Some("publish failed: dotnet failed"));
    assert_eq!(deployer.state().await, DeployState::Failed);
    t.remote.with(|s| assert_eq!(s.connects, 0));
}

#[tokio::test]
async fn test_upload_failure() {
    let t = TestContext::new(host()).await;
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("out");
    write_file(&out.join("App"), 10, fixed_time());
    t.remote.with(|s| s.fail_connect = true);

    let result = Deployer::new(&t.ctx)
        .deploy(&request(tmp.path(), &out, DeployTarget::Server))
        .await;

    assert!(!result.success);
    assert_eq!(result.stage, DeployStage::Upload);
    assert!(result.error.unwrap().starts_with("upload failed: "));
    t.remote.with(|s| assert!(s.execs.is_empty()));
}

#[tokio::test]
async fn test_start_failure_is_distinct() {
    let t = TestContext::new(host()).await;
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("out");
    write_file(&out.join("App"), 10, fixed_time());
    t.remote.with(|s| s.exit_code = 3);

    let deployer = Deployer::new(&t.ctx);
    let result = deployer
        .deploy(&request(tmp.path(), &out, DeployTarget::Server))
        .await;

    assert!(!result.success);
    assert_eq!(result.stage, DeployStage::Start);
    let error = result.error.unwrap();
    assert!(error.starts_with("start failed: "));
    assert!(error.contains("exit code 3"));
    assert_eq!(deployer.state().await, DeployState::Failed);

    // The artifact is in place even though the service did not start
    t.remote.with(|s| assert!(s.files.contains_key("/srv/App/App")));
}

#[tokio::test]
async fn test_server_deploy_without_profile() {
    let t = TestContext::new(host()).await;
    let tmp = tempfile::tempdir().unwrap();

    let mut req = request(tmp.path(), tmp.path(), DeployTarget::Server);
    req.connection = None;
    let result = Deployer::new(&t.ctx).deploy(&req).await;

    assert!(!result.success);
    assert_eq!(result.stage, DeployStage::Config);
    assert_eq!(t.runner.calls().len(), 0);
}
