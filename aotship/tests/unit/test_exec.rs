//! Remote executor tests

use aotship::context::BufferSink;
use aotship::errors::DeployError;
use aotship::models::connection::RemoteLayout;
use aotship::remote::exec::{RemoteExecutor, TemplateVars};

use crate::support::{profile, FakeRemote};

fn vars() -> TemplateVars {
    TemplateVars::for_layout(&RemoteLayout::new("/srv", "App"))
}

#[tokio::test]
async fn test_connect_failure_skips_exec() {
    let remote = FakeRemote::new();
    remote.with(|s| s.fail_connect = true);
    let sink = BufferSink::new();

    let err = RemoteExecutor::new()
        .run(&remote, &profile(), "systemctl restart {app_name}", &vars(), &sink)
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::Connection(_)));
    remote.with(|s| {
        assert!(s.execs.is_empty());
        assert_eq!(s.ends, 0);
    });
    assert!(sink.contents().is_empty());
}

#[tokio::test]
async fn test_exec_closes_session_on_nonzero_exit() {
    let remote = FakeRemote::new();
    remote.with(|s| s.exit_code = 1);
    let sink = BufferSink::new();

    let err = RemoteExecutor::new()
        .run(&remote, &profile(), "{app_path} --check", &vars(), &sink)
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::RemoteExec(_)));
    remote.with(|s| {
        assert_eq!(s.execs, vec!["/srv/App/App --check".to_string()]);
        assert_eq!(s.ends, 1);
    });
}
