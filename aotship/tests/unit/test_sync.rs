//! Sync engine tests

use std::time::{Duration, SystemTime};

use tokio_test::assert_ok;

use aotship::errors::DeployError;
use aotship::models::connection::RemoteLayout;
use aotship::remote::session::RemoteStat;
use aotship::remote::sync::{SyncEngine, EXECUTABLE_MODE};

use crate::support::{fixed_time, profile, write_file, FakeRemote};

fn layout() -> RemoteLayout {
    RemoteLayout::new("/srv", "App")
}

#[tokio::test]
async fn test_sync_uploads_new_file() {
    let tmp = tempfile::tempdir().unwrap();
    write_file(&tmp.path().join("a.txt"), 100, fixed_time());
    let remote = FakeRemote::new();

    let report = assert_ok!(
        SyncEngine::new()
            .sync(&remote, &profile(), tmp.path(), &layout(), true)
            .await
    );

    assert_eq!(report.uploaded, 1);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.uploaded_files, vec!["/srv/App/a.txt"]);
    remote.with(|s| {
        assert_eq!(s.connects, 1);
        assert_eq!(s.ends, 1);
        assert!(s.dirs.contains("/srv/App"));
        assert_eq!(s.chmods, vec![("/srv/App/App".to_string(), EXECUTABLE_MODE)]);
    });
    // No executable was shipped, so the chmod is only a warning
    assert_eq!(report.warnings.len(), 1);
}

#[tokio::test]
async fn test_sync_skips_unchanged_file() {
    let tmp = tempfile::tempdir().unwrap();
    write_file(&tmp.path().join("a.txt"), 100, fixed_time());
    let remote = FakeRemote::new();
    let mtime = fixed_time()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs();
    remote.with(|s| {
        s.files
            .insert("/srv/App/a.txt".to_string(), RemoteStat { size: 100, mtime })
    });

    let report = assert_ok!(
        SyncEngine::new()
            .sync(&remote, &profile(), tmp.path(), &layout(), true)
            .await
    );

    assert_eq!(report.uploaded, 0);
    assert_eq!(report.skipped, 1);
    remote.with(|s| {
        assert!(s.puts.is_empty());
        // Permissions are fixed up even when nothing was uploaded
        assert_eq!(s.chmods.len(), 1);
        assert_eq!(s.ends, 1);
    });
}

#[tokio::test]
async fn test_sync_size_mismatch_uploads() {
    let tmp = tempfile::tempdir().unwrap();
    write_file(&tmp.path().join("a.txt"), 100, fixed_time());
    let remote = FakeRemote::new();
    let mtime = fixed_time()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs();
    remote.with(|s| {
        s.files
            .insert("/srv/App/a.txt".to_string(), RemoteStat { size: 99, mtime })
    });

    let report = assert_ok!(
        SyncEngine::new()
            .sync(&remote, &profile(), tmp.path(), &layout(), true)
            .await
    );
    assert_eq!(report.uploaded, 1);
}

#[tokio::test]
async fn test_incremental_sync_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    write_file(&tmp.path().join("App"), 2048, fixed_time());
    write_file(&tmp.path().join("App.pdb"), 512, fixed_time());
    write_file(&tmp.path().join("runtimes").join("libe_sqlite3.so"), 300, fixed_time());
    let remote = FakeRemote::new();
    let engine = SyncEngine::new();

    let first = assert_ok!(engine.sync(&remote, &profile(), tmp.path(), &layout(), true).await);
    assert_eq!(first.uploaded, 3);
    assert!(first.warnings.is_empty());

    let second = assert_ok!(engine.sync(&remote, &profile(), tmp.path(), &layout(), true).await);
    assert_eq!(second.uploaded, 0);
    assert_eq!(second.skipped, 3);

    remote.with(|s| {
        assert_eq!(s.connects, 2);
        assert_eq!(s.ends, 2);
        assert!(s.dirs.contains("/srv/App/runtimes"));
        assert!(s.files.contains_key("/srv/App/runtimes/libe_sqlite3.so"));
    });
}

#[tokio::test]
async fn test_touched_file_is_reuploaded() {
    let tmp = tempfile::tempdir().unwrap();
    write_file(&tmp.path().join("App"), 2048, fixed_time());
    write_file(&tmp.path().join("appsettings.json"), 64, fixed_time());
    let remote = FakeRemote::new();
    let engine = SyncEngine::new();
    assert_ok!(engine.sync(&remote, &profile(), tmp.path(), &layout(), true).await);

    // Same size, strictly newer than the upload
    let later = SystemTime::now() + Duration::from_secs(3600);
    write_file(&tmp.path().join("appsettings.json"), 64, later);

    let report = assert_ok!(engine.sync(&remote, &profile(), tmp.path(), &layout(), true).await);
    assert_eq!(report.uploaded_files, vec!["/srv/App/appsettings.json"]);
    assert_eq!(report.skipped, 1);
}

#[tokio::test]
async fn test_full_sync_uploads_everything() {
    let tmp = tempfile::tempdir().unwrap();
    write_file(&tmp.path().join("App"), 10, fixed_time());
    write_file(&tmp.path().join("b.txt"), 10, fixed_time());
    let remote = FakeRemote::new();
    let engine = SyncEngine::new();

    assert_ok!(engine.sync(&remote, &profile(), tmp.path(), &layout(), true).await);
    let report = assert_ok!(engine.sync(&remote, &profile(), tmp.path(), &layout(), false).await);
    assert_eq!(report.uploaded, 2);
    assert_eq!(report.skipped, 0);
}

#[tokio::test]
async fn test_put_failure_closes_session_once() {
    let tmp = tempfile::tempdir().unwrap();
    for name in ["a.bin", "b.bin", "c.bin", "d.bin", "e.bin"] {
        write_file(&tmp.path().join(name), 10, fixed_time());
    }
    let remote = FakeRemote::new();
    remote.with(|s| s.fail_put_on = Some(3));

    let err = SyncEngine::new()
        .sync(&remote, &profile(), tmp.path(), &layout(), true)
        .await
        .unwrap_err();

    match &err {
        DeployError::Transfer { path, .. } => assert_eq!(path, "/srv/App/c.bin"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("c.bin"));
    remote.with(|s| {
        assert_eq!(s.ends, 1);
        assert_eq!(s.puts.len(), 3);
        // Earlier uploads are not rolled back
        assert!(s.files.contains_key("/srv/App/a.bin"));
        assert!(s.files.contains_key("/srv/App/b.bin"));
        assert!(s.chmods.is_empty());
    });
}

#[tokio::test]
async fn test_missing_local_root_fails_before_connect() {
    let tmp = tempfile::tempdir().unwrap();
    let remote = FakeRemote::new();

    let err = SyncEngine::new()
        .sync(&remote, &profile(), &tmp.path().join("nope"), &layout(), true)
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::Validation(_)));
    remote.with(|s| assert_eq!(s.connects, 0));
}

#[tokio::test]
async fn test_connect_failure_skips_close() {
    let tmp = tempfile::tempdir().unwrap();
    write_file(&tmp.path().join("a.txt"), 1, fixed_time());
    let remote = FakeRemote::new();
    remote.with(|s| s.fail_connect = true);

    let err = SyncEngine::new()
        .sync(&remote, &profile(), tmp.path(), &layout(), true)
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::Connection(_)));
    remote.with(|s| {
        assert_eq!(s.ends, 0);
        assert!(s.puts.is_empty());
    });
}

#[tokio::test]
async fn test_mkdir_failure_aborts_and_closes_once() {
    let tmp = tempfile::tempdir().unwrap();
    write_file(&tmp.path().join("App"), 10, fixed_time());
    write_file(&tmp.path().join("runtimes").join("native.so"), 10, fixed_time());
    let remote = FakeRemote::new();
    remote.with(|s| s.fail_mkdir_on = Some("/srv/App/runtimes".to_string()));

    let err = SyncEngine::new()
        .sync(&remote, &profile(), tmp.path(), &layout(), true)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("/srv/App/runtimes"));
    remote.with(|s| {
        assert_eq!(s.connects, 1);
        assert_eq!(s.ends, 1);
        assert!(!s.puts.contains(&"/srv/App/runtimes/native.so".to_string()));
        assert!(s.chmods.is_empty());
    });
}

#[tokio::test]
async fn test_end_failure_is_warning() {
    let tmp = tempfile::tempdir().unwrap();
    write_file(&tmp.path().join("App"), 10, fixed_time());
    let remote = FakeRemote::new();
    remote.with(|s| s.fail_end = true);

    let report = assert_ok!(
        SyncEngine::new()
            .sync(&remote, &profile(), tmp.path(), &layout(), true)
            .await
    );

    assert_eq!(report.uploaded, 1);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("closing session"));
    remote.with(|s| assert_eq!(s.ends, 1));
}
