//! Publisher tests

use std::path::PathBuf;

use aotship::models::outcome::PipelinePhase;
use aotship::models::target::{Arch, BuildTarget, HostPlatform, OsFamily};
use aotship::publish::package::PackageOptions;
use aotship::publish::publisher::{CompressionOptions, Publisher};
use aotship::storage::settings::ToolchainSettings;

use crate::support::{drain_phases, fixed_time, publish_options, write_file, TestContext};

fn linux_host() -> HostPlatform {
    HostPlatform {
        os: OsFamily::Linux,
        arch: Arch::X64,
    }
}

fn mac_host() -> HostPlatform {
    HostPlatform {
        os: OsFamily::MacOs,
        arch: Arch::Arm64,
    }
}

fn compression() -> Option<CompressionOptions> {
    Some(CompressionOptions {
        upx_path: PathBuf::from("upx"),
        level: 7,
    })
}

fn packaging() -> Option<PackageOptions> {
    Some(PackageOptions {
        app_name: "App".to_string(),
        executable_name: "App".to_string(),
        bundle_id: "com.example.app".to_string(),
        version: "1.0.0".to_string(),
        icon_path: None,
        create_dmg: false,
    })
}

#[tokio::test]
async fn test_build_failure_skips_post_steps() {
    let t = TestContext::new(linux_host()).await;
    t.runner.set_exit("dotnet", 1);
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("out");

    let mut options = publish_options(tmp.path(), &out, BuildTarget::new(OsFamily::Linux, Arch::X64));
    options.compression = compression();
    options.packaging = packaging();

    let toolchain = ToolchainSettings::default();
    let outcome = Publisher::new(&t.ctx, &toolchain).publish(&options).await;

    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some("dotnet failed"));
    assert_eq!(t.runner.count("dotnet"), 1);
    assert_eq!(t.runner.count("upx"), 0);
    assert_eq!(t.packager.calls(), 0);
}

#[tokio::test]
async fn test_build_failure_skips_packaging_on_mac() {
    let t = TestContext::new(mac_host()).await;
    t.runner.set_exit("dotnet", 1);
    let tmp = tempfile::tempdir().unwrap();

    let mut options = publish_options(tmp.path(), tmp.path(), BuildTarget::new(OsFamily::MacOs, Arch::Arm64));
    options.packaging = packaging();

    let toolchain = ToolchainSettings::default();
    let outcome = Publisher::new(&t.ctx, &toolchain).publish(&options).await;

    assert!(!outcome.success);
    assert_eq!(t.packager.calls(), 0);
}

#[tokio::test]
async fn test_compression_failure_is_not_fatal() {
    let t = TestContext::new(linux_host()).await;
    t.runner.set_exit("upx", 1);
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("out");
    write_file(&out.join("App"), 4096, fixed_time());

    let mut options = publish_options(tmp.path(), &out, BuildTarget::new(OsFamily::Linux, Arch::X64));
    options.compression = compression();

    let toolchain = ToolchainSettings::default();
    let outcome = Publisher::new(&t.ctx, &toolchain).publish(&options).await;

    assert!(outcome.success);
    assert_eq!(outcome.output_path, out);
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].contains("compression"));

    let upx = t.runner.calls().into_iter().find(|c| c.program == PathBuf::from("upx")).unwrap();
    assert_eq!(upx.args, vec!["-7".to_string(), out.join("App").display().to_string()]);
}

#[tokio::test]
async fn test_compression_skipped_for_macos_targets() {
    let t = TestContext::new(mac_host()).await;
    let tmp = tempfile::tempdir().unwrap();
    write_file(&tmp.path().join("App"), 10, fixed_time());

    let mut options = publish_options(tmp.path(), tmp.path(), BuildTarget::new(OsFamily::MacOs, Arch::Arm64));
    options.compression = compression();

    let toolchain = ToolchainSettings::default();
    let outcome = Publisher::new(&t.ctx, &toolchain).publish(&options).await;

    assert!(outcome.success);
    assert_eq!(t.runner.count("upx"), 0);
}

#[tokio::test]
async fn test_packaging_replaces_output_path() {
    let t = TestContext::new(mac_host()).await;
    let tmp = tempfile::tempdir().unwrap();
    write_file(&tmp.path().join("App"), 10, fixed_time());

    let mut options = publish_options(tmp.path(), tmp.path(), BuildTarget::new(OsFamily::MacOs, Arch::Arm64));
    options.packaging = packaging();

    let toolchain = ToolchainSettings::default();
    let outcome = Publisher::new(&t.ctx, &toolchain).publish(&options).await;

    assert!(outcome.success);
    assert_eq!(outcome.output_path, tmp.path().join("App.app"));
    assert_eq!(t.packager.calls(), 1);
}

#[tokio::test]
async fn test_packaging_failure_keeps_publish_dir() {
    let t = TestContext::new(mac_host()).await;
    t.packager.set_fail(true);
    let tmp = tempfile::tempdir().unwrap();
    write_file(&tmp.path().join("App"), 10, fixed_time());

    let mut options = publish_options(tmp.path(), tmp.path(), BuildTarget::new(OsFamily::MacOs, Arch::Arm64));
    options.packaging = packaging();

    let toolchain = ToolchainSettings::default();
    let outcome = Publisher::new(&t.ctx, &toolchain).publish(&options).await;

    assert!(outcome.success);
    assert_eq!(outcome.output_path, tmp.path());
    assert!(outcome.warnings[0].contains("packaging failed"));
}

#[tokio::test]
async fn test_packaging_needs_mac_host() {
    let t = TestContext::new(linux_host()).await;
    let tmp = tempfile::tempdir().unwrap();
    write_file(&tmp.path().join("App"), 10, fixed_time());

    let mut options = publish_options(tmp.path(), tmp.path(), BuildTarget::new(OsFamily::MacOs, Arch::Arm64));
    options.aot = false;
    options.packaging = packaging();

    let toolchain = ToolchainSettings::default();
    let outcome = Publisher::new(&t.ctx, &toolchain).publish(&options).await;

    assert!(outcome.success);
    assert_eq!(t.packager.calls(), 0);
}

#[tokio::test]
async fn test_cross_build_without_linker_warns_and_builds() {
    let t = TestContext::new(mac_host()).await;
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("linux");

    let options = publish_options(tmp.path(), &out, BuildTarget::new(OsFamily::Linux, Arch::X64));
    let toolchain = ToolchainSettings::default();
    let outcome = Publisher::new(&t.ctx, &toolchain).publish(&options).await;

    assert!(outcome.success);
    assert!(outcome.warnings.iter().any(|w| w.contains("zig")));
    let calls = t.runner.calls();
    let build = &calls[0];
    assert!(!build.args.iter().any(|a| a.starts_with("-p:CppCompilerAndLinker")));
}

#[tokio::test]
async fn test_build_command_arguments() {
    let t = TestContext::new(linux_host()).await;
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("out");

    let mut options = publish_options(tmp.path(), &out, BuildTarget::new(OsFamily::Linux, Arch::Arm64));
    options.single_file = true;
    let toolchain = ToolchainSettings::default();
    let outcome = Publisher::new(&t.ctx, &toolchain).publish(&options).await;
    assert!(outcome.success);

    let calls = t.runner.calls();
    let build = &calls[0];
    assert_eq!(build.program, PathBuf::from("dotnet"));
    assert_eq!(build.args[0], "publish");
    let joined = build.args.join(" ");
    assert!(joined.contains("-c Release"));
    assert!(joined.contains("-r linux-arm64"));
    assert!(joined.contains("--self-contained true"));
    assert!(joined.contains("-p:PublishAot=true"));
    assert!(joined.contains("-p:PublishSingleFile=true"));
    assert!(joined.contains("-p:StripSymbols=true"));
    assert_eq!(build.current_dir.as_deref(), Some(tmp.path()));
}

#[tokio::test]
async fn test_local_phases_are_reported() {
    let mut t = TestContext::new(linux_host()).await;
    let tmp = tempfile::tempdir().unwrap();
    write_file(&tmp.path().join("App"), 10, fixed_time());

    let mut options = publish_options(tmp.path(), tmp.path(), BuildTarget::new(OsFamily::Linux, Arch::X64));
    options.compression = compression();
    options.status = Some(t.ctx.status.clone());

    let toolchain = ToolchainSettings::default();
    let outcome = Publisher::new(&t.ctx, &toolchain).publish(&options).await;
    assert!(outcome.success);

    let phases = drain_phases(&mut t.events);
    assert_eq!(phases, vec![PipelinePhase::Compile, PipelinePhase::Upx]);
}
