//! Cross toolchain installation

use std::path::PathBuf;

use tracing::{info, warn};

use crate::context::OutputSink;
use crate::errors::DeployError;
use crate::models::target::OsFamily;
use crate::publish::runner::{CommandRunner, CommandSpec};
use crate::storage::settings::ToolchainSettings;
use crate::toolchain::detector::{default_sdk_cache_dir, Tool};

/// Commands that install `tool` on `host`, run in order
pub fn install_plan(
    tool: Tool,
    host: OsFamily,
    settings: &ToolchainSettings,
) -> Result<Vec<CommandSpec>, DeployError> {
    let plan = match (tool, host) {
        (Tool::Zig, OsFamily::MacOs) => vec![brew(["install", "zig"])],
        (Tool::Zig, OsFamily::Windows) => vec![winget("zig.zig")],
        (Tool::LldLink | Tool::ObjCopy, OsFamily::MacOs) => vec![brew(["install", "llvm"])],
        (Tool::LldLink | Tool::ObjCopy, OsFamily::Windows) => vec![winget("LLVM.LLVM")],
        (Tool::Upx, OsFamily::MacOs) => vec![brew(["install", "upx"])],
        (Tool::Upx, OsFamily::Windows) => vec![winget("UPX.UPX")],
        (Tool::Xwin, _) => vec![CommandSpec::new("cargo").args(["install", "xwin", "--locked"])],
        (Tool::XwinCache, _) => {
            let cache = settings
                .sdk_cache_dir
                .clone()
                .or_else(default_sdk_cache_dir)
                .ok_or_else(|| {
                    DeployError::Config("cannot determine the xwin cache directory".to_string())
                })?;
            let xwin = settings
                .xwin_path
                .clone()
                .unwrap_or_else(|| PathBuf::from("xwin"));
            vec![CommandSpec::new(xwin).args([
                "--accept-license".to_string(),
                "--cache-dir".to_string(),
                cache.display().to_string(),
                "splat".to_string(),
                "--output".to_string(),
                cache.join("splat").display().to_string(),
            ])]
        }
        (Tool::Zig, OsFamily::Linux) => {
            return Err(DeployError::Config(
                "install zig with your distribution's package manager or from https://ziglang.org/download"
                    .to_string(),
            ))
        }
        (Tool::Upx, OsFamily::Linux) => {
            return Err(DeployError::Config(
                "install upx with your distribution's package manager".to_string(),
            ))
        }
        (Tool::LldLink | Tool::ObjCopy, OsFamily::Linux) => {
            return Err(DeployError::Config(
                "install the lld and llvm packages with your distribution's package manager"
                    .to_string(),
            ))
        }
    };
    Ok(plan)
}

fn brew<const N: usize>(args: [&str; N]) -> CommandSpec {
    CommandSpec::new("brew").args(args)
}

fn winget(id: &str) -> CommandSpec {
    CommandSpec::new("winget").args([
        "install",
        "--exact",
        "--id",
        id,
        "--accept-source-agreements",
        "--accept-package-agreements",
    ])
}

/// Install one tool, streaming installer output to `sink`
pub async fn install_tool(
    tool: Tool,
    host: OsFamily,
    runner: &dyn CommandRunner,
    sink: &dyn OutputSink,
    settings: &ToolchainSettings,
) -> Result<(), DeployError> {
    let plan = install_plan(tool, host, settings)?;
    info!("Installing {} ({} step(s))", tool, plan.len());

    for spec in plan {
        sink.append_line(&format!("$ {}", spec));
        let output = runner.run(&spec, sink).await?;
        if !output.success() {
            warn!("Installing {} failed: {}", tool, spec);
            return Err(DeployError::ToolchainMissing(format!(
                "installing {} failed: {}",
                tool,
                output.failure_text()
            )));
        }
    }

    info!("Installed {}", tool);
    Ok(())
}
