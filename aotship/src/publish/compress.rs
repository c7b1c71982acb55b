//! upx compression of published executables

use std::path::Path;

use tracing::{info, warn};

use crate::context::OutputSink;
use crate::errors::DeployError;
use crate::publish::runner::{CommandRunner, CommandSpec};

/// `upx -<level> <exe>`, level clamped to 1..=9
pub fn compress_command(upx: &Path, level: u8, exe: &Path) -> CommandSpec {
    let level = level.clamp(1, 9);
    CommandSpec::new(upx)
        .arg(format!("-{}", level))
        .arg(exe.display().to_string())
}

/// Compress `exe` in place
pub async fn compress(
    runner: &dyn CommandRunner,
    sink: &dyn OutputSink,
    upx: &Path,
    level: u8,
    exe: &Path,
) -> Result<(), DeployError> {
    let spec = compress_command(upx, level, exe);
    info!("Compressing {}", exe.display());

    let output = runner.run(&spec, sink).await?;
    if output.success() {
        Ok(())
    } else {
        warn!("upx failed for {}", exe.display());
        Err(DeployError::Build(format!("upx failed: {}", output.failure_text())))
    }
}
