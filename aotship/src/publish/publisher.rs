//! Build orchestration: publish, compress, package

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::context::{DeployContext, StatusReporter};
use crate::models::outcome::PipelinePhase;
use crate::models::target::{BuildTarget, OsFamily};
use crate::publish::compress;
use crate::publish::package::PackageOptions;
use crate::publish::runner::CommandSpec;
use crate::storage::settings::ToolchainSettings;
use crate::toolchain::cross::{self, CrossArgs};

/// upx options for one publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionOptions {
    pub upx_path: PathBuf,
    pub level: u8,
}

/// Everything one publish needs
#[derive(Clone)]
pub struct PublishOptions {
    pub project_path: PathBuf,
    pub assembly_name: String,
    pub output_dir: PathBuf,
    pub configuration: String,
    pub target: BuildTarget,
    pub self_contained: bool,
    pub single_file: bool,
    pub aot: bool,
    pub strip_symbols: bool,
    /// `None` disables compression
    pub compression: Option<CompressionOptions>,
    /// `None` disables packaging
    pub packaging: Option<PackageOptions>,
    /// Receives `Compile`, `Upx` and `Package` transitions
    pub status: Option<Arc<dyn StatusReporter>>,
}

/// Result of a publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    pub success: bool,
    /// Publish directory, or the package when packaging succeeded
    pub output_path: PathBuf,
    pub assembly_name: String,
    pub error: Option<String>,
    pub warnings: Vec<String>,
}

impl PublishOutcome {
    fn failed(options: &PublishOptions, error: String, warnings: Vec<String>) -> Self {
        Self {
            success: false,
            output_path: options.output_dir.clone(),
            assembly_name: options.assembly_name.clone(),
            error: Some(error),
            warnings,
        }
    }
}

/// Runs `dotnet publish` and the optional post-build steps
pub struct Publisher<'a> {
    ctx: &'a DeployContext,
    toolchain: &'a ToolchainSettings,
}

impl<'a> Publisher<'a> {
    pub fn new(ctx: &'a DeployContext, toolchain: &'a ToolchainSettings) -> Self {
        Self { ctx, toolchain }
    }

    pub async fn publish(&self, options: &PublishOptions) -> PublishOutcome {
        let mut warnings = Vec::new();
        let target = options.target;
        let host = self.ctx.host.os;

        let message = format!("Compiling {} for {}", options.assembly_name, target);
        self.report(options, PipelinePhase::Compile, &message);

        let mut cross_args = CrossArgs::default();
        if options.aot && target.requires_cross_compile(host) {
            let status = self.ctx.toolchain(self.toolchain).await;
            let readiness = status.readiness();
            let missing = match target.os {
                OsFamily::Linux => readiness.linux_missing,
                OsFamily::Windows => readiness.windows_missing,
                OsFamily::MacOs => Vec::new(),
            };
            if !missing.is_empty() {
                let names: Vec<&str> = missing.iter().map(|t| t.name()).collect();
                let msg = format!(
                    "missing cross tools for {}: {}",
                    target.os,
                    names.join(", ")
                );
                warn!("{}", msg);
                warnings.push(msg);
            }

            match cross::cross_args(&target, host, &status, options.strip_symbols) {
                Ok(args) => cross_args = args,
                Err(e) if e.is_recoverable() => {
                    let msg = format!("cross compilation setup incomplete: {}", e);
                    warn!("{}", msg);
                    warnings.push(msg);
                }
                Err(e) => {
                    error!("Cannot cross compile for {}: {}", target, e);
                    return PublishOutcome::failed(options, e.to_string(), warnings);
                }
            }
        }

        let spec = self.build_command(options, &cross_args);
        info!("Publishing: {}", spec);
        let output = match self.ctx.runner.run(&spec, self.ctx.output.as_ref()).await {
            Ok(output) => output,
            Err(e) => return PublishOutcome::failed(options, e.to_string(), warnings),
        };
        if !output.success() {
            error!("Build failed for {}", options.assembly_name);
            return PublishOutcome::failed(options, output.failure_text(), warnings);
        }

        let exe = options
            .output_dir
            .join(target.executable_name(&options.assembly_name));

        if let Some(compression) = &options.compression {
            if target.os.supports_compression() {
                self.report(options, PipelinePhase::Upx, "Compressing executable");
                if let Some(w) = self.compress(compression, &exe).await {
                    warnings.push(w);
                }
            } else {
                info!("Skipping compression: {} executables are not supported", target.os);
            }
        }

        let mut output_path = options.output_dir.clone();
        if let Some(packaging) = &options.packaging {
            if host == OsFamily::MacOs && target.os == OsFamily::MacOs {
                self.report(options, PipelinePhase::Package, "Packaging application bundle");
                match self.package(packaging, &exe, &options.output_dir).await {
                    Ok(path) => output_path = path,
                    Err(w) => warnings.push(w),
                }
            } else {
                info!("Skipping packaging: only macOS targets built on macOS are packaged");
            }
        }

        PublishOutcome {
            success: true,
            output_path,
            assembly_name: options.assembly_name.clone(),
            error: None,
            warnings,
        }
    }

    /// The full `dotnet publish` invocation
    pub fn build_command(&self, options: &PublishOptions, cross_args: &CrossArgs) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.toolchain.dotnet_path)
            .arg("publish")
            .arg(options.project_path.display().to_string())
            .args(["-c", options.configuration.as_str()])
            .args(["-r".to_string(), options.target.rid()])
            .args(["-o".to_string(), options.output_dir.display().to_string()])
            .args(["--self-contained".to_string(), options.self_contained.to_string()])
            .arg(format!("-p:PublishAot={}", options.aot));

        if options.single_file {
            spec = spec.arg("-p:PublishSingleFile=true");
        }
        let cross_strips = cross_args
            .args
            .iter()
            .any(|a| a.starts_with("-p:StripSymbols="));
        if options.aot && !cross_strips {
            spec = spec.arg(format!("-p:StripSymbols={}", options.strip_symbols));
        }

        spec = spec.args(cross_args.args.iter().cloned());
        for (key, value) in &cross_args.env {
            spec = spec.env(key.clone(), value.clone());
        }
        let current_path = std::env::var_os("PATH");
        if let Some(path) = cross_args.merged_path(current_path.as_deref(), self.ctx.host.os) {
            spec = spec.env("PATH", path);
        }

        if let Some(dir) = options.project_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            spec = spec.current_dir(dir);
        }
        spec
    }

    /// Returns a warning when compression did not happen
    async fn compress(&self, compression: &CompressionOptions, exe: &Path) -> Option<String> {
        if !exe.is_file() {
            let msg = format!("executable not found for compression: {}", exe.display());
            warn!("{}", msg);
            return Some(msg);
        }
        match compress::compress(
            self.ctx.runner.as_ref(),
            self.ctx.output.as_ref(),
            &compression.upx_path,
            compression.level,
            exe,
        )
        .await
        {
            Ok(()) => None,
            Err(e) => {
                let msg = format!("compression skipped: {}", e);
                warn!("{}", msg);
                Some(msg)
            }
        }
    }

    /// Package path, or a warning when packaging failed
    async fn package(
        &self,
        packaging: &PackageOptions,
        exe: &Path,
        out_dir: &Path,
    ) -> Result<PathBuf, String> {
        if !exe.is_file() {
            let msg = format!("executable not found for packaging: {}", exe.display());
            warn!("{}", msg);
            return Err(msg);
        }
        self.ctx
            .packager
            .package(exe, out_dir, packaging, self.ctx.output.as_ref())
            .await
            .map_err(|e| {
                let msg = format!("packaging failed: {}", e);
                warn!("{}", msg);
                msg
            })
    }

    fn report(&self, options: &PublishOptions, phase: PipelinePhase, message: &str) {
        if let Some(status) = &options.status {
            status.report(phase, message);
        }
    }
}
