//! aotship - Entry Point
//!
//! Publishes a native AOT project and ships it to a local folder or an SSH
//! server, cross-linking for Linux and Windows targets when needed.

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use colored::Colorize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use aotship::context::{ConsoleSink, DeployContext, OutputSink, PhaseEvent};
use aotship::deploy::request::{DeployRequest, RequestOverrides};
use aotship::deploy::sequencer::Deployer;
use aotship::logs::{init_logging, LogOptions};
use aotship::models::target::HostPlatform;
use aotship::project::{self, Project};
use aotship::publish::package::AppBundlePackager;
use aotship::publish::runner::{CommandRunner, ProcessRunner};
use aotship::remote::session::SshConnector;
use aotship::storage::layout::StorageLayout;
use aotship::storage::settings::Settings;
use aotship::toolchain::detector::{self, Tool, ToolStatus, ToolchainStatus};
use aotship::toolchain::installer::install_tool;
use aotship::utils::{format_bytes, version_info};

const USAGE: &str = "\
Usage: aotship <command> [options]

Commands:
  --deploy --project=<path> [--target=local|server] [--rid=<rid>] [--output=<dir>] [--json]
  --check-toolchain           Show cross toolchain status
  --install-tool=<tool>       Install zig, lld, xwin, sdk, objcopy or upx
  --list-projects[=<dir>]     List deployable projects
  --show-config               Print the settings file
  --package-config            Print macOS packaging settings
  --init-config [--force]     Write a default settings file
  --version                   Print version information";

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    match run(&cli_args).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli_args: &HashMap<String, String>) -> anyhow::Result<ExitCode> {
    // Print version and exit
    if cli_args.contains_key("version") {
        println!("{}", serde_json::to_string_pretty(&version_info())?);
        return Ok(ExitCode::SUCCESS);
    }

    let layout = StorageLayout::default();

    if cli_args.contains_key("init-config") {
        init_config(&layout, cli_args.contains_key("force")).await?;
        return Ok(ExitCode::SUCCESS);
    }

    let settings = load_settings(&layout).await?;

    // Initialize logging
    let log_dir = match layout.setup().await {
        Ok(()) => Some(layout.logs_dir().path().to_path_buf()),
        Err(e) => {
            eprintln!("Cannot create {}: {e}", layout.base_dir.display());
            None
        }
    };
    let log_options = LogOptions {
        log_level: settings.log_level,
        log_dir,
        json_format: cli_args.contains_key("json-logs"),
        ..Default::default()
    };
    let _guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    let host = HostPlatform::current();

    if cli_args.contains_key("show-config") {
        println!("# {}", layout.settings_file().path().display());
        println!("{}", serde_json::to_string_pretty(&settings)?);
        return Ok(ExitCode::SUCCESS);
    }

    if cli_args.contains_key("package-config") {
        println!("{}", serde_json::to_string_pretty(&settings.packaging)?);
        return Ok(ExitCode::SUCCESS);
    }

    if cli_args.contains_key("check-toolchain") {
        let status = detector::detect(&settings.toolchain).await;
        print_toolchain(&status);
        return Ok(ExitCode::SUCCESS);
    }

    if let Some(name) = cli_args.get("install-tool") {
        let tool: Tool = name.parse().map_err(|e: String| anyhow!(e))?;
        install_tool(tool, host.os, &ProcessRunner, &ConsoleSink, &settings.toolchain).await?;
        print_toolchain(&detector::detect(&settings.toolchain).await);
        return Ok(ExitCode::SUCCESS);
    }

    if let Some(dir) = cli_args.get("list-projects") {
        let dir = if dir == "true" { "." } else { dir.as_str() };
        list_projects(Path::new(dir)).await?;
        return Ok(ExitCode::SUCCESS);
    }

    if cli_args.contains_key("deploy") {
        return deploy(cli_args, &settings, host).await;
    }

    println!("{}", USAGE);
    Ok(ExitCode::SUCCESS)
}

async fn load_settings(layout: &StorageLayout) -> anyhow::Result<Settings> {
    let settings_file = layout.settings_file();
    if !settings_file.exists().await {
        return Ok(Settings::default());
    }
    settings_file
        .read_json::<Settings>()
        .await
        .with_context(|| format!("Unable to read {}", settings_file.path().display()))
}

async fn init_config(layout: &StorageLayout, force: bool) -> anyhow::Result<()> {
    let settings_file = layout.settings_file();
    if settings_file.exists().await && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            settings_file.path().display()
        );
    }
    layout.setup().await?;
    settings_file.write_json(&Settings::default()).await?;
    println!("Wrote {}", settings_file.path().display());
    Ok(())
}

async fn list_projects(dir: &Path) -> anyhow::Result<()> {
    let projects = project::discover(dir).await?;
    if projects.is_empty() {
        println!("No projects found under {}", dir.display());
        return Ok(());
    }
    for project in projects {
        let kind = if project.is_executable {
            "exe".green()
        } else {
            "lib".dimmed()
        };
        println!(
            "{:<32} {:<4} {}",
            project.assembly_name.bold(),
            kind,
            project.path.display()
        );
    }
    Ok(())
}

/// A project file, or the single executable project under a directory
async fn resolve_project(path: &Path) -> anyhow::Result<Project> {
    if path.is_file() {
        return Ok(Project::load(path).await?);
    }

    let mut executables: Vec<Project> = project::discover(path)
        .await?
        .into_iter()
        .filter(|p| p.is_executable)
        .collect();
    if executables.len() > 1 {
        bail!(
            "{} executable projects under {}; pass one with --project=<file>",
            executables.len(),
            path.display()
        );
    }
    executables
        .pop()
        .ok_or_else(|| anyhow!("no executable project under {}", path.display()))
}

async fn deploy(
    cli_args: &HashMap<String, String>,
    settings: &Settings,
    host: HostPlatform,
) -> anyhow::Result<ExitCode> {
    let project_path = cli_args
        .get("project")
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("--deploy needs --project=<path>"))?;
    let project = resolve_project(&project_path).await?;

    let overrides = RequestOverrides {
        target: match cli_args.get("target") {
            Some(t) => t.parse().map_err(|e: String| anyhow!(e))?,
            None => Default::default(),
        },
        runtime: match cli_args.get("rid") {
            Some(rid) => Some(rid.parse().map_err(|e: String| anyhow!(e))?),
            None => None,
        },
        output_dir: cli_args.get("output").map(PathBuf::from),
    };
    let request = DeployRequest::from_settings(settings, &project, &overrides, host)?;

    // Print phase transitions as they happen
    let (tx, mut rx) = mpsc::unbounded_channel::<PhaseEvent>();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            println!("{} {}", format!("[{}]", event.phase).cyan().bold(), event.message);
        }
    });

    let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner);
    let output: Arc<dyn OutputSink> = Arc::new(ConsoleSink);
    let ctx = DeployContext::new(
        host,
        output,
        Arc::new(tx),
        runner.clone(),
        Arc::new(SshConnector::default()),
        Arc::new(AppBundlePackager::new(runner)),
    );

    info!("Deploying {}", project.path.display());
    let result = Deployer::new(&ctx).deploy(&request).await;
    drop(ctx);
    if let Err(e) = printer.await {
        warn!("Status printer stopped: {}", e);
    }

    if cli_args.contains_key("json") {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }
    for warning in &result.warnings {
        println!("{} {}", "warning:".yellow().bold(), warning);
    }
    if result.success {
        let path = result
            .output_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        println!("{} {}", "deployed:".green().bold(), path);
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!(
            "{} {}",
            "failed:".red().bold(),
            result.error.as_deref().unwrap_or("unknown error")
        );
        Ok(ExitCode::FAILURE)
    }
}

fn tool_row(name: &str, status: &ToolStatus) {
    let state = if status.installed {
        "installed".green()
    } else {
        "missing".red()
    };
    println!(
        "  {:<14} {:<10} {:<12} {}",
        name,
        state,
        status.version.as_deref().unwrap_or("-"),
        status
            .path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default()
    );
}

fn print_toolchain(status: &ToolchainStatus) {
    println!("{}", "Cross toolchain".bold());
    tool_row(Tool::Zig.name(), &status.zig);
    tool_row(Tool::LldLink.name(), &status.lld_link);
    tool_row(Tool::Xwin.name(), &status.xwin);
    tool_row(Tool::ObjCopy.name(), &status.objcopy);
    tool_row(Tool::Upx.name(), &status.upx);

    let cache = &status.sdk_cache;
    let state = if cache.installed {
        "installed".green()
    } else {
        "missing".red()
    };
    println!(
        "  {:<14} {:<10} {:<12} {}",
        Tool::XwinCache.name(),
        state,
        format_bytes(cache.size_bytes),
        cache
            .path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default()
    );

    let readiness = status.readiness();
    let line = |label: &str, ready: bool, missing: &[Tool]| {
        if ready {
            println!("{:<8} {}", label, "ready".green());
        } else {
            let names: Vec<&str> = missing.iter().map(|t| t.name()).collect();
            println!("{:<8} {} ({})", label, "not ready".yellow(), names.join(", "));
        }
    };
    println!();
    line("linux", readiness.linux_ready, &readiness.linux_missing[..]);
    line("windows", readiness.windows_ready, &readiness.windows_missing[..]);
}
