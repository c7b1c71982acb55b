//! Cross toolchain detection
//!
//! Probes the host for the tools needed to link for a foreign OS. Absence of
//! a tool is an ordinary state, so nothing here returns an error.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use crate::filesys::dir::Dir;
use crate::storage::layout::home_dir;
use crate::storage::settings::ToolchainSettings;

const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Tools the cross builds depend on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tool {
    /// `zig`, used as the C toolchain when linking for Linux
    Zig,
    /// `lld-link`, the PE/COFF linker used for Windows
    LldLink,
    /// `xwin`, fetches the Windows CRT and SDK libraries
    Xwin,
    /// The splatted xwin library cache
    XwinCache,
    /// `llvm-objcopy`, strips symbols from cross-linked binaries
    ObjCopy,
    /// `upx`, optional executable compression
    Upx,
}

impl Tool {
    pub fn name(&self) -> &'static str {
        match self {
            Tool::Zig => "zig",
            Tool::LldLink => "lld-link",
            Tool::Xwin => "xwin",
            Tool::XwinCache => "xwin-cache",
            Tool::ObjCopy => "llvm-objcopy",
            Tool::Upx => "upx",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Tool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "zig" => Ok(Tool::Zig),
            "lld-link" | "lld" | "llvm" => Ok(Tool::LldLink),
            "xwin" => Ok(Tool::Xwin),
            "xwin-cache" | "sdk" | "windows-sdk" => Ok(Tool::XwinCache),
            "llvm-objcopy" | "objcopy" => Ok(Tool::ObjCopy),
            "upx" => Ok(Tool::Upx),
            _ => Err(format!("Unknown tool: {}", s)),
        }
    }
}

/// Detection result for one tool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolStatus {
    pub installed: bool,
    pub version: Option<String>,
    pub path: Option<PathBuf>,
}

impl ToolStatus {
    pub fn missing() -> Self {
        Self::default()
    }

    pub fn found(path: impl Into<PathBuf>, version: Option<String>) -> Self {
        Self {
            installed: true,
            version,
            path: Some(path.into()),
        }
    }

    /// Resolved path, only when installed
    pub fn installed_path(&self) -> Option<&Path> {
        if self.installed {
            self.path.as_deref()
        } else {
            None
        }
    }
}

/// The xwin library cache
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdkCacheStatus {
    pub installed: bool,
    /// Cache root (the directory containing `splat/`)
    pub path: Option<PathBuf>,
    pub size_bytes: u64,
}

/// Everything detected on the host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolchainStatus {
    pub zig: ToolStatus,
    pub lld_link: ToolStatus,
    pub xwin: ToolStatus,
    pub sdk_cache: SdkCacheStatus,
    pub objcopy: ToolStatus,
    pub upx: ToolStatus,
}

/// Per target OS readiness summary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformReadiness {
    pub linux_ready: bool,
    pub windows_ready: bool,
    pub linux_missing: Vec<Tool>,
    pub windows_missing: Vec<Tool>,
}

impl ToolchainStatus {
    pub fn is_installed(&self, tool: Tool) -> bool {
        match tool {
            Tool::Zig => self.zig.installed,
            Tool::LldLink => self.lld_link.installed,
            Tool::Xwin => self.xwin.installed,
            Tool::XwinCache => self.sdk_cache.installed,
            Tool::ObjCopy => self.objcopy.installed,
            Tool::Upx => self.upx.installed,
        }
    }

    pub fn readiness(&self) -> PlatformReadiness {
        let linux_missing: Vec<Tool> = [Tool::Zig]
            .into_iter()
            .filter(|t| !self.is_installed(*t))
            .collect();

        let mut windows_missing: Vec<Tool> = [Tool::LldLink, Tool::XwinCache]
            .into_iter()
            .filter(|t| !self.is_installed(*t))
            .collect();
        // Without a cache, xwin is needed to create one
        if !self.sdk_cache.installed && !self.xwin.installed {
            windows_missing.push(Tool::Xwin);
        }

        PlatformReadiness {
            linux_ready: linux_missing.is_empty(),
            windows_ready: windows_missing.is_empty(),
            linux_missing,
            windows_missing,
        }
    }
}

/// Default xwin cache root when none is configured
pub fn default_sdk_cache_dir() -> Option<PathBuf> {
    home_dir().map(|h| h.join(".xwin-cache"))
}

/// Probe the host for every tool
pub async fn detect(settings: &ToolchainSettings) -> ToolchainStatus {
    let zig = detect_tool(Tool::Zig, settings.zig_path.as_deref()).await;
    let lld_link = detect_tool(Tool::LldLink, settings.lld_link_path.as_deref()).await;
    let xwin = detect_tool(Tool::Xwin, settings.xwin_path.as_deref()).await;
    let objcopy = detect_tool(Tool::ObjCopy, settings.objcopy_path.as_deref()).await;
    let upx = detect_tool(Tool::Upx, Some(settings.upx_path.as_path())).await;

    let cache_root = settings
        .sdk_cache_dir
        .clone()
        .or_else(default_sdk_cache_dir);
    let sdk_cache = match cache_root {
        Some(root) => detect_sdk_cache(root).await,
        None => SdkCacheStatus::default(),
    };

    ToolchainStatus {
        zig,
        lld_link,
        xwin,
        sdk_cache,
        objcopy,
        upx,
    }
}

async fn detect_tool(tool: Tool, configured: Option<&Path>) -> ToolStatus {
    let Some(path) = resolve_tool(tool, configured) else {
        debug!("{} not found", tool);
        return ToolStatus::missing();
    };
    let version = probe_version(tool, &path).await;
    debug!("{} found at {} ({:?})", tool, path.display(), version);
    ToolStatus::found(path, version)
}

/// Configured path, then `PATH`, then well-known install prefixes
fn resolve_tool(tool: Tool, configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = configured {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        if let Ok(found) = which::which(path) {
            return Some(found);
        }
    }

    if let Ok(found) = which::which(tool.name()) {
        return Some(found);
    }

    let file_name = format!("{}{}", tool.name(), std::env::consts::EXE_SUFFIX);
    fallback_dirs(tool)
        .into_iter()
        .map(|dir| dir.join(&file_name))
        .find(|candidate| candidate.is_file())
}

fn fallback_dirs(tool: Tool) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    let home = home_dir();

    match tool {
        Tool::Zig | Tool::Upx => {
            dirs.push(PathBuf::from("/opt/homebrew/bin"));
            dirs.push(PathBuf::from("/usr/local/bin"));
            if let Some(home) = &home {
                dirs.push(home.join(".local").join("bin"));
            }
        }
        Tool::LldLink | Tool::ObjCopy => {
            dirs.push(PathBuf::from("/opt/homebrew/opt/llvm/bin"));
            dirs.push(PathBuf::from("/usr/local/opt/llvm/bin"));
            dirs.push(PathBuf::from(r"C:\Program Files\LLVM\bin"));
        }
        Tool::Xwin => {
            if let Some(home) = &home {
                dirs.push(home.join(".cargo").join("bin"));
            }
        }
        Tool::XwinCache => {}
    }

    if cfg!(windows) {
        if let Some(local) = std::env::var_os("LOCALAPPDATA") {
            dirs.push(
                PathBuf::from(local)
                    .join("Microsoft")
                    .join("WinGet")
                    .join("Links"),
            );
        }
    }

    dirs
}

/// First line of the tool's version output, if it answers in time
async fn probe_version(tool: Tool, path: &Path) -> Option<String> {
    let arg = match tool {
        Tool::Zig => "version",
        _ => "--version",
    };

    let output = tokio::time::timeout(
        VERSION_PROBE_TIMEOUT,
        Command::new(path).arg(arg).kill_on_drop(true).output(),
    )
    .await
    .ok()?
    .ok()?;

    let text = if output.stdout.is_empty() {
        String::from_utf8_lossy(&output.stderr).into_owned()
    } else {
        String::from_utf8_lossy(&output.stdout).into_owned()
    };
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

async fn detect_sdk_cache(root: PathBuf) -> SdkCacheStatus {
    let splat = Dir::new(root.join("splat"));
    if !splat.exists().await {
        return SdkCacheStatus {
            installed: false,
            path: Some(root),
            size_bytes: 0,
        };
    }

    let dir = Dir::new(root.clone());
    let size_bytes = tokio::task::spawn_blocking(move || dir.size_bytes())
        .await
        .unwrap_or(0);

    SdkCacheStatus {
        installed: true,
        path: Some(root),
        size_bytes,
    }
}
