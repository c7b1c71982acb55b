//! Cross-linking arguments for `dotnet publish`
//!
//! Turns a target/host pair and the detected toolchain into the extra MSBuild
//! properties and environment the native linker step needs.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::models::target::{BuildTarget, OsFamily};
use crate::toolchain::detector::ToolchainStatus;

/// Why cross arguments could not be produced
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CrossArgsError {
    #[error("SDK not found")]
    SdkNotFound,

    #[error("linker not installed: {0}")]
    LinkerNotInstalled(&'static str),

    #[error("no target triple for {0}")]
    UnsupportedTarget(String),

    #[error("no Windows library directories under {0}")]
    NoLibraryPaths(PathBuf),
}

impl CrossArgsError {
    /// Whether publishing can still be attempted without cross arguments
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, CrossArgsError::NoLibraryPaths(_))
    }
}

/// Extra build arguments and environment for one target
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrossArgs {
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// Directories to put in front of the host `PATH`
    pub path_prepend: Vec<PathBuf>,
}

impl CrossArgs {
    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.env.is_empty() && self.path_prepend.is_empty()
    }

    /// `PATH` value with `path_prepend` in front of `current`, joined with
    /// the host's separator. `None` when nothing needs prepending.
    pub fn merged_path(&self, current: Option<&OsStr>, host: OsFamily) -> Option<String> {
        if self.path_prepend.is_empty() {
            return None;
        }
        let mut parts: Vec<String> = self
            .path_prepend
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        if let Some(current) = current.filter(|c| !c.is_empty()) {
            parts.push(current.to_string_lossy().into_owned());
        }
        Some(parts.join(&host.path_list_separator().to_string()))
    }
}

/// Arguments needed to build `target` on `host`
pub fn cross_args(
    target: &BuildTarget,
    host: OsFamily,
    toolchain: &ToolchainStatus,
    strip_symbols: bool,
) -> Result<CrossArgs, CrossArgsError> {
    cross_args_with(target, host, toolchain, strip_symbols, &|p: &Path| p.is_dir())
}

/// [`cross_args`] with an injectable directory existence check
pub fn cross_args_with(
    target: &BuildTarget,
    host: OsFamily,
    toolchain: &ToolchainStatus,
    strip_symbols: bool,
    dir_exists: &dyn Fn(&Path) -> bool,
) -> Result<CrossArgs, CrossArgsError> {
    match target.os {
        OsFamily::Linux if host != OsFamily::Linux => linux_args(target, toolchain, strip_symbols),
        OsFamily::Windows if host != OsFamily::Windows => {
            windows_args(target, toolchain, dir_exists)
        }
        _ => Ok(CrossArgs::default()),
    }
}

fn linux_args(
    target: &BuildTarget,
    toolchain: &ToolchainStatus,
    strip_symbols: bool,
) -> Result<CrossArgs, CrossArgsError> {
    let triple = target
        .linux_triple()
        .ok_or_else(|| CrossArgsError::UnsupportedTarget(target.rid()))?;
    let zig = toolchain
        .zig
        .installed_path()
        .ok_or(CrossArgsError::LinkerNotInstalled("zig"))?;

    // zig acts as `cc -target <triple>` for the ILCompiler link step
    let mut args = vec![
        "-p:CppCompilerAndLinker=zig".to_string(),
        format!("-p:ZigPath={}", zig.display()),
        format!("-p:ZigTarget={}", triple),
    ];

    if strip_symbols {
        args.push("-p:StripSymbols=true".to_string());
        if let Some(objcopy) = toolchain.objcopy.installed_path() {
            args.push(format!("-p:ObjCopyName={}", objcopy.display()));
        }
    }

    Ok(CrossArgs {
        args,
        env: BTreeMap::new(),
        path_prepend: parent_dir(zig).into_iter().collect(),
    })
}

fn windows_args(
    target: &BuildTarget,
    toolchain: &ToolchainStatus,
    dir_exists: &dyn Fn(&Path) -> bool,
) -> Result<CrossArgs, CrossArgsError> {
    let linker = toolchain
        .lld_link
        .installed_path()
        .ok_or(CrossArgsError::LinkerNotInstalled("lld-link"))?;

    let cache = match (toolchain.sdk_cache.installed, toolchain.sdk_cache.path.as_ref()) {
        (true, Some(path)) => path,
        _ => return Err(CrossArgsError::SdkNotFound),
    };

    let lib_dirs: Vec<PathBuf> = windows_lib_dirs(cache, target)
        .into_iter()
        .filter(|dir| dir_exists(dir))
        .collect();
    if lib_dirs.is_empty() {
        return Err(CrossArgsError::NoLibraryPaths(cache.clone()));
    }

    let mut args = vec![format!("-p:CppLinker={}", linker.display())];
    args.extend(
        lib_dirs
            .iter()
            .map(|dir| format!("-p:LinkerArg=/libpath:{}", dir.display())),
    );

    let mut env = BTreeMap::new();
    env.insert("LIB".to_string(), join_lib_paths(&lib_dirs, target.os));

    Ok(CrossArgs {
        args,
        env,
        path_prepend: parent_dir(linker).into_iter().collect(),
    })
}

/// CRT, um and ucrt library directories of an xwin splat for `target`
pub fn windows_lib_dirs(cache: &Path, target: &BuildTarget) -> Vec<PathBuf> {
    let arch = target.arch.xwin_dir();
    let splat = cache.join("splat");
    vec![
        splat.join("crt").join("lib").join(arch),
        splat.join("sdk").join("lib").join("um").join(arch),
        splat.join("sdk").join("lib").join("ucrt").join(arch),
    ]
}

/// Join library paths with the separator of the OS that consumes them
pub fn join_lib_paths(paths: &[PathBuf], target_os: OsFamily) -> String {
    paths
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(&target_os.path_list_separator().to_string())
}

fn parent_dir(path: &Path) -> Option<PathBuf> {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
}
