//! macOS `.app` bundle packaging

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info};

use crate::context::OutputSink;
use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::publish::runner::{CommandRunner, CommandSpec};

/// What goes into a bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageOptions {
    /// Bundle display name, also the `.app` directory name
    pub app_name: String,
    /// Name of the executable inside `Contents/MacOS`
    pub executable_name: String,
    pub bundle_id: String,
    pub version: String,
    pub icon_path: Option<PathBuf>,
    pub create_dmg: bool,
}

/// Turns a published executable into a platform package
#[async_trait]
pub trait Packager: Send + Sync {
    /// Package `exe`, returning the path of the produced package
    async fn package(
        &self,
        exe: &Path,
        out_dir: &Path,
        options: &PackageOptions,
        sink: &dyn OutputSink,
    ) -> Result<PathBuf, DeployError>;
}

/// Builds `<name>.app` bundles, optionally wrapped in a `.dmg`
pub struct AppBundlePackager {
    runner: Arc<dyn CommandRunner>,
}

impl AppBundlePackager {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Packager for AppBundlePackager {
    async fn package(
        &self,
        exe: &Path,
        out_dir: &Path,
        options: &PackageOptions,
        sink: &dyn OutputSink,
    ) -> Result<PathBuf, DeployError> {
        let bundle = create_bundle(exe, out_dir, options).await?;
        info!("Created bundle {}", bundle.display());

        if !options.create_dmg {
            return Ok(bundle);
        }

        let dmg = out_dir.join(format!("{}.dmg", options.app_name));
        let spec = CommandSpec::new("hdiutil").args([
            "create".to_string(),
            "-volname".to_string(),
            options.app_name.clone(),
            "-srcfolder".to_string(),
            bundle.display().to_string(),
            "-ov".to_string(),
            "-format".to_string(),
            "UDZO".to_string(),
            dmg.display().to_string(),
        ]);
        let output = self.runner.run(&spec, sink).await?;
        if !output.success() {
            return Err(DeployError::Build(format!(
                "hdiutil failed: {}",
                output.failure_text()
            )));
        }
        Ok(dmg)
    }
}

/// Lay out `<out_dir>/<app_name>.app`
pub async fn create_bundle(
    exe: &Path,
    out_dir: &Path,
    options: &PackageOptions,
) -> Result<PathBuf, DeployError> {
    let bundle = out_dir.join(format!("{}.app", options.app_name));
    let contents = Dir::new(bundle.join("Contents"));
    let macos = contents.subdir("MacOS");
    let resources = contents.subdir("Resources");

    // Stale bundles can hold files the new build no longer ships
    Dir::new(&bundle).delete().await?;
    macos.create().await?;
    resources.create().await?;

    let bundled_exe = macos.path().join(&options.executable_name);
    fs::copy(exe, &bundled_exe).await?;
    File::new(&bundled_exe).set_executable().await?;

    let icon_file = match &options.icon_path {
        Some(icon) => {
            let name = icon
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "AppIcon.icns".to_string());
            fs::copy(icon, resources.path().join(&name)).await?;
            debug!("Copied icon {}", name);
            Some(name)
        }
        None => None,
    };

    contents
        .file("Info.plist")
        .write_string(&info_plist(options, icon_file.as_deref()))
        .await?;

    Ok(bundle)
}

/// Minimal `Info.plist` for a bundle
pub fn info_plist(options: &PackageOptions, icon_file: Option<&str>) -> String {
    let mut entries = vec![
        ("CFBundleName", options.app_name.as_str()),
        ("CFBundleDisplayName", options.app_name.as_str()),
        ("CFBundleExecutable", options.executable_name.as_str()),
        ("CFBundleIdentifier", options.bundle_id.as_str()),
        ("CFBundleVersion", options.version.as_str()),
        ("CFBundleShortVersionString", options.version.as_str()),
        ("CFBundlePackageType", "APPL"),
    ];
    if let Some(icon) = icon_file {
        entries.push(("CFBundleIconFile", icon));
    }

    let mut plist = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" \"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n\
         <plist version=\"1.0\">\n<dict>\n",
    );
    for (key, value) in entries {
        plist.push_str(&format!(
            "    <key>{}</key>\n    <string>{}</string>\n",
            key,
            xml_escape(value)
        ));
    }
    plist.push_str("</dict>\n</plist>\n");
    plist
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
