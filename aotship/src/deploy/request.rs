//! Deploy requests assembled from settings

use std::path::PathBuf;

use crate::errors::DeployError;
use crate::models::connection::{ConnectionProfile, DeployTarget, RemoteLayout};
use crate::models::target::{BuildTarget, HostPlatform};
use crate::project::Project;
use crate::publish::package::PackageOptions;
use crate::publish::publisher::{CompressionOptions, PublishOptions};
use crate::storage::settings::{Settings, ToolchainSettings};

/// Everything one deploy needs, validated up front
pub struct DeployRequest {
    pub target: DeployTarget,
    pub publish: PublishOptions,
    pub toolchain: ToolchainSettings,
    /// Required for server deploys
    pub connection: Option<ConnectionProfile>,
    pub layout: RemoteLayout,
    pub start_command: String,
    pub incremental: bool,
    /// Delete the output directory before a local deploy
    pub clean_destination: bool,
    pub webhook_url: Option<String>,
}

/// Command-line overrides applied on top of the settings file
#[derive(Debug, Clone, Default)]
pub struct RequestOverrides {
    pub target: DeployTarget,
    pub runtime: Option<BuildTarget>,
    pub output_dir: Option<PathBuf>,
}

impl DeployRequest {
    /// Build a request for `project`.
    ///
    /// Fails with a `Config` error before any I/O when the settings cannot
    /// describe a complete deploy.
    pub fn from_settings(
        settings: &Settings,
        project: &Project,
        overrides: &RequestOverrides,
        host: HostPlatform,
    ) -> Result<Self, DeployError> {
        let assembly = project.assembly_name.clone();

        let build_target = match (overrides.runtime, settings.publish.runtime.as_deref()) {
            (Some(target), _) => target,
            (None, Some(rid)) => rid.parse().map_err(DeployError::Config)?,
            (None, None) => host.native_target(),
        };

        let output_dir = overrides
            .output_dir
            .clone()
            .or_else(|| settings.publish.output_dir.clone())
            .unwrap_or_else(|| project.dir().join("publish").join(build_target.rid()));

        let compression = settings.compression.enabled.then(|| CompressionOptions {
            upx_path: settings.toolchain.upx_path.clone(),
            level: settings.compression.level,
        });

        let packaging = settings.packaging.enabled.then(|| {
            let pkg = &settings.packaging;
            PackageOptions {
                app_name: pkg.app_name.clone().unwrap_or_else(|| assembly.clone()),
                executable_name: build_target.executable_name(&assembly),
                bundle_id: pkg
                    .bundle_id
                    .clone()
                    .unwrap_or_else(|| format!("com.example.{}", assembly.to_lowercase())),
                version: pkg.version.clone().unwrap_or_else(|| "1.0.0".to_string()),
                icon_path: pkg.icon_path.clone(),
                create_dmg: pkg.create_dmg,
            }
        });

        let connection = match overrides.target {
            DeployTarget::Local => None,
            DeployTarget::Server => {
                if settings.remote.remote_path.trim().is_empty() {
                    return Err(DeployError::Config("remote path is not set".to_string()));
                }
                if settings.remote.start_command.trim().is_empty() {
                    return Err(DeployError::Config("start command is not set".to_string()));
                }
                Some(settings.connection_profile()?)
            }
        };

        Ok(Self {
            target: overrides.target,
            publish: PublishOptions {
                project_path: project.path.clone(),
                assembly_name: assembly.clone(),
                output_dir,
                configuration: settings.publish.configuration.clone(),
                target: build_target,
                self_contained: settings.publish.self_contained,
                single_file: settings.publish.single_file,
                aot: settings.publish.aot,
                strip_symbols: settings.publish.strip_symbols,
                compression,
                packaging,
                status: None,
            },
            toolchain: settings.toolchain.clone(),
            connection,
            layout: RemoteLayout::new(settings.remote.remote_path.trim(), assembly),
            start_command: settings.remote.start_command.clone(),
            incremental: settings.publish.incremental_upload,
            clean_destination: settings.publish.clean_destination,
            webhook_url: settings
                .notify
                .webhook_url
                .clone()
                .filter(|u| !u.trim().is_empty()),
        })
    }
}
