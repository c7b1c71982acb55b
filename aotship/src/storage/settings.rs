//! Settings file management

use std::path::PathBuf;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::errors::DeployError;
use crate::logs::LogLevel;
use crate::models::connection::{Auth, ConnectionProfile};

/// Persisted deploy settings
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// SSH server to deploy to
    #[serde(default)]
    pub server: ServerSettings,

    /// Remote install location and start command
    #[serde(default)]
    pub remote: RemoteSettings,

    /// Build options
    #[serde(default)]
    pub publish: PublishSettings,

    /// upx compression
    #[serde(default)]
    pub compression: CompressionSettings,

    /// Cross toolchain locations
    #[serde(default)]
    pub toolchain: ToolchainSettings,

    /// macOS bundle packaging
    #[serde(default)]
    pub packaging: PackagingSettings,

    /// Chat notification
    #[serde(default)]
    pub notify: NotifySettings,
}

fn default_true() -> bool {
    true
}

/// How to authenticate against the server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    #[default]
    Key,
    Password,
}

/// SSH server settings
#[derive(Debug, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default)]
    pub host: String,

    #[serde(default = "default_ssh_port")]
    pub port: u16,

    #[serde(default = "default_username")]
    pub username: String,

    #[serde(default)]
    pub auth_type: AuthType,

    /// Private key used when `auth_type` is `key`
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,

    #[serde(default, skip_serializing)]
    pub key_passphrase: Option<SecretString>,

    /// Password used when `auth_type` is `password`
    #[serde(default, skip_serializing)]
    pub password: Option<SecretString>,
}

fn default_ssh_port() -> u16 {
    22
}

fn default_username() -> String {
    "root".to_string()
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_ssh_port(),
            username: default_username(),
            auth_type: AuthType::Key,
            private_key_path: None,
            key_passphrase: None,
            password: None,
        }
    }
}

/// Remote layout settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// Parent directory; the app lands in `remote_path/<assembly>`
    #[serde(default = "default_remote_path")]
    pub remote_path: String,

    /// Command run after upload. Supports `{app_name}`, `{remote_path}`
    /// and `{app_path}`.
    #[serde(default = "default_start_command")]
    pub start_command: String,
}

fn default_remote_path() -> String {
    "/opt/apps".to_string()
}

fn default_start_command() -> String {
    "sudo systemctl restart {app_name}".to_string()
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            remote_path: default_remote_path(),
            start_command: default_start_command(),
        }
    }
}

/// Build settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishSettings {
    #[serde(default = "default_configuration")]
    pub configuration: String,

    #[serde(default = "default_true")]
    pub self_contained: bool,

    #[serde(default)]
    pub single_file: bool,

    /// Native AOT compilation
    #[serde(default = "default_true")]
    pub aot: bool,

    #[serde(default = "default_true")]
    pub strip_symbols: bool,

    /// Only upload files whose remote copy is missing or stale
    #[serde(default = "default_true")]
    pub incremental_upload: bool,

    /// Delete the local output dir before a local deploy
    #[serde(default)]
    pub clean_destination: bool,

    /// Output dir; defaults to `<project dir>/publish/<rid>`
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// Runtime identifier; defaults to the host platform
    #[serde(default)]
    pub runtime: Option<String>,
}

fn default_configuration() -> String {
    "Release".to_string()
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            configuration: default_configuration(),
            self_contained: true,
            single_file: false,
            aot: true,
            strip_symbols: true,
            incremental_upload: true,
            clean_destination: false,
            output_dir: None,
            runtime: None,
        }
    }
}

/// upx settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionSettings {
    #[serde(default)]
    pub enabled: bool,

    /// 1 (fastest) to 9 (best)
    #[serde(default = "default_compression_level")]
    pub level: u8,
}

fn default_compression_level() -> u8 {
    9
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            level: default_compression_level(),
        }
    }
}

/// Explicit tool locations. Anything left unset is looked up on `PATH`
/// and in the usual install prefixes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolchainSettings {
    #[serde(default = "default_dotnet")]
    pub dotnet_path: PathBuf,

    #[serde(default)]
    pub zig_path: Option<PathBuf>,

    #[serde(default)]
    pub lld_link_path: Option<PathBuf>,

    #[serde(default)]
    pub xwin_path: Option<PathBuf>,

    #[serde(default)]
    pub objcopy_path: Option<PathBuf>,

    #[serde(default = "default_upx")]
    pub upx_path: PathBuf,

    /// xwin cache root; defaults to `~/.xwin-cache`
    #[serde(default)]
    pub sdk_cache_dir: Option<PathBuf>,
}

fn default_dotnet() -> PathBuf {
    PathBuf::from("dotnet")
}

fn default_upx() -> PathBuf {
    PathBuf::from("upx")
}

impl Default for ToolchainSettings {
    fn default() -> Self {
        Self {
            dotnet_path: default_dotnet(),
            zig_path: None,
            lld_link_path: None,
            xwin_path: None,
            objcopy_path: None,
            upx_path: default_upx(),
            sdk_cache_dir: None,
        }
    }
}

/// macOS `.app` packaging settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackagingSettings {
    #[serde(default)]
    pub enabled: bool,

    /// Display name; defaults to the assembly name
    #[serde(default)]
    pub app_name: Option<String>,

    /// `CFBundleIdentifier`; defaults to `com.example.<assembly>`
    #[serde(default)]
    pub bundle_id: Option<String>,

    #[serde(default)]
    pub version: Option<String>,

    /// Pre-converted `.icns` file
    #[serde(default)]
    pub icon_path: Option<PathBuf>,

    #[serde(default)]
    pub create_dmg: bool,
}

/// Chat webhook settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifySettings {
    #[serde(default)]
    pub webhook_url: Option<String>,
}

impl Settings {
    /// Resolve and validate the connection profile.
    ///
    /// Runs before any I/O so a bad configuration never leaves partial
    /// side effects behind.
    pub fn connection_profile(&self) -> Result<ConnectionProfile, DeployError> {
        let server = &self.server;
        if server.host.trim().is_empty() {
            return Err(DeployError::Config("server host is not set".to_string()));
        }
        if server.username.trim().is_empty() {
            return Err(DeployError::Config("server username is not set".to_string()));
        }

        let auth = match server.auth_type {
            AuthType::Key => {
                let path = server.private_key_path.clone().ok_or_else(|| {
                    DeployError::Config("private key path is not set".to_string())
                })?;
                if !path.is_file() {
                    return Err(DeployError::Config(format!(
                        "private key not found: {}",
                        path.display()
                    )));
                }
                Auth::Key {
                    private_key_path: path,
                    passphrase: server
                        .key_passphrase
                        .as_ref()
                        .map(|p| SecretString::from(p.expose_secret().to_owned())),
                }
            }
            AuthType::Password => {
                let password = server
                    .password
                    .as_ref()
                    .filter(|p| !p.expose_secret().is_empty())
                    .ok_or_else(|| DeployError::Config("password is not set".to_string()))?;
                Auth::Password(SecretString::from(password.expose_secret().to_owned()))
            }
        };

        Ok(ConnectionProfile {
            host: server.host.trim().to_string(),
            port: server.port,
            username: server.username.trim().to_string(),
            auth,
        })
    }
}
