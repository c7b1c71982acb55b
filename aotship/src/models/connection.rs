//! Remote connection details

use std::fmt;
use std::path::PathBuf;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Where a deploy ends up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployTarget {
    #[default]
    Local,
    Server,
}

impl std::str::FromStr for DeployTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(DeployTarget::Local),
            "server" | "remote" => Ok(DeployTarget::Server),
            _ => Err(format!("Invalid deploy target: {}", s)),
        }
    }
}

/// How the SSH session authenticates
#[derive(Debug)]
pub enum Auth {
    Key {
        private_key_path: PathBuf,
        passphrase: Option<SecretString>,
    },
    Password(SecretString),
}

/// A resolved, validated SSH connection
#[derive(Debug)]
pub struct ConnectionProfile {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: Auth,
}

impl fmt::Display for ConnectionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.username, self.host, self.port)
    }
}

/// Layout of a deployed application on the remote host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLayout {
    pub remote_path: String,
    pub assembly_name: String,
}

impl RemoteLayout {
    pub fn new(remote_path: impl Into<String>, assembly_name: impl Into<String>) -> Self {
        Self {
            remote_path: remote_path.into(),
            assembly_name: assembly_name.into(),
        }
    }

    /// `remote_path/assembly_name`
    pub fn root(&self) -> String {
        join_remote(&self.remote_path, &self.assembly_name)
    }

    /// `remote_path/assembly_name/assembly_name`
    pub fn executable(&self) -> String {
        join_remote(&self.root(), &self.assembly_name)
    }
}

/// Join remote path segments with forward slashes
pub fn join_remote(base: &str, child: &str) -> String {
    let base = base.trim_end_matches('/');
    let child = child.trim_start_matches('/');
    if base.is_empty() {
        format!("/{}", child)
    } else {
        format!("{}/{}", base, child)
    }
}

/// Parent directory of a remote path, if any
pub fn remote_parent(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&trimmed[..idx]),
        None => None,
    }
}
