//! Incremental mirroring of a local directory to a remote host

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use tracing::{debug, info, warn};

use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::models::connection::{join_remote, remote_parent, ConnectionProfile, RemoteLayout};
use crate::remote::session::{RemoteConnector, RemoteSession, RemoteStat};

/// Mode applied to the deployed executable
pub const EXECUTABLE_MODE: u32 = 0o755;

/// Per-file upload decision, recomputed on every sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSyncDecision {
    pub local_path: PathBuf,
    pub remote_path: String,
    pub needs_upload: bool,
}

/// Whether a local file differs from its remote copy.
///
/// Upload when the remote copy is missing, the sizes differ, or the local
/// file is strictly newer at whole-second resolution.
pub fn needs_upload(local_size: u64, local_mtime_secs: u64, remote: Option<RemoteStat>) -> bool {
    match remote {
        None => true,
        Some(remote) => local_size != remote.size || local_mtime_secs > remote.mtime,
    }
}

/// Remote path for `local` under `remote_root`, always `/`-separated
pub fn remote_path_for(
    local_root: &Path,
    local: &Path,
    remote_root: &str,
) -> Result<String, DeployError> {
    let relative = local.strip_prefix(local_root).map_err(|_| {
        DeployError::Validation(format!(
            "{} is not under {}",
            local.display(),
            local_root.display()
        ))
    })?;

    let segments: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    Ok(join_remote(remote_root, &segments.join("/")))
}

/// Outcome of one sync pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub uploaded: usize,
    /// Files left alone because the remote copy was current
    pub skipped: usize,
    /// Remote paths uploaded, in upload order
    pub uploaded_files: Vec<String>,
    pub warnings: Vec<String>,
}

/// Mirrors a publish directory into a [`RemoteLayout`]
#[derive(Debug, Default, Clone, Copy)]
pub struct SyncEngine;

impl SyncEngine {
    pub fn new() -> Self {
        Self
    }

    /// Upload `local_root` to `layout.root()` over one session.
    ///
    /// The session is closed exactly once after a successful connect, on
    /// every exit path. Files uploaded before a failure stay on the host.
    pub async fn sync(
        &self,
        connector: &dyn RemoteConnector,
        profile: &ConnectionProfile,
        local_root: &Path,
        layout: &RemoteLayout,
        incremental: bool,
    ) -> Result<SyncReport, DeployError> {
        let local_dir = Dir::new(local_root);
        if !local_dir.exists().await {
            return Err(DeployError::Validation(format!(
                "local directory does not exist: {}",
                local_root.display()
            )));
        }
        let files = local_dir.list_files_recursive().await?;

        let mut session = connector.connect(profile).await?;
        let result = self
            .mirror(session.as_mut(), local_root, &files, layout, incremental)
            .await;
        let closed = session.end().await;

        match (result, closed) {
            (Ok(report), Ok(())) => Ok(report),
            (Ok(mut report), Err(e)) => {
                let msg = format!("closing session to {} failed: {}", profile, e);
                warn!("{}", msg);
                report.warnings.push(msg);
                Ok(report)
            }
            (Err(e), closed) => {
                if let Err(close_err) = closed {
                    debug!("Ignoring close failure after error: {}", close_err);
                }
                Err(e)
            }
        }
    }

    async fn mirror(
        &self,
        session: &mut dyn RemoteSession,
        local_root: &Path,
        files: &[PathBuf],
        layout: &RemoteLayout,
        incremental: bool,
    ) -> Result<SyncReport, DeployError> {
        let remote_root = layout.root();
        ensure_dir(session, &remote_root).await?;

        let mut candidates = Vec::with_capacity(files.len());
        let mut report = SyncReport::default();
        for file in files {
            let decision = self
                .decide(session, local_root, file, &remote_root, incremental)
                .await?;
            debug!(
                "{} -> {} (upload: {})",
                decision.local_path.display(),
                decision.remote_path,
                decision.needs_upload
            );
            if decision.needs_upload {
                candidates.push(decision);
            } else {
                report.skipped += 1;
            }
        }

        info!(
            "Uploading {} of {} files to {}",
            candidates.len(),
            files.len(),
            remote_root
        );

        let mut ensured: HashSet<String> = HashSet::new();
        ensured.insert(remote_root.clone());
        for decision in candidates {
            if let Some(parent) = remote_parent(&decision.remote_path) {
                if ensured.insert(parent.to_string()) {
                    ensure_dir(session, parent).await?;
                }
            }
            session
                .put(&decision.local_path, &decision.remote_path)
                .await
                .map_err(|e| match e {
                    DeployError::Transfer { .. } => e,
                    other => DeployError::transfer(decision.remote_path.clone(), other),
                })?;
            report.uploaded += 1;
            report.uploaded_files.push(decision.remote_path);
        }

        let executable = layout.executable();
        if let Err(e) = session.chmod(&executable, EXECUTABLE_MODE).await {
            let msg = format!("could not mark {} executable: {}", executable, e);
            warn!("{}", msg);
            report.warnings.push(msg);
        }

        info!(
            "Sync finished: {} uploaded, {} skipped",
            report.uploaded, report.skipped
        );
        Ok(report)
    }

    async fn decide(
        &self,
        session: &mut dyn RemoteSession,
        local_root: &Path,
        file: &Path,
        remote_root: &str,
        incremental: bool,
    ) -> Result<FileSyncDecision, DeployError> {
        let remote_path = remote_path_for(local_root, file, remote_root)?;
        if !incremental {
            return Ok(FileSyncDecision {
                local_path: file.to_path_buf(),
                remote_path,
                needs_upload: true,
            });
        }

        let metadata = tokio::fs::metadata(file).await?;
        let local_mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);

        // Any stat failure counts as absent
        let remote = session.stat(&remote_path).await.ok();
        Ok(FileSyncDecision {
            local_path: file.to_path_buf(),
            needs_upload: needs_upload(metadata.len(), local_mtime, remote),
            remote_path,
        })
    }
}

async fn ensure_dir(session: &mut dyn RemoteSession, path: &str) -> Result<(), DeployError> {
    match session.mkdir(path, true).await {
        Ok(()) | Err(DeployError::AlreadyExists(_)) => Ok(()),
        Err(e) => Err(e),
    }
}
