//! Discovery of deployable projects under a directory

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::errors::DeployError;

/// Directories never searched for project files
const SKIPPED_DIRS: [&str; 4] = ["bin", "obj", ".git", "node_modules"];

/// A project file found on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    pub path: PathBuf,
    /// `<AssemblyName>`, or the file stem when unset
    pub assembly_name: String,
    /// `<OutputType>` is `Exe` or `WinExe`
    pub is_executable: bool,
}

impl Project {
    /// Read and parse one project file
    pub async fn load(path: &Path) -> Result<Self, DeployError> {
        let contents = tokio::fs::read_to_string(path).await?;
        Ok(Self::parse(path, &contents))
    }

    pub fn parse(path: &Path, contents: &str) -> Self {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let assembly_name = element_text(contents, "AssemblyName")
            .filter(|name| !name.is_empty() && !name.contains("$("))
            .unwrap_or(stem);
        let is_executable = matches!(
            element_text(contents, "OutputType").as_deref(),
            Some(t) if t.eq_ignore_ascii_case("exe") || t.eq_ignore_ascii_case("winexe")
        );

        Self {
            path: path.to_path_buf(),
            assembly_name,
            is_executable,
        }
    }

    /// Directory containing the project file
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }
}

/// Trimmed text of the first `<tag>...</tag>` element
fn element_text(contents: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = contents.find(&open)? + open.len();
    let end = contents[start..].find(&close)? + start;
    Some(contents[start..end].trim().to_string())
}

fn is_skipped(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|name| SKIPPED_DIRS.contains(&name))
            .unwrap_or(false)
}

/// Every `*.csproj` under `root`, sorted by path
pub async fn discover(root: &Path) -> Result<Vec<Project>, DeployError> {
    if !root.is_dir() {
        return Err(DeployError::Validation(format!(
            "not a directory: {}",
            root.display()
        )));
    }

    let root = root.to_path_buf();
    let paths = tokio::task::spawn_blocking(move || {
        WalkDir::new(&root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_skipped(e))
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    None
                }
            })
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().map(|x| x == "csproj").unwrap_or(false))
            .map(|e| e.into_path())
            .collect::<Vec<_>>()
    })
    .await?;

    let mut projects = Vec::with_capacity(paths.len());
    for path in paths {
        match Project::load(&path).await {
            Ok(project) => {
                debug!("Found project {} ({})", project.assembly_name, path.display());
                projects.push(project);
            }
            Err(e) => warn!("Cannot read {}: {}", path.display(), e),
        }
    }
    Ok(projects)
}
