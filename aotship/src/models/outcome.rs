//! Pipeline phases and deploy results

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A reported step of the pipeline.
///
/// Local deploys report `Compile`, `Upx` and `Package`; server deploys
/// report `Publish`, `Upload` and `Start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelinePhase {
    Compile,
    Upx,
    Package,
    Publish,
    Upload,
    Start,
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelinePhase::Compile => "compile",
            PipelinePhase::Upx => "upx",
            PipelinePhase::Package => "package",
            PipelinePhase::Publish => "publish",
            PipelinePhase::Upload => "upload",
            PipelinePhase::Start => "start",
        };
        f.write_str(name)
    }
}

/// Stage of a deploy that produced the terminal result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployStage {
    Config,
    Publish,
    Upload,
    Start,
    Done,
}

impl DeployStage {
    /// Prefix used for terminal failure messages
    pub fn failure_label(&self) -> &'static str {
        match self {
            DeployStage::Config => "configuration invalid",
            DeployStage::Publish => "publish failed",
            DeployStage::Upload => "upload failed",
            DeployStage::Start => "start failed",
            DeployStage::Done => "deploy failed",
        }
    }
}

/// Terminal value of one deploy request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployResult {
    pub success: bool,

    /// Last stage reached; on failure, the stage that failed
    pub stage: DeployStage,

    /// Local output (publish dir or packaged bundle) or remote install root
    pub output_path: Option<PathBuf>,

    pub error: Option<String>,

    /// Non-fatal problems encountered along the way
    #[serde(default)]
    pub warnings: Vec<String>,

    pub finished_at: DateTime<Utc>,
}

impl DeployResult {
    pub fn succeeded(output_path: PathBuf, warnings: Vec<String>) -> Self {
        Self {
            success: true,
            stage: DeployStage::Done,
            output_path: Some(output_path),
            error: None,
            warnings,
            finished_at: Utc::now(),
        }
    }

    pub fn failed(stage: DeployStage, detail: impl fmt::Display, warnings: Vec<String>) -> Self {
        Self {
            success: false,
            stage,
            output_path: None,
            error: Some(format!("{}: {}", stage.failure_label(), detail)),
            warnings,
            finished_at: Utc::now(),
        }
    }

    /// All warnings joined for display, if any
    pub fn warning(&self) -> Option<String> {
        if self.warnings.is_empty() {
            None
        } else {
            Some(self.warnings.join("; "))
        }
    }
}
