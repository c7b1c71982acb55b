//! Post-deploy command execution

use std::fmt;

use tracing::{error, info};

use crate::context::OutputSink;
use crate::errors::DeployError;
use crate::models::connection::{ConnectionProfile, RemoteLayout};
use crate::remote::session::RemoteConnector;

/// Placeholders recognised in a command template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    AppName,
    RemotePath,
    AppPath,
}

impl Placeholder {
    pub const ALL: [Placeholder; 3] = [
        Placeholder::AppName,
        Placeholder::RemotePath,
        Placeholder::AppPath,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Placeholder::AppName => "app_name",
            Placeholder::RemotePath => "remote_path",
            Placeholder::AppPath => "app_path",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.name())
    }
}

/// Values substituted into a command template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateVars {
    pub app_name: String,
    /// Remote install directory
    pub remote_path: String,
    /// Full path of the remote executable
    pub app_path: String,
}

impl TemplateVars {
    pub fn for_layout(layout: &RemoteLayout) -> Self {
        Self {
            app_name: layout.assembly_name.clone(),
            remote_path: layout.root(),
            app_path: layout.executable(),
        }
    }

    fn value(&self, placeholder: Placeholder) -> &str {
        match placeholder {
            Placeholder::AppName => &self.app_name,
            Placeholder::RemotePath => &self.remote_path,
            Placeholder::AppPath => &self.app_path,
        }
    }
}

/// Substitute `{app_name}`, `{remote_path}` and `{app_path}` in one pass.
///
/// Anything else in braces is copied through untouched, and substituted
/// values are never expanded again.
pub fn expand_template(template: &str, vars: &TemplateVars) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => match Placeholder::from_name(&after[..close]) {
                Some(placeholder) => {
                    out.push_str(vars.value(placeholder));
                    rest = &after[close + 1..];
                }
                None => {
                    out.push('{');
                    rest = after;
                }
            },
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Result of a remote command that exited cleanly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecReport {
    pub exit_code: i32,
}

/// Runs the templated start command over SSH
#[derive(Debug, Default, Clone, Copy)]
pub struct RemoteExecutor;

impl RemoteExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Expand `template` and run it in a pty, streaming output to `sink`
    pub async fn run(
        &self,
        connector: &dyn RemoteConnector,
        profile: &ConnectionProfile,
        template: &str,
        vars: &TemplateVars,
        sink: &dyn OutputSink,
    ) -> Result<ExecReport, DeployError> {
        let command = expand_template(template, vars);
        let mut session = connector.connect(profile).await?;

        info!("Running on {}: {}", profile, command);
        let result = session.exec(&command, true, sink).await;
        if let Err(e) = session.end().await {
            info!("Closing exec session failed: {}", e);
        }

        let exit_code = result?;
        if exit_code != 0 {
            error!("Remote command exited with code {}", exit_code);
            return Err(DeployError::RemoteExec(format!("exit code {}", exit_code)));
        }
        Ok(ExecReport { exit_code })
    }
}
