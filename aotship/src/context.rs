//! Shared per-session context passed into every pipeline component

use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, RwLock};

use crate::models::outcome::PipelinePhase;
use crate::models::target::HostPlatform;
use crate::publish::package::Packager;
use crate::publish::runner::CommandRunner;
use crate::remote::session::RemoteConnector;
use crate::storage::settings::ToolchainSettings;
use crate::toolchain::detector::{self, ToolchainStatus};

/// Destination for streamed subprocess and remote output
pub trait OutputSink: Send + Sync {
    fn append(&self, text: &str);

    fn append_line(&self, line: &str) {
        self.append(line);
        self.append("\n");
    }
}

/// Writes output straight to stdout
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl OutputSink for ConsoleSink {
    fn append(&self, text: &str) {
        use std::io::Write;
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }
}

/// Collects output in memory
#[derive(Debug, Default)]
pub struct BufferSink {
    buf: Mutex<String>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        self.buf.lock().map(|b| b.clone()).unwrap_or_default()
    }
}

impl OutputSink for BufferSink {
    fn append(&self, text: &str) {
        if let Ok(mut buf) = self.buf.lock() {
            buf.push_str(text);
        }
    }
}

/// A phase transition emitted while a deploy runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseEvent {
    pub phase: PipelinePhase,
    pub message: String,
}

/// Observer for pipeline phase transitions
pub trait StatusReporter: Send + Sync {
    fn report(&self, phase: PipelinePhase, message: &str);
}

impl StatusReporter for mpsc::UnboundedSender<PhaseEvent> {
    fn report(&self, phase: PipelinePhase, message: &str) {
        // A dropped receiver just means nobody is watching
        let _ = self.send(PhaseEvent {
            phase,
            message: message.to_string(),
        });
    }
}

/// Everything a deploy needs from its environment.
///
/// Created once per host session and shared by all components.
pub struct DeployContext {
    pub host: HostPlatform,
    pub output: Arc<dyn OutputSink>,
    pub status: Arc<dyn StatusReporter>,
    pub runner: Arc<dyn CommandRunner>,
    pub connector: Arc<dyn RemoteConnector>,
    pub packager: Arc<dyn Packager>,
    toolchain: RwLock<Option<ToolchainStatus>>,
}

impl DeployContext {
    pub fn new(
        host: HostPlatform,
        output: Arc<dyn OutputSink>,
        status: Arc<dyn StatusReporter>,
        runner: Arc<dyn CommandRunner>,
        connector: Arc<dyn RemoteConnector>,
        packager: Arc<dyn Packager>,
    ) -> Self {
        Self {
            host,
            output,
            status,
            runner,
            connector,
            packager,
            toolchain: RwLock::new(None),
        }
    }

    /// Toolchain status, detected on first use and cached for the session
    pub async fn toolchain(&self, settings: &ToolchainSettings) -> ToolchainStatus {
        if let Some(status) = self.toolchain.read().await.as_ref() {
            return status.clone();
        }
        let status = detector::detect(settings).await;
        *self.toolchain.write().await = Some(status.clone());
        status
    }

    /// Replace the cached toolchain status
    pub async fn set_toolchain(&self, status: ToolchainStatus) {
        *self.toolchain.write().await = Some(status);
    }
}
