//! Deploy sequencing: publish, then upload and start for server deploys

use std::path::PathBuf;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::context::DeployContext;
use crate::deploy::fsm::{DeployEvent, DeployFsm, DeployState};
use crate::deploy::request::DeployRequest;
use crate::filesys::dir::Dir;
use crate::models::connection::DeployTarget;
use crate::models::outcome::{DeployResult, DeployStage, PipelinePhase};
use crate::notify::{self, Notifier};
use crate::publish::publisher::Publisher;
use crate::remote::exec::{RemoteExecutor, TemplateVars};
use crate::remote::sync::SyncEngine;
use crate::utils::generate_uuid;

/// Drives one deploy request to a terminal [`DeployResult`]
pub struct Deployer<'a> {
    ctx: &'a DeployContext,
    sync: SyncEngine,
    exec: RemoteExecutor,
    fsm: RwLock<DeployFsm>,
}

impl<'a> Deployer<'a> {
    pub fn new(ctx: &'a DeployContext) -> Self {
        Self {
            ctx,
            sync: SyncEngine::new(),
            exec: RemoteExecutor::new(),
            fsm: RwLock::new(DeployFsm::new(DeployTarget::Local)),
        }
    }

    /// State of the most recent deploy
    pub async fn state(&self) -> DeployState {
        self.fsm.read().await.state()
    }

    /// Run the request to a terminal result. A failure names the stage it
    /// happened in; optional steps only add warnings.
    pub async fn deploy(&self, request: &DeployRequest) -> DeployResult {
        let deploy_id = generate_uuid();
        let started_at = Utc::now();
        info!(
            deploy_id = %deploy_id,
            "Deploying {} ({}) to {:?}",
            request.publish.assembly_name, request.publish.target, request.target
        );
        *self.fsm.write().await = DeployFsm::new(request.target);

        let mut result = self.run(request).await;
        let elapsed_ms = (result.finished_at - started_at).num_milliseconds();
        if result.success {
            info!(deploy_id = %deploy_id, elapsed_ms, "Deploy finished");
        } else {
            error!(
                deploy_id = %deploy_id,
                elapsed_ms,
                "Deploy failed: {}",
                result.error.as_deref().unwrap_or("unknown error")
            );
        }

        if let Some(url) = &request.webhook_url {
            if let Err(e) = self.notify(url, request, &result).await {
                let msg = format!("notification failed: {}", e);
                warn!("{}", msg);
                result.warnings.push(msg);
            }
        }
        result
    }

    async fn run(&self, request: &DeployRequest) -> DeployResult {
        let mut warnings = Vec::new();

        let profile = match (request.target, &request.connection) {
            (DeployTarget::Local, _) => None,
            (DeployTarget::Server, Some(profile)) => Some(profile),
            (DeployTarget::Server, None) => {
                return DeployResult::failed(
                    DeployStage::Config,
                    "no connection profile for server deploy",
                    warnings,
                );
            }
        };

        if request.target == DeployTarget::Local && request.clean_destination {
            let out = Dir::new(&request.publish.output_dir);
            if let Err(e) = out.delete().await {
                let msg = format!("could not clean {}: {}", out.path().display(), e);
                warn!("{}", msg);
                warnings.push(msg);
            }
        }

        self.advance(DeployEvent::Publish).await;
        let mut options = request.publish.clone();
        options.status = match profile {
            None => Some(self.ctx.status.clone()),
            Some(_) => {
                let message = format!("Publishing {}", request.publish.assembly_name);
                self.ctx.status.report(PipelinePhase::Publish, &message);
                None
            }
        };

        let outcome = Publisher::new(self.ctx, &request.toolchain)
            .publish(&options)
            .await;
        warnings.extend(outcome.warnings);
        if !outcome.success {
            let detail = outcome.error.unwrap_or_else(|| "unknown error".to_string());
            return self.fail(DeployStage::Publish, detail, warnings).await;
        }
        self.advance(DeployEvent::Published).await;

        let Some(profile) = profile else {
            return DeployResult::succeeded(outcome.output_path, warnings);
        };

        self.ctx
            .status
            .report(PipelinePhase::Upload, &format!("Uploading to {}", profile));
        let report = match self
            .sync
            .sync(
                self.ctx.connector.as_ref(),
                profile,
                &request.publish.output_dir,
                &request.layout,
                request.incremental,
            )
            .await
        {
            Ok(report) => report,
            Err(e) => return self.fail(DeployStage::Upload, e, warnings).await,
        };
        warnings.extend(report.warnings);
        self.advance(DeployEvent::Uploaded).await;

        self.ctx
            .status
            .report(PipelinePhase::Start, &format!("Starting {}", request.layout.assembly_name));
        let vars = TemplateVars::for_layout(&request.layout);
        if let Err(e) = self
            .exec
            .run(
                self.ctx.connector.as_ref(),
                profile,
                &request.start_command,
                &vars,
                self.ctx.output.as_ref(),
            )
            .await
        {
            return self.fail(DeployStage::Start, e, warnings).await;
        }
        self.advance(DeployEvent::Started).await;

        DeployResult::succeeded(PathBuf::from(request.layout.root()), warnings)
    }

    async fn advance(&self, event: DeployEvent) {
        if let Err(e) = self.fsm.write().await.process(event) {
            error!("{}", e);
        }
    }

    async fn fail(
        &self,
        stage: DeployStage,
        detail: impl std::fmt::Display,
        warnings: Vec<String>,
    ) -> DeployResult {
        let result = DeployResult::failed(stage, detail, warnings);
        let message = result.error.clone().unwrap_or_default();
        self.advance(DeployEvent::Fail(message)).await;
        result
    }

    async fn notify(
        &self,
        url: &str,
        request: &DeployRequest,
        result: &DeployResult,
    ) -> Result<(), crate::errors::DeployError> {
        let host = sysinfo::System::host_name().unwrap_or_else(|| "unknown".to_string());
        let destination = match request.target {
            DeployTarget::Local => "local".to_string(),
            DeployTarget::Server => request
                .connection
                .as_ref()
                .map(|p| p.host.clone())
                .unwrap_or_else(|| "server".to_string()),
        };
        let text = notify::summary(&request.publish.assembly_name, &destination, &host, result);
        Notifier::new(url)?.send_text(&text).await
    }
}
