//! Chat webhook notifications

use reqwest::Client;
use serde::Serialize;
use tracing::{debug, error};

use crate::errors::DeployError;
use crate::models::outcome::DeployResult;

#[derive(Debug, Serialize)]
struct TextContent<'a> {
    text: &'a str,
}

/// Body accepted by the chat bot webhook
#[derive(Debug, Serialize)]
struct TextMessage<'a> {
    msg_type: &'static str,
    content: TextContent<'a>,
}

/// Posts deploy summaries to a webhook
pub struct Notifier {
    client: Client,
    webhook_url: String,
}

impl Notifier {
    pub fn new(webhook_url: &str) -> Result<Self, DeployError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            webhook_url: webhook_url.to_string(),
        })
    }

    /// Send a plain text message
    pub async fn send_text(&self, text: &str) -> Result<(), DeployError> {
        debug!("POST {}", self.webhook_url);
        let body = TextMessage {
            msg_type: "text",
            content: TextContent { text },
        };

        let response = self.client.post(&self.webhook_url).json(&body).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Webhook failed: {} - {}", status, body);
            return Err(DeployError::Notify(format!("{}: {}", status, body)));
        }
        Ok(())
    }
}

/// One-line summary of a finished deploy
pub fn summary(app_name: &str, destination: &str, host: &str, result: &DeployResult) -> String {
    let mut text = if result.success {
        format!("[aotship] {} deployed to {} from {}", app_name, destination, host)
    } else {
        format!(
            "[aotship] {} deploy to {} from {} FAILED: {}",
            app_name,
            destination,
            host,
            result.error.as_deref().unwrap_or("unknown error")
        )
    };
    if let Some(warning) = result.warning() {
        text.push_str(&format!(" (warnings: {})", warning));
    }
    text
}
