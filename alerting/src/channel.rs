//! Delivery channels for rendered alert batches.

use std::time::Duration;

use anyhow::{Context, bail};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tokio::process::Command;
use tracing::{debug, instrument};

#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, message: &str) -> anyhow::Result<()>;
}

/// Prints the batch to stdout between rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleChannel;

#[async_trait]
impl DeliveryChannel for ConsoleChannel {
    fn name(&self) -> &'static str {
        "console"
    }

    async fn deliver(&self, message: &str) -> anyhow::Result<()> {
        let rule = "=".repeat(60);
        println!("\n{rule}\n{message}\n{rule}\n");
        Ok(())
    }
}

/// Posts the batch as a chat-bot text message.
#[derive(Clone)]
pub struct WebhookChannel {
    http: Client,
    url: String,
}

impl WebhookChannel {
    pub fn new(url: String, timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build webhook http client")?;

        Ok(Self { http, url })
    }

    pub fn payload(message: &str) -> serde_json::Value {
        json!({
            "msg_type": "text",
            "content": { "text": message }
        })
    }
}

#[async_trait]
impl DeliveryChannel for WebhookChannel {
    fn name(&self) -> &'static str {
        "webhook"
    }

    #[instrument(skip_all, level = "debug")]
    async fn deliver(&self, message: &str) -> anyhow::Result<()> {
        self.http
            .post(&self.url)
            .json(&Self::payload(message))
            .send()
            .await?
            .error_for_status()
            .context("webhook rejected alert batch")?;

        debug!("webhook accepted alert batch");
        Ok(())
    }
}

/// Hands the batch to an external program as its final argument,
/// e.g. `openclaw message send <message>`.
#[derive(Debug, Clone)]
pub struct CommandChannel {
    program: String,
    args: Vec<String>,
}

impl CommandChannel {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Splits a whitespace separated command line. Returns `None` if empty.
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }
}

#[async_trait]
impl DeliveryChannel for CommandChannel {
    fn name(&self) -> &'static str {
        "command"
    }

    #[instrument(skip_all, fields(program = %self.program), level = "debug")]
    async fn deliver(&self, message: &str) -> anyhow::Result<()> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(message)
            .output()
            .await
            .with_context(|| format!("failed to spawn {}", self.program))?;

        if !output.status.success() {
            bail!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(())
    }
}
