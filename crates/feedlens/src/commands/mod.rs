//! Command implementations for feedlens CLI.
//!
//! Each submodule implements the logic for a command group. The helpers here
//! open the state store and run the analysis service inside the CLI process.

pub mod analyze;
pub mod copy;
pub mod credentials;
pub mod insights;
pub mod scan;
pub mod status;
pub mod watch;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use colored::Colorize;
use feedlens_core::client::HttpGenerationClient;
use feedlens_core::presenter::{self, Panel, PanelState};
use feedlens_core::{Message, MessageBus, Orchestrator, StateStore};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::CliError;

/// Open the state store named by the configuration.
pub fn open_store(config: &Config) -> Result<Arc<StateStore>> {
    let path = config.database_path();
    let store = StateStore::open(&path)
        .with_context(|| format!("Failed to open state store at {}", path.display()))?;
    Ok(Arc::new(store))
}

/// Start the orchestrator in this process and return the bus that reaches it.
pub fn start_service(config: &Config, store: Arc<StateStore>) -> Result<(MessageBus, JoinHandle<()>)> {
    let client = HttpGenerationClient::with_url(config.service.api_url.clone())
        .context("Failed to create generation client")?;
    let (bus, requests) = MessageBus::new();
    let handle = Orchestrator::new(store, Arc::new(client), bus.clone()).serve(requests);
    Ok((bus, handle))
}

/// Wait for the completion of `request_id`, showing a spinner meanwhile.
pub async fn wait_for_completion(
    completions: &mut broadcast::Receiver<Message>,
    panel: &mut Panel,
    request_id: &str,
    timeout_secs: u64,
) -> Result<()> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message("Generating insights...");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let outcome = tokio::time::timeout(
        Duration::from_secs(timeout_secs),
        next_completion(completions, panel),
    )
    .await;
    spinner.finish_and_clear();
    match outcome {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(request_id = %request_id, "Gave up waiting for completion");
            Err(CliError::Timeout(timeout_secs).into())
        }
    }
}

async fn next_completion(
    completions: &mut broadcast::Receiver<Message>,
    panel: &mut Panel,
) -> Result<()> {
    loop {
        match completions.recv().await {
            Ok(message) => {
                if panel.on_completion(&message)? {
                    return Ok(());
                }
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => {
                panel.load()?;
                return Ok(());
            }
        }
    }
}

/// Print the panel the way `feedlens insights` does.
pub fn print_panel(panel: &Panel) {
    match panel.state() {
        PanelState::Idle => {
            println!("{}", "No analysis yet.".yellow());
        }
        PanelState::Submitting | PanelState::Accepted { .. } => {
            println!("{}", "⏳ Analysis in progress...".yellow());
        }
        PanelState::Ready(insights) => {
            if let Some(post) = panel.source_text() {
                println!("{}", "Post".cyan().bold());
                println!("{}", "─".repeat(50));
                for line in post.lines().take(6) {
                    println!("  {}", line.dimmed());
                }
                println!();
            }
            println!("{}", format!("Insights ({})", insights.len()).cyan().bold());
            println!("{}", "─".repeat(50));
            for (i, insight) in insights.iter().enumerate() {
                println!("  {:>2}. {}", i + 1, insight.text);
            }
        }
        PanelState::Failed(message) => {
            println!("{} {}", "✗".red(), message.red());
        }
    }

    if let Some(status) = panel.status() {
        if !matches!(panel.state(), PanelState::Failed(_)) {
            match status.kind {
                presenter::StatusKind::Success => println!("{}", status.text.green()),
                presenter::StatusKind::Error => println!("{}", status.text.red()),
            }
        }
    }
}
