//! Show the latest insights.

use std::time::Duration;

use anyhow::Result;
use feedlens_core::presenter::{Panel, PanelState};
use feedlens_core::MessageBus;
use serde_json::json;

use crate::cli::InsightsCommand;
use crate::commands::{open_store, print_panel};
use crate::config::Config;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

pub async fn execute(cmd: InsightsCommand, config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let (bus, _requests) = MessageBus::new();
    let mut panel = Panel::new(store.clone(), bus);

    panel.load()?;
    show(&panel, cmd.json)?;
    if !cmd.follow {
        return Ok(());
    }

    // Other processes write the same database, so watch the write counter.
    let mut seen = store.revision()?;
    let mut interval = tokio::time::interval(POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let revision = store.revision()?;
                if revision == seen {
                    continue;
                }
                seen = revision;
                let before = panel.state().clone();
                if *panel.load()? != before {
                    println!();
                    show(&panel, cmd.json)?;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                return Ok(());
            }
        }
    }
}

fn show(panel: &Panel, as_json: bool) -> Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(&to_json(panel))?);
    } else {
        print_panel(panel);
    }
    Ok(())
}

fn to_json(panel: &Panel) -> serde_json::Value {
    match panel.state() {
        PanelState::Idle => json!({ "state": "idle" }),
        PanelState::Submitting => json!({ "state": "submitting" }),
        PanelState::Accepted { request_id } => json!({
            "state": "pending",
            "requestId": request_id,
            "post": panel.source_text(),
        }),
        PanelState::Ready(insights) => json!({
            "state": "ready",
            "post": panel.source_text(),
            "insights": insights,
        }),
        PanelState::Failed(message) => json!({
            "state": "failed",
            "post": panel.source_text(),
            "error": message,
        }),
    }
}
