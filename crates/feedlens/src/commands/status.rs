//! Configuration and slot summary.

use anyhow::Result;
use chrono::{Local, TimeZone};
use colored::Colorize;
use feedlens_core::presenter::KeyStatus;
use feedlens_core::store::SlotView;
use serde_json::json;

use crate::commands::open_store;
use crate::config::Config;

pub async fn execute(as_json: bool, config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let credentials = store.credentials()?;
    let key = match credentials.api_key() {
        Some(_) => KeyStatus::Loaded,
        None => KeyStatus::Missing,
    };
    let slot = store.read_slot()?;
    let revision = store.revision()?;

    if as_json {
        let output = json!({
            "config": Config::config_path(),
            "database": config.database_path(),
            "apiUrl": config.service.api_url,
            "apiKeySet": key == KeyStatus::Loaded,
            "model": credentials.model(),
            "revision": revision,
            "slot": {
                "state": slot_state(&slot),
                "requestId": slot.request_id,
                "timestamp": slot.timestamp,
                "error": slot.error,
            },
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{}", "feedlens status".cyan().bold());
    println!("{}", "─".repeat(50));
    println!("  Config:   {}", Config::config_path().display());
    println!("  Database: {}", config.database_path().display());
    println!("  API URL:  {}", config.service.api_url);
    match key {
        KeyStatus::Missing => println!("  API Key:  {}", "not set".red()),
        _ => println!("  API Key:  {}", "set".green()),
    }
    println!("  Model:    {}", credentials.model());
    println!();

    println!("{}", "Last analysis".cyan().bold());
    println!("{}", "─".repeat(50));
    let state = slot_state(&slot);
    let state = match state {
        "ready" => state.green(),
        "failed" => state.red(),
        "pending" => state.yellow(),
        _ => state.dimmed(),
    };
    println!("  State:    {}", state);
    if let Some(id) = &slot.request_id {
        println!("  Request:  {}", id);
    }
    if let Some(at) = slot.timestamp.and_then(|ms| Local.timestamp_millis_opt(ms).single()) {
        println!("  Finished: {}", at.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(error) = &slot.error {
        println!("  Error:    {}", error.red());
    }
    println!("  Revision: {}", revision);
    Ok(())
}

fn slot_state(slot: &SlotView) -> &'static str {
    if slot.insights_text.is_some() {
        "ready"
    } else if slot.error.is_some() {
        "failed"
    } else if slot.is_pending() {
        "pending"
    } else {
        "empty"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_state_follows_load_order() {
        let mut slot = SlotView::default();
        assert_eq!(slot_state(&slot), "empty");

        slot.source_text = Some("post".into());
        assert_eq!(slot_state(&slot), "pending");

        slot.error = Some("API failed: 500.".into());
        assert_eq!(slot_state(&slot), "failed");

        slot.insights_text = Some("- one".into());
        assert_eq!(slot_state(&slot), "ready");
    }
}
