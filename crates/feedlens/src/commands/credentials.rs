//! Credentials management.

use anyhow::{Context, Result};
use colored::Colorize;
use dialoguer::Password;
use feedlens_core::presenter::{self, KeyStatus};

use crate::cli::{CredentialsAction, CredentialsCommand};
use crate::commands::open_store;
use crate::config::Config;

pub async fn execute(cmd: CredentialsCommand, config: &Config) -> Result<()> {
    match cmd.action {
        CredentialsAction::Set { api_key, model } => set(api_key, &model, config),
        CredentialsAction::Show => show(config),
    }
}

fn set(api_key: Option<String>, model: &str, config: &Config) -> Result<()> {
    let api_key = match api_key {
        Some(key) => key,
        None => Password::new()
            .with_prompt("API Key")
            .allow_empty_password(true)
            .interact()
            .context("Failed to read API key")?,
    };

    let store = open_store(config)?;
    let status = presenter::save_credentials(&store, &api_key, model)?;
    match status {
        KeyStatus::Missing => println!("{}", status.message().red()),
        _ => println!("{} {}", "✓".green(), status.message()),
    }
    println!("  Model: {}", store.credentials()?.model());
    Ok(())
}

fn show(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let credentials = store.credentials()?;

    println!("{}", "Credentials".cyan().bold());
    println!("{}", "─".repeat(50));
    match credentials.api_key() {
        Some(key) => println!("  API Key: {}", mask(key)),
        None => println!("  API Key: {}", "API Key not set. Please save your API Key.".red()),
    }
    println!("  Model:   {}", credentials.model());
    Ok(())
}

fn mask(key: &str) -> String {
    let tail: String = key.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    if key.chars().count() <= 8 {
        "••••".to_string()
    } else {
        format!("••••{}", tail)
    }
}
