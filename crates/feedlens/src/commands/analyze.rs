//! Manual analysis of pasted text.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use feedlens_core::presenter::Panel;

use crate::cli::AnalyzeCommand;
use crate::commands::{open_store, print_panel, start_service, wait_for_completion};
use crate::config::Config;
use crate::error::CliError;

pub async fn execute(cmd: AnalyzeCommand, config: &Config) -> Result<()> {
    let text = match (cmd.text, cmd.file) {
        (Some(text), _) => text,
        (None, Some(path)) => read_input(&path)?,
        (None, None) => {
            return Err(CliError::InvalidInput("pass --text or --file".to_string()).into());
        }
    };

    let store = open_store(config)?;
    let (bus, _service) = start_service(config, store.clone())?;
    let mut completions = bus.subscribe();
    let mut panel = Panel::new(store, bus);

    if let Some(ack) = panel.submit(&text).await? {
        wait_for_completion(&mut completions, &mut panel, &ack.request_id, cmd.timeout).await?;
    }
    print_panel(&panel);
    Ok(())
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}
