//! Copy one insight to the system clipboard.

use anyhow::Result;
use colored::Colorize;
use feedlens_core::presenter::clipboard::SystemClipboard;
use feedlens_core::presenter::{Panel, PanelState, StatusKind, COPY_FAILED_MESSAGE};
use feedlens_core::MessageBus;

use crate::commands::open_store;
use crate::config::Config;
use crate::error::CliError;

pub async fn execute(index: usize, config: &Config) -> Result<()> {
    if index == 0 {
        return Err(CliError::InvalidInput("insight numbers start at 1".to_string()).into());
    }

    let store = open_store(config)?;
    let (bus, _requests) = MessageBus::new();
    let mut panel = Panel::new(store, bus);

    let count = match panel.load()? {
        PanelState::Ready(insights) => insights.len(),
        _ => 0,
    };
    if index > count {
        return Err(CliError::InsightNotFound(index).into());
    }

    let outcome = SystemClipboard::detect().and_then(|clipboard| panel.copy(index - 1, &clipboard));
    match (&outcome, panel.status()) {
        (Ok(()), Some(status)) if status.kind == StatusKind::Success => {
            println!("{} {}", panel.copy_label(index - 1), status.text.green());
        }
        _ => println!("{}", COPY_FAILED_MESSAGE.red()),
    }
    outcome?;
    Ok(())
}
