//! One-shot scan of a feed snapshot.

use anyhow::{Context, Result};
use colored::Colorize;
use feedlens_core::injector::{Trigger, TriggerId, TriggerState};
use feedlens_core::page::PageScanner;
use feedlens_core::presenter::Panel;
use feedlens_core::Document;

use crate::cli::ScanCommand;
use crate::commands::{open_store, print_panel, start_service, wait_for_completion};
use crate::config::Config;
use crate::error::CliError;

pub async fn execute(cmd: ScanCommand, config: &Config) -> Result<()> {
    let markup = std::fs::read_to_string(&cmd.file)
        .with_context(|| format!("Failed to read {}", cmd.file.display()))?;
    let document = Document::parse(&markup)
        .with_context(|| format!("Failed to parse {}", cmd.file.display()))?
        .into_shared();

    let store = open_store(config)?;
    let (bus, _service) = start_service(config, store.clone())?;
    let scanner = PageScanner::new(document, bus.clone())?;

    let report = scanner.scan()?;
    let triggers = scanner.injector().triggers()?;

    println!("{}", format!("Scan: {}", cmd.file.display()).cyan().bold());
    println!("{}", "─".repeat(50));
    if triggers.is_empty() {
        println!("  {}", "No actionable posts found.".yellow());
    }
    for trigger in &triggers {
        print_trigger(trigger);
    }
    if report.blocks > triggers.len() {
        println!(
            "  {}",
            format!("{} post(s) had no action region", report.blocks - triggers.len()).dimmed()
        );
    }

    let Some(number) = cmd.trigger else {
        return Ok(());
    };
    if number == 0 || number > triggers.len() {
        return Err(CliError::TriggerNotFound(number).into());
    }
    let id = TriggerId(number - 1);

    let mut completions = bus.subscribe();
    let ack = scanner.injector().activate(id).await?;
    let state = scanner.injector().trigger(id)?.state;
    println!();
    println!("  [{}] {}", number, label(state));

    let Some(ack) = ack else {
        return Ok(());
    };

    let mut panel = Panel::new(store, bus);
    if panel.load()?.is_waiting() {
        wait_for_completion(&mut completions, &mut panel, &ack.request_id, cmd.timeout).await?;
    }
    println!();
    print_panel(&panel);
    Ok(())
}

fn print_trigger(trigger: &Trigger) {
    let preview: String = trigger.text.lines().next().unwrap_or_default().chars().take(70).collect();
    println!(
        "  [{}] {} {}",
        trigger.id.0 + 1,
        preview,
        format!("({} chars)", trigger.text.chars().count()).dimmed()
    );
}

fn label(state: TriggerState) -> colored::ColoredString {
    match state {
        TriggerState::Ready => state.label().green(),
        TriggerState::Error => state.label().red(),
        _ => state.label().normal(),
    }
}
