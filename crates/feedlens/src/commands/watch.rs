//! Live page: fragments dropped into a directory are appended to the feed.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use anyhow::{Context, Result};
use colored::Colorize;
use feedlens_core::injector::TriggerId;
use feedlens_core::page::PageScanner;
use feedlens_core::presenter::Panel;
use feedlens_core::{Document, NodeId, SharedDocument};
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::cli::WatchCommand;
use crate::commands::{open_store, print_panel, start_service, wait_for_completion};
use crate::config::Config;

const REPORT_INTERVAL: Duration = Duration::from_secs(1);
/// A fragment is appended once its size and mtime held still this long.
const FRAGMENT_SETTLE: Duration = Duration::from_millis(500);
const SETTLE_POLL: Duration = Duration::from_millis(100);
const ANALYSIS_TIMEOUT_SECS: u64 = 120;

pub async fn execute(cmd: WatchCommand, config: &Config) -> Result<()> {
    if !cmd.dir.is_dir() {
        anyhow::bail!("Not a directory: {}", cmd.dir.display());
    }

    let document = Document::parse("<html><body><main></main></body></html>")?.into_shared();
    let feed = feed_root(&document)?;

    let store = open_store(config)?;
    let (bus, _service) = start_service(config, store.clone())?;
    let scanner = Arc::new(PageScanner::with_container(document.clone(), feed, bus.clone()));
    let scheduler = scanner.start()?;

    let mut tracker = FragmentTracker::default();
    for path in fragments(&cmd.dir)? {
        match append_fragment(&document, feed, &path) {
            Ok(()) => tracker.appended(path),
            Err(e) => warn!(path = %path.display(), error = %e, "Fragment not appended"),
        }
    }

    let (event_tx, mut event_rx) = mpsc::channel(256);
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = event_tx.blocking_send(res);
        },
        NotifyConfig::default(),
    )
    .context("Failed to create file watcher")?;
    watcher
        .watch(&cmd.dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("Failed to watch {}", cmd.dir.display()))?;

    println!("{}", format!("Watching {}", cmd.dir.display()).cyan().bold());
    println!("  Drop *.html fragments into the directory. Type a trigger number to analyze, Ctrl+C to stop.");
    println!("{}", "─".repeat(50));

    let mut reported = 0;
    let mut report = tokio::time::interval(REPORT_INTERVAL);
    let mut settle = tokio::time::interval(SETTLE_POLL);
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            Some(res) = event_rx.recv() => {
                let event: Event = match res {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(error = %e, "Watch error");
                        continue;
                    }
                };
                if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    continue;
                }
                let now = Instant::now();
                for path in event.paths.into_iter().filter(|p| is_fragment(p)) {
                    if let Some(sig) = signature(&path) {
                        tracker.observe(path, sig, now);
                    }
                }
            }
            _ = settle.tick() => {
                for path in tracker.due(Instant::now(), signature) {
                    match append_fragment(&document, feed, &path) {
                        Ok(()) => tracker.appended(path),
                        Err(e) => warn!(
                            path = %path.display(),
                            error = %e,
                            "Fragment not appended; waiting for the file to change"
                        ),
                    }
                }
            }
            _ = report.tick() => {
                let triggers = scanner.injector().triggers()?;
                for trigger in triggers.iter().skip(reported) {
                    let preview: String = trigger.text.chars().take(70).collect();
                    println!("  {} [{}] {}", "+".green(), trigger.id.0 + 1, preview);
                }
                reported = triggers.len();
            }
            line = stdin.next_line(), if stdin_open => {
                match line? {
                    Some(line) => {
                        if let Ok(number) = line.trim().parse::<usize>() {
                            activate(&scanner, &store, &bus, number).await?;
                        }
                    }
                    None => stdin_open = false,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    scheduler.stop();
    println!();
    println!("Stopped after {} scan(s)", scheduler.scan_count());
    Ok(())
}

async fn activate(
    scanner: &PageScanner,
    store: &Arc<feedlens_core::StateStore>,
    bus: &feedlens_core::MessageBus,
    number: usize,
) -> Result<()> {
    if number == 0 {
        println!("{}", "Trigger numbers start at 1".yellow());
        return Ok(());
    }
    let id = TriggerId(number - 1);
    let mut completions = bus.subscribe();
    let ack = match scanner.injector().activate(id).await {
        Ok(ack) => ack,
        Err(e) => {
            println!("{}", e.to_string().yellow());
            return Ok(());
        }
    };
    let state = scanner.injector().trigger(id)?.state;
    println!("  [{}] {}", number, state.label());

    let Some(ack) = ack else {
        return Ok(());
    };
    let mut panel = Panel::new(store.clone(), bus.clone());
    if panel.load()?.is_waiting() {
        wait_for_completion(&mut completions, &mut panel, &ack.request_id, ANALYSIS_TIMEOUT_SECS).await?;
    }
    print_panel(&panel);
    println!("{}", "─".repeat(50));
    Ok(())
}

/// Size and modification time of a fragment file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Signature {
    len: u64,
    modified: Option<SystemTime>,
}

fn signature(path: &Path) -> Option<Signature> {
    let meta = std::fs::metadata(path).ok()?;
    Some(Signature {
        len: meta.len(),
        modified: meta.modified().ok(),
    })
}

/// Fragments waiting for their file to stop changing. Each file is
/// appended at most once.
#[derive(Debug, Default)]
struct FragmentTracker {
    pending: HashMap<PathBuf, (Signature, Instant)>,
    appended: HashSet<PathBuf>,
}

impl FragmentTracker {
    /// Record a change; the settle window restarts on every change.
    fn observe(&mut self, path: PathBuf, sig: Signature, now: Instant) {
        if self.appended.contains(&path) {
            debug!(path = %path.display(), "Fragment already appended; change ignored");
            return;
        }
        self.pending.insert(path, (sig, now + FRAGMENT_SETTLE));
    }

    /// Paths whose window elapsed with the file unchanged since the last event.
    fn due<F>(&mut self, now: Instant, current: F) -> Vec<PathBuf>
    where
        F: Fn(&Path) -> Option<Signature>,
    {
        let expired: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, (_, deadline))| *deadline <= now)
            .map(|(path, _)| path.clone())
            .collect();

        let mut ready = Vec::new();
        for path in expired {
            let Some((recorded, _)) = self.pending.remove(&path) else {
                continue;
            };
            match current(&path) {
                Some(sig) if sig == recorded => ready.push(path),
                Some(sig) => self.observe(path, sig, now),
                None => debug!(path = %path.display(), "Fragment vanished before settling"),
            }
        }
        ready.sort();
        ready
    }

    fn appended(&mut self, path: PathBuf) {
        self.pending.remove(&path);
        self.appended.insert(path);
    }
}

fn feed_root(document: &SharedDocument) -> Result<NodeId> {
    let doc = document
        .lock()
        .map_err(|_| feedlens_core::Error::LockPoisoned)?;
    let root = doc.root();
    doc.select(root, "main")?
        .into_iter()
        .next()
        .context("Feed root element missing")
}

fn append_fragment(document: &SharedDocument, feed: NodeId, path: &Path) -> Result<()> {
    let markup = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut doc = document
        .lock()
        .map_err(|_| feedlens_core::Error::LockPoisoned)?;
    let added = doc.append_markup(feed, &markup)?;
    debug!(path = %path.display(), nodes = added.len(), "Appended fragment");
    Ok(())
}

fn is_fragment(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("html"))
}

fn fragments(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| is_fragment(path))
        .collect();
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_fragments_are_sorted_html_files() {
        let temp = tempdir().expect("Failed to create temp dir");
        std::fs::write(temp.path().join("b.html"), "<div></div>").expect("write");
        std::fs::write(temp.path().join("a.HTML"), "<div></div>").expect("write");
        std::fs::write(temp.path().join("notes.txt"), "skip").expect("write");

        let found = fragments(temp.path()).expect("Failed to list");
        let names: Vec<_> = found
            .iter()
            .filter_map(|p| p.file_name()?.to_str())
            .collect();
        assert_eq!(names, vec!["a.HTML", "b.html"]);
    }

    #[test]
    fn test_append_fragment_grows_feed() {
        let temp = tempdir().expect("Failed to create temp dir");
        let path = temp.path().join("post.html");
        std::fs::write(&path, "<div class=\"post\"><p>hello</p></div>").expect("write");

        let document = Document::parse("<html><body><main></main></body></html>")
            .expect("parse")
            .into_shared();
        let feed = feed_root(&document).expect("feed root");
        append_fragment(&document, feed, &path).expect("append");

        let doc = document.lock().expect("lock");
        assert_eq!(doc.children(feed).len(), 1);
        assert_eq!(doc.text_content(feed).trim(), "hello");
    }

    fn sig(len: u64) -> Signature {
        Signature { len, modified: None }
    }

    #[test]
    fn test_fragment_waits_for_settle_window() {
        let start = Instant::now();
        let path = PathBuf::from("/feed/post.html");
        let mut tracker = FragmentTracker::default();

        tracker.observe(path.clone(), sig(10), start);
        assert!(tracker.due(start + Duration::from_millis(100), |_| Some(sig(10))).is_empty());

        // Still growing when the window closes: wait another window.
        let later = start + FRAGMENT_SETTLE;
        assert!(tracker.due(later, |_| Some(sig(20))).is_empty());
        assert!(tracker.due(later + Duration::from_millis(100), |_| Some(sig(20))).is_empty());

        let settled = later + FRAGMENT_SETTLE;
        assert_eq!(tracker.due(settled, |_| Some(sig(20))), vec![path.clone()]);
        assert!(tracker.due(settled, |_| Some(sig(20))).is_empty());

        tracker.appended(path.clone());
        tracker.observe(path, sig(30), settled);
        assert!(tracker.due(settled + FRAGMENT_SETTLE, |_| Some(sig(30))).is_empty());
    }

    #[test]
    fn test_fragment_retried_after_failed_append_is_added_once() {
        let temp = tempdir().expect("Failed to create temp dir");
        let path = temp.path().join("post.html");
        std::fs::write(
            &path,
            "<div class=\"feed-shared-update-v2\">keep</div><div a=\"x\" a=\"y\"></div><!x",
        )
        .expect("write");

        let document = Document::parse("<html><body><main></main></body></html>")
            .expect("parse")
            .into_shared();
        let feed = feed_root(&document).expect("feed root");
        let mut tracker = FragmentTracker::default();
        let start = Instant::now();

        tracker.observe(path.clone(), signature(&path).expect("signature"), start);
        let due = tracker.due(start + FRAGMENT_SETTLE, signature);
        assert_eq!(due, vec![path.clone()]);
        assert!(append_fragment(&document, feed, &path).is_err());
        assert!(document.lock().expect("lock").children(feed).is_empty());

        std::fs::write(&path, "<div class=\"feed-shared-update-v2\">keep</div>").expect("write");
        let retry = start + FRAGMENT_SETTLE * 2;
        tracker.observe(path.clone(), signature(&path).expect("signature"), retry);
        for due in tracker.due(retry + FRAGMENT_SETTLE, signature) {
            append_fragment(&document, feed, &due).expect("append");
            tracker.appended(due);
        }

        let doc = document.lock().expect("lock");
        assert_eq!(doc.children(feed).len(), 1);
        assert_eq!(doc.select(feed, ".feed-shared-update-v2").expect("select").len(), 1);
    }
}
