//! Shared CLI helpers — path expansion, batch summary printing.

use std::collections::BTreeMap;
use std::path::PathBuf;

use colored::Colorize;

use relay_dispatch::BatchResult;
use relay_providers::observer::ProviderStats;

/// Expand `~` at the start of a path to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_next::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs_next::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

/// Counts of each slot status, in display order.
pub fn tally(results: &[BatchResult]) -> [(&'static str, usize); 4] {
    let mut counts = [("cached", 0), ("success", 0), ("rate_limited", 0), ("failed", 0)];
    for result in results {
        if let Some(slot) = counts.iter_mut().find(|(label, _)| *label == result.status_label()) {
            slot.1 += 1;
        }
    }
    counts
}

/// Print a batch summary to stderr so stdout stays machine-readable.
pub fn print_summary(results: &[BatchResult], stats: &BTreeMap<String, ProviderStats>) {
    eprintln!();
    eprintln!(
        "{}  {}",
        "llm-relay".cyan().bold(),
        relay_core::utils::timestamp().dimmed()
    );

    let line: Vec<String> = tally(results)
        .iter()
        .map(|(label, n)| {
            let text = format!("{label}: {n}");
            match *label {
                "failed" | "rate_limited" if *n > 0 => text.red().to_string(),
                "success" | "cached" if *n > 0 => text.green().to_string(),
                _ => text.dimmed().to_string(),
            }
        })
        .collect();
    eprintln!("  {:<12} {} | {}", "Requests:".bold(), results.len(), line.join(" | "));

    if stats.is_empty() {
        eprintln!("  {}", "(no provider calls)".dimmed());
    }
    for (provider, s) in stats {
        eprintln!(
            "  {:<12} {} attempts | ok {} | 429 {} | err {} | mean {}ms | max {}ms",
            format!("{provider}:").bold(),
            s.attempts(),
            s.success,
            s.rate_limited,
            s.failed,
            s.mean_latency().as_millis(),
            s.latency_max.as_millis(),
        );
    }
    eprintln!();
}
