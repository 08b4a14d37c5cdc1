//! `llm-relay status` — show configuration and provider status.

use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use relay_core::config::{get_config_path, load_config};
use relay_providers::ProviderRegistry;

/// Run the status command.
pub fn run(config_path: Option<&Path>) -> Result<()> {
    let path = config_path.map(Path::to_path_buf).unwrap_or_else(get_config_path);
    let config = load_config(Some(&path));

    println!();
    println!("{}", "llm-relay status".cyan().bold());
    println!();

    println!(
        "  {:<14} {} {}",
        "Config:".bold(),
        path.display(),
        if path.exists() {
            "✓".green().to_string()
        } else {
            "(not found, using defaults)".red().to_string()
        }
    );

    // Cache
    let cache = if config.cache.enabled {
        format!("enabled, ttl {}s", config.cache.ttl_seconds)
    } else {
        "disabled".dimmed().to_string()
    };
    println!("  {:<14} {}", "Cache:".bold(), cache);

    // Dispatch
    println!(
        "  {:<14} {:?} | concurrency {} | backoff {}ms{}",
        "Dispatch:".bold(),
        config.dispatch.selection,
        config.dispatch.effective_concurrency(),
        config.dispatch.retry_backoff_millis,
        config
            .dispatch
            .batch_deadline_seconds
            .map(|s| format!(" | deadline {s}s"))
            .unwrap_or_default(),
    );

    // Providers
    println!();
    println!("  {}", "Providers:".bold());
    for (name, provider) in &config.providers {
        let status = if provider.is_configured() {
            format!(
                "{} {} credential(s)",
                "✓".green(),
                provider.credentials.iter().filter(|c| !c.is_empty()).count()
            )
        } else {
            format!("{}", "· no credentials".dimmed())
        };
        println!(
            "    {:<16} {} {}",
            name,
            status,
            format!(
                "{}{} | timeout {}s | attempts {}",
                provider.base_url,
                provider.path_or_default(),
                provider.timeout_seconds,
                provider.max_retries
            )
            .dimmed()
        );
    }

    println!();
    match ProviderRegistry::from_config(&config) {
        Ok(_) => println!("  {} ready to dispatch", "✓".green()),
        Err(e) => println!("  {} {}", "✗".red(), e),
    }
    println!();

    Ok(())
}
