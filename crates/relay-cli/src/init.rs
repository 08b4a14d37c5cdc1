//! `llm-relay init` — write a default config file.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;

use relay_core::config::{get_config_path, save_config, Config};

/// Run the init command.
pub fn run(config_path: Option<&Path>) -> Result<()> {
    let path = config_path.map(Path::to_path_buf).unwrap_or_else(get_config_path);

    println!();
    if path.exists() {
        println!("  {} config already exists at {}", "✓".green(), path.display());
    } else {
        save_config(&Config::default(), Some(&path))
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("  {} created config at {}", "✓".green(), path.display());
    }

    println!();
    println!(
        "{}",
        "Next: add credentials under providers.<name>.credentials, then run `llm-relay status`."
            .dimmed()
    );
    println!();
    Ok(())
}
