//! Configuration commands.

use anyhow::{Result, bail};
use permit::PermitConfig;

/// Prints the effective configuration after every layer is applied.
pub fn show(config: &PermitConfig, format: &str) -> Result<()> {
    match format {
        "toml" => print!("{}", config.to_toml()?),
        "json" => println!("{}", serde_json::to_string_pretty(config)?),
        other => bail!("unknown format '{other}' (expected toml or json)"),
    }
    Ok(())
}
