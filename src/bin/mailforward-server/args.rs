use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};

const CONFIG_ENV: &str = "MAILFORWARD_CONFIG";
const DEFAULT_PATHS: [&str; 2] = ["./mailforward.toml", "/etc/mailforward/mailforward.toml"];

#[derive(Parser)]
#[command(name = "mailforward-server", version, about = "SMTP alias forwarder")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Option<Commands>,

    /// configuration file (TOML)
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// accept mail and forward it (default)
    Serve,
    /// load the configuration, compile the rules and print them
    CheckConfig,
    /// show which rule each address matches
    Match {
        #[arg(required = true)]
        addresses: Vec<String>,
    },
}

/// `--config`, then `MAILFORWARD_CONFIG`, then the default locations.
pub fn find_config_file(explicit: Option<&PathBuf>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.clone());
    }

    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        bail!("{CONFIG_ENV} points to non-existent file: {}", path.display());
    }

    for path in DEFAULT_PATHS.iter().map(PathBuf::from) {
        if path.exists() {
            return Ok(path);
        }
    }

    let tried = DEFAULT_PATHS
        .iter()
        .map(|p| format!("  - {p}"))
        .collect::<Vec<_>>()
        .join("\n");
    bail!("no configuration file found. Tried:\n  - --config\n  - {CONFIG_ENV}\n{tried}")
}
