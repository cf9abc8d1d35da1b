//! `syncd config show` and `syncd config init`

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Subcommand;

use syncd_core::{config, EngineConfig};

use super::resolve_config_path;

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration (defaults filled in).
    Show {
        /// Config file to read instead of ~/.syncd/config.yaml.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print JSON instead of YAML.
        #[arg(long)]
        json: bool,
    },

    /// Write a configuration file holding the defaults.
    Init {
        /// Where to write instead of ~/.syncd/config.yaml.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

pub fn run(cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show { config, json } => show(config, json),
        ConfigCommand::Init { config, force } => init(config, force),
    }
}

fn show(explicit: Option<PathBuf>, json: bool) -> Result<()> {
    let path = resolve_config_path(explicit.as_deref())?;
    let loaded = config::load_at(&path)
        .with_context(|| format!("failed to load config '{}'", path.display()))?;
    let rendered = if json {
        serde_json::to_string_pretty(&loaded)?
    } else {
        serde_yaml::to_string(&loaded)?
    };
    println!("{}", rendered.trim_end());
    Ok(())
}

fn init(explicit: Option<PathBuf>, force: bool) -> Result<()> {
    let path = resolve_config_path(explicit.as_deref())?;
    if path.exists() && !force {
        bail!(
            "config already exists at '{}' (use --force to overwrite)",
            path.display()
        );
    }
    config::save_at(&path, &EngineConfig::default())
        .with_context(|| format!("failed to write config '{}'", path.display()))?;
    println!("✓ Wrote default config to {}", path.display());
    Ok(())
}
