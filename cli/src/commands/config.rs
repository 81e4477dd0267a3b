// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use agentevolution_core::domain::config::RegistryConfigManifest;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Validate a configuration manifest without starting the service
    Validate,

    /// Print a manifest carrying every default value
    Generate,
}

pub fn handle_command(command: ConfigCommand, config_path: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Validate => {
            let Some(path) = config_path else {
                bail!("config validate requires --config <FILE>");
            };
            let manifest = RegistryConfigManifest::load(&path)
                .with_context(|| format!("invalid manifest at {}", path.display()))?;
            println!(
                "{} {} ({})",
                "Valid:".green(),
                path.display(),
                manifest.metadata.name
            );
            Ok(())
        }
        ConfigCommand::Generate => {
            let manifest = RegistryConfigManifest::example();
            let yaml = serde_yaml::to_string(&manifest).context("failed to render manifest")?;
            print!("{yaml}");
            Ok(())
        }
    }
}
