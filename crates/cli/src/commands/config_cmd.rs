//! `codeloop config`: configuration management commands.

use anyhow::Context;
use codeloop_config::AppConfig;
use std::path::Path;

pub fn show(project: &Path) -> anyhow::Result<()> {
    let config = AppConfig::load(project).context("Failed to load config")?;
    println!("{}", toml::to_string_pretty(&redacted(config))?);
    Ok(())
}

pub fn path(project: &Path) {
    println!("{}", AppConfig::config_dir().join("config.toml").display());
    let project_path = AppConfig::project_config_path(project);
    if project_path.exists() {
        println!("{}", project_path.display());
    }
}

pub fn validate(project: &Path) -> anyhow::Result<()> {
    let config = match AppConfig::load(project) {
        Ok(config) => config,
        Err(e) => {
            println!("Config error: {e}");
            return Err(e.into());
        }
    };
    println!("Config parsed and validated");

    let mut warnings = Vec::new();
    if config.default_provider != "ollama" && !config.has_api_key() {
        warnings.push(format!(
            "No API key for provider '{}' (set CODELOOP_API_KEY or OPENAI_API_KEY)",
            config.default_provider
        ));
    }
    if !config.providers.is_empty() && !config.providers.contains_key(&config.default_provider) {
        warnings.push(format!(
            "Default provider '{}' has no [providers.{}] table, built-in defaults apply",
            config.default_provider, config.default_provider
        ));
    }
    for warning in &warnings {
        println!("  warning: {warning}");
    }

    println!();
    println!("  Provider:        {}", config.default_provider);
    println!("  Model:           {}", config.default_model);
    println!("  Context window:  {} tokens", config.context_window);
    println!("  Context store:   {} bytes", config.context.capacity_bytes);
    println!("  Max iterations:  {}", config.agent.max_iterations);
    println!("  Autonomy:        {}", config.autonomy.level);
    Ok(())
}

/// Hide secrets before printing.
fn redacted(mut config: AppConfig) -> AppConfig {
    const MASK: &str = "********";
    if config.api_key.is_some() {
        config.api_key = Some(MASK.into());
    }
    for provider in config.providers.values_mut() {
        if provider.api_key.is_some() {
            provider.api_key = Some(MASK.into());
        }
    }
    config
}
