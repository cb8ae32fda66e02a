//! `codeloop init`: write the default global configuration.

use codeloop_config::AppConfig;

pub fn run() -> anyhow::Result<()> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("Created config directory: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("Config already exists at: {}", config_path.display());
        println!("Edit it manually or delete it and re-run init.");
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("Created {}", config_path.display());
    println!();
    println!("Next steps:");
    println!("  1. Pick a provider and model in {}", config_path.display());
    println!("  2. Per-project overrides go in <project>/.codeloop/config.toml");
    println!("  3. Run: codeloop chat");
    Ok(())
}
