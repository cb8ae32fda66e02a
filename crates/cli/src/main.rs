//! codeloop CLI, the main entry point.
//!
//! Commands:
//! - `chat`    Interactive session, or one message with `-m`
//! - `init`    Write the default global configuration
//! - `config`  Show, locate or validate the configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "codeloop",
    about = "codeloop: a coding agent that works inside your project directory",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Project directory the agent works in
    #[arg(short, long, global = true, env = "CODELOOP_PROJECT", default_value = ".")]
    project: PathBuf,

    /// Override the configured model
    #[arg(long, global = true, env = "CODELOOP_MODEL")]
    model: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Write the default configuration file
    Init,

    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the path of the global configuration file
    Path,
    /// Load and validate the configuration
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    match cli.command {
        Commands::Chat { message } => commands::chat::run(&cli.project, cli.model, message).await?,
        Commands::Init => commands::init::run()?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(&cli.project)?,
            ConfigAction::Path => commands::config_cmd::path(&cli.project),
            ConfigAction::Validate => commands::config_cmd::validate(&cli.project)?,
        },
    }

    Ok(())
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose { "debug" } else { "warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
