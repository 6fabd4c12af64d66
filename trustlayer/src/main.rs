// trustlayer/src/main.rs
//! TrustLayer entry point.
//!
//! Loads `.env`, sets up logging from the global flags, loads settings and
//! detector rules, then runs the chosen subcommand.

use anyhow::Result;
use clap::Parser;
use log::debug;

use trustlayer::cli::{Cli, Commands};
use trustlayer::commands::{self, health, prompt, redact, restore, stats};
use trustlayer::logger;
use trustlayer::ui::output::error_msg;

#[tokio::main]
async fn main() {
    // A missing .env file is the normal case.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    logger::init_logger(logger::level_from_flags(cli.quiet, cli.debug));

    if let Err(e) = run(cli).await {
        error_msg(format!("{:#}", e));
        std::process::exit(1);
    }
}

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Redact(_) => "redact",
        Commands::Restore(_) => "restore",
        Commands::Prompt(_) => "prompt",
        Commands::Stats(_) => "stats",
        Commands::Health => "health",
    }
}

async fn run(cli: Cli) -> Result<()> {
    debug!("Running command: {}", command_name(&cli.command));
    match &cli.command {
        Commands::Health => health::run_health(),
        Commands::Restore(cmd) => restore::run_restore(cmd),
        Commands::Redact(cmd) => {
            let settings = commands::load_settings(cli.config.as_deref())?;
            let rules = commands::load_rules(cli.rules.as_deref())?;
            redact::run_redact(cmd, rules, &settings, cli.quiet)
        }
        Commands::Prompt(cmd) => {
            let settings = commands::load_settings(cli.config.as_deref())?;
            let rules = commands::load_rules(cli.rules.as_deref())?;
            prompt::run_prompt(cmd, rules, &settings, cli.quiet).await
        }
        Commands::Stats(cmd) => {
            let settings = commands::load_settings(cli.config.as_deref())?;
            stats::run_stats(cmd, &settings)
        }
    }
}
