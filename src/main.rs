//! CLI entry point for the Sophia shell.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use colored::Colorize;
use dotenvy::dotenv;

use sophia_shell::backend::{Backend, HttpBackend, SharedBackend};
use sophia_shell::config::Config;
use sophia_shell::shell::{AppShell, ShellOptions};
use sophia_shell::ui::{self, palette};
use sophia_shell::usage::{LookbackWindow, UsageDashboard};
use sophia_shell::{logging, repl};

#[derive(Parser, Debug)]
#[command(
    name = "sophia",
    author,
    version,
    about = "Sophia - consent-gated control shell for your local assistant runtime",
    long_about = "Control shell for the local Sophia runtime.\n\nJust run 'sophia' to onboard or start chatting."
)]
struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Config profile name
    #[arg(long)]
    profile: Option<String>,

    /// Runtime service URL (overrides config and SOPHIA_RUNTIME_URL)
    #[arg(long)]
    runtime_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// Show onboarding status and runtime state
    Status,
    /// Show usage and cost for a lookback window
    Usage {
        /// Lookback window in days (1, 7, 30 or 90)
        #[arg(short, long)]
        days: Option<u32>,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    logging::init(cli.verbose)?;

    if let Some(Commands::Completions { shell }) = cli.command {
        generate_completions(shell);
        return Ok(());
    }

    let config = load_config_from_cli(&cli)?;
    let backend: SharedBackend = Arc::new(HttpBackend::new(&config)?);

    match cli.command {
        Some(Commands::Status) => run_status(backend.as_ref()).await,
        Some(Commands::Usage { days }) => {
            let window = match days {
                Some(days) => LookbackWindow::from_days(days)?,
                None => config.usage_window(),
            };
            run_usage(backend, window).await
        }
        Some(Commands::Completions { .. }) | None => {
            let shell = AppShell::new(backend, ShellOptions::from(&config));
            repl::run(shell).await
        }
    }
}

fn load_config_from_cli(cli: &Cli) -> Result<Config> {
    let profile = cli
        .profile
        .clone()
        .or_else(|| std::env::var("SOPHIA_PROFILE").ok());
    let mut config = Config::load(cli.config.clone(), profile.as_deref())?;
    if let Some(url) = cli.runtime_url.clone() {
        config.runtime_url = Some(url);
        config.validate()?;
    }
    Ok(config)
}

/// Generate shell completions for the given shell
fn generate_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
}

async fn run_status(backend: &dyn Backend) -> Result<()> {
    let (violet_r, violet_g, violet_b) = palette::SOPHIA_VIOLET_RGB;
    let (teal_r, teal_g, teal_b) = palette::SOPHIA_TEAL_RGB;
    let (amber_r, amber_g, amber_b) = palette::SOPHIA_AMBER_RGB;

    println!(
        "{}",
        "Sophia Status".truecolor(violet_r, violet_g, violet_b).bold()
    );
    println!();

    match backend.onboarding_status().await {
        Ok(true) => println!(
            "  {} onboarding complete",
            "✓".truecolor(teal_r, teal_g, teal_b)
        ),
        Ok(false) => println!(
            "  {} onboarding incomplete (run 'sophia' to sign the operating contract)",
            "!".truecolor(amber_r, amber_g, amber_b)
        ),
        Err(err) => {
            println!("  {}", ui::render_error(&format!("Runtime unavailable: {err}")));
            return Ok(());
        }
    }

    match backend.runtime_state().await {
        Ok(state) => println!("  runtime {}", ui::state_badge(&state)),
        Err(err) => println!("  {}", ui::render_error(&err.to_string())),
    }
    Ok(())
}

async fn run_usage(backend: SharedBackend, window: LookbackWindow) -> Result<()> {
    let mut dashboard = UsageDashboard::new(backend, window);
    dashboard.load().await;
    for line in ui::render_usage(&dashboard) {
        println!("{line}");
    }
    Ok(())
}
