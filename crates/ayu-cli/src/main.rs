mod config;
mod emit_cmd;
mod probe_cmd;
mod tui;
mod watch_cmd;

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use config::AyuConfig;

#[derive(Parser)]
#[command(name = "ayu", version, about = "Live dashboard for a running pytest session")]
struct Cli {
    /// Host to listen on / connect to (overrides AYU_HOST)
    #[arg(long, global = true)]
    host: Option<String>,

    /// Port to listen on / connect to (overrides AYU_PORT)
    #[arg(long, global = true)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Launch the interactive dashboard (default)
    Dashboard {
        /// Directory or file to collect and run (defaults to pytest's discovery)
        tests_path: Option<PathBuf>,
    },
    /// Listen without a UI and log every event
    Watch {
        /// Also write received events to this file, replayable with `ayu emit`
        #[arg(long)]
        record: Option<PathBuf>,
    },
    /// Send events from a JSON-lines file to a listening dashboard
    Emit {
        /// File with one encoded event per line
        file: PathBuf,
        /// Pause between events, in milliseconds
        #[arg(long, default_value_t = 0)]
        delay_ms: u64,
    },
    /// Report whether a dashboard is listening
    Probe,
    /// Write an ayu config file with default settings
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Print shell completions
    Completions {
        /// Target shell
        shell: Shell,
    },
}

/// Execute the `ayu init` command: write config file.
fn cmd_init(force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile::default();
    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  channel.host = {}", cfg.channel.host);
    println!("  channel.port = {}", cfg.channel.port);
    println!("  runner.is_tool = {}", cfg.runner.is_tool);
    Ok(())
}

fn init_tracing(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Dashboard { tests_path: None });

    // The dashboard owns the terminal; keep logging quiet unless asked.
    match command {
        Commands::Dashboard { .. } => init_tracing("warn"),
        _ => init_tracing("info"),
    }

    match command {
        Commands::Init { force } => {
            cmd_init(force)?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "ayu", &mut std::io::stdout());
        }
        Commands::Dashboard { tests_path } => {
            let resolved = AyuConfig::resolve(cli.host.as_deref(), cli.port)?;
            tui::run_dashboard(resolved, tests_path).await?;
        }
        Commands::Watch { record } => {
            let resolved = AyuConfig::resolve(cli.host.as_deref(), cli.port)?;
            watch_cmd::run_watch(&resolved.channel, record.as_deref()).await?;
        }
        Commands::Emit { file, delay_ms } => {
            let resolved = AyuConfig::resolve(cli.host.as_deref(), cli.port)?;
            emit_cmd::run_emit(&resolved.channel, &file, delay_ms).await?;
        }
        Commands::Probe => {
            let resolved = AyuConfig::resolve(cli.host.as_deref(), cli.port)?;
            if !probe_cmd::run_probe(&resolved.channel).await {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
