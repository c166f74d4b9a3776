use clap::{Parser, Subcommand};
use pomolink_core::Surface;
use tracing_subscriber::EnvFilter;

mod app;
mod commands;

#[derive(Parser)]
#[command(name = "pomolink-cli", version, about = "Pomolink CLI")]
struct Cli {
    /// Surface this process acts as (primary or companion)
    #[arg(long, global = true, default_value = "primary")]
    surface: Surface,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Timer control
    Timer {
        #[command(subcommand)]
        action: commands::timer::TimerAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Session statistics
    Stats {
        #[command(subcommand)]
        action: commands::stats::StatsAction,
    },
    /// Act as the ambient display
    Ambient {
        #[command(subcommand)]
        action: commands::ambient::AmbientCommand,
    },
    /// Peer message exchange
    Sync {
        #[command(subcommand)]
        action: commands::sync::SyncAction,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Timer { action } => commands::timer::run(cli.surface, action),
        Commands::Config { action } => commands::config::run(cli.surface, action),
        Commands::Stats { action } => commands::stats::run(cli.surface, action),
        Commands::Ambient { action } => commands::ambient::run(action),
        Commands::Sync { action } => commands::sync::run(cli.surface, action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
