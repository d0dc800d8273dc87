mod cmd;
mod output;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, task::TaskSubcommand};
use seatkeeper_core::types::VenueId;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "seatkeeper",
    about = "Library seat reservation, supervised auto sign-in and daily booking tasks",
    version,
    propagate_version = true
)]
struct Cli {
    /// Data directory holding config.yaml and tasks.redb
    /// (default: $SEATKEEPER_HOME, then ~/.seatkeeper)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    /// Account to act as (default: the only configured account)
    #[arg(long, short = 'u', global = true, env = "SEATKEEPER_USER")]
    user: Option<String>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API and run the task scheduler
    Serve {
        /// Port to listen on (default: server.port from config)
        #[arg(long)]
        port: Option<u16>,

        /// Serve the API without running scheduled tasks
        #[arg(long)]
        no_scheduler: bool,
    },

    /// Run the task scheduler without the HTTP API
    Run,

    /// List venues
    Venues,

    /// Show a venue's seat layout
    Layout { venue_id: VenueId },

    /// Show the current reservation
    Reservation,

    /// Reserve a seat
    Book { venue_id: VenueId, seat_key: String },

    /// Cancel the current reservation
    Cancel,

    /// Sign in to the current reservation
    Signin,

    /// List saved frequent seats
    Frequent,

    /// Manage scheduled tasks
    Task {
        #[command(subcommand)]
        subcommand: TaskSubcommand,
    },

    /// Create, show and validate the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } | Commands::Run => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .with_target(false)
        .init();

    let home = seatkeeper_core::paths::resolve_home(cli.home.as_deref());
    let user = cli.user.as_deref();

    let result = match cli.command {
        Commands::Serve { port, no_scheduler } => cmd::serve::run(&home, port, no_scheduler),
        Commands::Run => cmd::serve::run_scheduler(&home),
        Commands::Venues => cmd::booking::venues(&home, user, cli.json),
        Commands::Layout { venue_id } => cmd::booking::layout(&home, user, venue_id, cli.json),
        Commands::Reservation => cmd::booking::reservation(&home, user, cli.json),
        Commands::Book { venue_id, seat_key } => {
            cmd::booking::book(&home, user, venue_id, &seat_key, cli.json)
        }
        Commands::Cancel => cmd::booking::cancel(&home, user, cli.json),
        Commands::Signin => cmd::booking::sign_in(&home, user, cli.json),
        Commands::Frequent => cmd::booking::frequent(&home, user, cli.json),
        Commands::Task { subcommand } => cmd::task::run(&home, user, subcommand, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&home, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
