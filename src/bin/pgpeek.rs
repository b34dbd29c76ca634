//! pgpeek - live view of PostgreSQL sessions.
//!
//! Usage:
//!   pgpeek "host=db1 user=postgres"          # refresh every second
//!   pgpeek postgresql://postgres@db1/app -i 2
//!   PGPEEK_DSN=... pgpeek --show-idle --log-file /tmp/pgpeek.log -v

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use pgpeek::activity::SessionState;
use pgpeek::logging::init_logging;
use pgpeek::session::{self, Connection};
use pgpeek::tui::{App, AppOptions};

/// Live view of PostgreSQL sessions.
#[derive(Parser)]
#[command(name = "pgpeek", about = "Live view of PostgreSQL sessions", version)]
struct Args {
    /// Connection string: libpq key/value pairs or a postgresql:// URL.
    #[arg(value_name = "DSN", env = "PGPEEK_DSN", hide_env_values = true)]
    dsn: String,

    /// Refresh interval in seconds.
    #[arg(short, long, default_value = "1", value_parser = clap::value_parser!(u64).range(1..))]
    interval: u64,

    /// Start with idle sessions visible (toggle with `i`).
    #[arg(long)]
    show_idle: bool,

    /// Write logs to this file. Nothing is logged without it.
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only log errors.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn main() {
    let args = Args::parse();

    if let Some(path) = &args.log_file
        && let Err(e) = init_logging(path, args.verbose, args.quiet)
    {
        eprintln!("Error: cannot log to '{}': {}", path.display(), e);
        std::process::exit(1);
    }

    let transport = match session::connect(&args.dsn) {
        Ok(t) => t,
        Err(e) => {
            error!(error = %e, "connection failed");
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let state = match SessionState::new(Connection::new(transport)) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "startup failed");
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    info!(version = %state.server_version(), "connected");

    let options = AppOptions {
        interval: Duration::from_secs(args.interval),
        show_idle: args.show_idle,
    };
    if let Err(e) = App::new(state.server_version(), &options).run(state) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
