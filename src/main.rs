//! Media Library CLI
//!
//! Scans media libraries into a catalog and runs the recurring scan and
//! cleanup tasks.

use clap::Parser;
use media_library::app::App;
use media_library::cli::{
    args::{Cli, Commands},
    commands::{inspect, list, run, scan},
};
use media_library::models::config::{load_config, Config};
use media_library::preflight;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    // Filename parsing needs neither config nor store
    if let Commands::Parse { file } = &cli.command {
        inspect::parse(file)?;
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;

    let needs_preflight = matches!(cli.command, Commands::Scan { .. } | Commands::Run);
    if needs_preflight && !cli.skip_preflight {
        run_preflight_checks(&config).await?;
    }

    let app = App::open(config).await?;
    app.bootstrap().await?;

    match cli.command {
        Commands::Scan { library } => {
            scan::scan(&app, &library).await?;
        }

        Commands::Run => {
            run::run(&app).await?;
        }

        Commands::Tasks => {
            list::list_tasks(&app).await?;
        }

        Commands::Trigger { name } => {
            run::trigger(&app, &name).await?;
        }

        Commands::Libraries => {
            list::list_libraries(&app).await?;
        }

        Commands::Probe { file } => {
            inspect::probe(&app, &file).await?;
        }

        Commands::Parse { .. } => {}
    }

    Ok(())
}

/// Initialize the logging system.
///
/// `RUST_LOG` takes precedence over the verbosity flag.
fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default = if verbose {
        "media_library=debug"
    } else {
        "media_library=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}

/// Run preflight checks and exit if any fail.
async fn run_preflight_checks(config: &Config) -> anyhow::Result<()> {
    use colored::Colorize;

    println!("{}", "Running preflight checks...".bold());
    println!();

    let results = preflight::run_preflight_checks(config).await;
    preflight::print_results(&results);

    println!();

    if !preflight::all_passed(&results) {
        anyhow::bail!("Preflight checks failed. Fix the issues above and try again.");
    }

    Ok(())
}
