//! ERP command-line entry point.
//!
//! # Responsibility
//! - Parse global options and dispatch to aggregate and entity commands.
//! - Print results as JSON on stdout and failures as `error_code` lines on
//!   stderr, exiting with status 1.

use clap::{Parser, Subcommand};
use erp_core::{LoggingConfig, ServiceError};

mod commands;

#[derive(Debug, Parser)]
#[command(name = "erp")]
#[command(about = "ERP aggregate store - reconcile products, clients and catalog entities", long_about = None)]
struct Cli {
    /// SQLite database file; created and migrated on first use.
    #[arg(long, global = true, default_value = "erp.db")]
    db: String,

    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Absolute directory for rolling log files; stderr when omitted.
    #[arg(long, global = true)]
    log_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Product aggregate operations
    Product(commands::product::ProductArgs),
    /// Client aggregate operations
    Client(commands::client::ClientArgs),
    /// Flat catalog entity operations (input, process, location, production_line)
    Entity(commands::entity::EntityArgs),
    /// Print the core version
    Version,
}

fn main() {
    let cli = Cli::parse();

    let result = run(cli);

    if let Err(e) = result {
        match e.downcast_ref::<ServiceError>() {
            Some(err) => eprintln!(
                "Error: {} (error_code={} status={})",
                err,
                err.code(),
                err.status_code()
            ),
            None => eprintln!("Error: {}", e),
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = LoggingConfig::parse(&cli.log_level, cli.log_dir.as_deref())?;
    erp_core::init_logging(&config)?;

    match cli.command {
        Commands::Product(args) => commands::product::execute(args, &cli.db),
        Commands::Client(args) => commands::client::execute(args, &cli.db),
        Commands::Entity(args) => commands::entity::execute(args, &cli.db),
        Commands::Version => {
            println!("erp_core version={}", erp_core::core_version());
            Ok(())
        }
    }
}
