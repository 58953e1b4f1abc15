use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod app;
mod commands;
mod config;

use app::App;
use commands::{ConfigCommand, OrdersCommand, ProductsCommand, StatsCommand};
use config::Config;

#[derive(Parser)]
#[command(name = "bistro")]
#[command(version)]
#[command(about = "Manage a restaurant's menu and orders kept in a spreadsheet", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Sheet(SheetCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

/// Commands that work against the spreadsheet.
#[derive(Subcommand)]
enum SheetCommand {
    /// Manage catalog products
    Products(ProductsCommand),

    /// View and advance orders
    Orders(OrdersCommand),

    /// Show today's dashboard figures
    Stats(StatsCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bistro=info,bistro_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Save config path for init command
    let cli_config_path = cli.config.clone();

    // Load configuration
    let config = Config::load(cli.config)?;

    match cli.command {
        Some(Commands::Config(cmd)) => cmd.run(&config, cli_config_path),
        Some(Commands::Sheet(cmd)) => run_sheet_command(cmd, &config).await,
        None => {
            println!("Use --help to see available commands");
            Ok(())
        }
    }
}

async fn run_sheet_command(
    command: SheetCommand,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = App::open(config).await?;
    let result = match command {
        SheetCommand::Products(cmd) => cmd.run(&app, config).await,
        SheetCommand::Orders(cmd) => cmd.run(&app, config).await,
        SheetCommand::Stats(cmd) => cmd.run(&app, config).await,
    };
    app.close().await;

    result
}
