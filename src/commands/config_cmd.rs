use clap::{Args, Subcommand};
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use super::OutputFormat;
use crate::config::Config;

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Initialize configuration file
    Init,
}

const DEFAULT_CONFIG: &str = r#"# bistro configuration

# Spreadsheet holding the Products and Orders sheets
# (the long id in the spreadsheet's URL)
spreadsheet_id: ""

# Bearer token for the Sheets API. Prefer BISTRO_ACCESS_TOKEN over
# storing it here.
# access_token: ""

# Seconds between order refreshes in 'bistro orders watch'
refresh_interval_secs: 30

# Symbol printed before amounts
currency: "$"

sheets:
  products: Products
  orders: Orders
  # What editing a record whose row is gone does: append | fail
  missing_row: append
"#;

impl ConfigCommand {
    pub fn run(
        &self,
        config: &Config,
        config_path: Option<PathBuf>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &config.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            println!(
                                "Config file: {} (not found)",
                                Config::default_config_path().display()
                            );
                        }
                        println!();

                        println!(
                            "spreadsheet_id: {}",
                            config.spreadsheet_id.value.as_deref().unwrap_or("(not set)")
                        );
                        println!("  source: {}", config.spreadsheet_id.source);
                        println!();

                        let token = if config.access_token.value.is_some() {
                            "(set)"
                        } else {
                            "(not set)"
                        };
                        println!("access_token: {}", token);
                        println!("  source: {}", config.access_token.source);
                        println!();

                        println!("api_base_url: {}", config.api_base_url.value);
                        println!("  source: {}", config.api_base_url.source);
                        println!();

                        println!(
                            "refresh_interval_secs: {}",
                            config.refresh_interval_secs.value
                        );
                        println!("  source: {}", config.refresh_interval_secs.source);
                        println!();

                        println!("currency: {}", config.currency.value);
                        println!("  source: {}", config.currency.source);
                        println!();

                        println!("sheets:");
                        println!("  products: {}", config.sheets.products);
                        println!("  orders: {}", config.sheets.orders);
                        println!("  missing_row: {}", config.sheets.missing_row);
                    }
                }
                Ok(())
            }

            ConfigSubcommand::Init => {
                let config_path = config_path.unwrap_or_else(Config::default_config_path);

                // Check if config already exists
                if config_path.exists() {
                    println!("Config file already exists: {}", config_path.display());
                    println!("Use 'bistro config show' to view current configuration.");
                    return Ok(());
                }

                // Create parent directory
                if let Some(parent) = config_path.parent() {
                    fs::create_dir_all(parent)?;
                }

                let mut file = fs::File::create(&config_path)?;
                file.write_all(DEFAULT_CONFIG.as_bytes())?;

                println!("Created config file: {}", config_path.display());
                println!("\nSet spreadsheet_id, then export BISTRO_ACCESS_TOKEN to sign in.");
                Ok(())
            }
        }
    }
}
