use bistro_core::DashboardStats;
use chrono::Utc;
use clap::Args;

use super::OutputFormat;
use crate::app::App;
use crate::config::Config;

#[derive(Args)]
pub struct StatsCommand {
    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

impl StatsCommand {
    pub async fn run(&self, app: &App, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let today = Utc::now().date_naive();
        let stats = DashboardStats::compute(&app.session.orders().await, today);

        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            }
            OutputFormat::Text => {
                println!("Dashboard for {}", today.format("%Y-%m-%d"));
                println!("========================\n");
                println!("Orders today:  {}", stats.orders_today);
                println!("Pending:       {}", stats.pending);
                println!("Revenue today: {}", config.money(stats.revenue_today));
            }
        }
        Ok(())
    }
}
