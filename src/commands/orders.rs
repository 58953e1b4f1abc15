use bistro_core::{spawn_order_refresh, DashboardStats, Order, OrderFilter, OrderStatus};
use chrono::{NaiveDate, Utc};
use clap::{Args, Subcommand};

use super::{truncate, OutputFormat};
use crate::app::App;
use crate::config::Config;

#[derive(Args)]
pub struct OrdersCommand {
    #[command(subcommand)]
    pub command: OrdersSubcommand,
}

#[derive(Subcommand)]
pub enum OrdersSubcommand {
    /// List orders, newest first
    List {
        /// Only orders with this status
        #[arg(long, short)]
        status: Option<OrderStatus>,

        /// Only orders created on this date (YYYY-MM-DD, UTC)
        #[arg(long, short)]
        date: Option<NaiveDate>,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show an order's details
    Show {
        /// Order ID
        id: i64,
    },

    /// Move an order to the next step (preparing, ready, delivered)
    Advance {
        /// Order ID
        id: i64,

        /// New status
        status: OrderStatus,
    },

    /// Keep refreshing orders and print the dashboard on every change
    Watch,
}

impl OrdersCommand {
    pub async fn run(&self, app: &App, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            OrdersSubcommand::List {
                status,
                date,
                format,
            } => {
                let orders = app.session.orders().await;
                let filter = OrderFilter {
                    status: *status,
                    date: *date,
                };
                let orders = filter.apply(&orders);

                if orders.is_empty() {
                    println!("No orders found");
                    return Ok(());
                }

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&orders)?);
                    }
                    OutputFormat::Text => print_orders(&orders, config),
                }
                Ok(())
            }

            OrdersSubcommand::Show { id } => {
                let order = app
                    .session
                    .order(*id)
                    .await
                    .ok_or_else(|| format!("Order not found: {}", id))?;
                print!("{}", order);
                if let Some(created_at) = order.created_at {
                    println!("Created: {}", created_at.format("%Y-%m-%d %H:%M"));
                }
                if let Some(updated_at) = order.updated_at {
                    println!("Updated: {}", updated_at.format("%Y-%m-%d %H:%M"));
                }
                Ok(())
            }

            OrdersSubcommand::Advance { id, status } => {
                let order = app
                    .coordinator
                    .update_order_status(&app.session, *id, *status)
                    .await?;
                println!("Order #{} is now {}", order.id, order.status.label());
                Ok(())
            }

            OrdersSubcommand::Watch => watch(app, config).await,
        }
    }
}

async fn watch(app: &App, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let handle = spawn_order_refresh(
        app.coordinator.clone(),
        app.session.clone(),
        config.refresh_interval(),
    );
    let mut generation = handle.subscribe();

    println!(
        "Watching orders every {}s. Press Ctrl-C to stop.\n",
        config.refresh_interval_secs.value
    );
    print_dashboard(app, config).await;

    let interrupted = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break true,
            changed = generation.changed() => {
                if changed.is_err() {
                    // Refresh task ended on its own
                    break false;
                }
                print_dashboard(app, config).await;
            }
        }
    };

    if interrupted {
        tracing::info!("Interrupted, stopping order watch");
        handle.abort();
        return Ok(());
    }
    handle.join().await;
    Err("Order refresh stopped: access token missing or rejected".into())
}

async fn print_dashboard(app: &App, config: &Config) {
    let orders = app.session.orders().await;
    let stats = DashboardStats::compute(&orders, Utc::now().date_naive());

    println!("[{}]", Utc::now().format("%H:%M:%S"));
    println!(
        "Orders today: {}   Pending: {}   Revenue today: {}",
        stats.orders_today,
        stats.pending,
        config.money(stats.revenue_today)
    );

    let open: Vec<&Order> = orders
        .iter()
        .filter(|o| o.status != OrderStatus::Delivered)
        .collect();
    if open.is_empty() {
        println!("No open orders\n");
    } else {
        print_orders(&open, config);
        println!();
    }
}

fn print_orders(orders: &[&Order], config: &Config) {
    println!(
        "{:<12}  {:<20}  {:<10}  {:>10}  {:<16}  ITEMS",
        "ID", "CUSTOMER", "STATUS", "TOTAL", "CREATED"
    );
    println!("{}", "-".repeat(90));
    for order in orders {
        let customer = order.customer.as_deref().unwrap_or("-");
        let created = order
            .created_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        let items = order
            .items
            .iter()
            .map(|item| format!("{}x {}", item.quantity, item.name))
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "{:<12}  {:<20}  {:<10}  {:>10}  {:<16}  {}",
            order.id,
            truncate(customer, 20),
            order.status.label(),
            config.money(order.total),
            created,
            items
        );
    }
    println!("\nTotal: {} order(s)", orders.len());
}
