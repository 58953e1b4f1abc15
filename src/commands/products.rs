use bistro_core::{Category, NewProduct, ProductFilter, ProductStatus};
use clap::{Args, Subcommand};
use rust_decimal::Decimal;
use std::io::{self, Write};

use super::{truncate, OutputFormat};
use crate::app::App;
use crate::config::Config;

#[derive(Args)]
pub struct ProductsCommand {
    #[command(subcommand)]
    pub command: ProductsSubcommand,
}

#[derive(Subcommand)]
pub enum ProductsSubcommand {
    /// List products in the catalog
    List {
        /// Only products whose name or description contains this text
        #[arg(long, short)]
        search: Option<String>,

        /// Only products in this category (e.g. starters, main-courses)
        #[arg(long)]
        category: Option<Category>,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Add a product
    Add {
        /// Name of the product
        name: String,

        /// Price, e.g. 12.50
        #[arg(long)]
        price: Decimal,

        /// Category tag (default: main-courses)
        #[arg(long)]
        category: Option<Category>,

        /// Initial status (default: active)
        #[arg(long)]
        status: Option<ProductStatus>,

        /// Short description
        #[arg(long)]
        description: Option<String>,
    },

    /// Edit an existing product
    Edit {
        /// Product ID
        id: i64,

        /// New name
        #[arg(long)]
        name: Option<String>,

        /// New price
        #[arg(long)]
        price: Option<Decimal>,

        /// New category tag
        #[arg(long)]
        category: Option<Category>,

        /// New status
        #[arg(long)]
        status: Option<ProductStatus>,

        /// New description (empty string clears it)
        #[arg(long)]
        description: Option<String>,
    },

    /// Switch a product between active and inactive
    Toggle {
        /// Product ID
        id: i64,
    },

    /// Delete a product
    Delete {
        /// Product ID
        id: i64,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

impl ProductsCommand {
    pub async fn run(&self, app: &App, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let coordinator = &app.coordinator;
        let session = &app.session;

        match &self.command {
            ProductsSubcommand::List {
                search,
                category,
                format,
            } => {
                let products = session.products().await;
                let filter = ProductFilter {
                    search: search.clone(),
                    category: category.clone(),
                };
                let products = filter.apply(&products);

                if products.is_empty() {
                    println!("No products found");
                    return Ok(());
                }

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&products)?);
                    }
                    OutputFormat::Text => {
                        println!(
                            "{:<15}  {:<30}  {:<14}  {:>10}  STATUS",
                            "ID", "NAME", "CATEGORY", "PRICE"
                        );
                        println!("{}", "-".repeat(84));
                        for product in &products {
                            println!(
                                "{:<15}  {:<30}  {:<14}  {:>10}  {}",
                                product.id,
                                truncate(&product.name, 30),
                                truncate(product.category.label(), 14),
                                config.money(product.price),
                                product.status
                            );
                        }
                        println!("\nTotal: {} product(s)", products.len());
                    }
                }
                Ok(())
            }

            ProductsSubcommand::Add {
                name,
                price,
                category,
                status,
                description,
            } => {
                let mut draft = NewProduct::new(name.clone(), *price);
                if let Some(category) = category {
                    draft = draft.with_category(category.clone());
                }
                if let Some(status) = status {
                    draft = draft.with_status(*status);
                }
                if let Some(description) = description {
                    draft = draft.with_description(description.clone());
                }

                let product = coordinator.create_product(session, draft).await?;
                println!("Created product:");
                print!("{}", product);
                Ok(())
            }

            ProductsSubcommand::Edit {
                id,
                name,
                price,
                category,
                status,
                description,
            } => {
                let mut product = session
                    .product(*id)
                    .await
                    .ok_or_else(|| format!("Product not found: {}", id))?;

                if name.is_none()
                    && price.is_none()
                    && category.is_none()
                    && status.is_none()
                    && description.is_none()
                {
                    return Err("Nothing to change. Pass at least one of --name, --price, --category, --status, --description".into());
                }

                if let Some(name) = name {
                    product.name = name.clone();
                }
                if let Some(price) = price {
                    product.price = *price;
                }
                if let Some(category) = category {
                    product.category = category.clone();
                }
                if let Some(status) = status {
                    product.status = *status;
                }
                if let Some(description) = description {
                    product.description = if description.trim().is_empty() {
                        None
                    } else {
                        Some(description.clone())
                    };
                }

                let updated = coordinator.update_product(session, product).await?;
                println!("Updated product:");
                print!("{}", updated);
                Ok(())
            }

            ProductsSubcommand::Toggle { id } => {
                let product = coordinator.toggle_product_status(session, *id).await?;
                println!("Product '{}' is now {}", product.name, product.status);
                Ok(())
            }

            ProductsSubcommand::Delete { id, force } => {
                let product = session
                    .product(*id)
                    .await
                    .ok_or_else(|| format!("Product not found: {}", id))?;

                // Confirm deletion unless --force is used
                if !force {
                    print!("Delete product '{}'? [y/N] ", product.name);
                    io::stdout().flush()?;

                    let mut input = String::new();
                    io::stdin().read_line(&mut input)?;

                    if !input.trim().eq_ignore_ascii_case("y") {
                        println!("Deletion cancelled.");
                        return Ok(());
                    }
                }

                coordinator.delete_product(session, product.id).await?;
                println!("Deleted product: {}", product.name);
                Ok(())
            }
        }
    }
}
