//! # tailoc
//!
//! Operator CLI for the Tài Lộc inventory ledger and order workflow.
//!
//! ```text
//! tailoc seed --stock 10
//! tailoc products --page 1 --size 20
//! tailoc add-product --sku SPK-010 --name "JBL Pasion 12" --price 1250000000 --stock 8
//! tailoc adjust SPK-010 -2 --reason "damaged in transit"
//! tailoc order --user user-42 SPK-010:2 MIC-003:1
//! tailoc cancel <order-id> --reason "customer request"
//! tailoc stats
//! ```
//!
//! Products can be named by ID or SKU. Results are printed as JSON on
//! stdout; logs go to stderr.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use tailoc_commerce::{CommerceConfig, CommerceContext};
use tailoc_core::{NewProduct, OrderLine};

#[derive(Parser)]
#[command(name = "tailoc", version, about = "Audio Tài Lộc inventory and orders")]
struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create demo products when the catalog is empty
    Seed {
        /// Opening stock per product
        #[arg(long, default_value_t = 10)]
        stock: i64,
    },
    /// List active products
    Products {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        size: u32,
    },
    /// Create a product
    AddProduct {
        #[arg(long)]
        sku: String,
        #[arg(long)]
        name: String,
        /// Price in VND cents
        #[arg(long)]
        price: i64,
        #[arg(long, default_value_t = 0)]
        stock: i64,
        #[arg(long, default_value_t = 0)]
        threshold: i64,
    },
    /// Show stock counters of a product
    Stock { product: String },
    /// Add (positive) or remove (negative) stock
    Adjust {
        product: String,
        #[arg(allow_hyphen_values = true)]
        delta: i64,
        #[arg(long, default_value = "manual adjustment")]
        reason: String,
    },
    /// Hold units out of available stock
    Reserve {
        product: String,
        quantity: i64,
        #[arg(long = "ref")]
        reference: Option<String>,
    },
    /// Return reserved units
    Release {
        product: String,
        quantity: i64,
        #[arg(long = "ref")]
        reference: Option<String>,
    },
    /// Set the low-stock threshold (0 disables alerts)
    Threshold { product: String, threshold: i64 },
    /// List products at or below their threshold
    LowStock {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Ledger entries of a product, newest first
    Movements {
        product: String,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Place an order
    Order {
        #[arg(long)]
        user: String,
        /// Lines as PRODUCT:QTY
        #[arg(required = true, value_parser = parse_line)]
        lines: Vec<(String, i64)>,
    },
    /// Cancel an order and restock its items
    Cancel {
        order_id: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Show one order
    ShowOrder { order_id: String },
    /// A user's recent orders
    Orders { user: String },
    /// Order counts, transaction and cache counters
    Stats,
    /// Print the resolved configuration
    Config,
}

fn parse_line(raw: &str) -> Result<(String, i64), String> {
    let (product, qty) = raw
        .rsplit_once(':')
        .ok_or_else(|| format!("expected PRODUCT:QTY, got '{raw}'"))?;
    let qty = qty
        .parse::<i64>()
        .map_err(|e| format!("bad quantity in '{raw}': {e}"))?;
    Ok((product.to_string(), qty))
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tailoc=debug,sqlx=warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// (SKU, name, price in VND cents)
const DEMO_PRODUCTS: &[(&str, &str, i64)] = &[
    ("SPK-001", "JBL Pasion 12", 1_250_000_000),
    ("SPK-002", "Bose 301 Series V", 1_450_000_000),
    ("AMP-001", "Yamaha A-S501", 1_690_000_000),
    ("AMP-002", "Crown XLS 2502", 1_850_000_000),
    ("MIC-001", "Shure UGX23", 650_000_000),
    ("MIC-002", "Sennheiser XSW 1-825", 790_000_000),
    ("MIX-001", "Yamaha MG10XU", 520_000_000),
];

#[derive(Serialize)]
struct StatusCount {
    status: String,
    count: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = CommerceConfig::load(cli.config).context("loading configuration")?;
    if let Commands::Config = cli.command {
        return print_json(&config);
    }

    debug!(path = %config.database.path.display(), "Opening database");
    let ctx = CommerceContext::connect(config)
        .await
        .context("opening database")?;

    let result = run(&ctx, cli.command).await;
    ctx.close().await;
    result
}

async fn run(ctx: &CommerceContext, command: Commands) -> Result<()> {
    let catalog = ctx.catalog();
    let inventory = ctx.inventory();
    let orders = ctx.orders();

    match command {
        Commands::Seed { stock } => {
            let existing = catalog.list_products(1, 1).await?.total;
            if existing > 0 {
                info!(existing, "Catalog already has products, skipping seed");
                return print_json(&serde_json::json!({ "created": 0, "existing": existing }));
            }

            let mut created = Vec::with_capacity(DEMO_PRODUCTS.len());
            for (sku, name, price) in DEMO_PRODUCTS {
                let product = catalog
                    .create_product(NewProduct {
                        sku: sku.to_string(),
                        name: name.to_string(),
                        price_cents: *price,
                        initial_stock: stock,
                        low_stock_threshold: 3,
                    })
                    .await?;
                created.push(product);
            }
            info!(count = created.len(), "Catalog seeded");
            print_json(&created)
        }
        Commands::Products { page, size } => print_json(&catalog.list_products(page, size).await?),
        Commands::AddProduct {
            sku,
            name,
            price,
            stock,
            threshold,
        } => {
            let product = catalog
                .create_product(NewProduct {
                    sku,
                    name,
                    price_cents: price,
                    initial_stock: stock,
                    low_stock_threshold: threshold,
                })
                .await?;
            print_json(&product)
        }
        Commands::Stock { product } => {
            let id = catalog.resolve(&product).await?.id;
            print_json(&inventory.level(&id).await?)
        }
        Commands::Adjust {
            product,
            delta,
            reason,
        } => {
            let id = catalog.resolve(&product).await?.id;
            print_json(&inventory.adjust(&id, delta, &reason).await?)
        }
        Commands::Reserve {
            product,
            quantity,
            reference,
        } => {
            let id = catalog.resolve(&product).await?.id;
            print_json(&inventory.reserve(&id, quantity, reference.as_deref()).await?)
        }
        Commands::Release {
            product,
            quantity,
            reference,
        } => {
            let id = catalog.resolve(&product).await?.id;
            print_json(&inventory.release(&id, quantity, reference.as_deref()).await?)
        }
        Commands::Threshold { product, threshold } => {
            let id = catalog.resolve(&product).await?.id;
            inventory.set_low_stock_threshold(&id, threshold).await?;
            print_json(&inventory.level(&id).await?)
        }
        Commands::LowStock { limit } => print_json(&inventory.low_stock(limit).await?),
        Commands::Movements { product, limit } => {
            let id = catalog.resolve(&product).await?.id;
            print_json(&inventory.movements(&id, limit).await?)
        }
        Commands::Order { user, lines } => {
            let mut resolved = Vec::with_capacity(lines.len());
            for (product, quantity) in lines {
                let id = catalog.resolve(&product).await?.id;
                resolved.push(OrderLine::new(id, quantity));
            }
            print_json(&orders.create_order(&user, &resolved).await?)
        }
        Commands::Cancel { order_id, reason } => {
            print_json(&orders.cancel_order(&order_id, reason.as_deref()).await?)
        }
        Commands::ShowOrder { order_id } => print_json(&orders.get_order(&order_id).await?),
        Commands::Orders { user } => print_json(&orders.user_orders(&user).await?),
        Commands::Stats => {
            let counts: Vec<StatusCount> = orders
                .status_counts()
                .await?
                .into_iter()
                .map(|(status, count)| StatusCount {
                    status: status.to_string(),
                    count,
                })
                .collect();
            print_json(&serde_json::json!({
                "orders": counts,
                "transactions": ctx.transactions().stats(),
                "cache": ctx.cache().metrics(),
                "event_subscribers": ctx.events().subscriber_count(),
            }))
        }
        Commands::Config => bail!("config is handled before connecting"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("SPK-001:2").unwrap(), ("SPK-001".to_string(), 2));
        assert!(parse_line("SPK-001").is_err());
        assert!(parse_line("SPK-001:two").is_err());
    }

    #[test]
    fn test_negative_adjust_parses() {
        let cli = Cli::try_parse_from(["tailoc", "adjust", "SPK-001", "-3"]).unwrap();
        assert!(matches!(cli.command, Commands::Adjust { delta: -3, .. }));
    }
}
