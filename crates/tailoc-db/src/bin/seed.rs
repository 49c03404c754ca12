//! # Seed Data Generator
//!
//! Populates the database with audio products for development.
//!
//! ## Usage
//! ```bash
//! # Seed the whole catalog (default)
//! cargo run -p tailoc-db --bin seed
//!
//! # Seed only the first N products
//! cargo run -p tailoc-db --bin seed -- --count 10
//!
//! # Specify database path
//! cargo run -p tailoc-db --bin seed -- --db ./data/tailoc.db
//! ```
//!
//! ## Generated Products
//! - Speakers (SPK)
//! - Amplifiers (AMP)
//! - Karaoke microphones (MIC)
//! - Mixers (MIX)
//!
//! Each product gets an opening `in` movement so the ledger explains its
//! starting stock.

use chrono::Utc;
use std::env;
use tailoc_core::{InventoryMovement, MovementKind, Product};
use tailoc_db::repository::generate_id;
use tailoc_db::{Database, DbConfig, InventoryRepository, ProductRepository};

/// (SKU prefix, [(name, price in VND cents)])
const CATALOG: &[(&str, &[(&str, i64)])] = &[
    (
        "SPK",
        &[
            ("JBL Pasion 12", 1_250_000_000),
            ("BMB CSN 500", 980_000_000),
            ("Bose 301 Series V", 1_450_000_000),
            ("Domus DP 6120", 720_000_000),
            ("Paramax P-2000", 1_100_000_000),
        ],
    ),
    (
        "AMP",
        &[
            ("Yamaha A-S501", 1_690_000_000),
            ("Denon PMA-600NE", 1_390_000_000),
            ("Crown XLS 2502", 1_850_000_000),
            ("Paramax SA-999 Air", 890_000_000),
        ],
    ),
    (
        "MIC",
        &[
            ("Shure UGX23", 650_000_000),
            ("BBS B-900 Pro", 420_000_000),
            ("JBL VM300", 580_000_000),
            ("Sennheiser XSW 1-825", 790_000_000),
        ],
    ),
    (
        "MIX",
        &[
            ("Yamaha MG10XU", 520_000_000),
            ("Behringer Xenyx QX1204USB", 470_000_000),
            ("Soundcraft EPM8", 610_000_000),
        ],
    ),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut count: usize = usize::MAX;
    let mut db_path = String::from("./tailoc_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(usize::MAX);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Audio Tài Lộc Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of products to insert (default: all)");
                println!("  -d, --db <PATH>    Database file path (default: ./tailoc_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Audio Tài Lộc Seed Data Generator");
    println!("=================================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.products().count_active().await?;
    if existing > 0 {
        println!("⚠ Database already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        return Ok(());
    }

    let inserted = seed_catalog(&db, count).await?;

    println!();
    println!("✓ Seeded {} products", inserted);

    let low = db.products().low_stock(10).await?;
    println!("  Low stock after seed: {}", low.len());

    Ok(())
}

/// Inserts up to `count` catalog products, each with its opening movement.
async fn seed_catalog(db: &Database, count: usize) -> Result<usize, Box<dyn std::error::Error>> {
    let mut inserted = 0;

    for (prefix, products) in CATALOG {
        for (idx, (name, price_cents)) in products.iter().enumerate() {
            if inserted >= count {
                return Ok(inserted);
            }

            let product = generate_product(prefix, name, *price_cents, idx);
            let movement = InventoryMovement {
                id: generate_id(),
                product_id: product.id.clone(),
                kind: MovementKind::In,
                quantity: product.stock,
                previous_stock: 0,
                new_stock: product.stock,
                reason: Some("opening stock".to_string()),
                reference_id: None,
                created_at: product.created_at,
            };

            let mut tx = db.pool().begin().await?;
            if let Err(e) = ProductRepository::insert(&mut *tx, &product).await {
                eprintln!("Failed to insert {}: {}", product.sku, e);
                continue;
            }
            InventoryRepository::record(&mut *tx, &movement).await?;
            tx.commit().await?;

            println!("  {} {:<28} stock {:>3}", product.sku, product.name, product.stock);
            inserted += 1;
        }
    }

    Ok(inserted)
}

/// Builds one product with deterministic stock levels.
fn generate_product(prefix: &str, name: &str, price_cents: i64, idx: usize) -> Product {
    let now = Utc::now();
    let seed = prefix.bytes().map(usize::from).sum::<usize>() + idx * 7;

    Product {
        id: generate_id(),
        sku: format!("{}-{:03}", prefix, idx + 1),
        name: name.to_string(),
        price_cents,
        stock: (seed % 25) as i64 + 1,
        reserved: 0,
        low_stock_threshold: 3,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}
