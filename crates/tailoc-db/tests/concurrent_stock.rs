//! Guarded stock updates under real WAL contention.

use chrono::Utc;
use std::time::Duration;
use tailoc_core::{InventoryMovement, MovementKind, Product};
use tailoc_db::repository::generate_id;
use tailoc_db::{
    Database, DbConfig, DbError, InventoryRepository, ProductRepository, TransactionFailure,
    TransactionOptions,
};

async fn file_db(dir: &tempfile::TempDir) -> Database {
    let config = DbConfig::new(dir.path().join("stock.db"))
        .max_connections(8)
        .busy_timeout(Duration::from_secs(5));
    Database::new(config).await.unwrap()
}

async fn insert_product(db: &Database, stock: i64) -> Product {
    let now = Utc::now();
    let product = Product {
        id: generate_id(),
        sku: "AMP-001".to_string(),
        name: "Yamaha A-S501".to_string(),
        price_cents: 1_690_000_000,
        stock,
        reserved: 0,
        low_stock_threshold: 2,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    ProductRepository::insert(db.pool(), &product).await.unwrap();
    product
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_decrements_never_oversell() {
    let dir = tempfile::tempdir().unwrap();
    let db = file_db(&dir).await;
    let product = insert_product(&db, 10).await;
    let manager = db.transactions(
        TransactionOptions::default()
            .initial_backoff(Duration::from_millis(2))
            .max_backoff(Duration::from_millis(20)),
    );

    let mut handles = Vec::new();
    for _ in 0..20 {
        let manager = manager.clone();
        let product_id = product.id.clone();
        handles.push(tokio::spawn(async move {
            let options = manager.defaults().clone();
            manager
                .execute("sell_one", &options, |conn| {
                    let product_id = product_id.clone();
                    Box::pin(async move {
                        let now = Utc::now();
                        let new_stock = ProductRepository::adjust_stock(conn, &product_id, -1, now)
                            .await?
                            .ok_or_else(|| DbError::CheckViolation {
                                message: "out of stock".to_string(),
                            })?;
                        let movement = InventoryMovement {
                            id: generate_id(),
                            product_id: product_id.clone(),
                            kind: MovementKind::Out,
                            quantity: 1,
                            previous_stock: new_stock + 1,
                            new_stock,
                            reason: None,
                            reference_id: None,
                            created_at: now,
                        };
                        InventoryRepository::record(&mut *conn, &movement).await?;
                        Ok::<_, DbError>(new_stock)
                    })
                })
                .await
        }));
    }

    let mut sold = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap().result {
            Ok(_) => sold += 1,
            Err(TransactionFailure::Aborted(DbError::CheckViolation { .. })) => rejected += 1,
            Err(other) => panic!("unexpected failure: {other}"),
        }
    }

    assert_eq!(sold, 10);
    assert_eq!(rejected, 10);

    let stored = db.products().get_by_id(&product.id).await.unwrap().unwrap();
    assert_eq!(stored.stock, 0);

    let movements = db.inventory().list_for_product(&product.id, 100).await.unwrap();
    assert_eq!(movements.len(), 10);

    let stats = manager.stats();
    assert_eq!(stats.total, 20);
    assert_eq!(stats.successful, 10);
    assert_eq!(stats.active, 0);
}

#[tokio::test]
async fn reserved_stock_is_protected_from_decrement() {
    let dir = tempfile::tempdir().unwrap();
    let db = file_db(&dir).await;
    let product = insert_product(&db, 5).await;

    let mut conn = db.pool().acquire().await.unwrap();
    let reserved = ProductRepository::adjust_reserved(&mut conn, &product.id, 4, Utc::now())
        .await
        .unwrap();
    assert_eq!(reserved, Some(4));

    // Only one unit is available.
    let blocked = ProductRepository::adjust_stock(&mut conn, &product.id, -2, Utc::now())
        .await
        .unwrap();
    assert_eq!(blocked, None);

    let allowed = ProductRepository::adjust_stock(&mut conn, &product.id, -1, Utc::now())
        .await
        .unwrap();
    assert_eq!(allowed, Some(4));
}
