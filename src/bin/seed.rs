use rust_decimal::Decimal;
use storefront_api::{
    config::AppConfig,
    db::{DbPool, create_pool, orm_from_pool, run_migrations},
    services::auth_service::hash_password,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url, &config.db).await?;
    run_migrations(&orm_from_pool(&pool)).await?;

    let admin_id = ensure_user(&pool, "admin", "admin@example.com", "admin12345", "admin").await?;
    ensure_employee(&pool, admin_id, "Store Admin", Some("Owner")).await?;
    let staff_id = ensure_user(&pool, "staff", "staff@example.com", "staff12345", "staff").await?;
    ensure_employee(&pool, staff_id, "Warehouse Staff", Some("Fulfilment")).await?;
    let customer_id =
        ensure_user(&pool, "customer", "customer@example.com", "customer123", "customer").await?;
    ensure_customer(&pool, customer_id, "Demo Customer", "1 Market Street").await?;

    seed_catalog(&pool).await?;
    pool.close().await;

    println!(
        "Seed completed. Admin ID: {admin_id}, Staff ID: {staff_id}, Customer ID: {customer_id}"
    );
    Ok(())
}

async fn ensure_user(
    pool: &DbPool,
    username: &str,
    email: &str,
    password: &str,
    role: &str,
) -> anyhow::Result<i64> {
    let password_hash = hash_password(password)?;

    let (user_id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO users (username, email, password_hash, role)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role, updated_at = NOW()
        RETURNING id
        "#,
    )
    .bind(username)
    .bind(email)
    .bind(password_hash)
    .bind(role)
    .fetch_one(pool)
    .await?;

    println!("Ensured user {email} (role={role})");
    Ok(user_id)
}

async fn ensure_employee(
    pool: &DbPool,
    user_id: i64,
    name: &str,
    position: Option<&str>,
) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO employees (user_id, name, position) VALUES ($1, $2, $3) ON CONFLICT (user_id) DO NOTHING",
    )
    .bind(user_id)
    .bind(name)
    .bind(position)
    .execute(pool)
    .await?;
    Ok(())
}

async fn ensure_customer(
    pool: &DbPool,
    user_id: i64,
    name: &str,
    address: &str,
) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO customers (user_id, name, address) VALUES ($1, $2, $3) ON CONFLICT (user_id) DO NOTHING",
    )
    .bind(user_id)
    .bind(name)
    .bind(address)
    .execute(pool)
    .await?;
    Ok(())
}

async fn ensure_category(
    pool: &DbPool,
    name: &str,
    parent_id: Option<i64>,
) -> anyhow::Result<i64> {
    let existing: Option<(i64,)> = sqlx::query_as(
        "SELECT id FROM categories WHERE name = $1 AND parent_id IS NOT DISTINCT FROM $2",
    )
    .bind(name)
    .bind(parent_id)
    .fetch_optional(pool)
    .await?;
    if let Some((id,)) = existing {
        return Ok(id);
    }

    let (id,): (i64,) =
        sqlx::query_as("INSERT INTO categories (name, parent_id) VALUES ($1, $2) RETURNING id")
            .bind(name)
            .bind(parent_id)
            .fetch_one(pool)
            .await?;
    Ok(id)
}

async fn seed_catalog(pool: &DbPool) -> anyhow::Result<()> {
    let apparel = ensure_category(pool, "Apparel", None).await?;
    let hoodies = ensure_category(pool, "Hoodies", Some(apparel)).await?;
    let kitchen = ensure_category(pool, "Kitchen", None).await?;
    let stationery = ensure_category(pool, "Stationery", None).await?;

    let products = vec![
        ("Crab Hoodie", "Warm hoodie with an embroidered crab", Decimal::new(5500000, 2), 50, hoodies),
        ("Enamel Mug", "Coffee tastes better from enamel", Decimal::new(1200000, 2), 100, kitchen),
        ("Sticker Pack", "Decorate your laptop", Decimal::new(500000, 2), 200, stationery),
        ("Field Notebook", "Dot-grid pocket notebook", Decimal::new(2500000, 2), 75, stationery),
    ];

    for (name, desc, price, stock, category_id) in products {
        sqlx::query(
            r#"
            INSERT INTO products (name, description, price, stock_quantity, category_id)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(name)
        .bind(desc)
        .bind(price)
        .bind(stock)
        .bind(category_id)
        .execute(pool)
        .await?;
    }

    println!("Seeded categories and products");
    Ok(())
}
