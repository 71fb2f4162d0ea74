use storefront_api::{
    config::AppConfig,
    db::{create_pool, orm_from_pool, run_migrations},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,storefront_api=debug".into()),
        )
        .init();

    let config = AppConfig::from_env()?;
    let pool = create_pool(&config.database_url, &config.db).await?;
    run_migrations(&orm_from_pool(&pool)).await?;
    pool.close().await;
    println!("Migrations applied");
    Ok(())
}
