use littleblog::{database, load_config, telemetry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    telemetry::init_tracing(&config.logging);

    // Print configuration using Display implementation
    println!("Loaded configuration:");
    println!("{}", config);

    let (db, cleanup) = database::connect(&config.database).await?;

    let checked = db.ping().await;
    match &checked {
        Ok(()) => tracing::info!(dialect = ?db.dialect(), "Database reachable"),
        Err(e) => tracing::error!(error = %e, "Database ping failed"),
    }

    // Release before reporting so the pool is closed on both paths
    cleanup.close().await?;
    checked?;

    Ok(())
}
