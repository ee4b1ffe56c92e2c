use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Create a PostgreSQL connection pool.
///
/// `max_connections` controls the maximum number of connections in the pool.
/// Pass `AppConfig::db_max_connections` for the user-configured value (default 20).
pub async fn create_pool(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(database_url)
        .await?;

    tracing::info!(max_connections, "Connected to PostgreSQL");
    Ok(pool)
}

/// Best-effort refresh of `network_health_mv` (§10). Callers invoke this
/// after a job/worker/reputation mutation commits, never from inside the
/// mutating transaction: Postgres rejects `CONCURRENTLY` refreshes nested
/// in an open transaction. Failures are logged, not propagated, since a
/// stale dashboard view is never worth failing the request that wrote the
/// underlying row.
pub async fn refresh_network_health(pool: &PgPool) {
    if let Err(err) = sqlx::query("REFRESH MATERIALIZED VIEW CONCURRENTLY network_health_mv")
        .execute(pool)
        .await
    {
        tracing::warn!(error = %err, "failed to refresh network_health_mv");
    }
}
