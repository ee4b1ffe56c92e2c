use ciro_common::error::AppError;
use ciro_common::types::IndexerCursor;
use sqlx::PgPool;

/// Reads and initializes the single-row indexer cursor. Writes happen
/// inside `PgEventStore::append_batch`'s transaction via optimistic
/// `WHERE version = $n` locking; this module only handles the read side
/// and first-run bootstrap.
pub async fn load(pool: &PgPool) -> Result<Option<IndexerCursor>, AppError> {
    let row = sqlx::query_as::<_, IndexerCursor>(
        "SELECT chain_id, last_indexed_block, last_indexed_hash, version, updated_at FROM indexer_cursors WHERE chain_id = 1",
    )
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Inserts the initial cursor row if one does not already exist, so the
/// orchestrator's first `append_batch` has a version to compare against.
pub async fn bootstrap(pool: &PgPool, from_block: u64) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO indexer_cursors (chain_id, last_indexed_block, last_indexed_hash, version, updated_at)
        VALUES (1, $1, '', 0, NOW())
        ON CONFLICT (chain_id) DO NOTHING
        "#,
    )
    .bind(from_block as i64)
    .execute(pool)
    .await?;

    Ok(())
}
