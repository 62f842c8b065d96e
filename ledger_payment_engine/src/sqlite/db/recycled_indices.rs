use log::trace;
use sqlx::SqliteConnection;

use crate::traits::PaymentStoreError;

/// Adds the index to the recycle set. Indices that are already present are left alone.
pub async fn add_index(index: u64, conn: &mut SqliteConnection) -> Result<bool, PaymentStoreError> {
    let value = i64::try_from(index)
        .map_err(|e| PaymentStoreError::DatabaseError(format!("Address index {index} out of range. {e}")))?;
    let result = sqlx::query("INSERT INTO recycled_indices (address_index) VALUES ($1) ON CONFLICT (address_index) DO NOTHING")
        .bind(value)
        .execute(conn)
        .await?;
    let added = result.rows_affected() > 0;
    trace!("🗃️ Address index {index} recycle request. Added: {added}");
    Ok(added)
}

pub async fn fetch_indices(conn: &mut SqliteConnection) -> Result<Vec<u64>, PaymentStoreError> {
    let rows: Vec<(i64,)> = sqlx::query_as("SELECT address_index FROM recycled_indices ORDER BY id ASC").fetch_all(conn).await?;
    rows.into_iter()
        .map(|(i,)| {
            u64::try_from(i).map_err(|e| PaymentStoreError::DatabaseError(format!("Invalid recycled index {i}. {e}")))
        })
        .collect()
}
