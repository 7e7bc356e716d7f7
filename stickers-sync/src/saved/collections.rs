use sqlx::SqliteConnection;

use super::model::{CollectionId, CollectionItem};
use super::store::StoreError;

/// Replaces the cached member list of `collection`, keeping the given order.
pub async fn replace_collection_items(
    conn: &mut SqliteConnection,
    collection: CollectionId,
    items: &[CollectionItem],
) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM collection_items WHERE collection_namespace = ?1 AND collection_id = ?2")
        .bind(collection.namespace)
        .bind(collection.id)
        .execute(&mut *conn)
        .await?;

    for (position, item) in items.iter().enumerate() {
        sqlx::query(
            "INSERT INTO collection_items (collection_namespace, collection_id, position, contents)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(collection.namespace)
        .bind(collection.id)
        .bind(position as i64)
        .bind(serde_json::to_string(item)?)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Cached members of `collection`; empty when it was never cached.
pub async fn collection_items(
    conn: &mut SqliteConnection,
    collection: CollectionId,
) -> Result<Vec<CollectionItem>, StoreError> {
    let rows: Vec<String> = sqlx::query_scalar(
        "SELECT contents FROM collection_items
         WHERE collection_namespace = ?1 AND collection_id = ?2
         ORDER BY position ASC",
    )
    .bind(collection.namespace)
    .bind(collection.id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|contents| serde_json::from_str(contents).map_err(StoreError::from))
        .collect()
}
