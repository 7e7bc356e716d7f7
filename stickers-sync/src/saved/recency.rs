//! Bounded most-recently-used lists keyed by [`ItemId`].
//!
//! The front of a list is the entry with the highest rank. Upserting an item
//! gives it a rank above every other entry, then the list is cut back to its
//! capacity from the tail.

use serde::{Serialize, de::DeserializeOwned};
use sqlx::{Row, SqliteConnection};

use super::model::{ItemId, OrderedListId};
use super::store::StoreError;

/// Inserts or refreshes `id` at the front of `list` and evicts tail entries
/// beyond `capacity`. Returns the evicted ids, tail-most last.
pub async fn upsert_front<T: Serialize>(
    conn: &mut SqliteConnection,
    list: OrderedListId,
    id: ItemId,
    payload: &T,
    capacity: usize,
) -> Result<Vec<ItemId>, StoreError> {
    let rank: i64 =
        sqlx::query_scalar("SELECT COALESCE(MAX(rank), 0) + 1 FROM ordered_items WHERE list_id = ?1")
            .bind(list.0)
            .fetch_one(&mut *conn)
            .await?;
    let contents = serde_json::to_string(payload)?;

    sqlx::query(
        "INSERT INTO ordered_items (list_id, item_namespace, item_id, rank, contents)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(list_id, item_namespace, item_id) DO UPDATE SET
            rank = excluded.rank,
            contents = excluded.contents",
    )
    .bind(list.0)
    .bind(id.namespace)
    .bind(id.id)
    .bind(rank)
    .bind(contents)
    .execute(&mut *conn)
    .await?;

    evict_beyond(conn, list, capacity).await
}

async fn evict_beyond(
    conn: &mut SqliteConnection,
    list: OrderedListId,
    capacity: usize,
) -> Result<Vec<ItemId>, StoreError> {
    let rows = sqlx::query(
        "SELECT item_namespace, item_id
         FROM ordered_items
         WHERE list_id = ?1
         ORDER BY rank DESC
         LIMIT -1 OFFSET ?2",
    )
    .bind(list.0)
    .bind(i64::try_from(capacity).unwrap_or(i64::MAX))
    .fetch_all(&mut *conn)
    .await?;

    let mut evicted = Vec::with_capacity(rows.len());
    for row in rows {
        let id = ItemId {
            namespace: row.try_get("item_namespace")?,
            id: row.try_get("item_id")?,
        };
        remove(conn, list, id).await?;
        evicted.push(id);
    }
    Ok(evicted)
}

/// Removes `id` from `list`; absent ids are not an error.
pub async fn remove(
    conn: &mut SqliteConnection,
    list: OrderedListId,
    id: ItemId,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "DELETE FROM ordered_items WHERE list_id = ?1 AND item_namespace = ?2 AND item_id = ?3",
    )
    .bind(list.0)
    .bind(id.namespace)
    .bind(id.id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn contains(
    conn: &mut SqliteConnection,
    list: OrderedListId,
    id: ItemId,
) -> Result<bool, StoreError> {
    let row = sqlx::query(
        "SELECT 1 FROM ordered_items WHERE list_id = ?1 AND item_namespace = ?2 AND item_id = ?3",
    )
    .bind(list.0)
    .bind(id.namespace)
    .bind(id.id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.is_some())
}

pub async fn get<T: DeserializeOwned>(
    conn: &mut SqliteConnection,
    list: OrderedListId,
    id: ItemId,
) -> Result<Option<T>, StoreError> {
    let contents: Option<String> = sqlx::query_scalar(
        "SELECT contents FROM ordered_items WHERE list_id = ?1 AND item_namespace = ?2 AND item_id = ?3",
    )
    .bind(list.0)
    .bind(id.namespace)
    .bind(id.id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(contents) = contents else {
        return Ok(None);
    };
    Ok(Some(serde_json::from_str(&contents)?))
}

/// Payloads of `list` from front to tail.
pub async fn items<T: DeserializeOwned>(
    conn: &mut SqliteConnection,
    list: OrderedListId,
) -> Result<Vec<T>, StoreError> {
    let rows: Vec<String> =
        sqlx::query_scalar("SELECT contents FROM ordered_items WHERE list_id = ?1 ORDER BY rank DESC")
            .bind(list.0)
            .fetch_all(&mut *conn)
            .await?;

    rows.iter()
        .map(|contents| serde_json::from_str(contents).map_err(StoreError::from))
        .collect()
}

pub async fn len(conn: &mut SqliteConnection, list: OrderedListId) -> Result<usize, StoreError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ordered_items WHERE list_id = ?1")
        .bind(list.0)
        .fetch_one(&mut *conn)
        .await?;
    Ok(usize::try_from(count).unwrap_or(0))
}
