//! Scoped, append-only log of pending saved-item mutations.
//!
//! Entries are ordered by `local_index` within a scope. `merge_index` is shared
//! by all scopes and only orders entries across them. A scope never ends in
//! more than one [`OperationRecord::Sync`]: [`push`] drops a trailing marker
//! before appending, so repeated resync requests collapse while add and
//! remove records are kept verbatim for the dispatcher to replay.

use futures_util::TryStreamExt;
use sqlx::{Row, SqliteConnection, sqlite::SqliteRow};
use tracing::debug;

use super::model::{LogEntry, OperationRecord, Scope};
use super::store::StoreError;

/// Appends `record` under the next `local_index` of `scope`.
///
/// Indices come from a per-scope counter and are never handed out twice, even
/// when the entry holding the highest index was removed.
pub async fn append(
    conn: &mut SqliteConnection,
    scope: Scope,
    record: &OperationRecord,
) -> Result<LogEntry, StoreError> {
    let local_index: i64 = sqlx::query_scalar(
        "INSERT INTO operation_log_indices (owner_scope, tag, last_local_index)
         VALUES (?1, ?2, 1)
         ON CONFLICT(owner_scope, tag) DO UPDATE SET
            last_local_index = operation_log_indices.last_local_index + 1
         RETURNING last_local_index",
    )
    .bind(scope.owner)
    .bind(scope.tag)
    .fetch_one(&mut *conn)
    .await?;

    let contents = serde_json::to_string(record)?;
    let result = sqlx::query(
        "INSERT INTO operation_log (owner_scope, tag, local_index, contents) VALUES (?1, ?2, ?3, ?4)",
    )
    .bind(scope.owner)
    .bind(scope.tag)
    .bind(local_index)
    .bind(contents)
    .execute(&mut *conn)
    .await?;

    Ok(LogEntry {
        local_index,
        merge_index: result.last_insert_rowid(),
        scope,
        record: record.clone(),
    })
}

/// Walks `scope` from the most recent entry backwards and returns the first
/// entry accepted by `predicate`, without reading the rest of the log.
pub async fn enumerate<F>(
    conn: &mut SqliteConnection,
    scope: Scope,
    mut predicate: F,
) -> Result<Option<LogEntry>, StoreError>
where
    F: FnMut(&LogEntry) -> bool,
{
    let mut rows = sqlx::query(
        "SELECT local_index, merge_index, contents
         FROM operation_log
         WHERE owner_scope = ?1 AND tag = ?2
         ORDER BY local_index DESC",
    )
    .bind(scope.owner)
    .bind(scope.tag)
    .fetch(&mut *conn);

    while let Some(row) = rows.try_next().await? {
        let entry = entry_from_row(&row, scope)?;
        if predicate(&entry) {
            return Ok(Some(entry));
        }
    }
    Ok(None)
}

pub async fn tail(
    conn: &mut SqliteConnection,
    scope: Scope,
) -> Result<Option<LogEntry>, StoreError> {
    enumerate(conn, scope, |_| true).await
}

pub async fn remove_entry(
    conn: &mut SqliteConnection,
    scope: Scope,
    local_index: i64,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "DELETE FROM operation_log WHERE owner_scope = ?1 AND tag = ?2 AND local_index = ?3",
    )
    .bind(scope.owner)
    .bind(scope.tag)
    .bind(local_index)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Removes the tail entry when it is a sync marker.
pub async fn compact_tail(conn: &mut SqliteConnection, scope: Scope) -> Result<bool, StoreError> {
    if let Some(top) = tail(conn, scope).await?
        && top.record.is_sync()
    {
        debug!(local_index = top.local_index, "dropping trailing sync marker");
        return remove_entry(conn, scope, top.local_index).await;
    }
    Ok(false)
}

pub async fn push(
    conn: &mut SqliteConnection,
    scope: Scope,
    record: &OperationRecord,
) -> Result<LogEntry, StoreError> {
    compact_tail(conn, scope).await?;
    append(conn, scope, record).await
}

/// Records a mutation and leaves the scope ending in exactly one sync marker.
pub async fn add_synchronize_operation(
    conn: &mut SqliteConnection,
    scope: Scope,
    operation: &OperationRecord,
) -> Result<LogEntry, StoreError> {
    let entry = push(conn, scope, operation).await?;
    append(conn, scope, &OperationRecord::Sync).await?;
    Ok(entry)
}

pub async fn request_sync(
    conn: &mut SqliteConnection,
    scope: Scope,
) -> Result<LogEntry, StoreError> {
    push(conn, scope, &OperationRecord::Sync).await
}

/// All entries of `scope` in commit order.
pub async fn entries(
    conn: &mut SqliteConnection,
    scope: Scope,
) -> Result<Vec<LogEntry>, StoreError> {
    let rows = sqlx::query(
        "SELECT local_index, merge_index, contents
         FROM operation_log
         WHERE owner_scope = ?1 AND tag = ?2
         ORDER BY local_index ASC",
    )
    .bind(scope.owner)
    .bind(scope.tag)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(|row| entry_from_row(row, scope)).collect()
}

pub async fn len(conn: &mut SqliteConnection, scope: Scope) -> Result<usize, StoreError> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM operation_log WHERE owner_scope = ?1 AND tag = ?2")
            .bind(scope.owner)
            .bind(scope.tag)
            .fetch_one(&mut *conn)
            .await?;
    Ok(usize::try_from(count).unwrap_or(0))
}

fn entry_from_row(row: &SqliteRow, scope: Scope) -> Result<LogEntry, StoreError> {
    let contents: String = row.try_get("contents")?;
    Ok(LogEntry {
        local_index: row.try_get("local_index")?,
        merge_index: row.try_get("merge_index")?,
        scope,
        record: serde_json::from_str(&contents)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::saved::store::memory_store;

    const SCOPE: Scope = Scope { owner: 0, tag: 7 };
    const OTHER: Scope = Scope { owner: 1, tag: 7 };

    fn add(id: i64) -> OperationRecord {
        OperationRecord::Add {
            file_id: id,
            access_hash: id,
            file_reference: None,
        }
    }

    fn remove(id: i64) -> OperationRecord {
        OperationRecord::Remove {
            file_id: id,
            access_hash: id,
        }
    }

    fn records(entries: &[LogEntry]) -> Vec<OperationRecord> {
        entries.iter().map(|entry| entry.record.clone()).collect()
    }

    #[tokio::test]
    async fn append_assigns_increasing_local_indices() {
        let store = memory_store().await;
        let mut conn = store.begin().await.unwrap();

        let first = append(&mut conn, SCOPE, &add(1)).await.unwrap();
        let second = append(&mut conn, SCOPE, &add(2)).await.unwrap();

        assert_eq!(first.local_index, 1);
        assert_eq!(second.local_index, 2);
        assert!(second.merge_index > first.merge_index);
    }

    #[tokio::test]
    async fn local_indices_are_not_reused_after_tail_removal() {
        let store = memory_store().await;
        let mut conn = store.begin().await.unwrap();

        append(&mut conn, SCOPE, &add(1)).await.unwrap();
        let second = append(&mut conn, SCOPE, &add(2)).await.unwrap();
        assert!(remove_entry(&mut conn, SCOPE, second.local_index).await.unwrap());
        let third = append(&mut conn, SCOPE, &add(3)).await.unwrap();

        assert_eq!(third.local_index, 3);
    }

    #[tokio::test]
    async fn scopes_have_independent_local_indices() {
        let store = memory_store().await;
        let mut conn = store.begin().await.unwrap();

        append(&mut conn, SCOPE, &add(1)).await.unwrap();
        append(&mut conn, SCOPE, &add(2)).await.unwrap();
        let other = append(&mut conn, OTHER, &add(3)).await.unwrap();

        assert_eq!(other.local_index, 1);
        assert_eq!(len(&mut conn, SCOPE).await.unwrap(), 2);
        assert_eq!(records(&entries(&mut conn, OTHER).await.unwrap()), vec![add(3)]);
    }

    #[tokio::test]
    async fn enumerate_is_most_recent_first_and_stops_at_match() {
        let store = memory_store().await;
        let mut conn = store.begin().await.unwrap();
        for id in 1..=4 {
            append(&mut conn, SCOPE, &add(id)).await.unwrap();
        }

        let mut visited = Vec::new();
        let found = enumerate(&mut conn, SCOPE, |entry| {
            visited.push(entry.local_index);
            entry.record == add(3)
        })
        .await
        .unwrap();

        assert_eq!(found.map(|entry| entry.local_index), Some(3));
        assert_eq!(visited, vec![4, 3]);
    }

    #[tokio::test]
    async fn enumerate_exhausts_without_match() {
        let store = memory_store().await;
        let mut conn = store.begin().await.unwrap();
        append(&mut conn, SCOPE, &add(1)).await.unwrap();

        let found = enumerate(&mut conn, SCOPE, |_| false).await.unwrap();
        assert!(found.is_none());
        assert!(tail(&mut conn, OTHER).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn repeated_sync_requests_leave_one_marker() {
        let store = memory_store().await;
        let mut conn = store.begin().await.unwrap();

        for _ in 0..5 {
            request_sync(&mut conn, SCOPE).await.unwrap();
        }

        assert_eq!(
            records(&entries(&mut conn, SCOPE).await.unwrap()),
            vec![OperationRecord::Sync]
        );
    }

    #[tokio::test]
    async fn compaction_never_drops_mutations() {
        let store = memory_store().await;
        let mut conn = store.begin().await.unwrap();

        push(&mut conn, SCOPE, &add(1)).await.unwrap();
        push(&mut conn, SCOPE, &OperationRecord::Sync).await.unwrap();
        push(&mut conn, SCOPE, &remove(2)).await.unwrap();
        push(&mut conn, SCOPE, &OperationRecord::Sync).await.unwrap();

        assert_eq!(
            records(&entries(&mut conn, SCOPE).await.unwrap()),
            vec![add(1), remove(2), OperationRecord::Sync]
        );
    }

    #[tokio::test]
    async fn synchronize_operation_ends_in_single_marker() {
        let store = memory_store().await;
        let mut conn = store.begin().await.unwrap();

        add_synchronize_operation(&mut conn, SCOPE, &add(1)).await.unwrap();
        add_synchronize_operation(&mut conn, SCOPE, &remove(1)).await.unwrap();
        add_synchronize_operation(&mut conn, SCOPE, &add(2)).await.unwrap();

        let log = entries(&mut conn, SCOPE).await.unwrap();
        assert_eq!(
            records(&log),
            vec![add(1), remove(1), add(2), OperationRecord::Sync]
        );
        let indices: Vec<i64> = log.iter().map(|entry| entry.local_index).collect();
        assert!(indices.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[tokio::test]
    async fn compact_tail_ignores_mutation_tail() {
        let store = memory_store().await;
        let mut conn = store.begin().await.unwrap();
        append(&mut conn, SCOPE, &add(1)).await.unwrap();

        assert!(!compact_tail(&mut conn, SCOPE).await.unwrap());
        assert_eq!(len(&mut conn, SCOPE).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn compaction_is_scoped() {
        let store = memory_store().await;
        let mut conn = store.begin().await.unwrap();
        request_sync(&mut conn, SCOPE).await.unwrap();
        request_sync(&mut conn, OTHER).await.unwrap();
        request_sync(&mut conn, SCOPE).await.unwrap();

        assert_eq!(len(&mut conn, SCOPE).await.unwrap(), 1);
        assert_eq!(len(&mut conn, OTHER).await.unwrap(), 1);
    }
}
