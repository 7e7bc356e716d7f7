//! Add/remove workflow for the saved stickers list.
//!
//! Adding runs in up to two phases. Phase one reads local state inside a
//! transaction and commits immediately when the labels of the sticker are
//! already known. Otherwise the transaction is closed and phase two asks the
//! server for the sticker's collection; its answer is committed in a second,
//! independent transaction. The recency list update and the log append always
//! land in the same transaction.

use sqlx::SqliteConnection;
use stickers_core::{StickerApiError, StickerClient, StickerSetQuery};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::collections;
use super::model::{
    ItemId, LogEntry, OperationRecord, OrderedListId, SAVED_ITEMS_SCOPE, SAVED_STICKERS_LIST,
    SavedItem, Scope, StickerFile,
};
use super::oplog;
use super::recency;
use super::store::{Store, StoreError};

#[derive(Debug, Error)]
pub enum SavedItemsError {
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
    #[error("collection lookup failed: {0}")]
    Remote(#[from] StickerApiError),
    #[error("sticker is not part of the referenced collection")]
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavedItemsErrorKind {
    Generic,
    NotFound,
}

impl SavedItemsError {
    pub fn kind(&self) -> SavedItemsErrorKind {
        match self {
            SavedItemsError::Storage(_) | SavedItemsError::Remote(_) => {
                SavedItemsErrorKind::Generic
            }
            SavedItemsError::NotFound => SavedItemsErrorKind::NotFound,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == SavedItemsErrorKind::Generic
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Saved { evicted: Vec<ItemId> },
    /// The sticker has no server-side document, so there is nothing to save.
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Absent,
    Removed,
    /// Dropped from the list without a log entry.
    RemovedLocally,
}

/// Result of the local phase of an add.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddStep {
    Committed(AddOutcome),
    NeedsLookup {
        file: StickerFile,
        query: StickerSetQuery,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LocalResolution {
    Resolved(SavedItem),
    Remote(StickerSetQuery),
}

pub struct SavedItemsReconciler {
    store: Store,
    client: StickerClient,
    scope: Scope,
    list: OrderedListId,
    capacity: usize,
}

impl SavedItemsReconciler {
    /// `capacity` is at least one, so a committed add always stays in the list
    /// next to its log record.
    pub fn new(store: Store, client: StickerClient, capacity: usize) -> Self {
        Self {
            store,
            client,
            scope: SAVED_ITEMS_SCOPE,
            list: SAVED_STICKERS_LIST,
            capacity: capacity.max(1),
        }
    }

    pub fn with_scope(mut self, scope: Scope, list: OrderedListId) -> Self {
        self.scope = scope;
        self.list = list;
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub async fn add_saved_item(&self, file: &StickerFile) -> Result<AddOutcome, SavedItemsError> {
        match self.local_step(file).await? {
            AddStep::Committed(outcome) => Ok(outcome),
            AddStep::NeedsLookup { file, query } => {
                let item = self.remote_step(&file, &query).await?;
                self.commit_add(&item).await
            }
        }
    }

    /// Phase one. The transaction is closed before this returns, so a lookup
    /// never runs while it is open.
    pub async fn local_step(&self, file: &StickerFile) -> Result<AddStep, SavedItemsError> {
        let mut tx = self.store.begin().await?;
        match resolve_locally(&mut tx, file).await? {
            LocalResolution::Resolved(item) => {
                let outcome = self.commit_in(&mut tx, &item).await?;
                tx.commit().await?;
                Ok(AddStep::Committed(outcome))
            }
            LocalResolution::Remote(query) => {
                tx.rollback().await?;
                debug!(item = file.id.id, ?query, "sticker labels need a collection lookup");
                Ok(AddStep::NeedsLookup {
                    file: file.clone(),
                    query,
                })
            }
        }
    }

    /// Phase two: fetch the collection and pick the sticker's labels out of it.
    pub async fn remote_step(
        &self,
        file: &StickerFile,
        query: &StickerSetQuery,
    ) -> Result<SavedItem, SavedItemsError> {
        let set = self.client.get_sticker_set(query).await.inspect_err(|err| {
            warn!(item = file.id.id, "collection lookup failed: {err}");
        })?;
        match set.labels_for(file.id.id) {
            Some(labels) => Ok(SavedItem::from_file(file, labels)),
            None => {
                info!(
                    item = file.id.id,
                    set = %set.set.short_name,
                    "sticker not found in its collection"
                );
                Err(SavedItemsError::NotFound)
            }
        }
    }

    pub async fn commit_add(&self, item: &SavedItem) -> Result<AddOutcome, SavedItemsError> {
        let mut tx = self.store.begin().await?;
        let outcome = self.commit_in(&mut tx, item).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    async fn commit_in(
        &self,
        conn: &mut SqliteConnection,
        item: &SavedItem,
    ) -> Result<AddOutcome, StoreError> {
        let Some(record) = OperationRecord::add_for(item) else {
            debug!(item = item.identity.id, "skipping sticker without a cloud document");
            return Ok(AddOutcome::Skipped);
        };
        let evicted =
            recency::upsert_front(conn, self.list, item.identity, item, self.capacity).await?;
        let entry = oplog::add_synchronize_operation(conn, self.scope, &record).await?;
        info!(
            item = item.identity.id,
            local_index = entry.local_index,
            evicted = evicted.len(),
            "saved sticker"
        );
        Ok(AddOutcome::Saved { evicted })
    }

    pub async fn remove_saved_item(&self, id: ItemId) -> Result<RemoveOutcome, SavedItemsError> {
        let mut tx = self.store.begin().await?;
        let Some(item) = recency::get::<SavedItem>(&mut tx, self.list, id).await? else {
            return Ok(RemoveOutcome::Absent);
        };

        recency::remove(&mut tx, self.list, id).await?;
        let outcome = match OperationRecord::remove_for(&item) {
            Some(record) => {
                oplog::add_synchronize_operation(&mut tx, self.scope, &record).await?;
                RemoveOutcome::Removed
            }
            None => RemoveOutcome::RemovedLocally,
        };
        tx.commit().await?;
        info!(item = id.id, ?outcome, "removed saved sticker");
        Ok(outcome)
    }

    pub async fn is_saved(&self, id: ItemId) -> Result<bool, SavedItemsError> {
        let mut tx = self.store.begin().await?;
        Ok(recency::contains(&mut tx, self.list, id).await?)
    }

    /// Asks the dispatcher for a full reconciliation pass.
    pub async fn request_resync(&self) -> Result<LogEntry, SavedItemsError> {
        let mut tx = self.store.begin().await?;
        let entry = oplog::request_sync(&mut tx, self.scope).await?;
        tx.commit().await?;
        Ok(entry)
    }

    pub async fn saved_items(&self) -> Result<Vec<SavedItem>, SavedItemsError> {
        Ok(self.store.saved_items(self.list).await?)
    }

    pub async fn pending_operations(&self) -> Result<Vec<LogEntry>, SavedItemsError> {
        Ok(self.store.pending_operations(self.scope).await?)
    }
}

async fn resolve_locally(
    conn: &mut SqliteConnection,
    file: &StickerFile,
) -> Result<LocalResolution, StoreError> {
    let Some(reference) = &file.collection else {
        return Ok(LocalResolution::Resolved(SavedItem::from_file(file, Vec::new())));
    };

    if let Some(collection) = reference.cached_collection() {
        let members = collections::collection_items(conn, collection).await?;
        if let Some(member) = members.iter().find(|member| member.file.id == file.id) {
            debug!(item = file.id.id, "labels resolved from cached collection");
            return Ok(LocalResolution::Resolved(SavedItem::from_file(
                &member.file,
                member.labels.clone(),
            )));
        }
    }

    Ok(match reference.fetch_query() {
        Some(query) => LocalResolution::Remote(query),
        None => LocalResolution::Resolved(SavedItem::from_file(file, Vec::new())),
    })
}
