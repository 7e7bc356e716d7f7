use serde::{Deserialize, Serialize};
use stickers_core::StickerSetQuery;

/// Namespace of media identities issued by the server.
pub const CLOUD_FILE: i32 = 0;
/// Namespace of sticker collections mirrored from the server.
pub const CLOUD_STICKER_PACKS: i32 = 0;
/// Log tag reserved for saved sticker synchronization.
pub const SYNCHRONIZE_SAVED_STICKERS_TAG: i32 = 7;
/// Every saved sticker of the account shares one log scope.
pub const SAVED_ITEMS_SCOPE: Scope = Scope {
    owner: 0,
    tag: SYNCHRONIZE_SAVED_STICKERS_TAG,
};
pub const SAVED_STICKERS_LIST: OrderedListId = OrderedListId(1);
pub const DEFAULT_SAVED_CAPACITY: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId {
    pub namespace: i32,
    pub id: i64,
}

impl ItemId {
    pub fn cloud(id: i64) -> Self {
        Self {
            namespace: CLOUD_FILE,
            id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Scope {
    pub owner: i64,
    pub tag: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OrderedListId(pub i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CollectionId {
    pub namespace: i32,
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceRef {
    CloudDocument {
        file_id: i64,
        access_hash: i64,
        #[serde(default)]
        file_reference: Option<String>,
    },
    Local {
        key: String,
    },
}

impl ResourceRef {
    /// Only cloud documents can be named in a request to the server.
    pub fn is_externally_addressable(&self) -> bool {
        matches!(self, ResourceRef::CloudDocument { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CollectionRef {
    Id { id: i64, access_hash: i64 },
    Name { short_name: String },
    AnimatedEmoji,
    AnimatedEmojiAnimations,
    Dice { emoji: String },
}

impl CollectionRef {
    /// The locally cached collection this reference may resolve against.
    pub fn cached_collection(&self) -> Option<CollectionId> {
        match self {
            CollectionRef::Id { id, .. } => Some(CollectionId {
                namespace: CLOUD_STICKER_PACKS,
                id: *id,
            }),
            _ => None,
        }
    }

    /// Synthetic collections have no server-side set to fetch.
    pub fn fetch_query(&self) -> Option<StickerSetQuery> {
        match self {
            CollectionRef::Id { id, access_hash } => Some(StickerSetQuery::Id {
                id: *id,
                access_hash: *access_hash,
            }),
            CollectionRef::Name { short_name } => {
                Some(StickerSetQuery::ShortName(short_name.clone()))
            }
            CollectionRef::AnimatedEmoji
            | CollectionRef::AnimatedEmojiAnimations
            | CollectionRef::Dice { .. } => None,
        }
    }
}

/// A sticker as handed to the reconciler by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StickerFile {
    pub id: ItemId,
    pub resource: ResourceRef,
    #[serde(default)]
    pub collection: Option<CollectionRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedItem {
    pub identity: ItemId,
    pub source_reference: ResourceRef,
    #[serde(default)]
    pub labels: Vec<String>,
}

impl SavedItem {
    pub fn from_file(file: &StickerFile, labels: Vec<String>) -> Self {
        Self {
            identity: file.id,
            source_reference: file.resource.clone(),
            labels,
        }
    }
}

/// One member of a locally cached sticker collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionItem {
    pub file: StickerFile,
    #[serde(default)]
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationRecord {
    Add {
        file_id: i64,
        access_hash: i64,
        #[serde(default)]
        file_reference: Option<String>,
    },
    Remove {
        file_id: i64,
        access_hash: i64,
    },
    Sync,
}

impl OperationRecord {
    pub fn is_sync(&self) -> bool {
        matches!(self, OperationRecord::Sync)
    }

    /// Add record for a saved item; `None` when the source cannot be named remotely.
    pub fn add_for(item: &SavedItem) -> Option<Self> {
        match &item.source_reference {
            ResourceRef::CloudDocument {
                file_id,
                access_hash,
                file_reference,
            } => Some(OperationRecord::Add {
                file_id: *file_id,
                access_hash: *access_hash,
                file_reference: file_reference.clone(),
            }),
            ResourceRef::Local { .. } => None,
        }
    }

    pub fn remove_for(item: &SavedItem) -> Option<Self> {
        match &item.source_reference {
            ResourceRef::CloudDocument {
                file_id,
                access_hash,
                ..
            } => Some(OperationRecord::Remove {
                file_id: *file_id,
                access_hash: *access_hash,
            }),
            ResourceRef::Local { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub local_index: i64,
    pub merge_index: i64,
    pub scope: Scope,
    pub record: OperationRecord,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cloud_item(id: i64) -> SavedItem {
        SavedItem {
            identity: ItemId::cloud(id),
            source_reference: ResourceRef::CloudDocument {
                file_id: id,
                access_hash: id * 10,
                file_reference: Some("ref".into()),
            },
            labels: vec!["😀".into()],
        }
    }

    #[test]
    fn records_are_derived_from_cloud_documents() {
        let item = cloud_item(3);
        assert_eq!(
            OperationRecord::add_for(&item),
            Some(OperationRecord::Add {
                file_id: 3,
                access_hash: 30,
                file_reference: Some("ref".into()),
            })
        );
        assert_eq!(
            OperationRecord::remove_for(&item),
            Some(OperationRecord::Remove {
                file_id: 3,
                access_hash: 30,
            })
        );
    }

    #[test]
    fn local_resources_produce_no_records() {
        let item = SavedItem {
            identity: ItemId {
                namespace: 9,
                id: 1,
            },
            source_reference: ResourceRef::Local { key: "tmp".into() },
            labels: Vec::new(),
        };
        assert!(!item.source_reference.is_externally_addressable());
        assert_eq!(OperationRecord::add_for(&item), None);
        assert_eq!(OperationRecord::remove_for(&item), None);
    }

    #[test]
    fn synthetic_collections_are_not_fetchable() {
        assert!(CollectionRef::AnimatedEmoji.fetch_query().is_none());
        assert!(CollectionRef::AnimatedEmojiAnimations.fetch_query().is_none());
        assert!(
            CollectionRef::Dice {
                emoji: "🎲".into()
            }
            .fetch_query()
            .is_none()
        );
        assert_eq!(
            CollectionRef::Name {
                short_name: "cats".into()
            }
            .fetch_query(),
            Some(StickerSetQuery::ShortName("cats".into()))
        );
    }

    #[test]
    fn only_id_references_have_a_cached_collection() {
        let by_id = CollectionRef::Id {
            id: 4,
            access_hash: 5,
        };
        assert_eq!(
            by_id.cached_collection(),
            Some(CollectionId {
                namespace: CLOUD_STICKER_PACKS,
                id: 4
            })
        );
        assert_eq!(
            CollectionRef::Name {
                short_name: "cats".into()
            }
            .cached_collection(),
            None
        );
    }

    #[test]
    fn records_serialize_with_kind_tag() {
        let json = serde_json::to_string(&OperationRecord::Sync).unwrap();
        assert_eq!(json, r#"{"kind":"sync"}"#);
        let parsed: OperationRecord =
            serde_json::from_str(r#"{"kind":"remove","file_id":1,"access_hash":2}"#).unwrap();
        assert_eq!(
            parsed,
            OperationRecord::Remove {
                file_id: 1,
                access_hash: 2
            }
        );
    }
}
