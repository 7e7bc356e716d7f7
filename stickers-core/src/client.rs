use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://api.stickers.example";

#[derive(Debug, Error)]
pub enum StickerApiError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
}

/// Addresses a sticker set on the server, either by its numeric identity or by
/// its public short name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StickerSetQuery {
    Id { id: i64, access_hash: i64 },
    ShortName(String),
}

#[derive(Clone)]
pub struct StickerClient {
    http: Client,
    base_url: Url,
    token: Option<String>,
}

impl StickerClient {
    pub fn new(token: impl Into<String>) -> Result<Self, StickerApiError> {
        Self::with_base_url(DEFAULT_BASE_URL, Some(token.into()))
    }

    pub fn with_base_url(base_url: &str, token: Option<String>) -> Result<Self, StickerApiError> {
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(base_url)?,
            token,
        })
    }

    pub async fn get_sticker_set(
        &self,
        query: &StickerSetQuery,
    ) -> Result<StickerSet, StickerApiError> {
        let mut url = self.endpoint("/v1/stickers/sets")?;
        {
            let mut pairs = url.query_pairs_mut();
            match query {
                StickerSetQuery::Id { id, access_hash } => {
                    pairs
                        .append_pair("id", &id.to_string())
                        .append_pair("access_hash", &access_hash.to_string());
                }
                StickerSetQuery::ShortName(name) => {
                    pairs.append_pair("short_name", name);
                }
            }
        }
        let mut request = self.http.get(url);
        if let Some(value) = self.auth_header_value() {
            request = request.header("Authorization", value);
        }
        let response = request.send().await?;
        Self::handle_response(response).await
    }

    fn auth_header_value(&self) -> Option<String> {
        self.token.as_ref().map(|token| format!("Bearer {token}"))
    }

    fn endpoint(&self, path: &str) -> Result<Url, StickerApiError> {
        Ok(self.base_url.join(path)?)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, StickerApiError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(StickerApiError::Api { status, body })
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct StickerSetInfo {
    pub id: i64,
    pub access_hash: i64,
    pub short_name: String,
}

/// Groups the documents that share one emoticon.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct StickerPack {
    pub emoticon: String,
    #[serde(default)]
    pub document_ids: Vec<i64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct StickerSet {
    pub set: StickerSetInfo,
    #[serde(default)]
    pub packs: Vec<StickerPack>,
}

impl StickerSet {
    /// Emoticons of every pack listing `document_id`, in pack order.
    ///
    /// `None` means the set does not index the document at all.
    pub fn labels_for(&self, document_id: i64) -> Option<Vec<String>> {
        let labels: Vec<String> = self
            .packs
            .iter()
            .filter(|pack| pack.document_ids.contains(&document_id))
            .map(|pack| pack.emoticon.clone())
            .collect();
        if labels.is_empty() {
            None
        } else {
            Some(labels)
        }
    }
}
