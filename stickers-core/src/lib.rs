mod client;

pub use client::{
    StickerApiError, StickerClient, StickerPack, StickerSet, StickerSetInfo, StickerSetQuery,
};
