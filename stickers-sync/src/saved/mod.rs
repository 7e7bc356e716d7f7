pub mod collections;
pub mod model;
pub mod oplog;
pub mod recency;
pub mod reconciler;
pub mod store;
