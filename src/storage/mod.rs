pub mod asset_store;
pub mod record_cache;

pub use asset_store::{AssetOutcome, AssetStore};
pub use record_cache::RecordCache;
