pub mod atomic;
pub mod config;
pub mod directory;
mod errors;
pub mod export;
pub mod http;
pub mod id;
pub mod profile;
pub mod remote;
pub mod resolver;
pub mod storage;
pub mod wsse;

pub use errors::{Result, RosterError};

pub use config::Config;
pub use directory::{DirectorySource, HtmlDirectory};
pub use export::Manifest;
pub use http::{HttpFetcher, PortraitFetcher};
pub use id::Identifier;
pub use profile::{ProfileRecord, Source};
pub use remote::{ProfileSource, RemoteApi};
pub use resolver::{Resolution, Resolver, UnresolvedReason};
pub use storage::{AssetOutcome, AssetStore, RecordCache};
pub use wsse::Credentials;

#[cfg(test)]
pub(crate) fn initialize() {
    let _ = env_logger::builder().is_test(true).try_init();
}
