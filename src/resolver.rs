use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::id::Identifier;
use crate::profile::{ProfileRecord, Source};
use crate::remote::ProfileSource;
use crate::storage::{AssetStore, RecordCache};
use crate::wsse::Credentials;
use crate::Result;

const LOG_PREFIX: &str = "[resolver]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnresolvedReason {
    /// The handle is empty or too long.
    InvalidIdentifier,
    /// The remote source answered that it has no such person.
    NotFound,
    /// The remote source could not be reached or sent something unreadable.
    ProviderUnavailable,
    /// Cached directory record whose portrait could not be downloaded.
    IncompleteDirectoryEntry,
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            UnresolvedReason::InvalidIdentifier => "invalid identifier",
            UnresolvedReason::NotFound => "not found",
            UnresolvedReason::ProviderUnavailable => "provider unavailable",
            UnresolvedReason::IncompleteDirectoryEntry => {
                "directory entry without portrait"
            }
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Resolved(ProfileRecord),
    Unresolved(UnresolvedReason),
}

impl Resolution {
    pub fn record(&self) -> Option<&ProfileRecord> {
        match self {
            Resolution::Resolved(record) => Some(record),
            Resolution::Unresolved(_) => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolution::Resolved(_))
    }
}

/// Turns identifiers into profile records, preferring what is already on
/// disk and asking the remote source only when needed.
///
/// Directory records are bulk-loaded into the cache before the run and are
/// never re-asked per identifier. Within one run the remote source is asked
/// at most once per identifier, whatever the answer was.
pub struct Resolver {
    cache: RecordCache,
    assets: AssetStore,
    remote: Arc<dyn ProfileSource>,
    anonymous: Credentials,
    attempted: HashSet<Identifier>,
    misses: HashMap<Identifier, UnresolvedReason>,
}

impl Resolver {
    pub fn new(
        cache: RecordCache,
        assets: AssetStore,
        remote: Arc<dyn ProfileSource>,
    ) -> Self {
        Self {
            cache,
            assets,
            remote,
            anonymous: Credentials::default(),
            attempted: HashSet::new(),
            misses: HashMap::new(),
        }
    }

    pub fn cache(&self) -> &RecordCache {
        &self.cache
    }

    pub fn assets(&self) -> &AssetStore {
        &self.assets
    }

    pub fn save(&self) -> Result<()> {
        self.cache.save()
    }

    /// Resolve each identifier in order. Later identifiers see every cache
    /// and asset write made for earlier ones.
    pub async fn resolve_all<S: AsRef<str>>(
        &mut self,
        identifiers: &[S],
    ) -> Vec<(String, Resolution)> {
        let mut resolutions = Vec::with_capacity(identifiers.len());
        for raw in identifiers {
            let resolution = self.resolve(raw.as_ref()).await;
            resolutions.push((raw.as_ref().to_owned(), resolution));
        }
        resolutions
    }

    pub async fn resolve(&mut self, raw: &str) -> Resolution {
        let id = match Identifier::new(raw) {
            Ok(id) => id,
            Err(e) => {
                log::warn!("{} {}", LOG_PREFIX, e);
                return Resolution::Unresolved(UnresolvedReason::InvalidIdentifier);
            }
        };

        if let Some(reason) = self.misses.get(&id) {
            return Resolution::Unresolved(reason.clone());
        }

        if let Some(record) = self.cache.get(&id).cloned() {
            match record.source {
                Source::Directory => {
                    return self.resolve_directory(id, record).await;
                }
                Source::RemoteApi
                    if self.assets.has_complete(&id)
                        || self.attempted.contains(&id) =>
                {
                    log::debug!("{} {} served from cache", LOG_PREFIX, id);
                    return Resolution::Resolved(record);
                }
                Source::RemoteApi => {
                    log::debug!(
                        "{} {} cached without portrait, asking remote",
                        LOG_PREFIX,
                        id
                    );
                }
            }
        }

        self.resolve_remote(id).await
    }

    /// A directory record is final: if its portrait cannot be recovered the
    /// identifier stays unresolved rather than being handed to the remote
    /// source.
    async fn resolve_directory(
        &mut self,
        id: Identifier,
        record: ProfileRecord,
    ) -> Resolution {
        let link = match record.photo_link.clone() {
            Some(link) if !self.assets.has_complete(&id) => link,
            _ => {
                log::debug!("{} {} served from directory cache", LOG_PREFIX, id);
                return Resolution::Resolved(record);
            }
        };

        let outcome = self
            .assets
            .fetch_into(&id, &link, &self.anonymous)
            .await;
        if outcome.is_complete() {
            Resolution::Resolved(record)
        } else {
            log::warn!(
                "{} {} has a directory record but no portrait",
                LOG_PREFIX,
                id
            );
            self.miss(id, UnresolvedReason::IncompleteDirectoryEntry)
        }
    }

    async fn resolve_remote(&mut self, id: Identifier) -> Resolution {
        self.attempted.insert(id.clone());

        let record = match self.remote.lookup(&id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                log::info!("{} {} not found", LOG_PREFIX, id);
                return self.miss(id, UnresolvedReason::NotFound);
            }
            Err(e) => {
                log::warn!("{} lookup of {} failed: {}", LOG_PREFIX, id, e);
                return self.miss(id, UnresolvedReason::ProviderUnavailable);
            }
        };

        self.cache.insert(record.clone());

        // The record is returned even without a portrait; packaging checks
        // asset completeness on its own.
        match self.remote.portrait_url(&record) {
            Ok(url) => {
                let outcome = self
                    .assets
                    .fetch_into(&id, &url, self.remote.credentials())
                    .await;
                log::debug!("{} portrait for {}: {:?}", LOG_PREFIX, id, outcome);
            }
            Err(e) => {
                log::warn!("{} no portrait url for {}: {}", LOG_PREFIX, id, e)
            }
        }

        Resolution::Resolved(record)
    }

    fn miss(&mut self, id: Identifier, reason: UnresolvedReason) -> Resolution {
        self.misses.insert(id, reason.clone());
        Resolution::Unresolved(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::PortraitFetcher;
    use async_trait::async_trait;
    use reqwest::header::HeaderMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempdir::TempDir;
    use url::Url;

    enum Answer {
        Found(ProfileRecord),
        Missing,
        Down,
    }

    struct FakeRemote {
        answers: HashMap<String, Answer>,
        calls: Mutex<Vec<String>>,
        credentials: Credentials,
    }

    impl FakeRemote {
        fn new(answers: Vec<(&str, Answer)>) -> Arc<Self> {
            Arc::new(Self {
                answers: answers
                    .into_iter()
                    .map(|(id, answer)| (id.to_owned(), answer))
                    .collect(),
                calls: Mutex::new(Vec::new()),
                credentials: Credentials::default(),
            })
        }

        fn calls_for(&self, id: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|call| call.as_str() == id)
                .count()
        }
    }

    #[async_trait]
    impl ProfileSource for FakeRemote {
        async fn lookup(&self, id: &Identifier) -> Result<Option<ProfileRecord>> {
            self.calls.lock().unwrap().push(id.to_string());
            match self.answers.get(id.as_str()) {
                Some(Answer::Found(record)) => Ok(Some(record.clone())),
                Some(Answer::Down) => Err(anyhow::anyhow!("timed out").into()),
                Some(Answer::Missing) | None => Ok(None),
            }
        }

        fn portrait_url(&self, record: &ProfileRecord) -> Result<Url> {
            Ok(match &record.photo_link {
                Some(link) => link.clone(),
                None => Url::parse("http://img/")?.join(record.identifier.as_str())?,
            })
        }

        fn credentials(&self) -> &Credentials {
            &self.credentials
        }
    }

    /// Serves a fixed body for every URL that does not contain "broken".
    struct FakeFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PortraitFetcher for FakeFetcher {
        async fn fetch(&self, url: &Url, _headers: HeaderMap) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if url.as_str().contains("broken") {
                Err(anyhow::anyhow!("connection reset").into())
            } else {
                Ok(b"portrait".to_vec())
            }
        }
    }

    struct Fixture {
        _dir: TempDir,
        fetcher: Arc<FakeFetcher>,
        resolver: Resolver,
    }

    fn fixture(remote: Arc<FakeRemote>, cached: Vec<ProfileRecord>) -> Fixture {
        crate::initialize();
        let dir = TempDir::new("resolver").unwrap();
        let fetcher = Arc::new(FakeFetcher {
            calls: AtomicUsize::new(0),
        });
        let mut cache = RecordCache::new(dir.path().join("cache.json"));
        cache.merge_bulk(cached);
        let assets =
            AssetStore::new(dir.path().join("assets"), "png", fetcher.clone());
        Fixture {
            _dir: dir,
            fetcher,
            resolver: Resolver::new(cache, assets, remote),
        }
    }

    fn record(id: &str, source: Source, photo: Option<&str>) -> ProfileRecord {
        ProfileRecord::new(
            Identifier::new(id).unwrap(),
            format!("Person {}", id),
            source,
            photo.map(|p| Url::parse(p).unwrap()),
        )
    }

    fn id(raw: &str) -> Identifier {
        Identifier::new(raw).unwrap()
    }

    #[tokio::test]
    async fn remote_hit_is_cached_with_portrait() {
        let remote = FakeRemote::new(vec![(
            "abc1234",
            Answer::Found(record("abc1234", Source::RemoteApi, Some("http://x/y.png"))),
        )]);
        let mut f = fixture(remote.clone(), vec![]);

        let resolution = f.resolver.resolve("ABC1234").await;

        let resolved = resolution.record().unwrap();
        assert_eq!(resolved.source, Source::RemoteApi);
        assert_eq!(resolved.full_name, "Person abc1234");
        assert!(f.resolver.assets().has_complete(&id("abc1234")));
        assert!(f.resolver.cache().get(&id("abc1234")).is_some());
    }

    #[tokio::test]
    async fn second_resolution_is_identical_and_offline() {
        let remote = FakeRemote::new(vec![(
            "abc1234",
            Answer::Found(record("abc1234", Source::RemoteApi, None)),
        )]);
        let mut f = fixture(remote.clone(), vec![]);

        let first = f.resolver.resolve("abc1234").await;
        let second = f.resolver.resolve("abc1234").await;

        assert_eq!(first, second);
        assert_eq!(remote.calls_for("abc1234"), 1);
        assert_eq!(f.fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn directory_record_wins_over_remote() {
        let remote = FakeRemote::new(vec![(
            "zz99",
            Answer::Found(record("zz99", Source::RemoteApi, None)),
        )]);
        let mut f = fixture(
            remote.clone(),
            vec![record("zz99", Source::Directory, Some("http://d/zz99.jpg"))],
        );

        let resolution = f.resolver.resolve("zz99").await;

        assert_eq!(resolution.record().unwrap().source, Source::Directory);
        assert_eq!(remote.calls_for("zz99"), 0);
        assert!(f.resolver.assets().has_complete(&id("zz99")));
    }

    #[tokio::test]
    async fn directory_record_without_photo_needs_no_asset() {
        let remote = FakeRemote::new(vec![]);
        let mut f = fixture(remote.clone(), vec![record("np1", Source::Directory, None)]);

        let resolution = f.resolver.resolve("np1").await;

        assert!(resolution.is_resolved());
        assert_eq!(f.fetcher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(remote.calls_for("np1"), 0);
    }

    #[tokio::test]
    async fn absent_everywhere_leaves_no_trace() {
        let remote = FakeRemote::new(vec![("nope0001", Answer::Missing)]);
        let mut f = fixture(remote.clone(), vec![]);

        let resolution = f.resolver.resolve("nope0001").await;

        assert_eq!(
            resolution,
            Resolution::Unresolved(UnresolvedReason::NotFound)
        );
        assert!(f.resolver.cache().is_empty());
        assert!(!f.resolver.assets().path(&id("nope0001")).exists());

        f.resolver.resolve("nope0001").await;
        assert_eq!(remote.calls_for("nope0001"), 1);
    }

    #[tokio::test]
    async fn broken_directory_portrait_is_not_handed_to_remote() {
        let remote = FakeRemote::new(vec![(
            "qr5",
            Answer::Found(record("qr5", Source::RemoteApi, None)),
        )]);
        let mut f = fixture(
            remote.clone(),
            vec![record("qr5", Source::Directory, Some("http://d/broken.jpg"))],
        );

        let resolution = f.resolver.resolve("qr5").await;

        assert_eq!(
            resolution,
            Resolution::Unresolved(UnresolvedReason::IncompleteDirectoryEntry)
        );
        assert_eq!(remote.calls_for("qr5"), 0);
        let cached = f.resolver.cache().get(&id("qr5")).unwrap();
        assert_eq!(cached.source, Source::Directory);
    }

    #[tokio::test]
    async fn provider_failure_does_not_abort_batch() {
        let remote = FakeRemote::new(vec![
            ("down1", Answer::Down),
            (
                "ok1",
                Answer::Found(record("ok1", Source::RemoteApi, None)),
            ),
        ]);
        let mut f = fixture(remote.clone(), vec![]);

        let results = f
            .resolver
            .resolve_all(&["down1", "", "waytoolong", "ok1"])
            .await;

        assert_eq!(results.len(), 4);
        assert_eq!(
            results[0].1,
            Resolution::Unresolved(UnresolvedReason::ProviderUnavailable)
        );
        assert_eq!(
            results[1].1,
            Resolution::Unresolved(UnresolvedReason::InvalidIdentifier)
        );
        assert_eq!(
            results[2].1,
            Resolution::Unresolved(UnresolvedReason::InvalidIdentifier)
        );
        assert!(results[3].1.is_resolved());
        assert_eq!(results[3].0, "ok1");
    }

    #[tokio::test]
    async fn remote_record_without_portrait_is_refetched_once() {
        let remote = FakeRemote::new(vec![(
            "rr1",
            Answer::Found(record("rr1", Source::RemoteApi, Some("http://x/broken.png"))),
        )]);
        let mut f = fixture(
            remote.clone(),
            vec![record("rr1", Source::RemoteApi, Some("http://x/broken.png"))],
        );

        let first = f.resolver.resolve("rr1").await;
        let second = f.resolver.resolve("rr1").await;

        assert!(first.is_resolved());
        assert_eq!(first, second);
        assert!(!f.resolver.assets().has_complete(&id("rr1")));
        assert_eq!(remote.calls_for("rr1"), 1);
    }

    #[tokio::test]
    async fn remote_record_with_portrait_skips_network() {
        let remote = FakeRemote::new(vec![]);
        let mut f = fixture(
            remote.clone(),
            vec![record("rr2", Source::RemoteApi, None)],
        );
        std::fs::create_dir_all(f.resolver.assets().root()).unwrap();
        std::fs::write(f.resolver.assets().path(&id("rr2")), b"img").unwrap();

        let resolution = f.resolver.resolve("rr2").await;

        assert!(resolution.is_resolved());
        assert_eq!(remote.calls_for("rr2"), 0);
        assert_eq!(f.fetcher.calls.load(Ordering::SeqCst), 0);
    }
}
