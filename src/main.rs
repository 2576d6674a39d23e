use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use url::Url;

use rosterlib::{
    http, AssetStore, Config, Credentials, HtmlDirectory, HttpFetcher,
    Identifier, Manifest, RecordCache, RemoteApi, Resolution, Resolver,
};

#[derive(Parser, Debug)]
#[clap(name = "roster")]
#[clap(
    about = "Resolve people handles to name and portrait for a flashcard deck",
    long_about = None
)]
struct Cli {
    #[clap(required = true, help = "Handles to resolve, in order")]
    identifiers: Vec<String>,

    #[clap(long, help = "Drop handles that are not purely alphanumeric")]
    alnum_only: bool,

    #[clap(long, help = "Do not load the directory roster")]
    skip_directory: bool,

    #[clap(long, default_value = "Princeton Undergrads", help = "Deck name")]
    deck: String,

    #[clap(long, default_value = "output.json", help = "Manifest for the deck packager")]
    output: PathBuf,

    #[clap(long, help = "Cache file")]
    cache_file: Option<PathBuf>,

    #[clap(long, help = "Directory holding portraits")]
    assets_dir: Option<PathBuf>,

    #[clap(long, help = "Per-request timeout in seconds")]
    timeout: Option<u64>,

    #[clap(long, help = "Base URL of the people directory")]
    directory_base: Option<Url>,

    #[clap(long, help = "Base URL of the profile API")]
    api_base: Option<Url>,

    #[clap(long, help = "Base URL for fallback portraits")]
    image_base: Option<Url>,

    #[clap(long, env = "ROSTER_API_USERNAME")]
    api_username: Option<String>,

    #[clap(long, env = "ROSTER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

impl Cli {
    fn config(&self) -> anyhow::Result<Config> {
        let mut config = Config::new()?;
        if let Some(path) = &self.cache_file {
            config.cache_file = path.clone();
        }
        if let Some(dir) = &self.assets_dir {
            config.assets_dir = dir.clone();
        }
        if let Some(secs) = self.timeout {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(url) = &self.directory_base {
            config.directory_base = url.clone();
        }
        if let Some(url) = &self.api_base {
            config.api_base = url.clone();
        }
        if let Some(url) = &self.image_base {
            config.image_base = url.clone();
        }
        config.credentials =
            Credentials::new(self.api_username.clone(), self.api_key.clone());
        Ok(config)
    }

    fn identifiers(&self) -> Vec<String> {
        if !self.alnum_only {
            return self.identifiers.clone();
        }
        self.identifiers
            .iter()
            .filter(|raw| match Identifier::new(raw) {
                Ok(id) if id.is_alphanumeric() => true,
                _ => {
                    println!("Skipping {:?}: not an alphanumeric handle", raw);
                    false
                }
            })
            .cloned()
            .collect()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Cli::parse();
    let config = args.config()?;
    let identifiers = args.identifiers();

    let client = http::client(config.timeout)
        .context("Couldn't build HTTP client")?;

    let cache = if args.skip_directory {
        RecordCache::read(&config.cache_file)
    } else {
        let directory = HtmlDirectory::new(
            client.clone(),
            config.directory_base.clone(),
            config.directory_categories.clone(),
        );
        println!("Loading directory roster...");
        RecordCache::load(&config.cache_file, &directory, &config.placeholder)
            .await
    };

    let assets = AssetStore::new(
        &config.assets_dir,
        config.image_extension.clone(),
        Arc::new(HttpFetcher::new(client.clone())),
    );
    let remote = Arc::new(RemoteApi::new(
        client,
        config.api_base.clone(),
        config.image_base.clone(),
        config.credentials.clone(),
    ));

    let mut resolver = Resolver::new(cache, assets, remote);
    let resolutions = resolver.resolve_all(&identifiers[..]).await;

    for (raw, resolution) in &resolutions {
        match resolution {
            Resolution::Resolved(record) => println!(
                "{:<8} {} ({})",
                record.identifier, record.full_name, record.source
            ),
            Resolution::Unresolved(reason) => {
                println!("{:<8} unresolved: {}", raw, reason)
            }
        }
    }

    if let Err(e) = resolver.save() {
        println!("Couldn't save cache: {}", e);
    }

    let manifest =
        Manifest::from_resolutions(&args.deck, &resolutions, resolver.assets());
    for skipped in &manifest.skipped {
        println!("{:<8} left out: no portrait on disk", skipped);
    }
    manifest
        .write(&args.output)
        .with_context(|| format!("Couldn't write {}", args.output.display()))?;
    println!(
        "{} of {} people written to {}",
        manifest.notes.len(),
        identifiers.len(),
        args.output.display()
    );

    Ok(())
}
