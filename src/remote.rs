use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::config::{as_base, child_url};
use crate::id::Identifier;
use crate::profile::{ProfileRecord, Source};
use crate::wsse::{self, Credentials};
use crate::Result;

const LOG_PREFIX: &str = "[remote-api]";

/// Per-identifier source.
///
/// `Ok(None)` means the source answered and has no such person; `Err` means
/// the source could not be asked.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn lookup(&self, id: &Identifier) -> Result<Option<ProfileRecord>>;

    /// Where the portrait for `record` lives.
    fn portrait_url(&self, record: &ProfileRecord) -> Result<Url>;

    /// Credentials to present when downloading a portrait.
    fn credentials(&self) -> &Credentials;
}

/// Payload returned by the profile API.
#[derive(Deserialize, Debug)]
struct RemoteProfile {
    full_name: String,
    #[serde(default, alias = "net_id")]
    identifier: Option<String>,
    #[serde(default)]
    photo_link: Option<String>,
    #[serde(flatten)]
    extra: BTreeMap<String, serde_json::Value>,
}

pub struct RemoteApi {
    client: reqwest::Client,
    api_base: Url,
    image_base: Url,
    credentials: Credentials,
}

impl RemoteApi {
    pub fn new(
        client: reqwest::Client,
        api_base: Url,
        image_base: Url,
        credentials: Credentials,
    ) -> Self {
        if credentials.is_anonymous() {
            log::warn!(
                "{} no credentials configured, requests go unsigned",
                LOG_PREFIX
            );
        }
        Self {
            client,
            api_base: as_base(api_base),
            image_base: as_base(image_base),
            credentials,
        }
    }
}

#[async_trait]
impl ProfileSource for RemoteApi {
    async fn lookup(&self, id: &Identifier) -> Result<Option<ProfileRecord>> {
        let url = match child_url(&self.api_base, id.as_str()) {
            Ok(url) => url,
            Err(e) => {
                log::info!("{} {} cannot be looked up: {}", LOG_PREFIX, id, e);
                return Ok(None);
            }
        };
        log::debug!("{} GET {}", LOG_PREFIX, url);
        let response = self
            .client
            .get(url)
            .headers(wsse::headers(&self.credentials)?)
            .send()
            .await?;

        if !response.status().is_success() {
            log::info!("{} {} answered {}", LOG_PREFIX, id, response.status());
            return Ok(None);
        }

        let body = response.bytes().await?;
        let profile: RemoteProfile = serde_json::from_slice(&body)?;
        Ok(Some(into_record(id, profile)))
    }

    fn portrait_url(&self, record: &ProfileRecord) -> Result<Url> {
        match &record.photo_link {
            Some(link) => Ok(link.clone()),
            None => child_url(&self.image_base, record.identifier.as_str()),
        }
    }

    fn credentials(&self) -> &Credentials {
        &self.credentials
    }
}

/// The record is keyed by the identifier that was asked for, whatever the
/// payload says.
fn into_record(id: &Identifier, profile: RemoteProfile) -> ProfileRecord {
    if let Some(reported) = &profile.identifier {
        if !reported.eq_ignore_ascii_case(id.as_str()) {
            log::warn!(
                "{} asked for {} but got {}",
                LOG_PREFIX,
                id,
                reported
            );
        }
    }

    let photo_link = profile
        .photo_link
        .as_deref()
        .and_then(|link| match Url::parse(link) {
            Ok(url) => Some(url),
            Err(e) => {
                log::warn!("{} bad photo link {:?}: {}", LOG_PREFIX, link, e);
                None
            }
        });

    let mut record = ProfileRecord::new(
        id.clone(),
        profile.full_name,
        Source::RemoteApi,
        photo_link,
    );
    record.extra = profile.extra;
    record
}
