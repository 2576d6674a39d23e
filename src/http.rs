use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use url::Url;

use crate::{Result, RosterError};

const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:102.0) Gecko/20100101 Firefox/102.0";

/// Client shared by every provider. Each request is bounded by `timeout`;
/// an expired request surfaces as an ordinary `reqwest` error.
pub fn client(timeout: Duration) -> Result<reqwest::Client> {
    let mut header = HeaderMap::new();
    header.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    let client = reqwest::Client::builder()
        .default_headers(header)
        .timeout(timeout)
        .build()?;
    Ok(client)
}

/// Downloads raw portrait bytes.
#[async_trait]
pub trait PortraitFetcher: Send + Sync {
    async fn fetch(&self, url: &Url, headers: HeaderMap) -> Result<Vec<u8>>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PortraitFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, headers: HeaderMap) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url.clone())
            .headers(headers)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(RosterError::Other(anyhow::anyhow!(
                "{} answered {}",
                url,
                response.status()
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }
}
