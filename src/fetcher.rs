//! HTTP transport abstraction.
//!
//! `HttpFetcher` is built the same way `downloaders::http::HttpClient::new`
//! builds its `reqwest::Client` (fixed user agent, connect/request
//! timeouts) and streams the response body the same way
//! (`response.bytes_stream()`). Unlike the installer's `HttpClient`, the
//! streaming disk-copy itself is not done here — the Download Engine owns
//! that step (spec.md §4.3, steps 7-9), so `Fetcher` only has to hand back
//! a status code and a byte stream.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::manifest::RequestConfig;

/// A streamed HTTP response.
pub struct FetchResponse {
    pub status: u16,
    pub body: Pin<Box<dyn Stream<Item = anyhow::Result<Bytes>> + Send>>,
}

/// Issues a GET for the `url` entry of a [`RequestConfig`] and yields a
/// status code plus a streaming body.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &RequestConfig) -> anyhow::Result<FetchResponse>;
}

/// Default [`Fetcher`] backed by `reqwest`.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("reconciled/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(300))
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &RequestConfig) -> anyhow::Result<FetchResponse> {
        let url = request
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("requestConfig is missing a url"))?;

        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes_stream();
        let body = futures::StreamExt::map(body, |chunk| chunk.map_err(anyhow::Error::from));

        Ok(FetchResponse {
            status,
            body: Box::pin(body),
        })
    }
}
