// Captures remote images referenced by pasted editor content

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::future::join_all;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::redirect::Policy;
use reqwest::{ClientBuilder, Response, Url};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::ActionConfig;
use crate::file_type;
use crate::state::{BasicState, MultiState, ResponseState, StateCode};
use crate::storage::Storage;
use crate::upload::{destination, stored_state};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Remote returned status {0}")]
    Status(u16),

    #[error("Remote body exceeds {0} bytes")]
    TooLarge(u64),

    #[error("Redirect to blocked location: {0}")]
    BlockedRedirect(String),

    #[error("More than {0} redirects")]
    TooManyRedirects(usize),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl FetchError {
    pub fn state_code(&self) -> StateCode {
        match self {
            FetchError::Status(_) => StateCode::ConnectionError,
            FetchError::TooLarge(_) => StateCode::MaxSize,
            FetchError::BlockedRedirect(_) => StateCode::PreventHost,
            FetchError::TooManyRedirects(_) | FetchError::Transport(_) => StateCode::RemoteFail,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RemoteImage {
    pub content_type: Option<String>,
    pub data: Bytes,
}

#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    /// Downloads `url`, giving up once the body exceeds `max_size` bytes.
    ///
    /// Every redirect target must pass the same host policy as `url`.
    async fn fetch(
        &self,
        url: &Url,
        max_size: u64,
        blocked_hosts: &[String],
    ) -> Result<RemoteImage, FetchError>;
}

const MAX_REDIRECTS: usize = 5;

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        Self::with_builder(reqwest::Client::builder().timeout(timeout))
    }

    fn with_builder(builder: ClientBuilder) -> Result<Self, reqwest::Error> {
        // Redirects are followed in `fetch` so each hop is checked.
        let client = builder.redirect(Policy::none()).build()?;
        Ok(Self { client })
    }

    async fn get(&self, url: &Url) -> Result<Response, FetchError> {
        self.client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))
    }
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &Url,
        max_size: u64,
        blocked_hosts: &[String],
    ) -> Result<RemoteImage, FetchError> {
        let mut current = url.clone();
        let mut response = self.get(&current).await?;
        let mut hops = 0;

        while response.status().is_redirection() {
            let next = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|location| current.join(location).ok())
                .ok_or(FetchError::Status(response.status().as_u16()))?;

            if !is_fetchable(&next, blocked_hosts) {
                return Err(FetchError::BlockedRedirect(next.to_string()));
            }

            hops += 1;
            if hops > MAX_REDIRECTS {
                return Err(FetchError::TooManyRedirects(MAX_REDIRECTS));
            }

            tracing::debug!(from = %current, to = %next, "Following redirect");
            current = next;
            response = self.get(&current).await?;
        }

        read_image(response, max_size).await
    }
}

async fn read_image(mut response: Response, max_size: u64) -> Result<RemoteImage, FetchError> {
    if !response.status().is_success() {
        return Err(FetchError::Status(response.status().as_u16()));
    }

    if response.content_length().is_some_and(|len| len > max_size) {
        return Err(FetchError::TooLarge(max_size));
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let mut body = BytesMut::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| FetchError::Transport(e.to_string()))?
    {
        if (body.len() + chunk.len()) as u64 > max_size {
            return Err(FetchError::TooLarge(max_size));
        }
        body.extend_from_slice(&chunk);
    }

    Ok(RemoteImage {
        content_type,
        data: body.freeze(),
    })
}

pub struct ImageCatcher {
    storage: Arc<dyn Storage>,
    fetcher: Arc<dyn RemoteFetcher>,
}

impl ImageCatcher {
    pub fn new(storage: Arc<dyn Storage>, fetcher: Arc<dyn RemoteFetcher>) -> Self {
        Self { storage, fetcher }
    }

    /// Fetches every source concurrently; children keep the request order.
    ///
    /// The overall state only fails when sources were given and all of them
    /// failed.
    pub async fn capture(&self, sources: &[&str], config: &ActionConfig) -> ResponseState {
        let outcomes = join_all(sources.iter().map(|source| self.capture_one(source, config))).await;

        let all_failed = !outcomes.is_empty() && !outcomes.iter().any(BasicState::is_success);
        let state = if all_failed {
            MultiState::new(false, StateCode::RemoteFail)
        } else {
            MultiState::success()
        };

        outcomes
            .iter()
            .fold(state, |state, outcome| state.with_child(outcome))
            .into()
    }

    async fn capture_one(&self, source: &str, config: &ActionConfig) -> BasicState {
        self.try_capture(source, config)
            .await
            .unwrap_or_else(|code| BasicState::failure(code))
            .with_info("source", source)
    }

    async fn try_capture(&self, source: &str, config: &ActionConfig) -> Result<BasicState, StateCode> {
        let url = match Url::parse(source.trim()) {
            Ok(url) if is_web_scheme(&url) => url,
            _ => {
                tracing::warn!(source = %source, "Rejected malformed capture source");
                return Err(StateCode::RemoteFail);
            }
        };

        if !is_allowed_host(&url, &config.blocked_hosts) {
            tracing::warn!(source = %source, "Rejected capture from blocked host");
            return Err(StateCode::PreventHost);
        }

        let image = self
            .fetcher
            .fetch(&url, config.max_size, &config.blocked_hosts)
            .await
            .map_err(|e| {
                tracing::warn!(source = %source, error = %e, "Failed to fetch remote image");
                e.state_code()
            })?;

        let suffix = image
            .content_type
            .as_deref()
            .and_then(file_type::suffix_for_mime)
            .or_else(|| file_type::sniff_image(&image.data).and_then(file_type::suffix_for_mime))
            .unwrap_or_default();

        if !file_type::is_allowed(&suffix, &config.allow_files) {
            return Err(StateCode::NotAllowFileType);
        }

        if image.data.len() as u64 > config.max_size {
            return Err(StateCode::MaxSize);
        }

        let key = destination(&config.save_path, config.file_name.as_deref(), &suffix);

        let stored = self.storage.put(&key, image.data).await.map_err(|e| {
            tracing::error!(source = %source, key = %key, error = %e, "Failed to store remote image");
            StateCode::IoError
        })?;

        Ok(stored_state(&stored))
    }
}

fn is_web_scheme(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

fn is_fetchable(url: &Url, blocked_hosts: &[String]) -> bool {
    is_web_scheme(url) && is_allowed_host(url, blocked_hosts)
}

/// Rejects configured hosts and IP literals pointing at local networks.
fn is_allowed_host(url: &Url, blocked_hosts: &[String]) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };

    if blocked_hosts.iter().any(|blocked| blocked.eq_ignore_ascii_case(host)) {
        return false;
    }

    match host.trim_start_matches('[').trim_end_matches(']').parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => !is_local_v4(&ip),
        Ok(IpAddr::V6(ip)) => match ip.to_ipv4_mapped() {
            Some(mapped) => !is_local_v4(&mapped),
            None => !(ip.is_loopback() || ip.is_unspecified() || is_local_v6(&ip)),
        },
        Err(_) => true,
    }
}

fn is_local_v4(ip: &Ipv4Addr) -> bool {
    ip.is_loopback() || ip.is_private() || ip.is_link_local() || ip.is_unspecified()
}

fn is_local_v6(ip: &Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
}
