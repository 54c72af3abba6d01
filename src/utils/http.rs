// src/utils/http.rs

//! Regional fetch proxy.
//!
//! Every request to the source site leaves through one fixed egress point,
//! either an HTTP proxy pinned to a region or a relay endpoint that takes
//! the target as `?to=<url>`. Session cookies are attached only for the
//! source host, and caches are bypassed on every call. Network errors are
//! returned unchanged; retry policy belongs to the callers.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, COOKIE, HeaderMap, HeaderValue, PRAGMA};

use crate::error::{AppError, Result};
use crate::models::Config;
use crate::utils::url::{is_same_site, relay_target};

/// A fully read HTTP exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResponse {
    pub url: String,
    pub status: u16,
    /// Lowercase header names
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }
}

/// Seam for every outbound request.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchResponse>;
}

/// Create a configured asynchronous HTTP client.
pub fn create_async_client(config: &Config) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache, no-store"));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));

    let mut builder = reqwest::Client::builder()
        .user_agent(&config.crawler.user_agent)
        .timeout(Duration::from_secs(config.crawler.timeout_secs))
        .default_headers(headers);

    if let Some(proxy) = &config.source.proxy_url {
        builder = builder.proxy(reqwest::Proxy::all(proxy)?);
    }

    Ok(builder.build()?)
}

/// Production fetcher routed through the configured egress point.
pub struct RegionalFetcher {
    client: reqwest::Client,
    relay_url: Option<String>,
    source_host: Option<String>,
    session_cookie: Option<String>,
}

impl RegionalFetcher {
    /// Build from configuration; fails when required credentials are missing.
    pub fn new(config: &Config) -> Result<Self> {
        let session_cookie = config.source.session_cookie();
        if config.source.require_session && session_cookie.is_none() {
            return Err(AppError::config(
                "session credentials are required (EH_MEMBER_ID / EH_PASS_HASH)",
            ));
        }

        Ok(Self {
            client: create_async_client(config)?,
            relay_url: config.source.relay_url.clone(),
            source_host: config.source.host(),
            session_cookie,
        })
    }

    /// The URL actually requested for `target`.
    fn routed_url(&self, target: &str) -> Result<String> {
        match &self.relay_url {
            Some(relay) => relay_target(relay, target),
            None => Ok(target.to_string()),
        }
    }

    fn wants_session(&self, target: &str) -> bool {
        match &self.source_host {
            Some(host) => is_same_site(target, host),
            None => false,
        }
    }
}

#[async_trait]
impl Fetcher for RegionalFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResponse> {
        let routed = self.routed_url(url)?;
        let mut request = self.client.get(&routed);
        if let Some(cookie) = self.session_cookie.as_deref().filter(|_| self.wants_session(url)) {
            request = request.header(COOKIE, cookie);
        }

        log::debug!("GET {url}");
        let response = request.send().await?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.text().await?;

        Ok(FetchResponse {
            url: url.to_string(),
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted fetcher for job tests.

    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    use super::*;

    /// Replays canned responses per URL and records every request.
    #[derive(Default)]
    pub struct ScriptedFetcher {
        responses: Mutex<HashMap<String, VecDeque<FetchResponse>>>,
        requests: Mutex<Vec<String>>,
    }

    impl ScriptedFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(&self, url: &str, status: u16, body: &str) {
            let response = FetchResponse {
                url: url.to_string(),
                status,
                headers: BTreeMap::new(),
                body: body.to_string(),
            };
            self.responses
                .lock()
                .unwrap()
                .entry(url.to_string())
                .or_default()
                .push_back(response);
        }

        pub fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchResponse> {
            self.requests.lock().unwrap().push(url.to_string());
            let mut responses = self.responses.lock().unwrap();
            let queue = responses.get_mut(url);
            match queue.and_then(|q| if q.len() > 1 { q.pop_front() } else { q.front().cloned() }) {
                Some(response) => Ok(response),
                None => Err(AppError::storage(format!("no scripted response for {url}"))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_routing_and_session_scope() {
        let mut config = Config::default();
        config.source.relay_url = Some("https://relay.internal/fetch-proxy".into());
        config.source.member_id = Some("1".into());
        config.source.pass_hash = Some("h".into());
        let fetcher = RegionalFetcher::new(&config).unwrap();

        assert!(
            fetcher
                .routed_url("https://e-hentai.org/g/1/a/")
                .unwrap()
                .starts_with("https://relay.internal/fetch-proxy?to=https%3A%2F%2Fe-hentai.org")
        );
        assert!(fetcher.wants_session("https://e-hentai.org/g/1/a/"));
        assert!(!fetcher.wants_session("https://api.github.com/repos/x/y/releases/latest"));
    }

    #[test]
    fn test_missing_required_session_fails() {
        let mut config = Config::default();
        config.source.require_session = true;
        assert!(matches!(
            RegionalFetcher::new(&config),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let mut headers = BTreeMap::new();
        headers.insert("cf-ray".to_string(), "abc-LHR".to_string());
        let response = FetchResponse {
            status: 451,
            headers,
            ..Default::default()
        };
        assert_eq!(response.header("CF-Ray"), Some("abc-LHR"));
        assert!(!response.is_success());
    }
}
