//! Anti-block protocol handler.
//!
//! Classifies a single HTTP exchange with the source site:
//!
//! | Outcome        | Trigger                                  | Caller action                 |
//! |----------------|------------------------------------------|-------------------------------|
//! | Normal         | 2xx, no ban text, no not-found marker    | extract                       |
//! | TemporaryBan   | ban phrase in body, any status           | stop run, reschedule later    |
//! | Geo-block      | 451 and trace location is flagged        | stop run, no reschedule       |
//! | Gone           | 404/410 or a not-found marker            | stamp item, continue          |
//! | Other error    | any other non-2xx (including 451 elsewhere) | log, skip item             |

use std::collections::BTreeMap;

use crate::error::{AppError, Context, Result};
use crate::models::SourceConfig;
use crate::utils::http::{FetchResponse, Fetcher};
use crate::utils::truncate_chars;

/// Body excerpt length carried in diagnostic context.
const BODY_EXCERPT_CHARS: usize = 500;

/// Response headers worth logging when a block is suspected.
const DIAGNOSTIC_HEADERS: &[&str] = &["cf-ray", "cf-cache-status", "server", "date"];

/// Classification of one exchange before any trace lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseClass {
    Normal,
    TemporaryBan,
    /// 451; needs a trace lookup to tell abort from skip
    GeoBlocked,
    Gone,
    HttpError,
}

/// Detects bans and geo-blocks on source responses.
#[derive(Debug, Clone)]
pub struct BlockGuard {
    ban_phrase: String,
    not_found_markers: Vec<String>,
    trace_url: String,
    flagged_regions: Vec<String>,
}

impl BlockGuard {
    pub fn new(source: &SourceConfig) -> Self {
        Self {
            ban_phrase: source.ban_phrase.clone(),
            not_found_markers: source.not_found_markers.clone(),
            trace_url: source.trace_url.clone(),
            flagged_regions: source
                .flagged_regions
                .iter()
                .map(|r| r.to_uppercase())
                .collect(),
        }
    }

    /// Classify without side effects.
    pub fn classify(&self, response: &FetchResponse) -> ResponseClass {
        if response.body.contains(&self.ban_phrase) {
            return ResponseClass::TemporaryBan;
        }
        match response.status {
            451 => ResponseClass::GeoBlocked,
            404 | 410 => ResponseClass::Gone,
            _ if !response.is_success() => ResponseClass::HttpError,
            _ if self
                .not_found_markers
                .iter()
                .any(|m| response.body.contains(m.as_str())) =>
            {
                ResponseClass::Gone
            }
            _ => ResponseClass::Normal,
        }
    }

    /// Check a response and hand back its body when it is safe to extract.
    ///
    /// Errors: [`AppError::TemporaryBan`], [`AppError::Abort`] (run-level),
    /// [`AppError::Gone`], [`AppError::Status`] (item-level).
    pub async fn inspect(&self, fetcher: &dyn Fetcher, response: FetchResponse) -> Result<String> {
        match self.classify(&response) {
            ResponseClass::Normal => Ok(response.body),
            ResponseClass::TemporaryBan => {
                let context = self.diagnostics(&response, None);
                log::error!("Temporary ban detected: {context:?}");
                Err(AppError::temporary_ban(
                    format!("temporary IP ban while requesting {}", response.url),
                    context,
                ))
            }
            ResponseClass::GeoBlocked => {
                let trace = self.trace(fetcher).await;
                let context = self.diagnostics(&response, trace.as_ref());
                log::warn!("Received 451 for {}: {context:?}", response.url);

                let location = trace
                    .as_ref()
                    .and_then(|t| t.get("loc"))
                    .map(|l| l.to_uppercase());
                match location {
                    Some(loc) if self.flagged_regions.contains(&loc) => {
                        log::warn!("Trace resolved to {loc}; aborting remaining requests");
                        Err(AppError::abort(
                            format!("geo-block from flagged location {loc}"),
                            context,
                        ))
                    }
                    _ => Err(AppError::Status {
                        status: response.status,
                        url: response.url,
                    }),
                }
            }
            ResponseClass::Gone => Err(AppError::Gone(format!(
                "{} returned {}",
                response.url, response.status
            ))),
            ResponseClass::HttpError => {
                log::error!("Request to {} failed with status {}", response.url, response.status);
                Err(AppError::Status {
                    status: response.status,
                    url: response.url,
                })
            }
        }
    }

    /// Fetch and parse the trace endpoint. Failures are logged, not raised.
    async fn trace(&self, fetcher: &dyn Fetcher) -> Option<BTreeMap<String, String>> {
        match fetcher.fetch(&self.trace_url).await {
            Ok(response) if response.is_success() => Some(parse_trace(&response.body)),
            Ok(response) => {
                log::warn!("Trace endpoint returned {}", response.status);
                None
            }
            Err(e) => {
                log::warn!("Trace lookup failed: {e}");
                None
            }
        }
    }

    fn diagnostics(
        &self,
        response: &FetchResponse,
        trace: Option<&BTreeMap<String, String>>,
    ) -> Context {
        let mut context = Context::new();
        context.insert("requestUrl".into(), response.url.clone());
        context.insert("status".into(), response.status.to_string());
        for name in DIAGNOSTIC_HEADERS {
            if let Some(value) = response.header(name) {
                context.insert(format!("header.{name}"), value.to_string());
            }
        }
        if let Some(trace) = trace {
            for (key, value) in trace {
                context.insert(format!("trace.{key}"), value.clone());
            }
        }
        context.insert(
            "body".into(),
            truncate_chars(&response.body, BODY_EXCERPT_CHARS),
        );
        context
    }
}

/// Parse `key=value` lines; malformed lines are ignored.
pub fn parse_trace(body: &str) -> BTreeMap<String, String> {
    body.lines()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::http::testing::ScriptedFetcher;

    const TRACE_URL: &str = "https://cloudflare.com/cdn-cgi/trace";
    const PAGE: &str = "https://e-hentai.org/g/1/ab/";

    fn guard() -> BlockGuard {
        BlockGuard::new(&SourceConfig::default())
    }

    fn response(status: u16, body: &str) -> FetchResponse {
        FetchResponse {
            url: PAGE.into(),
            status,
            body: body.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_ban_phrase_wins_over_status() {
        let banned = "This IP address has been temporarily banned due to an excessive request rate.";
        for status in [200, 403, 404, 451, 503] {
            assert_eq!(guard().classify(&response(status, banned)), ResponseClass::TemporaryBan);
        }
    }

    #[test]
    fn test_classification() {
        let g = guard();
        assert_eq!(g.classify(&response(200, "<html>ok</html>")), ResponseClass::Normal);
        assert_eq!(g.classify(&response(404, "")), ResponseClass::Gone);
        assert_eq!(g.classify(&response(410, "")), ResponseClass::Gone);
        assert_eq!(g.classify(&response(200, "Gallery not found.")), ResponseClass::Gone);
        assert_eq!(g.classify(&response(500, "")), ResponseClass::HttpError);
        assert_eq!(g.classify(&response(451, "")), ResponseClass::GeoBlocked);
    }

    #[tokio::test]
    async fn test_geo_block_from_flagged_region_aborts() {
        let fetcher = ScriptedFetcher::new();
        fetcher.respond(TRACE_URL, 200, "fl=1\nip=1.2.3.4\ncolo=LHR\nloc=GB\n");

        let err = guard()
            .inspect(&fetcher, response(451, "Unavailable For Legal Reasons"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Abort { .. }));
        let context = err.context().unwrap();
        assert_eq!(context["trace.loc"], "GB");
        assert_eq!(context["requestUrl"], PAGE);
    }

    #[tokio::test]
    async fn test_geo_block_elsewhere_does_not_abort() {
        let fetcher = ScriptedFetcher::new();
        fetcher.respond(TRACE_URL, 200, "colo=NRT\nloc=JP\n");

        let err = guard().inspect(&fetcher, response(451, "")).await.unwrap_err();
        assert!(matches!(err, AppError::Status { status: 451, .. }));
        assert!(!err.is_run_level());
    }

    #[tokio::test]
    async fn test_failed_trace_does_not_abort() {
        let fetcher = ScriptedFetcher::new();
        let err = guard().inspect(&fetcher, response(451, "")).await.unwrap_err();
        assert!(!err.is_run_level());
    }

    #[tokio::test]
    async fn test_ban_context_truncates_body() {
        let fetcher = ScriptedFetcher::new();
        let body = format!(
            "This IP address has been temporarily banned{}",
            "x".repeat(2000)
        );
        let err = guard().inspect(&fetcher, response(200, &body)).await.unwrap_err();
        assert!(matches!(err, AppError::TemporaryBan { .. }));
        let excerpt = &err.context().unwrap()["body"];
        assert_eq!(excerpt.chars().count(), BODY_EXCERPT_CHARS + 1);
        assert!(fetcher.requests().is_empty());
    }

    #[tokio::test]
    async fn test_normal_returns_body() {
        let fetcher = ScriptedFetcher::new();
        let body = guard().inspect(&fetcher, response(200, "<html/>")).await.unwrap();
        assert_eq!(body, "<html/>");
    }

    #[test]
    fn test_parse_trace_ignores_noise() {
        let trace = parse_trace("loc=GB\ngarbage\n=x\nwarp=off");
        assert_eq!(trace.len(), 2);
        assert_eq!(trace["loc"], "GB");
    }
}
