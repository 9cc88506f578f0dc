use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use tracing::{info, warn};

use signage_proto::config::RemoteConfig;
use signage_proto::news::{fallback_news, NewsRecord};

use crate::error::PlayerError;
use crate::repository::RecordList;
use crate::retry::{RetryDecision, RetryPolicy};

/// Result of a news refresh attempt.  Every variant carries ready-to-show
/// ticker strings; the feed never leaves the ticker empty.
#[derive(Debug)]
pub enum NewsOutcome {
    Fresh(Vec<String>),
    RetryAfter(std::time::Duration),
    Fallback(Vec<String>),
    /// The remote has no news table at all.  Not an error — the ticker runs
    /// on fallback content permanently.
    SourceMissing(Vec<String>),
}

/// Fetches news items and renders them into ticker strings.
pub struct NewsFeed {
    client: Client,
    remote: RemoteConfig,
    retry: RetryPolicy,
}

impl NewsFeed {
    pub fn new(client: Client, remote: RemoteConfig) -> Self {
        let retry = RetryPolicy::new(
            remote.max_retries,
            std::time::Duration::from_secs(remote.retry_delay_secs),
        );
        Self { client, remote, retry }
    }

    fn probe_url(&self) -> String {
        format!(
            "{}/{}newsitems?$top=1",
            self.remote.api_base, self.remote.table_prefix
        )
    }

    fn news_url(&self, now: DateTime<Utc>) -> String {
        let p = &self.remote.table_prefix;
        let now = now.to_rfc3339_opts(SecondsFormat::Secs, true);
        format!(
            "{}/{p}newsitems?$filter={p}isactive eq true and ({p}expirydate eq null or {p}expirydate gt {now})\
             &$orderby={p}publishdate desc,{p}priority desc\
             &$top={top}\
             &$select={p}headline,{p}name,{p}category,{p}source,{p}publishdate",
            self.remote.api_base,
            top = self.remote.news_page_size,
        )
    }

    /// Cheap existence check before the real query, so a missing table is
    /// distinguishable from a transient failure.
    async fn probe(&self, token: &str) -> Result<bool, PlayerError> {
        let response = self
            .client
            .get(self.probe_url())
            .bearer_auth(token)
            .send()
            .await?;
        match response.status() {
            reqwest::StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => Ok(true),
            s => Err(PlayerError::FetchFailed {
                status: s.as_u16(),
                message: response.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn fetch_once(&self, token: &str, now: DateTime<Utc>) -> Result<Vec<String>, PlayerError> {
        let response = self
            .client
            .get(self.news_url(now))
            .bearer_auth(token)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PlayerError::FetchFailed {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        let list: RecordList<NewsRecord> = serde_json::from_slice(&response.bytes().await?)?;
        Ok(list.value.iter().map(|r| r.render(now)).collect())
    }

    pub async fn load(&mut self, token: &str, now: DateTime<Utc>) -> NewsOutcome {
        if token.trim().is_empty() {
            return NewsOutcome::Fallback(fallback_news());
        }

        match self.probe(token).await {
            Ok(false) => {
                info!("news: remote table not found, using fallback content");
                return NewsOutcome::SourceMissing(fallback_news());
            }
            Ok(true) => {}
            Err(e) => {
                warn!("news: probe failed: {}", e);
                return match self.retry.note_failure() {
                    RetryDecision::RetryAfter(delay) => NewsOutcome::RetryAfter(delay),
                    RetryDecision::GiveUp => NewsOutcome::Fallback(fallback_news()),
                };
            }
        }

        match self.fetch_once(token, now).await {
            Ok(items) if items.is_empty() => {
                info!("news: no active items, using fallback content");
                self.retry.reset();
                NewsOutcome::Fallback(fallback_news())
            }
            Ok(items) => {
                info!("news: loaded {} items", items.len());
                self.retry.reset();
                NewsOutcome::Fresh(items)
            }
            Err(e) => {
                warn!("news: fetch failed: {}", e);
                match self.retry.note_failure() {
                    RetryDecision::RetryAfter(delay) => NewsOutcome::RetryAfter(delay),
                    RetryDecision::GiveUp => NewsOutcome::Fallback(fallback_news()),
                }
            }
        }
    }
}

/// Circular rotation over rendered ticker strings.
#[derive(Debug, Default)]
pub struct NewsTicker {
    items: Vec<String>,
    index: usize,
}

impl NewsTicker {
    /// Replaces the content and restarts rotation from the first item.
    pub fn set_items(&mut self, items: Vec<String>) {
        self.items = items;
        self.index = 0;
    }

    pub fn current(&self) -> Option<&str> {
        self.items.get(self.index).map(String::as_str)
    }

    /// Advances to the next item, wrapping around.  No-op when empty.
    pub fn rotate(&mut self) -> Option<&str> {
        if self.items.is_empty() {
            return None;
        }
        self.index = (self.index + 1) % self.items.len();
        self.current()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn ticker_rotates_and_wraps() {
        let mut t = NewsTicker::default();
        t.set_items(vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(t.current(), Some("a"));
        assert_eq!(t.rotate(), Some("b"));
        assert_eq!(t.rotate(), Some("c"));
        assert_eq!(t.rotate(), Some("a"));
    }

    #[test]
    fn empty_ticker_rotation_is_noop() {
        let mut t = NewsTicker::default();
        assert_eq!(t.rotate(), None);
        assert_eq!(t.current(), None);
    }

    #[test]
    fn replacing_items_restarts_rotation() {
        let mut t = NewsTicker::default();
        t.set_items(vec!["a".into(), "b".into()]);
        t.rotate();
        t.set_items(vec!["x".into(), "y".into()]);
        assert_eq!(t.current(), Some("x"));
    }

    #[test]
    fn news_query_applies_prefix_ordering_and_selection() {
        let remote = RemoteConfig {
            api_base: "https://org.example.com/api/data/v9.2".into(),
            table_prefix: "cr123_".into(),
            news_page_size: 20,
            ..RemoteConfig::default()
        };
        let feed = NewsFeed::new(Client::new(), remote);
        let url = feed.news_url(base());
        assert!(url.starts_with("https://org.example.com/api/data/v9.2/cr123_newsitems?"));
        assert!(url.contains("$filter=cr123_isactive eq true and (cr123_expirydate eq null or cr123_expirydate gt 2025-06-01T12:00:00Z)"));
        assert!(url.contains("$orderby=cr123_publishdate desc,cr123_priority desc"));
        assert!(url.contains("$top=20"));
        assert!(url.contains("$select=cr123_headline,cr123_name,cr123_category,cr123_source,cr123_publishdate"));
        assert_eq!(feed.probe_url(), "https://org.example.com/api/data/v9.2/cr123_newsitems?$top=1");
    }

    #[tokio::test]
    async fn missing_token_yields_fallback_content() {
        let mut feed = NewsFeed::new(Client::new(), RemoteConfig::default());
        match feed.load("  ", base()).await {
            NewsOutcome::Fallback(items) => assert!(!items.is_empty()),
            other => panic!("expected fallback, got {other:?}"),
        }
    }
}
