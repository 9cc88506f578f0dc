use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

use signage_proto::config::RemoteConfig;
use signage_proto::program::{Program, ProgramType, Schedule};

use crate::error::PlayerError;
use crate::retry::{RetryDecision, RetryPolicy};

/// Result of a schedule refresh attempt.
#[derive(Debug)]
pub enum LoadOutcome {
    Fresh(Schedule),
    /// Transient failure; the caller should try again after the delay.
    RetryAfter(std::time::Duration),
    /// Attempt budget spent; a deterministic fallback schedule is on offer,
    /// with a warning describing what actually failed.
    Fallback(Schedule, String),
}

/// Generic OData-style list envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct RecordList<T> {
    pub value: Vec<T>,
}

/// Builds the HTTP client shared by the remote fetch paths.
pub(crate) fn remote_client() -> reqwest::Result<Client> {
    Client::builder()
        .default_headers({
            let mut h = reqwest::header::HeaderMap::new();
            h.insert(
                reqwest::header::ACCEPT,
                reqwest::header::HeaderValue::from_static("application/json"),
            );
            h.insert(
                "OData-MaxVersion",
                reqwest::header::HeaderValue::from_static("4.0"),
            );
            h.insert(
                "OData-Version",
                reqwest::header::HeaderValue::from_static("4.0"),
            );
            h
        })
        .build()
}

/// Fetches and caches the broadcast schedule.  One instance lives in the
/// player core; all access is from the single event loop task.
pub struct ScheduleRepository {
    client: Client,
    remote: RemoteConfig,
    retry: RetryPolicy,
    fallback_count: u32,
    fallback_spacing_secs: u32,
    last_update: Option<DateTime<Utc>>,
}

impl ScheduleRepository {
    pub fn new(client: Client, remote: RemoteConfig, fallback_count: u32, fallback_spacing_secs: u32) -> Self {
        let retry = RetryPolicy::new(
            remote.max_retries,
            std::time::Duration::from_secs(remote.retry_delay_secs),
        );
        Self {
            client,
            remote,
            retry,
            fallback_count,
            fallback_spacing_secs,
            last_update: None,
        }
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    #[cfg(test)]
    pub(crate) fn mark_fresh(&mut self, now: DateTime<Utc>) {
        self.last_update = Some(now);
    }

    /// Age of the cached schedule; `true` when it is due for a refresh.
    pub fn is_stale(&self, now: DateTime<Utc>, max_age_secs: u64) -> bool {
        match self.last_update {
            Some(at) => now - at >= Duration::seconds(max_age_secs as i64),
            None => true,
        }
    }

    fn schedule_url(&self) -> String {
        let p = &self.remote.table_prefix;
        format!(
            "{}/{}broadcastschedules?$filter={}isactive eq true&$orderby={}scheduledtime asc&$top={}",
            self.remote.api_base, p, p, p, self.remote.schedule_page_size
        )
    }

    async fn fetch_once(&self, token: &str) -> Result<Schedule, PlayerError> {
        let response = self
            .client
            .get(self.schedule_url())
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(PlayerError::AuthFailed(format!("schedule fetch got {status}")));
        }
        if !status.is_success() {
            return Err(PlayerError::FetchFailed {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let list: RecordList<Program> = serde_json::from_slice(&response.bytes().await?)?;
        let schedule = Schedule::new(list.value);
        if schedule.is_empty() {
            return Err(PlayerError::ScheduleEmpty);
        }
        Ok(schedule)
    }

    /// One refresh attempt.  Transient failures burn one retry; when the
    /// budget runs out the fallback schedule takes over.  A missing token is
    /// not retryable.
    pub async fn load(&mut self, token: &str, now: DateTime<Utc>) -> Result<LoadOutcome, PlayerError> {
        if token.trim().is_empty() {
            return Err(PlayerError::AuthRequired);
        }

        Ok(match self.fetch_once(token).await {
            Ok(schedule) => {
                info!("schedule: loaded {} active programs", schedule.len());
                self.retry.reset();
                self.last_update = Some(now);
                LoadOutcome::Fresh(schedule)
            }
            Err(e) => {
                warn!("schedule: fetch failed: {}", e);
                match self.retry.note_failure() {
                    RetryDecision::RetryAfter(delay) => LoadOutcome::RetryAfter(delay),
                    RetryDecision::GiveUp => {
                        warn!("schedule: retries exhausted, using fallback data");
                        self.last_update = Some(now);
                        LoadOutcome::Fallback(self.fallback(now), e.to_string())
                    }
                }
            }
        })
    }

    fn fallback(&self, now: DateTime<Utc>) -> Schedule {
        fallback_schedule(now, self.fallback_count, self.fallback_spacing_secs)
    }
}

/// Deterministic offline schedule: `count` programs cycling through every
/// program type, spaced `spacing_secs` apart starting at `now`.  No video
/// URLs, so every entry renders as a placeholder.
pub fn fallback_schedule(now: DateTime<Utc>, count: u32, spacing_secs: u32) -> Schedule {
    let programs = (0..count)
        .map(|i| {
            let ty = ProgramType::ALL[(i as usize) % ProgramType::ALL.len()];
            Program {
                id: format!("fallback-{i}"),
                name: format!("{} #{}", ty.label(), i / ProgramType::ALL.len() as u32 + 1),
                program_type: ty,
                scheduled_time: now + Duration::seconds(i64::from(i * spacing_secs)),
                duration_secs: Some(15 + (i % 3) * 5),
                video_url: None,
                description: Some(format!("Offline {} segment", ty.label().to_lowercase())),
                priority: i as i32,
                is_active: true,
            }
        })
        .collect();
    Schedule::new(programs)
}
