use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::program::{countdown_secs, PlaceholderCard, Program, ProgramType, Schedule};

/// Coarse playback phase as seen from outside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackPhase {
    /// Background + countdown visible, nothing on air.
    #[default]
    Idle,
    /// Media requested, awaiting readiness or timeout.
    Loading,
    /// Video or placeholder visibly active.
    Playing,
}

/// What is currently on air.
#[derive(Debug, Clone, Serialize)]
pub struct OnAirInfo {
    pub name: String,
    pub program_type: ProgramType,
    pub started_at: DateTime<Utc>,
}

/// One row of the upcoming-programs display.
#[derive(Debug, Clone, Serialize)]
pub struct UpcomingEntry {
    pub name: String,
    pub program_type: ProgramType,
    pub scheduled_time: DateTime<Utc>,
    pub duration_secs: Option<u32>,
    pub has_video: bool,
    pub starts_in_secs: i64,
}

/// Full observable state of the player.  `rev` is a monotonically increasing
/// counter incremented on every change so clients can detect missed updates.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlayerState {
    pub rev: u64,
    pub phase: PlaybackPhase,
    pub demo_mode: bool,
    pub account: Option<String>,
    pub clock_text: String,
    pub status_line: String,
    pub on_air: Option<OnAirInfo>,
    pub video_visible: bool,
    pub placeholder: Option<PlaceholderCard>,
    pub next_program_name: Option<String>,
    pub next_program_at: Option<DateTime<Utc>>,
    pub countdown_secs: i64,
    pub upcoming: Vec<UpcomingEntry>,
    pub ticker_text: String,
    pub news_items: Vec<String>,
    pub news_source_available: bool,
    pub schedule_len: usize,
    pub last_schedule_update: Option<DateTime<Utc>>,
}

/// Shared, revision-counted access to [`PlayerState`].
pub struct StateManager {
    state: Arc<RwLock<PlayerState>>,
}

impl StateManager {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(PlayerState {
                rev: 1,
                status_line: "Initialising".to_string(),
                ticker_text: "Signage player starting...".to_string(),
                ..PlayerState::default()
            })),
        }
    }

    pub fn arc(&self) -> Arc<RwLock<PlayerState>> {
        Arc::clone(&self.state)
    }

    pub async fn snapshot(&self) -> PlayerState {
        self.state.read().await.clone()
    }

    pub async fn set_account(&self, account: Option<String>, demo_mode: bool) {
        let mut state = self.state.write().await;
        state.account = account;
        state.demo_mode = demo_mode;
        state.rev += 1;
    }

    pub async fn set_status_line(&self, status: impl Into<String>) {
        let mut state = self.state.write().await;
        state.status_line = status.into();
        state.rev += 1;
    }

    /// Per-second refresh of clock and countdown.
    pub async fn set_tick(&self, clock_text: String, countdown: i64) {
        let mut state = self.state.write().await;
        state.clock_text = clock_text;
        state.countdown_secs = countdown;
        state.rev += 1;
    }

    pub async fn set_loading(&self, program: &Program, now: DateTime<Utc>) {
        let mut state = self.state.write().await;
        state.phase = PlaybackPhase::Loading;
        state.on_air = Some(OnAirInfo {
            name: program.name.clone(),
            program_type: program.program_type,
            started_at: now,
        });
        state.video_visible = false;
        state.placeholder = None;
        state.status_line = format!("On air: {}", program.name);
        state.rev += 1;
    }

    pub async fn set_playing(&self, program: &Program, now: DateTime<Utc>, placeholder: Option<PlaceholderCard>) {
        let mut state = self.state.write().await;
        state.phase = PlaybackPhase::Playing;
        if state.on_air.is_none() {
            state.on_air = Some(OnAirInfo {
                name: program.name.clone(),
                program_type: program.program_type,
                started_at: now,
            });
        }
        state.video_visible = placeholder.is_none();
        state.placeholder = placeholder;
        state.status_line = format!("On air: {}", program.name);
        state.rev += 1;
    }

    /// Placeholder swap mid-session (media error or load timeout).
    pub async fn set_placeholder(&self, placeholder: PlaceholderCard) {
        let mut state = self.state.write().await;
        state.phase = PlaybackPhase::Playing;
        state.video_visible = false;
        state.placeholder = Some(placeholder);
        state.rev += 1;
    }

    pub async fn set_idle(&self) {
        let mut state = self.state.write().await;
        state.phase = PlaybackPhase::Idle;
        state.on_air = None;
        state.video_visible = false;
        state.placeholder = None;
        state.status_line = "Ready for next broadcast".to_string();
        state.rev += 1;
    }

    /// Replaces the schedule-derived portion of the display.
    pub async fn set_schedule_display(
        &self,
        schedule: &Schedule,
        now: DateTime<Utc>,
        last_update: Option<DateTime<Utc>>,
    ) {
        let mut state = self.state.write().await;
        state.schedule_len = schedule.len();
        state.last_schedule_update = last_update;
        state.upcoming = schedule
            .upcoming(now, 8)
            .into_iter()
            .map(|p| UpcomingEntry {
                name: p.name.clone(),
                program_type: p.program_type,
                scheduled_time: p.scheduled_time,
                duration_secs: p.duration_secs,
                has_video: p.video_url.as_deref().is_some_and(|u| !u.trim().is_empty()),
                starts_in_secs: countdown_secs(p.scheduled_time, now),
            })
            .collect();
        let next = schedule.next_upcoming(now);
        state.next_program_name = next.map(|(_, p)| p.name.clone());
        state.next_program_at = next.map(|(_, p)| p.scheduled_time);
        state.rev += 1;
    }

    pub async fn set_ticker_text(&self, text: String) {
        let mut state = self.state.write().await;
        state.ticker_text = text;
        state.rev += 1;
    }

    pub async fn set_news(&self, items: Vec<String>, source_available: bool) {
        let mut state = self.state.write().await;
        state.news_items = items;
        state.news_source_available = source_available;
        state.rev += 1;
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}
