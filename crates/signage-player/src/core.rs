use chrono::{DateTime, Duration, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use signage_proto::config::Config;
use signage_proto::program::{countdown_secs, Schedule};
use signage_proto::state::StateManager;

use crate::auth::{AccessToken, TokenProvider};
use crate::clock::wall_clock_text;
use crate::engine::{PlaybackEngine, StartOutcome, Transition};
use crate::media::{MediaBackend, MediaSignal};
use crate::news::{NewsFeed, NewsOutcome, NewsTicker};
use crate::repository::{fallback_schedule, remote_client, LoadOutcome, ScheduleRepository};

/// External inputs to the player core.  Everything funnels through one
/// channel so the core processes strictly one thing at a time.
#[derive(Debug)]
pub enum PlayerEvent {
    /// Unsolicited signal from the media backend.
    Media(MediaSignal),
    /// A delayed schedule retry fell due.
    ScheduleRetry,
    /// A delayed news retry fell due.
    NewsRetry,
    /// External refresh request (HTTP API).
    Refresh,
}

/// Finds the newest due entry at or after `cursor`, skipping entries that
/// went stale while something else was playing.  Returns the advanced cursor
/// and the index to start, if any.
fn advance_due(schedule: &Schedule, mut cursor: usize, now: DateTime<Utc>) -> (usize, Option<usize>) {
    let mut due = None;
    while let Some(p) = schedule.get(cursor) {
        if p.scheduled_time <= now {
            due = Some(cursor);
            cursor += 1;
        } else {
            break;
        }
    }
    (cursor, due)
}

/// The player orchestrator.  Owns the schedule, the news ticker and the
/// playback engine; driven by the event channel plus a one-second tick.
pub struct PlayerCore<B: MediaBackend> {
    config: Config,
    state: StateManager,
    engine: PlaybackEngine<B>,
    repository: ScheduleRepository,
    news_feed: NewsFeed,
    ticker: NewsTicker,
    schedule: Schedule,
    /// Index of the next schedule entry that has not started yet.
    cursor: usize,
    token: Option<AccessToken>,
    demo_mode: bool,
    /// Cleared when the news table turns out not to exist; periodic news
    /// polling stops until an explicit refresh sets it again.
    news_available: bool,
    schedule_retry_pending: bool,
    news_retry_pending: bool,
    last_news_rotate: DateTime<Utc>,
    last_news_refresh: DateTime<Utc>,
    event_tx: mpsc::Sender<PlayerEvent>,
}

impl<B: MediaBackend> PlayerCore<B> {
    pub fn new(
        config: Config,
        backend: B,
        event_tx: mpsc::Sender<PlayerEvent>,
    ) -> anyhow::Result<Self> {
        let client = remote_client()?;
        let engine = PlaybackEngine::new(
            backend,
            config.playback.media_timeout_secs,
            config.playback.placeholder_duration_secs,
        );
        let repository = ScheduleRepository::new(
            client.clone(),
            config.remote.clone(),
            config.playback.fallback_program_count,
            config.playback.fallback_spacing_secs,
        );
        let news_feed = NewsFeed::new(client, config.remote.clone());
        let epoch = DateTime::<Utc>::MIN_UTC;
        Ok(Self {
            config,
            state: StateManager::new(),
            engine,
            repository,
            news_feed,
            ticker: NewsTicker::default(),
            schedule: Schedule::default(),
            cursor: 0,
            token: None,
            demo_mode: false,
            news_available: true,
            schedule_retry_pending: false,
            news_retry_pending: false,
            last_news_rotate: epoch,
            last_news_refresh: epoch,
            event_tx,
        })
    }

    pub fn state_manager(&self) -> &StateManager {
        &self.state
    }

    /// Acquires credentials and performs the initial data load.  A failed
    /// acquisition drops the player into demo mode: deterministic offline
    /// schedule and fallback news, no remote calls at all.
    pub async fn init<P: TokenProvider>(&mut self, provider: &P) {
        let now = Utc::now();
        match provider.acquire().await {
            Ok(token) => {
                info!("authenticated as {}", token.account);
                self.state.set_account(Some(token.account.clone()), false).await;
                self.token = Some(token);
                self.refresh_schedule(now).await;
                self.last_news_refresh = now;
                self.refresh_news(now).await;
            }
            Err(e) => {
                warn!("token acquisition failed, entering demo mode: {}", e);
                self.enter_demo_mode(now).await;
            }
        }
    }

    async fn enter_demo_mode(&mut self, now: DateTime<Utc>) {
        self.demo_mode = true;
        self.state.set_account(Some("Demo".to_string()), true).await;
        self.state.set_status_line("Demo mode: offline data").await;
        let schedule = fallback_schedule(
            now,
            self.config.playback.fallback_program_count,
            self.config.playback.fallback_spacing_secs,
        );
        self.install_schedule(schedule, now).await;
        let items = signage_proto::news::fallback_news();
        self.state.set_news(items.clone(), false).await;
        self.ticker.set_items(items);
        if let Some(text) = self.ticker.current() {
            self.state.set_ticker_text(text.to_string()).await;
        }
    }

    /// Event loop.  Runs until the process is stopped.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<PlayerEvent>) -> anyhow::Result<()> {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                Some(event) = event_rx.recv() => {
                    self.handle_event(event).await;
                }
                _ = interval.tick() => {
                    self.on_tick(Utc::now()).await;
                }
            }
        }
    }

    async fn handle_event(&mut self, event: PlayerEvent) {
        let now = Utc::now();
        match event {
            PlayerEvent::Media(signal) => {
                let transition = self.engine.on_media(signal, now);
                self.apply_transition(transition, now).await;
            }
            PlayerEvent::ScheduleRetry => {
                self.schedule_retry_pending = false;
                if !self.demo_mode {
                    self.refresh_schedule(now).await;
                }
            }
            PlayerEvent::NewsRetry => {
                self.news_retry_pending = false;
                if !self.demo_mode {
                    self.refresh_news(now).await;
                }
            }
            PlayerEvent::Refresh => {
                if self.engine.is_playing() {
                    debug!("refresh request ignored while a program is on air");
                } else if !self.demo_mode {
                    info!("manual refresh requested");
                    // An explicit refresh re-probes a news source that was
                    // previously found missing.
                    self.news_available = true;
                    self.refresh_schedule(now).await;
                    self.refresh_news(now).await;
                }
            }
        }
    }

    /// One-second heartbeat: clock, deadlines, due-program check, ticker
    /// rotation and staleness-driven refresh.
    async fn on_tick(&mut self, now: DateTime<Utc>) {
        let countdown = self
            .schedule
            .get(self.cursor)
            .map(|p| countdown_secs(p.scheduled_time, now))
            .unwrap_or(0);
        self.state.set_tick(wall_clock_text(now), countdown).await;

        let transition = self.engine.tick(now);
        self.apply_transition(transition, now).await;

        if !self.engine.is_playing() {
            let (cursor, due) = advance_due(&self.schedule, self.cursor, now);
            self.cursor = cursor;
            if let Some(idx) = due {
                self.start_program(idx, now).await;
            }
        }

        if !self.engine.is_playing()
            && !self.demo_mode
            && !self.schedule_retry_pending
            && self
                .repository
                .is_stale(now, self.config.playback.schedule_stale_secs)
        {
            info!("schedule is stale, refreshing");
            self.refresh_schedule(now).await;
        }

        if now - self.last_news_rotate
            >= Duration::seconds(self.config.news.rotate_interval_secs as i64)
        {
            self.last_news_rotate = now;
            if let Some(text) = self.ticker.rotate() {
                let text = text.to_string();
                self.state.set_ticker_text(text).await;
            }
        }

        if !self.engine.is_playing()
            && !self.demo_mode
            && self.news_available
            && !self.news_retry_pending
            && now - self.last_news_refresh
                >= Duration::seconds(self.config.news.refresh_interval_secs as i64)
        {
            self.last_news_refresh = now;
            self.refresh_news(now).await;
        }
    }

    async fn start_program(&mut self, idx: usize, now: DateTime<Utc>) {
        let Some(program) = self.schedule.get(idx).cloned() else {
            return;
        };
        match self.engine.try_start(&program, now) {
            StartOutcome::LoadingMedia => {
                self.state.set_loading(&program, now).await;
            }
            StartOutcome::PlayingPlaceholder(card) => {
                self.state.set_playing(&program, now, Some(card)).await;
            }
            StartOutcome::AlreadyPlaying => {
                debug!("start of '{}' skipped, already on air", program.name);
            }
        }
        self.state
            .set_schedule_display(&self.schedule, now, self.repository.last_update())
            .await;
    }

    async fn apply_transition(&mut self, transition: Option<Transition>, now: DateTime<Utc>) {
        match transition {
            Some(Transition::NowPlaying) => {
                if let Some(program) = self.engine.current_program().cloned() {
                    self.state.set_playing(&program, now, None).await;
                }
            }
            Some(Transition::PlaceholderFallback(card)) => {
                self.state.set_placeholder(card).await;
            }
            Some(Transition::Ended(ended)) => {
                info!("'{}' finished ({:?})", ended.program.name, ended.reason);
                self.state.set_idle().await;
                self.state
                    .set_schedule_display(&self.schedule, now, self.repository.last_update())
                    .await;
            }
            None => {}
        }
    }

    async fn install_schedule(&mut self, schedule: Schedule, now: DateTime<Utc>) {
        // Entries already in the past never start; the cursor lands on the
        // first strictly-future entry.
        self.cursor = schedule
            .programs()
            .iter()
            .position(|p| p.scheduled_time > now)
            .unwrap_or(schedule.len());
        self.schedule = schedule;
        self.state
            .set_schedule_display(&self.schedule, now, self.repository.last_update())
            .await;
    }

    async fn refresh_schedule(&mut self, now: DateTime<Utc>) {
        let token = self
            .token
            .as_ref()
            .map(|t| t.token.clone())
            .unwrap_or_default();
        match self.repository.load(&token, now).await {
            Ok(LoadOutcome::Fresh(schedule)) => {
                self.state
                    .set_status_line(format!("Schedule: {} programs", schedule.len()))
                    .await;
                self.install_schedule(schedule, now).await;
            }
            Ok(LoadOutcome::RetryAfter(delay)) => {
                self.schedule_retry_pending = true;
                self.state.set_status_line("Schedule: retrying...").await;
                self.send_after(delay, PlayerEvent::ScheduleRetry);
            }
            Ok(LoadOutcome::Fallback(schedule, warning)) => {
                self.state
                    .set_status_line(format!("Schedule: offline data ({warning})"))
                    .await;
                self.install_schedule(schedule, now).await;
            }
            Err(e) => {
                warn!("schedule refresh not possible: {}", e);
                self.enter_demo_mode(now).await;
            }
        }
    }

    async fn refresh_news(&mut self, now: DateTime<Utc>) {
        let token = self
            .token
            .as_ref()
            .map(|t| t.token.clone())
            .unwrap_or_default();
        let outcome = self.news_feed.load(&token, now).await;
        self.apply_news_outcome(outcome).await;
    }

    async fn apply_news_outcome(&mut self, outcome: NewsOutcome) {
        match outcome {
            NewsOutcome::Fresh(items) => {
                self.news_available = true;
                self.state.set_news(items.clone(), true).await;
                self.ticker.set_items(items);
            }
            NewsOutcome::SourceMissing(items) => {
                self.news_available = false;
                self.state.set_news(items.clone(), false).await;
                self.ticker.set_items(items);
            }
            NewsOutcome::Fallback(items) => {
                self.state.set_news(items.clone(), self.news_available).await;
                self.ticker.set_items(items);
            }
            NewsOutcome::RetryAfter(delay) => {
                self.news_retry_pending = true;
                self.send_after(delay, PlayerEvent::NewsRetry);
                return;
            }
        }
        if let Some(text) = self.ticker.current() {
            let text = text.to_string();
            self.state.set_ticker_text(text).await;
        }
    }

    fn send_after(&self, delay: std::time::Duration, event: PlayerEvent) {
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(event).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use signage_proto::news::fallback_news;
    use signage_proto::program::{Program, ProgramType};
    use signage_proto::state::PlaybackPhase;

    use crate::error::PlayerError;

    #[derive(Default)]
    struct NullBackend;
    impl MediaBackend for NullBackend {
        fn load(&mut self, _url: &str) {}
        fn play(&mut self) {}
        fn pause(&mut self) {}
        fn rewind(&mut self) {}
        fn set_looping(&mut self, _looping: bool) {}
        fn detach(&mut self) {}
    }

    struct NoTokens;
    impl TokenProvider for NoTokens {
        async fn acquire(&self) -> Result<AccessToken, PlayerError> {
            Err(PlayerError::AuthRequired)
        }
    }

    fn test_core() -> PlayerCore<NullBackend> {
        let (tx, _rx) = mpsc::channel(8);
        PlayerCore::new(Config::default(), NullBackend, tx).unwrap()
    }

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn prog(id: &str, offset_secs: i64) -> Program {
        Program {
            id: id.to_string(),
            name: id.to_string(),
            program_type: ProgramType::News,
            scheduled_time: base() + Duration::seconds(offset_secs),
            duration_secs: Some(10),
            video_url: None,
            description: None,
            priority: 0,
            is_active: true,
        }
    }

    #[test]
    fn advance_due_picks_newest_due_entry() {
        let s = Schedule::new(vec![prog("a", 10), prog("b", 20), prog("c", 40)]);
        // Nothing due yet.
        assert_eq!(advance_due(&s, 0, base()), (0, None));
        // One due.
        assert_eq!(advance_due(&s, 0, base() + Duration::seconds(10)), (1, Some(0)));
        // Two went due while something was playing: the stale one is skipped.
        assert_eq!(advance_due(&s, 0, base() + Duration::seconds(25)), (2, Some(1)));
        // Cursor past the end.
        assert_eq!(advance_due(&s, 3, base() + Duration::seconds(100)), (3, None));
    }

    #[test]
    fn advance_due_boundary_is_inclusive() {
        let s = Schedule::new(vec![prog("a", 10)]);
        assert_eq!(advance_due(&s, 0, base() + Duration::seconds(9)), (0, None));
        assert_eq!(advance_due(&s, 0, base() + Duration::seconds(10)), (1, Some(0)));
    }

    /// Two adjacent programs under a simulated one-second tick: the second
    /// must not preempt the first even once it is due, and each program
    /// starts and ends exactly once.
    #[test]
    fn back_to_back_programs_never_overlap() {
        let mut a = prog("a", 5);
        a.duration_secs = Some(5);
        let mut b = prog("b", 10);
        b.duration_secs = Some(5);
        let schedule = Schedule::new(vec![a, b]);

        let mut engine = PlaybackEngine::new(NullBackend, 15, 30);
        let mut cursor = 0usize;
        let mut starts = Vec::new();
        let mut ends = Vec::new();

        for sec in 0..=20i64 {
            let now = base() + Duration::seconds(sec);
            if let Some(Transition::Ended(e)) = engine.tick(now) {
                ends.push((e.program.id.clone(), sec));
            }
            if !engine.is_playing() {
                let (next, due) = advance_due(&schedule, cursor, now);
                cursor = next;
                if let Some(idx) = due {
                    let p = schedule.get(idx).cloned().unwrap();
                    match engine.try_start(&p, now) {
                        StartOutcome::AlreadyPlaying => panic!("start while on air"),
                        _ => starts.push((p.id, sec)),
                    }
                }
            }
        }

        assert_eq!(starts, vec![("a".to_string(), 5), ("b".to_string(), 10)]);
        assert_eq!(ends, vec![("a".to_string(), 10), ("b".to_string(), 15)]);
    }

    #[tokio::test]
    async fn refresh_request_is_ignored_while_on_air() {
        let mut core = test_core();
        let mut p = prog("live", 0);
        p.duration_secs = Some(600);
        core.engine.try_start(&p, Utc::now());
        assert!(core.engine.is_playing());

        core.handle_event(PlayerEvent::Refresh).await;

        // A real refresh with no token would have demoted to demo mode and
        // touched the repository; neither happened.
        assert!(!core.demo_mode);
        assert!(core.repository.last_update().is_none());
    }

    #[tokio::test]
    async fn missing_news_source_stops_periodic_polling() {
        let mut core = test_core();
        let now = Utc::now();
        core.repository.mark_fresh(now);

        core.apply_news_outcome(NewsOutcome::SourceMissing(fallback_news())).await;
        assert!(!core.news_available);
        assert!(!core.state.snapshot().await.news_source_available);
        assert!(!core.ticker.is_empty());

        // The refresh interval has long passed, but polling stays off.
        core.on_tick(now).await;
        assert_eq!(core.last_news_refresh, DateTime::<Utc>::MIN_UTC);
    }

    #[tokio::test]
    async fn explicit_refresh_reprobes_a_missing_news_source() {
        let mut core = test_core();
        core.apply_news_outcome(NewsOutcome::SourceMissing(fallback_news())).await;
        assert!(!core.news_available);

        core.handle_event(PlayerEvent::Refresh).await;
        assert!(core.news_available);
    }

    #[tokio::test]
    async fn failed_token_acquisition_demotes_to_demo_mode() {
        let mut core = test_core();
        core.init(&NoTokens).await;

        assert!(core.demo_mode);
        assert_eq!(
            core.schedule.len(),
            Config::default().playback.fallback_program_count as usize
        );
        assert!(!core.ticker.is_empty());

        let snap = core.state.snapshot().await;
        assert!(snap.demo_mode);
        assert_eq!(snap.account.as_deref(), Some("Demo"));
        assert!(!snap.news_source_available);
    }

    #[tokio::test]
    async fn media_ready_event_puts_video_on_air() {
        let mut core = test_core();
        let now = Utc::now();
        let mut p = prog("film", 0);
        p.duration_secs = None;
        p.video_url = Some("https://cdn.example.com/a.mp4".into());
        core.schedule = Schedule::new(vec![p]);

        core.start_program(0, now).await;
        assert_eq!(core.state.snapshot().await.phase, PlaybackPhase::Loading);

        core.handle_event(PlayerEvent::Media(MediaSignal::Ready)).await;
        let snap = core.state.snapshot().await;
        assert_eq!(snap.phase, PlaybackPhase::Playing);
        assert!(snap.video_visible);
        assert_eq!(snap.on_air.as_ref().unwrap().name, "film");
    }
}
