use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use signage_proto::program::{PlaceholderCard, Program};
use signage_proto::state::PlaybackPhase;

use crate::error::PlayerError;
use crate::media::{is_valid_video_url, MediaBackend, MediaSignal};

/// Why a session ended.  Exactly one of these fires per session; ending
/// disarms every other trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The program's explicit duration timer elapsed.
    DurationElapsed,
    /// The media signalled natural completion (no duration was set).
    NaturalEnd,
    /// A degraded placeholder session (no duration, media lost) ran out.
    PlaceholderElapsed,
}

/// Result of offering the due program to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    /// Media requested; awaiting readiness or the load timeout.
    LoadingMedia,
    /// On air immediately with a generated placeholder.
    PlayingPlaceholder(PlaceholderCard),
    /// Re-entrancy guard: a session is already active, the call is a no-op.
    AlreadyPlaying,
}

/// Observable session change produced by a tick or a media signal.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Media became ready and is now playing.
    NowPlaying,
    /// Media abandoned (error or load timeout); placeholder is on air.
    PlaceholderFallback(PlaceholderCard),
    Ended(EndedSession),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EndedSession {
    pub program: Program,
    pub started_at: DateTime<Utc>,
    pub reason: EndReason,
    pub ended_naturally: bool,
}

/// Runtime record of one program's active playback.  At most one exists at
/// any instant; it is fully torn down before the next may be created.
#[derive(Debug)]
struct PlaybackSession {
    program: Program,
    started_at: DateTime<Utc>,
    ended_naturally: bool,
    media_attached: bool,
    /// Set when the media was given up on (timeout or error).  A late
    /// `Ready` from an abandoned load must not resurrect it.
    media_abandoned: bool,
    load_deadline: Option<DateTime<Utc>>,
    end_deadline: Option<DateTime<Utc>>,
}

/// The playback state machine.  All methods take an explicit `now` so the
/// whole machine is deterministic under test; the orchestrator's one-second
/// tick and event handlers drive it with wall-clock time.
pub struct PlaybackEngine<B: MediaBackend> {
    backend: B,
    media_timeout: Duration,
    placeholder_duration: Duration,
    session: Option<PlaybackSession>,
}

impl<B: MediaBackend> PlaybackEngine<B> {
    pub fn new(backend: B, media_timeout_secs: u64, placeholder_duration_secs: u32) -> Self {
        Self {
            backend,
            media_timeout: Duration::seconds(media_timeout_secs as i64),
            placeholder_duration: Duration::seconds(i64::from(placeholder_duration_secs)),
            session: None,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.session.is_some()
    }

    pub fn phase(&self) -> PlaybackPhase {
        match &self.session {
            None => PlaybackPhase::Idle,
            Some(s) if s.load_deadline.is_some() => PlaybackPhase::Loading,
            Some(_) => PlaybackPhase::Playing,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn current_program(&self) -> Option<&Program> {
        self.session.as_ref().map(|s| &s.program)
    }

    /// Starts a session for `program`.  No-op while another session is
    /// active — the schedule tick may fire while we are mid-playback and
    /// must never preempt.
    pub fn try_start(&mut self, program: &Program, now: DateTime<Utc>) -> StartOutcome {
        if self.session.is_some() {
            return StartOutcome::AlreadyPlaying;
        }

        info!("engine: starting program '{}'", program.name);
        let mut session = PlaybackSession {
            program: program.clone(),
            started_at: now,
            ended_naturally: false,
            media_attached: false,
            media_abandoned: false,
            load_deadline: None,
            end_deadline: program.duration().map(|d| now + d),
        };

        let url = program
            .video_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty());

        let outcome = match url {
            Some(u) if is_valid_video_url(u) => {
                // Scrub any cached state before attaching: position zero,
                // loop off, stale source gone.
                self.backend.pause();
                self.backend.rewind();
                self.backend.set_looping(false);
                self.backend.detach();
                self.backend.load(u);
                session.media_attached = true;
                session.load_deadline = Some(now + self.media_timeout);
                StartOutcome::LoadingMedia
            }
            other => {
                if let Some(u) = other {
                    info!(
                        "engine: '{}' gets a placeholder: {}",
                        program.name,
                        PlayerError::InvalidMediaUrl(u.to_string())
                    );
                }
                let card = program.program_type.placeholder();
                if session.end_deadline.is_none() {
                    // Placeholder-only session with no duration: arm a
                    // default run length so the loop always moves on.
                    session.end_deadline = Some(now + self.placeholder_duration);
                }
                StartOutcome::PlayingPlaceholder(card)
            }
        };

        self.session = Some(session);
        outcome
    }

    /// Handles an unsolicited backend signal.  Signals that arrive after a
    /// session ended, or for an abandoned load, are dropped.
    pub fn on_media(&mut self, signal: MediaSignal, now: DateTime<Utc>) -> Option<Transition> {
        let session = self.session.as_mut()?;
        if !session.media_attached || session.media_abandoned {
            debug!("engine: ignoring stale media signal {:?}", signal);
            return None;
        }

        match signal {
            MediaSignal::Ready => {
                if session.load_deadline.is_none() {
                    // Already playing; a second readiness event means nothing.
                    return None;
                }
                session.load_deadline = None;
                self.backend.rewind();
                self.backend.set_looping(false);
                self.backend.play();
                Some(Transition::NowPlaying)
            }
            MediaSignal::Ended => {
                session.ended_naturally = true;
                if session.program.duration_secs.is_some() {
                    // Duration is authoritative.  Park the media at zero and
                    // wait for the timer; never restart playback.
                    self.backend.pause();
                    self.backend.rewind();
                    None
                } else {
                    self.end_session(EndReason::NaturalEnd).map(Transition::Ended)
                }
            }
            MediaSignal::Error(msg) => {
                warn!(
                    "engine: degrading to placeholder: {}",
                    PlayerError::Media(msg)
                );
                self.abandon_media(now).map(Transition::PlaceholderFallback)
            }
        }
    }

    /// Per-second deadline check.  The end deadline wins when both are due.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<Transition> {
        let (end_due, load_due, timed) = match &self.session {
            Some(s) => (
                s.end_deadline.is_some_and(|d| now >= d),
                s.load_deadline.is_some_and(|d| now >= d),
                s.program.duration_secs.is_some(),
            ),
            None => return None,
        };

        if end_due {
            let reason = if timed {
                EndReason::DurationElapsed
            } else {
                EndReason::PlaceholderElapsed
            };
            return self.end_session(reason).map(Transition::Ended);
        }

        if load_due {
            warn!(
                "engine: falling back to placeholder: {}",
                PlayerError::MediaLoadTimeout
            );
            return self.abandon_media(now).map(Transition::PlaceholderFallback);
        }

        None
    }

    /// Gives up on the attached media and puts the placeholder on air.
    /// Arms the default placeholder run length when no duration exists,
    /// since the media can no longer deliver a natural end.
    fn abandon_media(&mut self, now: DateTime<Utc>) -> Option<PlaceholderCard> {
        let session = self.session.as_mut()?;
        session.media_abandoned = true;
        session.load_deadline = None;
        if session.end_deadline.is_none() {
            session.end_deadline = Some(now + self.placeholder_duration);
        }
        let card = session.program.program_type.placeholder();
        self.backend.pause();
        self.backend.rewind();
        self.backend.set_looping(false);
        self.backend.detach();
        Some(card)
    }

    /// Tears the session down completely: timers cleared, media released at
    /// position zero with looping off.  Once this runs, every other end
    /// trigger finds no session and becomes a no-op.
    fn end_session(&mut self, reason: EndReason) -> Option<EndedSession> {
        let session = self.session.take()?;
        info!("engine: ending program '{}' ({:?})", session.program.name, reason);
        self.backend.pause();
        self.backend.rewind();
        self.backend.set_looping(false);
        self.backend.detach();
        Some(EndedSession {
            ended_naturally: session.ended_naturally || reason == EndReason::NaturalEnd,
            program: session.program,
            started_at: session.started_at,
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use signage_proto::program::ProgramType;

    #[derive(Debug, Default)]
    struct FakeBackend {
        calls: Vec<String>,
        loaded: Option<String>,
    }

    impl MediaBackend for FakeBackend {
        fn load(&mut self, url: &str) {
            self.calls.push(format!("load {url}"));
            self.loaded = Some(url.to_string());
        }
        fn play(&mut self) {
            self.calls.push("play".into());
        }
        fn pause(&mut self) {
            self.calls.push("pause".into());
        }
        fn rewind(&mut self) {
            self.calls.push("rewind".into());
        }
        fn set_looping(&mut self, looping: bool) {
            self.calls.push(format!("loop {looping}"));
        }
        fn detach(&mut self) {
            self.calls.push("detach".into());
            self.loaded = None;
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn program(duration: Option<u32>, video: Option<&str>) -> Program {
        Program {
            id: "p1".into(),
            name: "Evening news".into(),
            program_type: ProgramType::News,
            scheduled_time: t0(),
            duration_secs: duration,
            video_url: video.map(str::to_string),
            description: None,
            priority: 0,
            is_active: true,
        }
    }

    fn engine() -> PlaybackEngine<FakeBackend> {
        PlaybackEngine::new(FakeBackend::default(), 15, 30)
    }

    fn secs(n: i64) -> Duration {
        Duration::seconds(n)
    }

    #[test]
    fn start_is_noop_while_session_active() {
        let mut e = engine();
        assert_eq!(e.try_start(&program(Some(10), None), t0()), StartOutcome::PlayingPlaceholder(ProgramType::News.placeholder()));
        assert!(e.is_playing());
        assert_eq!(e.try_start(&program(Some(10), None), t0() + secs(2)), StartOutcome::AlreadyPlaying);
    }

    #[test]
    fn duration_timer_ends_placeholder_session_exactly_once() {
        let mut e = engine();
        e.try_start(&program(Some(10), None), t0());
        assert_eq!(e.tick(t0() + secs(9)), None);
        match e.tick(t0() + secs(10)) {
            Some(Transition::Ended(ended)) => {
                assert_eq!(ended.reason, EndReason::DurationElapsed);
                assert!(!ended.ended_naturally);
            }
            other => panic!("expected end transition, got {other:?}"),
        }
        assert_eq!(e.phase(), PlaybackPhase::Idle);
        // Already ended — nothing else may fire.
        assert_eq!(e.tick(t0() + secs(11)), None);
    }

    #[test]
    fn natural_end_mode_only_ends_on_ended_signal() {
        let mut e = engine();
        let p = program(None, Some("https://cdn.example.com/a.mp4"));
        assert_eq!(e.try_start(&p, t0()), StartOutcome::LoadingMedia);
        assert_eq!(e.phase(), PlaybackPhase::Loading);

        assert_eq!(e.on_media(MediaSignal::Ready, t0() + secs(2)), Some(Transition::NowPlaying));
        assert_eq!(e.phase(), PlaybackPhase::Playing);

        // No timer may end this session.
        assert_eq!(e.tick(t0() + secs(60)), None);
        assert_eq!(e.tick(t0() + secs(3600)), None);

        match e.on_media(MediaSignal::Ended, t0() + secs(90)) {
            Some(Transition::Ended(ended)) => {
                assert_eq!(ended.reason, EndReason::NaturalEnd);
                assert!(ended.ended_naturally);
            }
            other => panic!("expected natural end, got {other:?}"),
        }
    }

    #[test]
    fn load_timeout_falls_back_and_late_ready_is_ignored() {
        let mut e = engine();
        let p = program(Some(20), Some("https://cdn.example.com/a.mp4"));
        e.try_start(&p, t0());

        assert_eq!(e.tick(t0() + secs(14)), None);
        match e.tick(t0() + secs(15)) {
            Some(Transition::PlaceholderFallback(card)) => {
                assert_eq!(card, ProgramType::News.placeholder());
            }
            other => panic!("expected placeholder fallback, got {other:?}"),
        }
        assert_eq!(e.phase(), PlaybackPhase::Playing);
        assert_eq!(e.backend().loaded, None);

        // The abandoned load coming good later must not resurrect it.
        assert_eq!(e.on_media(MediaSignal::Ready, t0() + secs(16)), None);
        assert!(!e.backend().calls.contains(&"play".to_string()));

        // The duration timer still ends the session.
        assert!(matches!(e.tick(t0() + secs(20)), Some(Transition::Ended(_))));
    }

    #[test]
    fn media_error_degrades_to_placeholder_immediately() {
        let mut e = engine();
        let p = program(Some(20), Some("https://cdn.example.com/a.mp4"));
        e.try_start(&p, t0());
        assert!(matches!(
            e.on_media(MediaSignal::Error("decode failed".into()), t0() + secs(1)),
            Some(Transition::PlaceholderFallback(_))
        ));
        // Error disarmed the load timeout.
        assert_eq!(e.tick(t0() + secs(15)), None);
        assert!(matches!(e.tick(t0() + secs(20)), Some(Transition::Ended(_))));
    }

    #[test]
    fn ended_signal_does_not_cut_timed_session_short() {
        let mut e = engine();
        let p = program(Some(30), Some("https://cdn.example.com/a.mp4"));
        e.try_start(&p, t0());
        e.on_media(MediaSignal::Ready, t0() + secs(1));

        // Video finishes early; session holds until the duration timer.
        assert_eq!(e.on_media(MediaSignal::Ended, t0() + secs(10)), None);
        assert!(e.is_playing());

        match e.tick(t0() + secs(30)) {
            Some(Transition::Ended(ended)) => {
                assert_eq!(ended.reason, EndReason::DurationElapsed);
                // The early finish is still recorded.
                assert!(ended.ended_naturally);
            }
            other => panic!("expected timed end, got {other:?}"),
        }
    }

    #[test]
    fn teardown_leaves_backend_rewound_detached_and_non_looping() {
        let mut e = engine();
        let p = program(None, Some("https://cdn.example.com/a.mp4"));
        e.try_start(&p, t0());
        e.on_media(MediaSignal::Ready, t0() + secs(1));
        e.on_media(MediaSignal::Ended, t0() + secs(5));

        let calls = &e.backend().calls;
        let tail: Vec<_> = calls.iter().rev().take(4).rev().cloned().collect();
        assert_eq!(tail, vec!["pause", "rewind", "loop false", "detach"]);
        assert_eq!(e.backend().loaded, None);

        // Stale signals after teardown are dropped.
        assert_eq!(e.on_media(MediaSignal::Ended, t0() + secs(6)), None);
        assert_eq!(e.on_media(MediaSignal::Ready, t0() + secs(6)), None);
    }

    #[test]
    fn lost_media_without_duration_arms_placeholder_run_length() {
        let mut e = engine();
        let p = program(None, Some("https://cdn.example.com/a.mp4"));
        e.try_start(&p, t0());
        assert!(matches!(
            e.on_media(MediaSignal::Error("404".into()), t0() + secs(2)),
            Some(Transition::PlaceholderFallback(_))
        ));

        assert_eq!(e.tick(t0() + secs(31)), None);
        match e.tick(t0() + secs(32)) {
            Some(Transition::Ended(ended)) => assert_eq!(ended.reason, EndReason::PlaceholderElapsed),
            other => panic!("expected placeholder end, got {other:?}"),
        }
    }

    #[test]
    fn invalid_video_url_goes_straight_to_placeholder() {
        let mut e = engine();
        let p = program(Some(10), Some("ftp://example.com/a.mp4"));
        assert!(matches!(e.try_start(&p, t0()), StartOutcome::PlayingPlaceholder(_)));
        assert_eq!(e.backend().loaded, None);
    }
}
