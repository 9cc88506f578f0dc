use std::time::Duration;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    /// The attempt budget is spent; the caller should fall back.
    GiveUp,
}

/// Bounded fixed-delay retry counter, shared by every remote fetch path.
/// One instance per concern; `reset` on success.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    failures: u32,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            failures: 0,
        }
    }

    /// Records one failure.  Gives up once `max_attempts` attempts have all
    /// failed, and resets so the next cycle starts fresh.
    pub fn note_failure(&mut self) -> RetryDecision {
        self.failures += 1;
        if self.failures >= self.max_attempts {
            self.failures = 0;
            RetryDecision::GiveUp
        } else {
            RetryDecision::RetryAfter(self.delay)
        }
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gives_up_after_max_attempts() {
        let mut p = RetryPolicy::new(3, Duration::from_secs(5));
        assert_eq!(p.note_failure(), RetryDecision::RetryAfter(Duration::from_secs(5)));
        assert_eq!(p.note_failure(), RetryDecision::RetryAfter(Duration::from_secs(5)));
        assert_eq!(p.note_failure(), RetryDecision::GiveUp);
        // Counter reset: the next cycle retries again.
        assert_eq!(p.note_failure(), RetryDecision::RetryAfter(Duration::from_secs(5)));
    }

    #[test]
    fn reset_clears_failure_count() {
        let mut p = RetryPolicy::new(2, Duration::from_secs(1));
        p.note_failure();
        p.reset();
        assert_eq!(p.note_failure(), RetryDecision::RetryAfter(Duration::from_secs(1)));
    }
}
