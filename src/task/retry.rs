use std::time::Duration;

use super::models::TaskSettings;

/// Decision returned by the retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Put the chapter back into the claim pool after the delay
    Retry(Duration),
    /// Give up; the chapter becomes failed
    Fail,
}

/// Fixed-delay retry policy.
///
/// `attempt_count` is the number of failed attempts so far (1 after the first
/// failure). A chapter is retried while `attempt_count <= max_retries`, so it is
/// fetched at most `max_retries + 1` times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    pub fn from_settings(settings: &TaskSettings) -> Self {
        Self::new(settings.max_retries, settings.retry_delay)
    }

    pub fn decide(&self, attempt_count: u32) -> RetryDecision {
        if attempt_count <= self.max_retries {
            RetryDecision::Retry(self.delay)
        } else {
            RetryDecision::Fail
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retries_up_to_cap() {
        let policy = RetryPolicy::new(2, Duration::from_millis(50));
        assert_eq!(policy.decide(1), RetryDecision::Retry(Duration::from_millis(50)));
        assert_eq!(policy.decide(2), RetryDecision::Retry(Duration::from_millis(50)));
        assert_eq!(policy.decide(3), RetryDecision::Fail);
    }

    #[test]
    fn zero_retries_fails_first_error() {
        let policy = RetryPolicy::new(0, Duration::ZERO);
        assert_eq!(policy.decide(1), RetryDecision::Fail);
    }
}
