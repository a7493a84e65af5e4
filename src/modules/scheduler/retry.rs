use serde::{Deserialize, Serialize};

const MAX_WAIT_SECONDS: u32 = 60 * 60;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum RetryStrategy {
    /// A fixed delay between attempts.
    Linear { interval: u32 },
    /// base^attempt seconds between attempts, capped at one hour.
    Exponential { base: u32 },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub strategy: RetryStrategy,
    pub max_retries: Option<u32>,
}

impl RetryPolicy {
    /// Seconds to wait before the given (1-based) retry attempt.
    pub fn wait_time(&self, attempt: u32) -> u32 {
        match self.strategy {
            RetryStrategy::Linear { interval } => interval.min(MAX_WAIT_SECONDS),
            RetryStrategy::Exponential { base } => base
                .saturating_pow(attempt)
                .min(MAX_WAIT_SECONDS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_grows_and_caps() {
        let policy = RetryPolicy {
            strategy: RetryStrategy::Exponential { base: 2 },
            max_retries: Some(5),
        };
        assert_eq!(policy.wait_time(1), 2);
        assert_eq!(policy.wait_time(3), 8);
        assert_eq!(policy.wait_time(30), 3600);
    }

    #[test]
    fn test_linear_backoff_is_constant() {
        let policy = RetryPolicy {
            strategy: RetryStrategy::Linear { interval: 300 },
            max_retries: None,
        };
        assert_eq!(policy.wait_time(1), 300);
        assert_eq!(policy.wait_time(9), 300);
    }
}
