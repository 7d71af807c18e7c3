//! Bounded-attempt state machine for one batch.
//!
//! `Pending → Attempting(n) → Success(n) | RetryWait(n) | Exhausted(n)`, with
//! `RetryWait(n) → Attempting(n + 1)`. The machine never sleeps itself; the
//! caller waits [`RetryMachine::delay`] whenever a failure leaves it in
//! `RetryWait`.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// At least one attempt is always made.
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries: max_retries.max(1),
            delay,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Pending,
    Attempting(u32),
    RetryWait(u32),
    Success(u32),
    Exhausted(u32),
}

#[derive(Debug, Clone)]
pub struct RetryMachine {
    policy: RetryPolicy,
    state: AttemptState,
}

impl RetryMachine {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            state: AttemptState::Pending,
        }
    }

    pub fn state(&self) -> AttemptState {
        self.state
    }

    pub fn delay(&self) -> Duration {
        self.policy.delay
    }

    /// True once the batch has succeeded or run out of attempts.
    pub fn is_final(&self) -> bool {
        matches!(self.state, AttemptState::Success(_) | AttemptState::Exhausted(_))
    }

    /// Start the next attempt and return its number.
    ///
    /// Final states are never left: there `begin` changes nothing and returns
    /// the number of the last attempt made.
    pub fn begin(&mut self) -> u32 {
        let attempt = match self.state {
            AttemptState::Pending => 1,
            AttemptState::RetryWait(n) => n + 1,
            AttemptState::Attempting(n) | AttemptState::Success(n) | AttemptState::Exhausted(n) => {
                return n;
            }
        };
        self.state = AttemptState::Attempting(attempt);
        attempt
    }

    pub fn succeed(&mut self) {
        if let AttemptState::Attempting(n) = self.state {
            self.state = AttemptState::Success(n);
        }
    }

    /// Record a rejected attempt; returns the resulting state.
    pub fn fail(&mut self) -> AttemptState {
        if let AttemptState::Attempting(n) = self.state {
            self.state = if n < self.policy.max_retries {
                AttemptState::RetryWait(n)
            } else {
                AttemptState::Exhausted(n)
            };
        }
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine(max: u32) -> RetryMachine {
        RetryMachine::new(RetryPolicy::new(max, Duration::from_millis(5)))
    }

    #[test]
    fn test_exhausts_after_max_retries() {
        let mut m = machine(3);
        assert_eq!(m.state(), AttemptState::Pending);

        let mut attempts = Vec::new();
        while !m.is_final() {
            attempts.push(m.begin());
            m.fail();
        }
        assert_eq!(attempts, vec![1, 2, 3]);
        assert_eq!(m.state(), AttemptState::Exhausted(3));
    }

    #[test]
    fn test_waits_only_between_attempts() {
        let mut m = machine(2);
        m.begin();
        assert_eq!(m.fail(), AttemptState::RetryWait(1));
        m.begin();
        assert_eq!(m.fail(), AttemptState::Exhausted(2));
    }

    #[test]
    fn test_success_is_final() {
        let mut m = machine(3);
        m.begin();
        m.fail();
        assert_eq!(m.begin(), 2);
        m.succeed();
        assert_eq!(m.state(), AttemptState::Success(2));
        assert!(m.is_final());
        assert_eq!(m.begin(), 2);
        assert_eq!(m.state(), AttemptState::Success(2));
    }

    #[test]
    fn test_zero_retries_still_attempts_once() {
        let mut m = machine(0);
        assert_eq!(m.begin(), 1);
        assert_eq!(m.fail(), AttemptState::Exhausted(1));
        assert_eq!(m.begin(), 1);
        assert_eq!(m.state(), AttemptState::Exhausted(1));
    }

    #[test]
    fn test_fail_outside_attempt_is_ignored() {
        let mut m = machine(3);
        assert_eq!(m.fail(), AttemptState::Pending);
    }
}
