//! Bounded retry with a fixed per-attempt delay.
//!
//! Used to poll device status: an attempt either succeeds, asks to be
//! retried, or aborts the poll outright.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::trace;

/// Attempt budget and delay for one poll site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryPolicy {
    /// Maximum number of invocations of the operation.
    pub max_attempts: u32,
    /// Delay between failed attempts, in milliseconds.
    pub delay_ms: u64,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, delay_ms: u64) -> Self {
        Self {
            max_attempts,
            delay_ms,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Failure of a single attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<E> {
    /// Not ready yet; try again after the delay.
    Retry(E),
    /// Terminal; stop without spending the rest of the budget.
    Abort(E),
}

/// Failure of the whole retry loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    /// Every attempt asked to be retried; carries the last error.
    Exhausted { attempts: u32, last: E },
    /// An attempt aborted on attempt number `attempt` (1-based).
    Aborted { attempt: u32, error: E },
}

/// Something that can block between attempts.
pub trait Wait {
    fn wait(&mut self, delay: Duration);
}

/// Run `op` against `ctx` until it succeeds, aborts, or the budget is spent.
///
/// `op` is invoked at most `policy.max_attempts` times (at least once), with
/// one `ctx.wait(policy.delay())` between consecutive attempts and none after
/// the last.
pub fn retry<C, T, E, F>(
    policy: &RetryPolicy,
    ctx: &mut C,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    C: Wait + ?Sized,
    F: FnMut(&mut C) -> Result<T, Attempt<E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(ctx) {
            Ok(value) => return Ok(value),
            Err(Attempt::Abort(error)) => return Err(RetryError::Aborted { attempt, error }),
            Err(Attempt::Retry(last)) => {
                if attempt >= max_attempts {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last,
                    });
                }
                trace!(attempt, max_attempts, "Attempt failed, retrying");
                ctx.wait(policy.delay());
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        calls: u32,
        waits: Vec<Duration>,
    }

    impl Wait for Counter {
        fn wait(&mut self, delay: Duration) {
            self.waits.push(delay);
        }
    }

    #[test]
    fn test_success_on_attempt_k() {
        let policy = RetryPolicy::new(10, 3);
        for k in 1..=10u32 {
            let mut ctx = Counter::default();
            let result: Result<u32, RetryError<&str>> = retry(&policy, &mut ctx, |c| {
                c.calls += 1;
                if c.calls == k {
                    Ok(c.calls)
                } else {
                    Err(Attempt::Retry("busy"))
                }
            });
            assert_eq!(result, Ok(k));
            assert_eq!(ctx.calls, k);
            assert_eq!(ctx.waits.len(), (k - 1) as usize);
        }
    }

    #[test]
    fn test_always_failing_spends_budget() {
        let policy = RetryPolicy::new(7, 3);
        let mut ctx = Counter::default();
        let result: Result<(), _> = retry(&policy, &mut ctx, |c| {
            c.calls += 1;
            Err(Attempt::Retry(c.calls))
        });
        assert_eq!(
            result,
            Err(RetryError::Exhausted {
                attempts: 7,
                last: 7
            })
        );
        assert_eq!(ctx.calls, 7);
        assert_eq!(ctx.waits, vec![Duration::from_millis(3); 6]);
    }

    #[test]
    fn test_abort_stops_immediately() {
        let policy = RetryPolicy::new(4200, 3);
        let mut ctx = Counter::default();
        let result: Result<(), _> = retry(&policy, &mut ctx, |c| {
            c.calls += 1;
            if c.calls < 3 {
                Err(Attempt::Retry("busy"))
            } else {
                Err(Attempt::Abort("failed"))
            }
        });
        assert_eq!(
            result,
            Err(RetryError::Aborted {
                attempt: 3,
                error: "failed"
            })
        );
        assert_eq!(ctx.calls, 3);
        assert_eq!(ctx.waits.len(), 2);
    }

    #[test]
    fn test_zero_budget_still_attempts_once() {
        let policy = RetryPolicy::new(0, 3);
        let mut ctx = Counter::default();
        let result: Result<(), _> = retry(&policy, &mut ctx, |c| {
            c.calls += 1;
            Err(Attempt::Retry(()))
        });
        assert!(matches!(result, Err(RetryError::Exhausted { attempts: 1, .. })));
        assert!(ctx.waits.is_empty());
    }
}
