//! Bounded retry around global lock acquisition.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::coordinator::{CoordinatorClient, LockAttempt};
use crate::lock::policy::LockRetryPolicy;
use crate::transaction::{TransactionError, TransactionResult, Xid};

/// Retries a conflicting lock acquisition at a fixed interval.
///
/// Only conflicts are retried. Any other coordinator error aborts at once.
/// The first attempt is always made; a retry or wait that would run past the
/// branch deadline is never started.
pub struct LockRetryController<'a, C: CoordinatorClient + ?Sized> {
    client: &'a C,
    policy: LockRetryPolicy,
    deadline: Option<Instant>,
}

impl<'a, C: CoordinatorClient + ?Sized> LockRetryController<'a, C> {
    pub fn new(client: &'a C, policy: LockRetryPolicy) -> Self {
        Self {
            client,
            policy,
            deadline: None,
        }
    }

    /// Bound every attempt and wait by the branch deadline.
    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn policy(&self) -> LockRetryPolicy {
        self.policy
    }

    /// Acquire the global lock on `resource_key` for `xid`.
    ///
    /// Returns the number of attempts it took.
    pub fn acquire(&self, xid: &Xid, resource_key: &str) -> TransactionResult<u32> {
        let attempts = self.policy.attempts();
        let interval = self.policy.interval();

        for attempt in 1..=attempts {
            if attempt > 1 {
                self.check_deadline(xid, Duration::ZERO)?;
            }

            match self.client.try_acquire_lock(xid, resource_key)? {
                LockAttempt::Acquired => {
                    debug!(%xid, resource_key, attempt, "global lock acquired");
                    return Ok(attempt);
                }
                LockAttempt::Conflict if attempt < attempts => {
                    debug!(%xid, resource_key, attempt, "global lock conflict, retrying");
                    self.check_deadline(xid, interval)?;
                    thread::sleep(interval);
                }
                LockAttempt::Conflict => {}
            }
        }

        warn!(%xid, resource_key, attempts, "global lock retry budget exhausted");
        Err(TransactionError::LockConflict {
            xid: xid.clone(),
            resource_key: resource_key.to_string(),
            attempts,
        })
    }

    fn check_deadline(&self, xid: &Xid, wait: Duration) -> TransactionResult<()> {
        match self.deadline {
            Some(deadline)
                if Instant::now()
                    .checked_add(wait)
                    .map_or(true, |end| end > deadline) =>
            {
                warn!(%xid, "branch deadline reached while acquiring global lock");
                Err(TransactionError::Timeout { xid: xid.clone() })
            }
            _ => Ok(()),
        }
    }
}
