//! Readiness probing for a freshly launched hypervisor.
//!
//! A started process is not a usable control API: the socket file shows
//! up some time after exec, and the listener some time after that. The
//! probe turns that open-ended startup into a bounded synchronization
//! point: poll until the API answers or the budget runs out.

use crate::client::{ControlClient, InstanceInfo};
use crate::error::{Error, Result};
use std::time::Duration;
use tokio::time::Instant;

/// Tuning for the probe loop.
#[derive(Debug, Clone)]
pub struct ReadinessPolicy {
    /// Fixed delay between attempts.
    pub poll_interval: Duration,

    /// Time box for a single attempt; a hung connection cannot consume
    /// the whole budget.
    pub attempt_timeout: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(25),
            attempt_timeout: Duration::from_millis(100),
        }
    }
}

/// Poll `GET /` until the control API answers or `budget` elapses.
///
/// While the clock runs, every failure class is "not ready yet": socket
/// not present, connection refused, a hung attempt, an unparseable
/// response, even a well-formed API fault. The hypervisor is still
/// initializing and can produce any of them transiently. Each failure is
/// logged at trace level and the last one is carried in the returned
/// [`Error::ReadinessTimeout`], so a persistent problem stays visible in
/// the diagnostics instead of reading as a plain timeout.
///
/// Total blocking time never exceeds `budget` plus one attempt time box.
/// Cancellation is cooperative: dropping this future (e.g. from an
/// enclosing `tokio::time::timeout` or `select!`) aborts the in-flight
/// attempt without leaking a connection.
pub async fn wait_until_ready(client: &ControlClient, budget: Duration) -> Result<InstanceInfo> {
    wait_until_ready_with(client, budget, &ReadinessPolicy::default()).await
}

/// [`wait_until_ready`] with explicit probe tuning.
pub async fn wait_until_ready_with(
    client: &ControlClient,
    budget: Duration,
    policy: &ReadinessPolicy,
) -> Result<InstanceInfo> {
    let started = Instant::now();
    let deadline = started + budget;
    let mut last = String::from("no probe attempt completed");
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        match tokio::time::timeout(policy.attempt_timeout, client.instance_info()).await {
            Ok(Ok(info)) => {
                tracing::debug!(
                    attempts,
                    elapsed = ?started.elapsed(),
                    state = %info.state,
                    "control api is ready"
                );
                return Ok(info);
            }
            Ok(Err(err)) => {
                tracing::trace!(attempts, error = %err, "probe attempt failed");
                last = err.to_string();
            }
            Err(_) => {
                tracing::trace!(
                    attempts,
                    timeout = ?policy.attempt_timeout,
                    "probe attempt timed out"
                );
                last = format!("attempt timed out after {:?}", policy.attempt_timeout);
            }
        }

        if Instant::now() >= deadline {
            break;
        }
        tokio::time::sleep_until(deadline.min(Instant::now() + policy.poll_interval)).await;
        if Instant::now() >= deadline {
            break;
        }
    }

    tracing::debug!(attempts, waited = ?started.elapsed(), last, "control api never became ready");
    Err(Error::ReadinessTimeout {
        waited: started.elapsed(),
        last,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ControlEndpoint;

    #[tokio::test]
    async fn test_probe_without_listener_retries_until_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let client = ControlEndpoint::new(dir.path().join("nobody-home.sock")).client();
        let policy = ReadinessPolicy {
            poll_interval: Duration::from_millis(10),
            attempt_timeout: Duration::from_millis(50),
        };

        let started = std::time::Instant::now();
        let err = wait_until_ready_with(&client, Duration::from_millis(150), &policy)
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        match err {
            Error::ReadinessTimeout { waited, last } => {
                assert!(waited >= Duration::from_millis(150));
                assert!(!last.is_empty(), "last error must be preserved");
            }
            other => panic!("expected ReadinessTimeout, got {:?}", other),
        }
        assert!(
            elapsed >= Duration::from_millis(150),
            "probe must keep retrying until the deadline"
        );
        assert!(
            elapsed < Duration::from_secs(2),
            "probe must not overshoot the budget"
        );
    }

    #[tokio::test]
    async fn test_dropping_the_probe_resolves_promptly() {
        let dir = tempfile::tempdir().unwrap();
        let client = ControlEndpoint::new(dir.path().join("nobody-home.sock")).client();

        // An enclosing timeout cancels the probe long before its own
        // 30 second budget; completion here proves the probe resolved
        // instead of hanging on an in-flight attempt.
        let result =
            tokio::time::timeout(Duration::from_millis(100), wait_until_ready(&client, Duration::from_secs(30)))
                .await;
        assert!(result.is_err(), "canceled probe must not report ready");
    }
}
