// Homewatch - Home monitoring telemetry pipeline
//
// Copyright 2026 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use crate::influx::DatabaseError;
use crate::jobs::StateError;
use async_trait::async_trait;
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(1);

/// Failure of an external system that ends the current run of a unit. The
/// supervisor restarts the unit from scratch after these.
#[derive(Debug, thiserror::Error)]
pub enum UnitError {
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("broker error: {0}")]
    Broker(#[from] rumqttc::ConnectionError),
    #[error("broker client error: {0}")]
    BrokerClient(#[from] rumqttc::ClientError),
    #[error("job state error: {0}")]
    State(#[from] StateError),
    #[error("unit panicked: {0}")]
    Panic(String),
}

/// Independently running piece of a process (consumer loop, adapter loop, job runner).
#[async_trait]
pub trait Unit: Send {
    fn name(&self) -> &'static str;

    /// Run until the unit's input is exhausted (`Ok`) or an external system
    /// fails (`Err`). Any connections are created fresh on each call.
    async fn run(&mut self) -> Result<(), UnitError>;
}

/// How a `Supervisor` restarts a failed unit: after a fixed delay, forever unless
/// a maximum number of restarts is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    delay: Duration,
    max_restarts: Option<usize>,
}

impl RestartPolicy {
    pub fn fixed(delay: Duration) -> Self {
        RestartPolicy {
            delay,
            max_restarts: None,
        }
    }

    pub fn with_max_restarts(self, max_restarts: usize) -> Self {
        RestartPolicy {
            max_restarts: Some(max_restarts),
            ..self
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_RESTART_DELAY)
    }
}

/// Run a unit, restarting it according to a `RestartPolicy` each time it fails.
#[derive(Debug, Clone, Default)]
pub struct Supervisor {
    policy: RestartPolicy,
}

impl Supervisor {
    pub fn new(policy: RestartPolicy) -> Self {
        Supervisor { policy }
    }

    /// Run the unit until it finishes without error. If the policy has a maximum
    /// number of restarts, the error from the last attempt is returned once it
    /// has been exhausted.
    pub async fn supervise<U: Unit>(&self, unit: &mut U) -> Result<(), UnitError> {
        let mut restarts = 0;

        loop {
            tracing::info!(message = "starting unit", unit = unit.name(), restarts = restarts);

            let res = AssertUnwindSafe(unit.run())
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(UnitError::Panic(panic_message(panic.as_ref()))));

            let err = match res {
                Ok(()) => {
                    tracing::info!(message = "unit finished", unit = unit.name());
                    return Ok(());
                }
                Err(e) => e,
            };

            tracing::error!(message = "unit failed", unit = unit.name(), error = %err);
            if matches!(self.policy.max_restarts, Some(max) if restarts >= max) {
                return Err(err);
            }

            tracing::warn!(
                message = "restarting unit",
                unit = unit.name(),
                delay_ms = self.policy.delay.as_millis() as u64,
            );

            tokio::time::sleep(self.policy.delay).await;
            restarts += 1;
        }
    }
}

/// Text of a panic payload, which is a `&str` or `String` for panics from the
/// `panic!` family of macros.
fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

#[cfg(test)]
mod test {
    use super::{RestartPolicy, Supervisor, Unit, UnitError};
    use crate::influx::DatabaseError;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::time::Duration;

    /// Unit that fails a fixed number of times before finishing.
    struct FlakyUnit {
        failures: usize,
        runs: usize,
    }

    #[async_trait]
    impl Unit for FlakyUnit {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn run(&mut self) -> Result<(), UnitError> {
            self.runs += 1;
            if self.runs <= self.failures {
                Err(UnitError::Database(DatabaseError::Status {
                    status: StatusCode::SERVICE_UNAVAILABLE,
                    body: "unavailable".to_owned(),
                }))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_supervise_restarts_until_success() {
        let supervisor = Supervisor::new(RestartPolicy::fixed(Duration::from_secs(1)));
        let mut unit = FlakyUnit { failures: 3, runs: 0 };

        let start = tokio::time::Instant::now();
        let res = supervisor.supervise(&mut unit).await;

        assert!(res.is_ok());
        assert_eq!(4, unit.runs);
        // Fixed delay between each attempt, no backoff
        assert!(start.elapsed() >= Duration::from_secs(3));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_supervise_max_restarts() {
        let supervisor = Supervisor::new(RestartPolicy::fixed(Duration::from_millis(10)).with_max_restarts(2));
        let mut unit = FlakyUnit { failures: 10, runs: 0 };

        let res = supervisor.supervise(&mut unit).await;

        assert!(matches!(res, Err(UnitError::Database(_))));
        assert_eq!(3, unit.runs);
    }

    /// Unit that panics on its first run.
    struct PanickyUnit {
        runs: usize,
    }

    #[async_trait]
    impl Unit for PanickyUnit {
        fn name(&self) -> &'static str {
            "panicky"
        }

        async fn run(&mut self) -> Result<(), UnitError> {
            self.runs += 1;
            if self.runs == 1 {
                panic!("lost track of the queue");
            }

            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_supervise_restarts_after_panic() {
        let supervisor = Supervisor::new(RestartPolicy::fixed(Duration::from_secs(1)));
        let mut unit = PanickyUnit { runs: 0 };

        let res = supervisor.supervise(&mut unit).await;

        assert!(res.is_ok());
        assert_eq!(2, unit.runs);
    }

    #[tokio::test(start_paused = true)]
    async fn test_supervise_panic_reported_as_error() {
        let supervisor = Supervisor::new(RestartPolicy::fixed(Duration::from_secs(1)).with_max_restarts(0));
        let mut unit = PanickyUnit { runs: 0 };

        match supervisor.supervise(&mut unit).await {
            Err(UnitError::Panic(msg)) => assert_eq!("lost track of the queue", msg),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_restart_policy_default() {
        assert_eq!(Duration::from_secs(1), RestartPolicy::default().delay());
    }
}
