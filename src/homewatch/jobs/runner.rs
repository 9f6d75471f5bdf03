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

use crate::influx::{DatabaseError, FluxQuery};
use crate::jobs::state::{JobStates, StateError, StateStore};
use crate::notify::{Notification, Notifier, NotifyError};
use crate::supervisor::{Unit, UnitError};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{Instrument, Level};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Error returned by a job. Logged by the runner, never retried early.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("notification error: {0}")]
    Notify(#[from] NotifyError),
    #[error("{0}")]
    Failed(String),
}

/// Clients shared by every job, owned by the runner and handed to each job
/// when it runs.
#[derive(Clone)]
pub struct JobContext {
    pub db: Arc<dyn FluxQuery>,
    pub notifier: Arc<dyn Notifier>,
}

impl JobContext {
    pub fn new(db: Arc<dyn FluxQuery>, notifier: Arc<dyn Notifier>) -> Self {
        JobContext { db, notifier }
    }

    /// Send a notification from a job.
    pub async fn send_alert(&self, title: &str, body: &str, tags: &[&str]) -> Result<(), JobError> {
        Ok(self.notifier.send(&Notification::new(title, body, tags)).await?)
    }
}

impl fmt::Debug for JobContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobContext").finish_non_exhaustive()
    }
}

/// Named unit of periodic work.
///
/// Each run gets a copy of the state the previous run returned (an empty object
/// the first time a job ever runs) and returns the state for the next run. The
/// name is the key the state is persisted under.
#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &str;

    fn interval(&self) -> Duration;

    async fn run(&self, ctx: &JobContext, state: Value) -> Result<Value, JobError>;
}

/// Job states and the last time each job was started, for one run of the runner.
#[derive(Debug)]
pub struct Schedule {
    states: JobStates,
    last_executed: Vec<Option<Instant>>,
}

impl Schedule {
    pub fn states(&self) -> &JobStates {
        &self.states
    }
}

/// Runs a fixed set of jobs, one at a time in the order they were registered,
/// each time their interval has elapsed.
pub struct JobRunner {
    jobs: Vec<Box<dyn Job>>,
    store: StateStore,
    ctx: JobContext,
    poll: Duration,
}

impl JobRunner {
    pub fn new(jobs: Vec<Box<dyn Job>>, store: StateStore, ctx: JobContext) -> Self {
        JobRunner {
            jobs,
            store,
            ctx,
            poll: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(self, poll: Duration) -> Self {
        JobRunner { poll, ..self }
    }

    /// Load persisted state, giving jobs that have never run an empty state. Jobs
    /// start out due, the first pass runs all of them.
    pub async fn start(&self) -> Result<Schedule, StateError> {
        let mut states = self.store.load().await?;
        for job in self.jobs.iter() {
            if !states.contains_key(job.name()) {
                states.insert(job.name().to_owned(), Value::Object(Map::new()));
            }
        }

        self.store.save(&states).await?;

        tracing::info!(
            message = "loaded job states",
            path = %self.store.path().display(),
            jobs = self.jobs.len(),
            states = states.len(),
        );

        Ok(Schedule {
            states,
            last_executed: vec![None; self.jobs.len()],
        })
    }

    /// Run every job that is due, returning whether any job ran.
    ///
    /// Jobs are marked as executed before they run so a job that fails waits a full
    /// interval before it's tried again. State is saved after each successful job.
    pub async fn run_pass(&self, schedule: &mut Schedule) -> Result<bool, StateError> {
        let mut any_ran = false;

        for (i, job) in self.jobs.iter().enumerate() {
            let now = Instant::now();
            let due = match schedule.last_executed[i] {
                None => true,
                Some(last) => last + job.interval() <= now,
            };

            if !due {
                continue;
            }

            schedule.last_executed[i] = Some(now);
            any_ran = true;

            let name = job.name();
            let state = schedule
                .states
                .get(name)
                .cloned()
                .unwrap_or_else(|| Value::Object(Map::new()));

            tracing::info!(message = "starting job", job = name);
            let res = job
                .run(&self.ctx, state)
                .instrument(tracing::span!(Level::INFO, "job", job = name))
                .await;

            match res {
                Ok(new_state) => {
                    tracing::info!(
                        message = "job finished",
                        job = name,
                        elapsed_ms = now.elapsed().as_millis() as u64,
                    );
                    schedule.states.insert(name.to_owned(), new_state);
                    self.store.save(&schedule.states).await?;
                }
                Err(e) => {
                    tracing::error!(message = "job failed", job = name, error = %e);
                }
            }
        }

        Ok(any_ran)
    }
}

impl fmt::Debug for JobRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.jobs.iter().map(|j| j.name()).collect();
        f.debug_struct("JobRunner")
            .field("jobs", &names)
            .field("store", &self.store)
            .field("poll", &self.poll)
            .finish()
    }
}

#[async_trait]
impl Unit for JobRunner {
    fn name(&self) -> &'static str {
        "job_runner"
    }

    async fn run(&mut self) -> Result<(), UnitError> {
        let mut schedule = self.start().await?;

        loop {
            if !self.run_pass(&mut schedule).await? {
                tokio::time::sleep(self.poll).await;
            }
        }
    }
}
