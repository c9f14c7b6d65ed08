use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use strum_macros::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobState {
    Waiting,
    Delayed,
    Active,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobOptions {
    /// Hold the job back this long before it can be picked up.
    pub delay: Option<Duration>,
    /// Total tries before the job is marked failed.
    pub attempts: u32,
    /// Drop the job from the queue once it completes.
    pub remove_on_complete: bool,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            delay: None,
            attempts: 1,
            remove_on_complete: false,
        }
    }
}

impl JobOptions {
    #[must_use]
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    #[must_use]
    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    #[must_use]
    pub fn remove_on_complete(mut self, remove: bool) -> Self {
        self.remove_on_complete = remove;
        self
    }

    /// The delay a job actually waits. A zero delay means none.
    pub fn pending_delay(&self) -> Option<Duration> {
        self.delay.filter(|delay| !delay.is_zero())
    }
}

/// A unit of background work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub name: String,
    pub data: Value,
    pub options: JobOptions,
    pub state: JobState,
    /// Failed tries so far.
    pub attempts_made: u32,
    pub failed_reason: Option<String>,
    pub return_value: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(name: impl Into<String>, data: Value, options: JobOptions) -> Self {
        let state = if options.pending_delay().is_some() {
            JobState::Delayed
        } else {
            JobState::Waiting
        };
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            data,
            options,
            state,
            attempts_made: 0,
            failed_reason: None,
            return_value: None,
            created_at: Utc::now(),
            processed_at: None,
            finished_at: None,
        }
    }

    /// Deserialize the payload
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.data)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, JobState::Completed | JobState::Failed)
    }
}

/// Entry for bulk submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueJob {
    pub name: String,
    pub data: Value,
    #[serde(default)]
    pub options: Option<JobOptions>,
}

impl QueueJob {
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
            options: None,
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: JobOptions) -> Self {
        self.options = Some(options);
        self
    }
}
