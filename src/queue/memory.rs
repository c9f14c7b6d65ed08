//! In-process queue broker
//!
//! Jobs live in memory and are lost when the process exits. Suitable for a
//! single instance and for tests; the event channel follows the same
//! `broadcast` fan-out as the rest of the crate.

use super::{Job, JobOptions, JobState, QueueBackend, QueueBroker, QueueEvent};
use crate::exception::BackendResult;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tokio::time::Instant;

const EVENT_CAPACITY: usize = 256;

/// Hands out one [`MemoryQueue`] per name
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    queues: Arc<DashMap<String, Arc<MemoryQueue>>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the queues opened so far
    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queues.iter().map(|q| q.key().clone()).collect();
        names.sort();
        names
    }
}

#[async_trait]
impl QueueBroker for InMemoryBroker {
    async fn open(&self, queue: &str) -> BackendResult<Arc<dyn QueueBackend>> {
        let mut entry = self
            .queues
            .entry(queue.to_string())
            .or_insert_with(|| Arc::new(MemoryQueue::new(queue)));
        // A closed queue is replaced so that a restarted client starts clean.
        if entry.is_closed() {
            *entry = Arc::new(MemoryQueue::new(queue));
        }
        let backend: Arc<dyn QueueBackend> = entry.clone();
        Ok(backend)
    }
}

#[derive(Default)]
struct QueueState {
    jobs: HashMap<String, Job>,
    waiting: VecDeque<String>,
    delayed: Vec<(Instant, String)>,
    paused: bool,
    closed: bool,
}

impl QueueState {
    fn promote_due(&mut self, now: Instant) {
        let mut index = 0;
        while index < self.delayed.len() {
            if self.delayed[index].0 <= now {
                let (_, id) = self.delayed.swap_remove(index);
                if let Some(job) = self.jobs.get_mut(&id) {
                    job.state = JobState::Waiting;
                    self.waiting.push_back(id);
                }
            } else {
                index += 1;
            }
        }
    }

    fn next_due(&self) -> Option<Instant> {
        self.delayed.iter().map(|(at, _)| *at).min()
    }

    fn enqueue(&mut self, job: Job) {
        match job.options.pending_delay() {
            Some(delay) => self.delayed.push((Instant::now() + delay, job.id.clone())),
            None => self.waiting.push_back(job.id.clone()),
        }
        self.jobs.insert(job.id.clone(), job);
    }

    fn detach(&mut self, id: &str) {
        self.waiting.retain(|waiting| waiting != id);
        self.delayed.retain(|(_, delayed)| delayed != id);
    }
}

pub struct MemoryQueue {
    name: String,
    state: Mutex<QueueState>,
    notify: Notify,
    events: broadcast::Sender<QueueEvent>,
}

impl MemoryQueue {
    pub fn new(name: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            name: name.into(),
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            events,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Jobs currently held, in any state
    pub fn len(&self) -> usize {
        self.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // A panic while holding the lock leaves plain data behind; keep serving it.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, event: QueueEvent) {
        let _ = self.events.send(event);
    }

    fn open_state(&self) -> BackendResult<MutexGuard<'_, QueueState>> {
        let state = self.lock();
        if state.closed {
            return Err(format!("Queue {} is closed", self.name).into());
        }
        Ok(state)
    }
}

#[async_trait]
impl QueueBackend for MemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn wait_until_ready(&self) -> BackendResult<()> {
        self.open_state().map(|_| ())
    }

    fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    async fn add(&self, name: &str, data: Value, options: JobOptions) -> BackendResult<Job> {
        let job = Job::new(name, data, options);
        self.open_state()?.enqueue(job.clone());
        self.publish(QueueEvent::Waiting {
            job_id: job.id.clone(),
        });
        self.notify.notify_waiters();
        Ok(job)
    }

    async fn add_bulk(&self, jobs: Vec<(String, Value, JobOptions)>) -> BackendResult<Vec<Job>> {
        let created: Vec<Job> = jobs
            .into_iter()
            .map(|(name, data, options)| Job::new(name, data, options))
            .collect();
        {
            let mut state = self.open_state()?;
            for job in &created {
                state.enqueue(job.clone());
            }
        }
        for job in &created {
            self.publish(QueueEvent::Waiting {
                job_id: job.id.clone(),
            });
        }
        self.notify.notify_waiters();
        Ok(created)
    }

    async fn get_job(&self, job_id: &str) -> BackendResult<Option<Job>> {
        Ok(self.open_state()?.jobs.get(job_id).cloned())
    }

    async fn remove(&self, job_id: &str) -> BackendResult<bool> {
        let mut state = self.open_state()?;
        match state.jobs.get(job_id).map(|job| job.state) {
            None => Ok(false),
            Some(JobState::Active) => {
                Err(format!("Job {} is being processed and cannot be removed", job_id).into())
            }
            Some(_) => {
                state.detach(job_id);
                state.jobs.remove(job_id);
                Ok(true)
            }
        }
    }

    async fn pause(&self) -> BackendResult<()> {
        self.open_state()?.paused = true;
        self.publish(QueueEvent::Paused);
        Ok(())
    }

    async fn resume(&self) -> BackendResult<()> {
        self.open_state()?.paused = false;
        self.publish(QueueEvent::Resumed);
        self.notify.notify_waiters();
        Ok(())
    }

    async fn clean(
        &self,
        grace: Duration,
        limit: usize,
        state: JobState,
    ) -> BackendResult<Vec<String>> {
        let cutoff = chrono::Duration::from_std(grace)
            .ok()
            .and_then(|grace| Utc::now().checked_sub_signed(grace))
            .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);

        let removed = {
            let mut queue = self.open_state()?;
            let mut candidates: Vec<(chrono::DateTime<Utc>, String)> = queue
                .jobs
                .values()
                .filter(|job| job.state == state)
                .map(|job| (job.finished_at.unwrap_or(job.created_at), job.id.clone()))
                .filter(|(at, _)| *at <= cutoff)
                .collect();
            candidates.sort();
            if limit > 0 {
                candidates.truncate(limit);
            }
            for (_, id) in &candidates {
                queue.detach(id);
                queue.jobs.remove(id);
            }
            candidates.into_iter().map(|(_, id)| id).collect::<Vec<_>>()
        };

        self.publish(QueueEvent::Cleaned {
            count: removed.len(),
            state,
        });
        Ok(removed)
    }

    async fn close(&self) -> BackendResult<()> {
        self.lock().closed = true;
        self.notify.notify_waiters();
        Ok(())
    }

    async fn next_job(&self) -> BackendResult<Option<Job>> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let wake_at = {
                let mut state = self.lock();
                if state.closed {
                    return Ok(None);
                }
                state.promote_due(Instant::now());
                if !state.paused {
                    while let Some(id) = state.waiting.pop_front() {
                        if let Some(job) = state.jobs.get_mut(&id) {
                            job.state = JobState::Active;
                            job.processed_at = Some(Utc::now());
                            return Ok(Some(job.clone()));
                        }
                    }
                }
                state.next_due()
            };

            match wake_at {
                Some(at) => {
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = tokio::time::sleep_until(at) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    async fn complete(&self, job_id: &str, result: Value) -> BackendResult<()> {
        {
            let mut state = self.lock();
            let remove = match state.jobs.get_mut(job_id) {
                Some(job) => {
                    job.state = JobState::Completed;
                    job.return_value = Some(result);
                    job.finished_at = Some(Utc::now());
                    job.options.remove_on_complete
                }
                None => return Ok(()),
            };
            if remove {
                state.jobs.remove(job_id);
            }
        }
        self.publish(QueueEvent::Completed {
            job_id: job_id.to_string(),
        });
        Ok(())
    }

    async fn fail(&self, job_id: &str, reason: &str) -> BackendResult<()> {
        let retry = {
            let mut state = self.lock();
            let retry = match state.jobs.get_mut(job_id) {
                Some(job) => {
                    job.attempts_made += 1;
                    job.failed_reason = Some(reason.to_string());
                    if job.attempts_made < job.options.attempts {
                        job.state = JobState::Waiting;
                        true
                    } else {
                        job.state = JobState::Failed;
                        job.finished_at = Some(Utc::now());
                        false
                    }
                }
                None => return Ok(()),
            };
            if retry {
                state.waiting.push_back(job_id.to_string());
            }
            retry
        };

        if retry {
            self.notify.notify_waiters();
        } else {
            self.publish(QueueEvent::Failed {
                job_id: job_id.to_string(),
                reason: reason.to_string(),
            });
        }
        Ok(())
    }
}
