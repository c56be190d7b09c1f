use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::job::Job;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobEventType {
    JobQueued,
    JobStarted,
    JobCompleted,
    /// Sent for every failed attempt. The job snapshot is `pending` when the
    /// attempt will be retried and `failed` when the failure is terminal.
    JobFailed,
}

/// Lifecycle notification pushed to live subscribers. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct JobEvent {
    #[serde(rename = "type")]
    pub event_type: JobEventType,
    pub job: Job,
    pub timestamp: DateTime<Utc>,
    /// Pending jobs left in the queue when the event was sent.
    pub queue_size: i64,
}

impl JobEvent {
    pub fn new(event_type: JobEventType, job: Job, queue_size: i64) -> Self {
        Self {
            event_type,
            job,
            timestamp: Utc::now(),
            queue_size,
        }
    }
}
