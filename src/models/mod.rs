pub mod job;
pub mod job_event;
pub mod ticker_index;

pub use job::{CreateJob, Job, JobRow, JobStatus, JobType, HEAVY_JOB_TYPES, NEW_TICKER_PRIORITY, SLOW_JOB_TYPES};
pub use job_event::{JobEvent, JobEventType};
pub use ticker_index::{Component, Freshness, TickerIndexEntry};
