mod job_queue;
mod memory_job_queue;
mod ticker_index;

pub use job_queue::{JobQueue, PgJobQueue};
pub use memory_job_queue::MemoryJobQueue;
pub use ticker_index::{MemoryTickerIndex, PgTickerIndex, TickerIndex};
