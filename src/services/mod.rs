pub mod concurrency_governor;
pub mod event_hub;
pub mod freshness_service;
pub mod job_dispatcher;
pub mod job_enqueue_service;
pub mod job_scheduler_service;
pub mod ticker_watcher;
