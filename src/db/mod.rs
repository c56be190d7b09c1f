pub mod job_queries;
pub mod ticker_index_queries;
