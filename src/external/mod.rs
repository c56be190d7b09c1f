pub mod collector;
pub mod remote_collector;
