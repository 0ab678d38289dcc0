pub mod cli;
pub mod client;
pub mod config;
pub mod duplicate;
pub mod executor;
pub mod failures;
pub mod grouping;
pub mod notify;
pub mod pdf;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod util;
pub mod work;
