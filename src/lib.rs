pub mod apis;
pub mod artist_name;
pub mod collector;
pub mod compare;
pub mod config;
pub mod constants;
pub mod csv_store;
pub mod dates;
pub mod db;
pub mod domain;
pub mod error;
pub mod logging;
pub mod lyrics;
pub mod parser;
pub mod pipeline;
pub mod prompts;
pub mod rate_limiter;
pub mod venue;
