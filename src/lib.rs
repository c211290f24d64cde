pub mod api;
pub mod clock;
pub mod config;
pub mod extractor;
pub mod humanize;
pub mod limiter;
pub mod naming;
pub mod observability;
pub mod pipeline;
pub mod provider;
pub mod retrieval;
pub mod session;
pub mod stats;
pub mod storage;
pub mod workspace;
