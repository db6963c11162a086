pub mod api;
pub mod backend;
pub mod config;
pub mod error;
pub mod report;
pub mod server;
pub mod shutdown;
pub mod workflow;
