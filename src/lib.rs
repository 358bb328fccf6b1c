pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod http;
pub mod mirror;
pub mod optimize;
pub mod output;
pub mod primary;
pub mod progress;
pub mod queue;
pub mod resolver;
pub mod stager;
