//! A load generator for contacts services.
//!
//! A benchmark run consists of two strictly sequential phases:
//!
//! 1. The *write* phase creates random contacts with `POST /contacts` and keeps every contact the
//!    service confirmed in a [`ResultStore`](store::ResultStore).
//! 2. The *read* phase queries `GET /contacts` using the stored contacts: 30% by phone number, 60%
//!    by external id, and 10% by a random external id that may not exist.
//!
//! Both phases are executed by a fixed-size worker pool draining a bounded job queue, see
//! [`pool`]. Failed requests are logged and counted, but never abort a phase.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod bench;
pub mod config;
pub mod error;
pub mod http;
pub mod observability;
pub mod pool;
pub mod report;
pub mod store;
pub mod workload;

pub use crate::bench::run;
pub use crate::config::Config;
pub use crate::http::HttpRemote;
