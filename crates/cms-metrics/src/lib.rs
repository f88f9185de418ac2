//! cms-metrics — scrape orchestration and Prometheus exposition.
//!
//! # Architecture
//!
//! ```text
//! Exporter
//!   ├── one MetricClient per account (own rate budget)
//!   ├── scrape() → Collect every (account, namespace, metric) concurrently
//!   └── render() → scrape + render_prometheus() + scrape self-metrics
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for /metrics endpoint
//! ```

pub mod collector;
pub mod prometheus;

pub use collector::{Exporter, ScrapeStats};
pub use prometheus::{render_prometheus, render_scrape_stats};
