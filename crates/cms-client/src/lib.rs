//! cms-client — metric retrieval from the cloud monitoring service.
//!
//! One [`MetricClient`] per cloud account. Every call it makes goes through
//! a [`RateLimited`] decorator around the [`CmsApi`] transport, so all
//! concurrent collections for an account share one request budget.
//!
//! # Architecture
//!
//! ```text
//! MetricClient<A: CmsApi>
//!   ├── retrieve()  → DescribeMetricLast → Vec<Datapoint>
//!   ├── collect()   → retrieve + claim filtering/labeling → SampleSink
//!   └── describe_metric_meta_list() → NamespaceCatalog::filter → DescribeMetricMetaList
//!
//! RateLimited<HttpCmsClient>
//!   ├── Limiter (GCRA budget, FIFO admission)
//!   └── HttpCmsClient (signed RPC GET over HTTPS)
//! ```

pub mod api;
pub mod catalog;
pub mod client;
pub mod datapoint;
pub mod error;
pub mod http;
pub mod ratelimit;
pub mod sample;

pub use api::{
    CmsApi, DescribeMetricLastRequest, DescribeMetricLastResponse,
    DescribeMetricMetaListRequest, DescribeMetricMetaListResponse, Resource,
};
pub use catalog::NamespaceCatalog;
pub use client::{CloudMetricClient, MetricClient};
pub use datapoint::{Datapoint, Value};
pub use error::{ApiError, CollectError, RateLimitError};
pub use http::HttpCmsClient;
pub use ratelimit::{Limiter, RateLimited};
pub use sample::{Ownership, Sample, SampleSink};
