//! Cloud Monitor API surface consumed by the exporter.
//!
//! [`CmsApi`] is the seam between the retrieval logic and the wire. The
//! production implementation is [`crate::HttpCmsClient`]; tests plug in
//! scripted fakes.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ApiError;

/// Read timeout applied to each retrieval call unless overridden.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(50);

/// Page size used for metadata listing.
pub const META_PAGE_SIZE: u32 = 100;

/// The two monitoring calls the exporter issues.
///
/// Implementations must be safe to call concurrently from many tasks.
pub trait CmsApi: Send + Sync {
    /// Latest reported value per series for one metric.
    fn describe_metric_last(
        &self,
        req: &DescribeMetricLastRequest,
    ) -> impl Future<Output = Result<DescribeMetricLastResponse, ApiError>> + Send;

    /// Metric resource descriptors registered under one namespace.
    fn describe_metric_meta_list(
        &self,
        req: &DescribeMetricMetaListRequest,
    ) -> impl Future<Output = Result<DescribeMetricMetaListResponse, ApiError>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescribeMetricLastRequest {
    pub namespace: String,
    pub metric_name: String,
    pub period: String,
    pub read_timeout: Duration,
}

impl DescribeMetricLastRequest {
    pub fn new(namespace: &str, metric_name: &str, period: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            metric_name: metric_name.to_string(),
            period: period.to_string(),
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescribeMetricMetaListRequest {
    pub namespace: String,
    pub page_size: u32,
    pub read_timeout: Duration,
}

impl DescribeMetricMetaListRequest {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            page_size: META_PAGE_SIZE,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// `DescribeMetricLast` response. `datapoints` is itself a JSON-encoded
/// array of records.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DescribeMetricLastResponse {
    pub request_id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub code: String,
    pub message: String,
    pub success: Option<bool>,
    pub period: String,
    pub next_token: Option<String>,
    pub datapoints: String,
    /// The undecoded HTTP body.
    #[serde(skip)]
    pub raw: String,
}

/// `DescribeMetricMetaList` response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DescribeMetricMetaListResponse {
    pub request_id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub code: String,
    pub message: String,
    pub success: Option<bool>,
    #[serde(deserialize_with = "string_or_number")]
    pub total_count: String,
    pub resources: Resources,
    #[serde(skip)]
    pub raw: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Resources {
    pub resource: Vec<Resource>,
}

/// One discoverable metric under a namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Resource {
    pub metric_name: String,
    pub namespace: String,
    pub description: String,
    pub unit: String,
    pub labels: String,
    pub dimensions: String,
    pub periods: String,
    pub statistics: String,
}

/// Common envelope fields shared by every response.
pub(crate) trait Envelope {
    fn code(&self) -> &str;
    fn message(&self) -> &str;
    fn request_id(&self) -> &str;
    fn success(&self) -> Option<bool>;

    /// Turn a well-formed but unsuccessful envelope into an error.
    fn check(&self) -> Result<(), ApiError> {
        let code_ok = self.code().is_empty() || self.code() == "200";
        if self.success() == Some(false) || !code_ok {
            return Err(ApiError::Api {
                code: self.code().to_string(),
                message: self.message().to_string(),
                request_id: self.request_id().to_string(),
            });
        }
        Ok(())
    }
}

macro_rules! envelope {
    ($ty:ty) => {
        impl Envelope for $ty {
            fn code(&self) -> &str {
                &self.code
            }
            fn message(&self) -> &str {
                &self.message
            }
            fn request_id(&self) -> &str {
                &self.request_id
            }
            fn success(&self) -> Option<bool> {
                self.success
            }
        }
    };
}

envelope!(DescribeMetricLastResponse);
envelope!(DescribeMetricMetaListResponse);

/// Error body returned with non-2xx statuses.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub(crate) struct ErrorBody {
    #[serde(deserialize_with = "string_or_number")]
    pub code: String,
    pub message: String,
    pub request_id: String,
}

/// The API is inconsistent about quoting numeric fields.
fn string_or_number<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    Ok(match serde_json::Value::deserialize(de)? {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    })
}
