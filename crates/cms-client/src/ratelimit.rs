//! Request budget for one account's API calls.
//!
//! Calls over budget wait rather than fail. Waiters are admitted in arrival
//! order: the admission mutex is FIFO, and only its holder waits on the
//! limiter, so no caller can be overtaken indefinitely.

use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tokio::sync::Mutex;
use tracing::trace;

use crate::api::{
    CmsApi, DescribeMetricLastRequest, DescribeMetricLastResponse,
    DescribeMetricMetaListRequest, DescribeMetricMetaListResponse,
};
use crate::error::{ApiError, RateLimitError};

/// Shared, concurrency-safe requests-per-second budget.
pub struct Limiter {
    rps: NonZeroU32,
    limiter: DefaultDirectRateLimiter,
    admission: Mutex<()>,
}

impl std::fmt::Debug for Limiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Limiter").field("rps", &self.rps).finish_non_exhaustive()
    }
}

impl Limiter {
    /// A budget of `rps` requests per second, bursting up to `rps`.
    pub fn per_second(rps: u32) -> Result<Self, RateLimitError> {
        let rps = NonZeroU32::new(rps).ok_or(RateLimitError::ZeroRate)?;
        Ok(Self {
            rps,
            limiter: RateLimiter::direct(Quota::per_second(rps)),
            admission: Mutex::new(()),
        })
    }

    pub fn rps(&self) -> u32 {
        self.rps.get()
    }

    /// Wait until one request fits in the budget.
    pub async fn acquire(&self) {
        let _turn = self.admission.lock().await;
        if self.limiter.check().is_err() {
            trace!(rps = self.rps.get(), "rate budget exhausted, waiting");
            self.limiter.until_ready().await;
        }
    }
}

/// Decorates a [`CmsApi`] so every call first takes a slot from the budget.
#[derive(Debug, Clone)]
pub struct RateLimited<A> {
    inner: A,
    limiter: Arc<Limiter>,
}

impl<A: CmsApi> RateLimited<A> {
    pub fn new(inner: A, rps: u32) -> Result<Self, RateLimitError> {
        Ok(Self::with_limiter(inner, Arc::new(Limiter::per_second(rps)?)))
    }

    /// Share an existing budget.
    pub fn with_limiter(inner: A, limiter: Arc<Limiter>) -> Self {
        Self { inner, limiter }
    }

    pub fn limiter(&self) -> &Arc<Limiter> {
        &self.limiter
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }
}

impl<A: CmsApi> CmsApi for RateLimited<A> {
    async fn describe_metric_last(
        &self,
        req: &DescribeMetricLastRequest,
    ) -> Result<DescribeMetricLastResponse, ApiError> {
        self.limiter.acquire().await;
        self.inner.describe_metric_last(req).await
    }

    async fn describe_metric_meta_list(
        &self,
        req: &DescribeMetricMetaListRequest,
    ) -> Result<DescribeMetricMetaListResponse, ApiError> {
        self.limiter.acquire().await;
        self.inner.describe_metric_meta_list(req).await
    }
}
