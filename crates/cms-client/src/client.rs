//! Metric retrieval client — the unit of work per cloud account.
//!
//! Fetches datapoints for one metric, filters them against the metric's
//! instance claims and emits labeled samples. Per-metric failures are
//! logged and swallowed here so one broken metric never aborts the rest of
//! a scrape; discovery failures propagate.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{debug, error, warn};

use cms_config::{Credential, MetricSpec};

use crate::api::{
    CmsApi, DEFAULT_READ_TIMEOUT, DescribeMetricLastRequest, DescribeMetricMetaListRequest, Resource,
};
use crate::catalog::NamespaceCatalog;
use crate::datapoint::Datapoint;
use crate::error::{ApiError, CollectError};
use crate::http::HttpCmsClient;
use crate::ratelimit::RateLimited;
use crate::sample::{Ownership, Sample, SampleSink};

/// The production client: signed HTTPS behind a per-account rate limit.
pub type CloudMetricClient = MetricClient<RateLimited<HttpCmsClient>>;

/// Retrieval client bound to one account.
#[derive(Debug)]
pub struct MetricClient<A> {
    account: String,
    api: A,
    catalog: NamespaceCatalog,
    read_timeout: Duration,
}

impl CloudMetricClient {
    /// Build the HTTPS client for `credential` with a budget of `rps`.
    pub fn connect(
        account: &str,
        credential: &Credential,
        rps: u32,
        catalog: NamespaceCatalog,
    ) -> Result<Self, CollectError> {
        let http = HttpCmsClient::new(credential).map_err(CollectError::Retrieval)?;
        let api = RateLimited::new(http, rps).map_err(|e| CollectError::Config(e.to_string()))?;
        Ok(Self::new(account, api, catalog))
    }
}

impl<A: CmsApi> MetricClient<A> {
    pub fn new(account: &str, api: A, catalog: NamespaceCatalog) -> Self {
        Self {
            account: account.to_string(),
            api,
            catalog,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn catalog(&self) -> &NamespaceCatalog {
        &self.catalog
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Latest datapoints for one metric.
    pub async fn retrieve(
        &self,
        namespace: &str,
        metric_name: &str,
        period: &str,
    ) -> Result<Vec<Datapoint>, CollectError> {
        let mut req = DescribeMetricLastRequest::new(namespace, metric_name, period);
        req.read_timeout = self.read_timeout;

        let resp = self
            .api
            .describe_metric_last(&req)
            .await
            .map_err(CollectError::Retrieval)?;

        if resp.datapoints.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&resp.datapoints).map_err(|source| {
            debug!(content = %resp.raw, error = %source, "undecodable datapoints");
            CollectError::Decode {
                body: resp.raw.clone(),
                source,
            }
        })
    }

    /// Retrieve one metric and emit its samples into `sink`.
    ///
    /// Returns the number of samples emitted. Never fails: configuration
    /// and retrieval problems are logged and produce no samples.
    pub async fn collect<S>(&self, namespace: &str, metric: &MetricSpec, sink: &mut S) -> usize
    where
        S: SampleSink + Send + ?Sized,
    {
        if metric.name.is_empty() {
            warn!(account = %self.account, %namespace, "metric name must be set");
            return 0;
        }

        let datapoints = match self.retrieve(namespace, &metric.name, &metric.period).await {
            Ok(dps) => dps,
            Err(e) => {
                error!(
                    account = %self.account,
                    %namespace,
                    metric = %metric.name,
                    error = %e,
                    "failed to retrieve datapoints"
                );
                return 0;
            }
        };

        let help = metric.help(namespace);
        let mut emitted = 0;
        let mut mismatched = 0;
        let mut emit = |dp: &Datapoint, owner: Option<Ownership>| {
            let label_names = dp.labels();
            let label_values = dp.values(&metric.dimensions);
            if label_names.len() != label_values.len() {
                mismatched += 1;
                return;
            }
            sink.accept(Sample {
                namespace: namespace.to_string(),
                metric: metric.name.clone(),
                help: help.clone(),
                label_names,
                label_values,
                account: self.account.clone(),
                owner,
                value: dp.get(&metric.measure),
            });
            emitted += 1;
        };

        if !metric.has_claims() {
            warn!(
                metric = %metric.name,
                %namespace,
                "no instance claims configured, exposing every instance; set \"spec\" to restrict output"
            );
            for dp in &datapoints {
                emit(dp, None);
            }
        } else {
            for dp in &datapoints {
                let Some(instance_id) = dp.instance_id() else {
                    continue;
                };
                for claim in metric.spec.claim.iter().filter(|c| c.covers(instance_id)) {
                    emit(
                        dp,
                        Some(Ownership {
                            app: claim.app.clone(),
                            team: claim.team.clone(),
                        }),
                    );
                }
            }
        }

        if mismatched > 0 {
            warn!(
                account = %self.account,
                %namespace,
                metric = %metric.name,
                dimensions = ?metric.dimensions,
                skipped = mismatched,
                "datapoint labels do not match configured dimensions"
            );
        }

        debug!(
            account = %self.account,
            %namespace,
            metric = %metric.name,
            datapoints = datapoints.len(),
            samples = emitted,
            "metric collected"
        );
        emitted
    }

    /// Metric resource descriptors for each requested namespace.
    ///
    /// Namespaces go through [`NamespaceCatalog::filter`] first. The first
    /// failing namespace aborts the whole call.
    pub async fn describe_metric_meta_list<S: AsRef<str>>(
        &self,
        namespaces: &[S],
    ) -> Result<BTreeMap<String, Vec<Resource>>, CollectError> {
        let mut out = BTreeMap::new();
        for namespace in self.catalog.filter(namespaces) {
            let mut req = DescribeMetricMetaListRequest::new(&namespace);
            req.read_timeout = self.read_timeout;

            let resp = match self.api.describe_metric_meta_list(&req).await {
                Ok(resp) => resp,
                Err(source) => return Err(discovery_error(namespace, source)),
            };
            debug!(account = %self.account, %namespace, content = %resp.raw, "metric meta listed");
            out.insert(namespace, resp.resources.resource);
        }
        Ok(out)
    }
}

fn discovery_error(namespace: String, source: ApiError) -> CollectError {
    CollectError::Discovery { namespace, source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{DescribeMetricLastResponse, DescribeMetricMetaListResponse, Resources};
    use cms_config::Claim;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing::Level;
    use tracing_subscriber::Registry;
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    /// Scripted API: datapoint payloads per metric, failures per namespace.
    #[derive(Default)]
    struct FakeApi {
        payloads: BTreeMap<String, String>,
        failing_metrics: Vec<String>,
        failing_namespaces: Vec<String>,
        last_requests: Mutex<Vec<DescribeMetricLastRequest>>,
        meta_requests: Mutex<Vec<DescribeMetricMetaListRequest>>,
    }

    impl FakeApi {
        fn with_payload(mut self, metric: &str, payload: &str) -> Self {
            self.payloads.insert(metric.to_string(), payload.to_string());
            self
        }
    }

    impl CmsApi for FakeApi {
        async fn describe_metric_last(
            &self,
            req: &DescribeMetricLastRequest,
        ) -> Result<DescribeMetricLastResponse, ApiError> {
            self.last_requests.lock().unwrap().push(req.clone());
            if self.failing_metrics.contains(&req.metric_name) {
                return Err(ApiError::Transport("connection reset".into()));
            }
            let datapoints = self.payloads.get(&req.metric_name).cloned().unwrap_or_default();
            Ok(DescribeMetricLastResponse {
                code: "200".into(),
                raw: format!("{{\"Datapoints\":{datapoints:?}}}"),
                datapoints,
                ..Default::default()
            })
        }

        async fn describe_metric_meta_list(
            &self,
            req: &DescribeMetricMetaListRequest,
        ) -> Result<DescribeMetricMetaListResponse, ApiError> {
            self.meta_requests.lock().unwrap().push(req.clone());
            if self.failing_namespaces.contains(&req.namespace) {
                return Err(ApiError::Api {
                    code: "403".into(),
                    message: "denied".into(),
                    request_id: "r".into(),
                });
            }
            Ok(DescribeMetricMetaListResponse {
                resources: Resources {
                    resource: vec![Resource {
                        metric_name: "CPUUtilization".into(),
                        namespace: req.namespace.clone(),
                        ..Default::default()
                    }],
                },
                ..Default::default()
            })
        }
    }

    /// Counts events at or above a level.
    #[derive(Clone)]
    struct CountLayer {
        level: Level,
        count: Arc<AtomicUsize>,
    }

    impl<S: tracing::Subscriber> Layer<S> for CountLayer {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == self.level {
                self.count.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn count_events(level: Level) -> (Arc<AtomicUsize>, tracing::subscriber::DefaultGuard) {
        let count = Arc::new(AtomicUsize::new(0));
        let layer = CountLayer {
            level,
            count: count.clone(),
        };
        let guard = tracing::subscriber::set_default(Registry::default().with(layer));
        (count, guard)
    }

    const ONE_I1: &str = r#"[{"instanceId":"i-1","Average":42.0,"timestamp":1000}]"#;
    const I1_AND_I2: &str = r#"[
        {"instanceId":"i-1","Average":42.0,"timestamp":1000},
        {"instanceId":"i-2","Average":7.5,"timestamp":1000}
    ]"#;

    fn client(api: FakeApi) -> MetricClient<FakeApi> {
        MetricClient::new("prod", api, NamespaceCatalog::builtin())
    }

    fn cpu() -> MetricSpec {
        MetricSpec::new("CPUUtilization", "Average", &["instanceId"])
    }

    #[tokio::test]
    async fn unclaimed_metric_emits_every_datapoint() {
        let c = client(FakeApi::default().with_payload("CPUUtilization", ONE_I1));
        let mut out = Vec::new();
        let n = c.collect("acs_ecs_dashboard", &cpu(), &mut out).await;

        assert_eq!(n, 1);
        let s = &out[0];
        assert_eq!(s.value, 42.0);
        assert_eq!(s.label_names, vec!["instanceId"]);
        assert_eq!(s.label_values, vec!["i-1"]);
        assert_eq!(s.account, "prod");
        assert_eq!(s.owner, None);
        assert_eq!(s.namespace, "acs_ecs_dashboard");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn unclaimed_metric_warns_once_per_collect() {
        let c = client(FakeApi::default().with_payload("CPUUtilization", I1_AND_I2));
        let (warnings, _guard) = count_events(Level::WARN);
        let mut out = Vec::new();
        c.collect("acs_ecs_dashboard", &cpu(), &mut out).await;
        assert_eq!(out.len(), 2);
        assert_eq!(warnings.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn claimed_metric_filters_and_labels() {
        let c = client(FakeApi::default().with_payload("CPUUtilization", I1_AND_I2));
        let metric = cpu().with_claims(vec![Claim::new(&["i-1"], "web", "infra")]);
        let mut out = Vec::new();
        c.collect("acs_ecs_dashboard", &metric, &mut out).await;

        assert_eq!(out.len(), 1);
        let s = &out[0];
        assert_eq!(s.label_values, vec!["i-1"]);
        assert_eq!(
            s.owner,
            Some(Ownership {
                app: "web".into(),
                team: "infra".into()
            })
        );
        assert_eq!(
            s.labels(),
            vec![("instanceId", "i-1"), ("cloudID", "prod"), ("app", "web"), ("team", "infra")]
        );
    }

    #[tokio::test]
    async fn datapoint_matching_several_claims_fans_out() {
        let c = client(FakeApi::default().with_payload("CPUUtilization", I1_AND_I2));
        let metric = cpu().with_claims(vec![
            Claim::new(&["i-1", "i-2"], "web", "infra"),
            Claim::new(&["i-1"], "batch", "data"),
            Claim::new(&["i-9"], "idle", "none"),
        ]);
        let mut out = Vec::new();
        c.collect("acs_ecs_dashboard", &metric, &mut out).await;

        // i-1 matches two claims, i-2 one; API order is preserved.
        let owners: Vec<(&str, &str)> = out
            .iter()
            .map(|s| {
                let o = s.owner.as_ref().unwrap();
                (s.label_values[0].as_str(), o.app.as_str())
            })
            .collect();
        assert_eq!(owners, vec![("i-1", "web"), ("i-1", "batch"), ("i-2", "web")]);
    }

    #[tokio::test]
    async fn unmatched_or_untyped_instance_is_dropped() {
        let payload = r#"[
            {"instanceId":"i-3","Average":1.0},
            {"instanceId":42,"Average":2.0},
            {"Average":3.0}
        ]"#;
        let c = client(FakeApi::default().with_payload("CPUUtilization", payload));
        let metric = cpu().with_claims(vec![Claim::new(&["i-1"], "web", "infra")]);
        let mut out = Vec::new();
        assert_eq!(c.collect("acs_ecs_dashboard", &metric, &mut out).await, 0);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn missing_measure_yields_zero() {
        let payload = r#"[{"instanceId":"i-1","Maximum":9.0}]"#;
        let c = client(FakeApi::default().with_payload("CPUUtilization", payload));
        let mut out = Vec::new();
        c.collect("acs_ecs_dashboard", &cpu(), &mut out).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].value, 0.0);
    }

    #[tokio::test]
    async fn empty_name_is_skipped_without_calling_api() {
        let c = client(FakeApi::default());
        let mut metric = cpu();
        metric.name.clear();
        let mut out = Vec::new();
        assert_eq!(c.collect("acs_ecs_dashboard", &metric, &mut out).await, 0);
        assert!(c.api().last_requests.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn retrieval_failure_logs_one_error_and_emits_nothing() {
        let api = FakeApi {
            failing_metrics: vec!["CPUUtilization".into()],
            ..Default::default()
        };
        let c = client(api);
        let (errors, _guard) = count_events(Level::ERROR);
        let mut out = Vec::new();
        assert_eq!(c.collect("acs_ecs_dashboard", &cpu(), &mut out).await, 0);
        assert!(out.is_empty());
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn decode_failure_keeps_raw_body() {
        let c = client(FakeApi::default().with_payload("CPUUtilization", "[{not json"));
        let err = c
            .retrieve("acs_ecs_dashboard", "CPUUtilization", "60")
            .await
            .unwrap_err();
        match err {
            CollectError::Decode { body, .. } => assert!(body.contains("not json")),
            other => panic!("expected decode error, got {other:?}"),
        }

        let mut out = Vec::new();
        assert_eq!(c.collect("acs_ecs_dashboard", &cpu(), &mut out).await, 0);
    }

    #[tokio::test]
    async fn retrieve_passes_period_and_timeout() {
        let c = client(FakeApi::default().with_payload("CPUUtilization", "[]"))
            .with_read_timeout(Duration::from_secs(5));
        let dps = c.retrieve("acs_ecs_dashboard", "CPUUtilization", "300").await.unwrap();
        assert!(dps.is_empty());

        let reqs = c.api().last_requests.lock().unwrap();
        assert_eq!(reqs[0].period, "300");
        assert_eq!(reqs[0].read_timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn empty_payload_is_no_data() {
        let c = client(FakeApi::default());
        assert!(c.retrieve("acs_ecs_dashboard", "CPUUtilization", "60").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn dimension_mismatch_skips_datapoint() {
        let payload = r#"[
            {"instanceId":"i-1","userId":"u","Average":1.0},
            {"instanceId":"i-2","Average":2.0}
        ]"#;
        let c = client(FakeApi::default().with_payload("CPUUtilization", payload));
        let mut out = Vec::new();
        c.collect("acs_ecs_dashboard", &cpu(), &mut out).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].label_values, vec!["i-2"]);
    }

    #[tokio::test]
    async fn describe_meta_all_namespaces() {
        let c = client(FakeApi::default());
        let none: [&str; 0] = [];
        let all = c.describe_metric_meta_list(&none).await.unwrap();
        assert_eq!(all.len(), c.catalog().len());

        let again = c.describe_metric_meta_list(&["all"]).await.unwrap();
        assert_eq!(all, again);

        let reqs = c.api().meta_requests.lock().unwrap();
        assert!(reqs.iter().all(|r| r.page_size == 100));
    }

    #[tokio::test]
    async fn describe_meta_filters_unknown() {
        let c = client(FakeApi::default());
        let got = c
            .describe_metric_meta_list(&["acs_ecs_dashboard", "unknown_ns"])
            .await
            .unwrap();
        assert_eq!(got.keys().collect::<Vec<_>>(), vec!["acs_ecs_dashboard"]);
        assert_eq!(got["acs_ecs_dashboard"][0].metric_name, "CPUUtilization");
    }

    #[tokio::test]
    async fn describe_meta_aborts_on_first_failure() {
        let api = FakeApi {
            failing_namespaces: vec!["acs_kafka".into()],
            ..Default::default()
        };
        let c = client(api);
        let err = c
            .describe_metric_meta_list(&["acs_ecs_dashboard", "acs_kafka", "waf"])
            .await
            .unwrap_err();
        match err {
            CollectError::Discovery { namespace, .. } => assert_eq!(namespace, "acs_kafka"),
            other => panic!("expected discovery error, got {other:?}"),
        }
        // waf is never asked for.
        assert_eq!(c.api().meta_requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn channel_sink_receives_samples() {
        let c = client(FakeApi::default().with_payload("CPUUtilization", I1_AND_I2));
        let (mut tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        c.collect("acs_ecs_dashboard", &cpu(), &mut tx).await;
        drop(tx);
        let mut got = Vec::new();
        while let Some(s) = rx.recv().await {
            got.push(s.label_values[0].clone());
        }
        assert_eq!(got, vec!["i-1", "i-2"]);
    }
}
