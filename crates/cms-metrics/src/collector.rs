//! Exporter — runs one scrape across every account and metric.
//!
//! Each `(account, namespace, metric)` collection runs as its own task.
//! The only thing they share is their account's rate-limited transport.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use cms_client::{CloudMetricClient, CmsApi, CollectError, MetricClient, NamespaceCatalog, Sample};
use cms_config::{Config, MetricSpec};

use crate::prometheus::{render_prometheus, render_scrape_stats};

/// Outcome of the most recent scrape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrapeStats {
    pub duration: Duration,
    pub samples: usize,
    /// Collection tasks that panicked.
    pub failed_tasks: usize,
}

/// Scrapes every configured metric for every account.
pub struct Exporter<A> {
    clients: BTreeMap<String, Arc<MetricClient<A>>>,
    metrics: Arc<BTreeMap<String, Vec<MetricSpec>>>,
    catalog: NamespaceCatalog,
    prefix: String,
    last: Mutex<ScrapeStats>,
}

impl Exporter<cms_client::RateLimited<cms_client::HttpCmsClient>> {
    /// One HTTPS client per configured account, each with `rps` budget.
    pub fn from_config(
        config: &Config,
        rps: u32,
        catalog: NamespaceCatalog,
        prefix: &str,
    ) -> Result<Self, CollectError> {
        let mut clients = Vec::with_capacity(config.credentials.len());
        for (account, credential) in &config.credentials {
            let client = CloudMetricClient::connect(account, credential, rps, catalog.clone())?;
            info!(%account, region = %credential.region, rps, "metric client ready");
            clients.push(client);
        }
        Ok(Self::new(clients, config.metrics.clone(), catalog, prefix))
    }
}

impl<A: CmsApi + 'static> Exporter<A> {
    pub fn new(
        clients: Vec<MetricClient<A>>,
        metrics: BTreeMap<String, Vec<MetricSpec>>,
        catalog: NamespaceCatalog,
        prefix: &str,
    ) -> Self {
        for namespace in metrics.keys() {
            if !catalog.contains(namespace) {
                warn!(%namespace, "namespace is not in the catalog; collecting anyway");
            }
        }
        Self {
            clients: clients
                .into_iter()
                .map(|c| (c.account().to_string(), Arc::new(c)))
                .collect(),
            metrics: Arc::new(metrics),
            catalog,
            prefix: prefix.to_string(),
            last: Mutex::new(ScrapeStats::default()),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn catalog(&self) -> &NamespaceCatalog {
        &self.catalog
    }

    /// Retrieval client for one account.
    pub fn client(&self, account: &str) -> Option<&Arc<MetricClient<A>>> {
        self.clients.get(account)
    }

    pub fn accounts(&self) -> Vec<String> {
        self.clients.keys().cloned().collect()
    }

    /// Stats of the last completed scrape.
    pub fn last_scrape(&self) -> ScrapeStats {
        self.last.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Collect every metric for every account concurrently.
    ///
    /// Sample order across metrics is unspecified.
    pub async fn scrape(&self) -> Vec<Sample> {
        let start = Instant::now();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut tasks = JoinSet::new();

        for client in self.clients.values() {
            for (namespace, metrics) in self.metrics.iter() {
                for metric in metrics {
                    let client = client.clone();
                    let namespace = namespace.clone();
                    let metric = metric.clone();
                    let mut tx = tx.clone();
                    tasks.spawn(async move { client.collect(&namespace, &metric, &mut tx).await });
                }
            }
        }
        drop(tx);

        let mut failed_tasks = 0;
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "collection task failed");
                failed_tasks += 1;
            }
        }

        let mut samples = Vec::new();
        while let Some(sample) = rx.recv().await {
            samples.push(sample);
        }

        let stats = ScrapeStats {
            duration: start.elapsed(),
            samples: samples.len(),
            failed_tasks,
        };
        debug!(
            accounts = self.clients.len(),
            samples = stats.samples,
            elapsed_ms = stats.duration.as_millis() as u64,
            "scrape finished"
        );
        if let Ok(mut last) = self.last.lock() {
            *last = stats;
        }
        samples
    }

    /// Scrape and render the full exposition, self-metrics included.
    pub async fn render(&self) -> String {
        let samples = self.scrape().await;
        let mut out = render_prometheus(&self.prefix, &samples);
        out.push_str(&render_scrape_stats(&self.prefix, &self.last_scrape()));
        out
    }
}
