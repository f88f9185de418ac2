//! Exposed samples and the sink they are emitted into.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::trace;

/// Label carrying the account identifier.
pub const ACCOUNT_LABEL: &str = "cloudID";

/// Owning application and team taken from a matching instance claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ownership {
    pub app: String,
    pub team: String,
}

/// One labeled gauge value, built fresh per scrape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub namespace: String,
    /// Metric name as configured, e.g. `CPUUtilization`.
    pub metric: String,
    /// Family help text.
    pub help: String,
    /// Dynamic label names, sorted.
    pub label_names: Vec<String>,
    /// Values paired positionally with `label_names`.
    pub label_values: Vec<String>,
    pub account: String,
    pub owner: Option<Ownership>,
    pub value: f64,
}

impl Sample {
    /// All label pairs in exposition order: dynamic labels, account, then
    /// app and team when owned.
    pub fn labels(&self) -> Vec<(&str, &str)> {
        let mut out: Vec<(&str, &str)> = self
            .label_names
            .iter()
            .map(String::as_str)
            .zip(self.label_values.iter().map(String::as_str))
            .collect();
        out.push((ACCOUNT_LABEL, &self.account));
        if let Some(owner) = &self.owner {
            out.push(("app", &owner.app));
            out.push(("team", &owner.team));
        }
        out
    }
}

/// Receives samples as a collection produces them.
///
/// Accepting never fails from the producer's point of view; a sink that
/// can no longer deliver drops the sample.
pub trait SampleSink {
    fn accept(&mut self, sample: Sample);
}

impl SampleSink for Vec<Sample> {
    fn accept(&mut self, sample: Sample) {
        self.push(sample);
    }
}

impl SampleSink for mpsc::UnboundedSender<Sample> {
    fn accept(&mut self, sample: Sample) {
        if self.send(sample).is_err() {
            trace!("sample receiver dropped");
        }
    }
}
