//! Exporter configuration parser.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{ConfigError, ConfigResult};

/// Region applied to credentials that do not name one.
pub const DEFAULT_REGION: &str = "cn-hangzhou";

/// Statistical period (seconds) applied to metrics that do not name one.
pub const DEFAULT_PERIOD: &str = "60";

/// Datapoint field read as the sample value when a metric does not name one.
pub const DEFAULT_MEASURE: &str = "Average";

/// Static key pair for one cloud account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(rename = "accessKey", default)]
    pub access_key: String,
    #[serde(rename = "accessKeySecret", default)]
    pub access_key_secret: String,
    #[serde(default)]
    pub region: String,
}

/// One metric to poll within a namespace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricSpec {
    /// Metric name as known to the monitoring service, e.g. `CPUUtilization`.
    pub name: String,
    /// Human readable description, used as the exposition HELP text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Statistical period in seconds, as a string (the API takes it verbatim).
    pub period: String,
    /// Datapoint field read as the sample value, e.g. `Average`.
    pub measure: String,
    /// Datapoint fields whose values become label values, in order.
    pub dimensions: Vec<String>,
    /// Instance claims restricting and labeling the output.
    pub spec: Spec,
}

/// Instance claims attached to a metric.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Spec {
    pub claim: Vec<Claim>,
}

/// Maps a set of instance identifiers to an owning application and team.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Claim {
    pub instance: Vec<String>,
    pub app: String,
    pub team: String,
}

/// Top-level exporter configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Account identifier → credential.
    pub credentials: BTreeMap<String, Credential>,
    /// Namespace → metrics polled in that namespace.
    pub metrics: BTreeMap<String, Vec<MetricSpec>>,
}

impl Config {
    /// Parse a YAML document. Defaults are not applied.
    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Read, parse and default a YAML config file.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml_str(&content)?;
        config.set_defaults();
        Ok(config)
    }

    /// Fill in the region, period and measure where they were left empty.
    pub fn set_defaults(&mut self) {
        for credential in self.credentials.values_mut() {
            if credential.region.is_empty() {
                credential.region = DEFAULT_REGION.to_string();
            }
        }
        for metric in self.metrics.values_mut().flatten() {
            metric.set_defaults();
        }
    }

    /// Non-fatal configuration problems worth reporting at startup.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.credentials.is_empty() {
            warnings.push("no credentials configured".to_string());
        }
        for (account, credential) in &self.credentials {
            if credential.access_key.is_empty() || credential.access_key_secret.is_empty() {
                warnings.push(format!("account {account}: access key pair is incomplete"));
            }
        }
        for (namespace, metrics) in &self.metrics {
            for (i, metric) in metrics.iter().enumerate() {
                if metric.name.is_empty() {
                    warnings.push(format!("{namespace}[{i}]: metric name must be set"));
                }
                for claim in &metric.spec.claim {
                    if claim.instance.is_empty() {
                        warnings.push(format!(
                            "{namespace}/{}: claim for app {:?} lists no instances",
                            metric.name, claim.app
                        ));
                    }
                }
            }
        }
        warnings
    }

    /// Total number of metric definitions across namespaces.
    pub fn metric_count(&self) -> usize {
        self.metrics.values().map(Vec::len).sum()
    }
}

impl MetricSpec {
    /// Convenience constructor used mostly by tests and tooling.
    pub fn new(name: &str, measure: &str, dimensions: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            description: None,
            period: DEFAULT_PERIOD.to_string(),
            measure: measure.to_string(),
            dimensions: dimensions.iter().map(|d| d.to_string()).collect(),
            spec: Spec::default(),
        }
    }

    /// Attach instance claims.
    pub fn with_claims(mut self, claim: Vec<Claim>) -> Self {
        self.spec = Spec { claim };
        self
    }

    pub fn set_defaults(&mut self) {
        if self.period.is_empty() {
            self.period = DEFAULT_PERIOD.to_string();
        }
        if self.measure.is_empty() {
            self.measure = DEFAULT_MEASURE.to_string();
        }
    }

    /// Whether output is restricted to claimed instances.
    pub fn has_claims(&self) -> bool {
        !self.spec.claim.is_empty()
    }

    /// Fully qualified exposition name: `{prefix}_{namespace}_{snake_case(name)}`.
    pub fn fq_name(&self, prefix: &str, namespace: &str) -> String {
        fq_name(prefix, namespace, &self.name)
    }

    /// Help text for the exposed family.
    pub fn help(&self, namespace: &str) -> String {
        match &self.description {
            Some(d) if !d.is_empty() => d.clone(),
            _ => format!("{} {} ({})", namespace, self.name, self.measure),
        }
    }
}

impl Claim {
    pub fn new(instances: &[&str], app: &str, team: &str) -> Self {
        Self {
            instance: instances.iter().map(|i| i.to_string()).collect(),
            app: app.to_string(),
            team: team.to_string(),
        }
    }

    /// Whether this claim lists the given instance.
    pub fn covers(&self, instance_id: &str) -> bool {
        self.instance.iter().any(|i| i == instance_id)
    }
}

/// Build a metric family name from its parts, skipping empty ones.
pub fn fq_name(prefix: &str, namespace: &str, name: &str) -> String {
    [sanitize(prefix), sanitize(namespace), snake_case(name)]
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// `CPUUtilization` → `cpu_utilization`, `InternetInRate` → `internet_in_rate`.
fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            let boundary = prev.is_ascii_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_ascii_uppercase() && next_lower);
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
        }
        out.push(c.to_ascii_lowercase());
    }
    sanitize(&out)
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
