//! Registry of supported monitoring namespaces.

use std::collections::BTreeMap;
use std::sync::Arc;

/// Namespaces the exporter knows how to poll, with a description of the
/// service behind each.
const BUILTIN: &[(&str, &str)] = &[
    ("acs_ecs_dashboard", "Elastic Compute Service (ECS)"),
    ("acs_containerservice_dashboard", "Container Service for Swarm"),
    ("acs_kubernetes", "Container Service for Kubernetes (ACK)"),
    ("acs_oss_dashboard", "Object Storage Service (OSS)"),
    ("acs_slb_dashboard", "Server Load Balancer (SLB)"),
    ("acs_vpc_eip", "Elastic IP addresses (EIPs)"),
    ("acs_nat_gateway", "NAT Gateway"),
    ("acs_anycast_eip", "Anycast Elastic IP address (EIP)"),
    ("acs_rds_dashboard", "ApsaraDB RDS"),
    ("acs_mongodb", "ApsaraDB for MongoDB"),
    ("acs_memcache", "ApsaraDB for Memcache"),
    ("acs_kvstore", "ApsaraDB for Redis"),
    ("acs_hitsdb", "Time Series Database (TSDB)"),
    ("acs_clickhouse", "ClickHouse"),
    ("acs_cds", "ApsaraDB for Cassandra"),
    ("waf", "Web Application Firewall (WAF)"),
    ("acs_elasticsearch", "Elasticsearch"),
    ("acs_mns_new", "queues of Message Service (MNS)"),
    ("acs_kafka", "Message Queue for Apache Kafka"),
    ("acs_amqp", "Alibaba Cloud Message Queue for AMQP instances"),
];

/// Wildcard accepted by [`NamespaceCatalog::filter`].
pub const ALL: &str = "all";

/// Immutable namespace → description table.
///
/// Cheap to clone; built once at startup and handed to whoever needs it.
#[derive(Debug, Clone)]
pub struct NamespaceCatalog {
    entries: Arc<BTreeMap<String, String>>,
}

impl NamespaceCatalog {
    /// The namespaces supported out of the box.
    pub fn builtin() -> Self {
        Self::from_entries(BUILTIN.iter().map(|(k, v)| (k.to_string(), v.to_string())))
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            entries: Arc::new(entries.into_iter().collect()),
        }
    }

    /// Every registered namespace with its description.
    pub fn all(&self) -> &BTreeMap<String, String> {
        &self.entries
    }

    /// Every registered namespace identifier.
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn contains(&self, namespace: &str) -> bool {
        self.entries.contains_key(namespace)
    }

    pub fn describe(&self, namespace: &str) -> Option<&str> {
        self.entries.get(namespace).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a caller-supplied namespace list.
    ///
    /// Empty input or `"all"` anywhere yields every namespace. Otherwise the
    /// registered entries are kept in request order, once each; unknown
    /// names are dropped without complaint.
    pub fn filter<S: AsRef<str>>(&self, requested: &[S]) -> Vec<String> {
        if requested.is_empty() || requested.iter().any(|ns| ns.as_ref() == ALL) {
            return self.names();
        }

        let mut out: Vec<String> = Vec::with_capacity(requested.len());
        for ns in requested.iter().map(AsRef::as_ref) {
            if self.contains(ns) && !out.iter().any(|seen| seen == ns) {
                out.push(ns.to_string());
            }
        }
        out
    }
}

impl Default for NamespaceCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_has_every_namespace() {
        let catalog = NamespaceCatalog::builtin();
        assert_eq!(catalog.len(), BUILTIN.len());
        assert_eq!(
            catalog.describe("acs_ecs_dashboard"),
            Some("Elastic Compute Service (ECS)")
        );
        assert!(catalog.contains("waf"));
        assert!(!catalog.contains("acs_nope"));
    }

    #[test]
    fn filter_empty_is_all() {
        let catalog = NamespaceCatalog::builtin();
        let none: [&str; 0] = [];
        assert_eq!(catalog.filter(&none), catalog.names());
        assert_eq!(catalog.filter(&["all"]), catalog.names());
    }

    #[test]
    fn filter_all_anywhere_wins() {
        let catalog = NamespaceCatalog::builtin();
        assert_eq!(catalog.filter(&["acs_kafka", "bogus", "all"]), catalog.names());
    }

    #[test]
    fn filter_drops_unknown() {
        let catalog = NamespaceCatalog::builtin();
        assert!(catalog.filter(&["unknown_ns"]).is_empty());
        assert_eq!(
            catalog.filter(&["acs_ecs_dashboard"]),
            vec!["acs_ecs_dashboard".to_string()]
        );
    }

    #[test]
    fn filter_keeps_request_order_without_duplicates() {
        let catalog = NamespaceCatalog::builtin();
        let got = catalog.filter(&["waf", "unknown", "acs_kafka", "waf"]);
        assert_eq!(got, vec!["waf".to_string(), "acs_kafka".to_string()]);
    }

    #[test]
    fn custom_catalog() {
        let catalog = NamespaceCatalog::from_entries([("ns_a".to_string(), "A".to_string())]);
        assert_eq!(catalog.filter(&["ns_a", "acs_ecs_dashboard"]), vec!["ns_a".to_string()]);
        assert_eq!(catalog.filter(&["all"]), vec!["ns_a".to_string()]);
    }
}
