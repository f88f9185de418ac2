//! Prometheus text exposition format.
//!
//! Renders scraped samples into the Prometheus text exposition format
//! (version 0.0.4) for scraping by a Prometheus server or compatible agent.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

use tracing::warn;

use cms_client::Sample;
use cms_config::config::fq_name;

use crate::collector::ScrapeStats;

/// Content type of the rendered exposition.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Render samples as GAUGE families named `{prefix}_{namespace}_{metric}`.
///
/// Families are emitted in name order; samples within a family keep the
/// order they were collected in. A series whose label set was already
/// written is dropped, as is a label whose sanitized name repeats one
/// earlier in the same series.
pub fn render_prometheus(prefix: &str, samples: &[Sample]) -> String {
    let mut families: BTreeMap<String, (&str, Vec<&Sample>)> = BTreeMap::new();
    for s in samples {
        families
            .entry(fq_name(prefix, &s.namespace, &s.metric))
            .or_insert_with(|| (s.help.as_str(), Vec::new()))
            .1
            .push(s);
    }

    let mut out = String::new();
    for (name, (help, members)) in &families {
        let _ = writeln!(out, "# HELP {name} {}", escape_help(help));
        let _ = writeln!(out, "# TYPE {name} gauge");

        let mut seen = BTreeSet::new();
        let mut duplicates = 0usize;
        let mut collisions = 0usize;
        for s in members {
            let labels = render_labels(s, &mut collisions);
            if !seen.insert(labels.clone()) {
                duplicates += 1;
                continue;
            }
            let _ = writeln!(out, "{name}{{{labels}}} {}", format_value(s.value));
        }

        if duplicates > 0 || collisions > 0 {
            warn!(
                family = %name,
                duplicates,
                collisions,
                "dropped series or labels that render identically"
            );
        }
    }
    out
}

/// `k="v",...` for one sample, first occurrence of each label name wins.
fn render_labels(s: &Sample, collisions: &mut usize) -> String {
    let mut names = BTreeSet::new();
    let mut parts = Vec::new();
    for (k, v) in s.labels() {
        let k = sanitize_label(k);
        if !names.insert(k.clone()) {
            *collisions += 1;
            continue;
        }
        parts.push(format!("{k}=\"{}\"", escape_value(v)));
    }
    parts.join(",")
}

/// Exporter self-metrics for the most recent scrape.
pub fn render_scrape_stats(prefix: &str, stats: &ScrapeStats) -> String {
    let duration = fq_name(prefix, "", "scrape_duration_seconds");
    let samples = fq_name(prefix, "", "scrape_samples");
    let tasks = fq_name(prefix, "", "scrape_failed_tasks");

    let mut out = String::new();
    let _ = writeln!(out, "# HELP {duration} Duration of the last scrape in seconds.");
    let _ = writeln!(out, "# TYPE {duration} gauge");
    let _ = writeln!(out, "{duration} {:.6}", stats.duration.as_secs_f64());
    let _ = writeln!(out, "# HELP {samples} Samples produced by the last scrape.");
    let _ = writeln!(out, "# TYPE {samples} gauge");
    let _ = writeln!(out, "{samples} {}", stats.samples);
    let _ = writeln!(out, "# HELP {tasks} Collection tasks that panicked during the last scrape.");
    let _ = writeln!(out, "# TYPE {tasks} gauge");
    let _ = writeln!(out, "{tasks} {}", stats.failed_tasks);
    out
}

fn format_value(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "+Inf" } else { "-Inf" }.to_string()
    } else {
        v.to_string()
    }
}

fn escape_value(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn escape_help(v: &str) -> String {
    v.replace('\\', "\\\\").replace('\n', "\\n")
}

fn sanitize_label(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use cms_client::Ownership;
    use std::time::Duration;

    fn sample(metric: &str, instance: &str, value: f64, owner: Option<(&str, &str)>) -> Sample {
        Sample {
            namespace: "acs_ecs_dashboard".into(),
            metric: metric.into(),
            help: format!("{metric} help"),
            label_names: vec!["instanceId".into()],
            label_values: vec![instance.into()],
            account: "prod".into(),
            owner: owner.map(|(app, team)| Ownership {
                app: app.into(),
                team: team.into(),
            }),
            value,
        }
    }

    #[test]
    fn render_empty() {
        assert_eq!(render_prometheus("cloudmonitor", &[]), "");
    }

    #[test]
    fn render_single_sample() {
        let output = render_prometheus("cloudmonitor", &[sample("CPUUtilization", "i-1", 42.0, None)]);
        assert!(output.contains("# HELP cloudmonitor_acs_ecs_dashboard_cpu_utilization CPUUtilization help\n"));
        assert!(output.contains("# TYPE cloudmonitor_acs_ecs_dashboard_cpu_utilization gauge\n"));
        assert!(output.contains(
            "cloudmonitor_acs_ecs_dashboard_cpu_utilization{instanceId=\"i-1\",cloudID=\"prod\"} 42\n"
        ));
    }

    #[test]
    fn render_owned_sample() {
        let output = render_prometheus(
            "cloudmonitor",
            &[sample("CPUUtilization", "i-1", 7.5, Some(("web", "infra")))],
        );
        assert!(output.contains(
            "{instanceId=\"i-1\",cloudID=\"prod\",app=\"web\",team=\"infra\"} 7.5"
        ));
    }

    #[test]
    fn families_are_grouped() {
        let samples = vec![
            sample("CPUUtilization", "i-1", 1.0, None),
            sample("memory_usedutilization", "i-1", 2.0, None),
            sample("CPUUtilization", "i-2", 3.0, None),
        ];
        let output = render_prometheus("cloudmonitor", &samples);
        assert_eq!(output.matches("# TYPE").count(), 2);

        let lines: Vec<&str> = output.lines().filter(|l| !l.starts_with('#')).collect();
        assert!(lines[0].contains("i-1") && lines[0].contains("cpu_utilization"));
        assert!(lines[1].contains("i-2") && lines[1].contains("cpu_utilization"));
        assert!(lines[2].contains("memory_usedutilization"));
    }

    #[test]
    fn label_values_are_escaped() {
        let s = sample("CPUUtilization", "a\"b\\c\nd", 1.0, None);
        let output = render_prometheus("", &[s]);
        assert!(output.contains(r#"instanceId="a\"b\\c\nd""#));
    }

    #[test]
    fn identical_series_render_once() {
        // Two claims with the same owner covering one instance.
        let samples = vec![
            sample("CPUUtilization", "i-1", 42.0, Some(("web", "infra"))),
            sample("CPUUtilization", "i-1", 42.0, Some(("web", "infra"))),
            sample("CPUUtilization", "i-1", 42.0, Some(("batch", "data"))),
        ];
        let output = render_prometheus("cloudmonitor", &samples);
        let series: Vec<&str> = output.lines().filter(|l| !l.starts_with('#')).collect();
        assert_eq!(series.len(), 2);
        assert!(series[0].contains("app=\"web\""));
        assert!(series[1].contains("app=\"batch\""));
    }

    #[test]
    fn colliding_label_names_keep_first() {
        let mut s = sample("CPUUtilization", "i-1", 1.0, None);
        s.label_names = vec!["instance-id".into(), "instance_id".into()];
        s.label_values = vec!["a".into(), "b".into()];
        let output = render_prometheus("cloudmonitor", &[s]);
        assert!(output.contains("{instance_id=\"a\",cloudID=\"prod\"} 1\n"));
        assert_eq!(output.matches("instance_id=").count(), 1);
    }

    #[test]
    fn special_values() {
        assert_eq!(format_value(f64::NAN), "NaN");
        assert_eq!(format_value(f64::INFINITY), "+Inf");
        assert_eq!(format_value(f64::NEG_INFINITY), "-Inf");
        assert_eq!(format_value(0.25), "0.25");
    }

    #[test]
    fn label_names_are_sanitized() {
        assert_eq!(sanitize_label("instance-id"), "instance_id");
        assert_eq!(sanitize_label("9lives"), "_9lives");
    }

    #[test]
    fn render_format_is_prometheus_compatible() {
        let output = render_prometheus("x", &[sample("CPUUtilization", "i-1", 1.0, None)]);
        for line in output.lines() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            assert!(
                line.contains('{') && line.contains('}'),
                "line should have labels: {line}"
            );
        }
    }

    #[test]
    fn scrape_stats() {
        let stats = ScrapeStats {
            duration: Duration::from_millis(1500),
            samples: 12,
            failed_tasks: 0,
        };
        let output = render_scrape_stats("cloudmonitor", &stats);
        assert!(output.contains("cloudmonitor_scrape_duration_seconds 1.500000\n"));
        assert!(output.contains("cloudmonitor_scrape_samples 12\n"));
        assert!(output.contains("cloudmonitor_scrape_failed_tasks 0\n"));
    }
}
