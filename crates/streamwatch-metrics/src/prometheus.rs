//! Prometheus text exposition format.
//!
//! Renders the contents of a [`MetricLabelIndex`] for scraping by a
//! Prometheus server or compatible agent. Every series is a gauge.

use std::collections::BTreeMap;

use crate::index::MetricLabelIndex;
use crate::series::MetricSeries;

/// Render every series in `index`, grouped by metric name.
pub fn render_prometheus(index: &MetricLabelIndex) -> String {
    let mut by_name: BTreeMap<String, Vec<(MetricSeries, f64)>> = BTreeMap::new();
    for (series, value) in index.snapshot() {
        by_name
            .entry(series.name().to_string())
            .or_default()
            .push((series, value));
    }

    let mut out = String::new();
    for (name, samples) in by_name {
        let entity = samples[0].0.entity_type();
        out.push_str(&format!("# HELP {name} streamwatch {entity} metric.\n"));
        out.push_str(&format!("# TYPE {name} gauge\n"));
        for (series, value) in samples {
            let labels: Vec<String> = series
                .entity_type()
                .label_names()
                .iter()
                .zip(series.labels())
                .map(|(k, v)| format!("{k}=\"{}\"", escape_label(v)))
                .collect();
            out.push_str(&format!(
                "{name}{{{}}} {}\n",
                labels.join(","),
                format_value(value)
            ));
        }
    }
    out
}

fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn format_value(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "+Inf" } else { "-Inf" }.to_string()
    } else if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::EntityType;

    fn s(name: &str, entity_type: EntityType, labels: &[&str]) -> MetricSeries {
        MetricSeries::new(name, entity_type, labels.iter().map(|l| l.to_string()).collect()).unwrap()
    }

    #[test]
    fn render_empty() {
        assert_eq!(render_prometheus(&MetricLabelIndex::new()), "");
    }

    #[test]
    fn render_labels_by_entity_type() {
        let index = MetricLabelIndex::new();
        index.add(
            s("streamwatch_operator_ip_nTuplesProcessed", EntityType::OperatorInputPort, &["inst", "A", "Op1", "0"]),
            1500.0,
        );
        index.add(s("streamwatch_instance_available", EntityType::Instance, &["inst"]), 1.0);
        index.add(s("streamwatch_resource_load", EntityType::Resource, &["inst", "host1"]), 0.25);

        let output = render_prometheus(&index);
        assert!(output.contains("# TYPE streamwatch_operator_ip_nTuplesProcessed gauge"));
        assert!(output.contains(
            "streamwatch_operator_ip_nTuplesProcessed{instancename=\"inst\",jobname=\"A\",operatorname=\"Op1\",portindex=\"0\"} 1500"
        ));
        assert!(output.contains("streamwatch_instance_available{instancename=\"inst\"} 1"));
        assert!(output.contains("streamwatch_resource_load{instancename=\"inst\",resource=\"host1\"} 0.25"));
    }

    #[test]
    fn one_type_line_per_name() {
        let index = MetricLabelIndex::new();
        index.add(s("streamwatch_job_health", EntityType::Job, &["i", "A"]), 1.0);
        index.add(s("streamwatch_job_health", EntityType::Job, &["i", "B"]), 0.0);
        let output = render_prometheus(&index);
        assert_eq!(output.matches("# TYPE streamwatch_job_health gauge").count(), 1);
        assert_eq!(output.lines().filter(|l| !l.starts_with('#')).count(), 2);
    }

    #[test]
    fn label_values_are_escaped() {
        let index = MetricLabelIndex::new();
        index.add(s("m", EntityType::Job, &["i", "say \"hi\"\\"]), 2.5);
        let output = render_prometheus(&index);
        assert!(output.contains(r#"m{instancename="i",jobname="say \"hi\"\\"} 2.5"#));
    }

    #[test]
    fn special_values() {
        assert_eq!(format_value(f64::NAN), "NaN");
        assert_eq!(format_value(f64::INFINITY), "+Inf");
        assert_eq!(format_value(-3.0), "-3");
    }
}
