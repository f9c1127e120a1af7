//! Prometheus text exposition helpers.

use std::fmt::Write;

/// Sanitize a metric name to be Prometheus-compatible.
///
/// Prometheus metric names must match `[a-zA-Z_:][a-zA-Z0-9_:]*`.
/// This function:
/// - Replaces invalid characters with underscores
/// - Ensures the name starts with a letter or underscore
/// - Collapses multiple underscores into one
pub fn sanitize_metric_name(name: &str) -> String {
    let mut result = String::with_capacity(name.len() + 1);
    let mut last_was_underscore = false;

    if name.starts_with(|c: char| c.is_ascii_digit()) {
        result.push('_');
        last_was_underscore = true;
    }

    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == ':' {
            result.push(c);
            last_was_underscore = false;
        } else if !last_was_underscore {
            result.push('_');
            last_was_underscore = true;
        }
    }

    while result.ends_with('_') {
        result.pop();
    }

    if result.is_empty() {
        result.push_str("unnamed");
    }

    result
}

/// Join a prefix and a metric suffix into a full metric name.
pub fn metric_name(prefix: &str, suffix: &str) -> String {
    if prefix.is_empty() {
        suffix.to_string()
    } else {
        format!("{}_{}", prefix, suffix)
    }
}

/// Prometheus metric type for the `# TYPE` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Format a floating point value for Prometheus.
///
/// Integral values keep their decimal point (`100.0`).
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else {
        format!("{:?}", value)
    }
}

/// Escape special characters in label values.
pub fn escape_label_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            _ => result.push(c),
        }
    }
    result
}

/// Escape a `# HELP` docstring.
fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

/// Format labels for Prometheus exposition format.
pub fn format_labels(labels: &[(&str, &str)]) -> String {
    if labels.is_empty() {
        return String::new();
    }

    let parts: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
        .collect();

    format!("{{{}}}", parts.join(","))
}

/// Write the `# HELP` and `# TYPE` header of a metric family.
pub fn write_header(out: &mut String, name: &str, metric_type: MetricType, help: &str) {
    writeln!(out, "# HELP {} {}", name, escape_help(help)).ok();
    writeln!(out, "# TYPE {} {}", name, metric_type.as_str()).ok();
}

/// Write one sample line.
pub fn write_sample(out: &mut String, name: &str, labels: &[(&str, &str)], value: &str) {
    writeln!(out, "{}{} {}", name, format_labels(labels), value).ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_metric_name_simple() {
        assert_eq!(sanitize_metric_name("stecagrid"), "stecagrid");
        assert_eq!(sanitize_metric_name("solar_roof"), "solar_roof");
    }

    #[test]
    fn test_sanitize_metric_name_special_chars() {
        assert_eq!(sanitize_metric_name("steca-grid.2000"), "steca_grid_2000");
        assert_eq!(sanitize_metric_name("pv/roof"), "pv_roof");
    }

    #[test]
    fn test_sanitize_metric_name_collapse_underscores() {
        assert_eq!(sanitize_metric_name("pv___roof"), "pv_roof");
        assert_eq!(sanitize_metric_name("a//b//c"), "a_b_c");
    }

    #[test]
    fn test_sanitize_metric_name_leading_number() {
        assert_eq!(sanitize_metric_name("2000"), "_2000");
    }

    #[test]
    fn test_sanitize_metric_name_empty() {
        assert_eq!(sanitize_metric_name(""), "unnamed");
        assert_eq!(sanitize_metric_name("///"), "unnamed");
    }

    #[test]
    fn test_metric_name() {
        assert_eq!(metric_name("stecagrid", "ac_power"), "stecagrid_ac_power");
        assert_eq!(metric_name("", "ac_power"), "ac_power");
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(232.8), "232.8");
        assert_eq!(format_value(50.131), "50.131");
        assert_eq!(format_value(100.0), "100.0");
        assert_eq!(format_value(-3.5), "-3.5");
        assert_eq!(format_value(f64::NAN), "NaN");
        assert_eq!(format_value(f64::INFINITY), "+Inf");
        assert_eq!(format_value(f64::NEG_INFINITY), "-Inf");
    }

    #[test]
    fn test_escape_label_value() {
        assert_eq!(escape_label_value(r#"a"b"#), r#"a\"b"#);
        assert_eq!(escape_label_value("a\\b"), "a\\\\b");
        assert_eq!(escape_label_value("a\nb"), "a\\nb");
    }

    #[test]
    fn test_format_labels() {
        assert_eq!(format_labels(&[]), "");
        assert_eq!(
            format_labels(&[("kind", "fetch"), ("name", "StecaGrid 2000")]),
            r#"{kind="fetch",name="StecaGrid 2000"}"#
        );
    }

    #[test]
    fn test_write_family() {
        let mut out = String::new();
        write_header(&mut out, "stecagrid_temp", MetricType::Gauge, "Temperature (°C)");
        write_sample(&mut out, "stecagrid_temp", &[], "41.5");

        assert_eq!(
            out,
            "# HELP stecagrid_temp Temperature (°C)\n# TYPE stecagrid_temp gauge\nstecagrid_temp 41.5\n"
        );
    }
}
