//! Metric recovery from the free-form console output of the training project.
//!
//! The external scripts print log text and a scikit-learn style
//! classification report rather than a structured document, so both parsers
//! here are best-effort line matchers. They never fail: lines that do not
//! match are ignored and numbers that do not parse fall back to zero (report
//! parser) or are left out (labelled parser).

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Headline metrics recovered from a training run. Unparsed values are 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TrainingMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
}

/// Metrics recovered from an evaluation run. Metrics that were not found are
/// omitted from the serialized form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EvaluationMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recall: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub f1_score: Option<f64>,
}

impl EvaluationMetrics {
    pub fn is_empty(&self) -> bool {
        self.accuracy.is_none()
            && self.precision.is_none()
            && self.recall.is_none()
            && self.f1_score.is_none()
    }
}

static LEADING_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?").expect("valid number pattern")
});

static ACCURACY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)accuracy[:\s]+([0-9.]+)").expect("valid accuracy pattern"));
static PRECISION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)precision[:\s]+([0-9.]+)").expect("valid precision pattern")
});
static RECALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)recall[:\s]+([0-9.]+)").expect("valid recall pattern"));
static F1: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)f1[:\s-]+([0-9.]+)").expect("valid f1 pattern"));

/// Parses the longest numeric prefix of `token`, the way a lenient
/// float reader would. Returns `None` for no digits or a non-finite value.
pub fn leading_number(token: &str) -> Option<f64> {
    let matched = LEADING_NUMBER.find(token.trim_start())?;
    matched
        .as_str()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

fn token_or_zero(parts: &[&str], index: usize) -> f64 {
    parts
        .get(index)
        .and_then(|t| leading_number(t))
        .unwrap_or(0.0)
}

/// Reads the `macro avg` and `accuracy` rows of a classification report.
///
/// ```text
///               precision    recall  f1-score   support
///    macro avg     0.9300    0.9100    0.9200       500
/// accuracy                             0.9500       500
/// ```
pub fn parse_classification_report(output: &str) -> TrainingMetrics {
    let mut metrics = TrainingMetrics::default();

    for line in output.lines() {
        let trimmed = line.trim();

        if line.contains("macro avg") {
            let parts: Vec<&str> = trimmed.split_whitespace().collect();
            if parts.len() >= 5 {
                metrics.precision = token_or_zero(&parts, 2);
                metrics.recall = token_or_zero(&parts, 3);
                metrics.f1_score = token_or_zero(&parts, 4);
            }
        }

        if trimmed.starts_with("accuracy") {
            let parts: Vec<&str> = trimmed.split_whitespace().collect();
            if parts.len() >= 2 {
                metrics.accuracy = token_or_zero(&parts, 1);
            }
        }
    }

    metrics
}

/// Scans every line for `label: value` or `label value` pairs.
pub fn parse_labelled_metrics(output: &str) -> EvaluationMetrics {
    let mut metrics = EvaluationMetrics::default();

    for line in output.lines() {
        if let Some(v) = labelled_value(&ACCURACY, line) {
            metrics.accuracy = Some(v);
        }
        if let Some(v) = labelled_value(&PRECISION, line) {
            metrics.precision = Some(v);
        }
        if let Some(v) = labelled_value(&RECALL, line) {
            metrics.recall = Some(v);
        }
        if let Some(v) = labelled_value(&F1, line) {
            metrics.f1_score = Some(v);
        }
    }

    metrics
}

fn labelled_value(pattern: &Regex, line: &str) -> Option<f64> {
    let captures = pattern.captures(line)?;
    leading_number(captures.get(1)?.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "\
INFO Training with: n_estimators=300, max_depth=None, random_state=42
              precision    recall  f1-score   support

      BENIGN     0.9900    0.9950    0.9925       300
         Bot     0.8700    0.8250    0.8475       200

accuracy                           0.9500      500
          macro avg       0.9300    0.9100    0.9200       500
weighted avg     0.9500    0.9500    0.9500       500
";

    #[test]
    fn test_report_macro_avg_and_accuracy() {
        let metrics = parse_classification_report(REPORT);
        assert_eq!(
            metrics,
            TrainingMetrics {
                accuracy: 0.95,
                precision: 0.93,
                recall: 0.91,
                f1_score: 0.92,
            }
        );
    }

    #[test]
    fn test_report_without_matches_is_zero() {
        let metrics = parse_classification_report("Loaded processed dataset\nDone.\n");
        assert_eq!(metrics, TrainingMetrics::default());
    }

    #[test]
    fn test_report_unparsable_values_default_to_zero() {
        let output = "macro avg  n/a  0.5  oops  10\naccuracy  ???\n";
        let metrics = parse_classification_report(output);
        assert_eq!(metrics.precision, 0.0);
        assert_eq!(metrics.recall, 0.5);
        assert_eq!(metrics.f1_score, 0.0);
        assert_eq!(metrics.accuracy, 0.0);
    }

    #[test]
    fn test_report_short_macro_line_is_ignored() {
        let metrics = parse_classification_report("macro avg 0.5 0.6\n");
        assert_eq!(metrics, TrainingMetrics::default());
    }

    #[test]
    fn test_report_accuracy_must_lead_the_line() {
        let metrics = parse_classification_report("val accuracy 0.80\n");
        assert_eq!(metrics.accuracy, 0.0);
    }

    #[test]
    fn test_report_later_lines_win() {
        let output = "accuracy 0.50 10\naccuracy 0.75 10\n";
        assert_eq!(parse_classification_report(output).accuracy, 0.75);
    }

    #[test]
    fn test_nan_token_is_zero() {
        let metrics = parse_classification_report("accuracy nan 10\n");
        assert_eq!(metrics.accuracy, 0.0);
    }

    #[test]
    fn test_labelled_metrics() {
        let output = "\
Evaluation Results:
{'accuracy': 0.97, 'precision': 0.95}
Recall: 0.93
Macro F1: 0.94
f1-score 0.10
";
        let metrics = parse_labelled_metrics(output);
        assert_eq!(metrics.precision, None, "quoted dict keys are not followed by ':' directly");
        assert_eq!(metrics.accuracy, None);
        assert_eq!(metrics.recall, Some(0.93));
        assert_eq!(metrics.f1_score, Some(0.94));
    }

    #[test]
    fn test_labelled_metrics_colon_and_space_forms() {
        let output = "accuracy: 0.91\nPRECISION 0.88\nrecall:0.87\nF1: 0.86\n";
        let metrics = parse_labelled_metrics(output);
        assert_eq!(metrics.accuracy, Some(0.91));
        assert_eq!(metrics.precision, Some(0.88));
        assert_eq!(metrics.recall, Some(0.87));
        assert_eq!(metrics.f1_score, Some(0.86));
    }

    #[test]
    fn test_labelled_metrics_empty_serializes_to_empty_object() {
        let metrics = parse_labelled_metrics("nothing to see here\n");
        assert!(metrics.is_empty());
        assert_eq!(serde_json::to_string(&metrics).unwrap(), "{}");
    }

    #[test]
    fn test_labelled_metrics_header_row_is_skipped() {
        let metrics = parse_labelled_metrics("precision    recall  f1-score   support\n");
        assert!(metrics.is_empty());
    }

    #[test]
    fn test_labelled_dot_only_capture_is_ignored() {
        let metrics = parse_labelled_metrics("accuracy: .\n");
        assert_eq!(metrics.accuracy, None);
    }

    #[test]
    fn test_leading_number() {
        assert_eq!(leading_number("0.9300"), Some(0.93));
        assert_eq!(leading_number("0.95,"), Some(0.95));
        assert_eq!(leading_number("1.2.3"), Some(1.2));
        assert_eq!(leading_number(".5"), Some(0.5));
        assert_eq!(leading_number("abc"), None);
        assert_eq!(leading_number("."), None);
    }
}
