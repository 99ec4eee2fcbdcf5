//! Metric catalogue for discovery and introspection.
//!
//! Every derived metric group produced by the pipeline is named by a
//! [`Metric`]. The display form is the canonical group name used as the
//! outer column key of a [`GroupedTable`](crate::GroupedTable).

use crate::{MetricsError, Result};
use derive_more::Display;
use std::str::FromStr;

/// A derived metric group.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    /// Price rebased to the first observation
    #[display("Norm_close")]
    NormClose,
    /// Relative change from the previous row
    #[display("Pct_change")]
    PctChange,
    /// Absolute change from the previous row
    #[display("Change")]
    Change,
    /// Natural log of the ratio of consecutive prices
    #[display("log_return")]
    LogReturn,
    /// Compounded growth index from summed log returns
    #[display("cum_return")]
    CumReturn,
    /// Running peak of the cumulative return index
    #[display("cum_max")]
    CumMax,
    /// Peak-to-current decline of the cumulative return index
    #[display("drawdown")]
    Drawdown,
    /// Drawdown relative to the running peak
    #[display("drawdown_percent")]
    DrawdownPercent,
}

impl Metric {
    /// All metrics in the order the pipeline appends them.
    pub const ALL: [Self; 8] = [
        Self::NormClose,
        Self::PctChange,
        Self::Change,
        Self::LogReturn,
        Self::CumReturn,
        Self::CumMax,
        Self::Drawdown,
        Self::DrawdownPercent,
    ];

    /// Canonical group name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::NormClose => "Norm_close",
            Self::PctChange => "Pct_change",
            Self::Change => "Change",
            Self::LogReturn => "log_return",
            Self::CumReturn => "cum_return",
            Self::CumMax => "cum_max",
            Self::Drawdown => "drawdown",
            Self::DrawdownPercent => "drawdown_percent",
        }
    }

    /// Human-readable description of what this metric measures.
    pub const fn description(&self) -> &'static str {
        match self {
            Self::NormClose => "Close rebased so the first observation equals the base (100)",
            Self::PctChange => "Row-over-row relative change: (v[t] - v[t-1]) / v[t-1]",
            Self::Change => "Row-over-row absolute change: v[t] - v[t-1]",
            Self::LogReturn => "Log return: ln(v[t] / v[t-1]), undefined for non-positive prices",
            Self::CumReturn => "Geometric growth index: exp(cumsum(log_return))",
            Self::CumMax => "Running maximum of the cumulative return index",
            Self::Drawdown => "Peak-to-current decline: cum_max - cum_return",
            Self::DrawdownPercent => "Drawdown relative to peak: (cum_max - cum_return) / cum_max",
        }
    }

    /// Groups this metric is derived from.
    pub const fn inputs(&self) -> &'static [&'static str] {
        match self {
            Self::NormClose | Self::PctChange | Self::Change | Self::LogReturn => &["Close"],
            Self::CumReturn => &["log_return"],
            Self::CumMax => &["cum_return"],
            Self::Drawdown | Self::DrawdownPercent => &["cum_max", "cum_return"],
        }
    }

    /// Metadata for this metric.
    pub fn info(&self) -> MetricInfo {
        MetricInfo {
            name: self.name().to_string(),
            description: self.description().to_string(),
            inputs: self.inputs().iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Metadata for every metric, in pipeline order.
    pub fn all_info() -> Vec<MetricInfo> {
        Self::ALL.iter().map(Self::info).collect()
    }
}

impl FromStr for Metric {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| MetricsError::malformed(format!("unknown metric group `{s}`")))
    }
}

/// Metadata for metric introspection.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MetricInfo {
    /// Canonical group name
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// Groups the metric is computed from
    pub inputs: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Metric::NormClose, "Norm_close")]
    #[case(Metric::PctChange, "Pct_change")]
    #[case(Metric::Change, "Change")]
    #[case(Metric::LogReturn, "log_return")]
    #[case(Metric::CumReturn, "cum_return")]
    #[case(Metric::CumMax, "cum_max")]
    #[case(Metric::Drawdown, "drawdown")]
    #[case(Metric::DrawdownPercent, "drawdown_percent")]
    fn test_metric_names(#[case] metric: Metric, #[case] expected: &str) {
        assert_eq!(metric.name(), expected);
        assert_eq!(metric.to_string(), expected);
        assert_eq!(expected.parse::<Metric>().unwrap(), metric);
    }

    #[test]
    fn test_unknown_metric() {
        let err = "sharpe".parse::<Metric>().unwrap_err();
        assert!(matches!(err, MetricsError::MalformedInput(_)));
    }

    #[test]
    fn test_all_metrics_have_info() {
        let all_info = Metric::all_info();
        assert_eq!(all_info.len(), Metric::ALL.len());

        for info in all_info {
            assert!(!info.name.is_empty());
            assert!(!info.description.is_empty());
            assert!(!info.inputs.is_empty());
        }
    }
}
