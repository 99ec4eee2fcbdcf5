//! Return metrics - row-over-row price transforms.
//!
//! Each function takes a close-price [`SeriesTable`] and returns one
//! [`MetricGroup`] with the same dates and series identifiers. The first row
//! of every differencing metric is undefined because it has no prior value.

use crate::{
    Metric, Result,
    config::DEFAULT_NORMALIZATION_BASE,
    table::{MetricGroup, SeriesTable},
};
use polars::prelude::*;
use tracing::debug;

/// Log return expression for one price column.
///
/// Undefined wherever the current or previous price is missing or
/// non-positive.
pub(crate) fn log_return_expr(name: &str) -> Expr {
    let current = col(name);
    let previous = col(name).shift(lit(1));
    when(current.clone().gt(lit(0.0)).and(previous.clone().gt(lit(0.0))))
        .then((current / previous).log(std::f64::consts::E))
        .otherwise(lit(NULL).cast(DataType::Float64))
}

/// Normalized close rebased to 100 at the first row.
///
/// Formula: `Norm_close[t] = close[t] / close[0] * 100`
///
/// A series whose first value is zero or missing is undefined throughout.
pub fn calculate_normalized_close(prices: &SeriesTable) -> Result<MetricGroup> {
    calculate_normalized_close_with_base(prices, DEFAULT_NORMALIZATION_BASE)
}

/// Normalized close rebased to `base` at the first row.
pub fn calculate_normalized_close_with_base(
    prices: &SeriesTable,
    base: f64,
) -> Result<MetricGroup> {
    let table = prices.map_columns(|id| col(id) / col(id).first() * lit(base))?;
    debug!(metric = %Metric::NormClose, base, series = table.width(), "computed metric");
    Ok(MetricGroup::for_metric(Metric::NormClose, table))
}

/// Percentage change: `(v[t] - v[t-1]) / v[t-1]`.
pub fn calculate_pct_change(prices: &SeriesTable) -> Result<MetricGroup> {
    let table = prices.map_columns(|id| {
        let previous = col(id).shift(lit(1));
        (col(id) - previous.clone()) / previous
    })?;
    debug!(metric = %Metric::PctChange, series = table.width(), "computed metric");
    Ok(MetricGroup::for_metric(Metric::PctChange, table))
}

/// Daily change: `v[t] - v[t-1]`.
pub fn calculate_daily_return(prices: &SeriesTable) -> Result<MetricGroup> {
    let table = prices.map_columns(|id| col(id) - col(id).shift(lit(1)))?;
    debug!(metric = %Metric::Change, series = table.width(), "computed metric");
    Ok(MetricGroup::for_metric(Metric::Change, table))
}

/// Log return: `ln(v[t] / v[t-1])`.
///
/// Log returns are additive over time, which is what the cumulative return
/// index relies on.
pub fn calculate_log_return(prices: &SeriesTable) -> Result<MetricGroup> {
    let table = prices.map_columns(log_return_expr)?;
    debug!(metric = %Metric::LogReturn, series = table.width(), "computed metric");
    Ok(MetricGroup::for_metric(Metric::LogReturn, table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use polars::df;
    use rstest::rstest;

    fn prices(values: &[Option<f64>]) -> SeriesTable {
        let dates: Vec<String> = (1..=values.len())
            .map(|d| format!("2024-01-{d:02}"))
            .collect();
        SeriesTable::new(df! { "date" => dates, "A" => values }.unwrap()).unwrap()
    }

    fn assert_series(actual: Vec<Option<f64>>, expected: &[Option<f64>]) {
        assert_eq!(actual.len(), expected.len());
        for (row, (a, e)) in actual.iter().zip(expected).enumerate() {
            match (a, e) {
                (Some(a), Some(e)) => assert_abs_diff_eq!(*a, *e, epsilon = 1e-12),
                (None, None) => {}
                _ => panic!("row {row}: expected {e:?}, got {a:?}"),
            }
        }
    }

    #[test]
    fn test_normalized_close() {
        let group =
            calculate_normalized_close(&prices(&[Some(50.0), Some(55.0), Some(45.0)])).unwrap();
        assert_eq!(group.name(), "Norm_close");
        assert_series(
            group.table().values("A").unwrap(),
            &[Some(100.0), Some(110.0), Some(90.0)],
        );
    }

    #[rstest]
    #[case::zero_first(&[Some(0.0), Some(1.0)])]
    #[case::missing_first(&[None, Some(1.0)])]
    fn test_normalized_close_undefined_base(#[case] values: &[Option<f64>]) {
        let group = calculate_normalized_close(&prices(values)).unwrap();
        assert_eq!(group.table().values("A").unwrap(), vec![None, None]);
    }

    #[test]
    fn test_normalized_close_custom_base() {
        let group =
            calculate_normalized_close_with_base(&prices(&[Some(50.0), Some(75.0)]), 1.0).unwrap();
        assert_series(group.table().values("A").unwrap(), &[Some(1.0), Some(1.5)]);
    }

    #[test]
    fn test_pct_change() {
        let group = calculate_pct_change(&prices(&[Some(100.0), Some(110.0), Some(99.0)])).unwrap();
        assert_eq!(group.name(), "Pct_change");
        assert_series(
            group.table().values("A").unwrap(),
            &[None, Some(0.10), Some(-0.10)],
        );
    }

    #[test]
    fn test_pct_change_division_by_zero() {
        let group = calculate_pct_change(&prices(&[Some(0.0), Some(1.0), Some(2.0)])).unwrap();
        assert_series(group.table().values("A").unwrap(), &[None, None, Some(1.0)]);
    }

    #[test]
    fn test_daily_change() {
        let group =
            calculate_daily_return(&prices(&[Some(100.0), Some(110.0), Some(99.0)])).unwrap();
        assert_eq!(group.name(), "Change");
        assert_series(
            group.table().values("A").unwrap(),
            &[None, Some(10.0), Some(-11.0)],
        );
    }

    #[test]
    fn test_log_return() {
        let group = calculate_log_return(&prices(&[Some(100.0), Some(110.0), Some(99.0)])).unwrap();
        assert_eq!(group.name(), "log_return");
        assert_series(
            group.table().values("A").unwrap(),
            &[None, Some(1.1f64.ln()), Some((99.0f64 / 110.0).ln())],
        );
    }

    #[rstest]
    #[case::zero(&[Some(100.0), Some(0.0), Some(50.0)], &[None, None, None])]
    #[case::negative_pair(&[Some(-1.0), Some(-2.0), Some(4.0)], &[None, None, None])]
    #[case::missing(&[Some(1.0), None, Some(2.0)], &[None, None, None])]
    fn test_log_return_non_positive(
        #[case] values: &[Option<f64>],
        #[case] expected: &[Option<f64>],
    ) {
        let group = calculate_log_return(&prices(values)).unwrap();
        assert_series(group.table().values("A").unwrap(), expected);
    }

    #[test]
    fn test_metrics_keep_series_aligned() {
        let df = df! {
            "date" => ["2024-01-01", "2024-01-02"],
            "A" => [1.0, 2.0],
            "B" => [10.0, 5.0],
        }
        .unwrap();
        let group = calculate_daily_return(&SeriesTable::new(df).unwrap()).unwrap();
        assert_eq!(group.table().identifiers(), vec!["A", "B"]);
        assert_series(group.table().values("B").unwrap(), &[None, Some(-5.0)]);
    }
}
