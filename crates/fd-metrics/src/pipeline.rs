//! Full metrics pipeline and single-series extraction.

use crate::{
    PipelineConfig, Result,
    drawdown::{
        calculate_cum_max, calculate_cum_return_anchored, calculate_drawdown,
        calculate_drawdown_percentage,
    },
    returns::{
        calculate_daily_return, calculate_log_return, calculate_normalized_close_with_base,
        calculate_pct_change,
    },
    table::{GroupedTable, SeriesTable},
};
use tracing::{debug, info};

/// Enrich a price table with every derived metric group.
///
/// Uses the default [`PipelineConfig`]: closes are read from the `Close`
/// group and normalized to 100.
pub fn transform_df(table: &GroupedTable) -> Result<GroupedTable> {
    transform_df_with(table, &PipelineConfig::default())
}

/// Enrich a price table with every derived metric group.
///
/// The result keeps all groups of `table` and appends, in order:
/// `Norm_close`, `Pct_change`, `Change`, `log_return`, `cum_return`,
/// `cum_max`, `drawdown`, `drawdown_percent`.
///
/// Every group is left-joined onto the input's date index, so the output has
/// exactly the input's rows. Undefined values stay in place as nulls. Each
/// series' cumulative return starts at 1.0 on its first priced date.
pub fn transform_df_with(table: &GroupedTable, config: &PipelineConfig) -> Result<GroupedTable> {
    let close = table.group(&config.close_field)?.table();
    debug!(
        field = %config.close_field,
        series = close.width(),
        rows = close.height(),
        "transforming price table"
    );

    let normalized_close = calculate_normalized_close_with_base(close, config.normalization_base)?;
    let pct_change = calculate_pct_change(close)?;
    let daily_change = calculate_daily_return(close)?;
    let log_return = calculate_log_return(close)?;
    let cum_return = calculate_cum_return_anchored(log_return.table(), close)?;
    let cum_max = calculate_cum_max(cum_return.table())?;
    let drawdown = calculate_drawdown(&cum_max, &cum_return)?;
    let drawdown_percent = calculate_drawdown_percentage(&cum_max, &cum_return)?;

    let enriched = table
        .clone()
        .join(normalized_close)?
        .join(pct_change)?
        .join(daily_change)?
        .join(log_return)?
        .join(cum_return)?
        .join(cum_max)?
        .join(drawdown)?
        .join(drawdown_percent)?;

    info!(
        groups = enriched.groups().len(),
        rows = enriched.height(),
        "metric table assembled"
    );
    Ok(enriched)
}

/// Every group's values for one series, keyed by group name.
///
/// # Errors
/// [`MetricsError::IdentifierNotFound`](crate::MetricsError::IdentifierNotFound)
/// if no group carries `ticker`.
pub fn retrive_single_ticker(table: &GroupedTable, ticker: &str) -> Result<SeriesTable> {
    table.series(ticker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Metric, MetricsError, table::MetricGroup};
    use polars::df;

    fn grouped() -> GroupedTable {
        let close = df! {
            "date" => ["2024-01-01", "2024-01-02", "2024-01-03"],
            "A" => [100.0, 110.0, 99.0],
            "B" => [50.0, 40.0, 60.0],
        }
        .unwrap();
        GroupedTable::from_prices(SeriesTable::new(close).unwrap()).unwrap()
    }

    #[test]
    fn test_transform_group_order() {
        let enriched = transform_df(&grouped()).unwrap();
        let expected: Vec<&str> = std::iter::once("Close")
            .chain(Metric::ALL.iter().map(Metric::name))
            .collect();
        assert_eq!(enriched.group_names(), expected);
        assert_eq!(enriched.height(), 3);

        for group in enriched.groups() {
            assert_eq!(group.table().identifiers(), vec!["A", "B"]);
        }
    }

    #[test]
    fn test_transform_keeps_extra_fields() {
        let volume = df! {
            "date" => ["2024-01-01", "2024-01-02", "2024-01-03"],
            "A" => [1.0, 2.0, 3.0],
        }
        .unwrap();
        let table = grouped()
            .join(MetricGroup::new("Volume", SeriesTable::new(volume).unwrap()))
            .unwrap();

        let enriched = transform_df(&table).unwrap();
        assert_eq!(&enriched.group_names()[..3], &["Close", "Volume", "Norm_close"]);
    }

    #[test]
    fn test_transform_custom_config() {
        let close = grouped().group("Close").unwrap().table().clone();
        let table = GroupedTable::new(MetricGroup::new("adj_close", close)).unwrap();
        let config = PipelineConfig::default()
            .with_close_field("adj_close")
            .with_normalization_base(1.0);

        let enriched = transform_df_with(&table, &config).unwrap();
        let norm = enriched.metric(Metric::NormClose).unwrap();
        assert_eq!(norm.values("A").unwrap()[0], Some(1.0));
    }

    #[test]
    fn test_transform_missing_close_field() {
        let close = grouped().group("Close").unwrap().table().clone();
        let table = GroupedTable::new(MetricGroup::new("Open", close)).unwrap();
        let err = transform_df(&table).unwrap_err();
        assert!(matches!(err, MetricsError::MalformedInput(_)));
    }

    #[test]
    fn test_retrive_single_ticker_columns() {
        let enriched = transform_df(&grouped()).unwrap();
        let b = retrive_single_ticker(&enriched, "B").unwrap();
        assert_eq!(b.width(), 9);
        assert_eq!(b.height(), 3);
        assert_eq!(
            b.values("Change").unwrap(),
            vec![None, Some(-10.0), Some(20.0)]
        );
    }

    #[test]
    fn test_retrive_single_ticker_not_found() {
        let enriched = transform_df(&grouped()).unwrap();
        let err = retrive_single_ticker(&enriched, "ZZZ").unwrap_err();
        assert!(matches!(err, MetricsError::IdentifierNotFound(id) if id == "ZZZ"));
    }
}
