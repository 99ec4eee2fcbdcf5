//! Drawdown metrics - peak-to-current decline of a growth index.
//!
//! The cumulative return index is rebuilt from log returns as
//! `exp(cumsum(log_return))`, its running peak is tracked as `cum_max`, and
//! drawdown is the gap between the two:
//!
//! - `drawdown = cum_max - cum_return`
//! - `drawdown_percent = (cum_max - cum_return) / cum_max`
//!
//! Because `cum_max >= cum_return` at every defined row, drawdown is never
//! negative and the percentage stays within `[0, 1]`.
//!
//! The scans here do not skip gaps: once a series has started, an undefined
//! value makes every later value of that series undefined as well.

use crate::{
    Metric, MetricsError, Result,
    config::DEFAULT_CLOSE_FIELD,
    returns::log_return_expr,
    table::{DATE, GroupedTable, MetricGroup, SeriesTable, defined},
};
use polars::prelude::*;
use tracing::debug;

/// Log return column of the flat drawdown report.
pub const LOG_RETURN: &str = "log_return";
/// Cumulative return column of the flat drawdown report.
pub const CUM_RETURN: &str = "cum_return";
/// Running peak column of the flat drawdown report.
pub const CUM_MAX: &str = "cum_max";
/// Drawdown column of the flat drawdown report.
pub const DRAWDOWN: &str = "drawdown";
/// Drawdown percentage column of the flat drawdown report.
pub const DRAWDOWN_PCT: &str = "drawdown_pct";

/// Row of the first defined value, if any.
pub(crate) fn first_defined(values: &Float64Chunked) -> Option<usize> {
    values.into_iter().position(|value| value.is_some())
}

/// `exp` of the running sum of log returns, anchored at row `anchor`.
///
/// Rows before the anchor are undefined. The anchor's own return counts
/// when defined and is the empty sum otherwise, so an index anchored on a
/// series' first price starts at 1.0. Past the anchor, an undefined return
/// or an overflowing index ends the scan.
pub(crate) fn compounded(log_returns: &Float64Chunked, anchor: Option<usize>) -> Float64Chunked {
    let mut running: Option<f64> = None;
    log_returns
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            running = match anchor {
                Some(anchor) if row == anchor => Some(value.unwrap_or(0.0)),
                Some(anchor) if row > anchor => running.zip(value).map(|(sum, r)| sum + r),
                _ => None,
            };
            let growth = running.map(f64::exp).filter(|g| g.is_finite());
            if growth.is_none() {
                running = None;
            }
            growth
        })
        .collect()
}

/// Running maximum.
///
/// Leading undefined values stay undefined; an undefined value after the
/// first defined one ends the scan.
pub(crate) fn running_max(values: &Float64Chunked) -> Float64Chunked {
    let mut peak: Option<f64> = None;
    let mut ended = false;
    values
        .into_iter()
        .map(|value| {
            if ended {
                return None;
            }
            match (peak, value) {
                (_, Some(v)) => peak = Some(peak.map_or(v, |p| p.max(v))),
                (Some(_), None) => {
                    ended = true;
                    return None;
                }
                (None, None) => {}
            }
            peak
        })
        .collect()
}

fn expect_metric(group: &MetricGroup, metric: Metric) -> Result<()> {
    if group.name() == metric.name() {
        Ok(())
    } else {
        Err(MetricsError::malformed(format!(
            "expected `{metric}` group, found `{}`",
            group.name()
        )))
    }
}

/// Cumulative return from a log-return table.
///
/// The input's group name is ignored; only its per-series values are used.
/// Each index starts at 1.0 on the row before the series' first defined
/// return. Log returns alone cannot tell a late listing from a zero price
/// on the second row; [`calculate_cum_return_anchored`] resolves that from
/// the prices.
pub fn calculate_cum_return(log_returns: &SeriesTable) -> Result<MetricGroup> {
    let table = log_returns.scan_columns(|_, values| {
        let anchor = first_defined(values).map(|row| row.saturating_sub(1));
        Ok(compounded(values, anchor))
    })?;
    debug!(metric = %Metric::CumReturn, series = table.width(), "computed metric");
    Ok(MetricGroup::for_metric(Metric::CumReturn, table))
}

/// Cumulative return anchored on each series' first defined price.
///
/// The index is 1.0 on the first date a series has a price and undefined
/// before it. Prices are aligned to the log returns by date.
///
/// # Errors
/// [`MetricsError::MalformedInput`] if `prices` lacks a series present in
/// `log_returns`.
pub fn calculate_cum_return_anchored(
    log_returns: &SeriesTable,
    prices: &SeriesTable,
) -> Result<MetricGroup> {
    let prices = prices.reindex(&log_returns.dates()?)?;
    let table = log_returns.scan_columns(|id, values| {
        if !prices.contains(id) {
            return Err(MetricsError::malformed(format!("no prices for series `{id}`")));
        }
        Ok(compounded(values, first_defined(prices.column(id)?)))
    })?;
    debug!(metric = %Metric::CumReturn, series = table.width(), "computed metric");
    Ok(MetricGroup::for_metric(Metric::CumReturn, table))
}

/// Running maximum of a cumulative-return table.
pub fn calculate_cum_max(cum_returns: &SeriesTable) -> Result<MetricGroup> {
    let table = cum_returns.scan_columns(|_, values| Ok(running_max(values)))?;
    debug!(metric = %Metric::CumMax, series = table.width(), "computed metric");
    Ok(MetricGroup::for_metric(Metric::CumMax, table))
}

/// Drawdown: `cum_max - cum_return`, paired by series identifier.
///
/// # Errors
/// [`MetricsError::MalformedInput`] if the groups are not `cum_max` and
/// `cum_return`, or carry different series.
pub fn calculate_drawdown(cum_max: &MetricGroup, cum_return: &MetricGroup) -> Result<MetricGroup> {
    expect_metric(cum_max, Metric::CumMax)?;
    expect_metric(cum_return, Metric::CumReturn)?;

    let table = cum_max
        .table()
        .zip_with(cum_return.table(), |peak, growth| peak - growth)?;
    debug!(metric = %Metric::Drawdown, series = table.width(), "computed metric");
    Ok(MetricGroup::for_metric(Metric::Drawdown, table))
}

/// Drawdown percentage: `(cum_max - cum_return) / cum_max`.
///
/// A zero peak yields an undefined cell.
pub fn calculate_drawdown_percentage(
    cum_max: &MetricGroup,
    cum_return: &MetricGroup,
) -> Result<MetricGroup> {
    expect_metric(cum_max, Metric::CumMax)?;
    expect_metric(cum_return, Metric::CumReturn)?;

    let table = cum_max.table().zip_with(cum_return.table(), |peak, growth| {
        (peak.clone() - growth) / peak
    })?;
    debug!(metric = %Metric::DrawdownPercent, series = table.width(), "computed metric");
    Ok(MetricGroup::for_metric(Metric::DrawdownPercent, table))
}

/// Flatten the `Close` group of a single-series table to `date, Close`.
///
/// # Errors
/// [`MetricsError::MalformedInput`] if there is no `Close` group or it holds
/// more than one series. Select the series first with
/// [`GroupedTable::select_series`].
pub fn flatten_df(table: &GroupedTable) -> Result<DataFrame> {
    let close = table.group(DEFAULT_CLOSE_FIELD)?.table();
    let ids = close.identifiers();
    let [id] = ids.as_slice() else {
        return Err(MetricsError::malformed(format!(
            "expected a single series in `{DEFAULT_CLOSE_FIELD}`, found {}",
            ids.len()
        )));
    };

    Ok(close
        .frame()
        .clone()
        .lazy()
        .select([col(DATE), col(id.as_str()).alias(DEFAULT_CLOSE_FIELD)])
        .collect()?)
}

/// Flat drawdown report for a single series.
///
/// # Returns
/// DataFrame with columns: `date`, `Close`, `log_return`, `cum_return`,
/// `cum_max`, `drawdown`, `drawdown_pct`
///
/// The first row, whose log return is always undefined, is removed. Later
/// gaps are kept and propagate: after an undefined return every cumulative
/// value is undefined. Unlike [`transform_df`](crate::transform_df), the
/// running peak only covers the rows that remain.
pub fn calculate_drawdown_full(table: &GroupedTable) -> Result<DataFrame> {
    let mut report = flatten_df(table)?
        .lazy()
        .with_column(log_return_expr(DEFAULT_CLOSE_FIELD).alias(LOG_RETURN))
        .collect()?;

    let anchor = first_defined(report.column(DEFAULT_CLOSE_FIELD)?.f64()?);
    let cum_return =
        compounded(report.column(LOG_RETURN)?.f64()?, anchor).with_name(CUM_RETURN.into());
    report.with_column(cum_return.into_series())?;

    let mut report = report.slice(1, usize::MAX);
    let cum_max = running_max(report.column(CUM_RETURN)?.f64()?).with_name(CUM_MAX.into());
    report.with_column(cum_max.into_series())?;

    let report = report
        .lazy()
        .with_columns([
            defined(col(CUM_MAX) - col(CUM_RETURN)).alias(DRAWDOWN),
            defined((col(CUM_MAX) - col(CUM_RETURN)) / col(CUM_MAX)).alias(DRAWDOWN_PCT),
        ])
        .collect()?;

    debug!(rows = report.height(), "computed drawdown report");
    Ok(report)
}
