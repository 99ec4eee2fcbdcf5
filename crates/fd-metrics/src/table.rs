//! Date-indexed tables of per-series values.
//!
//! A [`SeriesTable`] is a single-level table: a `date` column followed by one
//! `Float64` column per series identifier. A [`GroupedTable`] adds an outer
//! level: an ordered list of named groups (`Close`, `log_return`, ...), each
//! holding a [`SeriesTable`] aligned to one shared date index.
//!
//! Undefined values are always polars nulls. `NaN` and infinite values are
//! converted to null whenever a table is built or a metric is computed.

use crate::{Metric, MetricsError, Result};
use chrono::NaiveDate;
use polars::prelude::*;
use std::collections::{BTreeSet, HashMap};

/// Name of the date index column.
pub const DATE: &str = "date";

/// Name of the series identifier column in long-format input.
pub const SYMBOL: &str = "symbol";

const RIGHT_SUFFIX: &str = "__right";
const ROW_INDEX: &str = "__row";

/// Replace `NaN` and infinite results with null.
pub(crate) fn defined(expr: Expr) -> Expr {
    when(expr.clone().is_finite())
        .then(expr)
        .otherwise(lit(NULL).cast(DataType::Float64))
}

fn validate_dates(dates: &Series) -> Result<()> {
    match dates.dtype() {
        DataType::Date | DataType::Datetime(_, _) | DataType::String => {}
        other => {
            return Err(MetricsError::malformed(format!(
                "`{DATE}` column has unsupported dtype {other}"
            )));
        }
    }

    if dates.null_count() > 0 {
        return Err(MetricsError::malformed(format!(
            "`{DATE}` column contains nulls"
        )));
    }
    if dates.n_unique()? != dates.len() {
        return Err(MetricsError::malformed(format!(
            "`{DATE}` column contains duplicate dates"
        )));
    }
    let sorted = dates.sort(SortOptions::default())?;
    if !dates.equals(&sorted) {
        return Err(MetricsError::malformed(format!(
            "`{DATE}` column is not in ascending order"
        )));
    }

    Ok(())
}

/// Single-level table of series values indexed by date.
///
/// Rows are unique dates in ascending order. Every other column holds the
/// values of one series as nullable `f64`.
#[derive(Debug, Clone)]
pub struct SeriesTable {
    frame: DataFrame,
}

impl SeriesTable {
    /// Validate a wide DataFrame and normalize its value columns.
    ///
    /// # Required Columns
    /// - `date`: Date, Datetime or ISO-8601 string; non-null, unique, ascending
    ///
    /// All remaining columns must be numeric. They are cast to `Float64` and
    /// `NaN`/infinite values become null.
    pub fn new(frame: DataFrame) -> Result<Self> {
        let dates = frame
            .column(DATE)
            .map_err(|_| MetricsError::malformed(format!("missing `{DATE}` column")))?;
        validate_dates(dates.as_materialized_series())?;

        let mut exprs = vec![col(DATE)];
        for column in frame.get_columns() {
            let name = column.name().as_str();
            if name == DATE {
                continue;
            }
            let dtype = column.dtype();
            if !(dtype.is_float() || dtype.is_integer() || matches!(dtype, DataType::Null)) {
                return Err(MetricsError::malformed(format!(
                    "series column `{name}` has non-numeric dtype {dtype}"
                )));
            }
            exprs.push(defined(col(name).cast(DataType::Float64)).alias(name));
        }

        let frame = frame.lazy().select(exprs).collect()?;
        Ok(Self { frame })
    }

    /// Build a table from calendar dates and per-series values.
    pub fn from_columns<S: AsRef<str>>(
        dates: &[NaiveDate],
        series: &[(S, Vec<Option<f64>>)],
    ) -> Result<Self> {
        let mut columns: Vec<Column> = Vec::with_capacity(series.len() + 1);
        columns.push(Series::new(DATE.into(), dates).into());
        for (name, values) in series {
            if values.len() != dates.len() {
                return Err(MetricsError::malformed(format!(
                    "series `{}` has {} values for {} dates",
                    name.as_ref(),
                    values.len(),
                    dates.len()
                )));
            }
            columns.push(Series::new(name.as_ref().into(), values.as_slice()).into());
        }
        Self::new(DataFrame::new(columns)?)
    }

    /// Underlying DataFrame (`date` plus one column per series).
    pub const fn frame(&self) -> &DataFrame {
        &self.frame
    }

    /// Consume the table, returning the underlying DataFrame.
    pub fn into_frame(self) -> DataFrame {
        self.frame
    }

    /// Number of rows (dates).
    pub fn height(&self) -> usize {
        self.frame.height()
    }

    /// Number of series columns.
    pub fn width(&self) -> usize {
        self.frame.width().saturating_sub(1)
    }

    /// Series identifiers in column order.
    pub fn identifiers(&self) -> Vec<String> {
        self.frame
            .get_column_names()
            .into_iter()
            .filter(|name| name.as_str() != DATE)
            .map(|name| name.to_string())
            .collect()
    }

    /// Whether a series with this identifier is present.
    pub fn contains(&self, id: &str) -> bool {
        id != DATE && self.frame.column(id).is_ok()
    }

    /// The date index as a single-column DataFrame.
    pub fn dates(&self) -> Result<DataFrame> {
        Ok(self.frame.select([DATE])?)
    }

    /// Values of one series.
    pub fn column(&self, id: &str) -> Result<&Float64Chunked> {
        if !self.contains(id) {
            return Err(MetricsError::IdentifierNotFound(id.to_string()));
        }
        Ok(self.frame.column(id)?.f64()?)
    }

    /// Values of one series, collected row by row.
    pub fn values(&self, id: &str) -> Result<Vec<Option<f64>>> {
        Ok(self.column(id)?.into_iter().collect())
    }

    /// Restrict the table to the given series, in the given order.
    pub fn select(&self, ids: &[&str]) -> Result<Self> {
        let mut exprs = vec![col(DATE)];
        for id in ids {
            if !self.contains(id) {
                return Err(MetricsError::IdentifierNotFound((*id).to_string()));
            }
            exprs.push(col(*id));
        }
        let frame = self.frame.clone().lazy().select(exprs).collect()?;
        Ok(Self { frame })
    }

    /// Align this table to another date index.
    ///
    /// Rows follow `index`; dates missing from this table become null cells
    /// and dates absent from `index` are dropped.
    pub fn reindex(&self, index: &DataFrame) -> Result<Self> {
        let frame = index
            .clone()
            .lazy()
            .join(
                self.frame.clone().lazy(),
                [col(DATE)],
                [col(DATE)],
                JoinArgs::new(JoinType::Left),
            )
            .sort([DATE], SortMultipleOptions::default())
            .collect()?;
        Ok(Self { frame })
    }

    /// Apply an elementwise expression to every series column.
    pub(crate) fn map_columns(&self, f: impl Fn(&str) -> Expr) -> Result<Self> {
        let exprs: Vec<Expr> = std::iter::once(col(DATE))
            .chain(
                self.identifiers()
                    .iter()
                    .map(|id| defined(f(id)).alias(id.as_str())),
            )
            .collect();
        let frame = self.frame.clone().lazy().select(exprs).collect()?;
        Ok(Self { frame })
    }

    /// Apply a row-ordered scan to every series column.
    pub(crate) fn scan_columns(
        &self,
        f: impl Fn(&str, &Float64Chunked) -> Result<Float64Chunked>,
    ) -> Result<Self> {
        let mut columns = vec![self.frame.column(DATE)?.clone()];
        for id in self.identifiers() {
            let scanned = f(&id, self.column(&id)?)?.with_name(id.as_str().into());
            columns.push(scanned.into_series().into());
        }
        Ok(Self {
            frame: DataFrame::new(columns)?,
        })
    }

    /// Combine matching series of two tables elementwise.
    ///
    /// Columns are paired by identifier and rows by date; `other` is aligned
    /// to this table's dates before `f` is applied.
    pub(crate) fn zip_with(&self, other: &Self, f: impl Fn(Expr, Expr) -> Expr) -> Result<Self> {
        let ids = self.identifiers();
        let lhs: BTreeSet<&str> = ids.iter().map(String::as_str).collect();
        let other_ids = other.identifiers();
        let rhs: BTreeSet<&str> = other_ids.iter().map(String::as_str).collect();
        if lhs != rhs {
            return Err(MetricsError::malformed(format!(
                "series identifiers differ: {lhs:?} vs {rhs:?}"
            )));
        }

        let right: Vec<Expr> = std::iter::once(col(DATE))
            .chain(
                ids.iter()
                    .map(|id| col(id.as_str()).alias(format!("{id}{RIGHT_SUFFIX}"))),
            )
            .collect();
        let combined: Vec<Expr> = std::iter::once(col(DATE))
            .chain(ids.iter().map(|id| {
                defined(f(
                    col(id.as_str()),
                    col(format!("{id}{RIGHT_SUFFIX}")),
                ))
                .alias(id.as_str())
            }))
            .collect();

        let frame = self
            .frame
            .clone()
            .lazy()
            .join(
                other.frame.clone().lazy().select(right),
                [col(DATE)],
                [col(DATE)],
                JoinArgs::new(JoinType::Left),
            )
            .sort([DATE], SortMultipleOptions::default())
            .select(combined)
            .collect()?;
        Ok(Self { frame })
    }
}

/// A named group of series: one outer key of a [`GroupedTable`].
#[derive(Debug, Clone)]
pub struct MetricGroup {
    name: String,
    table: SeriesTable,
}

impl MetricGroup {
    /// Create a group with an arbitrary name (e.g. an input field like `Close`).
    pub fn new(name: impl Into<String>, table: SeriesTable) -> Self {
        Self {
            name: name.into(),
            table,
        }
    }

    /// Create a group named after a derived metric.
    pub fn for_metric(metric: Metric, table: SeriesTable) -> Self {
        Self::new(metric.name(), table)
    }

    /// Group name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The derived metric this group holds, if its name is a metric name.
    pub fn metric(&self) -> Option<Metric> {
        self.name.parse().ok()
    }

    /// Per-series values of this group.
    pub const fn table(&self) -> &SeriesTable {
        &self.table
    }

    /// Discard the group name, keeping the per-series values.
    pub fn into_table(self) -> SeriesTable {
        self.table
    }
}

/// Two-level table keyed by (group name, series identifier).
///
/// The first group fixes the date index. Groups added later are left-joined
/// onto it, so the row set never grows or shrinks.
#[derive(Debug, Clone)]
pub struct GroupedTable {
    index: DataFrame,
    groups: Vec<MetricGroup>,
}

impl GroupedTable {
    /// Create a table whose index is the dates of `first`.
    pub fn new(first: MetricGroup) -> Result<Self> {
        Ok(Self {
            index: first.table().dates()?,
            groups: vec![first],
        })
    }

    /// Create a table from several groups. The first group fixes the index.
    pub fn from_groups(groups: impl IntoIterator<Item = MetricGroup>) -> Result<Self> {
        let mut groups = groups.into_iter();
        let first = groups
            .next()
            .ok_or_else(|| MetricsError::malformed("grouped table needs at least one group"))?;
        groups.try_fold(Self::new(first)?, Self::join)
    }

    /// Wrap a wide close-price table as a single `Close` field group.
    pub fn from_prices(close: SeriesTable) -> Result<Self> {
        Self::new(MetricGroup::new(crate::config::DEFAULT_CLOSE_FIELD, close))
    }

    /// Pivot long-format market data into one group per field.
    ///
    /// # Required Columns
    /// - `symbol`: Security identifier (string)
    /// - `date`: Date of observation
    /// - one numeric column per entry in `fields`
    ///
    /// The index is the sorted union of all dates; a symbol without an
    /// observation on some date gets a null cell there. Each observation is
    /// located on the index with a single join, then scattered into its
    /// symbol's column.
    pub fn from_long(data: &DataFrame, fields: &[&str]) -> Result<Self> {
        if fields.is_empty() {
            return Err(MetricsError::malformed("no fields requested"));
        }
        for required in [SYMBOL, DATE].iter().chain(fields) {
            if data.column(required).is_err() {
                return Err(MetricsError::malformed(format!(
                    "missing required column `{required}`"
                )));
            }
        }
        let symbol_dtype = data.column(SYMBOL)?.dtype();
        if !matches!(symbol_dtype, DataType::String) {
            return Err(MetricsError::malformed(format!(
                "`{SYMBOL}` column has non-string dtype {symbol_dtype}"
            )));
        }
        for field in fields {
            let dtype = data.column(field)?.dtype();
            if !(dtype.is_float() || dtype.is_integer() || matches!(dtype, DataType::Null)) {
                return Err(MetricsError::malformed(format!(
                    "field column `{field}` has non-numeric dtype {dtype}"
                )));
            }
        }

        let dates = data
            .column(DATE)?
            .as_materialized_series()
            .unique()?
            .sort(SortOptions::default())?;
        let spine = DataFrame::new(vec![dates.into()])?;
        let height = spine.height();

        let located = data
            .clone()
            .lazy()
            .join(
                spine.with_row_index(ROW_INDEX.into(), None)?.lazy(),
                [col(DATE)],
                [col(DATE)],
                JoinArgs::new(JoinType::Left),
            )
            .collect()?;
        let rows = located.column(ROW_INDEX)?.as_materialized_series().idx()?;
        let symbols = located.column(SYMBOL)?.as_materialized_series().str()?;

        let identifiers: Vec<&str> = symbols
            .into_iter()
            .flatten()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let slots: HashMap<&str, usize> = identifiers
            .iter()
            .enumerate()
            .map(|(slot, id)| (*id, slot))
            .collect();

        let mut seen = vec![false; identifiers.len() * height];
        for (symbol, row) in symbols.into_iter().zip(rows) {
            let (Some(symbol), Some(row)) = (symbol, row) else {
                continue;
            };
            let cell = slots[symbol] * height + row as usize;
            if std::mem::replace(&mut seen[cell], true) {
                return Err(MetricsError::malformed(format!(
                    "duplicate observation for `{symbol}` at row {row}"
                )));
            }
        }

        let mut groups = Vec::with_capacity(fields.len());
        for field in fields {
            let values = located
                .column(field)?
                .as_materialized_series()
                .cast(&DataType::Float64)?;
            let mut columns = vec![vec![None; height]; identifiers.len()];
            for ((symbol, row), value) in symbols.into_iter().zip(rows).zip(values.f64()?) {
                if let (Some(symbol), Some(row)) = (symbol, row) {
                    columns[slots[symbol]][row as usize] = value;
                }
            }

            let mut frame = spine.clone();
            for (id, values) in identifiers.iter().zip(columns) {
                frame.with_column(Series::new((*id).into(), values))?;
            }
            groups.push(MetricGroup::new(*field, SeriesTable::new(frame)?));
        }

        Self::from_groups(groups)
    }

    /// Append a group, aligning it to this table's date index.
    pub fn join(mut self, group: MetricGroup) -> Result<Self> {
        if self.groups.iter().any(|g| g.name() == group.name()) {
            return Err(MetricsError::malformed(format!(
                "duplicate group `{}`",
                group.name()
            )));
        }
        let aligned = group.table().reindex(&self.index)?;
        self.groups.push(MetricGroup::new(group.name, aligned));
        Ok(self)
    }

    /// The shared date index.
    pub const fn index(&self) -> &DataFrame {
        &self.index
    }

    /// Number of rows (dates).
    pub fn height(&self) -> usize {
        self.index.height()
    }

    /// All groups in join order.
    pub fn groups(&self) -> &[MetricGroup] {
        &self.groups
    }

    /// Group names in join order.
    pub fn group_names(&self) -> Vec<&str> {
        self.groups.iter().map(MetricGroup::name).collect()
    }

    /// Look up a group by name.
    pub fn group(&self, name: &str) -> Result<&MetricGroup> {
        self.groups
            .iter()
            .find(|g| g.name() == name)
            .ok_or_else(|| MetricsError::malformed(format!("missing field group `{name}`")))
    }

    /// Per-series values of a derived metric.
    pub fn metric(&self, metric: Metric) -> Result<&SeriesTable> {
        Ok(self.group(metric.name())?.table())
    }

    /// Every series identifier, in order of first appearance.
    pub fn identifiers(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.groups
            .iter()
            .flat_map(|g| g.table().identifiers())
            .filter(|id| seen.insert(id.clone()))
            .collect()
    }

    /// Restrict every group to the given series.
    pub fn select_series(&self, ids: &[&str]) -> Result<Self> {
        let groups = self
            .groups
            .iter()
            .map(|g| Ok(MetricGroup::new(g.name(), g.table().select(ids)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            index: self.index.clone(),
            groups,
        })
    }

    /// Cross-section of one series: group names become the columns.
    ///
    /// Groups that do not carry `id` are skipped. Fails with
    /// [`MetricsError::IdentifierNotFound`] when no group carries it.
    pub fn series(&self, id: &str) -> Result<SeriesTable> {
        let mut frame = self.index.clone();
        let mut found = false;
        for group in self.groups.iter().filter(|g| g.table().contains(id)) {
            let values = group
                .table()
                .frame()
                .column(id)?
                .as_materialized_series()
                .clone()
                .with_name(group.name().into());
            frame.with_column(Column::from(values))?;
            found = true;
        }
        if !found {
            return Err(MetricsError::IdentifierNotFound(id.to_string()));
        }
        SeriesTable::new(frame)
    }
}
