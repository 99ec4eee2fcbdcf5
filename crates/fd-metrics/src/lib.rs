#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/factors/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod drawdown;
pub mod error;
pub mod metric;
pub mod pipeline;
pub mod returns;
pub mod table;

// Re-export core types
pub use config::PipelineConfig;
pub use drawdown::{
    calculate_cum_max, calculate_cum_return, calculate_cum_return_anchored, calculate_drawdown,
    calculate_drawdown_full, calculate_drawdown_percentage, flatten_df,
};
pub use error::{MetricsError, Result};
pub use metric::{Metric, MetricInfo};
pub use pipeline::{retrive_single_ticker, transform_df, transform_df_with};
pub use returns::{
    calculate_daily_return, calculate_log_return, calculate_normalized_close,
    calculate_normalized_close_with_base, calculate_pct_change,
};
pub use table::{GroupedTable, MetricGroup, SeriesTable};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
