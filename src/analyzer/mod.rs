// Analyzer module: aggregates submodules for the individual analytic views.

pub mod geography;
pub mod long_tail;
pub mod outliers;
pub mod popularity;
pub mod statistics;
pub mod trend;

use crate::model::{EngineError, Field, Row};
use chrono::NaiveDate;

// Re-export the entry points for ease of use.
pub use geography::{
    define_regions, map_to_region, popularity_by_region, RegionAssignment, RegionMapping,
    RegionPopularityRow, RegionPopularityTable, RegionTaggedSet, TaggedRecord,
};
pub use long_tail::{long_tail_analysis, LongTailRow, LongTailTable, Segment};
pub use outliers::{
    flag_outliers, flag_outliers_with_factor, iqr_bounds, iqr_bounds_with_factor, IqrBounds,
    OutlierFlag, OutlierReport, IQR_FACTOR,
};
pub use popularity::{compute_popularity, top_n_products, PopularityRow, PopularityTable};
pub use statistics::{quantile, summary_stats, ColumnStats, StatsRow, StatsTable};
pub use trend::{aggregate_time, Period, TimeSeriesRow, TimeSeriesTable};

// Per-row accessors used after the schema check; a row that still lacks the
// column is reported the same way as a schema miss.

pub(crate) fn text_value<R: Row>(row: &R, field: Field) -> Result<&str, EngineError> {
    row.text(field).ok_or(EngineError::MissingColumn(field))
}

pub(crate) fn numeric_value<R: Row>(row: &R, field: Field) -> Result<f64, EngineError> {
    row.number(field).ok_or(EngineError::MissingColumn(field))
}

pub(crate) fn date_value<R: Row>(row: &R, field: Field) -> Result<NaiveDate, EngineError> {
    row.date(field).ok_or(EngineError::MissingColumn(field))
}
