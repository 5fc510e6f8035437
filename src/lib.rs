pub mod analyzer;
pub mod config;
pub mod model;
pub mod normalizer;
pub mod parser;
pub mod pipeline;
pub mod report;
pub mod storage;
pub mod utils;

pub use analyzer::{
    aggregate_time, compute_popularity, define_regions, flag_outliers, iqr_bounds,
    long_tail_analysis, map_to_region, popularity_by_region, summary_stats, top_n_products,
};
pub use model::{Dataset, EngineError, Field, Metric, Record, RecordSet, Row, Schema};
