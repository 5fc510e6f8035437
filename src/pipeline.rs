// Orchestrates one batch run: load, analyze, report, persist.
use crate::analyzer::{
    aggregate_time, compute_popularity, define_regions, flag_outliers_with_factor,
    long_tail_analysis, map_to_region, popularity_by_region, summary_stats, top_n_products,
    LongTailTable, OutlierReport, PopularityTable, RegionPopularityTable, StatsTable,
    TimeSeriesTable,
};
use crate::config::{AnalysisConfig, AppConfig};
use crate::model::{EngineError, Field, ParserError, RecordSet, StorageError};
use crate::parser::{load_region_mapping, SalesCsvParser};
use crate::report::{self, ReportError};
use crate::storage::SqliteStorage;
use chrono::Utc;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("ingestion failed: {0}")]
    Parser(#[from] ParserError),
    #[error("analysis failed: {0}")]
    Engine(#[from] EngineError),
    #[error("report failed: {0}")]
    Report(#[from] ReportError),
    #[error("storage failed: {0}")]
    Storage(#[from] StorageError),
    #[error("analysis task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Output of one of the independent analyses.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutput {
    TopProducts(PopularityTable),
    Stats(StatsTable),
    LongTail(LongTailTable),
    Trend(TimeSeriesTable),
    Outliers(OutlierReport),
}

impl AnalysisOutput {
    pub fn name(&self) -> &'static str {
        match self {
            AnalysisOutput::TopProducts(_) => "top products",
            AnalysisOutput::Stats(_) => "summary statistics",
            AnalysisOutput::LongTail(_) => "long tail",
            AnalysisOutput::Trend(_) => "trend",
            AnalysisOutput::Outliers(_) => "outliers",
        }
    }

    pub fn save(&self, dir: &Path) -> Result<PathBuf, ReportError> {
        match self {
            AnalysisOutput::TopProducts(t) => report::save_table(dir, report::TOP_N_FILE, t),
            AnalysisOutput::Stats(t) => report::save_table(dir, report::SUMMARY_STATS_FILE, t),
            AnalysisOutput::LongTail(t) => report::save_table(dir, report::LONG_TAIL_FILE, t),
            AnalysisOutput::Trend(t) => report::save_table(dir, report::TREND_FILE, t),
            AnalysisOutput::Outliers(t) => report::save_table(dir, report::OUTLIERS_FILE, t),
        }
    }

    /// Outlier flags are per-row diagnostics and only go to the report file.
    pub fn persist(&self, storage: &SqliteStorage, run_id: i64) -> Result<(), StorageError> {
        match self {
            AnalysisOutput::TopProducts(t) => storage.save_popularity(run_id, t),
            AnalysisOutput::Stats(t) => storage.save_summary_stats(run_id, t),
            AnalysisOutput::LongTail(t) => storage.save_long_tail(run_id, t),
            AnalysisOutput::Trend(t) => storage.save_time_series(run_id, t),
            AnalysisOutput::Outliers(_) => Ok(()),
        }
    }
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub run_id: Option<i64>,
    pub record_count: usize,
    pub outputs: Vec<AnalysisOutput>,
    pub region_popularity: Option<RegionPopularityTable>,
    /// Raw geography values that fell back to the `Unmapped` region.
    pub unmapped: BTreeMap<String, usize>,
    pub report_paths: Vec<PathBuf>,
}

pub async fn run(config: Arc<AppConfig>) -> Result<RunSummary, PipelineError> {
    let started_at = Utc::now();
    let analysis = &config.analysis;
    analysis.validate()?;

    info!("Loading cleaned records...");
    let input = config.input_path.clone();
    let records = tokio::task::spawn_blocking(move || SalesCsvParser::new().parse_file(&input)).await??;
    let records = Arc::new(records);
    let mut summary = RunSummary {
        record_count: records.records().len(),
        ..RunSummary::default()
    };

    info!("Running analyses...");
    summary.outputs = run_analyses(&records, analysis).await?;
    for output in &summary.outputs {
        if let AnalysisOutput::TopProducts(top) = output {
            for (rank, row) in top.rows.iter().enumerate() {
                info!("#{} {}: {}", rank + 1, row.product_key, row.total);
            }
        }
    }

    if let Some(path) = &config.region_mapping_path {
        info!("Geographic analysis...");
        let pairs = load_region_mapping(path)?;
        let mapping = define_regions(pairs)?;
        let assignment = map_to_region(records.as_ref(), analysis.geography_field, &mapping)?;
        for (code, rows) in &assignment.unmapped {
            warn!("Geography '{}' has no region mapping ({} rows tagged Unmapped).", code, rows);
        }
        summary.region_popularity = Some(popularity_by_region(
            &assignment.tagged,
            Field::Region,
            analysis.product_field,
            analysis.region_metric,
        )?);
        summary.unmapped = assignment.unmapped;
    } else {
        info!("No region mapping configured, skipping geographic analysis.");
    }

    for output in &summary.outputs {
        summary.report_paths.push(output.save(&config.output_dir)?);
    }
    if let Some(table) = &summary.region_popularity {
        summary.report_paths.push(report::save_table(
            &config.output_dir,
            report::REGION_POPULARITY_FILE,
            table,
        )?);
    }

    if let Some(db_path) = &config.database_path {
        info!("Persisting results...");
        let storage = SqliteStorage::new(&db_path.to_string_lossy())?;
        let run_id = storage.save_run(
            started_at,
            &config.input_path.to_string_lossy(),
            summary.record_count,
            |store, run_id| {
                for output in &summary.outputs {
                    output.persist(store, run_id)?;
                }
                if let Some(table) = &summary.region_popularity {
                    store.save_region_popularity(run_id, table)?;
                }
                Ok(())
            },
        )?;
        summary.run_id = Some(run_id);
    }

    info!(
        "Run finished: {} records, {} reports written.",
        summary.record_count,
        summary.report_paths.len()
    );
    Ok(summary)
}

/// Runs the independent analyses concurrently over the shared records.
/// Outputs come back in a fixed order regardless of completion order.
pub async fn run_analyses(
    records: &Arc<RecordSet>,
    analysis: &AnalysisConfig,
) -> Result<Vec<AnalysisOutput>, PipelineError> {
    let tasks = vec![
        spawn_analysis(records, analysis, |data, cfg| {
            let table = compute_popularity(data, cfg.product_field, cfg.popularity_metric)?;
            Ok(AnalysisOutput::TopProducts(top_n_products(&table, cfg.top_n)?))
        }),
        spawn_analysis(records, analysis, |data, cfg| {
            summary_stats(data, cfg.stats_group_field, &cfg.stats_metric_fields)
                .map(AnalysisOutput::Stats)
        }),
        spawn_analysis(records, analysis, |data, cfg| {
            long_tail_analysis(
                data,
                cfg.product_field,
                cfg.long_tail_metric_field,
                cfg.long_tail_threshold,
            )
            .map(AnalysisOutput::LongTail)
        }),
        spawn_analysis(records, analysis, |data, cfg| {
            aggregate_time(
                data,
                cfg.trend.date_field,
                cfg.trend.period,
                &cfg.trend.metric_fields,
                cfg.trend.group_field,
            )
            .map(AnalysisOutput::Trend)
        }),
        spawn_analysis(records, analysis, |data, cfg| {
            flag_outliers_with_factor(data, cfg.outlier_field, cfg.outlier_group_field, cfg.iqr_factor)
                .map(AnalysisOutput::Outliers)
        }),
    ];

    let mut outputs = Vec::with_capacity(tasks.len());
    for result in join_all(tasks).await {
        match result? {
            Ok(output) => {
                info!("Finished {} analysis.", output.name());
                outputs.push(output);
            }
            Err(e) => {
                error!("Analysis failed: {}", e);
                return Err(e.into());
            }
        }
    }
    Ok(outputs)
}

fn spawn_analysis<F>(
    records: &Arc<RecordSet>,
    analysis: &AnalysisConfig,
    job: F,
) -> JoinHandle<Result<AnalysisOutput, EngineError>>
where
    F: FnOnce(&RecordSet, &AnalysisConfig) -> Result<AnalysisOutput, EngineError> + Send + 'static,
{
    let records = Arc::clone(records);
    let analysis = analysis.clone();
    tokio::task::spawn_blocking(move || job(&records, &analysis))
}
