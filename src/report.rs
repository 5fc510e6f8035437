// Delimited-text serialization of the analysis tables
use crate::analyzer::{
    LongTailTable, OutlierReport, PopularityTable, RegionPopularityTable, StatsTable,
    TimeSeriesTable,
};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

pub const TOP_N_FILE: &str = "top_n_products.csv";
pub const SUMMARY_STATS_FILE: &str = "summary_stats.csv";
pub const LONG_TAIL_FILE: &str = "long_tail_analysis.csv";
pub const TREND_FILE: &str = "trend.csv";
pub const OUTLIERS_FILE: &str = "outliers.csv";
pub const REGION_POPULARITY_FILE: &str = "region_popularity.csv";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("report csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("report is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// A table with a fixed column order: one header row plus one row per entity.
pub trait Tabular {
    fn header(&self) -> Vec<String>;
    fn records(&self) -> Vec<Vec<String>>;
}

pub fn write_table<W: Write, T: Tabular>(writer: W, table: &T) -> Result<(), ReportError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(table.header())?;
    for record in table.records() {
        wtr.write_record(record)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn to_csv_string<T: Tabular>(table: &T) -> Result<String, ReportError> {
    let mut buf = Vec::new();
    write_table(&mut buf, table)?;
    Ok(String::from_utf8(buf)?)
}

/// Writes `table` to `dir/file_name`, creating `dir` if needed.
pub fn save_table<T: Tabular>(dir: &Path, file_name: &str, table: &T) -> Result<PathBuf, ReportError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(file_name);
    write_table(fs::File::create(&path)?, table)?;
    info!("Saved {}.", path.display());
    Ok(path)
}

impl Tabular for PopularityTable {
    fn header(&self) -> Vec<String> {
        vec![self.product_field.header().to_string(), "popularity".into()]
    }

    fn records(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|r| vec![r.product_key.clone(), r.total.to_string()])
            .collect()
    }
}

impl Tabular for StatsTable {
    fn header(&self) -> Vec<String> {
        let mut header = vec![self.group_field.header().to_string()];
        for field in &self.metric_fields {
            for stat in ["count", "mean", "median", "std", "min", "25%", "75%", "max"] {
                header.push(format!("{}_{}", field.header(), stat));
            }
        }
        header
    }

    fn records(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| {
                let mut record = vec![row.group_key.clone()];
                for c in &row.columns {
                    record.extend([
                        c.count.to_string(),
                        c.mean.to_string(),
                        c.median.to_string(),
                        c.std.map(|s| s.to_string()).unwrap_or_default(),
                        c.min.to_string(),
                        c.q1.to_string(),
                        c.q3.to_string(),
                        c.max.to_string(),
                    ]);
                }
                record
            })
            .collect()
    }
}

impl Tabular for LongTailTable {
    fn header(&self) -> Vec<String> {
        vec![
            self.group_field.header().to_string(),
            "metric_sum".into(),
            "cumulative_total".into(),
            "cum_pct".into(),
            "segment".into(),
        ]
    }

    fn records(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|r| {
                vec![
                    r.product_key.clone(),
                    r.total.to_string(),
                    r.cumulative_total.to_string(),
                    r.cumulative_share.to_string(),
                    r.segment.to_string(),
                ]
            })
            .collect()
    }
}

impl Tabular for TimeSeriesTable {
    fn header(&self) -> Vec<String> {
        let mut header = vec![self.date_field.header().to_string()];
        if let Some(group) = self.group_field {
            header.push(group.header().to_string());
        }
        header.extend(self.metric_fields.iter().map(|f| f.header().to_string()));
        header
    }

    fn records(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|r| {
                let mut record = vec![r.period_start.format("%Y-%m-%d").to_string()];
                if let Some(key) = &r.group_key {
                    record.push(key.clone());
                }
                record.extend(r.totals.iter().map(|t| t.to_string()));
                record
            })
            .collect()
    }
}

impl Tabular for OutlierReport {
    fn header(&self) -> Vec<String> {
        let mut header = vec!["row".to_string()];
        if let Some(group) = self.group_field {
            header.push(group.header().to_string());
        }
        header.extend([
            self.field.header().to_string(),
            "low".into(),
            "high".into(),
            "is_outlier".into(),
        ]);
        header
    }

    fn records(&self) -> Vec<Vec<String>> {
        self.flags
            .iter()
            .map(|f| {
                let mut record = vec![f.row_index.to_string()];
                if let Some(key) = &f.group_key {
                    record.push(key.clone());
                }
                record.extend([
                    f.value.to_string(),
                    f.bounds.low.to_string(),
                    f.bounds.high.to_string(),
                    f.is_outlier.to_string(),
                ]);
                record
            })
            .collect()
    }
}

impl Tabular for RegionPopularityTable {
    fn header(&self) -> Vec<String> {
        vec![
            self.region_field.header().to_string(),
            self.product_field.header().to_string(),
            "popularity".into(),
        ]
    }

    fn records(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|r| vec![r.region.clone(), r.product_key.clone(), r.total.to_string()])
            .collect()
    }
}
