use crate::analyzer::Period;
use crate::model::{EngineError, Field, Metric};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid analysis settings: {0}")]
    Invalid(#[from] EngineError),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    pub date_field: Field,
    pub period: Period,
    pub metric_fields: Vec<Field>,
    pub group_field: Option<Field>,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            date_field: Field::Date,
            period: Period::Month,
            metric_fields: vec![Field::Qty],
            group_field: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub product_field: Field,
    pub popularity_metric: Metric,
    pub top_n: usize,
    pub long_tail_metric_field: Field,
    pub long_tail_threshold: f64,
    pub stats_group_field: Field,
    pub stats_metric_fields: Vec<Field>,
    pub trend: TrendConfig,
    pub outlier_field: Field,
    pub outlier_group_field: Option<Field>,
    pub iqr_factor: f64,
    pub geography_field: Field,
    pub region_metric: Metric,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            product_field: Field::Asin,
            popularity_metric: Metric::Quantity,
            top_n: 10,
            long_tail_metric_field: Field::Qty,
            long_tail_threshold: 0.8,
            stats_group_field: Field::Asin,
            stats_metric_fields: vec![Field::Qty, Field::Amount],
            trend: TrendConfig::default(),
            outlier_field: Field::Amount,
            outlier_group_field: None,
            iqr_factor: 1.5,
            geography_field: Field::ShipState,
            region_metric: Metric::Quantity,
        }
    }
}

impl AnalysisConfig {
    /// Range checks that must pass before any analysis starts.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.top_n == 0 {
            return Err(EngineError::InvalidParameter("top_n must be positive".into()));
        }
        if !(self.long_tail_threshold > 0.0 && self.long_tail_threshold < 1.0) {
            return Err(EngineError::InvalidParameter(format!(
                "long_tail_threshold must lie strictly between 0 and 1, got {}",
                self.long_tail_threshold
            )));
        }
        if !(self.iqr_factor.is_finite() && self.iqr_factor > 0.0) {
            return Err(EngineError::InvalidParameter(format!(
                "iqr_factor must be positive, got {}",
                self.iqr_factor
            )));
        }
        if self.stats_metric_fields.is_empty() || self.trend.metric_fields.is_empty() {
            return Err(EngineError::InvalidParameter(
                "metric field lists must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Cleaned sales report produced by ingestion.
    pub input_path: PathBuf,
    /// Two-column geography → region table; region analysis is skipped without it.
    pub region_mapping_path: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = serde_json::from_str(content)?;
    config.analysis.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_analysis_section_uses_defaults() {
        let config = parse_config(
            r#"{ "input_path": "data/processed/cleaned.csv", "output_dir": "data/processed" }"#,
        )
        .unwrap();
        assert_eq!(config.analysis.top_n, 10);
        assert_eq!(config.analysis.long_tail_threshold, 0.8);
        assert_eq!(config.analysis.trend.period, Period::Month);
        assert!(config.region_mapping_path.is_none());
    }

    #[test]
    fn fields_and_tokens_parse_from_text() {
        let config = parse_config(
            r#"{
                "input_path": "in.csv",
                "output_dir": "out",
                "region_mapping_path": "config/region_mapping.csv",
                "analysis": {
                    "product_field": "SKU",
                    "popularity_metric": "revenue",
                    "top_n": 5,
                    "geography_field": "ship-country",
                    "trend": { "period": "W", "metric_fields": ["Qty", "Amount"], "group_field": "ASIN" }
                }
            }"#,
        )
        .unwrap();
        let analysis = &config.analysis;
        assert_eq!(analysis.product_field, Field::Sku);
        assert_eq!(analysis.popularity_metric, Metric::Revenue);
        assert_eq!(analysis.geography_field, Field::ShipCountry);
        assert_eq!(analysis.trend.period, Period::Week);
        assert_eq!(analysis.trend.group_field, Some(Field::Asin));
        assert_eq!(analysis.trend.date_field, Field::Date);
        assert_eq!(analysis.stats_metric_fields, vec![Field::Qty, Field::Amount]);
    }

    #[test]
    fn unknown_tokens_and_bad_ranges_are_rejected() {
        let bad_period = r#"{ "input_path": "a", "output_dir": "b", "analysis": { "trend": { "period": "fortnight" } } }"#;
        assert!(matches!(parse_config(bad_period), Err(ConfigError::Json(_))));

        let bad_threshold = r#"{ "input_path": "a", "output_dir": "b", "analysis": { "long_tail_threshold": 1.0 } }"#;
        assert!(matches!(
            parse_config(bad_threshold),
            Err(ConfigError::Invalid(EngineError::InvalidParameter(_)))
        ));

        let zero_top = r#"{ "input_path": "a", "output_dir": "b", "analysis": { "top_n": 0 } }"#;
        assert!(matches!(parse_config(zero_top), Err(ConfigError::Invalid(_))));
    }
}
